//! Admin review queue for agency claims.

use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{audit_log::CreateAuditLog, claim_request::ClaimRequest};
use deployment::Deployment;
use serde_json::json;
use services::services::claims::{ClaimListParams, ClaimListResponse, ClaimService, RejectClaim};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
    middleware::AdminUser,
};

pub async fn list_claims(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<ClaimListParams>,
) -> Result<ResponseJson<ApiResponse<ClaimListResponse>>, ApiError> {
    let claims = ClaimService::list(&deployment.db().pool, &params).await?;
    Ok(ResponseJson(ApiResponse::success(claims)))
}

pub async fn start_review(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(claim_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ClaimRequest>>, ApiError> {
    let claim = ClaimService::start_review(&deployment.db().pool, claim_id, &admin).await?;

    deployment
        .audit(CreateAuditLog::new(
            Some(admin.id),
            "claim.review",
            "claim_request",
            Some(claim_id.to_string()),
        ))
        .await;

    Ok(ResponseJson(ApiResponse::success(claim)))
}

pub async fn approve_claim(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(claim_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ClaimRequest>>, ApiError> {
    let outcome = ClaimService::approve(&deployment.db().pool, claim_id, &admin).await?;

    deployment
        .notifications()
        .claim_approved(&outcome.agency, &outcome.claimant)
        .await;
    deployment
        .audit(
            CreateAuditLog::new(
                Some(admin.id),
                "claim.approve",
                "claim_request",
                Some(claim_id.to_string()),
            )
            .with_changes(json!({
                "agency_id": outcome.agency.id,
                "user_id": outcome.claimant.id,
                "role": outcome.claimant.role,
            })),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(outcome.claim)))
}

pub async fn reject_claim(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(claim_id): Path<Uuid>,
    Json(payload): Json<RejectClaim>,
) -> Result<ResponseJson<ApiResponse<ClaimRequest>>, ApiError> {
    let outcome = ClaimService::reject(&deployment.db().pool, claim_id, &admin, &payload).await?;

    deployment
        .notifications()
        .claim_rejected(&outcome.claim, &outcome.agency, &outcome.claimant)
        .await;
    deployment
        .audit(
            CreateAuditLog::new(
                Some(admin.id),
                "claim.reject",
                "claim_request",
                Some(claim_id.to_string()),
            )
            .with_changes(json!({
                "agency_id": outcome.agency.id,
                "user_id": outcome.claimant.id,
                "reason": outcome.claim.rejection_reason,
            })),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(outcome.claim)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/admin/claims",
        Router::new()
            .route("/", get(list_claims))
            .route("/{claim_id}/review", post(start_review))
            .route("/{claim_id}/approve", post(approve_claim))
            .route("/{claim_id}/reject", post(reject_claim)),
    )
}
