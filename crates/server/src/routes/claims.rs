use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::claim_request::{ClaimRequest, ClaimRequestWithAgency};
use deployment::Deployment;
use services::services::claims::{ClaimService, SubmitClaim};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, extract::Json, middleware::AuthUser};

pub async fn request_claim(
    State(deployment): State<DeploymentImpl>,
    AuthUser(claimant): AuthUser,
    Json(payload): Json<SubmitClaim>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<ClaimRequest>>), ApiError> {
    let outcome = ClaimService::submit(&deployment.db().pool, &claimant, &payload).await?;

    deployment
        .notifications()
        .claim_submitted(&outcome.claim, &outcome.agency, &outcome.claimant)
        .await;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(outcome.claim)),
    ))
}

pub async fn my_claims(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<ClaimRequestWithAgency>>>, ApiError> {
    let claims = ClaimService::mine(&deployment.db().pool, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(claims)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/claims/request", post(request_claim))
        .route("/claims/mine", get(my_claims))
}
