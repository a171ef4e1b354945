//! Public directory endpoints and the owner edit path.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{agency::AgencyWithRelations, audit_log::CreateAuditLog};
use deployment::Deployment;
use serde_json::json;
use services::services::agencies::{
    AgencySearchParams, AgencySearchResponse, AgencyService, CreateAgency, UpdateAgency,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
    middleware::{AdminUser, AuthUser},
};

pub async fn search_agencies(
    State(deployment): State<DeploymentImpl>,
    Query(params): Query<AgencySearchParams>,
) -> Result<ResponseJson<ApiResponse<AgencySearchResponse>>, ApiError> {
    let filter =
        AgencyService::filter_from_params(&params, false).map_err(ApiError::Validation)?;
    let response = AgencyService::search(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(response)))
}

pub async fn get_agency(
    State(deployment): State<DeploymentImpl>,
    Path(slug): Path<String>,
) -> Result<ResponseJson<ApiResponse<AgencyWithRelations>>, ApiError> {
    let agency = AgencyService::get_active_by_slug(&deployment.db().pool, &slug).await?;
    Ok(ResponseJson(ApiResponse::success(agency)))
}

pub async fn create_agency(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateAgency>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<AgencyWithRelations>>), ApiError> {
    let created = AgencyService::create(&deployment.db().pool, &payload).await?;

    deployment
        .audit(
            CreateAuditLog::new(
                Some(admin.id),
                "agency.create",
                "agency",
                Some(created.agency.id.to_string()),
            )
            .with_changes(json!({
                "name": created.agency.name,
                "slug": created.agency.slug,
                "trades": created.trades.iter().map(|t| &t.slug).collect::<Vec<_>>(),
                "regions": created.regions.iter().map(|r| &r.slug).collect::<Vec<_>>(),
            })),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(created))))
}

/// Owners edit the listing they claimed; admin-only flags are refused.
pub async fn update_own_agency(
    State(deployment): State<DeploymentImpl>,
    AuthUser(editor): AuthUser,
    Path(agency_id): Path<Uuid>,
    Json(patch): Json<UpdateAgency>,
) -> Result<ResponseJson<ApiResponse<AgencyWithRelations>>, ApiError> {
    let update = AgencyService::update(&deployment.db().pool, agency_id, &patch, &editor).await?;

    deployment
        .audit(
            CreateAuditLog::new(
                Some(editor.id),
                "agency.update",
                "agency",
                Some(agency_id.to_string()),
            )
            .with_changes(update.changes()),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(update.after)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/agencies", get(search_agencies).post(create_agency))
        // One segment name for both: a slug on GET, an id on PATCH.
        .route("/agencies/{agency}", get(get_agency).patch(update_own_agency))
}
