use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use db::models::{agency::AgencyWithRelations, audit_log::CreateAuditLog};
use deployment::Deployment;
use serde::Deserialize;
use serde_json::json;
use services::services::{
    agencies::{AgencySearchParams, AgencySearchResponse, AgencyService, UpdateAgency},
    bulk_import::{BulkImportService, ImportSummary},
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
    middleware::AdminUser,
};

/// Room for a full import: every row at its longest, in multi-byte text.
pub const BULK_IMPORT_BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct BulkImportQuery {
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn list_agencies(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<AgencySearchParams>,
) -> Result<ResponseJson<ApiResponse<AgencySearchResponse>>, ApiError> {
    let filter = AgencyService::filter_from_params(&params, true).map_err(ApiError::Validation)?;
    let response = AgencyService::search(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(response)))
}

pub async fn get_agency(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Path(agency_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AgencyWithRelations>>, ApiError> {
    let agency = AgencyService::get_by_id(&deployment.db().pool, agency_id).await?;
    Ok(ResponseJson(ApiResponse::success(agency)))
}

pub async fn update_agency(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(agency_id): Path<Uuid>,
    Json(patch): Json<UpdateAgency>,
) -> Result<ResponseJson<ApiResponse<AgencyWithRelations>>, ApiError> {
    let update = AgencyService::update(&deployment.db().pool, agency_id, &patch, &admin).await?;

    deployment
        .audit(
            CreateAuditLog::new(
                Some(admin.id),
                "agency.update",
                "agency",
                Some(agency_id.to_string()),
            )
            .with_changes(update.changes()),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(update.after)))
}

/// CSV body in, per-row report out. Dry runs write nothing, audit included.
pub async fn bulk_import(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Query(query): Query<BulkImportQuery>,
    WithRejection(body, _): WithRejection<String, ApiError>,
) -> Result<ResponseJson<ApiResponse<ImportSummary>>, ApiError> {
    let summary = BulkImportService::import(&deployment.db().pool, &body, query.dry_run).await?;

    if !summary.dry_run {
        deployment
            .audit(
                CreateAuditLog::new(Some(admin.id), "agency.bulk_import", "agency", None)
                    .with_changes(json!({
                        "total_rows": summary.total_rows,
                        "imported": summary.imported,
                        "skipped": summary.skipped,
                        "failed": summary.failed,
                    })),
            )
            .await;
    }

    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/admin/agencies",
        Router::new()
            .route("/", get(list_agencies))
            .route(
                "/bulk-import",
                post(bulk_import).layer(DefaultBodyLimit::max(BULK_IMPORT_BODY_LIMIT)),
            )
            .route("/{agency_id}", get(get_agency).patch(update_agency)),
    )
}
