use std::collections::BTreeMap;

use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::{audit_log::CreateAuditLog, feature_flag::FeatureFlag};
use deployment::Deployment;
use services::services::feature_flags::SetFeatureFlag;
use utils::response::ApiResponse;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path},
    middleware::AdminUser,
};

/// Public `{ key: enabled }` map, served from the flag cache.
pub async fn get_flags(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<BTreeMap<String, bool>>>, ApiError> {
    let flags = deployment.feature_flags().all().await?;
    Ok(ResponseJson(ApiResponse::success(flags.as_ref().clone())))
}

pub async fn list_flags(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
) -> Result<ResponseJson<ApiResponse<Vec<FeatureFlag>>>, ApiError> {
    let flags = deployment.feature_flags().list().await?;
    Ok(ResponseJson(ApiResponse::success(flags)))
}

pub async fn set_flag(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(key): Path<String>,
    Json(payload): Json<SetFeatureFlag>,
) -> Result<ResponseJson<ApiResponse<FeatureFlag>>, ApiError> {
    let change = deployment.feature_flags().set(&key, &payload).await?;

    deployment
        .audit(
            CreateAuditLog::new(Some(admin.id), "feature_flag.update", "feature_flag", Some(key))
                .with_changes(change.changes()),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(change.after)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/feature-flags", get(get_flags))
        .route("/admin/feature-flags", get(list_flags))
        .route("/admin/feature-flags/{key}", put(set_flag))
}
