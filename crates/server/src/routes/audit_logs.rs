use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::audit::{AuditLogPage, AuditLogParams};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, extract::Query, middleware::AdminUser};

pub async fn list_audit_logs(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<AuditLogParams>,
) -> Result<ResponseJson<ApiResponse<AuditLogPage>>, ApiError> {
    let page = deployment.audit_logger().list(&params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/admin/audit-logs", get(list_audit_logs))
}
