use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use serde::Serialize;
use services::services::database_validator::DatabaseValidator;
use tracing::warn;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::DeploymentImpl;

#[derive(Debug, Serialize, TS)]
pub struct HealthStatus {
    pub status: String,
    pub database: bool,
}

/// Liveness plus a schema check; a broken store reports `database: false`
/// rather than failing the probe.
pub async fn health(State(deployment): State<DeploymentImpl>) -> ResponseJson<ApiResponse<HealthStatus>> {
    let database = match DatabaseValidator::new(deployment.db().pool.clone())
        .validate()
        .await
    {
        Ok(result) => {
            if !result.is_ok() {
                warn!(summary = %result.summary(), "database check failed");
            }
            result.is_ok()
        }
        Err(e) => {
            warn!(error = %e, "database check errored");
            false
        }
    };
    ResponseJson(ApiResponse::success(HealthStatus {
        status: "ok".to_string(),
        database,
    }))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/health", get(health))
}
