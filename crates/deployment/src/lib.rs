//! Shared application state handed to every request handler.

use async_trait::async_trait;
use db::{DBService, models::audit_log::CreateAuditLog};
use services::services::{
    audit::AuditLogger,
    auth::JwtVerifier,
    config::{Config, ConfigError},
    email::EmailError,
    feature_flags::FeatureFlagService,
    notification::NotificationService,
};
use thiserror::Error;

mod local;

pub use local::LocalDeployment;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("email client: {0}")]
    Email(#[from] EmailError),
}

#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new(config: Config) -> Result<Self, DeploymentError>;

    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn jwt(&self) -> &JwtVerifier;

    fn notifications(&self) -> &NotificationService;

    fn feature_flags(&self) -> &FeatureFlagService;

    fn audit_logger(&self) -> &AuditLogger;

    /// Best-effort audit entry; never fails the caller.
    async fn audit(&self, entry: CreateAuditLog) {
        self.audit_logger().record(entry).await;
    }
}
