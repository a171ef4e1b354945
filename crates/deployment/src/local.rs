use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use services::services::{
    audit::AuditLogger, auth::JwtVerifier, config::Config, email::EmailClient,
    feature_flags::FeatureFlagService, notification::NotificationService,
};
use tracing::info;

use crate::{Deployment, DeploymentError};

/// Single-process deployment backed by a local SQLite file.
#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    jwt: JwtVerifier,
    notifications: NotificationService,
    feature_flags: FeatureFlagService,
    audit: AuditLogger,
}

impl LocalDeployment {
    /// Wires services around an already-open database.
    pub fn from_parts(config: Config, db: DBService) -> Result<Self, DeploymentError> {
        let email = config.email.as_ref().map(EmailClient::new).transpose()?;
        if email.is_none() {
            info!("EMAIL_API_URL not set; notification emails are disabled");
        }
        Ok(Self {
            jwt: JwtVerifier::new(&config.jwt_secret, &config.jwt_audience),
            notifications: NotificationService::new(email, config.admin_notification_email.clone()),
            feature_flags: FeatureFlagService::new(db.pool.clone(), config.feature_flag_cache_ttl),
            audit: AuditLogger::new(db.pool.clone()),
            config: Arc::new(config),
            db,
        })
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;
        Self::from_parts(config, db)
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn jwt(&self) -> &JwtVerifier {
        &self.jwt
    }

    fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    fn feature_flags(&self) -> &FeatureFlagService {
        &self.feature_flags
    }

    fn audit_logger(&self) -> &AuditLogger {
        &self.audit
    }
}

#[cfg(test)]
mod tests {
    use db::models::audit_log::{AuditLogEntry, AuditLogFilter, CreateAuditLog};

    use super::*;

    fn config() -> Config {
        Config::from_lookup(|name| {
            (name == "AUTH_JWT_SECRET").then(|| "0123456789abcdef0123456789abcdef".to_string())
        })
        .unwrap()
    }

    #[tokio::test]
    async fn audit_goes_through_the_shared_pool() {
        let db = DBService::new_in_memory().await.unwrap();
        let deployment = LocalDeployment::from_parts(config(), db).unwrap();

        deployment
            .audit(CreateAuditLog::new(None, "agency.bulk_import", "agency", None))
            .await;

        let filter = AuditLogFilter {
            limit: 10,
            ..Default::default()
        };
        let entries = AuditLogEntry::list(&deployment.db().pool, &filter).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(deployment.config().port, 3001);
    }
}
