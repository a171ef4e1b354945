//! Process configuration read from the environment.

use std::{net::SocketAddr, time::Duration};

use secrecy::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: SecretString,
    pub jwt_audience: String,
    pub cors_allowed_origins: Vec<String>,
    pub email: Option<EmailConfig>,
    pub admin_notification_email: Option<String>,
    pub feature_flag_cache_ttl: Duration,
    pub sentry_dsn: Option<String>,
    pub environment: String,
}

impl Config {
    pub const DEFAULT_DATABASE_URL: &'static str = "sqlite://staffing_directory.db";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => 3001,
        };

        let jwt_secret = var("AUTH_JWT_SECRET").ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "AUTH_JWT_SECRET",
                reason: "must be at least 32 characters".to_string(),
            });
        }

        let email = match (var("EMAIL_API_URL"), var("EMAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(EmailConfig {
                api_url,
                api_key: SecretString::from(api_key),
                from: var("EMAIL_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "EMAIL_API_URL",
                    reason: "EMAIL_API_URL and EMAIL_API_KEY must be set together".to_string(),
                });
            }
        };

        let ttl_secs = match var("FEATURE_FLAG_CACHE_TTL_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "FEATURE_FLAG_CACHE_TTL_SECS",
                reason: e.to_string(),
            })?,
            None => 60,
        };

        Ok(Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| Self::DEFAULT_DATABASE_URL.to_string()),
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            jwt_secret: SecretString::from(jwt_secret),
            jwt_audience: var("AUTH_JWT_AUDIENCE").unwrap_or_else(|| "authenticated".to_string()),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            email,
            admin_notification_email: var("ADMIN_NOTIFICATION_EMAIL"),
            feature_flag_cache_ttl: Duration::from_secs(ttl_secs),
            sentry_dsn: var("SENTRY_DSN"),
            environment: var("APP_ENV").unwrap_or_else(|| "development".to_string()),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "HOST",
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("AUTH_JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(config.database_url, Config::DEFAULT_DATABASE_URL);
        assert_eq!(config.port, 3001);
        assert_eq!(config.jwt_audience, "authenticated");
        assert!(config.email.is_none());
        assert_eq!(config.feature_flag_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:3001");
    }

    #[test]
    fn secret_is_required_and_long_enough() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("AUTH_JWT_SECRET"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("AUTH_JWT_SECRET", "short")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn email_settings_come_in_pairs() {
        let half = Config::from_lookup(lookup(&[
            ("AUTH_JWT_SECRET", SECRET),
            ("EMAIL_API_URL", "https://mail.example.com/send"),
        ]));
        assert!(half.is_err());

        let full = Config::from_lookup(lookup(&[
            ("AUTH_JWT_SECRET", SECRET),
            ("EMAIL_API_URL", "https://mail.example.com/send"),
            ("EMAIL_API_KEY", "key"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .unwrap();
        assert_eq!(full.email.unwrap().from, "no-reply@localhost");
        assert_eq!(full.cors_allowed_origins.len(), 2);
    }
}
