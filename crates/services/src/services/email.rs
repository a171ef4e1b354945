//! HTTP client for the transactional email provider.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::config::EmailConfig;

#[derive(Debug, Clone, Error)]
pub enum EmailError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("email provider rejected the api key")]
    Unauthorized,
}

impl EmailError {
    /// Transient failures worth another attempt.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            Self::Unauthorized => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EmailClient {
    http: Client,
    api_url: String,
    api_key: SecretString,
    from: String,
    min_retry_delay: Duration,
}

impl EmailClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    const MAX_RETRIES: usize = 3;

    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("staffing-directory/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            min_retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_min_retry_delay(mut self, delay: Duration) -> Self {
        self.min_retry_delay = delay;
        self
    }

    pub async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), EmailError> {
        let message = EmailMessage {
            from: self.from.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            text: text.to_string(),
        };

        (|| async { self.send_once(&message).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.min_retry_delay)
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(Self::MAX_RETRIES)
                    .with_jitter(),
            )
            .when(|e: &EmailError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "email delivery failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        debug!(subject, "email sent");
        Ok(())
    }

    async fn send_once(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let res = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EmailError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(EmailError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(EmailError::Http { status, body })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> EmailError {
    if e.is_timeout() {
        EmailError::Timeout
    } else {
        EmailError::Transport(e.to_string())
    }
}
