//! Session-token verification and role checks.
//!
//! Tokens are HS256 JWTs issued by the hosted auth provider. The token only
//! establishes identity; the role always comes from the caller's profile row
//! so a demotion takes effect on the next request.

use std::time::Duration;

use chrono::Utc;
use db::models::profile::{Profile, UserRole};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingToken,
    #[error("session expired")]
    Expired,
    #[error("invalid session token: {0}")]
    InvalidToken(String),
    #[error("account is disabled")]
    Inactive,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    audience: String,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &SecretString, audience: &str) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);
        Self {
            decoding: DecodingKey::from_secret(bytes),
            encoding: EncodingKey::from_secret(bytes),
            validation,
            audience: audience.to_string(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Mints a session token. Used by the import CLI and tests; production
    /// tokens come from the auth provider.
    pub fn issue(&self, user_id: Uuid, email: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id,
            email: Some(email.to_string()),
            aud: self.audience.clone(),
            exp: now + ttl.as_secs() as i64,
            iat: Some(now),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

/// Resolves a bearer token to an active profile, creating the profile on
/// first sight.
pub async fn authenticate(
    pool: &SqlitePool,
    verifier: &JwtVerifier,
    token: &str,
) -> Result<Profile, AuthError> {
    let claims = verifier.verify(token)?;
    let email = claims
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AuthError::InvalidToken("token has no email claim".to_string()))?;

    let profile = Profile::find_or_create(pool, claims.sub, &email).await?;
    if !profile.is_active {
        debug!(user_id = %profile.id, "rejected inactive account");
        return Err(AuthError::Inactive);
    }
    Ok(profile)
}

pub fn require_admin(profile: &Profile) -> Result<(), AuthError> {
    if profile.role.is_admin() {
        Ok(())
    } else {
        Err(AuthError::Forbidden("admin access required"))
    }
}

/// Admins may edit any agency; owners only the one they claimed.
pub fn can_edit_agency(profile: &Profile, claimed_by: Option<Uuid>) -> bool {
    match profile.role {
        UserRole::Admin => true,
        UserRole::AgencyOwner => claimed_by == Some(profile.id),
        UserRole::User => false,
    }
}

#[cfg(test)]
mod tests {
    use db::{DBService, models::profile::UpdateProfile};

    use super::*;

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(
            &SecretString::from("test-secret-test-secret-test-secret!"),
            "authenticated",
        )
    }

    #[test]
    fn issued_tokens_verify() {
        let verifier = verifier();
        let id = Uuid::new_v4();
        let token = verifier
            .issue(id, "kim@example.com", Duration::from_secs(600))
            .unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email.as_deref(), Some("kim@example.com"));
    }

    #[test]
    fn wrong_audience_and_secret_are_rejected() {
        let other_aud = JwtVerifier::new(
            &SecretString::from("test-secret-test-secret-test-secret!"),
            "service_role",
        );
        let token = other_aud
            .issue(Uuid::new_v4(), "kim@example.com", Duration::from_secs(600))
            .unwrap();
        assert!(matches!(
            verifier().verify(&token),
            Err(AuthError::InvalidToken(_))
        ));

        let other_secret = JwtVerifier::new(
            &SecretString::from("another-secret-another-secret-12345"),
            "authenticated",
        );
        let token = other_secret
            .issue(Uuid::new_v4(), "kim@example.com", Duration::from_secs(600))
            .unwrap();
        assert!(verifier().verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_report_expiry() {
        let verifier = verifier();
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            email: Some("old@example.com".into()),
            aud: "authenticated".into(),
            exp: Utc::now().timestamp() - 3600,
            iat: None,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &verifier.encoding).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn disabled_accounts_cannot_authenticate() {
        let db = DBService::new_in_memory().await.unwrap();
        let verifier = verifier();
        let id = Uuid::new_v4();
        let token = verifier
            .issue(id, "gone@example.com", Duration::from_secs(600))
            .unwrap();

        let profile = authenticate(&db.pool, &verifier, &token).await.unwrap();
        assert_eq!(profile.role, UserRole::User);

        Profile::update(
            &db.pool,
            id,
            &UpdateProfile {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            authenticate(&db.pool, &verifier, &token).await,
            Err(AuthError::Inactive)
        ));
    }
}
