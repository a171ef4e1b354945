//! Request extractors resolving the session token to a profile.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    headers::{Authorization, authorization::Bearer},
};
use db::models::profile::Profile;
use deployment::Deployment;
use services::services::auth::{AuthError, authenticate, require_admin};

use crate::{DeploymentImpl, error::ApiError};

/// Cookie set by the hosted auth provider's browser client.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// Any signed-in, active user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Profile);

/// A signed-in user whose profile role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Profile);

async fn session_token(parts: &mut Parts, deployment: &DeploymentImpl) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, deployment).await
    {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<DeploymentImpl> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts, deployment)
            .await
            .ok_or(AuthError::MissingToken)?;
        let profile = authenticate(&deployment.db().pool, deployment.jwt(), &token).await?;
        Ok(AuthUser(profile))
    }
}

impl FromRequestParts<DeploymentImpl> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(profile) = AuthUser::from_request_parts(parts, deployment).await?;
        require_admin(&profile)?;
        Ok(AdminUser(profile))
    }
}
