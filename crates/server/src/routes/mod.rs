use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use deployment::Deployment;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::DeploymentImpl;

pub mod admin_agencies;
pub mod admin_claims;
pub mod agencies;
pub mod audit_logs;
pub mod claims;
pub mod feature_flags;
pub mod health;
pub mod lookups;
pub mod users;

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .merge(health::router(&deployment))
        .merge(lookups::router(&deployment))
        .merge(agencies::router(&deployment))
        .merge(admin_agencies::router(&deployment))
        .merge(claims::router(&deployment))
        .merge(admin_claims::router(&deployment))
        .merge(users::router(&deployment))
        .merge(audit_logs::router(&deployment))
        .merge(feature_flags::router(&deployment));

    let mut app = Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&deployment.config().cors_allowed_origins) {
        app = app.layer(cors);
    }
    app.with_state(deployment)
}

/// No configured origins means same-origin only, so no CORS headers at all.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}


#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use db::models::profile::UserRole;

    use super::test_support::{deployment, send, user};

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let deployment = deployment().await;
        let (status, _) = send(&deployment, Method::GET, "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_cookie_is_accepted_in_place_of_a_bearer_header() {
        use axum::{
            body::Body,
            http::{Request, header},
        };

        use super::test_support::dispatch;
        use crate::middleware::auth::SESSION_COOKIE;

        let deployment = deployment().await;
        let (profile, token) = user(&deployment, UserRole::User).await;
        let request = Request::builder()
            .uri("/api/me")
            .header(header::COOKIE, format!("{SESSION_COOKIE}={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = dispatch(&deployment, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], profile.id.to_string());
    }

    #[tokio::test]
    async fn garbage_tokens_are_unauthorized() {
        let deployment = deployment().await;
        let (status, body) =
            send(&deployment, Method::GET, "/api/me", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }
}
