
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, StringRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::QueryRejection;
use services::services::{
    agencies::AgencyError, audit::AuditLogError, auth::AuthError, bulk_import::ImportError,
    claims::ClaimError, database_validator::DatabaseValidationError,
    feature_flags::FeatureFlagError, users::UserAdminError,
};
use thiserror::Error;
use utils::{response::ApiResponse, validation::FieldErrors};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Agency(#[from] AgencyError),
    #[error(transparent)]
    AuditLog(#[from] AuditLogError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    UserAdmin(#[from] UserAdminError),
    #[error(transparent)]
    FeatureFlag(#[from] FeatureFlagError),
    #[error(transparent)]
    DatabaseValidation(#[from] DatabaseValidationError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] JsonRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error(transparent)]
    Body(#[from] StringRejection),
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Agency(e) => match e {
                AgencyError::Validation(_) => StatusCode::BAD_REQUEST,
                AgencyError::NotFound => StatusCode::NOT_FOUND,
                AgencyError::Conflict(_) => StatusCode::CONFLICT,
                AgencyError::Forbidden(_) => StatusCode::FORBIDDEN,
                AgencyError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::AuditLog(e) => match e {
                AuditLogError::Validation(_) => StatusCode::BAD_REQUEST,
                AuditLogError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Claim(e) => match e {
                ClaimError::Validation(_) => StatusCode::BAD_REQUEST,
                ClaimError::NotFound | ClaimError::AgencyNotFound => StatusCode::NOT_FOUND,
                ClaimError::AlreadyClaimed
                | ClaimError::DuplicateRequest
                | ClaimError::InvalidTransition { .. } => StatusCode::CONFLICT,
                ClaimError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Import(e) => match e {
                ImportError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::Auth(e) => match e {
                AuthError::MissingToken | AuthError::Expired | AuthError::InvalidToken(_) => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Inactive | AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
                AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::UserAdmin(e) => match e {
                UserAdminError::Validation(_) | UserAdminError::SelfModification(_) => {
                    StatusCode::BAD_REQUEST
                }
                UserAdminError::NotFound => StatusCode::NOT_FOUND,
                UserAdminError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::FeatureFlag(e) => match e {
                FeatureFlagError::Validation(_) => StatusCode::BAD_REQUEST,
                FeatureFlagError::Database(_) | FeatureFlagError::Load(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Json(JsonRejection::JsonDataError(_)) => StatusCode::BAD_REQUEST,
            ApiError::Json(e) => e.status(),
            ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::Path(e) => e.status(),
            ApiError::Body(e) => e.status(),
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DatabaseValidation(_) | ApiError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            ApiError::Agency(AgencyError::Validation(errors))
            | ApiError::AuditLog(AuditLogError::Validation(errors))
            | ApiError::Claim(ClaimError::Validation(errors))
            | ApiError::UserAdmin(UserAdminError::Validation(errors))
            | ApiError::FeatureFlag(FeatureFlagError::Validation(errors))
            | ApiError::Validation(errors) => Some(errors.clone()),
            ApiError::Json(
                e @ (JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_)),
            ) => Some(deserialize_errors(&rejection_detail(e), "body")),
            ApiError::Query(e) => Some(deserialize_errors(&rejection_detail(e), "query")),
            ApiError::Path(e) if e.status() == StatusCode::BAD_REQUEST => {
                Some(deserialize_errors(&rejection_detail(e), "path"))
            }
            _ => None,
        }
    }
}

/// The deserializer's own message, without axum's rejection preamble.
fn rejection_detail(err: &dyn std::error::Error) -> String {
    err.source().map_or_else(|| err.to_string(), ToString::to_string)
}

/// Files a deserializer message under the field it names.
///
/// Messages look like `founded_year: invalid type: ...` when the failing
/// value has a path, or ``missing field `name` `` when it does not.
fn deserialize_errors(detail: &str, fallback: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    match detail.split_once(": ") {
        Some((path, message)) if is_field_path(path) => errors.add(path, message),
        _ => {
            let field = detail
                .strip_prefix("missing field `")
                .and_then(|rest| rest.split_once('`'))
                .map_or(fallback, |(field, _)| field);
            errors.add(field, detail);
        }
    }
    errors
}

fn is_field_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            ApiResponse::<(), FieldErrors>::error("An internal error occurred")
        } else if let Some(errors) = self.field_errors() {
            ApiResponse::error_with_data("Validation failed", errors)
        } else {
            ApiResponse::error(&self.to_string())
        };
        (status, Json(body)).into_response()
    }
}
