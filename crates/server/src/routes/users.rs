use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use db::models::{
    audit_log::CreateAuditLog,
    profile::{Profile, UpdateProfile},
};
use deployment::Deployment;
use services::services::users::{UserAdminService, UserListParams, UserListResponse};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
    middleware::{AdminUser, AuthUser},
};

pub async fn me(AuthUser(profile): AuthUser) -> ResponseJson<ApiResponse<Profile>> {
    ResponseJson(ApiResponse::success(profile))
}

pub async fn list_users(
    State(deployment): State<DeploymentImpl>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<UserListParams>,
) -> Result<ResponseJson<ApiResponse<UserListResponse>>, ApiError> {
    let users = UserAdminService::list(&deployment.db().pool, &params).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn update_user(
    State(deployment): State<DeploymentImpl>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateProfile>,
) -> Result<ResponseJson<ApiResponse<Profile>>, ApiError> {
    let update = UserAdminService::update(&deployment.db().pool, user_id, &payload, &admin).await?;

    deployment
        .audit(
            CreateAuditLog::new(
                Some(admin.id),
                "user.update",
                "profile",
                Some(user_id.to_string()),
            )
            .with_changes(update.changes()),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(update.after)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/me", get(me))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{user_id}", patch(update_user))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use db::models::profile::UserRole;
    use serde_json::json;

    use crate::routes::test_support::{deployment, send, user};

    #[tokio::test]
    async fn me_returns_the_callers_profile() {
        let deployment = deployment().await;
        let (profile, token) = user(&deployment, UserRole::AgencyOwner).await;
        let (status, body) = send(&deployment, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], profile.email);
        assert_eq!(body["data"]["role"], "agency_owner");

        let (status, _) = send(&deployment, Method::GET, "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admins_manage_other_accounts_but_not_their_own_role() {
        let deployment = deployment().await;
        let (admin, admin_token) = user(&deployment, UserRole::Admin).await;
        let (member, member_token) = user(&deployment, UserRole::User).await;

        let (status, body) = send(
            &deployment,
            Method::PATCH,
            &format!("/api/admin/users/{}", member.id),
            Some(&admin_token),
            Some(json!({ "full_name": "Jordan Reyes", "is_active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["full_name"], "Jordan Reyes");
        assert_eq!(body["data"]["is_active"], false);

        // Deactivated accounts lose access on the next request.
        let (status, _) =
            send(&deployment, Method::GET, "/api/me", Some(&member_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &deployment,
            Method::PATCH,
            &format!("/api/admin/users/{}", admin.id),
            Some(&admin_token),
            Some(json!({ "role": "user" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &deployment,
            Method::GET,
            "/api/admin/users?role=admin",
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["users"][0]["id"], admin.id.to_string());
    }
}
