//! User endpoints under `/api/users`.

use axum::{Router, extract::State, routing::get};

use super::AppState;
use super::auth::require_role;
use super::response::{ApiJson, ApiPath, ApiResult, ok};
use crate::models::{Principal, UserPatch, UserRole};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(me))
        .route("/{id}", axum::routing::patch(update_user))
}

async fn list_users(State(state): State<AppState>, principal: Principal) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.list_users(&principal.organization_id)?))
}

async fn me(State(state): State<AppState>, principal: Principal) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.get_user(&principal.user_id, &principal.organization_id)?))
}

async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> ApiResult {
    require_role(&principal, &[UserRole::Admin])?;
    let mut storage = state.storage.lock().await;
    Ok(ok(storage.update_user(&id, &principal.organization_id, patch)?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{TestServer, body_json};
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_me_and_admin_only_patch() {
        let server = TestServer::new().await;
        let res = server.get("/api/users/me").await;
        let body = body_json(res).await;
        assert_eq!(body["data"]["email"], "admin@acme.test");

        let token = server.user_token("eve@acme.test", UserRole::Executive).await;
        let admin_path = format!("/api/users/{}", server.fx.admin.id);
        let res = server
            .request("PATCH", &admin_path, Some(token.as_str()), Some(json!({"title": "CEO"})))
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = server
            .request("PATCH", &admin_path, Some(server.token.as_str()), Some(json!({"title": "CEO"})))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["data"]["title"], "CEO");

        let res = server.get("/api/users").await;
        assert_eq!(body_json(res).await["data"].as_array().unwrap().len(), 2);
    }
}
