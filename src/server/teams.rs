//! Team endpoints under `/api/teams`.

use axum::{Router, extract::State, routing::get};
use serde::Deserialize;

use super::AppState;
use super::auth::{require_role, require_team_manager};
use super::response::{ApiJson, ApiPath, ApiQuery, ApiResult, created, message, ok};
use crate::models::{NewTeam, Principal, TeamPatch, UserRole};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_teams).post(create_team))
        .route("/hierarchy", get(hierarchy))
        .route("/{id}", get(get_team).patch(update_team).delete(delete_team))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_teams(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.list_teams(&principal.organization_id, query.include_inactive)?))
}

async fn hierarchy(State(state): State<AppState>, principal: Principal) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.team_hierarchy(&principal.organization_id)?))
}

async fn get_team(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.get_team(&id, &principal.organization_id)?))
}

async fn create_team(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(input): ApiJson<NewTeam>,
) -> ApiResult {
    require_team_manager(&principal)?;
    let mut storage = state.storage.lock().await;
    Ok(created(storage.create_team(&principal.organization_id, input)?))
}

async fn update_team(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<TeamPatch>,
) -> ApiResult {
    require_team_manager(&principal)?;
    let mut storage = state.storage.lock().await;
    Ok(ok(storage.update_team(&id, &principal.organization_id, patch)?))
}

async fn delete_team(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    require_role(&principal, &[UserRole::Admin])?;
    let mut storage = state.storage.lock().await;
    storage.delete_team(&id, &principal.organization_id)?;
    Ok(message("Team deleted"))
}
