//! Goal, link and alignment endpoints under `/api/goals`.

use axum::{
    Router,
    extract::State,
    routing::{delete, get, post},
};
use serde::Deserialize;

use super::AppState;
use super::response::{ApiJson, ApiPath, ApiQuery, ApiResult, created, message, ok, paged};
use crate::models::{BulkGoal, CloneGoalInput, GoalFilter, GoalPatch, NewGoal, Principal};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_goals).post(create_goal))
        .route("/map", get(goals_map))
        .route("/link", post(link_goals))
        .route("/link/{parent_id}/{child_id}", delete(unlink_goals))
        .route("/clone", post(clone_goal))
        .route("/bulk-import", post(bulk_import))
        .route("/{id}", get(get_goal).patch(update_goal).delete(delete_goal))
        .route("/{id}/updates", post(add_update))
        .route("/{id}/hierarchy", get(hierarchy))
        .route("/{id}/available-parents", get(available_parents))
}

#[derive(Debug, Default, Deserialize)]
struct MapQuery {
    period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkRequest {
    parent_goal_id: String,
    child_goal_id: String,
    #[serde(default = "crate::models::default_weight")]
    contribution_weight: f64,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkImportRequest {
    team_id: String,
    period: String,
    #[serde(default)]
    measure_period: Option<String>,
    /// Defaults to the caller
    #[serde(default)]
    owner_id: Option<String>,
    goals: Vec<BulkGoal>,
}

async fn list_goals(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(filter): ApiQuery<GoalFilter>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    let page = storage.list_goals(&principal.organization_id, &filter)?;
    Ok(paged(page.goals, page.pagination))
}

async fn goals_map(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(query): ApiQuery<MapQuery>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    let map = storage.goals_map(&principal.organization_id, query.period.as_deref())?;
    Ok(ok(map))
}

async fn get_goal(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.get_goal_detail(&id, &principal.organization_id)?))
}

async fn create_goal(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(input): ApiJson<NewGoal>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    let goal = storage.create_goal(&principal.organization_id, &principal.user_id, input)?;
    Ok(created(goal))
}

async fn update_goal(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<GoalPatch>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    Ok(ok(storage.update_goal(&id, &principal.organization_id, patch)?))
}

async fn delete_goal(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    storage.delete_goal(&id, &principal.organization_id)?;
    Ok(message("Goal deleted"))
}

async fn link_goals(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<LinkRequest>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    let link = storage.link_goals(
        &principal.organization_id,
        &req.parent_goal_id,
        &req.child_goal_id,
        req.contribution_weight,
    )?;
    Ok(created(link))
}

async fn unlink_goals(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath((parent_id, child_id)): ApiPath<(String, String)>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    storage.unlink_goals(&principal.organization_id, &parent_id, &child_id)?;
    Ok(message("Link removed"))
}

async fn add_update(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    let update = storage.add_goal_update(
        &id,
        &principal.organization_id,
        &principal.user_id,
        &req.content,
    )?;
    Ok(created(update))
}

async fn hierarchy(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.goal_hierarchy(&id, &principal.organization_id)?))
}

async fn available_parents(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.available_parents(&id, &principal.organization_id)?))
}

async fn clone_goal(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(input): ApiJson<CloneGoalInput>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    let cloned = storage.clone_goal(&principal.organization_id, &principal.user_id, input)?;
    Ok(created(cloned))
}

async fn bulk_import(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<BulkImportRequest>,
) -> ApiResult {
    let owner = req.owner_id.as_deref().unwrap_or(&principal.user_id);
    let mut storage = state.storage.lock().await;
    let goals = storage.bulk_import_goals(
        &principal.organization_id,
        owner,
        &req.team_id,
        &req.period,
        req.measure_period.as_deref(),
        &req.goals,
    )?;
    Ok(created(goals))
}
