//! Measure endpoints under `/api/measures`.

use axum::{
    Router,
    extract::State,
    routing::{get, patch, post},
};
use serde::Deserialize;

use super::AppState;
use super::response::{ApiJson, ApiPath, ApiResult, created, message, ok};
use crate::models::{MeasurePatch, NewMeasure, Principal};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_measure))
        .route("/{id}", patch(update_measure).delete(delete_measure))
        .route("/{id}/updates", post(record_update))
        .route("/{id}/history", get(history))
}

#[derive(Debug, Deserialize)]
struct RecordUpdate {
    value: f64,
    #[serde(default)]
    note: Option<String>,
}

async fn create_measure(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(input): ApiJson<NewMeasure>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    Ok(created(storage.create_measure(&principal.organization_id, input)?))
}

async fn update_measure(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<MeasurePatch>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    Ok(ok(storage.update_measure(&id, &principal.organization_id, patch)?))
}

async fn delete_measure(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    storage.delete_measure(&id, &principal.organization_id)?;
    Ok(message("Measure deleted"))
}

async fn record_update(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<RecordUpdate>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    let update = storage.record_measure_update(
        &id,
        &principal.organization_id,
        &principal.user_id,
        req.value,
        req.note.as_deref(),
    )?;
    Ok(created(update))
}

async fn history(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    Ok(ok(storage.measure_history(&id, &principal.organization_id)?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{TestServer, body_json};
    use crate::test_utils::{add_goal, add_measure};

    #[tokio::test]
    async fn test_measure_update_rolls_up_goal() {
        let server = TestServer::new().await;
        let (goal, measure) = {
            let mut storage = server.state.storage.lock().await;
            let g = add_goal(&mut storage, &server.fx, "Revenue", "Q1-2026");
            let m = add_measure(&mut storage, &server.fx, &g.id, "ARR", 0.0, 100.0);
            (g, m)
        };

        let res = server
            .post(
                &format!("/api/measures/{}/updates", measure.id),
                json!({"value": 80.0, "note": "good quarter"}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["data"]["value"], 80.0);

        let res = server.get(&format!("/api/goals/{}", goal.id)).await;
        let body = body_json(res).await;
        assert_eq!(body["data"]["progress"], 80.0);
        assert_eq!(body["data"]["status"], "ON_TRACK");

        let res = server
            .get(&format!("/api/measures/{}/history", measure.id))
            .await;
        let body = body_json(res).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["note"], "good quarter");
    }

    #[tokio::test]
    async fn test_create_patch_delete_measure() {
        let server = TestServer::new().await;
        let goal = {
            let mut storage = server.state.storage.lock().await;
            add_goal(&mut storage, &server.fx, "Quality", "Q1-2026")
        };

        let res = server
            .post(
                "/api/measures",
                json!({"goalId": goal.id, "title": "Bugs", "measureType": "DECREASE_TO", "startValue": 50, "targetValue": 10}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let id = body_json(res).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let path = format!("/api/measures/{}", id);
        let res = server
            .request("PATCH", &path, Some(server.token.as_str()), Some(json!({"currentValue": 30})))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["data"]["progress"], 50.0);

        let res = server.request("DELETE", &path, Some(server.token.as_str()), None).await;
        assert_eq!(body_json(res).await["message"], "Measure deleted");

        let res = server
            .post(&format!("{}/updates", path), json!({"value": 5}))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
