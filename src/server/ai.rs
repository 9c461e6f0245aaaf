//! Advisory endpoints under `/api/ai`.
//!
//! Handlers never hold the storage lock themselves; the [`Advisor`] takes it
//! only around context reads and audit writes.
//!
//! [`Advisor`]: crate::ai::Advisor

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use super::response::{ApiJson, ApiPath, ApiResult, ok};
use crate::ai::{ChatMessage, DraftMeasure, SuggestGoalInput};
use crate::models::Principal;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/suggest-goal", post(suggest_goal))
        .route("/review-measure/{id}", post(review_measure))
        .route("/review-draft-measure", post(review_draft_measure))
        .route("/suggest-alignment/{goal_id}", get(suggest_alignment))
        .route("/progress-summary/{goal_id}", get(progress_summary))
        .route("/chat", post(chat))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
}

async fn suggest_goal(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(input): ApiJson<SuggestGoalInput>,
) -> ApiResult {
    Ok(ok(state.advisor.suggest_goal(&principal, input).await?))
}

async fn review_measure(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult {
    Ok(ok(state.advisor.review_measure(&principal, &id).await?))
}

async fn review_draft_measure(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(draft): ApiJson<DraftMeasure>,
) -> ApiResult {
    Ok(ok(state.advisor.review_draft_measure(&principal, draft).await?))
}

async fn suggest_alignment(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(goal_id): ApiPath<String>,
) -> ApiResult {
    Ok(ok(state.advisor.suggest_alignment(&principal, &goal_id).await?))
}

async fn progress_summary(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(goal_id): ApiPath<String>,
) -> ApiResult {
    let summary = state.advisor.progress_summary(&principal, &goal_id).await?;
    Ok(ok(json!({ "summary": summary })))
}

async fn chat(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<ChatRequest>,
) -> ApiResult {
    let response = state.advisor.chat(&principal, &req.messages).await?;
    Ok(ok(json!({ "response": response })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{TestServer, body_json};
    use crate::test_utils::{add_goal, add_measure};

    #[tokio::test]
    async fn test_suggest_goal_with_mock_provider() {
        let server = TestServer::new().await;
        let res = server
            .post(
                "/api/ai/suggest-goal",
                json!({"title": "more sales", "teamId": server.fx.corporate.id}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["data"]["suggestedMeasures"].as_array().unwrap().len(), 3);

        let storage = server.state.storage.lock().await;
        assert_eq!(
            storage
                .count_ai_interactions(Some(server.fx.admin.id.as_str()))
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_review_and_summary() {
        let server = TestServer::new().await;
        let (goal, measure) = {
            let mut storage = server.state.storage.lock().await;
            let g = add_goal(&mut storage, &server.fx, "Retention", "Q1-2026");
            let m = add_measure(&mut storage, &server.fx, &g.id, "Churn", 10.0, 5.0);
            (g, m)
        };

        let res = server
            .post(&format!("/api/ai/review-measure/{}", measure.id), json!({}))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_json(res).await["data"]["score"].is_number());

        let res = server
            .get(&format!("/api/ai/progress-summary/{}", goal.id))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_json(res).await["data"]["summary"].is_string());

        let res = server.post("/api/ai/review-measure/missing", json!({})).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_requires_messages() {
        let server = TestServer::new().await;
        let res = server.post("/api/ai/chat", json!({"messages": []})).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = server
            .post(
                "/api/ai/chat",
                json!({"messages": [{"role": "user", "content": "How do I write a good KR?"}]}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_json(res).await["data"]["response"].is_string());
    }
}
