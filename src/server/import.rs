//! Document import endpoints under `/api/import`.

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    routing::post,
};

use super::AppState;
use super::response::{ApiJson, ApiResult, created, ok};
use crate::import::{self, CreateFromDocument};
use crate::models::Principal;
use crate::{Error, Result};

/// Largest document accepted for analysis.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/document/analyze",
            post(analyze).layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES)),
        )
        .route("/document/create", post(create))
}

fn require_upload(body: &Bytes) -> Result<()> {
    if body.is_empty() {
        return Err(Error::InvalidArgument("No file uploaded".to_string()));
    }
    Ok(())
}

async fn analyze(State(state): State<AppState>, principal: Principal, body: Bytes) -> ApiResult {
    require_upload(&body)?;
    let analysis =
        import::analyze_document(&state.advisor, state.extractor.as_ref(), &principal, &body)
            .await?;
    Ok(ok(analysis))
}

async fn create(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(input): ApiJson<CreateFromDocument>,
) -> ApiResult {
    let mut storage = state.storage.lock().await;
    let goals = import::create_from_document(&mut storage, &principal.organization_id, input)?;
    Ok(created(goals))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{TestServer, body_json};

    #[tokio::test]
    async fn test_analyze_then_create() {
        let server = TestServer::new().await;

        let res = server
            .raw("/api/import/document/analyze", Vec::new())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "No file uploaded");

        let res = server
            .raw(
                "/api/import/document/analyze",
                b"Objective: Delight customers\nKR: NPS 40 -> 60".to_vec(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        let okrs = body["data"]["extractedOkrs"].clone();
        assert_eq!(okrs.as_array().unwrap().len(), 1);

        let res = server
            .post(
                "/api/import/document/create",
                json!({
                    "teamId": server.fx.corporate.id,
                    "ownerId": server.fx.admin.id,
                    "period": "2026",
                    "measurePeriod": "Q1-2026",
                    "okrs": okrs,
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = body_json(res).await;
        assert_eq!(body["data"][0]["title"], "Delight our customers");
        assert_eq!(body["data"][0]["measures"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["status"], "DRAFT");
    }
}
