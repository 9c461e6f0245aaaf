//! Report endpoints under `/api/reports`.

use axum::{
    Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use super::AppState;
use super::response::{ApiPath, ApiQuery, ApiResult, ok};
use crate::models::Principal;
use crate::reports::{self, Report};
use crate::{Error, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quarterly/{quarter}", get(quarterly))
        .route("/annual/{year}", get(annual))
}

#[derive(Debug, Default, Deserialize)]
struct FormatQuery {
    #[serde(default)]
    format: Option<String>,
}

impl FormatQuery {
    fn wants_text(&self) -> bool {
        self.format.as_deref() == Some("text")
    }
}

fn text_download(report: &Report, name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"OKR-Report-{}.txt\"", name),
            ),
        ],
        reports::render_text(report),
    )
        .into_response()
}

fn parse_year(raw: &str) -> Result<i32> {
    raw.parse()
        .map_err(|_| Error::InvalidArgument("Invalid year".to_string()))
}

async fn quarterly(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(quarter): ApiPath<String>,
    ApiQuery(query): ApiQuery<FormatQuery>,
) -> ApiResult {
    let storage = state.storage.lock().await;
    let report = reports::quarterly_report(&storage, &principal.organization_id, &quarter)?;
    if query.wants_text() {
        return Ok(text_download(&Report::Quarterly(report), &quarter));
    }
    Ok(ok(report))
}

async fn annual(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(year): ApiPath<String>,
    ApiQuery(query): ApiQuery<FormatQuery>,
) -> ApiResult {
    let year = parse_year(&year)?;
    let storage = state.storage.lock().await;
    let report = reports::annual_report(&storage, &principal.organization_id, year)?;
    if query.wants_text() {
        return Ok(text_download(&Report::Annual(report), &year.to_string()));
    }
    Ok(ok(report))
}
