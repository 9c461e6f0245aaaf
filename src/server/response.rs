//! JSON envelope and error mapping for the HTTP API.
//!
//! Every response body is `{success, data?, error?, message?, pagination?}`.
//! Extractor rejections are rewritten into the same envelope so clients never
//! see axum's plain-text errors.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::Error;
use crate::models::Pagination;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            pagination: None,
        }
    }
}

/// `200` with `data`.
pub fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::data(data)).into_response()
}

/// `201` with `data`.
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::data(data))).into_response()
}

/// `200` with `data` and page metadata.
pub fn paged<T: Serialize>(data: T, pagination: Pagination) -> Response {
    let mut body = ApiResponse::data(data);
    body.pagination = Some(pagination);
    Json(body).into_response()
}

/// `200` with only a `message`.
pub fn message(text: &str) -> Response {
    Json(ApiResponse::<()> {
        success: true,
        data: None,
        error: None,
        message: Some(text.to_string()),
        pagination: None,
    })
    .into_response()
}

/// A library error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult = std::result::Result<Response, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        ApiError(Error::InvalidArgument(message))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidArgument(_) | Error::Conflict(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Io(_)
            | Error::Json(_)
            | Error::Database(_)
            | Error::Config(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(error),
            message: None,
            pagination: None,
        };
        (status, Json(body)).into_response()
    }
}

/// `Json<T>` whose rejection is a 400 envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// `Path<T>` whose rejection is a 400 envelope.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// `Query<T>` whose rejection is a 400 envelope.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (Error::Conflict("x".into()), StatusCode::BAD_REQUEST),
            (Error::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (Error::Forbidden, StatusCode::FORBIDDEN),
            (Error::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Other("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_envelope_skips_empty_fields() {
        let body = serde_json::to_value(ApiResponse::data(vec![1, 2])).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": [1, 2]}));
    }
}
