use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Duration;

pub const RATE_LIMIT_MESSAGE: &str =
    "You have exceeded the request limit. Please try again later.";

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

/// Application error types
#[derive(Debug, PartialEq)]
pub enum AppError {
    RateLimited { retry_after: Duration },
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::RateLimited { retry_after } => {
                let body = Json(ErrorResponse {
                    message: RATE_LIMIT_MESSAGE.to_string(),
                    retry_after_ms: Some(retry_after_millis(retry_after)),
                });
                let mut resp = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                resp.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_seconds(retry_after)),
                );
                resp
            }
            AppError::NotFound => {
                let body = Json(ErrorResponse {
                    message: "Resource not found.".to_string(),
                    retry_after_ms: None,
                });
                (StatusCode::NOT_FOUND, body).into_response()
            }
        }
    }
}

/// Retry hint in milliseconds, rounded up so clients never retry early.
pub fn retry_after_millis(retry_after: Duration) -> u64 {
    let millis = retry_after.as_nanos().div_ceil(1_000_000);
    millis.min(u64::MAX as u128) as u64
}

/// Retry-After carries whole seconds: round up, never advertise 0.
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    secs.max(1)
}
