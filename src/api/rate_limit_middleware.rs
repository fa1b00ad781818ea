use crate::api::client_ip::client_identity;
use crate::api::error::AppError;
use crate::rate_limit::{Admission, RateLimiter};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Admission check in front of the API routes.
///
/// Disabled limiters pass requests straight through without resolving the client.
/// Denied requests get a 429 with a `Retry-After` hint and never reach the handler.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(req).await;
    }

    let client = client_identity(&req);
    match limiter.allow(&client) {
        Admission::Allowed => next.run(req).await,
        Admission::Denied { retry_after } => {
            warn!(
                client = %client,
                method = %req.method(),
                path = %req.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            AppError::RateLimited { retry_after }.into_response()
        }
    }
}
