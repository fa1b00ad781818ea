use crate::api::client_ip::client_identity;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Log every request with its outcome and latency, tagging it with a request id.
///
/// An incoming `x-request-id` is kept; otherwise a UUIDv4 is generated. The id is
/// echoed on the response.
pub async fn log_requests(mut req: Request, next: Next) -> Response {
    let start = Instant::now();

    let request_id = match req.headers().get(&REQUEST_ID_HEADER) {
        Some(id) => id.clone(),
        None => {
            let id = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("-"));
            req.headers_mut().insert(REQUEST_ID_HEADER.clone(), id.clone());
            id
        }
    };

    let method = req.method().clone();
    let uri = req.uri().clone();
    let client = client_identity(&req);

    let mut resp = next.run(req).await;

    info!(
        request_id = request_id.to_str().unwrap_or("-"),
        method = %method,
        uri = %uri,
        status = resp.status().as_u16(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        client = %client,
        "Request handled"
    );

    resp.headers_mut().insert(REQUEST_ID_HEADER.clone(), request_id);
    resp
}
