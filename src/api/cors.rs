use crate::config::CorsConfig;
use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::warn;

/// Build the CORS layer for browser front ends.
///
/// Origins that are not valid header values are skipped with a warning, as is
/// `*`, which cannot be combined with credentials.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter(|origin| {
            if origin.trim() == "*" {
                warn!("Skipping wildcard CORS origin; credentials require explicit origins");
                return false;
            }
            true
        })
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::HEAD,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        // Credentials rule out the `*` wildcard, so echo whatever the browser asks for
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(config.max_age_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_wildcard_origin_is_skipped() {
        let config = CorsConfig {
            allowed_origins: vec!["*".to_string(), "https://app.example.com".to_string()],
            max_age_seconds: 60,
        };
        // Building the service must not panic on the wildcard
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&config));

        let req = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.com"
        );
    }
}
