//! CORS configuration for dashboard clients

use axum::http::header;
use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

/// Origins allowed when none are configured
const LOCAL_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

/// Create a CORS layer for the configured origins. An empty list allows the
/// local dashboard dev servers only.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = if allowed_origins.is_empty() {
        debug!("CORS: no origins configured, allowing localhost only");
        LOCAL_ORIGINS
            .iter()
            .map(|&o| HeaderValue::from_static(o))
            .collect()
    } else {
        debug!("CORS: allowing origins {:?}", allowed_origins);
        allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("CORS: ignoring invalid origin {}", o);
                    None
                }
            })
            .collect()
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(origins: &[String]) -> axum::Router {
        axum::Router::new()
            .route("/", get(|| async { "ok" }).post(|| async { "ok" }))
            .layer(cors_layer(origins))
    }

    fn allow_origin(response: &axum::response::Response) -> Option<&str> {
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_default_allows_local_dashboard_only() {
        let response = app(&[])
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allow_origin(&response), Some("http://localhost:5173"));

        let response = app(&[])
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allow_origin(&response), None);
    }

    #[tokio::test]
    async fn test_preflight_for_configured_origin() {
        let origins = vec!["https://scout.example.com".to_string(), "bad\norigin".to_string()];
        let response = app(&origins)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header("Origin", "https://scout.example.com")
                    .header("Access-Control-Request-Method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(allow_origin(&response), Some("https://scout.example.com"));
        let methods = response
            .headers()
            .get("access-control-allow-methods")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"));
        assert!(!methods.contains("DELETE"));
    }
}
