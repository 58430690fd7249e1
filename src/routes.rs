//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod defcon;
mod ledger;
mod lvi;
mod query;
mod staging;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, HeaderMap, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Gatekeeper: ad-hoc read-only queries
        .route("/api/query", post(query::execute_query))
        // Audit ledger
        .route("/api/ledger", get(ledger::list_task_events))
        .route("/api/ledger/audit", get(ledger::list_audit_entries))
        // Risk state
        .route("/api/defcon", get(defcon::current_risk))
        // Staging workflow
        .route(
            "/api/staging",
            post(staging::submit).get(staging::list_submissions),
        )
        .route("/api/staging/{id}/review", post(staging::review))
        .route("/api/staging/{id}/promote", post(staging::promote))
        // LVI metric engine
        .route("/api/lvi", get(lvi::current_lvi))
        .route("/api/lvi/history", get(lvi::lvi_history))
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Calling principal for audit attribution. Session management lives outside
/// this service; the dashboard forwards its actor id in a header.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "dashboard".to_string())
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_actor_defaults_to_dashboard() {
        let headers = HeaderMap::new();
        assert_eq!(actor_from_headers(&headers), "dashboard");
    }

    #[test]
    fn test_actor_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", HeaderValue::from_static("oracle-agent"));
        assert_eq!(actor_from_headers(&headers), "oracle-agent");
    }

    #[test]
    fn test_blank_actor_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", HeaderValue::from_static("   "));
        assert_eq!(actor_from_headers(&headers), "dashboard");
    }
}
