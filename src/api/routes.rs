use axum::{
    extract::Request,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

use super::handlers::{devices, health, subscriptions, tplink, AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/devices/{domain}",
            get(devices::get_device).put(devices::update_device),
        )
        .route(
            "/api/v1/devices/{domain}/monitor/start",
            post(devices::start_monitor),
        )
        .route(
            "/api/v1/devices/{domain}/monitor/stop",
            post(devices::stop_monitor),
        )
        .route("/api/v1/devices/{domain}/stats", get(devices::get_stats))
        .route(
            "/api/v1/devices/{domain}/subscriptions",
            post(subscriptions::subscribe),
        )
        .route(
            "/api/v1/subscriptions/{id}/{event}",
            delete(subscriptions::unsubscribe),
        )
        .route("/api/v1/tplink/login", post(tplink::login))
        .route("/api/v1/tplink/devices", get(tplink::list_devices))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |_response: &axum::response::Response,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(Level::DEBUG, latency = ?latency, "request completed");
                    },
                ),
        )
}
