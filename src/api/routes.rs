use crate::api::handlers::{health, reports, AppState};
use crate::services::ReportService;
use axum::{extract::Request, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Level;

pub fn create_router(reports: Arc<ReportService>) -> Router {
    let public_routes = Router::new().route("/health", get(health::health));

    let api_routes = Router::new()
        .route(
            "/api/v1/clients/{client_id}/lines/{line}/daily",
            get(reports::get_daily),
        )
        .route(
            "/api/v1/clients/{client_id}/lines/{line}/weekly",
            get(reports::get_weekly),
        );

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .with_state(AppState { reports })
        .layer(tower_http::cors::CorsLayer::permissive())
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
                .on_request(|_request: &Request, _span: &tracing::Span| {
                    tracing::event!(Level::DEBUG, "received request");
                })
                .on_response(
                    |_response: &axum::response::Response,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(Level::INFO, latency = ?latency, "request completed");
                    },
                )
                .on_failure(
                    |_error: tower_http::classify::ServerErrorsFailureClass,
                     _latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(Level::ERROR, "request failed");
                    },
                ),
        )
}
