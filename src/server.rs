//! Web server module for Abacus.
//!
//! Provides the report and ingestion endpoints plus [`recorded`], which
//! wraps an application's own routes with the [`record_requests`] middleware.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::analytics::{Recorder, RequestInfo, report};
use crate::storage::RequestStore;

/// Caller identity used when the peer address is unknown.
const UNKNOWN_CALLER: &str = "unknown";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Recorder,
    pub store: RequestStore,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queued: Option<usize>,
}

/// Create the Axum router with all routes.
///
/// The router's own traffic is not recorded. Wrap application routes with
/// [`recorded`] to record them.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/analytics/chart", get(chart_handler))
        .route("/api/requests", post(ingest_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(state)
}

/// Record every request reaching `router`.
pub fn recorded<S>(router: Router<S>, recorder: Recorder) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(recorder, record_requests))
}

/// Middleware recording every request that passes through.
///
/// The peer address comes from `ConnectInfo<SocketAddr>`; serve the router
/// with `into_make_service_with_connect_info::<SocketAddr>()` to populate it.
pub async fn record_requests(State(recorder): State<Recorder>, req: Request, next: Next) -> Response {
    recorder.record(request_info(&req)).await;
    next.run(req).await
}

/// Describe an incoming request for the recorder.
pub fn request_info(req: &Request) -> RequestInfo {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string());

    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    RequestInfo {
        url: req.uri().to_string(),
        path: req.uri().path().to_string(),
        method: req.method().to_string(),
        origin,
        protocol: format!("{:?}", req.version()),
        remote_addr,
    }
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
        stored: None,
        queued: None,
    })
}

/// Readiness probe that checks store availability.
async fn readyz_handler(State(state): State<AppState>) -> Response {
    match state.store.count().await {
        Ok(stored) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
            stored: Some(stored),
            queued: Some(state.recorder.queued()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                    stored: None,
                    queued: None,
                }),
            )
                .into_response()
        }
    }
}

/// Daily usage chart of the trailing 14 days.
async fn chart_handler(State(state): State<AppState>) -> Response {
    match report::report(&state.store).await {
        Ok(chart) => Json(chart).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build analytics chart");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

/// Accept a request description from an external HTTP layer.
async fn ingest_handler(State(state): State<AppState>, Json(info): Json<RequestInfo>) -> StatusCode {
    state.recorder.record(info).await;
    StatusCode::ACCEPTED
}
