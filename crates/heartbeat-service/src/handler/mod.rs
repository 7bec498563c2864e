//! HTTP read API
//!
//! Thin adapter over the monitor's read operations. Query-string parameters
//! are passed through unchanged; validation happens in the query engine.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use heartbeat_core::query::{DEFAULT_INTERVAL, DEFAULT_PAGE_SIZE};
use heartbeat_core::{AvailabilityParams, HealthError, HeartbeatMonitor, LogParams};
use heartbeat_span::SpanContextExtractor;
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state
pub struct AppState {
    pub monitor: Arc<HeartbeatMonitor>,
    pub registry: Registry,
}

impl AppState {
    pub fn new(monitor: Arc<HeartbeatMonitor>, registry: Registry) -> Self {
        Self { monitor, registry }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(list_status))
        .route("/health/:name", get(service_status))
        .route("/health/:name/logs", get(service_logs))
        .route("/health/:name/availability", get(service_availability))
        .route("/logs", get(logs))
        .route("/availability", get(availability))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Log listing parameters
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    pub service_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl LogQueryParams {
    fn into_params(self, service_name: Option<String>) -> LogParams {
        LogParams {
            service_name: service_name.or(self.service_name),
            from: self.from,
            to: self.to,
            page: self.page.unwrap_or(0),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }
}

/// Availability parameters
#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQueryParams {
    pub service_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub interval: Option<String>,
}

impl AvailabilityQueryParams {
    fn into_params(self, service_name: Option<String>) -> AvailabilityParams {
        AvailabilityParams {
            service_name: service_name.or(self.service_name),
            from: self.from,
            to: self.to,
            interval: self
                .interval
                .unwrap_or_else(|| DEFAULT_INTERVAL.to_string()),
        }
    }
}

/// API error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

/// Error wrapper mapping `HealthError` onto HTTP status codes
pub struct ApiFailure(HealthError);

impl From<HealthError> for ApiFailure {
    fn from(err: HealthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, code) = status_for(&self.0);
        if self.0.is_client_error() {
            tracing::debug!(error = %self.0, "Rejected read request");
        } else {
            tracing::warn!(error = %self.0, "Read request failed");
        }

        (
            status,
            Json(ApiError {
                error: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Client errors map to 4xx, everything else to 5xx
fn status_for(err: &HealthError) -> (StatusCode, &'static str) {
    if err.is_client_error() {
        match err {
            HealthError::UnknownService(_) => (StatusCode::NOT_FOUND, "UNKNOWN_SERVICE"),
            _ => (StatusCode::BAD_REQUEST, "INVALID_PARAMETER"),
        }
    } else {
        match err {
            HealthError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

type ApiResult = Result<Response, ApiFailure>;

async fn list_status(
    State(state): State<Arc<AppState>>,
    SpanContextExtractor(parent): SpanContextExtractor,
) -> ApiResult {
    let status = state
        .monitor
        .get_current_status_in(None, parent.as_ref())
        .await?;
    Ok(Json(status).into_response())
}

async fn service_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    SpanContextExtractor(parent): SpanContextExtractor,
) -> ApiResult {
    let status = state
        .monitor
        .get_current_status_in(Some(&name), parent.as_ref())
        .await?;
    Ok(Json(status).into_response())
}

async fn service_logs(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    SpanContextExtractor(parent): SpanContextExtractor,
    Query(query): Query<LogQueryParams>,
) -> ApiResult {
    known_service(&state, &name)?;
    run_logs(&state, query.into_params(Some(name)), parent).await
}

async fn logs(
    State(state): State<Arc<AppState>>,
    SpanContextExtractor(parent): SpanContextExtractor,
    Query(query): Query<LogQueryParams>,
) -> ApiResult {
    run_logs(&state, query.into_params(None), parent).await
}

async fn service_availability(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    SpanContextExtractor(parent): SpanContextExtractor,
    Query(query): Query<AvailabilityQueryParams>,
) -> ApiResult {
    known_service(&state, &name)?;
    run_availability(&state, query.into_params(Some(name)), parent).await
}

async fn availability(
    State(state): State<Arc<AppState>>,
    SpanContextExtractor(parent): SpanContextExtractor,
    Query(query): Query<AvailabilityQueryParams>,
) -> ApiResult {
    run_availability(&state, query.into_params(None), parent).await
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match heartbeat_core::telemetry::encode_text(&state.registry) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn known_service(state: &AppState, name: &str) -> Result<(), ApiFailure> {
    if state.monitor.tracker().contains(name) {
        Ok(())
    } else {
        Err(HealthError::UnknownService(name.to_string()).into())
    }
}

async fn run_logs(
    state: &AppState,
    params: LogParams,
    parent: Option<heartbeat_span::SpanContext>,
) -> ApiResult {
    let page = state
        .monitor
        .queries()
        .get_logs_in(&params, parent.as_ref())
        .await?;
    Ok(Json(page).into_response())
}

async fn run_availability(
    state: &AppState,
    params: AvailabilityParams,
    parent: Option<heartbeat_span::SpanContext>,
) -> ApiResult {
    let series = state
        .monitor
        .queries()
        .get_availability_in(&params, parent.as_ref())
        .await?;
    Ok(Json(series).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartbeat_core::AttemptId;

    #[test]
    fn test_status_class_follows_error_class() {
        let errors = vec![
            HealthError::invalid_parameter("page"),
            HealthError::UnknownService("gamma".to_string()),
            HealthError::StoreUnavailable("down".to_string()),
            HealthError::malformed("missing id"),
            HealthError::invalid_config("empty"),
            HealthError::StaleReply {
                service: "alpha".to_string(),
                attempt_id: AttemptId::from("x"),
            },
        ];

        for err in &errors {
            let (status, _) = status_for(err);
            assert_eq!(status.is_client_error(), err.is_client_error(), "{}", err);
        }
        assert_eq!(status_for(&errors[0]).0, StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&errors[1]).0, StatusCode::NOT_FOUND);
        assert_eq!(status_for(&errors[2]).0, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&errors[3]).0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
