//! Health, liveness, and readiness endpoint handlers.
//!
//! These handlers expose instance health for orchestrators and load
//! balancers. Readiness fails as soon as shutdown begins so traffic is
//! routed away while in-flight requests drain.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::LifecycleState;

/// Path of the detailed health endpoint.
pub const HEALTH_PATH: &str = "/healthz";
/// Path of the liveness probe.
pub const LIVENESS_PATH: &str = "/healthz/live";
/// Path of the readiness probe.
pub const READINESS_PATH: &str = "/healthz/ready";

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the `state` field in the response body indicates
/// whether the instance is actually serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": &*state.service,
        "version": &*state.version,
        "state": state.shutdown.state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "stop_requested": state.shutdown.is_stop_requested(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 while listening, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.state() == LifecycleState::Listening {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::network::ShutdownController;

    fn test_state() -> AppState {
        AppState {
            shutdown: Arc::new(ShutdownController::new()),
            service: Arc::from("billing"),
            version: Arc::from("1.0.0"),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.shutdown.set_listening();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["service"], "billing");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["state"], "listening");
        assert_eq!(json["in_flight"], 0);
        assert_eq!(json["stop_requested"], false);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_created_state() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.0["state"], "created");
    }

    #[tokio::test]
    async fn health_handler_reports_shutting_down() {
        let state = test_state();
        state.shutdown.set_listening();
        state.shutdown.begin_shutdown();

        let response = health_handler(State(state)).await;
        assert_eq!(response.0["state"], "shutting_down");
    }

    #[tokio::test]
    async fn health_handler_reports_pending_stop_request() {
        let state = test_state();
        state.shutdown.set_listening();
        state.shutdown.trigger_shutdown();

        let response = health_handler(State(state)).await;
        assert_eq!(response.0["stop_requested"], true);
        assert_eq!(response.0["state"], "listening");
    }

    #[tokio::test]
    async fn health_handler_reports_in_flight_count() {
        let state = test_state();
        let _guard = state.shutdown.in_flight_guard();

        let response = health_handler(State(state)).await;
        assert_eq!(response.0["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_200_when_listening() {
        let state = test_state();
        state.shutdown.set_listening();
        assert_eq!(readiness_handler(State(state)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_before_listening() {
        let status = readiness_handler(State(test_state())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_when_shutting_down() {
        let state = test_state();
        state.shutdown.set_listening();
        state.shutdown.begin_shutdown();

        let status = readiness_handler(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
