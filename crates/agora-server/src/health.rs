//! `/health` and `/metrics` endpoints.

use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::server::AppState;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when the database does not answer.
    pub status: String,
    pub uptime_secs: u64,
    /// Open participant and observer sockets.
    pub connections: usize,
    pub active_sessions: usize,
}

pub fn health_check(
    started_at: Instant,
    database_ok: bool,
    connections: usize,
    active_sessions: usize,
) -> HealthResponse {
    HealthResponse {
        status: if database_ok { "ok" } else { "degraded" }.into(),
        uptime_secs: started_at.elapsed().as_secs(),
        connections,
        active_sessions,
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = match state.engine.database().ping() {
        Ok(()) => true,
        Err(error) => {
            warn!(%error, "database health probe failed");
            false
        }
    };
    let body = health_check(
        state.started_at,
        database_ok,
        state.connections.total(),
        state.engine.active_sessions(),
    );
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            agora_telemetry::render(handle),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_database() {
        assert_eq!(health_check(Instant::now(), true, 0, 0).status, "ok");
        assert_eq!(health_check(Instant::now(), false, 0, 0).status, "degraded");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, true, 0, 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), true, 2, 1);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["active_sessions"], 1);
        assert!(parsed["uptime_secs"].is_number());
    }
}
