//! Prometheus metrics recorder and metric name constants.
//!
//! Call sites record through the `metrics` facade macros; the recorder
//! installed here renders them for `GET /metrics`.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Fails if a
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Sessions created total (counter).
pub const SESSIONS_CREATED_TOTAL: &str = "agora_sessions_created_total";
/// Sessions ended total (counter, labels: reason_kind).
pub const SESSIONS_ENDED_TOTAL: &str = "agora_sessions_ended_total";
/// Sessions currently active (gauge).
pub const SESSIONS_ACTIVE: &str = "agora_sessions_active";
/// Speeches accepted total (counter).
pub const SPEECHES_ACCEPTED_TOTAL: &str = "agora_speeches_accepted_total";
/// Speeches rejected total (counter, labels: code).
pub const SPEECHES_REJECTED_TOTAL: &str = "agora_speeches_rejected_total";
/// Logins rejected total (counter, labels: reason).
pub const LOGINS_REJECTED_TOTAL: &str = "agora_logins_rejected_total";
/// Judge calls total (counter, labels: outcome).
pub const JUDGE_CALLS_TOTAL: &str = "agora_judge_calls_total";
/// Heartbeat timeouts total (counter).
pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "agora_heartbeat_timeouts_total";
/// Outbound frames dropped on full queues (counter).
pub const FRAMES_DROPPED_TOTAL: &str = "agora_frames_dropped_total";
/// Connected participants (gauge).
pub const PARTICIPANTS_CONNECTED: &str = "agora_participants_connected";
/// Connected observers (gauge).
pub const OBSERVERS_CONNECTED: &str = "agora_observers_connected";
