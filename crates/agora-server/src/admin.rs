//! Administrative REST surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use agora_core::{SessionId, SessionStatus};
use agora_engine::{EngineError, SessionDetail};
use agora_store::SessionRow;

use crate::server::AppState;

const LIST_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct CreateDebateRequest {
    #[serde(default)]
    pub topic: String,
    /// Zero, negative or absent means the configured default.
    #[serde(default)]
    pub total_rounds: Option<i64>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateDebateResponse {
    pub debate_id: SessionId,
    pub topic: String,
    pub total_rounds: u32,
    pub status: SessionStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub status: Option<String>,
}

/// JSON error body `{"error": ...}` with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::SessionNotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: "Debate not found".into(),
            },
            EngineError::InvalidRequest(message) => Self::bad_request(message),
            other => {
                error!(error = %other, "admin request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error".into(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

pub(crate) async fn create_debate(
    State(state): State<AppState>,
    Json(request): Json<CreateDebateRequest>,
) -> Result<Json<CreateDebateResponse>, ApiError> {
    let rounds = request.total_rounds.and_then(|r| u32::try_from(r).ok());
    let row = state
        .engine
        .create_session(&request.topic, rounds, request.created_by.as_deref())?;
    Ok(Json(CreateDebateResponse {
        debate_id: row.id,
        topic: row.topic,
        total_rounds: row.total_rounds,
        status: row.status,
    }))
}

pub(crate) async fn list_debates(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SessionRow>>, ApiError> {
    let status = parse_status(params.status.as_deref())?;
    Ok(Json(state.engine.list_sessions(status, LIST_LIMIT)?))
}

pub(crate) async fn get_debate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    Ok(Json(state.engine.session_detail(&SessionId::from_raw(id))?))
}

fn parse_status(raw: Option<&str>) -> Result<Option<SessionStatus>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<SessionStatus>().map(Some).map_err(ApiError::bad_request),
    }
}
