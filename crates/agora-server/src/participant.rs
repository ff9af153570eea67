//! Participant endpoint (`GET /debate`).
//!
//! The first frame must be a login. Once placed in a session the connection
//! carries speeches and heartbeat replies until the session ends, the peer
//! goes away, or its heartbeat lapses.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::{debug, info, warn};

use agora_core::protocol::{ClientMessage, Heartbeat, LoginRejected, LoginRequest, ServerMessage};
use agora_core::{ClientError, DisconnectCause, ErrorCode, SessionId};
use agora_engine::{run_heartbeat, ClientConnection, HeartbeatResult, JoinOutcome};
use agora_telemetry::metrics::HEARTBEAT_TIMEOUTS_TOTAL;

use crate::client::{self, Role, WsStream};
use crate::server::AppState;

pub(crate) async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let tasks = state.shutdown.tasks().clone();
    ws.on_upgrade(move |socket| tasks.track_future(serve(socket, state)))
}

async fn serve(socket: WebSocket, state: AppState) {
    let _guard = state.connections.enter(Role::Participant);
    let (sink, mut stream) = socket.split();
    let (conn, rx) = client::open(state.config.max_send_queue);
    let writer = client::spawn_writer(sink, rx, conn.close_token());
    debug!(conn_id = %conn.id, "participant connected");

    if let Some(joined) = login(&state, &conn, &mut stream).await {
        converse(&state, &conn, &mut stream, joined).await;
    }

    conn.close();
    let _ = writer.await;
    debug!(conn_id = %conn.id, "participant connection closed");
}

/// Read the login frame and hand it to the engine.
async fn login(
    state: &AppState,
    conn: &Arc<ClientConnection>,
    stream: &mut WsStream,
) -> Option<JoinOutcome> {
    let shutdown = state.shutdown.token();
    let text = tokio::select! {
        text = client::next_text(stream) => text?,
        () = shutdown.cancelled() => return None,
    };

    let request = match parse_login(&text) {
        Ok(request) => request,
        Err(err) => {
            debug!(conn_id = %conn.id, code = %err.code, message = %err.message, "login refused");
            let _ = conn.send_message(&ServerMessage::error(&err, None));
            return None;
        }
    };

    match state.engine.join(&request, Arc::clone(conn)) {
        Ok(joined) => {
            debug!(conn_id = %conn.id, debate_id = %joined.session_id, "participant bound to debate");
            Some(joined)
        }
        Err(rejection) => {
            let _ = conn.send_message(&ServerMessage::LoginRejected(LoginRejected::from(&rejection)));
            None
        }
    }
}

/// Decode the first frame, which must be a well-formed login.
fn parse_login(text: &str) -> Result<LoginRequest, ClientError> {
    let request = match ClientMessage::parse(text) {
        Ok(ClientMessage::Login(request)) => request,
        Ok(other) => {
            return Err(ClientError::new(
                ErrorCode::InvalidMessageType,
                format!("Expected login, got {}", other.kind()),
            ))
        }
        Err(error) => {
            return Err(
                ClientError::new(ErrorCode::InvalidMessageFormat, format!("Invalid login message: {error}"))
                    .recoverable(false),
            )
        }
    };

    if request.bot_name.trim().is_empty() || request.bot_uuid.trim().is_empty() {
        return Err(ClientError::new(
            ErrorCode::InvalidMessageFormat,
            "bot_name and bot_uuid are required",
        )
        .recoverable(false));
    }
    Ok(request)
}

async fn converse(
    state: &AppState,
    conn: &Arc<ClientConnection>,
    stream: &mut WsStream,
    joined: JoinOutcome,
) {
    let shutdown = state.shutdown.token();
    let mut heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(conn),
        state.config.heartbeat_interval,
        state.config.heartbeat_miss_threshold,
        shutdown.child_token(),
    ));

    let cause = loop {
        tokio::select! {
            frame = client::next_text(stream) => match frame {
                Some(text) => handle_frame(state, conn, &joined.session_id, &text).await,
                None => break Some(DisconnectCause::ConnectionLost),
            },
            outcome = &mut heartbeat => {
                if matches!(outcome, Ok(HeartbeatResult::TimedOut)) {
                    metrics::counter!(HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                    warn!(
                        debate_id = %joined.session_id,
                        participant = %joined.identifier,
                        "participant missed heartbeats"
                    );
                    break Some(DisconnectCause::HeartbeatTimeout);
                }
                break None;
            }
            () = conn.closed() => break None,
            () = shutdown.cancelled() => break None,
        }
    };
    heartbeat.abort();

    if let Some(cause) = cause {
        info!(
            debate_id = %joined.session_id,
            participant = %joined.identifier,
            cause = cause.as_str(),
            "participant disconnected"
        );
        state.engine.disconnect(&joined.session_id, &conn.id, cause).await;
    }
}

async fn handle_frame(state: &AppState, conn: &ClientConnection, session_id: &SessionId, text: &str) {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(error) => {
            let err = ClientError::new(ErrorCode::InvalidMessageFormat, error.to_string());
            let _ = conn.send_message(&ServerMessage::error(&err, Some(session_id.as_str())));
            return;
        }
    };

    match &message {
        ClientMessage::Speech(speech) => {
            if let Err(err) = state.engine.submit_speech(speech).await {
                debug!(debate_id = %speech.debate_id, speaker = %speech.speaker, code = %err.code, "speech rejected");
                let _ = conn.send_message(&ServerMessage::error(&err, Some(&speech.debate_id)));
            }
        }
        ClientMessage::Pong => conn.record_pong(),
        ClientMessage::Ping => {
            let _ = conn.send_message(&ServerMessage::Pong(Heartbeat::now()));
        }
        ClientMessage::Login(_) | ClientMessage::Subscribe(_) => {
            let err = ClientError::new(
                ErrorCode::InvalidMessageType,
                format!("Unexpected message type: {}", message.kind()),
            )
            .recoverable(true);
            let _ = conn.send_message(&ServerMessage::error(&err, Some(session_id.as_str())));
        }
        ClientMessage::Unknown(kind) => {
            debug!(conn_id = %conn.id, kind = %kind, "ignoring unknown message type");
        }
    }
}
