//! Observer endpoint (`GET /frontend`).

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::debug;

use agora_core::protocol::{ClientMessage, Heartbeat, ServerMessage};
use agora_core::{ClientError, ErrorCode, SessionId};
use agora_engine::ClientConnection;

use crate::client::{self, Role};
use crate::server::AppState;

pub(crate) async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let tasks = state.shutdown.tasks().clone();
    ws.on_upgrade(move |socket| tasks.track_future(serve(socket, state)))
}

async fn serve(socket: WebSocket, state: AppState) {
    let _guard = state.connections.enter(Role::Observer);
    let (sink, mut stream) = socket.split();
    let (conn, rx) = client::open(state.config.max_send_queue);
    let writer = client::spawn_writer(sink, rx, conn.close_token());
    let shutdown = state.shutdown.token();
    debug!(conn_id = %conn.id, "observer connected");

    let mut watching: Option<SessionId> = None;
    loop {
        tokio::select! {
            frame = client::next_text(&mut stream) => match frame {
                Some(text) => handle_frame(&state, &conn, &mut watching, &text),
                None => break,
            },
            () = conn.closed() => break,
            () = shutdown.cancelled() => break,
        }
    }

    if let Some(id) = watching {
        state.engine.unsubscribe(&id, &conn.id);
    }
    conn.close();
    let _ = writer.await;
    debug!(conn_id = %conn.id, "observer connection closed");
}

fn handle_frame(
    state: &AppState,
    conn: &Arc<ClientConnection>,
    watching: &mut Option<SessionId>,
    text: &str,
) {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(error) => {
            let err = ClientError::new(ErrorCode::InvalidMessageFormat, error.to_string());
            let _ = conn.send_message(&ServerMessage::error(&err, None));
            return;
        }
    };

    match &message {
        ClientMessage::Subscribe(request) => {
            // One session per observer; a new subscribe replaces the old one.
            if let Some(previous) = watching.take() {
                state.engine.unsubscribe(&previous, &conn.id);
            }
            let id = SessionId::from_raw(request.debate_id.as_str());
            match state.engine.subscribe(&id, Arc::clone(conn)) {
                Ok(()) => {
                    debug!(conn_id = %conn.id, debate_id = %id, "observer subscribed");
                    *watching = Some(id);
                }
                Err(err) => {
                    let _ = conn.send_message(&ServerMessage::error(&err, Some(&request.debate_id)));
                }
            }
        }
        ClientMessage::Ping => {
            let _ = conn.send_message(&ServerMessage::Pong(Heartbeat::now()));
        }
        ClientMessage::Pong => conn.record_pong(),
        ClientMessage::Login(_) | ClientMessage::Speech(_) => {
            let err = ClientError::new(
                ErrorCode::InvalidMessageType,
                format!("Unexpected message type: {}", message.kind()),
            )
            .recoverable(true);
            let _ = conn.send_message(&ServerMessage::error(&err, None));
        }
        ClientMessage::Unknown(kind) => {
            debug!(conn_id = %conn.id, kind = %kind, "ignoring unknown message type");
        }
    }
}
