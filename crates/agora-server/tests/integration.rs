//! End-to-end tests over real sockets: the server is bound to port 0 and
//! driven with tokio-tungstenite and reqwest.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use agora_engine::{DebateEngine, EngineConfig};
use agora_server::{ServerConfig, ServerHandle};
use agora_store::Database;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    handle: ServerHandle,
    http: reqwest::Client,
}

impl Harness {
    async fn boot() -> Self {
        let engine_config = EngineConfig {
            start_delay: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let engine = DebateEngine::new(Database::in_memory().unwrap(), None, engine_config);
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_timeout: Duration::from_secs(2),
            ..ServerConfig::default()
        };
        let handle = agora_server::start(config, engine, None).await.unwrap();
        Self {
            handle,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.handle.port())
    }

    async fn connect(&self, path: &str) -> Ws {
        let url = format!("ws://127.0.0.1:{}{path}", self.handle.port());
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        ws
    }

    async fn create(&self, topic: &str, rounds: i64) -> String {
        let resp = self
            .http
            .post(self.url("/api/debate/create"))
            .json(&json!({ "topic": topic, "total_rounds": rounds }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["debate_id"].as_str().unwrap().to_string()
    }
}

async fn send(ws: &mut Ws, kind: &str, data: Value) {
    let frame = json!({ "type": kind, "data": data }).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

/// Next JSON frame, or `None` once the server closed the socket.
async fn recv(ws: &mut Ws) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame");
        match message {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => {}
        }
    }
}

/// Skip frames until one of `kind` arrives.
async fn recv_type(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let frame = recv(ws).await.unwrap_or_else(|| panic!("socket closed before {kind}"));
        if frame["type"] == kind {
            return frame;
        }
    }
}

struct Bot {
    ws: Ws,
    identifier: String,
    key: String,
}

async fn login(h: &Harness, name: &str, uuid: &str, debate_id: &str) -> Bot {
    let mut ws = h.connect("/debate").await;
    send(
        &mut ws,
        "login",
        json!({ "bot_name": name, "bot_uuid": uuid, "debate_id": debate_id }),
    )
    .await;
    let confirmed = recv_type(&mut ws, "login_confirmed").await;
    assert_eq!(confirmed["data"]["debate_id"], debate_id);
    Bot {
        ws,
        identifier: confirmed["data"]["bot_identifier"].as_str().unwrap().to_string(),
        key: confirmed["data"]["debate_key"].as_str().unwrap().to_string(),
    }
}

fn speech(debate_id: &str, bot: &Bot, text: &str) -> Value {
    json!({
        "debate_id": debate_id,
        "debate_key": bot.key,
        "speaker": bot.identifier,
        "message": { "format": "markdown", "content": text },
    })
}

const ARGUMENT: &str =
    "This argument is deliberately long enough to clear the minimum content length check.";

/// Two bots joined and started; returns them as (first speaker, second).
async fn started(h: &Harness, debate_id: &str) -> (Bot, Bot) {
    let mut a = login(h, "alpha", "aaaa1111-0000", debate_id).await;
    let mut b = login(h, "beta", "bbbb2222-0000", debate_id).await;
    let start_a = recv_type(&mut a.ws, "debate_start").await;
    let start_b = recv_type(&mut b.ws, "debate_start").await;
    assert_eq!(start_a["data"]["next_speaker"], start_b["data"]["next_speaker"]);
    assert_ne!(start_a["data"]["your_side"], start_b["data"]["your_side"]);

    if start_a["data"]["next_speaker"] == a.identifier.as_str() {
        (a, b)
    } else {
        (b, a)
    }
}

#[tokio::test]
async fn full_debate_over_websockets() {
    let h = Harness::boot().await;
    let debate_id = h.create("Cats are better than dogs", 1).await;
    let (mut first, mut second) = started(&h, &debate_id).await;

    let mut observer = h.connect("/frontend").await;
    send(&mut observer, "subscribe_debate", json!({ "debate_id": debate_id })).await;
    let snapshot = recv(&mut observer).await.unwrap();
    assert_eq!(snapshot["type"], "debate_update");
    assert_eq!(snapshot["data"]["current_round"], 1);

    let msg = speech(&debate_id, &first, ARGUMENT);

    send(&mut first.ws, "debate_speech", msg).await;
    let update = recv_type(&mut second.ws, "debate_update").await;
    assert_eq!(update["data"]["next_speaker"], second.identifier.as_str());
    assert_eq!(update["data"]["debate_log"].as_array().unwrap().len(), 1);

    let msg = speech(&debate_id, &second, ARGUMENT);

    send(&mut second.ws, "debate_speech", msg).await;

    for ws in [&mut first.ws, &mut second.ws, &mut observer] {
        let end = recv_type(ws, "debate_end").await;
        assert_eq!(end["data"]["status"], "completed");
        assert_eq!(end["data"]["debate_result"]["reason"], "completed");
        assert_eq!(end["data"]["debate_log"].as_array().unwrap().len(), 2);
    }

    // Participants are disconnected after the end frame.
    assert!(recv(&mut first.ws).await.is_none());

    let detail: Value = h
        .http
        .get(h.url(&format!("/api/debate/{debate_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["debate"]["status"], "completed");
    assert_eq!(detail["bots"].as_array().unwrap().len(), 2);
    assert_eq!(detail["debate_log"].as_array().unwrap().len(), 2);
    assert!(detail["result"]["winner"].is_string());

    let _ = h.handle.shutdown().await;
}

#[tokio::test]
async fn speech_errors_go_to_sender_only() {
    let h = Harness::boot().await;
    let debate_id = h.create("Tabs versus spaces", 2).await;
    let (mut first, mut second) = started(&h, &debate_id).await;

    let msg = speech(&debate_id, &second, ARGUMENT);

    send(&mut second.ws, "debate_speech", msg).await;
    let err = recv_type(&mut second.ws, "error").await;
    assert_eq!(err["data"]["error_code"], "NOT_YOUR_TURN");
    assert_eq!(err["data"]["recoverable"], true);
    assert_eq!(err["data"]["debate_id"], debate_id.as_str());

    let msg = speech(&debate_id, &first, "too short");

    send(&mut first.ws, "debate_speech", msg).await;
    let err = recv_type(&mut first.ws, "error").await;
    assert_eq!(err["data"]["error_code"], "CONTENT_TOO_SHORT");

    send(&mut first.ws, "not json at all", json!({})).await;
    send(&mut first.ws, "ping", json!({})).await;
    let pong = recv_type(&mut first.ws, "pong").await;
    assert!(pong["data"]["server_time"].is_string());

    let _ = h.handle.shutdown().await;
}

#[tokio::test]
async fn dropped_participant_ends_active_debate() {
    let h = Harness::boot().await;
    let debate_id = h.create("Remote work", 3).await;
    let (first, mut second) = started(&h, &debate_id).await;
    let gone = first.identifier.clone();

    drop(first);

    let end = recv_type(&mut second.ws, "debate_end").await;
    assert_eq!(end["data"]["status"], "timeout");
    assert_eq!(
        end["data"]["debate_result"]["reason"],
        format!("connection_lost_{gone}")
    );

    let _ = h.handle.shutdown().await;
}

#[tokio::test]
async fn login_refusals_close_the_socket() {
    let h = Harness::boot().await;

    let mut ws = h.connect("/debate").await;
    send(&mut ws, "ping", json!({})).await;
    let err = recv(&mut ws).await.unwrap();
    assert_eq!(err["type"], "error");
    assert_eq!(err["data"]["error_code"], "INVALID_MESSAGE_TYPE");
    assert_eq!(err["data"]["recoverable"], false);
    assert!(recv(&mut ws).await.is_none());

    let mut ws = h.connect("/debate").await;
    send(&mut ws, "login", json!({ "bot_name": "", "bot_uuid": "x" })).await;
    let err = recv(&mut ws).await.unwrap();
    assert_eq!(err["data"]["error_code"], "INVALID_MESSAGE_FORMAT");

    let mut ws = h.connect("/debate").await;
    send(&mut ws, "bot_login", json!({ "bot_name": "gamma", "bot_uuid": "c0ffee00" })).await;
    let rejected = recv(&mut ws).await.unwrap();
    assert_eq!(rejected["type"], "login_rejected");
    assert_eq!(rejected["data"]["reason"], "no_available_debate");
    assert!(recv(&mut ws).await.is_none());

    let mut ws = h.connect("/debate").await;
    send(
        &mut ws,
        "login",
        json!({ "bot_name": "gamma", "bot_uuid": "c0ffee00", "debate_id": "debate_missing" }),
    )
    .await;
    let rejected = recv(&mut ws).await.unwrap();
    assert_eq!(rejected["data"]["reason"], "debate_not_found");

    let _ = h.handle.shutdown().await;
}

#[tokio::test]
async fn observer_of_unknown_and_waiting_sessions() {
    let h = Harness::boot().await;
    let mut observer = h.connect("/frontend").await;

    send(&mut observer, "subscribe_debate", json!({ "debate_id": "debate_missing" })).await;
    let err = recv(&mut observer).await.unwrap();
    assert_eq!(err["data"]["error_code"], "DEBATE_NOT_FOUND");
    assert_eq!(err["data"]["recoverable"], true);

    let debate_id = h.create("Pineapple on pizza", 2).await;
    send(&mut observer, "subscribe_debate", json!({ "debate_id": debate_id })).await;
    let waiting = recv(&mut observer).await.unwrap();
    assert_eq!(waiting["type"], "debate_waiting");
    assert_eq!(waiting["data"]["status"], "waiting");
    assert_eq!(waiting["data"]["joined_bots"], json!([]));

    let _bot = login(&h, "alpha", "aaaa1111-0000", &debate_id).await;
    let joined = recv_type(&mut observer, "debate_waiting").await;
    assert_eq!(joined["data"]["joined_bots"], json!(["alpha-aaaa1111"]));

    send(&mut observer, "ping", json!({})).await;
    recv_type(&mut observer, "pong").await;

    let _ = h.handle.shutdown().await;
}

#[tokio::test]
async fn admin_routes() {
    let h = Harness::boot().await;

    let resp = h
        .http
        .post(h.url("/api/debate/create"))
        .json(&json!({ "topic": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = h
        .http
        .post(h.url("/api/debate/create"))
        .json(&json!({ "topic": "Space exploration", "total_rounds": 0 }))
        .send()
        .await
        .unwrap();
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["total_rounds"], 5);
    assert_eq!(created["status"], "waiting");

    let listed: Value = h
        .http
        .get(h.url("/api/debates?status=waiting"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], created["debate_id"]);

    let none: Value = h
        .http
        .get(h.url("/api/debates?status=completed"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(none.as_array().unwrap().is_empty());

    let resp = h.http.get(h.url("/api/debates?status=bogus")).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = h.http.get(h.url("/api/debate/debate_missing")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let health: Value = h.http.get(h.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let _ = h.handle.shutdown().await;
}
