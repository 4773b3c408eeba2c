//! Common test utilities for ticketwatch integration tests.
//!
//! Provides `TestEnv` for an isolated config directory and `FakeBackend`, an
//! in-process stand-in for the ticket service: the REST snapshot and detail
//! endpoints plus a WebSocket event stream speaking JSON or STOMP framing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_cmd::Command;
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
pub use tempfile::TempDir;

/// Environment variables the binary reads; cleared so the host can't leak in.
const TW_ENV_VARS: &[&str] = &[
    "TW_API_BASE",
    "TW_STREAM_URL",
    "TW_STREAM_PROTOCOL",
    "TW_TOPIC",
    "TW_NOTIFICATIONS",
    "TW_LOG",
    "TW_CONFIG_DIR",
];

/// A test environment with an isolated config directory.
pub struct TestEnv {
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the tw binary with an isolated config directory.
    pub fn tw(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tw"));
        for var in TW_ENV_VARS {
            cmd.env_remove(var);
        }
        cmd.env("TW_CONFIG_DIR", self.config_dir.path());
        cmd.timeout(Duration::from_secs(30));
        cmd
    }

    /// Get a Command already pointed at `backend`.
    pub fn tw_against(&self, backend: &FakeBackend) -> Command {
        let mut cmd = self.tw();
        cmd.args([
            "--api-base",
            &backend.api_base(),
            "--stream-url",
            &backend.stream_url(),
            "--protocol",
            backend.protocol.as_str(),
        ]);
        cmd
    }

    pub fn config_file(&self) -> std::path::PathBuf {
        self.config_dir.path().join("config.kdl")
    }
}

/// Parse stdout as one JSON value per line.
pub fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad JSON line {l:?}: {e}")))
        .collect()
}

/// Framing spoken by the fake event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Json,
    Stomp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Json => "json",
            Protocol::Stomp => "stomp",
        }
    }
}

/// What the fake backend serves.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub protocol: Protocol,
    pub tickets: Vec<Value>,
    /// Envelopes pushed to every stream connection after subscription
    pub events: Vec<Value>,
    /// Status for the snapshot endpoint; anything but 200 fails the fetch
    pub snapshot_status: StatusCode,
    /// Delay before the snapshot responds
    pub snapshot_delay: Duration,
}

impl BackendConfig {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            tickets: sample_tickets(),
            events: Vec::new(),
            snapshot_status: StatusCode::OK,
            snapshot_delay: Duration::ZERO,
        }
    }

    pub fn with_events(mut self, events: Vec<Value>) -> Self {
        self.events = events;
        self
    }

    pub fn with_snapshot_status(mut self, status: StatusCode) -> Self {
        self.snapshot_status = status;
        self
    }

    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = delay;
        self
    }
}

struct BackendState {
    config: BackendConfig,
    /// Text frames received from stream clients
    received: Mutex<Vec<String>>,
}

impl BackendState {
    fn record(&self, text: &str) {
        self.received.lock().unwrap().push(text.to_string());
    }
}

/// A running fake backend on 127.0.0.1.
pub struct FakeBackend {
    pub addr: SocketAddr,
    pub protocol: Protocol,
    state: Arc<BackendState>,
}

impl FakeBackend {
    /// Serve `config` from a background thread with its own runtime.
    pub fn start(config: BackendConfig) -> Self {
        let protocol = config.protocol;
        let state = Arc::new(BackendState {
            config,
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/tickets", get(list_tickets))
            .route("/api/tickets/:id", get(get_ticket))
            .route("/ws", get(stream))
            .with_state(state.clone());

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self {
            addr,
            protocol,
            state,
        }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn stream_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Text frames the stream has received so far.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }

    /// Wait until a received frame starts with `command`.
    pub fn wait_for_frame(&self, command: &str, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.received().iter().any(|f| f.starts_with(command)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

async fn list_tickets(State(state): State<Arc<BackendState>>) -> Response {
    tokio::time::sleep(state.config.snapshot_delay).await;
    if state.config.snapshot_status != StatusCode::OK {
        return (state.config.snapshot_status, "snapshot unavailable").into_response();
    }
    Json(Value::Array(state.config.tickets.clone())).into_response()
}

async fn get_ticket(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
) -> Response {
    match state
        .config
        .tickets
        .iter()
        .find(|t| t["id"].as_str() == Some(id.as_str()))
    {
        Some(ticket) => Json(ticket.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no such ticket").into_response(),
    }
}

async fn stream(ws: WebSocketUpgrade, State(state): State<Arc<BackendState>>) -> Response {
    ws.on_upgrade(move |socket| serve_stream(socket, state))
}

async fn serve_stream(mut socket: WebSocket, state: Arc<BackendState>) {
    let events = state.config.events.clone();
    match state.config.protocol {
        Protocol::Json => {
            for event in events {
                if socket.send(Message::Text(event.to_string())).await.is_err() {
                    return;
                }
            }
        }
        Protocol::Stomp => {
            if !expect_frame(&mut socket, &state, "CONNECT").await {
                return;
            }
            let connected = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0".to_string();
            if socket.send(Message::Text(connected)).await.is_err() {
                return;
            }
            if !expect_frame(&mut socket, &state, "SUBSCRIBE").await {
                return;
            }
            for (i, event) in events.into_iter().enumerate() {
                if socket.send(Message::Text(stomp_message(i, &event))).await.is_err() {
                    return;
                }
            }
        }
    }

    // Hold the connection open until the client leaves.
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => state.record(&text),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

async fn expect_frame(socket: &mut WebSocket, state: &BackendState, command: &str) -> bool {
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            state.record(&text);
            return text.starts_with(command);
        }
    }
    false
}

fn stomp_message(index: usize, event: &Value) -> String {
    let body = event.to_string();
    format!(
        "MESSAGE\ndestination:/topic/tickets\nsubscription:sub-0\nmessage-id:{}\ncontent-type:application/json\ncontent-length:{}\n\n{}\0",
        index,
        body.len(),
        body
    )
}

/// Three tickets in snapshot order (most recent first).
pub fn sample_tickets() -> Vec<Value> {
    vec![
        json!({
            "id": "t-100",
            "title": "Checkout button does nothing",
            "category": "BUG",
            "customerName": "Ada Lovelace",
            "updatedAt": "2024-03-01T12:00:00Z",
            "messages": [
                {"sender": "ada", "content": "still broken", "timestamp": "2024-03-01T12:00:00Z"},
                {"sender": "ada", "content": "clicking checkout does nothing", "timestamp": "2024-03-01T11:00:00Z"}
            ]
        }),
        json!({
            "id": "t-101",
            "title": "Dark mode please",
            "category": "FEATURE_REQUEST",
            "customerName": "Grace Hopper",
            "updatedAt": "2024-03-01T10:00:00Z",
            "messageCount": 4
        }),
        json!({
            "id": "t-102",
            "title": "",
            "category": "QUESTION",
            "createdAt": "2024-03-01T09:00:00Z"
        }),
    ]
}

/// A TICKET_CREATED envelope.
pub fn created(id: &str, title: &str) -> Value {
    json!({"type": "TICKET_CREATED", "data": {"id": id, "title": title, "category": "SUPPORT"}})
}

/// A TICKET_UPDATED envelope.
pub fn updated(id: &str, title: &str) -> Value {
    json!({"type": "TICKET_UPDATED", "data": {"id": id, "title": title}})
}
