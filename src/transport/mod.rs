//! Event-stream transport.
//!
//! [`StreamClient`] holds a WebSocket subscription to the ticket topic and
//! forwards every delivered envelope, in delivery order, as a
//! [`TransportEvent`] over an mpsc channel. It also reports its own lifecycle
//! on the same channel so the consumer sees connects, messages and
//! disconnects in the order they happened.
//!
//! # Protocols
//!
//! - `stomp`: STOMP 1.2 over WebSocket. CONNECT, wait for CONNECTED, SUBSCRIBE
//!   to the topic; each MESSAGE body is one envelope. UNSUBSCRIBE and
//!   DISCONNECT on shutdown.
//! - `json`: every text frame is one envelope.
//!
//! Events missed while disconnected are not replayed.

pub mod stomp;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::sync::connection::{MAX_RECONNECT_ATTEMPTS, calculate_backoff};
use crate::{Error, Result};
use stomp::Frame;

/// Type alias for the WebSocket stream type.
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Subscription id used for the single topic subscription.
const SUBSCRIPTION_ID: &str = "sub-0";

/// How long the broker has to answer CONNECT.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the event channel handed to the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Framing spoken on the WebSocket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    #[default]
    Stomp,
    Json,
}

impl StreamProtocol {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stomp" => Some(StreamProtocol::Stomp),
            "json" => Some(StreamProtocol::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Stomp => "stomp",
            StreamProtocol::Json => "json",
        }
    }
}

impl std::fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the transport reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Opening the socket; attempt 1 is the initial connect
    Connecting { attempt: u32 },
    /// Subscribed to the topic
    Connected,
    /// Raw envelope text, in delivery order
    Message(String),
    /// Connection lost or closed; `None` for a requested shutdown
    Disconnected { reason: Option<String> },
}

/// Stream client settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub protocol: StreamProtocol,
    /// STOMP destination to subscribe to
    pub topic: String,
    pub reconnect: bool,
    pub max_reconnect_attempts: u32,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: StreamProtocol::Stomp,
            topic: "/topic/tickets".to_string(),
            reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Handle to a running [`StreamClient`] task.
#[derive(Debug)]
pub struct StreamHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Ask the client to close and wait up to `timeout` for it to finish.
    ///
    /// The task is aborted if it does not finish in time.
    pub async fn shutdown(self, timeout: Duration) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => tracing::debug!("stream client stopped"),
            Err(_) => {
                tracing::warn!("stream client did not stop in {:?}, aborting", timeout);
                task.abort();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a stream client. Returns its handle and the event receiver.
pub fn spawn(config: StreamConfig) -> (StreamHandle, mpsc::Receiver<TransportEvent>) {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let client = StreamClient::new(config, events_tx, shutdown_rx);
    let task = tokio::spawn(client.run());
    (
        StreamHandle {
            shutdown: shutdown_tx,
            task,
        },
        events_rx,
    )
}

/// WebSocket subscriber for the ticket topic.
pub struct StreamClient {
    config: StreamConfig,
    events: mpsc::Sender<TransportEvent>,
    shutdown: watch::Receiver<bool>,
}

/// Why a connection ended.
enum Ended {
    /// Shutdown requested or the consumer went away
    Closed,
    /// The connection failed; `connected` tells whether it got subscribed first
    Failed { error: Error, connected: bool },
}

impl StreamClient {
    pub fn new(
        config: StreamConfig,
        events: mpsc::Sender<TransportEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            events,
            shutdown,
        }
    }

    /// Connect, deliver and reconnect until shut down or out of attempts.
    pub async fn run(mut self) {
        let mut attempt: u32 = 1;
        loop {
            let delay = calculate_backoff(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, "reconnecting in {:?}", delay);
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_for_shutdown(&mut shutdown) => {
                        self.emit(TransportEvent::Disconnected { reason: None }).await;
                        return;
                    }
                }
            }
            if shutdown_requested(&mut self.shutdown) {
                self.emit(TransportEvent::Disconnected { reason: None }).await;
                return;
            }

            if !self.emit(TransportEvent::Connecting { attempt }).await {
                return;
            }

            match self.connect_and_run().await {
                Ended::Closed => {
                    self.emit(TransportEvent::Disconnected { reason: None }).await;
                    tracing::info!("event stream closed");
                    return;
                }
                Ended::Failed { error, connected } => {
                    tracing::warn!("event stream error: {}", error);
                    if !self
                        .emit(TransportEvent::Disconnected {
                            reason: Some(error.to_string()),
                        })
                        .await
                    {
                        return;
                    }
                    // A connection that got through starts the count over
                    attempt = if connected { 2 } else { attempt + 1 };
                    if !self.config.reconnect || attempt > self.config.max_reconnect_attempts {
                        tracing::warn!("giving up on the event stream after {} attempts", attempt - 1);
                        return;
                    }
                }
            }
        }
    }

    /// Send an event to the consumer. False when the consumer is gone.
    async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    async fn connect_and_run(&mut self) -> Ended {
        let mut shutdown = self.shutdown.clone();
        tracing::info!(url = %self.config.url, protocol = %self.config.protocol, "connecting to event stream");

        let connected = tokio::select! {
            result = connect_async(self.config.url.as_str()) => result,
            _ = wait_for_shutdown(&mut shutdown) => return Ended::Closed,
        };
        let ws_stream = match connected {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                return Ended::Failed {
                    error: e.into(),
                    connected: false,
                };
            }
        };
        let (mut write, mut read): (
            futures::stream::SplitSink<WsStream, Message>,
            futures::stream::SplitStream<WsStream>,
        ) = ws_stream.split();

        if self.config.protocol == StreamProtocol::Stomp {
            let handshake = tokio::select! {
                result = self.stomp_handshake(&mut write, &mut read) => result,
                _ = wait_for_shutdown(&mut shutdown) => return Ended::Closed,
            };
            if let Err(error) = handshake {
                return Ended::Failed {
                    error,
                    connected: false,
                };
            }
        }

        tracing::info!("event stream connected");
        if !self.emit(TransportEvent::Connected).await {
            return Ended::Closed;
        }

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    self.close(&mut write).await;
                    return Ended::Closed;
                }

                msg = read.next() => {
                    let result = match msg {
                        Some(Ok(Message::Text(text))) => self.deliver(&text).await,
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                            Ok(text) => self.deliver(&text).await,
                            Err(_) => {
                                tracing::warn!("ignoring non-UTF-8 binary frame");
                                Ok(true)
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await.map(|_| true).map_err(Error::from)
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            Err(Error::Transport("server closed the connection".to_string()))
                        }
                        Some(Err(e)) => Err(Error::from(e)),
                        _ => Ok(true),
                    };
                    match result {
                        Ok(true) => {}
                        Ok(false) => return Ended::Closed,
                        Err(error) => return Ended::Failed { error, connected: true },
                    }
                }
            }
        }
    }

    /// CONNECT, wait for CONNECTED, SUBSCRIBE.
    async fn stomp_handshake(
        &self,
        write: &mut futures::stream::SplitSink<WsStream, Message>,
        read: &mut futures::stream::SplitStream<WsStream>,
    ) -> Result<()> {
        let host = reqwest::Url::parse(&self.config.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        write
            .send(Message::Text(Frame::connect(&host).encode()))
            .await?;

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_for_connected(read)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Stomp(
                    "no CONNECTED frame from the broker".to_string(),
                ));
            }
        }

        write
            .send(Message::Text(
                Frame::subscribe(SUBSCRIPTION_ID, &self.config.topic).encode(),
            ))
            .await?;
        tracing::debug!(topic = %self.config.topic, "subscribed");
        Ok(())
    }

    /// Forward the envelopes in one text frame. Ok(false) when the consumer is gone.
    async fn deliver(&self, text: &str) -> Result<bool> {
        match self.config.protocol {
            StreamProtocol::Json => Ok(self.emit(TransportEvent::Message(text.to_string())).await),
            StreamProtocol::Stomp => {
                for frame in stomp::decode_frames(text)? {
                    match frame.command.as_str() {
                        stomp::MESSAGE => {
                            if !self.emit(TransportEvent::Message(frame.body)).await {
                                return Ok(false);
                            }
                        }
                        stomp::ERROR => return Err(Error::Stomp(frame.error_message())),
                        other => tracing::debug!("ignoring {} frame", other),
                    }
                }
                Ok(true)
            }
        }
    }

    /// Best-effort clean close.
    async fn close(&self, write: &mut futures::stream::SplitSink<WsStream, Message>) {
        if self.config.protocol == StreamProtocol::Stomp {
            for frame in [Frame::unsubscribe(SUBSCRIPTION_ID), Frame::disconnect()] {
                if let Err(e) = write.send(Message::Text(frame.encode())).await {
                    tracing::debug!("failed to send {}: {}", frame.command, e);
                    break;
                }
            }
        }
        let _ = write.send(Message::Close(None)).await;
    }
}

/// Read frames until the broker answers CONNECT.
async fn wait_for_connected(read: &mut futures::stream::SplitStream<WsStream>) -> Result<()> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                for frame in stomp::decode_frames(&text)? {
                    match frame.command.as_str() {
                        stomp::CONNECTED => return Ok(()),
                        stomp::ERROR => return Err(Error::Stomp(frame.error_message())),
                        other => tracing::debug!("ignoring {} before CONNECTED", other),
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(Error::Transport(
                    "connection closed during STOMP handshake".to_string(),
                ));
            }
            Some(Err(e)) => return Err(Error::from(e)),
            Some(Ok(_)) => {}
        }
    }
}

fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) -> bool {
    *shutdown.borrow_and_update()
}

/// Resolve once shutdown is requested or the handle is dropped.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
