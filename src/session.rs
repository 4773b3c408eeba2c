//! Live sync session.
//!
//! Wires the snapshot fetch, the event stream, the [`SyncEngine`] and the
//! [`ConnectionMonitor`] together on the caller's task. All mutation happens
//! inside [`SyncSession::next_update`], one signal at a time:
//!
//! 1. While the snapshot is loading, connection changes are applied as they
//!    arrive and stream messages are held back in delivery order.
//! 2. After seeding, held messages are reconciled first, then live ones.
//! 3. Badge deadlines wake the session to sweep expired badges.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::{ApiClient, DEFAULT_REQUEST_TIMEOUT};
use crate::models::Ticket;
use crate::notify::Notifier;
use crate::sync::connection::{ConnectionMonitor, ConnectionState};
use crate::sync::engine::{EngineConfig, EventOutcome, SyncEngine};
use crate::transport::{self, StreamConfig, StreamHandle, TransportEvent};
use crate::{Error, Result};

/// How long shutdown waits for the stream client to close.
const STREAM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    pub stream: StreamConfig,
    pub engine: EngineConfig,
}

impl SessionConfig {
    pub fn new(api_base: impl Into<String>, stream: StreamConfig) -> Self {
        Self {
            api_base: api_base.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream,
            engine: EngineConfig::default(),
        }
    }
}

/// One applied signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// The snapshot finished; `error` is set when the fetch failed
    Snapshot {
        seeded: usize,
        error: Option<String>,
    },
    /// A stream event was reconciled
    Event(EventOutcome),
    /// A stream event was malformed and dropped
    EventDropped { error: String },
    /// The connection state changed
    Connection(ConnectionState),
    /// These badges reached their deadline
    BadgesExpired(Vec<String>),
    /// Nothing can produce further updates
    Closed,
}

type SnapshotTask = JoinHandle<Result<Vec<Value>>>;

/// Snapshot + stream + engine, driven from one task.
pub struct SyncSession {
    engine: SyncEngine,
    monitor: ConnectionMonitor,
    api: ApiClient,
    snapshot: Option<SnapshotTask>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    /// Messages received while the snapshot was loading
    held: VecDeque<String>,
    stream: Option<StreamHandle>,
}

impl SyncSession {
    /// Start the snapshot fetch and the stream client.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: SessionConfig, notifier: Box<dyn Notifier>) -> Result<Self> {
        let api = ApiClient::with_timeout(&config.api_base, config.request_timeout)?;
        let engine = SyncEngine::new(config.engine, notifier);

        let fetcher = api.clone();
        let snapshot = tokio::spawn(async move { fetcher.fetch_tickets().await });
        let (stream, events) = transport::spawn(config.stream);

        tracing::info!(api = %config.api_base, "sync session started");
        Ok(Self::from_parts(engine, api, snapshot, events, Some(stream)))
    }

    /// Assemble a session from already running sources.
    pub(crate) fn from_parts(
        engine: SyncEngine,
        api: ApiClient,
        snapshot: SnapshotTask,
        events: mpsc::Receiver<TransportEvent>,
        stream: Option<StreamHandle>,
    ) -> Self {
        Self {
            engine,
            monitor: ConnectionMonitor::new(),
            api,
            snapshot: Some(snapshot),
            events: Some(events),
            held: VecDeque::new(),
            stream,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Mutable engine access for dismissals.
    pub fn engine_mut(&mut self) -> &mut SyncEngine {
        &mut self.engine
    }

    pub fn connection(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn is_loading(&self) -> bool {
        self.engine.is_loading()
    }

    /// The REST client, for callers that fetch details off the session task.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Fetch a ticket's full history from the detail endpoint.
    ///
    /// The result is handed back to the caller; the store keeps the event
    /// stream's version.
    pub async fn fetch_detail(&self, id: &str) -> Result<Ticket> {
        self.api.fetch_ticket(id).await
    }

    /// Wait for and apply the next signal.
    ///
    /// Cancellation safe: every await point is a channel, join handle or
    /// timer poll, and state is only mutated after one of them has completed.
    pub async fn next_update(&mut self) -> SessionUpdate {
        loop {
            let loading = self.snapshot.is_some();
            if !loading {
                if let Some(text) = self.held.pop_front() {
                    return self.apply_message(&text);
                }
            }

            let streaming = self.events.is_some();
            let deadline = self.engine.next_badge_deadline();

            if !loading && !streaming && deadline.is_none() {
                return SessionUpdate::Closed;
            }

            tokio::select! {
                biased;

                result = join_snapshot(&mut self.snapshot), if loading => {
                    self.snapshot = None;
                    let error = result.as_ref().err().map(|e| e.to_string());
                    let seeded = self.engine.apply_snapshot(result);
                    return SessionUpdate::Snapshot { seeded, error };
                }

                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    let expired = self.engine.expire_badges(Instant::now());
                    if !expired.is_empty() {
                        return SessionUpdate::BadgesExpired(expired);
                    }
                }

                event = recv_event(&mut self.events), if streaming => {
                    match event {
                        Some(TransportEvent::Message(text)) if loading => {
                            self.held.push_back(text);
                        }
                        Some(event) => {
                            if let Some(update) = self.apply_transport_event(event) {
                                return update;
                            }
                        }
                        None => {
                            self.events = None;
                            if self.monitor.disconnected(None) {
                                return SessionUpdate::Connection(self.monitor.state().clone());
                            }
                        }
                    }
                }

                else => return SessionUpdate::Closed,
            }
        }
    }

    fn apply_transport_event(&mut self, event: TransportEvent) -> Option<SessionUpdate> {
        let changed = match event {
            TransportEvent::Message(text) => return Some(self.apply_message(&text)),
            TransportEvent::Connecting { attempt } => self.monitor.connecting(attempt),
            TransportEvent::Connected => self.monitor.connected(),
            TransportEvent::Disconnected { reason } => self.monitor.disconnected(reason),
        };
        changed.then(|| SessionUpdate::Connection(self.monitor.state().clone()))
    }

    fn apply_message(&mut self, text: &str) -> SessionUpdate {
        match self.engine.handle_message(text) {
            Ok(outcome) => SessionUpdate::Event(outcome),
            Err(e) => SessionUpdate::EventDropped {
                error: e.to_string(),
            },
        }
    }

    /// Close the stream, cancel the snapshot and every badge timer.
    pub async fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(STREAM_SHUTDOWN_TIMEOUT).await;
        }
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.abort();
        }
        self.events = None;
        self.held.clear();
        self.engine.shutdown();
        self.monitor.reset();
        tracing::info!("sync session shut down");
    }
}

async fn join_snapshot(task: &mut Option<SnapshotTask>) -> Result<Vec<Value>> {
    match task {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::SnapshotFetch(format!("snapshot task failed: {}", e))),
        },
        None => std::future::pending().await,
    }
}

async fn recv_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
