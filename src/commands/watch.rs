//! `tw watch` - a headless live session.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::Output;
use crate::Result;
use crate::config::ResolvedConfig;
use crate::session::{SessionUpdate, SyncSession};
use crate::sync::engine::{EngineStats, EventOutcome, SyncEngine};

/// Stop conditions for a watch run.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Stop after this many stream events have been reconciled
    pub max_events: Option<u64>,
    /// Stop after this long
    pub duration: Option<Duration>,
}

/// One printed line: an applied update plus the dashboard totals after it.
#[derive(Debug, Clone)]
pub struct WatchLine {
    pub at: DateTime<Utc>,
    pub update: SessionUpdate,
    pub total: usize,
    pub unread: usize,
    /// Display title of the ticket an event touched
    pub title: Option<String>,
}

impl WatchLine {
    pub fn new(update: SessionUpdate, engine: &SyncEngine) -> Self {
        let title = match &update {
            SessionUpdate::Event(outcome) => outcome
                .ticket_id()
                .and_then(|id| engine.ticket(id))
                .map(|view| view.ticket.display_title().to_string()),
            _ => None,
        };
        Self {
            at: Utc::now(),
            update,
            total: engine.len(),
            unread: engine.unread_count(),
            title,
        }
    }

    fn to_value(&self) -> Value {
        let mut value = match &self.update {
            SessionUpdate::Snapshot { seeded, error } => {
                json!({"type": "snapshot", "seeded": seeded, "error": error})
            }
            SessionUpdate::Event(outcome) => {
                let mut value = serde_json::to_value(outcome).unwrap_or_default();
                if let Value::Object(map) = &mut value {
                    map.insert("type".to_string(), json!("event"));
                    map.insert("title".to_string(), json!(self.title));
                }
                value
            }
            SessionUpdate::EventDropped { error } => {
                json!({"type": "event_dropped", "error": error})
            }
            SessionUpdate::Connection(state) => json!({
                "type": "connection",
                "state": state.label(),
                "connected": state.is_connected(),
            }),
            SessionUpdate::BadgesExpired(ids) => json!({"type": "badges_expired", "ids": ids}),
            SessionUpdate::Closed => json!({"type": "closed"}),
        };
        if let Value::Object(map) = &mut value {
            map.insert("at".to_string(), json!(self.at.to_rfc3339()));
            map.insert("total".to_string(), json!(self.total));
            map.insert("unread".to_string(), json!(self.unread));
        }
        value
    }
}

impl Output for WatchLine {
    fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    fn to_human(&self) -> String {
        let time = self.at.format("%H:%M:%S");
        let text = match &self.update {
            SessionUpdate::Snapshot { seeded, error: None } => {
                format!("loaded {} ticket(s)", seeded)
            }
            SessionUpdate::Snapshot {
                error: Some(error), ..
            } => format!("snapshot failed: {}", error),
            SessionUpdate::Event(outcome) => {
                let title = self.title.as_deref().unwrap_or_default();
                match outcome {
                    EventOutcome::Created { id, .. } => format!("NEW      {}  {}", short(id), title),
                    EventOutcome::Updated { id, .. } => format!("UPDATED  {}  {}", short(id), title),
                    EventOutcome::Redelivered { id, .. } => {
                        format!("UPDATED  {}  {} (redelivered)", short(id), title)
                    }
                    EventOutcome::Ignored { kind } => format!("ignored event {}", kind),
                }
            }
            SessionUpdate::EventDropped { error } => format!("dropped event: {}", error),
            SessionUpdate::Connection(state) => state.label(),
            SessionUpdate::BadgesExpired(ids) => format!("{} badge(s) expired", ids.len()),
            SessionUpdate::Closed => "session closed".to_string(),
        };
        format!(
            "[{}] {}  ({} tickets, {} unread)",
            time, text, self.total, self.unread
        )
    }
}

/// Totals printed when a watch run ends.
#[derive(Debug, Serialize)]
pub struct WatchSummary {
    pub events: u64,
    pub tickets: usize,
    pub unread: usize,
    pub stats: EngineStats,
    /// Why the run stopped
    pub reason: String,
}

impl Output for WatchSummary {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        format!(
            "Stopped ({}): {} event(s) applied, {} ignored, {} dropped; {} ticket(s), {} unread",
            self.reason,
            self.stats.events_applied,
            self.stats.events_ignored,
            self.stats.events_dropped,
            self.tickets,
            self.unread
        )
    }
}

/// Run a session until Ctrl-C, the event limit, the time limit, or until it
/// closes on its own. Every applied update is passed to `emit`.
pub async fn watch(
    config: &ResolvedConfig,
    options: WatchOptions,
    emit: impl FnMut(&WatchLine),
) -> Result<WatchSummary> {
    let notifier = super::notifier_for(config.notifications.value);
    let session = SyncSession::start(config.session_config(), notifier)?;
    run(session, options, tokio::signal::ctrl_c(), emit).await
}

async fn run(
    mut session: SyncSession,
    options: WatchOptions,
    interrupt: impl Future,
    mut emit: impl FnMut(&WatchLine),
) -> Result<WatchSummary> {
    let deadline = options.duration.map(|d| Instant::now() + d);
    let mut events = 0u64;
    tokio::pin!(interrupt);

    let reason = loop {
        let update = tokio::select! {
            biased;

            _ = &mut interrupt => break "interrupted",
            _ = sleep_until(deadline) => break "duration elapsed",
            update = session.next_update() => update,
        };

        if matches!(update, SessionUpdate::Event(_)) {
            events += 1;
        }
        let closed = update == SessionUpdate::Closed;
        emit(&WatchLine::new(update, session.engine()));

        if closed {
            break "session closed";
        }
        if options.max_events.is_some_and(|max| events >= max) {
            break "event limit reached";
        }
    };

    tracing::info!(reason, events, "watch finished");
    let summary = WatchSummary {
        events,
        tickets: session.engine().len(),
        unread: session.engine().unread_count(),
        stats: session.engine().stats(),
        reason: reason.to_string(),
    };
    session.shutdown().await;
    Ok(summary)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn short(id: &str) -> String {
    id.chars().take(8).collect()
}
