//! Reconciliation engine.
//!
//! Owns the [`TicketStore`] and [`BadgeTracker`] and applies the snapshot and
//! stream events to them, one at a time, in the order they are handed in.
//! Consumers only ever get [`TicketView`] copies back.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::badges::{BadgeTracker, DEFAULT_BADGE_EXPIRY};
use super::normalize::{normalize, normalize_all};
use super::store::TicketStore;
use crate::models::{BadgeState, CategoryCounts, TicketView};
use crate::notify::{NotificationPermission, NotificationRequest, Notifier};
use crate::{Error, Result};

/// Envelope type of a newly created ticket.
pub const TICKET_CREATED: &str = "TICKET_CREATED";
/// Envelope type of a changed ticket.
pub const TICKET_UPDATED: &str = "TICKET_UPDATED";

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long NEW/UPDATED badges stay visible
    pub badge_expiry: Duration,
    /// Whether notification requests reach the notifier
    pub permission: NotificationPermission,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            badge_expiry: DEFAULT_BADGE_EXPIRY,
            permission: NotificationPermission::Default,
        }
    }
}

/// Discriminator of a stream envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    TicketCreated,
    TicketUpdated,
    /// Anything this build does not know about
    Unknown(String),
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            TICKET_CREATED => EventKind::TicketCreated,
            TICKET_UPDATED => EventKind::TicketUpdated,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TicketCreated => TICKET_CREATED,
            EventKind::TicketUpdated => TICKET_UPDATED,
            EventKind::Unknown(s) => s,
        }
    }
}

/// What reconciling one event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// A ticket the store had never seen
    Created {
        id: String,
        notification: NotificationRequest,
    },
    /// An existing ticket changed
    Updated {
        id: String,
        notification: NotificationRequest,
    },
    /// A second TICKET_CREATED for a known id, applied as an update
    Redelivered {
        id: String,
        notification: NotificationRequest,
    },
    /// Unknown event type or an engine that has shut down
    Ignored { kind: String },
}

impl EventOutcome {
    /// Id of the ticket the event touched.
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            EventOutcome::Created { id, .. }
            | EventOutcome::Updated { id, .. }
            | EventOutcome::Redelivered { id, .. } => Some(id),
            EventOutcome::Ignored { .. } => None,
        }
    }

    /// Notification request produced by the event, if any.
    pub fn notification(&self) -> Option<&NotificationRequest> {
        match self {
            EventOutcome::Created { notification, .. }
            | EventOutcome::Updated { notification, .. }
            | EventOutcome::Redelivered { notification, .. } => Some(notification),
            EventOutcome::Ignored { .. } => None,
        }
    }
}

/// Running totals, for status lines and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub events_applied: u64,
    pub events_ignored: u64,
    pub events_dropped: u64,
    pub snapshot_rows_dropped: u64,
}

/// Single owner of the ticket collection and its badges.
pub struct SyncEngine {
    store: TicketStore,
    badges: BadgeTracker,
    notifier: Box<dyn Notifier>,
    permission: NotificationPermission,
    loading: bool,
    shut_down: bool,
    stats: EngineStats,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("tickets", &self.store.len())
            .field("loading", &self.loading)
            .field("shut_down", &self.shut_down)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(config: EngineConfig, notifier: Box<dyn Notifier>) -> Self {
        Self {
            store: TicketStore::new(),
            badges: BadgeTracker::new(config.badge_expiry),
            notifier,
            permission: config.permission,
            loading: true,
            shut_down: false,
            stats: EngineStats::default(),
        }
    }

    /// True until the first snapshot outcome has been applied.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Seed the store from a snapshot fetch. Loading ends whatever the outcome.
    ///
    /// Returns the number of tickets seeded. On failure the store is left as it
    /// was (empty at startup) and the error is logged.
    pub fn apply_snapshot(&mut self, snapshot: Result<Vec<Value>>) -> usize {
        self.loading = false;
        if self.shut_down {
            return 0;
        }

        let rows = match snapshot {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("snapshot fetch failed: {}", e);
                return 0;
            }
        };

        let (tickets, errors) = normalize_all(&rows);
        for e in &errors {
            tracing::warn!("dropping snapshot row: {}", e);
        }
        self.stats.snapshot_rows_dropped += errors.len() as u64;

        self.store.seed(tickets);
        let seeded = self.store.len();
        tracing::info!(tickets = seeded, "snapshot applied");
        seeded
    }

    /// Apply one raw stream message (JSON text of an envelope).
    pub fn handle_message(&mut self, text: &str) -> Result<EventOutcome> {
        self.handle_message_at(text, Instant::now())
    }

    /// [`Self::handle_message`] with an explicit clock reading.
    pub fn handle_message_at(&mut self, text: &str, now: Instant) -> Result<EventOutcome> {
        match serde_json::from_str::<Value>(text) {
            Ok(envelope) => self.handle_envelope_at(envelope, now),
            Err(e) => self.drop_event(Error::MalformedEvent(format!("invalid JSON: {}", e))),
        }
    }

    /// Apply one parsed envelope `{type, data}`.
    pub fn handle_envelope(&mut self, envelope: Value) -> Result<EventOutcome> {
        self.handle_envelope_at(envelope, Instant::now())
    }

    /// [`Self::handle_envelope`] with an explicit clock reading.
    pub fn handle_envelope_at(&mut self, envelope: Value, now: Instant) -> Result<EventOutcome> {
        let (kind, data) = match split_envelope(envelope) {
            Ok(parts) => parts,
            Err(e) => return self.drop_event(e),
        };

        if self.shut_down {
            tracing::debug!(kind = kind.as_str(), "engine shut down, ignoring event");
            self.stats.events_ignored += 1;
            return Ok(EventOutcome::Ignored {
                kind: kind.as_str().to_string(),
            });
        }

        if let EventKind::Unknown(kind) = kind {
            tracing::debug!(kind = %kind, "ignoring unknown event type");
            self.stats.events_ignored += 1;
            return Ok(EventOutcome::Ignored { kind });
        }

        let ticket = match normalize(&data) {
            Ok(ticket) => ticket,
            Err(e) => return self.drop_event(e),
        };
        let id = ticket.id.clone();
        let created_request = NotificationRequest::created(&ticket);
        let updated_request = NotificationRequest::updated(&ticket);

        let upsert = self.store.upsert_to_front(ticket);
        let outcome = match kind {
            EventKind::TicketCreated if upsert.created => {
                self.badges.mark_new(&id, now);
                EventOutcome::Created {
                    id,
                    notification: created_request,
                }
            }
            EventKind::TicketCreated => {
                tracing::debug!(ticket = %id, "duplicate create, applying as update");
                self.badges.mark_updated(&id, now);
                EventOutcome::Redelivered {
                    id,
                    notification: updated_request,
                }
            }
            _ => {
                self.badges.mark_updated(&id, now);
                EventOutcome::Updated {
                    id,
                    notification: updated_request,
                }
            }
        };

        if let Some(request) = outcome.notification() {
            self.dispatch(request);
        }
        self.stats.events_applied += 1;
        tracing::debug!(outcome = ?outcome, "event reconciled");
        Ok(outcome)
    }

    fn drop_event(&mut self, error: Error) -> Result<EventOutcome> {
        tracing::warn!("dropping malformed event: {}", error);
        self.stats.events_dropped += 1;
        Err(error)
    }

    fn dispatch(&self, request: &NotificationRequest) {
        if self.permission.is_granted() {
            self.notifier.dispatch(request);
        }
    }

    /// Current tickets with their badges, most recent first.
    pub fn view(&self) -> Vec<TicketView> {
        self.view_at(Instant::now())
    }

    /// [`Self::view`] with an explicit clock reading.
    pub fn view_at(&self, now: Instant) -> Vec<TicketView> {
        self.store
            .all()
            .iter()
            .map(|ticket| TicketView {
                ticket: ticket.clone(),
                badge: self.badges.state_at(&ticket.id, now),
            })
            .collect()
    }

    /// One ticket with its badge.
    pub fn ticket(&self, id: &str) -> Option<TicketView> {
        let now = Instant::now();
        self.store.get(id).map(|ticket| TicketView {
            ticket: ticket.clone(),
            badge: self.badges.state_at(id, now),
        })
    }

    /// Ids in display order.
    pub fn ids(&self) -> Vec<String> {
        self.store.ids().map(str::to_string).collect()
    }

    pub fn badge_at(&self, id: &str, now: Instant) -> BadgeState {
        self.badges.state_at(id, now)
    }

    pub fn badge_of(&self, id: &str) -> BadgeState {
        self.badges.state_of(id)
    }

    /// Whether `id` shows NEW but has also been updated since.
    pub fn has_pending_update(&self, id: &str, now: Instant) -> bool {
        self.badges.has_pending_update(id, now)
    }

    /// Number of tickets with a visible badge.
    pub fn unread_count(&self) -> usize {
        self.unread_count_at(Instant::now())
    }

    pub fn unread_count_at(&self, now: Instant) -> usize {
        self.badges.active_count(now)
    }

    pub fn category_counts(&self) -> CategoryCounts {
        CategoryCounts::tally(self.store.all())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Clear one ticket's badge.
    pub fn dismiss(&mut self, id: &str) -> bool {
        self.badges.dismiss(id)
    }

    /// Clear the badges of the given ids.
    pub fn dismiss_ids(&mut self, ids: &HashSet<String>) -> usize {
        self.badges.dismiss_all(ids.iter().map(String::as_str))
    }

    /// Clear the badge of every ticket in the store ("mark all read").
    pub fn dismiss_all(&mut self) -> usize {
        let removed = self.badges.dismiss_all(self.store.ids());
        tracing::debug!(removed, "dismissed all badges");
        removed
    }

    /// Sweep badges whose deadline has passed. Returns the expired ids.
    pub fn expire_badges(&mut self, now: Instant) -> Vec<String> {
        self.badges.expire(now)
    }

    /// When the next badge expires, if any is pending.
    pub fn next_badge_deadline(&self) -> Option<Instant> {
        self.badges.next_deadline()
    }

    /// Cancel every pending badge timer and stop accepting events.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.badges.clear();
        self.shut_down = true;
        self.loading = false;
        tracing::info!(stats = ?self.stats, "sync engine shut down");
    }
}

/// Split an envelope into its kind and payload.
fn split_envelope(envelope: Value) -> Result<(EventKind, Value)> {
    let Value::Object(mut fields) = envelope else {
        return Err(Error::MalformedEvent(
            "envelope is not a JSON object".to_string(),
        ));
    };

    let kind = match fields.get("type") {
        Some(Value::String(s)) if !s.trim().is_empty() => EventKind::parse(s.trim()),
        Some(_) => {
            return Err(Error::MalformedEvent(
                "envelope type is not a string".to_string(),
            ));
        }
        None => return Err(Error::MalformedEvent("envelope has no type".to_string())),
    };

    let data = fields.remove("data").unwrap_or(Value::Null);
    Ok((kind, data))
}
