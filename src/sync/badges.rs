//! Badge tracker - transient NEW/UPDATED markers with timed expiry.
//!
//! Each badge carries a deadline instead of an armed callback. The owner of
//! the tracker sleeps until [`BadgeTracker::next_deadline`] and then calls
//! [`BadgeTracker::expire`]; cancelling a timer is just removing its entry, so
//! nothing can fire against state that no longer exists.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::BadgeState;

/// Default time a badge stays visible.
pub const DEFAULT_BADGE_EXPIRY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
struct BadgeEntry {
    state: BadgeState,
    deadline: Instant,
    /// An update arrived while the NEW label was showing
    pending_update: bool,
}

impl BadgeEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

/// Per-ticket badge state with expiry deadlines.
#[derive(Debug)]
pub struct BadgeTracker {
    entries: HashMap<String, BadgeEntry>,
    expiry: Duration,
}

impl Default for BadgeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BADGE_EXPIRY)
    }
}

impl BadgeTracker {
    /// Create a tracker whose badges live for `expiry`.
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            expiry,
        }
    }

    /// Configured badge lifetime.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Show NEW for `id`, (re)starting its expiry timer.
    pub fn mark_new(&mut self, id: &str, now: Instant) {
        self.entries.insert(
            id.to_string(),
            BadgeEntry {
                state: BadgeState::New,
                deadline: now + self.expiry,
                pending_update: false,
            },
        );
    }

    /// Show UPDATED for `id`, (re)starting its expiry timer.
    ///
    /// A live NEW badge keeps its label; only the deadline is refreshed and the
    /// update is remembered.
    pub fn mark_updated(&mut self, id: &str, now: Instant) {
        let deadline = now + self.expiry;
        match self.entries.get_mut(id) {
            Some(entry) if entry.state == BadgeState::New && entry.is_live(now) => {
                entry.deadline = deadline;
                entry.pending_update = true;
            }
            _ => {
                self.entries.insert(
                    id.to_string(),
                    BadgeEntry {
                        state: BadgeState::Updated,
                        deadline,
                        pending_update: false,
                    },
                );
            }
        }
    }

    /// Clear the badge for `id` and cancel its timer. Returns true if one was active.
    pub fn dismiss(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Clear badges for every id given. Returns how many were removed.
    pub fn dismiss_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        ids.into_iter().filter(|id| self.dismiss(id)).count()
    }

    /// Badge state for `id` at `now`.
    pub fn state_at(&self, id: &str, now: Instant) -> BadgeState {
        match self.entries.get(id) {
            Some(entry) if entry.is_live(now) => entry.state,
            _ => BadgeState::None,
        }
    }

    /// Badge state for `id` right now.
    pub fn state_of(&self, id: &str) -> BadgeState {
        self.state_at(id, Instant::now())
    }

    /// Whether `id` shows NEW but has also seen an update since.
    pub fn has_pending_update(&self, id: &str, now: Instant) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.is_live(now) && entry.pending_update)
    }

    /// Drop every badge whose deadline has passed; returns their ids, sorted.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.entries.remove(id);
        }
        expired.sort();
        expired
    }

    /// Earliest pending deadline, if any badge is active.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    /// Number of badges still showing at `now`.
    pub fn active_count(&self, now: Instant) -> usize {
        self.entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Cancel every pending expiry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
