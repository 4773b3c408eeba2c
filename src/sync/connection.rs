//! Connection monitor for the ticket event stream.
//!
//! Mirrors the transport's reported lifecycle into a single state the
//! dashboard can show. Reconnect policy belongs to the transport; the backoff
//! schedule it uses lives here next to the state it drives.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Maximum reconnection attempts before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Maximum backoff duration in seconds
pub const MAX_BACKOFF_SECS: u64 = 8;

/// Connection state enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the transport (attempt 1 is the initial connect)
    Connecting { attempt: u32 },
    /// Subscribed and receiving events
    Connected,
    /// Not connected; initial state and the state after teardown
    Disconnected,
}

impl ConnectionState {
    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a connection attempt is in flight
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { .. })
    }

    /// Short status text for displays
    pub fn label(&self) -> String {
        match self {
            ConnectionState::Connecting { attempt } if *attempt > 1 => {
                format!("Reconnecting (attempt {})", attempt)
            }
            ConnectionState::Connecting { .. } => "Connecting".to_string(),
            ConnectionState::Connected => "Connected".to_string(),
            ConnectionState::Disconnected => "Disconnected".to_string(),
        }
    }
}

/// Tracks connect/disconnect transitions of the event stream.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    state: ConnectionState,
    changed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            changed_at: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// When the state last changed.
    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        self.changed_at
    }

    /// Reason given by the transport for the most recent disconnect.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a connection attempt. Returns true if the state changed.
    pub fn connecting(&mut self, attempt: u32) -> bool {
        self.transition(ConnectionState::Connecting { attempt })
    }

    /// Record a successful connection. Returns true if the state changed.
    pub fn connected(&mut self) -> bool {
        let changed = self.transition(ConnectionState::Connected);
        if changed {
            self.last_error = None;
        }
        changed
    }

    /// Record a disconnect. Returns true if the state changed.
    pub fn disconnected(&mut self, reason: Option<String>) -> bool {
        if reason.is_some() {
            self.last_error = reason;
        }
        self.transition(ConnectionState::Disconnected)
    }

    /// Return to `Disconnected` on transport teardown.
    pub fn reset(&mut self) {
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        tracing::debug!(from = ?self.state, to = ?next, "connection state change");
        self.state = next;
        self.changed_at = Some(Utc::now());
        true
    }
}

/// Calculate exponential backoff duration for a given attempt number
///
/// Attempt 1: 0 seconds (immediate)
/// Attempt 2: 1 second
/// Attempt 3: 2 seconds
/// Attempt 4: 4 seconds
/// Attempt 5+: 8 seconds (max)
pub fn calculate_backoff(attempt: u32) -> Duration {
    if attempt <= 1 {
        Duration::from_secs(0)
    } else {
        let exponent = attempt.saturating_sub(2);
        // 2^63 would overflow; the cap is reached long before that
        let secs = if exponent >= 63 {
            MAX_BACKOFF_SECS
        } else {
            2u64.pow(exponent).min(MAX_BACKOFF_SECS)
        };
        Duration::from_secs(secs)
    }
}
