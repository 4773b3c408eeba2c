//! Data models for ticketwatch.
//!
//! This module defines the canonical shapes every other component works with:
//! - [`Ticket`] - one support conversation, keyed by a stable string id
//! - [`Message`] - a single chat message belonging to a ticket
//! - [`TicketCategory`] - the classifier's verdict for a ticket
//! - [`BadgeState`] - the transient NEW/UPDATED marker
//! - [`TicketView`] - the read-only `(ticket, badge)` pair handed to consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Display title used when a ticket arrives without one.
pub const TITLE_PLACEHOLDER: &str = "New Customer Issue";

/// Customer name used when the record does not carry one.
pub const DEFAULT_CUSTOMER_NAME: &str = "Customer";

/// Ticket category as assigned by the upstream classifier.
///
/// Known values map to dedicated variants; anything else is preserved
/// verbatim so forward-compatible categories still display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum TicketCategory {
    Bug,
    FeatureRequest,
    Support,
    Question,
    /// Unknown or missing category (empty string when absent)
    #[default]
    Unknown,
    Other(String),
}

impl TicketCategory {
    /// Parse from a wire string, case-insensitive.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_uppercase().as_str() {
            "BUG" => TicketCategory::Bug,
            "FEATURE_REQUEST" => TicketCategory::FeatureRequest,
            "SUPPORT" => TicketCategory::Support,
            "QUESTION" => TicketCategory::Question,
            "" => TicketCategory::Unknown,
            _ => TicketCategory::Other(trimmed.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            TicketCategory::Bug => "BUG",
            TicketCategory::FeatureRequest => "FEATURE_REQUEST",
            TicketCategory::Support => "SUPPORT",
            TicketCategory::Question => "QUESTION",
            TicketCategory::Unknown => "",
            TicketCategory::Other(s) => s,
        }
    }

    /// Short label for list displays.
    pub fn label(&self) -> &str {
        match self {
            TicketCategory::FeatureRequest => "FEATURE",
            TicketCategory::Unknown => "OTHER",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for TicketCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TicketCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| TicketCategory::parse(&s)).unwrap_or_default())
    }
}

/// A single chat message attached to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Display name or platform user id of the author
    pub sender: String,
    /// Message text
    pub content: String,
    /// When the message was posted on the chat platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Transport-specific channel identifier or name
    #[serde(default)]
    pub channel: String,
    /// Thread the message belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_reference: Option<String>,
}

impl Message {
    /// Sender for display, falling back to the customer placeholder.
    pub fn display_sender(&self) -> &str {
        if self.sender.trim().is_empty() {
            DEFAULT_CUSTOMER_NAME
        } else {
            &self.sender
        }
    }
}

/// Canonical ticket shape produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Stable unique key
    pub id: String,
    /// Title as delivered (may be empty)
    pub title: String,
    pub category: TicketCategory,
    /// Last activity; the update signal and the basis for "time ago"
    pub last_activity_at: DateTime<Utc>,
    pub customer_name: String,
    pub message_count: u32,
    /// Messages as delivered; only authoritative when the detail endpoint sent them
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Ticket {
    /// Title for display, substituting the placeholder for empty titles.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            TITLE_PLACEHOLDER
        } else {
            &self.title
        }
    }

    /// First 8 characters of the id, for compact listings.
    pub fn short_id(&self) -> String {
        self.id.chars().take(8).collect()
    }

    /// Relative time since the last activity.
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        time_ago(self.last_activity_at, now)
    }

    /// Messages in chronological order (oldest first).
    ///
    /// Delivery order is kept unless every message carries a timestamp.
    pub fn chronological_messages(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.messages.iter().collect();
        if messages.iter().all(|m| m.timestamp.is_some()) {
            messages.sort_by_key(|m| m.timestamp);
        }
        messages
    }

    /// First `n` messages for a preview, plus how many were left out.
    pub fn preview(&self, n: usize) -> (&[Message], usize) {
        let shown = n.min(self.messages.len());
        (&self.messages[..shown], self.messages.len() - shown)
    }
}

/// Format the time between `then` and `now` as a short relative string.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(then);

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else {
        format!("{}d ago", duration.num_days())
    }
}

/// Transient presentation marker for a ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeState {
    #[default]
    None,
    New,
    Updated,
}

impl BadgeState {
    /// Whether a badge is showing.
    pub fn is_active(&self) -> bool {
        !matches!(self, BadgeState::None)
    }

    /// Badge text, if any.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            BadgeState::None => None,
            BadgeState::New => Some("NEW"),
            BadgeState::Updated => Some("UPDATED"),
        }
    }
}

/// Read-only pairing of a ticket with its current badge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub badge: BadgeState,
}

/// Ticket counts per category, for summary displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub bugs: usize,
    pub feature_requests: usize,
    pub support: usize,
    pub questions: usize,
    pub other: usize,
}

impl CategoryCounts {
    /// Tally the categories of the given tickets.
    pub fn tally<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> Self {
        let mut counts = Self::default();
        for ticket in tickets {
            counts.total += 1;
            match ticket.category {
                TicketCategory::Bug => counts.bugs += 1,
                TicketCategory::FeatureRequest => counts.feature_requests += 1,
                TicketCategory::Support => counts.support += 1,
                TicketCategory::Question => counts.questions += 1,
                TicketCategory::Unknown | TicketCategory::Other(_) => counts.other += 1,
            }
        }
        counts
    }
}
