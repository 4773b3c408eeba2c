//! Command implementations for the Ticketwatch CLI.
//!
//! Each command returns a result type implementing [`Output`], which `main`
//! prints as JSON (the default) or as human-readable text with `-H`.
//! - `tickets` - one-shot snapshot listing
//! - `show` - one ticket with its message history
//! - [`watch`] - headless live session
//! - [`config`] - inspect and edit config.kdl

pub mod config;
pub mod watch;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Result;
use crate::api::ApiClient;
use crate::config::ResolvedConfig;
use crate::models::{CategoryCounts, Message, Ticket, TicketCategory};
use crate::notify::{DesktopNotifier, LogNotifier, NotificationPermission, Notifier};
use crate::sync::normalize::normalize_all;

pub use self::config::{
    ConfigPathResult, ConfigSetResult, ConfigShowResult, config_path, config_set, config_show,
};
pub use self::watch::{WatchLine, WatchOptions, WatchSummary, watch};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Pick the notifier for a permission: the desktop only when granted.
pub fn notifier_for(permission: NotificationPermission) -> Box<dyn Notifier> {
    if permission.is_granted() {
        Box::new(DesktopNotifier::default())
    } else {
        Box::new(LogNotifier)
    }
}

fn api_client(config: &ResolvedConfig) -> Result<ApiClient> {
    ApiClient::with_timeout(&config.api_base.value, config.request_timeout())
}

/// One row of `tw tickets`.
#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    pub id: String,
    pub title: String,
    pub category: TicketCategory,
    pub customer_name: String,
    pub message_count: u32,
    pub last_activity_at: DateTime<Utc>,
    pub time_ago: String,
}

impl TicketSummary {
    pub fn from_ticket(ticket: &Ticket, now: DateTime<Utc>) -> Self {
        Self {
            id: ticket.id.clone(),
            title: ticket.display_title().to_string(),
            category: ticket.category.clone(),
            customer_name: ticket.customer_name.clone(),
            message_count: ticket.message_count,
            last_activity_at: ticket.last_activity_at,
            time_ago: ticket.time_ago(now),
        }
    }

    fn human_row(&self) -> String {
        format!(
            "{:<8}  {:<8}  {:<40}  {:<20}  {:>3} msgs  {}",
            short(&self.id),
            self.category.label(),
            truncate(&self.title, 40),
            truncate(&self.customer_name, 20),
            self.message_count,
            self.time_ago
        )
    }
}

/// Result of `tw tickets`.
#[derive(Debug, Serialize)]
pub struct TicketList {
    pub count: usize,
    pub categories: CategoryCounts,
    pub tickets: Vec<TicketSummary>,
    /// Snapshot rows that could not be normalized
    pub dropped: usize,
}

impl Output for TicketList {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        if self.tickets.is_empty() {
            return "No tickets.".to_string();
        }

        let mut lines = vec![format!(
            "{} ticket(s): {} bug, {} feature, {} support, {} question, {} other",
            self.count,
            self.categories.bugs,
            self.categories.feature_requests,
            self.categories.support,
            self.categories.questions,
            self.categories.other
        )];
        lines.push(String::new());
        lines.extend(self.tickets.iter().map(TicketSummary::human_row));
        if self.dropped > 0 {
            lines.push(String::new());
            lines.push(format!("({} malformed row(s) skipped)", self.dropped));
        }
        lines.join("\n")
    }
}

/// Fetch the snapshot once and list it in snapshot order.
///
/// Category counts cover the whole snapshot; `category` and `limit` only
/// narrow the listed rows.
pub async fn tickets(
    config: &ResolvedConfig,
    category: Option<&str>,
    limit: Option<usize>,
) -> Result<TicketList> {
    let rows = api_client(config)?.fetch_tickets().await?;
    let (tickets, errors) = normalize_all(&rows);
    for error in &errors {
        tracing::warn!(%error, "skipping malformed snapshot row");
    }

    let categories = CategoryCounts::tally(&tickets);
    let wanted = category.map(TicketCategory::parse);
    let now = Utc::now();
    let listed: Vec<TicketSummary> = tickets
        .iter()
        .filter(|t| wanted.as_ref().is_none_or(|c| &t.category == c))
        .take(limit.unwrap_or(usize::MAX))
        .map(|t| TicketSummary::from_ticket(t, now))
        .collect();

    Ok(TicketList {
        count: listed.len(),
        categories,
        tickets: listed,
        dropped: errors.len(),
    })
}

/// Result of `tw show`.
#[derive(Debug, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub summary: TicketSummary,
    pub status: Option<String>,
    pub channel: Option<String>,
    /// Oldest first
    pub messages: Vec<Message>,
}

impl Output for TicketDetail {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![
            format!("{} {}", s.id, s.title),
            format!("  Category: {}", s.category.label()),
            format!("  Customer: {}", s.customer_name),
        ];
        if let Some(status) = &self.status {
            lines.push(format!("  Status: {}", status));
        }
        if let Some(channel) = &self.channel {
            lines.push(format!("  Channel: {}", channel));
        }
        lines.push(format!(
            "  Last activity: {} ({})",
            s.last_activity_at.format("%Y-%m-%d %H:%M:%S UTC"),
            s.time_ago
        ));
        lines.push(String::new());

        if self.messages.is_empty() {
            lines.push("No messages.".to_string());
        }
        for message in &self.messages {
            let when = message
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!("[{}] {}:", when, message.display_sender()));
            lines.extend(message.content.lines().map(|l| format!("    {}", l)));
        }
        lines.join("\n")
    }
}

/// Fetch one ticket from the detail endpoint.
pub async fn show(config: &ResolvedConfig, id: &str) -> Result<TicketDetail> {
    let ticket = api_client(config)?.fetch_ticket(id).await?;
    Ok(detail(&ticket, Utc::now()))
}

fn detail(ticket: &Ticket, now: DateTime<Utc>) -> TicketDetail {
    TicketDetail {
        summary: TicketSummary::from_ticket(ticket, now),
        status: ticket.status.clone(),
        channel: ticket.channel.clone(),
        messages: ticket.chronological_messages().into_iter().cloned().collect(),
    }
}

fn short(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
