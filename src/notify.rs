//! Best-effort notification dispatch for reconciled ticket events.
//!
//! The engine turns created/updated events into [`NotificationRequest`]s.
//! Dispatch to the desktop is gated on [`NotificationPermission::Granted`] and
//! can never fail or block reconciliation: spawn errors are logged and dropped.

use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::models::Ticket;

/// What happened to the ticket a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Created,
    Updated,
}

/// A request to tell the user about a ticket event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub kind: NotificationKind,
    pub ticket_id: String,
    /// Headline ("New Ticket Created" / "Ticket Updated")
    pub title: String,
    /// The ticket's display title
    pub body: String,
}

impl NotificationRequest {
    pub fn created(ticket: &Ticket) -> Self {
        Self {
            kind: NotificationKind::Created,
            ticket_id: ticket.id.clone(),
            title: "New Ticket Created".to_string(),
            body: ticket.display_title().to_string(),
        }
    }

    pub fn updated(ticket: &Ticket) -> Self {
        Self {
            kind: NotificationKind::Updated,
            ticket_id: ticket.id.clone(),
            title: "Ticket Updated".to_string(),
            body: ticket.display_title().to_string(),
        }
    }
}

/// Whether the user has allowed desktop notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// Never asked; treated as not granted
    #[default]
    Default,
    Granted,
    Denied,
}

impl NotificationPermission {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default" => Some(NotificationPermission::Default),
            "granted" => Some(NotificationPermission::Granted),
            "denied" => Some(NotificationPermission::Denied),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPermission::Default => "default",
            NotificationPermission::Granted => "granted",
            NotificationPermission::Denied => "denied",
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, NotificationPermission::Granted)
    }
}

impl std::fmt::Display for NotificationPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outbound notification sink.
pub trait Notifier: Send {
    /// Deliver a notification. Must not block and must not fail.
    fn dispatch(&self, request: &NotificationRequest);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn dispatch(&self, _request: &NotificationRequest) {}
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn dispatch(&self, request: &NotificationRequest) {
        tracing::info!(
            kind = ?request.kind,
            ticket = %request.ticket_id,
            "{}: {}",
            request.title,
            request.body
        );
    }
}

/// Shows notifications through the platform's notification tool.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new("ticketwatch")
    }
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Build the platform command for a notification, if the platform has one.
    fn command(&self, request: &NotificationRequest) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {} with title {}",
                applescript_quote(&request.body),
                applescript_quote(&request.title)
            );
            let mut cmd = Command::new("osascript");
            cmd.args(["-e", &script]);
            Some(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("notify-send");
            cmd.args(["--app-name", &self.app_name, "--", &request.title, &request.body]);
            Some(cmd)
        } else {
            None
        }
    }
}

impl Notifier for DesktopNotifier {
    fn dispatch(&self, request: &NotificationRequest) {
        let Some(mut cmd) = self.command(request) else {
            tracing::debug!("desktop notifications unsupported on this platform");
            return;
        };

        let spawned = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // Reap off-thread so the caller never waits on the notifier
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => tracing::debug!("desktop notification not shown: {}", e),
        }
    }
}

/// Quote a string as an AppleScript string literal.
fn applescript_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketCategory;
    use chrono::Utc;

    fn ticket(title: &str) -> Ticket {
        Ticket {
            id: "42".to_string(),
            title: title.to_string(),
            category: TicketCategory::Bug,
            last_activity_at: Utc::now(),
            customer_name: "Customer".to_string(),
            message_count: 0,
            messages: Vec::new(),
            status: None,
            channel: None,
        }
    }

    #[test]
    fn test_created_request() {
        let request = NotificationRequest::created(&ticket("Checkout broken"));
        assert_eq!(request.kind, NotificationKind::Created);
        assert_eq!(request.title, "New Ticket Created");
        assert_eq!(request.body, "Checkout broken");
        assert_eq!(request.ticket_id, "42");
    }

    #[test]
    fn test_updated_request_uses_placeholder_title() {
        let request = NotificationRequest::updated(&ticket(""));
        assert_eq!(request.kind, NotificationKind::Updated);
        assert_eq!(request.title, "Ticket Updated");
        assert_eq!(request.body, crate::models::TITLE_PLACEHOLDER);
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_notify_send_treats_text_as_positional() {
        let notifier = DesktopNotifier::new("ticketwatch");
        let request = NotificationRequest::created(&ticket("-u critical"));
        let cmd = notifier.command(&request).unwrap();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["--app-name", "ticketwatch", "--", "New Ticket Created", "-u critical"]
        );
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(
            NotificationPermission::parse("GRANTED"),
            Some(NotificationPermission::Granted)
        );
        assert_eq!(
            NotificationPermission::parse("denied"),
            Some(NotificationPermission::Denied)
        );
        assert_eq!(
            NotificationPermission::parse("default"),
            Some(NotificationPermission::Default)
        );
        assert_eq!(NotificationPermission::parse("maybe"), None);
    }

    #[test]
    fn test_only_granted_is_granted() {
        assert!(NotificationPermission::Granted.is_granted());
        assert!(!NotificationPermission::Denied.is_granted());
        assert!(!NotificationPermission::Default.is_granted());
    }

    #[test]
    fn test_applescript_quote_escapes() {
        assert_eq!(applescript_quote(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(applescript_quote(r"a\b"), r#""a\\b""#);
    }

    #[test]
    fn test_request_serialization() {
        let request = NotificationRequest::created(&ticket("x"));
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""kind":"created""#));
        assert!(json.contains(r#""ticket_id":"42""#));
    }
}
