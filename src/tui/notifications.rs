//! Toasts for the dashboard.
//!
//! Notification requests from reconciled events, plus connection and detail
//! errors, show up as toasts that dismiss themselves after a few seconds.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::style::Color;

use crate::notify::{NotificationKind, NotificationRequest};

/// Maximum number of toasts to display at once
pub const MAX_VISIBLE_TOASTS: usize = 3;

/// Auto-dismiss duration
pub const TOAST_DURATION: Duration = Duration::from_secs(5);

/// Toast level (determines styling)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    /// A ticket was created
    Created,
    /// A ticket was updated
    Updated,
    Info,
    Error,
}

impl ToastLevel {
    pub fn color(&self) -> Color {
        match self {
            ToastLevel::Created => Color::Green,
            ToastLevel::Updated => Color::Yellow,
            ToastLevel::Info => Color::Blue,
            ToastLevel::Error => Color::Red,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ToastLevel::Created => "+",
            ToastLevel::Updated => "~",
            ToastLevel::Info => "i",
            ToastLevel::Error => "!",
        }
    }
}

impl From<NotificationKind> for ToastLevel {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Created => ToastLevel::Created,
            NotificationKind::Updated => ToastLevel::Updated,
        }
    }
}

/// A single toast
#[derive(Debug, Clone)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub message: String,
    pub created_at: Instant,
}

impl Toast {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= TOAST_DURATION
    }
}

/// Active toasts, newest first
#[derive(Debug, Default)]
pub struct ToastManager {
    toasts: VecDeque<Toast>,
}

impl ToastManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a toast created at `now`.
    pub fn push(
        &mut self,
        level: ToastLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        now: Instant,
    ) {
        self.toasts.push_front(Toast {
            level,
            title: title.into(),
            message: message.into(),
            created_at: now,
        });
    }

    /// Toast a notification request.
    pub fn push_request(&mut self, request: &NotificationRequest, now: Instant) {
        self.push(request.kind.into(), &request.title, &request.body, now);
    }

    /// Drop expired toasts.
    pub fn cleanup(&mut self, now: Instant) {
        self.toasts.retain(|t| !t.is_expired(now));
    }

    pub fn dismiss_all(&mut self) {
        self.toasts.clear();
    }

    /// Toasts to draw (at most [`MAX_VISIBLE_TOASTS`])
    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter().take(MAX_VISIBLE_TOASTS)
    }

    /// Toasts beyond the visible limit
    pub fn overflow_count(&self) -> usize {
        self.toasts.len().saturating_sub(MAX_VISIBLE_TOASTS)
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_limit_newest_first() {
        let now = Instant::now();
        let mut toasts = ToastManager::new();
        for i in 0..5 {
            toasts.push(ToastLevel::Info, "t", format!("m{}", i), now);
        }
        let visible: Vec<&str> = toasts.visible().map(|t| t.message.as_str()).collect();
        assert_eq!(visible, vec!["m4", "m3", "m2"]);
        assert_eq!(toasts.overflow_count(), 2);
    }

    #[test]
    fn test_expiry() {
        let start = Instant::now();
        let mut toasts = ToastManager::new();
        toasts.push(ToastLevel::Info, "old", "", start);
        toasts.push(ToastLevel::Info, "new", "", start + Duration::from_secs(3));

        toasts.cleanup(start + TOAST_DURATION);
        let left: Vec<&str> = toasts.visible().map(|t| t.title.as_str()).collect();
        assert_eq!(left, vec!["new"]);

        toasts.cleanup(start + Duration::from_secs(8));
        assert!(toasts.is_empty());
    }

    #[test]
    fn test_request_level() {
        let mut toasts = ToastManager::new();
        let request = NotificationRequest {
            kind: NotificationKind::Updated,
            ticket_id: "t1".to_string(),
            title: "Ticket Updated".to_string(),
            body: "Printer on fire".to_string(),
        };
        toasts.push_request(&request, Instant::now());
        let toast = toasts.visible().next().unwrap();
        assert_eq!(toast.level, ToastLevel::Updated);
        assert_eq!(toast.message, "Printer on fire");
    }
}
