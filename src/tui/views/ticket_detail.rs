//! Ticket detail pane - full message history for one ticket.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::models::Ticket;

/// What the detail pane is showing
#[derive(Debug, Clone, Default)]
pub enum DetailState {
    /// Nothing requested yet
    #[default]
    Empty,
    /// Waiting on the detail endpoint
    Loading { id: String },
    Loaded(Box<Ticket>),
    Failed { id: String, error: String },
}

/// State for the detail pane
#[derive(Debug, Default)]
pub struct TicketDetailView {
    pub state: DetailState,
    pub scroll: u16,
}

impl TicketDetailView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch for `id` has started.
    pub fn start_loading(&mut self, id: &str) {
        self.state = DetailState::Loading { id: id.to_string() };
        self.scroll = 0;
    }

    /// Apply a fetch result. Results for a ticket other than the one most
    /// recently requested are dropped.
    pub fn set_result(&mut self, id: &str, result: crate::Result<Ticket>) {
        let pending = matches!(&self.state, DetailState::Loading { id: pending } if pending == id);
        if !pending {
            tracing::debug!(%id, "dropping stale detail response");
            return;
        }
        self.state = match result {
            Ok(ticket) => DetailState::Loaded(Box::new(ticket)),
            Err(e) => DetailState::Failed {
                id: id.to_string(),
                error: e.to_string(),
            },
        };
    }

    pub fn clear(&mut self) {
        self.state = DetailState::Empty;
        self.scroll = 0;
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    /// Render the view
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" Detail ");
        let dim = Style::default().fg(Color::DarkGray);

        let lines: Vec<Line> = match &self.state {
            DetailState::Empty => vec![Line::styled("Press Enter to load a ticket's history", dim)],
            DetailState::Loading { id } => vec![Line::styled(format!("Loading {}...", id), dim)],
            DetailState::Failed { id, error } => vec![
                Line::styled(
                    format!("Could not load {}", id),
                    Style::default().fg(Color::Red),
                ),
                Line::styled(error.clone(), dim),
            ],
            DetailState::Loaded(ticket) => ticket_lines(ticket),
        };

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0));
        frame.render_widget(paragraph, area);
    }
}

fn ticket_lines(ticket: &Ticket) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::styled(
            ticket.display_title().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(vec![
            Span::styled("Customer: ", label),
            Span::raw(ticket.customer_name.clone()),
        ]),
        Line::from(vec![
            Span::styled("Category: ", label),
            Span::raw(ticket.category.label().to_string()),
        ]),
    ];
    if let Some(status) = &ticket.status {
        lines.push(Line::from(vec![
            Span::styled("Status: ", label),
            Span::raw(status.clone()),
        ]));
    }
    lines.push(Line::from(""));

    let messages = ticket.chronological_messages();
    if messages.is_empty() {
        lines.push(Line::styled("No messages", label));
    }
    for message in messages {
        let when = message
            .timestamp
            .map(|t| t.format("%m-%d %H:%M").to_string())
            .unwrap_or_default();
        lines.push(Line::from(vec![
            Span::styled(
                message.display_sender().to_string(),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(format!("  {}", when), label),
        ]));
        for text in message.content.lines() {
            lines.push(Line::from(format!("  {}", text)));
        }
        lines.push(Line::from(""));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::sync::normalize::normalize;
    use serde_json::json;

    #[test]
    fn test_result_applies_to_pending_ticket() {
        let mut view = TicketDetailView::new();
        view.start_loading("t1");
        view.set_result("t1", normalize(&json!({"id": "t1"})));
        assert!(matches!(view.state, DetailState::Loaded(ref t) if t.id == "t1"));
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let mut view = TicketDetailView::new();
        view.start_loading("t1");
        view.start_loading("t2");
        view.set_result("t1", normalize(&json!({"id": "t1"})));
        assert!(matches!(view.state, DetailState::Loading { ref id } if id == "t2"));
    }

    #[test]
    fn test_failure_is_shown() {
        let mut view = TicketDetailView::new();
        view.start_loading("t9");
        view.set_result("t9", Err(Error::NotFound("t9".to_string())));
        assert!(matches!(view.state, DetailState::Failed { .. }));

        view.clear();
        assert!(matches!(view.state, DetailState::Empty));
    }
}
