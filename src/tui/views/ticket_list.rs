//! Ticket list - the dashboard's main pane.
//!
//! Shows tickets most recent activity first, with NEW/UPDATED badges.

use chrono::{DateTime, Utc};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::models::{BadgeState, TicketCategory, TicketView};

/// State for the ticket list
pub struct TicketListView {
    pub items: Vec<TicketView>,
    pub selected: usize,
    pub list_state: ListState,
}

impl Default for TicketListView {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketListView {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            items: Vec::new(),
            selected: 0,
            list_state,
        }
    }

    /// Replace the rows, keeping the selection on the same ticket when it is
    /// still present (tickets move to the top when they change).
    pub fn update_items(&mut self, items: Vec<TicketView>) {
        let selected_id = self.selected_item().map(|v| v.ticket.id.clone());
        self.items = items;

        if let Some(index) = selected_id
            .and_then(|id| self.items.iter().position(|v| v.ticket.id == id))
        {
            self.selected = index;
        } else if self.selected >= self.items.len() {
            self.selected = self.items.len().saturating_sub(1);
        }
        self.list_state.select(Some(self.selected));
    }

    /// Move selection down
    pub fn select_next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected = (self.selected + 1).min(self.items.len() - 1);
        self.list_state.select(Some(self.selected));
    }

    /// Move selection up
    pub fn select_previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected = self.selected.saturating_sub(1);
        self.list_state.select(Some(self.selected));
    }

    /// Jump to top
    pub fn select_first(&mut self) {
        self.selected = 0;
        self.list_state.select(Some(0));
    }

    /// Jump to bottom
    pub fn select_last(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected = self.items.len() - 1;
        self.list_state.select(Some(self.selected));
    }

    pub fn selected_item(&self) -> Option<&TicketView> {
        self.items.get(self.selected)
    }

    /// Render the view
    pub fn render(&mut self, frame: &mut Frame, area: Rect, loading: bool) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Tickets ({}) ", self.items.len()));

        if self.items.is_empty() {
            let text = if loading { "Loading tickets..." } else { "No tickets" };
            let empty = Paragraph::new(text)
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            frame.render_widget(empty, area);
            return;
        }

        // " > BADGE    id8      CATEGORY title ... customer  99  12m ago"
        let title_width = area.width.saturating_sub(62) as usize;
        let now = Utc::now();

        let list_items: Vec<ListItem> = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, view)| {
                let style = if idx == self.selected {
                    Style::default().bg(Color::DarkGray)
                } else {
                    Style::default()
                };
                ListItem::new(row(view, idx == self.selected, title_width, now)).style(style)
            })
            .collect();

        let list = List::new(list_items).block(block);
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }
}

fn row(view: &TicketView, selected: bool, title_width: usize, now: DateTime<Utc>) -> Line<'static> {
    let ticket = &view.ticket;
    let marker = if selected { ">" } else { " " };
    let (badge, badge_style) = badge_span(view.badge);

    Line::from(vec![
        Span::raw(format!(" {} ", marker)),
        Span::styled(format!("{:<8}", badge), badge_style),
        Span::styled(format!("{:<9}", ticket.short_id()), Style::default().fg(Color::Blue)),
        Span::styled(
            format!("{:<9}", ticket.category.label()),
            category_style(&ticket.category),
        ),
        Span::raw(format!(
            "{:<width$}",
            clip(ticket.display_title(), title_width),
            width = title_width
        )),
        Span::styled(
            format!(" {:>16}", clip(&ticket.customer_name, 16)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(format!(" {:>4}", ticket.message_count)),
        Span::styled(
            format!(" {:>9}", ticket.time_ago(now)),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

fn badge_span(badge: BadgeState) -> (&'static str, Style) {
    match badge {
        BadgeState::New => (
            "NEW",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        BadgeState::Updated => (
            "UPDATED",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        BadgeState::None => ("", Style::default()),
    }
}

fn category_style(category: &TicketCategory) -> Style {
    match category {
        TicketCategory::Bug => Style::default().fg(Color::Red),
        TicketCategory::FeatureRequest => Style::default().fg(Color::Magenta),
        TicketCategory::Support => Style::default().fg(Color::Cyan),
        TicketCategory::Question => Style::default().fg(Color::LightBlue),
        _ => Style::default().fg(Color::DarkGray),
    }
}

/// Cut `s` to `width` characters, marking the cut with "...".
fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::normalize::normalize;
    use serde_json::json;

    fn view(id: &str) -> TicketView {
        TicketView {
            ticket: normalize(&json!({"id": id, "title": format!("Ticket {}", id)})).unwrap(),
            badge: BadgeState::None,
        }
    }

    #[test]
    fn test_navigation_bounds() {
        let mut list = TicketListView::new();
        list.select_next();
        assert_eq!(list.selected, 0);

        list.update_items(vec![view("a"), view("b"), view("c")]);
        list.select_next();
        list.select_next();
        list.select_next();
        assert_eq!(list.selected, 2);
        list.select_first();
        assert_eq!(list.selected, 0);
        list.select_previous();
        assert_eq!(list.selected, 0);
        list.select_last();
        assert_eq!(list.selected_item().unwrap().ticket.id, "c");
    }

    #[test]
    fn test_selection_follows_ticket_to_front() {
        let mut list = TicketListView::new();
        list.update_items(vec![view("a"), view("b"), view("c")]);
        list.select_last();

        // "c" was updated and moved to the top.
        list.update_items(vec![view("c"), view("a"), view("b")]);
        assert_eq!(list.selected, 0);
        assert_eq!(list.selected_item().unwrap().ticket.id, "c");
    }

    #[test]
    fn test_selection_clamped_when_ticket_gone() {
        let mut list = TicketListView::new();
        list.update_items(vec![view("a"), view("b"), view("c")]);
        list.select_last();
        list.update_items(vec![view("x")]);
        assert_eq!(list.selected, 0);
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("abc", 5), "abc");
        assert_eq!(clip("abcdefgh", 6), "abc...");
    }
}
