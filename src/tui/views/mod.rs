//! TUI Views module

mod ticket_detail;
mod ticket_list;

pub use ticket_detail::{DetailState, TicketDetailView};
pub use ticket_list::TicketListView;
