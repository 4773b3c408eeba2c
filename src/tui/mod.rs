//! Terminal dashboard for ticketwatch
//!
//! A keyboard-driven view of the live ticket list. It drives a
//! [`SyncSession`](crate::session::SyncSession) on the UI task and shows
//! badges, connection state, ticket history and toasts for new activity.

#[cfg(feature = "tui")]
mod app;
#[cfg(feature = "tui")]
mod notifications;
#[cfg(feature = "tui")]
mod views;

#[cfg(feature = "tui")]
pub use app::run_tui;
#[cfg(feature = "tui")]
pub use notifications::{Toast, ToastLevel, ToastManager};
#[cfg(feature = "tui")]
pub use views::{DetailState, TicketDetailView, TicketListView};
