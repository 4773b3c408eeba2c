//! Ticketwatch - a live support-ticket dashboard.
//!
//! This library provides the ticket synchronization engine behind the `tw`
//! CLI: a one-time snapshot of the ticket collection is reconciled with an
//! unbounded stream of create/update events into a single ordered,
//! de-duplicated view, with transient "new"/"updated" badges that expire on
//! their own.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod notify;
pub mod session;
pub mod sync;
pub mod transport;
pub mod tui;

/// Library-level error type for Ticketwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Snapshot fetch failed: {0}")]
    SnapshotFetch(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("STOMP protocol error: {0}")]
    Stomp(String),

    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Ticketwatch operations.
pub type Result<T> = std::result::Result<T, Error>;
