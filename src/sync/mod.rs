//! Ticket synchronization engine.
//!
//! Leaves first: [`normalize`] maps raw records onto [`crate::models::Ticket`],
//! [`store`] keeps them ordered and de-duplicated, [`badges`] tracks the
//! transient NEW/UPDATED markers, [`engine`] reconciles snapshot and stream
//! events into all of the above, and [`connection`] mirrors transport state.

pub mod badges;
pub mod connection;
pub mod engine;
pub mod normalize;
pub mod store;

pub use badges::{BadgeTracker, DEFAULT_BADGE_EXPIRY};
pub use connection::{ConnectionMonitor, ConnectionState, calculate_backoff};
pub use engine::{EngineConfig, EngineStats, EventKind, EventOutcome, SyncEngine};
pub use normalize::{normalize, normalize_all};
pub use store::{TicketStore, UpsertOutcome};
