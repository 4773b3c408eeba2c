//! Ticket store - ordered, de-duplicated ticket collection.
//!
//! Display order is most-recently-touched first: every create or update moves
//! its ticket to position 0 and leaves the rest of the order alone.

use crate::models::Ticket;

/// Result of an [`TicketStore::upsert_to_front`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// True when no ticket with this id existed before the call
    pub created: bool,
}

/// Ordered ticket collection with exactly one entry per id.
#[derive(Debug, Default)]
pub struct TicketStore {
    tickets: Vec<Ticket>,
}

impl TicketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection with a snapshot.
    ///
    /// Duplicate ids within the snapshot collapse to their first occurrence so
    /// the one-entry-per-id invariant holds from the start.
    pub fn seed(&mut self, tickets: Vec<Ticket>) {
        let mut seeded: Vec<Ticket> = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if !seeded.iter().any(|t| t.id == ticket.id) {
                seeded.push(ticket);
            }
        }
        self.tickets = seeded;
    }

    /// Insert or replace `ticket` and move it to the front.
    ///
    /// The store is only reachable through `&mut self`, so no reader can
    /// observe the intermediate state between removal and insertion.
    pub fn upsert_to_front(&mut self, ticket: Ticket) -> UpsertOutcome {
        let existing = self.tickets.iter().position(|t| t.id == ticket.id);
        if let Some(index) = existing {
            self.tickets.remove(index);
        }
        self.tickets.insert(0, ticket);
        UpsertOutcome {
            created: existing.is_none(),
        }
    }

    /// All tickets, most recent first.
    pub fn all(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Look up a ticket by id.
    pub fn get(&self, id: &str) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    /// Ids in display order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tickets.iter().map(|t| t.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Drop every ticket.
    pub fn clear(&mut self) {
        self.tickets.clear();
    }
}
