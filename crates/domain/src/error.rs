//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::inventory::InventoryItemError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    ///
    /// Concurrency conflicts and store unavailability arrive here unchanged.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A business rule of the inventory item was violated.
    #[error("Inventory item error: {0}")]
    InventoryItem(#[from] InventoryItemError),

    /// A required input was missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored event no longer decodes into the aggregate's event type.
    ///
    /// Means the running code and the stored history disagree on the event
    /// schema. Retrying will not help.
    #[error(
        "Event {event_type} at version {version} of aggregate {aggregate_id} does not match the event schema: {source}"
    )]
    EventSchemaMismatch {
        aggregate_id: AggregateId,
        event_type: String,
        version: Version,
        #[source]
        source: serde_json::Error,
    },
}

impl DomainError {
    /// Returns true if the store rejected a save because the stream moved on.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::EventStore(e) if e.is_concurrency_conflict())
    }

    /// Returns true if the backing log could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::EventStore(e) if e.is_unavailable())
    }

    /// Returns true for missing or malformed inputs, wherever they were caught.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => true,
            Self::EventStore(EventStoreError::InvalidArgument(_)) => true,
            Self::InventoryItem(e) => e.is_invalid_argument(),
            _ => false,
        }
    }
}
