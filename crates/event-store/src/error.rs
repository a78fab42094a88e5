use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The expected version did not match the stream length at append time,
    /// or a brand-new stream was requested for an id that already has one.
    /// Nothing was appended.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The call was rejected before any I/O took place.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing log could not be reached or read.
    #[error("Event store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Builds an [`EventStoreError::InvalidArgument`] from any message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true if this is an optimistic concurrency failure.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns true if the backing log could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns true if the caller may reasonably retry.
    ///
    /// Conflicts need a reload and recompute before retrying; unavailability
    /// is retried at the caller's discretion.
    pub fn is_retryable(&self) -> bool {
        self.is_concurrency_conflict() || self.is_unavailable()
    }
}

impl From<sqlx::Error> for EventStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(Box::new(e))
    }
}

impl From<sqlx::migrate::MigrateError> for EventStoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Unavailable(Box::new(e))
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
