//! Event store for the inventory event-sourcing core.
//!
//! Keeps one append-only stream of [`EventEnvelope`]s per aggregate and
//! guards every append with an optimistic concurrency check against the
//! caller's expected [`Version`]. Two backends are provided:
//! [`InMemoryEventStore`] and [`PostgresEventStore`].

pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use config::PostgresConfig;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreExt, ensure_batch_follows, validate_append};
