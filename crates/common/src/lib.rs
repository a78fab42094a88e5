//! Shared types for the inventory event-sourcing core.

mod types;

pub use types::{AggregateId, ParseAggregateIdError};
