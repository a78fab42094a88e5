//! Domain layer for the inventory event-sourcing core.
//!
//! This crate provides:
//! - [`Aggregate`] and [`EventSourced`] traits with the embedded [`AggregateRoot`] bookkeeping
//! - [`Repository`] for rehydrating and saving aggregates through an event store
//! - The [`InventoryItem`] aggregate and its events

pub mod aggregate;
pub mod error;
pub mod inventory;
pub mod repository;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, EventSourced};
pub use error::DomainError;
pub use inventory::{
    InventoryItem, InventoryItemCreatedData, InventoryItemDeactivatedData, InventoryItemError,
    InventoryItemEvent, InventoryItemRenamedData, ItemsAddedData, ItemsRemovedData,
};
pub use repository::Repository;
