//! Inventory item aggregate and related types.

mod aggregate;
mod events;

pub use aggregate::InventoryItem;
pub use events::{
    InventoryItemCreatedData, InventoryItemDeactivatedData, InventoryItemEvent,
    InventoryItemRenamedData, ItemsAddedData, ItemsRemovedData,
};

use thiserror::Error;

/// Errors that can occur during inventory item operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryItemError {
    /// The item id is the nil UUID.
    #[error("Inventory item id must not be nil")]
    NilId,

    /// The item name is empty or only whitespace.
    #[error("Inventory item name must not be blank")]
    BlankName,

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Adding would push the units on hand past what can be counted.
    #[error("Quantity overflow: adding {quantity} to {on_hand} on hand exceeds the maximum count")]
    QuantityOverflow { quantity: u32, on_hand: u32 },

    /// Not enough units on hand to remove.
    #[error("Insufficient stock: requested {requested}, on hand {on_hand}")]
    InsufficientStock { requested: u32, on_hand: u32 },

    /// The command targets an item that was never created.
    #[error("Inventory item has not been created")]
    NotCreated,
}

impl InventoryItemError {
    /// Returns true for malformed input rather than a broken business rule.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::NilId)
    }
}
