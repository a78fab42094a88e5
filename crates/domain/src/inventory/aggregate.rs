//! Inventory item aggregate implementation.

use common::AggregateId;

use crate::aggregate::{Aggregate, AggregateRoot};

use super::{
    InventoryItemError, InventoryItemEvent,
    events::{InventoryItemCreatedData, InventoryItemRenamedData},
};

/// Inventory item aggregate root.
///
/// Tracks the name, the active flag and the units on hand of one stock item.
/// All state comes from applying [`InventoryItemEvent`]s.
#[derive(Debug, Clone)]
pub struct InventoryItem {
    root: AggregateRoot<InventoryItemEvent>,

    /// Unique item identifier.
    id: Option<AggregateId>,

    /// Display name.
    name: String,

    /// Deactivated items stay in the stream but are no longer offered.
    active: bool,

    /// Units on hand.
    count: u32,
}

impl Aggregate for InventoryItem {
    type Event = InventoryItemEvent;
    type Error = InventoryItemError;

    fn aggregate_type() -> &'static str {
        "InventoryItem"
    }

    fn new_for_replay() -> Self {
        Self {
            root: AggregateRoot::new(),
            id: None,
            name: String::new(),
            active: false,
            count: 0,
        }
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryItemEvent::InventoryItemCreated(data) => self.apply_created(data),
            InventoryItemEvent::InventoryItemRenamed(data) => self.apply_renamed(data),
            InventoryItemEvent::ItemsAddedToInventory(data) => {
                self.count += data.quantity;
            }
            InventoryItemEvent::ItemsRemovedFromInventory(data) => {
                self.count -= data.quantity;
            }
            InventoryItemEvent::InventoryItemDeactivated(_) => {
                self.active = false;
            }
        }
    }

    fn root(&self) -> &AggregateRoot<Self::Event> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<Self::Event> {
        &mut self.root
    }
}

// Query methods
impl InventoryItem {
    /// Returns the current name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true until the item is deactivated.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the units on hand.
    pub fn count(&self) -> u32 {
        self.count
    }
}

// Command methods (raise events)
impl InventoryItem {
    /// Creates a new inventory item.
    ///
    /// The item starts active with no units on hand, at version 1 with one
    /// uncommitted creation event.
    pub fn create(id: AggregateId, name: &str) -> Result<Self, InventoryItemError> {
        if id.is_nil() {
            return Err(InventoryItemError::NilId);
        }
        if name.trim().is_empty() {
            return Err(InventoryItemError::BlankName);
        }

        let mut item = Self::new_for_replay();
        let version = item.next_version();
        item.raise_event(InventoryItemEvent::created(id, name, version));
        Ok(item)
    }

    /// Renames the item. Renaming to the current name raises nothing.
    pub fn rename(&mut self, new_name: &str) -> Result<(), InventoryItemError> {
        let id = self.require_created()?;
        if new_name.trim().is_empty() {
            return Err(InventoryItemError::BlankName);
        }
        if self.name == new_name {
            return Ok(());
        }

        let version = self.next_version();
        self.raise_event(InventoryItemEvent::renamed(
            id,
            self.name.clone(),
            new_name,
            version,
        ));
        Ok(())
    }

    /// Adds units to stock. The total on hand must stay within `u32`.
    pub fn add(&mut self, quantity: u32) -> Result<(), InventoryItemError> {
        let id = self.require_created()?;
        if quantity == 0 {
            return Err(InventoryItemError::InvalidQuantity { quantity });
        }
        if self.count.checked_add(quantity).is_none() {
            return Err(InventoryItemError::QuantityOverflow {
                quantity,
                on_hand: self.count,
            });
        }

        let version = self.next_version();
        self.raise_event(InventoryItemEvent::items_added(id, quantity, version));
        Ok(())
    }

    /// Removes units from stock. Cannot remove more than are on hand.
    pub fn remove(&mut self, quantity: u32) -> Result<(), InventoryItemError> {
        let id = self.require_created()?;
        if quantity == 0 {
            return Err(InventoryItemError::InvalidQuantity { quantity });
        }
        if quantity > self.count {
            return Err(InventoryItemError::InsufficientStock {
                requested: quantity,
                on_hand: self.count,
            });
        }

        let version = self.next_version();
        self.raise_event(InventoryItemEvent::items_removed(id, quantity, version));
        Ok(())
    }

    /// Deactivates the item. Deactivating an inactive item raises nothing.
    pub fn deactivate(&mut self) -> Result<(), InventoryItemError> {
        let id = self.require_created()?;
        if !self.active {
            return Ok(());
        }

        let version = self.next_version();
        self.raise_event(InventoryItemEvent::deactivated(id, version));
        Ok(())
    }

    fn require_created(&self) -> Result<AggregateId, InventoryItemError> {
        self.id.ok_or(InventoryItemError::NotCreated)
    }
}

// Event application helpers
impl InventoryItem {
    fn apply_created(&mut self, data: &InventoryItemCreatedData) {
        self.id = Some(data.item_id);
        self.name = data.name.clone();
        self.active = true;
        self.count = 0;
    }

    fn apply_renamed(&mut self, data: &InventoryItemRenamedData) {
        self.name = data.new_name.clone();
    }
}
