//! Inventory item domain events.

use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on an inventory item aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InventoryItemEvent {
    /// Item was created.
    InventoryItemCreated(InventoryItemCreatedData),

    /// Item was renamed.
    InventoryItemRenamed(InventoryItemRenamedData),

    /// Units were added to stock.
    ItemsAddedToInventory(ItemsAddedData),

    /// Units were removed from stock.
    ItemsRemovedFromInventory(ItemsRemovedData),

    /// Item was deactivated.
    InventoryItemDeactivated(InventoryItemDeactivatedData),
}

impl DomainEvent for InventoryItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryItemEvent::InventoryItemCreated(_) => "InventoryItemCreated",
            InventoryItemEvent::InventoryItemRenamed(_) => "InventoryItemRenamed",
            InventoryItemEvent::ItemsAddedToInventory(_) => "ItemsAddedToInventory",
            InventoryItemEvent::ItemsRemovedFromInventory(_) => "ItemsRemovedFromInventory",
            InventoryItemEvent::InventoryItemDeactivated(_) => "InventoryItemDeactivated",
        }
    }

    fn aggregate_version(&self) -> Version {
        match self {
            InventoryItemEvent::InventoryItemCreated(data) => data.aggregate_version,
            InventoryItemEvent::InventoryItemRenamed(data) => data.aggregate_version,
            InventoryItemEvent::ItemsAddedToInventory(data) => data.aggregate_version,
            InventoryItemEvent::ItemsRemovedFromInventory(data) => data.aggregate_version,
            InventoryItemEvent::InventoryItemDeactivated(data) => data.aggregate_version,
        }
    }
}

/// Data for InventoryItemCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemCreatedData {
    /// The unique item ID.
    pub item_id: AggregateId,

    /// Initial name.
    pub name: String,

    /// Version produced by this event.
    pub aggregate_version: Version,
}

/// Data for InventoryItemRenamed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemRenamedData {
    pub item_id: AggregateId,

    /// Name before the rename.
    pub old_name: String,

    /// Name after the rename.
    pub new_name: String,

    pub aggregate_version: Version,
}

/// Data for ItemsAddedToInventory event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsAddedData {
    pub item_id: AggregateId,

    /// Units added.
    pub quantity: u32,

    pub aggregate_version: Version,
}

/// Data for ItemsRemovedFromInventory event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsRemovedData {
    pub item_id: AggregateId,

    /// Units removed.
    pub quantity: u32,

    pub aggregate_version: Version,
}

/// Data for InventoryItemDeactivated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemDeactivatedData {
    pub item_id: AggregateId,

    pub aggregate_version: Version,
}

// Factory methods for creating events
impl InventoryItemEvent {
    /// Creates an InventoryItemCreated event.
    pub fn created(item_id: AggregateId, name: impl Into<String>, version: Version) -> Self {
        InventoryItemEvent::InventoryItemCreated(InventoryItemCreatedData {
            item_id,
            name: name.into(),
            aggregate_version: version,
        })
    }

    /// Creates an InventoryItemRenamed event.
    pub fn renamed(
        item_id: AggregateId,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
        version: Version,
    ) -> Self {
        InventoryItemEvent::InventoryItemRenamed(InventoryItemRenamedData {
            item_id,
            old_name: old_name.into(),
            new_name: new_name.into(),
            aggregate_version: version,
        })
    }

    /// Creates an ItemsAddedToInventory event.
    pub fn items_added(item_id: AggregateId, quantity: u32, version: Version) -> Self {
        InventoryItemEvent::ItemsAddedToInventory(ItemsAddedData {
            item_id,
            quantity,
            aggregate_version: version,
        })
    }

    /// Creates an ItemsRemovedFromInventory event.
    pub fn items_removed(item_id: AggregateId, quantity: u32, version: Version) -> Self {
        InventoryItemEvent::ItemsRemovedFromInventory(ItemsRemovedData {
            item_id,
            quantity,
            aggregate_version: version,
        })
    }

    /// Creates an InventoryItemDeactivated event.
    pub fn deactivated(item_id: AggregateId, version: Version) -> Self {
        InventoryItemEvent::InventoryItemDeactivated(InventoryItemDeactivatedData {
            item_id,
            aggregate_version: version,
        })
    }
}
