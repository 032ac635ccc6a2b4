//! Per-warehouse stock levels

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::TransactionRecord;

/// Stock of one item in one warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub item_id: String,
    pub warehouse_id: String,
    pub quantity: i64,
    /// Quantity-weighted average of inbound unit prices
    pub avg_price: f64,
}

/// warehouse_id → items on hand, ordered by item_id
pub type Inventory = BTreeMap<String, Vec<InventoryRecord>>;

/// Replay movements into stock levels.
///
/// Inbound movements recompute the weighted average cost; outbound movements
/// only reduce the quantity. Items whose quantity ends at zero or below are
/// left out.
pub fn calculate_inventory<'a, I>(records: I) -> Inventory
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut positions: BTreeMap<(&'a str, &'a str), InventoryRecord> = BTreeMap::new();

    for record in records {
        let entry = positions
            .entry((record.warehouse_id.as_str(), record.item_id.as_str()))
            .or_insert_with(|| InventoryRecord {
                item_id: record.item_id.clone(),
                warehouse_id: record.warehouse_id.clone(),
                quantity: 0,
                avg_price: 0.0,
            });

        if record.is_inbound() {
            let total_value =
                entry.quantity as f64 * entry.avg_price + record.quantity as f64 * record.unit_price;
            entry.quantity = entry.quantity.saturating_add(record.quantity);
            if entry.quantity > 0 {
                entry.avg_price = total_value / entry.quantity as f64;
            }
        } else {
            entry.quantity = entry.quantity.saturating_sub(record.quantity);
        }
    }

    let mut inventory = Inventory::new();
    for ((warehouse_id, _), position) in positions {
        if position.quantity > 0 {
            inventory
                .entry(warehouse_id.to_string())
                .or_default()
                .push(position);
        }
    }
    inventory
}
