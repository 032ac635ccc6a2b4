//! Item catalog derived from movements

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{compare_timestamps, TransactionRecord};

/// Current state of one item across all warehouses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item_id: String,
    pub item_name: String,
    pub category: String,
    pub model: String,
    pub unit: String,
    /// Unit price of the most recently timestamped movement
    pub latest_price: f64,
    /// Signed running quantity
    pub total_quantity: i64,
    /// Timestamp of the movement the attributes were taken from
    pub last_updated: String,
}

impl ItemSummary {
    fn from_record(record: &TransactionRecord) -> Self {
        Self {
            item_id: record.item_id.clone(),
            item_name: record.item_name.clone(),
            category: record.category.clone(),
            model: record.model.clone(),
            unit: record.unit.clone(),
            latest_price: record.unit_price,
            total_quantity: 0,
            last_updated: record.timestamp.clone(),
        }
    }

    fn refresh_from(&mut self, record: &TransactionRecord) {
        self.item_name = record.item_name.clone();
        self.category = record.category.clone();
        self.model = record.model.clone();
        self.unit = record.unit.clone();
        self.latest_price = record.unit_price;
        self.last_updated = record.timestamp.clone();
    }
}

/// Every item ever moved, keyed by item_id, including those at or below zero
pub fn build_item_summaries<'a, I>(records: I) -> BTreeMap<String, ItemSummary>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut items: BTreeMap<String, ItemSummary> = BTreeMap::new();

    for record in records {
        let summary = items
            .entry(record.item_id.clone())
            .or_insert_with(|| ItemSummary::from_record(record));

        summary.total_quantity = summary
            .total_quantity
            .saturating_add(record.signed_quantity());

        // Ties keep the earlier record's attributes
        if compare_timestamps(&record.timestamp, &summary.last_updated).is_gt() {
            summary.refresh_from(record);
        }
    }

    items
}

/// Items currently in stock (total quantity > 0), ordered by item_id
pub fn current_items<'a, I>(records: I) -> Vec<ItemSummary>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    build_item_summaries(records)
        .into_values()
        .filter(|item| item.total_quantity > 0)
        .collect()
}
