//! Filters and statistics over a record sequence

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::TransactionRecord;

use super::items::build_item_summaries;

/// Inbound vs outbound totals over a period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InOutSummary {
    pub in_quantity: i64,
    pub out_quantity: i64,
    pub in_amount: f64,
    pub out_amount: f64,
}

/// Inclusive on both ends. ISO-8601 timestamps compare correctly as strings
/// as long as both sides use the same format.
pub fn is_time_in_range(timestamp: &str, start: &str, end: &str) -> bool {
    timestamp >= start && timestamp <= end
}

pub fn filter_by_time_range<'a, I>(records: I, start: &str, end: &str) -> Vec<TransactionRecord>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .filter(|r| is_time_in_range(&r.timestamp, start, end))
        .cloned()
        .collect()
}

pub fn filter_by_item<'a, I>(records: I, item_id: &str) -> Vec<TransactionRecord>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .filter(|r| r.item_id == item_id)
        .cloned()
        .collect()
}

pub fn filter_by_document<'a, I>(records: I, document_no: &str) -> Vec<TransactionRecord>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .filter(|r| r.document() == Some(document_no))
        .cloned()
        .collect()
}

pub fn filter_by_partner<'a, I>(records: I, partner_id: &str) -> Vec<TransactionRecord>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .filter(|r| r.partner_id == partner_id)
        .cloned()
        .collect()
}

/// Totals of movements whose timestamp falls in `[start, end]`
pub fn in_out_summary<'a, I>(records: I, start: &str, end: &str) -> InOutSummary
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut summary = InOutSummary::default();
    for record in records
        .into_iter()
        .filter(|r| is_time_in_range(&r.timestamp, start, end))
    {
        if record.is_inbound() {
            summary.in_quantity = summary.in_quantity.saturating_add(record.quantity);
            summary.in_amount += record.total_amount();
        } else {
            summary.out_quantity = summary.out_quantity.saturating_add(record.quantity);
            summary.out_amount += record.total_amount();
        }
    }
    summary
}

/// Quantity in stock per category, counting only items with a positive total
pub fn inventory_by_category<'a, I>(records: I) -> BTreeMap<String, i64>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut categories = BTreeMap::new();
    for item in build_item_summaries(records).into_values() {
        if item.total_quantity > 0 {
            let total = categories.entry(item.category).or_insert(0i64);
            *total = total.saturating_add(item.total_quantity);
        }
    }
    categories
}

/// Number of distinct items with a positive total
pub fn item_type_count<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    build_item_summaries(records)
        .values()
        .filter(|item| item.total_quantity > 0)
        .count()
}
