//! Derived Views
//!
//! Read-only aggregates computed by replaying a ledger prefix. Nothing here is
//! stored; every query rebuilds its view from a consistent snapshot in one
//! linear pass.
//!
//! All builders take any iterator of `&TransactionRecord`, typically
//! `LedgerSnapshot::iter()`.

mod documents;
mod inventory;
mod items;
mod stats;

pub use documents::{build_document_summaries, DocumentSummary};
pub use inventory::{calculate_inventory, Inventory, InventoryRecord};
pub use items::{build_item_summaries, current_items, ItemSummary};
pub use stats::{
    filter_by_document, filter_by_item, filter_by_partner, filter_by_time_range, in_out_summary,
    inventory_by_category, is_time_in_range, item_type_count, InOutSummary,
};
