//! Business documents (receipts, issue slips) grouped by document_no

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{compare_timestamps, TransactionRecord, TransactionType};

/// Aggregate of all records sharing a document_no
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_no: String,
    /// Taken from the document's first record
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub partner_id: String,
    pub partner_name: String,
    pub partition_id: String,
    /// Earliest timestamp among the document's records
    pub timestamp: String,
    /// Sum of quantity × unit_price
    pub total_amount: f64,
    /// Number of records in the document
    pub item_count: usize,
}

/// Summaries of every document in the records, ordered by document_no.
/// Records without a document number are ignored.
pub fn build_document_summaries<'a, I>(partition_id: &str, records: I) -> Vec<DocumentSummary>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut documents: BTreeMap<&'a str, DocumentSummary> = BTreeMap::new();

    for record in records {
        let Some(document_no) = record.document() else {
            continue;
        };

        let summary = documents
            .entry(document_no)
            .or_insert_with(|| DocumentSummary {
                document_no: document_no.to_string(),
                kind: record.kind,
                partner_id: record.partner_id.clone(),
                partner_name: record.partner_name.clone(),
                partition_id: partition_id.to_string(),
                timestamp: record.timestamp.clone(),
                total_amount: 0.0,
                item_count: 0,
            });

        summary.total_amount += record.total_amount();
        summary.item_count += 1;
        if compare_timestamps(&record.timestamp, &summary.timestamp).is_lt() {
            summary.timestamp = record.timestamp.clone();
        }
    }

    documents.into_values().collect()
}
