//! Recovered data validation

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{ErrorContext, LedgerError, Result};
use crate::record::compare_timestamps;
use crate::wal::PartitionData;

/// Outcome of a successful integrity check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub partitions_checked: usize,
    pub records_checked: usize,

    /// (partition_id, trans_id) pairs seen more than once. Reported only.
    pub duplicate_trans_ids: Vec<(String, String)>,
}

impl IntegrityReport {
    pub fn has_warnings(&self) -> bool {
        !self.duplicate_trans_ids.is_empty()
    }
}

/// Every record must satisfy the append-time field rules, and timestamps
/// must not go backwards within a partition. Any violation fails the whole
/// dataset with `DataCorruption`.
pub fn validate_data_integrity(data: &PartitionData) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    for (partition_id, records) in data {
        let context = || ErrorContext::new("integrity", "validate").partition(partition_id.as_str());

        if partition_id.is_empty() {
            return Err(LedgerError::data_corruption(
                "recovered records with an empty partition id",
                context(),
            ));
        }

        let mut seen = HashSet::with_capacity(records.len());
        let mut previous: Option<&str> = None;

        for (position, record) in records.iter().enumerate() {
            record.validate(partition_id).map_err(|e| {
                LedgerError::data_corruption(
                    format!("record {} is invalid: {}", position, e.message()),
                    context().transaction(record.trans_id.as_str()),
                )
            })?;

            if let Some(previous) = previous {
                if compare_timestamps(&record.timestamp, previous).is_lt() {
                    return Err(LedgerError::data_corruption(
                        format!(
                            "timestamp goes backwards at record {}: '{}' after '{}'",
                            position, record.timestamp, previous
                        ),
                        context().transaction(record.trans_id.as_str()),
                    ));
                }
            }
            previous = Some(&record.timestamp);

            if !seen.insert(record.trans_id.as_str()) {
                tracing::warn!(
                    partition = %partition_id,
                    trans_id = %record.trans_id,
                    "duplicate transaction id in recovered data"
                );
                report
                    .duplicate_trans_ids
                    .push((partition_id.clone(), record.trans_id.clone()));
            }
        }

        report.partitions_checked += 1;
        report.records_checked += records.len();
    }

    Ok(report)
}
