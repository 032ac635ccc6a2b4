//! Ledger Module
//!
//! One append-only sequence of transaction records per partition.
//!
//! ## Concurrency Protocol
//! - Records live in set-once slots that never move ([`segments`])
//! - `published` counts the slots readers may look at
//! - The single writer fills slot `n`, then bumps `published` to `n + 1` with
//!   `Release`; readers load `published` with `Acquire` and only touch slots
//!   below it, so a reader never sees a record that is not fully written
//!
//! ## Single Writer
//! Writing requires a [`WriterClaim`], and at most one claim exists per ledger
//! at any time. The claim flag is the only thing that enforces exclusivity;
//! readers never look at it.

mod segments;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

use crate::error::{ErrorContext, LedgerError, Result};
use crate::record::TransactionRecord;

use self::segments::SegmentedLog;

pub(crate) use self::segments::CAPACITY;

/// Append-only record sequence for a single partition
pub struct Ledger {
    partition_id: String,

    /// Record storage; slots below `published` are immutable
    records: SegmentedLog<TransactionRecord>,

    /// Published length cursor, only ever touched with Acquire/Release
    published: CachePadded<AtomicUsize>,

    /// Set while a WriterClaim is alive
    writer_claimed: AtomicBool,
}

impl Ledger {
    pub(crate) fn new(partition_id: impl Into<String>) -> Self {
        Self {
            partition_id: partition_id.into(),
            records: SegmentedLog::new(),
            published: CachePadded::new(AtomicUsize::new(0)),
            writer_claimed: AtomicBool::new(false),
        }
    }

    /// Build a ledger from recovered records, published in one step
    pub(crate) fn from_records(
        partition_id: impl Into<String>,
        records: Vec<TransactionRecord>,
    ) -> Result<Self> {
        let ledger = Self::new(partition_id);
        let count = records.len();

        for (index, record) in records.into_iter().enumerate() {
            if ledger.records.set(index, record).is_err() {
                return Err(LedgerError::invalid_argument(
                    format!("ledger capacity of {} records exhausted", CAPACITY),
                    ErrorContext::new("ledger", "from_records").partition(ledger.partition_id.as_str()),
                ));
            }
        }

        ledger.published.store(count, Ordering::Release);
        Ok(ledger)
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the current published length; the returned view never grows.
    pub fn snapshot(&self) -> LedgerSnapshot<'_> {
        LedgerSnapshot {
            ledger: self,
            len: self.published.load(Ordering::Acquire),
        }
    }

    /// Copy of every published record, in append order
    pub fn to_vec(&self) -> Vec<TransactionRecord> {
        self.snapshot().to_vec()
    }

    /// Whether a writer handle is currently alive for this ledger
    pub fn is_writer_claimed(&self) -> bool {
        self.writer_claimed.load(Ordering::Acquire)
    }

    /// Claim the single writer slot; `None` if somebody else holds it
    pub(crate) fn try_claim(self: &Arc<Self>) -> Option<WriterClaim> {
        self.writer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| WriterClaim {
                ledger: Arc::clone(self),
            })
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("partition_id", &self.partition_id)
            .field("published", &self.len())
            .field("writer_claimed", &self.is_writer_claimed())
            .finish()
    }
}

/// A fixed-length, consistent view of a ledger's published prefix
#[derive(Clone, Copy)]
pub struct LedgerSnapshot<'a> {
    ledger: &'a Ledger,
    len: usize,
}

impl<'a> LedgerSnapshot<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&'a TransactionRecord> {
        if index >= self.len {
            return None;
        }
        self.ledger.records.get(index)
    }

    pub fn last(&self) -> Option<&'a TransactionRecord> {
        self.len.checked_sub(1).and_then(|index| self.get(index))
    }

    /// Records in append order
    pub fn iter(&self) -> impl Iterator<Item = &'a TransactionRecord> + 'a {
        let records = &self.ledger.records;
        (0..self.len).filter_map(move |index| records.get(index))
    }

    pub fn to_vec(&self) -> Vec<TransactionRecord> {
        let mut out = Vec::with_capacity(self.len);
        out.extend(self.iter().cloned());
        out
    }

    /// Linear scan for a transaction id
    pub fn contains_trans_id(&self, trans_id: &str) -> bool {
        self.iter().any(|record| record.trans_id == trans_id)
    }
}

/// Exclusive right to append to one ledger. Released on drop.
pub(crate) struct WriterClaim {
    ledger: Arc<Ledger>,
}

impl WriterClaim {
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Room left for at least one more record
    pub fn has_capacity(&self) -> bool {
        self.ledger.len() < CAPACITY
    }

    /// Write the next slot, then make it visible. Returns its position.
    pub fn publish(&self, record: TransactionRecord) -> Result<usize> {
        // Only the claim holder moves the cursor, so this is the next free slot
        let position = self.ledger.published.load(Ordering::Acquire);

        if self.ledger.records.set(position, record).is_err() {
            return Err(LedgerError::invalid_argument(
                format!("slot {} unavailable (capacity {})", position, CAPACITY),
                ErrorContext::new("ledger", "publish").partition(self.ledger.partition_id.as_str()),
            ));
        }

        self.ledger.published.fetch_add(1, Ordering::Release);
        Ok(position)
    }
}

impl Drop for WriterClaim {
    fn drop(&mut self) {
        self.ledger.writer_claimed.store(false, Ordering::Release);
    }
}
