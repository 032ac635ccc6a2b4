//! Store Module
//!
//! Owns every partition's ledger and coordinates appends with persistence.
//!
//! ## Write Path
//! ```text
//! writer(partition) ── claim ──► LedgerWriter::append(record)
//!                                   │ validate (ids, quantity, price, timestamp)
//!                                   │ duplicate scan over the published prefix
//!                                   │ ┌─ checkpoint gate (shared) ─────────┐
//!                                   │ │ WAL line + flush ──► publish slot  │
//!                                   │ └────────────────────────────────────┘
//!                                   ▼ maybe checkpoint
//! ```
//!
//! ## Concurrency Model
//! - **Writes**: one `LedgerWriter` per partition at a time. A second claim
//!   fails with `WriterBusy`; different partitions append in parallel.
//! - **Reads**: an acquire load of the partition's cursor, then a scan of
//!   immutable slots. Reads never wait for a writer.
//! - **Checkpoints**: hold the gate exclusively, so no append sits between
//!   its WAL line and its publish while the snapshot is taken.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::Config;
use crate::error::{ErrorContext, ErrorKind, LedgerError, Result};
use crate::ledger::{Ledger, LedgerSnapshot, WriterClaim};
use crate::metrics::{self, Metrics, NoopMetrics};
use crate::persistence::{PartitionData, PersistenceManager, SnapshotInfo, StorageInfo};
use crate::record::{compare_timestamps, now_timestamp, TransactionRecord};
use crate::views::{self, DocumentSummary, InOutSummary, Inventory, ItemSummary};

/// Per-process suffix for generated transaction ids
static TRANSACTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What happened to on-disk data when the store opened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryReport {
    /// Persistence disabled; nothing was read
    InMemory,

    /// Data loaded and validated
    Recovered {
        /// Sequence of the snapshot recovery started from
        snapshot_seq: Option<u64>,
        snapshot_transactions: usize,
        wal_entries_recovered: u64,
        wal_entries_skipped: u64,
        partitions: usize,
        transactions: usize,
        duplicate_trans_ids: usize,
    },

    /// Data failed validation, was moved aside, and the store started empty
    Discarded {
        reason: String,
        quarantine_dir: PathBuf,
    },
}

impl RecoveryReport {
    pub fn is_discarded(&self) -> bool {
        matches!(self, RecoveryReport::Discarded { .. })
    }
}

/// Point-in-time store statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub partitions: usize,
    pub transactions: usize,
    pub approximate_memory_bytes: usize,
    pub persistence_enabled: bool,
    pub pending_wal_bytes: Option<u64>,
}

/// Multi-tenant transaction ledger store
pub struct Store {
    config: Config,

    // --- Ledgers ---
    /// Exclusive lock only when a partition is first created
    partitions: RwLock<HashMap<String, Arc<Ledger>>>,

    // --- Durability ---
    persistence: Option<PersistenceManager>,

    /// Shared by appends from WAL write to publish; exclusive for snapshots
    checkpoint_gate: RwLock<()>,

    /// Set while an automatic checkpoint runs
    checkpoint_running: AtomicBool,

    // --- Observability ---
    metrics: Arc<dyn Metrics>,
    recovery: RecoveryReport,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open a store with metrics disabled
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Open a store, recovering whatever the data directory holds.
    ///
    /// On startup:
    /// 1. Lock the data directory and repair a torn WAL tail
    /// 2. Load the newest snapshot, then replay newer WAL
    /// 3. Validate; corrupt data is quarantined and the store starts empty
    pub fn open_with_metrics(config: Config, metrics: Arc<dyn Metrics>) -> Result<Self> {
        if !config.persistence_enabled {
            tracing::info!("persistence disabled, starting in memory");
            return Ok(Self::assemble(
                config,
                HashMap::new(),
                None,
                metrics,
                RecoveryReport::InMemory,
            ));
        }

        let persistence = PersistenceManager::open(&config)?;

        let (partitions, recovery) = match Self::recover_partitions(&persistence) {
            Ok(recovered) => recovered,
            Err(e) if e.kind() == ErrorKind::DataCorruption => {
                tracing::error!(
                    severity = "critical",
                    error = %e,
                    data_dir = %config.data_dir.display(),
                    "recovered data failed validation, starting empty"
                );
                metrics.increment_counter(metrics::RECOVERY_CORRUPTION, &[]);
                let quarantine_dir = persistence.quarantine()?;
                (
                    HashMap::new(),
                    RecoveryReport::Discarded {
                        reason: e.to_string(),
                        quarantine_dir,
                    },
                )
            }
            Err(e) => return Err(e),
        };

        Ok(Self::assemble(
            config,
            partitions,
            Some(persistence),
            metrics,
            recovery,
        ))
    }

    fn assemble(
        config: Config,
        partitions: HashMap<String, Arc<Ledger>>,
        persistence: Option<PersistenceManager>,
        metrics: Arc<dyn Metrics>,
        recovery: RecoveryReport,
    ) -> Self {
        let store = Self {
            config,
            partitions: RwLock::new(partitions),
            persistence,
            checkpoint_gate: RwLock::new(()),
            checkpoint_running: AtomicBool::new(false),
            metrics,
            recovery,
        };
        store.report_size();
        store
    }

    fn recover_partitions(
        persistence: &PersistenceManager,
    ) -> Result<(HashMap<String, Arc<Ledger>>, RecoveryReport)> {
        let state = persistence.recover()?;
        let integrity = persistence.validate_data_integrity(&state.data)?;

        let transactions: usize = state.data.values().map(Vec::len).sum();
        let mut partitions = HashMap::with_capacity(state.data.len());
        for (partition_id, records) in state.data {
            let ledger = Ledger::from_records(partition_id.as_str(), records)?;
            partitions.insert(partition_id, Arc::new(ledger));
        }

        let report = RecoveryReport::Recovered {
            snapshot_seq: state.snapshot.as_ref().map(|s| s.seq),
            snapshot_transactions: state.snapshot.as_ref().map_or(0, |s| s.transactions),
            wal_entries_recovered: state.wal.entries_recovered,
            wal_entries_skipped: state.wal.entries_corrupted,
            partitions: partitions.len(),
            transactions,
            duplicate_trans_ids: integrity.duplicate_trans_ids.len(),
        };
        tracing::info!(
            partitions = partitions.len(),
            transactions,
            "recovery complete"
        );
        Ok((partitions, report))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Claim the single writer for `partition_id`, creating the partition if
    /// needed. Fails with `WriterBusy` while another handle is alive.
    pub fn writer(&self, partition_id: &str) -> Result<LedgerWriter<'_>> {
        let context = || ErrorContext::new("store", "writer").partition(partition_id);

        if partition_id.is_empty() {
            return Err(LedgerError::invalid_argument(
                "partition id cannot be empty",
                context(),
            ));
        }

        let ledger = self.get_or_create(partition_id);
        match ledger.try_claim() {
            Some(claim) => Ok(LedgerWriter { store: self, claim }),
            None => Err(LedgerError::writer_busy(
                format!("partition '{}' already has an active writer", partition_id),
                context(),
            )),
        }
    }

    /// Claim, append one record, release. Returns the record's position.
    pub fn append_transaction(
        &self,
        partition_id: &str,
        record: TransactionRecord,
    ) -> Result<usize> {
        self.writer(partition_id)?.append(record)
    }

    fn get_or_create(&self, partition_id: &str) -> Arc<Ledger> {
        if let Some(ledger) = self.partitions.read().get(partition_id) {
            return Arc::clone(ledger);
        }

        let mut partitions = self.partitions.write();
        let ledger = partitions
            .entry(partition_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(partition = partition_id, "created partition");
                Arc::new(Ledger::new(partition_id))
            });
        Arc::clone(ledger)
    }

    fn append_with_claim(&self, claim: &WriterClaim, record: TransactionRecord) -> Result<usize> {
        let started = Instant::now();
        let partition_id = claim.ledger().partition_id();
        let trans_id = record.trans_id.clone();
        let kind = record.kind;

        let result = self.append_inner(claim, record);
        match &result {
            Ok(position) => {
                self.metrics.increment_counter(
                    metrics::TRANSACTIONS_APPENDED,
                    &[("partition", partition_id), ("type", kind.as_str())],
                );
                self.metrics
                    .observe_histogram(metrics::APPEND_DURATION, started.elapsed().as_secs_f64());
                tracing::debug!(
                    partition = partition_id,
                    trans_id = %trans_id,
                    position,
                    "transaction appended"
                );
            }
            Err(e) => {
                self.metrics.increment_counter(
                    metrics::APPEND_ERRORS,
                    &[("partition", partition_id), ("kind", e.kind().as_str())],
                );
                tracing::warn!(
                    partition = partition_id,
                    trans_id = %trans_id,
                    error = %e,
                    "append rejected"
                );
            }
        }

        if result.is_ok() {
            self.maybe_checkpoint();
        }
        result
    }

    fn append_inner(&self, claim: &WriterClaim, mut record: TransactionRecord) -> Result<usize> {
        let ledger = claim.ledger();
        let partition_id = ledger.partition_id();
        let view = ledger.snapshot();
        let latest = view.last().map(|r| r.timestamp.as_str());

        if record.timestamp.is_empty() {
            let now = now_timestamp();
            record.timestamp = match latest {
                Some(latest) if compare_timestamps(latest, &now).is_gt() => {
                    latest.to_string()
                }
                _ => now,
            };
        }

        record.validate(partition_id)?;

        let context = || {
            ErrorContext::new("store", "append_transaction")
                .partition(partition_id)
                .transaction(record.trans_id.as_str())
        };

        if let Some(latest) = latest {
            if compare_timestamps(&record.timestamp, latest).is_lt() {
                return Err(LedgerError::invalid_argument(
                    format!(
                        "timestamp '{}' is earlier than the partition's latest '{}'",
                        record.timestamp, latest
                    ),
                    context(),
                ));
            }
        }

        if view.contains_trans_id(&record.trans_id) {
            return Err(LedgerError::duplicate_key(
                format!("transaction id '{}' already exists", record.trans_id),
                context(),
            ));
        }

        if !claim.has_capacity() {
            return Err(LedgerError::invalid_argument(
                "partition has reached its record capacity",
                context(),
            ));
        }

        let _gate = self.checkpoint_gate.read();
        if let Some(persistence) = &self.persistence {
            let started = Instant::now();
            persistence.write_to_wal(partition_id, &record)?;
            self.metrics.increment_counter(metrics::WAL_WRITES, &[]);
            self.metrics
                .observe_histogram(metrics::WAL_WRITE_DURATION, started.elapsed().as_secs_f64());
        }
        claim.publish(record)
    }

    fn maybe_checkpoint(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if !persistence.should_create_snapshot() {
            return;
        }
        if self
            .checkpoint_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Err(e) = self.create_snapshot() {
            tracing::error!(error = %e, "automatic snapshot failed");
        }
        self.checkpoint_running.store(false, Ordering::Release);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every published record, in append order. Unknown partitions are empty.
    pub fn get_transactions(&self, partition_id: &str) -> Vec<TransactionRecord> {
        self.read(partition_id, |view| view.to_vec())
    }

    pub fn get_transaction_count(&self, partition_id: &str) -> usize {
        self.lookup(partition_id).map_or(0, |ledger| ledger.len())
    }

    pub fn calculate_inventory(&self, partition_id: &str) -> Inventory {
        self.read(partition_id, |view| views::calculate_inventory(view.iter()))
    }

    /// Items whose running total is positive
    pub fn get_current_items(&self, partition_id: &str) -> Vec<ItemSummary> {
        self.read(partition_id, |view| views::current_items(view.iter()))
    }

    pub fn get_documents(&self, partition_id: &str) -> Vec<DocumentSummary> {
        self.read(partition_id, |view| {
            views::build_document_summaries(partition_id, view.iter())
        })
    }

    /// Records with `start <= timestamp <= end`
    pub fn get_transactions_by_time_range(
        &self,
        partition_id: &str,
        start: &str,
        end: &str,
    ) -> Vec<TransactionRecord> {
        self.read(partition_id, |view| {
            views::filter_by_time_range(view.iter(), start, end)
        })
    }

    pub fn get_transactions_by_item(&self, partition_id: &str, item_id: &str) -> Vec<TransactionRecord> {
        self.read(partition_id, |view| views::filter_by_item(view.iter(), item_id))
    }

    pub fn get_transactions_by_document(
        &self,
        partition_id: &str,
        document_no: &str,
    ) -> Vec<TransactionRecord> {
        self.read(partition_id, |view| {
            views::filter_by_document(view.iter(), document_no)
        })
    }

    pub fn get_transactions_by_partner(
        &self,
        partition_id: &str,
        partner_id: &str,
    ) -> Vec<TransactionRecord> {
        self.read(partition_id, |view| {
            views::filter_by_partner(view.iter(), partner_id)
        })
    }

    /// Number of distinct items currently in stock
    pub fn get_item_type_count(&self, partition_id: &str) -> usize {
        self.read(partition_id, |view| views::item_type_count(view.iter()))
    }

    pub fn get_in_out_summary(&self, partition_id: &str, start: &str, end: &str) -> InOutSummary {
        self.read(partition_id, |view| {
            views::in_out_summary(view.iter(), start, end)
        })
    }

    pub fn get_inventory_by_category(&self, partition_id: &str) -> BTreeMap<String, i64> {
        self.read(partition_id, |view| views::inventory_by_category(view.iter()))
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    /// Partitions holding at least one record, sorted
    pub fn partition_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .partitions
            .read()
            .values()
            .filter(|ledger| !ledger.is_empty())
            .map(|ledger| ledger.partition_id().to_string())
            .collect();
        ids.sort();
        ids
    }

    pub fn has_partition(&self, partition_id: &str) -> bool {
        self.lookup(partition_id).is_some()
    }

    /// Shared handle to a partition's ledger. Reads through it take no lock.
    pub fn ledger(&self, partition_id: &str) -> Result<Arc<Ledger>> {
        self.lookup(partition_id).ok_or_else(|| {
            LedgerError::not_found(
                format!("partition '{}' does not exist", partition_id),
                ErrorContext::new("store", "ledger").partition(partition_id),
            )
        })
    }

    /// A partition is visible once it holds a record
    fn lookup(&self, partition_id: &str) -> Option<Arc<Ledger>> {
        self.partitions
            .read()
            .get(partition_id)
            .filter(|ledger| !ledger.is_empty())
            .cloned()
    }

    fn read<R, F>(&self, partition_id: &str, f: F) -> R
    where
        R: Default,
        F: FnOnce(LedgerSnapshot<'_>) -> R,
    {
        match self.lookup(partition_id) {
            Some(ledger) => f(ledger.snapshot()),
            None => R::default(),
        }
    }

    fn all_ledgers(&self) -> Vec<Arc<Ledger>> {
        self.partitions.read().values().cloned().collect()
    }

    // ========================================================================
    // Status & Maintenance
    // ========================================================================

    pub fn status(&self) -> SystemStatus {
        let mut partitions = 0;
        let mut transactions = 0;
        let mut approximate_memory_bytes = 0;

        for ledger in self.all_ledgers() {
            let view = ledger.snapshot();
            if view.is_empty() {
                continue;
            }
            partitions += 1;
            transactions += view.len();
            approximate_memory_bytes += view.iter().map(|r| r.approximate_size()).sum::<usize>();
        }

        SystemStatus {
            partitions,
            transactions,
            approximate_memory_bytes,
            persistence_enabled: self.persistence.is_some(),
            pending_wal_bytes: self.persistence.as_ref().map(|p| p.pending_wal_bytes()),
        }
    }

    /// On-disk footprint; `None` when persistence is disabled
    pub fn storage_info(&self) -> Result<Option<StorageInfo>> {
        self.persistence
            .as_ref()
            .map(|p| p.storage_info())
            .transpose()
    }

    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// "TXN" + UTC `YYYYMMDDHHMMSSmmm` + a 4-digit per-process counter
    pub fn generate_transaction_id(&self) -> String {
        let counter = TRANSACTION_COUNTER.fetch_add(1, Ordering::Relaxed) % 10_000;
        format!("TXN{}{:04}", Utc::now().format("%Y%m%d%H%M%S%3f"), counter)
    }

    /// Checkpoint every partition now
    pub fn create_snapshot(&self) -> Result<SnapshotInfo> {
        let persistence = self.persistence.as_ref().ok_or_else(|| {
            LedgerError::invalid_argument(
                "snapshots require persistence to be enabled",
                ErrorContext::new("store", "create_snapshot"),
            )
        })?;

        let _gate = self.checkpoint_gate.write();
        let data = self.collect_partition_data();
        let info = persistence.create_snapshot(&data)?;

        self.metrics.increment_counter(metrics::SNAPSHOTS_CREATED, &[]);
        self.report_size();
        Ok(info)
    }

    /// Copy of every non-empty partition
    fn collect_partition_data(&self) -> PartitionData {
        self.all_ledgers()
            .into_iter()
            .filter(|ledger| !ledger.is_empty())
            .map(|ledger| (ledger.partition_id().to_string(), ledger.to_vec()))
            .collect()
    }

    fn report_size(&self) {
        let status = self.status();
        self.metrics
            .set_gauge(metrics::PARTITIONS, status.partitions as f64);
        self.metrics
            .set_gauge(metrics::TRANSACTIONS, status.transactions as f64);
    }

    /// Shut down cleanly: final snapshot (if configured and anything changed)
    /// and a WAL flush. Dropping a store without calling this is a crash as
    /// far as recovery is concerned.
    pub fn close(self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        if self.config.snapshot_on_shutdown && persistence.pending_wal_bytes() > 0 {
            if let Err(e) = self.create_snapshot() {
                tracing::warn!(error = %e, "final snapshot failed, WAL remains authoritative");
            }
        }

        persistence.flush_wal()?;
        tracing::info!(data_dir = %persistence.data_dir().display(), "store closed");
        Ok(())
    }
}

/// Exclusive append handle for one partition. Dropping it lets another
/// writer claim the partition.
pub struct LedgerWriter<'s> {
    store: &'s Store,
    claim: WriterClaim,
}

impl LedgerWriter<'_> {
    /// Validate, log and publish one record. Returns its position.
    pub fn append(&mut self, record: TransactionRecord) -> Result<usize> {
        self.store.append_with_claim(&self.claim, record)
    }

    pub fn partition_id(&self) -> &str {
        self.claim.ledger().partition_id()
    }

    /// Records published so far
    pub fn len(&self) -> usize {
        self.claim.ledger().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LedgerWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerWriter")
            .field("partition_id", &self.partition_id())
            .field("len", &self.len())
            .finish()
    }
}
