//! Persistence Manager
//!
//! Owns everything on disk for one data directory: the directory lock, the
//! active WAL, sealed segments and snapshots.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{Config, SnapshotPolicy};
use crate::error::{ErrorContext, LedgerError, Result};
use crate::record::TransactionRecord;
use crate::wal::{
    list_segments, sync_dir, PartitionData, RecoveryResult, WalRecovery, WalWriter,
    ACTIVE_WAL_FILENAME,
};

use super::integrity::{self, IntegrityReport};
use super::lock::DataDirLock;
use super::snapshot::{self, SnapshotInfo};

/// Everything recovery found on disk, before validation
#[derive(Debug, Default)]
pub struct RecoveredState {
    pub data: PartitionData,

    /// Snapshot the data started from, if any
    pub snapshot: Option<SnapshotInfo>,

    /// WAL replayed on top of the snapshot
    pub wal: RecoveryResult,
}

/// On-disk footprint, for status output
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub data_dir: PathBuf,
    pub wal_path: PathBuf,
    pub wal_size_bytes: u64,
    pub sealed_segments: usize,

    /// Active plus sealed bytes not yet covered by a snapshot
    pub pending_wal_bytes: u64,

    pub latest_snapshot: Option<PathBuf>,
    pub latest_snapshot_time: Option<String>,
}

/// Durability layer: WAL, snapshots and recovery
pub struct PersistenceManager {
    data_dir: PathBuf,

    // --- Write path ---
    wal: Mutex<WalWriter>,

    // --- Snapshot scheduling ---
    snapshot_policy: SnapshotPolicy,
    last_snapshot_at: Mutex<Instant>,

    // Held for the manager's lifetime
    lock: DataDirLock,
}

impl PersistenceManager {
    /// Open the data directory, creating it if needed.
    ///
    /// Takes the directory lock, clears leftovers of interrupted snapshots
    /// and repairs a torn WAL tail. Does not read any records.
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.data_dir.clone();
        let context = || ErrorContext::new("persistence", "open");

        fs::create_dir_all(&dir).map_err(|e| LedgerError::io(e, context()))?;
        let lock = DataDirLock::acquire(&dir)?;

        snapshot::remove_stale_tmp(&dir).map_err(|e| LedgerError::io(e, context()))?;

        let latest_seq = snapshot::latest_snapshot(&dir)
            .map_err(|e| LedgerError::io(e, context()))?
            .map(|(seq, _)| seq)
            .unwrap_or(0);

        let wal = WalWriter::open(
            &dir,
            config.wal_sync_strategy,
            config.wal_rotation_bytes,
            latest_seq + 1,
        )?;

        tracing::info!(
            data_dir = %dir.display(),
            wal_bytes = wal.pending_bytes(),
            latest_snapshot = latest_seq,
            "persistence opened"
        );

        Ok(Self {
            data_dir: dir,
            wal: Mutex::new(wal),
            snapshot_policy: config.snapshot_policy,
            last_snapshot_at: Mutex::new(Instant::now()),
            lock,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    // ========================================================================
    // WAL
    // ========================================================================

    /// Append one record to the WAL and flush it. Returns once the line is
    /// durable (or handed to the OS, under `EveryNEntries`).
    pub fn write_to_wal(&self, partition_id: &str, record: &TransactionRecord) -> Result<()> {
        let mut wal = self.wal.lock();
        wal.append(partition_id, record)?;

        if wal.should_rotate() {
            // The record is already durable; a failed rotation only delays it
            if let Err(e) = wal.rotate() {
                tracing::warn!(error = %e, "WAL rotation failed");
            }
        }
        Ok(())
    }

    pub fn flush_wal(&self) -> Result<()> {
        self.wal.lock().sync()
    }

    /// Replay every WAL file on disk, ignoring snapshots
    pub fn recover_from_wal(&self) -> Result<(PartitionData, RecoveryResult)> {
        WalRecovery::recover(&self.data_dir, 0)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Load the newest snapshot, if there is one
    pub fn recover_from_snapshot(&self) -> Result<Option<(SnapshotInfo, PartitionData)>> {
        let latest = snapshot::latest_snapshot(&self.data_dir)
            .map_err(|e| LedgerError::io(e, ErrorContext::new("persistence", "recover_snapshot")))?;

        match latest {
            Some((seq, path)) => {
                let (info, data) = snapshot::read_snapshot(seq, &path)?;
                tracing::info!(
                    snapshot = %path.display(),
                    partitions = info.partitions,
                    transactions = info.transactions,
                    "loaded snapshot"
                );
                Ok(Some((info, data)))
            }
            None => Ok(None),
        }
    }

    /// Newest snapshot plus only the WAL written after it
    pub fn recover(&self) -> Result<RecoveredState> {
        let (snapshot, mut data, after_seq) = match self.recover_from_snapshot()? {
            Some((info, data)) => {
                let seq = info.seq;
                (Some(info), data, seq)
            }
            None => (None, PartitionData::new(), 0),
        };

        let wal = WalRecovery::recover_into(&self.data_dir, after_seq, &mut data)?;
        Ok(RecoveredState {
            data,
            snapshot,
            wal,
        })
    }

    pub fn validate_data_integrity(&self, data: &PartitionData) -> Result<IntegrityReport> {
        integrity::validate_data_integrity(data)
    }

    /// Checkpoint: seal the active WAL as segment N, write `data` as snapshot
    /// N, then drop segments and snapshots it supersedes.
    ///
    /// `data` must be exactly what the WAL holds; the caller keeps appends out
    /// while this runs.
    pub fn create_snapshot(&self, data: &PartitionData) -> Result<SnapshotInfo> {
        let mut wal = self.wal.lock();
        let seq = wal.rotate()?;
        let info = snapshot::write_snapshot(&self.data_dir, seq, data)?;

        let covered_bytes = self.remove_covered_files(seq);
        wal.mark_checkpointed(covered_bytes);
        *self.last_snapshot_at.lock() = Instant::now();

        tracing::info!(
            snapshot = %info.path.display(),
            seq,
            partitions = info.partitions,
            transactions = info.transactions,
            "snapshot created"
        );
        Ok(info)
    }

    /// Whether enough WAL has piled up (or enough time passed) for a snapshot
    pub fn should_create_snapshot(&self) -> bool {
        let pending = self.wal.lock().pending_bytes();
        if pending > self.snapshot_policy.wal_bytes_threshold {
            return true;
        }

        match self.snapshot_policy.interval {
            Some(interval) => pending > 0 && self.last_snapshot_at.lock().elapsed() >= interval,
            None => false,
        }
    }

    /// WAL bytes written since the last snapshot
    pub fn pending_wal_bytes(&self) -> u64 {
        self.wal.lock().pending_bytes()
    }

    /// Best effort; a leftover covered segment is skipped by the next recovery
    fn remove_covered_files(&self, seq: u64) -> u64 {
        let mut covered_bytes = 0;

        match list_segments(&self.data_dir) {
            Ok(segments) => {
                for (_, path) in segments.into_iter().filter(|(s, _)| *s <= seq) {
                    covered_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!(file = %path.display(), error = %e, "failed to remove WAL segment");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list WAL segments"),
        }

        match snapshot::list_snapshots(&self.data_dir) {
            Ok(snapshots) => {
                for (_, path) in snapshots.into_iter().filter(|(s, _)| *s < seq) {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!(file = %path.display(), error = %e, "failed to remove old snapshot");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list snapshots"),
        }

        covered_bytes
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub fn storage_info(&self) -> Result<StorageInfo> {
        let context = || ErrorContext::new("persistence", "storage_info");
        let wal = self.wal.lock();

        let sealed_segments = list_segments(&self.data_dir)
            .map_err(|e| LedgerError::io(e, context()))?
            .len();
        let latest = snapshot::latest_snapshot(&self.data_dir)
            .map_err(|e| LedgerError::io(e, context()))?;

        let latest_snapshot_time = latest
            .as_ref()
            .and_then(|(_, path)| fs::metadata(path).and_then(|m| m.modified()).ok())
            .map(|modified| {
                DateTime::<Utc>::from(modified)
                    .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                    .to_string()
            });

        Ok(StorageInfo {
            data_dir: self.data_dir.clone(),
            wal_path: wal.active_path(),
            wal_size_bytes: wal.active_bytes(),
            sealed_segments,
            pending_wal_bytes: wal.pending_bytes(),
            latest_snapshot: latest.map(|(_, path)| path),
            latest_snapshot_time,
        })
    }

    /// Move every WAL file and snapshot into `corrupt-<timestamp>/` and start
    /// over with an empty WAL. Returns the quarantine directory.
    pub fn quarantine(&self) -> Result<PathBuf> {
        let context = || ErrorContext::new("persistence", "quarantine");
        let io_err = |e: std::io::Error| LedgerError::io(e, context());
        let mut wal = self.wal.lock();

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut target = self.data_dir.join(format!("corrupt-{}", stamp));
        let mut suffix = 1;
        while target.exists() {
            target = self.data_dir.join(format!("corrupt-{}-{}", stamp, suffix));
            suffix += 1;
        }
        fs::create_dir(&target).map_err(io_err)?;

        let mut files: Vec<PathBuf> = list_segments(&self.data_dir)
            .map_err(io_err)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        files.extend(
            snapshot::list_snapshots(&self.data_dir)
                .map_err(io_err)?
                .into_iter()
                .map(|(_, path)| path),
        );
        let active = self.data_dir.join(ACTIVE_WAL_FILENAME);
        if active.exists() {
            files.push(active);
        }

        for path in &files {
            if let Some(name) = path.file_name() {
                fs::rename(path, target.join(name)).map_err(io_err)?;
            }
        }

        wal.reset()?;
        sync_dir(&self.data_dir).map_err(io_err)?;

        tracing::warn!(
            target = %target.display(),
            files = files.len(),
            "quarantined unrecoverable data"
        );
        Ok(target)
    }
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}
