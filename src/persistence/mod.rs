//! Persistence Module
//!
//! Durability for the in-memory ledgers.
//!
//! ## Write Path
//! ```text
//! append ──► WAL line (fsync) ──► publish in memory
//! ```
//!
//! ## Checkpoint
//! ```text
//! current.wal ──rotate──► wal_N.log
//!                              │
//! all partitions ──► snapshot_N.json.tmp ──fsync, rename──► snapshot_N.json
//!                                                                │
//!                                   delete wal_{≤N}.log, snapshot_{<N}.json
//! ```
//!
//! ## Startup
//! 1. Lock the directory, drop stale `.tmp` files, repair a torn WAL tail
//! 2. Load the newest snapshot (if any)
//! 3. Replay WAL segments newer than it, then `current.wal`
//! 4. Validate; on corruption, quarantine everything and start empty

mod integrity;
mod lock;
mod manager;
mod snapshot;

pub use integrity::{validate_data_integrity, IntegrityReport};
pub use lock::{DataDirLock, LOCK_FILENAME};
pub use manager::{PersistenceManager, RecoveredState, StorageInfo};
pub use snapshot::{
    latest_snapshot, list_snapshots, parse_snapshot_seq, read_snapshot, remove_stale_tmp,
    snapshot_filename, write_snapshot, SnapshotInfo,
};

pub use crate::wal::PartitionData;
