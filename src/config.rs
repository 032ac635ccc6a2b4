//! Configuration for stockledger
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a stockledger instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── .lock                          (advisory process lock)
    ///     ├── current.wal                    (active write-ahead log)
    ///     ├── wal_00000000000000000001.log   (sealed WAL segments)
    ///     ├── snapshot_00000000000000000001.json
    ///     └── corrupt-<timestamp>/           (quarantined data, if any)
    pub data_dir: PathBuf,

    /// When false the store is purely in-memory: no WAL, no snapshots, no lock
    pub persistence_enabled: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Seal the active WAL file once it grows past this many bytes
    pub wal_rotation_bytes: u64,

    // -------------------------------------------------------------------------
    // Snapshot Configuration
    // -------------------------------------------------------------------------
    /// When to take automatic snapshots
    pub snapshot_policy: SnapshotPolicy,

    /// Take a final snapshot in `Store::close`
    pub snapshot_on_shutdown: bool,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N entries; every entry still reaches the OS before the
    /// append returns, so only power loss can drop the unsynced tail
    EveryNEntries { count: usize },
}

/// Automatic snapshot triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Snapshot once the WAL written since the last snapshot exceeds this size
    pub wal_bytes_threshold: u64,

    /// Optional time trigger: snapshot once this much time has passed since the
    /// last snapshot and the WAL is not empty
    pub interval: Option<Duration>,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            wal_bytes_threshold: 100 * 1024 * 1024, // 100 MB
            interval: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            persistence_enabled: true,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            wal_rotation_bytes: 16 * 1024 * 1024, // 16 MB
            snapshot_policy: SnapshotPolicy::default(),
            snapshot_on_shutdown: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Config for a store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            persistence_enabled: false,
            snapshot_on_shutdown: false,
            ..Self::default()
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable persistence
    pub fn persistence_enabled(mut self, enabled: bool) -> Self {
        self.config.persistence_enabled = enabled;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL rotation threshold (in bytes)
    pub fn wal_rotation_bytes(mut self, bytes: u64) -> Self {
        self.config.wal_rotation_bytes = bytes;
        self
    }

    /// Set the WAL volume that triggers an automatic snapshot (in bytes)
    pub fn snapshot_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.snapshot_policy.wal_bytes_threshold = bytes;
        self
    }

    /// Set the time-based snapshot trigger
    pub fn snapshot_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.snapshot_policy.interval = interval;
        self
    }

    /// Take (or skip) a final snapshot on close
    pub fn snapshot_on_shutdown(mut self, enabled: bool) -> Self {
        self.config.snapshot_on_shutdown = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
