//! # stockledger
//!
//! An embedded, multi-tenant, append-only inventory ledger with:
//! - One immutable fact per stock movement, partitioned by tenant
//! - Wait-free readers alongside a single writer per partition
//! - Write-Ahead Logging (WAL) for durability
//! - Checkpoint snapshots and crash recovery
//! - Inventory, item and document views derived on demand
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │        (partition registry, validation, derived views)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────┐
//!   │ Persistence │          │     Ledgers      │
//!   │ WAL+snapshot│          │ set-once slots + │
//!   └─────────────┘          │ published cursor │
//!                            └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stockledger::{Config, Store, TransactionRecord, TransactionType};
//!
//! # fn main() -> stockledger::Result<()> {
//! let store = Store::open(Config::builder().data_dir("./data").build())?;
//! store.append_transaction(
//!     "mgr1",
//!     TransactionRecord::new("T1", "I1", TransactionType::In, 5, 10.0),
//! )?;
//! assert_eq!(store.get_transaction_count("mgr1"), 1);
//! store.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod record;
pub mod metrics;

pub mod ledger;
pub mod views;
pub mod wal;
pub mod persistence;
pub mod protocol;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, ConfigBuilder, SnapshotPolicy, WalSyncStrategy};
pub use error::{ErrorContext, ErrorKind, LedgerError, Result};
pub use ledger::{Ledger, LedgerSnapshot};
pub use crate::metrics::{InMemoryMetrics, Metrics, NoopMetrics, RecorderMetrics};
pub use persistence::{IntegrityReport, PersistenceManager, SnapshotInfo, StorageInfo};
pub use record::{TransactionRecord, TransactionType};
pub use store::{LedgerWriter, RecoveryReport, Store, SystemStatus};
pub use views::{DocumentSummary, InOutSummary, Inventory, InventoryRecord, ItemSummary};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of stockledger
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
