//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append one line per accepted transaction before it becomes visible
//! - Flush each line to stable storage before the append returns
//! - Rotate the active file into numbered segments
//! - Replay every segment on startup, skipping lines that do not parse
//!
//! ## File Layout
//! ```text
//! {data_dir}/
//!   ├── wal_00000000000000000001.log   sealed segment 1
//!   ├── wal_00000000000000000002.log   sealed segment 2
//!   └── current.wal                    active file (always replayed last)
//! ```
//!
//! Segment numbers only grow. A snapshot numbered `N` replaces every segment
//! numbered `N` or lower.

mod entry;
mod reader;
mod recovery;
mod writer;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use entry::{decode_line, encode_line, LineError, WalEntry, FIELD_COUNT, FIELD_SEPARATOR};
pub use reader::{WalLine, WalReader};
pub use recovery::{PartitionData, RecoveryResult, WalRecovery};
pub use writer::WalWriter;

/// Name of the active WAL file
pub const ACTIVE_WAL_FILENAME: &str = "current.wal";

const SEGMENT_PREFIX: &str = "wal_";
const SEGMENT_SUFFIX: &str = ".log";

/// "wal_00000000000000000042.log"
pub fn segment_filename(seq: u64) -> String {
    format!("{}{:020}{}", SEGMENT_PREFIX, seq, SEGMENT_SUFFIX)
}

/// "wal_00000000000000000042.log" → Some(42)
pub fn parse_segment_seq(filename: &str) -> Option<u64> {
    filename
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Sealed segments in `dir`, oldest first
pub fn list_segments(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(seq) = entry.file_name().to_str().and_then(parse_segment_seq) {
            segments.push((seq, entry.path()));
        }
    }
    segments.sort_by_key(|(seq, _)| *seq);
    Ok(segments)
}

/// fsync a directory so renames and creations inside it are durable
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(dir)?.sync_all()
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}
