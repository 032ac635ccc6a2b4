//! Snapshot files
//!
//! A snapshot is a full copy of every partition, written as:
//!
//! ```text
//! # stockledger snapshot
//! # sequence: 7
//! # created_at: 2024-01-15T10:30:00.000Z
//! # partitions: 2
//! # transactions: 41
//! {"partition_id":"mgr1","transactions":[{...},{...}]}
//! {"partition_id":"mgr2","transactions":[...]}
//! ```
//!
//! `snapshot_{seq}.json` holds the state after WAL segment `seq`. It is
//! written to a `.tmp` file, fsynced, then renamed into place, so a reader
//! only ever sees a complete snapshot or none.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, LedgerError, Result};
use crate::record::{now_timestamp, TransactionRecord};
use crate::wal::{sync_dir, PartitionData};

const SNAPSHOT_PREFIX: &str = "snapshot_";
const SNAPSHOT_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";

/// Metadata about a snapshot on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Highest WAL segment this snapshot covers
    pub seq: u64,
    pub path: PathBuf,
    pub created_at: String,
    pub partitions: usize,
    pub transactions: usize,
    pub size_bytes: u64,
}

#[derive(Serialize)]
struct PartitionLineRef<'a> {
    partition_id: &'a str,
    transactions: &'a [TransactionRecord],
}

#[derive(Deserialize)]
struct PartitionLine {
    partition_id: String,
    transactions: Vec<TransactionRecord>,
}

pub fn snapshot_filename(seq: u64) -> String {
    format!("{}{:020}{}", SNAPSHOT_PREFIX, seq, SNAPSHOT_SUFFIX)
}

pub fn parse_snapshot_seq(filename: &str) -> Option<u64> {
    filename
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?
        .parse()
        .ok()
}

/// Snapshots in `dir`, oldest first
pub fn list_snapshots(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut snapshots = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(seq) = entry.file_name().to_str().and_then(parse_snapshot_seq) {
            snapshots.push((seq, entry.path()));
        }
    }
    snapshots.sort_by_key(|(seq, _)| *seq);
    Ok(snapshots)
}

pub fn latest_snapshot(dir: &Path) -> io::Result<Option<(u64, PathBuf)>> {
    Ok(list_snapshots(dir)?.pop())
}

/// Delete `.tmp` files left behind by a snapshot that never finished
pub fn remove_stale_tmp(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(TMP_SUFFIX) {
            fs::remove_file(entry.path())?;
            tracing::warn!(file = name, "removed incomplete snapshot");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write `data` as snapshot `seq`: tmp file, fsync, rename, fsync directory
pub fn write_snapshot(dir: &Path, seq: u64, data: &PartitionData) -> Result<SnapshotInfo> {
    let context = || ErrorContext::new("snapshot", "write");
    let io_err = |e: io::Error| LedgerError::io(e, context());

    let path = dir.join(snapshot_filename(seq));
    let tmp_path = dir.join(format!("{}{}", snapshot_filename(seq), TMP_SUFFIX));
    let created_at = now_timestamp();
    let transactions: usize = data.values().map(Vec::len).sum();

    let file = File::create(&tmp_path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# stockledger snapshot").map_err(io_err)?;
    writeln!(out, "# sequence: {}", seq).map_err(io_err)?;
    writeln!(out, "# created_at: {}", created_at).map_err(io_err)?;
    writeln!(out, "# partitions: {}", data.len()).map_err(io_err)?;
    writeln!(out, "# transactions: {}", transactions).map_err(io_err)?;

    for (partition_id, records) in data {
        let line = PartitionLineRef {
            partition_id,
            transactions: records,
        };
        serde_json::to_writer(&mut out, &line).map_err(|e| {
            LedgerError::io_message(
                format!("failed to serialize partition '{}': {}", partition_id, e),
                context().partition(partition_id.as_str()),
            )
        })?;
        out.write_all(b"\n").map_err(io_err)?;
    }

    let file = out.into_inner().map_err(|e| io_err(e.into_error()))?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, &path).map_err(io_err)?;
    sync_dir(dir).map_err(io_err)?;

    let size_bytes = fs::metadata(&path).map_err(io_err)?.len();
    Ok(SnapshotInfo {
        seq,
        path,
        created_at,
        partitions: data.len(),
        transactions,
        size_bytes,
    })
}

/// Load snapshot `seq` from `path`. Any line that does not parse makes the
/// whole snapshot unusable.
pub fn read_snapshot(seq: u64, path: &Path) -> Result<(SnapshotInfo, PartitionData)> {
    let context = || ErrorContext::new("snapshot", "read");

    let file = File::open(path).map_err(|e| LedgerError::io(e, context()))?;
    let size_bytes = file.metadata().map_err(|e| LedgerError::io(e, context()))?.len();

    let mut data = PartitionData::new();
    let mut created_at = String::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                LedgerError::data_corruption(
                    format!("{}:{}: invalid UTF-8", path.display(), index + 1),
                    context(),
                )
            } else {
                LedgerError::io(e, context())
            }
        })?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            if let Some(value) = comment.trim().strip_prefix("created_at:") {
                created_at = value.trim().to_string();
            }
            continue;
        }

        let parsed: PartitionLine = serde_json::from_str(trimmed).map_err(|e| {
            LedgerError::data_corruption(
                format!("{}:{}: {}", path.display(), index + 1, e),
                context(),
            )
        })?;
        data.entry(parsed.partition_id)
            .or_default()
            .extend(parsed.transactions);
    }

    let info = SnapshotInfo {
        seq,
        path: path.to_path_buf(),
        created_at,
        partitions: data.len(),
        transactions: data.values().map(Vec::len).sum(),
        size_bytes,
    };
    Ok((info, data))
}
