//! WAL Writer
//!
//! Handles appending lines to the active WAL file and sealing it into
//! segments.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{ErrorContext, LedgerError, Result};
use crate::record::TransactionRecord;

use super::{encode_line, list_segments, segment_filename, sync_dir, ACTIVE_WAL_FILENAME};

/// Writes entries to the active WAL file
pub struct WalWriter {
    /// Directory holding the active file and sealed segments
    dir: PathBuf,

    /// Active file, opened in append mode
    file: File,

    /// Bytes in the active file
    active_bytes: u64,

    /// Bytes in sealed segments not yet covered by a snapshot
    sealed_bytes: u64,

    /// Number the next sealed segment gets
    next_seq: u64,

    sync_strategy: WalSyncStrategy,

    /// Entries written since the last fsync
    unsynced: usize,

    /// Seal the active file once it exceeds this size
    rotation_bytes: u64,

    /// Whether opening cut off a partially written last line
    repaired_tail: bool,
}

impl WalWriter {
    /// Open or create the active WAL in `dir`.
    ///
    /// Segment numbering continues after the highest sealed segment, and never
    /// drops below `min_next_seq` (so it stays ahead of existing snapshots).
    /// A last line without its newline is a write that never completed; it
    /// is truncated away before anything else reads the file.
    pub fn open(
        dir: &Path,
        sync_strategy: WalSyncStrategy,
        rotation_bytes: u64,
        min_next_seq: u64,
    ) -> Result<Self> {
        let context = || ErrorContext::new("wal", "open");

        let segments = list_segments(dir).map_err(|e| LedgerError::io(e, context()))?;
        let mut sealed_bytes = 0;
        for (_, path) in &segments {
            sealed_bytes += fs::metadata(path).map_err(|e| LedgerError::io(e, context()))?.len();
        }
        let next_seq = segments
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(1)
            .max(min_next_seq);

        let path = dir.join(ACTIVE_WAL_FILENAME);
        let repaired_tail = repair_torn_tail(&path).map_err(|e| LedgerError::io(e, context()))?;
        if repaired_tail {
            tracing::warn!(path = %path.display(), "truncated incomplete last line of WAL");
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::io(e, context()))?;
        let active_bytes = file
            .metadata()
            .map_err(|e| LedgerError::io(e, context()))?
            .len();

        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            active_bytes,
            sealed_bytes,
            next_seq,
            sync_strategy,
            unsynced: 0,
            rotation_bytes,
            repaired_tail,
        })
    }

    /// Append one record as a single line.
    ///
    /// Either the whole line is written (and synced according to the
    /// strategy) or the file is cut back to its previous length and an error
    /// is returned.
    pub fn append(&mut self, partition_id: &str, record: &TransactionRecord) -> Result<u64> {
        let mut line = encode_line(partition_id, record);
        line.push('\n');
        let bytes = line.as_bytes();
        let offset = self.active_bytes;

        if let Err(e) = self.write_line(bytes) {
            if let Err(truncate_err) = self.file.set_len(offset) {
                tracing::error!(error = %truncate_err, "could not roll back partial WAL write");
            }
            return Err(LedgerError::io(
                e,
                ErrorContext::new("wal", "append")
                    .partition(partition_id)
                    .transaction(record.trans_id.as_str()),
            ));
        }

        self.active_bytes += bytes.len() as u64;
        Ok(bytes.len() as u64)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| LedgerError::io(e, ErrorContext::new("wal", "sync")))?;
        self.unsynced = 0;
        Ok(())
    }

    /// Whether the active file has grown past the rotation threshold
    pub fn should_rotate(&self) -> bool {
        self.active_bytes > self.rotation_bytes
    }

    /// Seal the active file as the next numbered segment and start a new one.
    /// Returns the sealed segment's number.
    pub fn rotate(&mut self) -> Result<u64> {
        let context = || ErrorContext::new("wal", "rotate");
        self.sync()?;

        let seq = self.next_seq;
        let active = self.active_path();
        let sealed = self.dir.join(segment_filename(seq));
        fs::rename(&active, &sealed).map_err(|e| LedgerError::io(e, context()))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active)
            .map_err(|e| LedgerError::io(e, context()))?;
        sync_dir(&self.dir).map_err(|e| LedgerError::io(e, context()))?;

        self.file = file;
        self.sealed_bytes += self.active_bytes;
        self.active_bytes = 0;
        self.next_seq += 1;

        tracing::debug!(segment = seq, path = %sealed.display(), "sealed WAL segment");
        Ok(seq)
    }

    /// Sealed segments up to `seq` are covered by a snapshot; stop counting them
    pub fn mark_checkpointed(&mut self, sealed_bytes_removed: u64) {
        self.sealed_bytes = self.sealed_bytes.saturating_sub(sealed_bytes_removed);
    }

    /// Replace the active file with an empty one (after quarantine moved it)
    pub fn reset(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())
            .map_err(|e| LedgerError::io(e, ErrorContext::new("wal", "reset")))?;
        self.file = file;
        self.active_bytes = 0;
        self.sealed_bytes = 0;
        self.unsynced = 0;
        Ok(())
    }

    pub fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_WAL_FILENAME)
    }

    pub fn active_bytes(&self) -> u64 {
        self.active_bytes
    }

    /// Active plus sealed bytes not yet covered by a snapshot
    pub fn pending_bytes(&self) -> u64 {
        self.active_bytes + self.sealed_bytes
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn repaired_tail(&self) -> bool {
        self.repaired_tail
    }

    fn write_line(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.unsynced += 1;
        if self.sync_due() {
            self.file.sync_data()?;
            self.unsynced = 0;
        }
        Ok(())
    }

    fn sync_due(&self) -> bool {
        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        }
    }
}

/// Cut the file back to just after its last newline. Returns true if
/// anything was removed.
fn repair_torn_tail(path: &Path) -> std::io::Result<bool> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }

    // Scan backwards in blocks for the last newline
    const BLOCK: u64 = 4096;
    let mut end = len;
    let mut buf = vec![0u8; BLOCK as usize];
    let mut keep = 0u64;
    while end > 0 {
        let start = end.saturating_sub(BLOCK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if keep == len {
        return Ok(false);
    }
    file.set_len(keep)?;
    file.sync_all()?;
    Ok(true)
}
