//! WAL Reader
//!
//! Handles reading lines back from a WAL file.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Take};
use std::path::Path;

use crate::error::{ErrorContext, LedgerError, Result};

use super::{decode_line, WalEntry};

/// One line of a WAL file
#[derive(Debug, Clone, PartialEq)]
pub enum WalLine {
    /// A well-formed entry
    Entry(WalEntry),

    /// A line that could not be decoded (1-based line number)
    Malformed { line_no: u64, reason: String },
}

/// Reads lines from a WAL file, oldest first
pub struct WalReader {
    /// Bounded to the file's length at open; bytes appended later are not read
    reader: BufReader<Take<File>>,
    line_no: u64,
    buf: Vec<u8>,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let context = || ErrorContext::new("wal", "open_reader");
        let file = File::open(path).map_err(|e| LedgerError::io(e, context()))?;
        let len = file.metadata().map_err(|e| LedgerError::io(e, context()))?.len();
        Ok(Self {
            reader: BufReader::new(file.take(len)),
            line_no: 0,
            buf: Vec::new(),
        })
    }

    /// Read the next non-blank line, or `None` at end of file
    pub fn next_line(&mut self) -> Result<Option<WalLine>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|e| LedgerError::io(e, ErrorContext::new("wal", "read")))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let bytes = trim_line_ending(&self.buf);
            if bytes.is_empty() {
                continue;
            }

            let line = match std::str::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    return Ok(Some(WalLine::Malformed {
                        line_no: self.line_no,
                        reason: format!("invalid UTF-8: {}", e),
                    }))
                }
            };

            return Ok(Some(match decode_line(line) {
                Ok(entry) => WalLine::Entry(entry),
                Err(e) => WalLine::Malformed {
                    line_no: self.line_no,
                    reason: e.to_string(),
                },
            }));
        }
    }
}

impl Iterator for WalReader {
    type Item = Result<WalLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

fn trim_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}
