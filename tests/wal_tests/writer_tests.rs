//! Tests for WAL Writer and Reader
//!
//! These tests verify:
//! - Appending lines to the active WAL
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Rotation into numbered segments
//! - Torn-tail repair on open
//! - Reading lines back, including malformed ones

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use stockledger::config::WalSyncStrategy;
use stockledger::wal::{
    encode_line, list_segments, segment_filename, WalLine, WalReader, WalWriter,
    ACTIVE_WAL_FILENAME,
};
use stockledger::{TransactionRecord, TransactionType};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const NO_ROTATION: u64 = u64::MAX;

fn setup_temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn record(n: usize) -> TransactionRecord {
    TransactionRecord::new(format!("T{}", n), "I1", TransactionType::In, 1, 2.0)
        .with_timestamp("2024-01-01T00:00:00")
}

fn open_writer(dir: &Path) -> WalWriter {
    WalWriter::open(dir, WalSyncStrategy::EveryWrite, NO_ROTATION, 1).unwrap()
}

fn read_entries(path: &Path) -> Vec<WalLine> {
    WalReader::open(path).unwrap().map(|line| line.unwrap()).collect()
}

fn trans_ids(path: &Path) -> Vec<String> {
    read_entries(path)
        .into_iter()
        .filter_map(|line| match line {
            WalLine::Entry(entry) => Some(entry.record.trans_id),
            WalLine::Malformed { .. } => None,
        })
        .collect()
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_append_writes_one_line_per_record() {
    let temp = setup_temp_dir();
    let mut writer = open_writer(temp.path());

    let written = writer.append("mgr1", &record(1)).unwrap();
    writer.append("mgr1", &record(2)).unwrap();

    let path = temp.path().join(ACTIVE_WAL_FILENAME);
    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
    assert!(contents.ends_with('\n'));
    assert_eq!(written as usize, encode_line("mgr1", &record(1)).len() + 1);
    assert_eq!(writer.active_bytes(), contents.len() as u64);
}

#[test]
fn test_reopen_appends() {
    let temp = setup_temp_dir();
    {
        let mut writer = open_writer(temp.path());
        writer.append("mgr1", &record(1)).unwrap();
    }
    {
        let mut writer = open_writer(temp.path());
        assert!(!writer.repaired_tail());
        writer.append("mgr1", &record(2)).unwrap();
    }

    assert_eq!(trans_ids(&temp.path().join(ACTIVE_WAL_FILENAME)), vec!["T1", "T2"]);
}

#[test]
fn test_every_n_entries_strategy() {
    let temp = setup_temp_dir();
    let mut writer = WalWriter::open(
        temp.path(),
        WalSyncStrategy::EveryNEntries { count: 10 },
        NO_ROTATION,
        1,
    )
    .unwrap();

    for n in 0..25 {
        writer.append("mgr1", &record(n)).unwrap();
    }
    writer.sync().unwrap();

    assert_eq!(trans_ids(&temp.path().join(ACTIVE_WAL_FILENAME)).len(), 25);
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotate_seals_segment() {
    let temp = setup_temp_dir();
    let mut writer = open_writer(temp.path());
    writer.append("mgr1", &record(1)).unwrap();
    let before = writer.active_bytes();

    let seq = writer.rotate().unwrap();
    assert_eq!(seq, 1);
    assert_eq!(writer.next_seq(), 2);
    assert_eq!(writer.active_bytes(), 0);
    assert_eq!(writer.pending_bytes(), before);

    let sealed = temp.path().join(segment_filename(1));
    assert_eq!(trans_ids(&sealed), vec!["T1"]);

    writer.append("mgr1", &record(2)).unwrap();
    assert_eq!(trans_ids(&temp.path().join(ACTIVE_WAL_FILENAME)), vec!["T2"]);
}

#[test]
fn test_should_rotate_threshold() {
    let temp = setup_temp_dir();
    let mut writer = WalWriter::open(temp.path(), WalSyncStrategy::EveryWrite, 100, 1).unwrap();
    assert!(!writer.should_rotate());

    while !writer.should_rotate() {
        writer.append("mgr1", &record(0)).unwrap();
    }
    assert!(writer.active_bytes() > 100);
}

#[test]
fn test_segment_numbering_continues() {
    let temp = setup_temp_dir();
    {
        let mut writer = open_writer(temp.path());
        writer.rotate().unwrap();
        writer.rotate().unwrap();
    }

    let writer = open_writer(temp.path());
    assert_eq!(writer.next_seq(), 3);

    let writer = WalWriter::open(temp.path(), WalSyncStrategy::EveryWrite, NO_ROTATION, 10).unwrap();
    assert_eq!(writer.next_seq(), 10);

    let seqs: Vec<u64> = list_segments(temp.path()).unwrap().into_iter().map(|(s, _)| s).collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[test]
fn test_mark_checkpointed_reduces_pending() {
    let temp = setup_temp_dir();
    let mut writer = open_writer(temp.path());
    writer.append("mgr1", &record(1)).unwrap();
    let sealed_bytes = writer.active_bytes();
    writer.rotate().unwrap();
    writer.append("mgr1", &record(2)).unwrap();

    writer.mark_checkpointed(sealed_bytes);
    assert_eq!(writer.pending_bytes(), writer.active_bytes());
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_torn_tail_truncated_on_open() {
    let temp = setup_temp_dir();
    let path = temp.path().join(ACTIVE_WAL_FILENAME);
    {
        let mut writer = open_writer(temp.path());
        writer.append("mgr1", &record(1)).unwrap();
    }
    let complete_len = fs::metadata(&path).unwrap().len();

    // Half of a second line, no newline
    let partial = encode_line("mgr1", &record(2));
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial.as_bytes()[..partial.len() / 2]).unwrap();
    drop(file);

    let mut writer = open_writer(temp.path());
    assert!(writer.repaired_tail());
    assert_eq!(fs::metadata(&path).unwrap().len(), complete_len);

    writer.append("mgr1", &record(3)).unwrap();
    assert_eq!(trans_ids(&path), vec!["T1", "T3"]);
}

#[test]
fn test_torn_first_line_truncated_to_empty() {
    let temp = setup_temp_dir();
    let path = temp.path().join(ACTIVE_WAL_FILENAME);
    fs::write(&path, "2024-01-01T00:00:00|mgr1|T1|I").unwrap();

    let writer = open_writer(temp.path());
    assert!(writer.repaired_tail());
    assert_eq!(writer.active_bytes(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_reports_malformed_lines() {
    let temp = setup_temp_dir();
    let path = temp.path().join(ACTIVE_WAL_FILENAME);
    let good = encode_line("mgr1", &record(1));
    fs::write(&path, format!("{}\n\ngarbage line\n{}\n", good, good)).unwrap();

    let lines = read_entries(&path);
    assert_eq!(lines.len(), 3);
    assert!(matches!(lines[0], WalLine::Entry(_)));
    assert!(matches!(lines[1], WalLine::Malformed { line_no: 3, .. }));
    assert!(matches!(lines[2], WalLine::Entry(_)));
}

#[test]
fn test_reader_reports_invalid_utf8() {
    let temp = setup_temp_dir();
    let path = temp.path().join(ACTIVE_WAL_FILENAME);
    let mut bytes = encode_line("mgr1", &record(1)).into_bytes();
    bytes.push(b'\n');
    bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
    fs::write(&path, bytes).unwrap();

    let lines = read_entries(&path);
    assert_eq!(lines.len(), 2);
    match &lines[1] {
        WalLine::Malformed { line_no, reason } => {
            assert_eq!(*line_no, 2);
            assert!(reason.contains("UTF-8"));
        }
        other => panic!("expected malformed line, got {:?}", other),
    }
}

#[test]
fn test_reader_accepts_crlf() {
    let temp = setup_temp_dir();
    let path = temp.path().join(ACTIVE_WAL_FILENAME);
    fs::write(&path, format!("{}\r\n", encode_line("mgr1", &record(1)))).unwrap();

    assert_eq!(trans_ids(&path), vec!["T1"]);
}
