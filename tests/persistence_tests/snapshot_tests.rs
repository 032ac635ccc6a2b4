//! Tests for snapshot files
//!
//! These tests verify:
//! - Snapshot contents and header layout
//! - Atomic publication (no `.tmp` left behind, stale `.tmp` ignored)
//! - Corrupt snapshots are rejected as a whole

use std::fs;

use stockledger::persistence::{
    latest_snapshot, list_snapshots, parse_snapshot_seq, read_snapshot, remove_stale_tmp,
    snapshot_filename, write_snapshot, PartitionData,
};
use stockledger::{ErrorKind, TransactionRecord, TransactionType};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn sample_data() -> PartitionData {
    let mut data = PartitionData::new();
    data.insert(
        "mgr1".to_string(),
        vec![
            TransactionRecord::new("T1", "I1", TransactionType::In, 5, 10.0)
                .with_timestamp("2024-01-01T00:00:00")
                .with_document("DOC1"),
            TransactionRecord::new("T2", "I1", TransactionType::Out, 2, 0.0)
                .with_timestamp("2024-01-01T01:00:00")
                .with_note("line\nbreak"),
        ],
    );
    data.insert(
        "mgr2".to_string(),
        vec![TransactionRecord::new("U1", "I9", TransactionType::In, 1, 0.5)
            .with_timestamp("2024-01-02T00:00:00")],
    );
    data
}

// =============================================================================
// Write/Read Tests
// =============================================================================

#[test]
fn test_write_then_read() {
    let temp = setup_temp_dir();
    let data = sample_data();

    let info = write_snapshot(temp.path(), 3, &data).unwrap();
    assert_eq!(info.seq, 3);
    assert_eq!(info.partitions, 2);
    assert_eq!(info.transactions, 3);
    assert_eq!(info.path, temp.path().join(snapshot_filename(3)));
    assert!(info.size_bytes > 0);

    let (loaded_info, loaded) = read_snapshot(3, &info.path).unwrap();
    assert_eq!(loaded, data);
    assert_eq!(loaded_info.created_at, info.created_at);
    assert_eq!(loaded_info.transactions, 3);
}

#[test]
fn test_file_layout() {
    let temp = setup_temp_dir();
    let info = write_snapshot(temp.path(), 1, &sample_data()).unwrap();
    let contents = fs::read_to_string(&info.path).unwrap();

    let lines: Vec<&str> = contents.lines().collect();
    let (header, body): (Vec<&str>, Vec<&str>) = lines.into_iter().partition(|l| l.starts_with('#'));
    assert!(!header.is_empty());
    assert_eq!(body.len(), 2);

    let first: serde_json::Value = serde_json::from_str(body[0]).unwrap();
    assert_eq!(first["partition_id"], "mgr1");
    assert_eq!(first["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(first["transactions"][0]["type"], "in");
}

#[test]
fn test_empty_snapshot() {
    let temp = setup_temp_dir();
    let info = write_snapshot(temp.path(), 1, &PartitionData::new()).unwrap();
    let (_, loaded) = read_snapshot(1, &info.path).unwrap();
    assert!(loaded.is_empty());
}

// =============================================================================
// Atomicity Tests
// =============================================================================

#[test]
fn test_no_tmp_left_after_write() {
    let temp = setup_temp_dir();
    write_snapshot(temp.path(), 1, &sample_data()).unwrap();

    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_stale_tmp_ignored_and_removed() {
    let temp = setup_temp_dir();
    let info = write_snapshot(temp.path(), 1, &sample_data()).unwrap();

    // An interrupted later snapshot
    let tmp = temp.path().join(format!("{}.tmp", snapshot_filename(2)));
    fs::write(&tmp, "# stockledger snapshot\n{\"partition_id\":\"mgr1\",\"transa").unwrap();

    let (seq, path) = latest_snapshot(temp.path()).unwrap().unwrap();
    assert_eq!(seq, 1);
    assert_eq!(path, info.path);

    assert_eq!(remove_stale_tmp(temp.path()).unwrap(), 1);
    assert!(!tmp.exists());
    assert!(info.path.exists());
}

#[test]
fn test_latest_snapshot_is_highest_seq() {
    let temp = setup_temp_dir();
    write_snapshot(temp.path(), 2, &sample_data()).unwrap();
    write_snapshot(temp.path(), 10, &sample_data()).unwrap();
    write_snapshot(temp.path(), 7, &sample_data()).unwrap();

    let seqs: Vec<u64> = list_snapshots(temp.path()).unwrap().into_iter().map(|(s, _)| s).collect();
    assert_eq!(seqs, vec![2, 7, 10]);
    assert_eq!(latest_snapshot(temp.path()).unwrap().unwrap().0, 10);
}

#[test]
fn test_filename_round_trip() {
    assert_eq!(parse_snapshot_seq(&snapshot_filename(42)), Some(42));
    assert_eq!(parse_snapshot_seq("snapshot_x.json"), None);
    assert_eq!(parse_snapshot_seq("snapshot_00000000000000000001.json.tmp"), None);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupt_line_fails_whole_snapshot() {
    let temp = setup_temp_dir();
    let info = write_snapshot(temp.path(), 1, &sample_data()).unwrap();

    let mut contents = fs::read_to_string(&info.path).unwrap();
    contents.push_str("{\"partition_id\": \"mgr3\", \"transactions\": [oops]}\n");
    fs::write(&info.path, contents).unwrap();

    let err = read_snapshot(1, &info.path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataCorruption);
}

#[test]
fn test_invalid_type_in_snapshot_is_corruption() {
    let temp = setup_temp_dir();
    let path = temp.path().join(snapshot_filename(1));
    fs::write(
        &path,
        "# stockledger snapshot\n{\"partition_id\":\"mgr1\",\"transactions\":[{\"trans_id\":\"T1\",\"item_id\":\"I1\",\"type\":\"move\",\"quantity\":1,\"unit_price\":1.0}]}\n",
    )
    .unwrap();

    assert_eq!(read_snapshot(1, &path).unwrap_err().kind(), ErrorKind::DataCorruption);
}
