//! Tests for PersistenceManager
//!
//! These tests verify:
//! - Directory lock exclusivity
//! - WAL writes and replay
//! - Checkpoints (snapshot + newer WAL, no double replay)
//! - Snapshot scheduling
//! - Integrity validation and quarantine

use std::fs;
use std::path::Path;
use std::time::Duration;

use stockledger::persistence::{snapshot_filename, PartitionData, PersistenceManager};
use stockledger::wal::{list_segments, ACTIVE_WAL_FILENAME};
use stockledger::{Config, ErrorKind, TransactionRecord, TransactionType};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn config(dir: &Path) -> Config {
    Config::builder().data_dir(dir).build()
}

fn record(trans_id: &str, timestamp: &str) -> TransactionRecord {
    TransactionRecord::new(trans_id, "I1", TransactionType::In, 1, 1.0).with_timestamp(timestamp)
}

fn ids(data: &PartitionData, partition: &str) -> Vec<String> {
    data.get(partition)
        .map(|records| records.iter().map(|r| r.trans_id.clone()).collect())
        .unwrap_or_default()
}

// =============================================================================
// Lock Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp = setup_temp_dir();
    let dir = temp.path().join("nested").join("data");

    let manager = PersistenceManager::open(&config(&dir)).unwrap();
    assert!(dir.join(ACTIVE_WAL_FILENAME).exists());
    assert!(manager.lock_path().exists());
    assert_eq!(manager.data_dir(), dir.as_path());
}

#[test]
fn test_second_open_fails_while_locked() {
    let temp = setup_temp_dir();
    let first = PersistenceManager::open(&config(temp.path())).unwrap();

    let err = PersistenceManager::open(&config(temp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailure);

    drop(first);
    assert!(PersistenceManager::open(&config(temp.path())).is_ok());
}

// =============================================================================
// WAL Tests
// =============================================================================

#[test]
fn test_write_then_recover() {
    let temp = setup_temp_dir();
    {
        let manager = PersistenceManager::open(&config(temp.path())).unwrap();
        manager.write_to_wal("mgr1", &record("T1", "2024-01-01T00:00:00")).unwrap();
        manager.write_to_wal("mgr2", &record("U1", "2024-01-01T00:00:01")).unwrap();
        manager.write_to_wal("mgr1", &record("T2", "2024-01-01T00:00:02")).unwrap();
        manager.flush_wal().unwrap();
    }

    let manager = PersistenceManager::open(&config(temp.path())).unwrap();
    let (data, result) = manager.recover_from_wal().unwrap();
    assert_eq!(result.entries_recovered, 3);
    assert_eq!(ids(&data, "mgr1"), vec!["T1", "T2"]);
    assert_eq!(ids(&data, "mgr2"), vec!["U1"]);
}

#[test]
fn test_rotation_on_size() {
    let temp = setup_temp_dir();
    let config = Config::builder()
        .data_dir(temp.path())
        .wal_rotation_bytes(200)
        .build();
    let manager = PersistenceManager::open(&config).unwrap();

    for n in 0..20 {
        manager
            .write_to_wal("mgr1", &record(&format!("T{}", n), "2024-01-01T00:00:00"))
            .unwrap();
    }

    assert!(!list_segments(temp.path()).unwrap().is_empty());
    let state = manager.recover().unwrap();
    assert_eq!(state.data["mgr1"].len(), 20);
    assert_eq!(state.data["mgr1"][19].trans_id, "T19");
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

#[test]
fn test_snapshot_then_wal_no_double_replay() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();

    let mut data = PartitionData::new();
    for (n, ts) in ["2024-01-01T00:00:00", "2024-01-01T00:00:01"].iter().enumerate() {
        let r = record(&format!("T{}", n), ts);
        manager.write_to_wal("mgr1", &r).unwrap();
        data.entry("mgr1".to_string()).or_default().push(r);
    }

    let info = manager.create_snapshot(&data).unwrap();
    assert_eq!(info.transactions, 2);
    assert!(info.path.exists());
    // Covered segments are gone and the active file starts empty
    assert!(list_segments(temp.path()).unwrap().is_empty());
    assert_eq!(fs::metadata(temp.path().join(ACTIVE_WAL_FILENAME)).unwrap().len(), 0);

    manager.write_to_wal("mgr1", &record("T2", "2024-01-01T00:00:02")).unwrap();
    drop(manager);

    let manager = PersistenceManager::open(&config(temp.path())).unwrap();
    let state = manager.recover().unwrap();
    assert_eq!(state.snapshot.as_ref().map(|s| s.seq), Some(info.seq));
    assert_eq!(state.wal.entries_recovered, 1);
    assert_eq!(ids(&state.data, "mgr1"), vec!["T0", "T1", "T2"]);
}

#[test]
fn test_second_snapshot_replaces_first() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();

    let mut data = PartitionData::new();
    data.insert("mgr1".to_string(), vec![record("T1", "2024-01-01T00:00:00")]);
    manager.write_to_wal("mgr1", &data["mgr1"][0]).unwrap();
    let first = manager.create_snapshot(&data).unwrap();

    let r = record("T2", "2024-01-01T00:00:01");
    manager.write_to_wal("mgr1", &r).unwrap();
    data.get_mut("mgr1").unwrap().push(r);
    let second = manager.create_snapshot(&data).unwrap();

    assert!(second.seq > first.seq);
    assert!(!first.path.exists());
    assert!(second.path.exists());

    let state = manager.recover().unwrap();
    assert_eq!(ids(&state.data, "mgr1"), vec!["T1", "T2"]);
}

#[test]
fn test_crash_between_rotation_and_snapshot() {
    let temp = setup_temp_dir();
    {
        let config = Config::builder()
            .data_dir(temp.path())
            .wal_rotation_bytes(1)
            .build();
        let manager = PersistenceManager::open(&config).unwrap();
        // Every write seals a segment; no snapshot is ever written
        manager.write_to_wal("mgr1", &record("T1", "2024-01-01T00:00:00")).unwrap();
        manager.write_to_wal("mgr1", &record("T2", "2024-01-01T00:00:01")).unwrap();
    }

    let manager = PersistenceManager::open(&config(temp.path())).unwrap();
    let state = manager.recover().unwrap();
    assert!(state.snapshot.is_none());
    assert_eq!(ids(&state.data, "mgr1"), vec!["T1", "T2"]);
}

#[test]
fn test_stale_tmp_removed_on_open() {
    let temp = setup_temp_dir();
    let tmp = temp.path().join(format!("{}.tmp", snapshot_filename(5)));
    fs::write(&tmp, "partial").unwrap();

    let manager = PersistenceManager::open(&config(temp.path())).unwrap();
    assert!(!tmp.exists());
    assert!(manager.recover_from_snapshot().unwrap().is_none());
}

// =============================================================================
// Scheduling Tests
// =============================================================================

#[test]
fn test_should_snapshot_on_wal_volume() {
    let temp = setup_temp_dir();
    let config = Config::builder()
        .data_dir(temp.path())
        .snapshot_threshold_bytes(300)
        .build();
    let manager = PersistenceManager::open(&config).unwrap();
    assert!(!manager.should_create_snapshot());

    let mut n = 0;
    while !manager.should_create_snapshot() {
        manager
            .write_to_wal("mgr1", &record(&format!("T{}", n), "2024-01-01T00:00:00"))
            .unwrap();
        n += 1;
    }
    assert!(manager.pending_wal_bytes() > 300);

    let state = manager.recover().unwrap();
    manager.create_snapshot(&state.data).unwrap();
    assert!(!manager.should_create_snapshot());
    assert_eq!(manager.pending_wal_bytes(), 0);
}

#[test]
fn test_should_snapshot_on_interval() {
    let temp = setup_temp_dir();
    let config = Config::builder()
        .data_dir(temp.path())
        .snapshot_interval(Some(Duration::from_millis(0)))
        .build();
    let manager = PersistenceManager::open(&config).unwrap();

    // Nothing to checkpoint yet
    assert!(!manager.should_create_snapshot());

    manager.write_to_wal("mgr1", &record("T1", "2024-01-01T00:00:00")).unwrap();
    assert!(manager.should_create_snapshot());
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_integrity_accepts_valid_data() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();

    let mut data = PartitionData::new();
    data.insert(
        "mgr1".to_string(),
        vec![
            record("T1", "2024-01-01T00:00:00"),
            record("T2", "2024-01-01T00:00:00"),
        ],
    );

    let report = manager.validate_data_integrity(&data).unwrap();
    assert_eq!(report.partitions_checked, 1);
    assert_eq!(report.records_checked, 2);
    assert!(!report.has_warnings());
}

#[test]
fn test_integrity_rejects_regressing_timestamps() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();

    let mut data = PartitionData::new();
    data.insert(
        "mgr1".to_string(),
        vec![
            record("T1", "2024-01-02T00:00:00"),
            record("T2", "2024-01-01T00:00:00"),
        ],
    );

    let err = manager.validate_data_integrity(&data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataCorruption);
    assert_eq!(err.context().partition_id.as_deref(), Some("mgr1"));
}

#[test]
fn test_integrity_rejects_invalid_fields() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();

    let mut bad = record("T1", "2024-01-01T00:00:00");
    bad.quantity = 0;
    let mut data = PartitionData::new();
    data.insert("mgr1".to_string(), vec![bad]);

    assert_eq!(
        manager.validate_data_integrity(&data).unwrap_err().kind(),
        ErrorKind::DataCorruption
    );
}

#[test]
fn test_integrity_reports_duplicates() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();

    let mut data = PartitionData::new();
    data.insert(
        "mgr1".to_string(),
        vec![
            record("T1", "2024-01-01T00:00:00"),
            record("T1", "2024-01-01T00:00:01"),
        ],
    );

    let report = manager.validate_data_integrity(&data).unwrap();
    assert!(report.has_warnings());
    assert_eq!(
        report.duplicate_trans_ids,
        vec![("mgr1".to_string(), "T1".to_string())]
    );
}

// =============================================================================
// Maintenance Tests
// =============================================================================

#[test]
fn test_quarantine_moves_everything() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();
    manager.write_to_wal("mgr1", &record("T1", "2024-01-01T00:00:00")).unwrap();
    let state = manager.recover().unwrap();
    manager.create_snapshot(&state.data).unwrap();
    manager.write_to_wal("mgr1", &record("T2", "2024-01-01T00:00:01")).unwrap();

    let target = manager.quarantine().unwrap();
    assert!(target.file_name().unwrap().to_string_lossy().starts_with("corrupt-"));
    assert!(target.join(ACTIVE_WAL_FILENAME).exists());

    let state = manager.recover().unwrap();
    assert!(state.data.is_empty());
    assert!(state.snapshot.is_none());

    // Writes continue into the fresh WAL
    manager.write_to_wal("mgr1", &record("T3", "2024-01-01T00:00:02")).unwrap();
    assert_eq!(ids(&manager.recover().unwrap().data, "mgr1"), vec!["T3"]);
}

#[test]
fn test_storage_info() {
    let temp = setup_temp_dir();
    let manager = PersistenceManager::open(&config(temp.path())).unwrap();
    manager.write_to_wal("mgr1", &record("T1", "2024-01-01T00:00:00")).unwrap();

    let info = manager.storage_info().unwrap();
    assert_eq!(info.wal_path, temp.path().join(ACTIVE_WAL_FILENAME));
    assert!(info.wal_size_bytes > 0);
    assert_eq!(info.sealed_segments, 0);
    assert!(info.latest_snapshot.is_none());

    let state = manager.recover().unwrap();
    manager.create_snapshot(&state.data).unwrap();

    let info = manager.storage_info().unwrap();
    assert_eq!(info.wal_size_bytes, 0);
    assert!(info.latest_snapshot.is_some());
    assert!(info.latest_snapshot_time.is_some());
}
