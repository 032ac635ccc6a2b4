//! Tests for the WAL line format
//!
//! These tests verify:
//! - Lines carry exactly 16 fields in the documented order
//! - Separators and line breaks inside fields are escaped
//! - Malformed lines are reported, not guessed at

use stockledger::wal::{decode_line, encode_line, LineError, FIELD_COUNT};
use stockledger::{TransactionRecord, TransactionType};

// =============================================================================
// Helper Functions
// =============================================================================

fn full_record() -> TransactionRecord {
    TransactionRecord::new("T1", "ITEM001", TransactionType::In, 100, 25.5)
        .with_item_name("Widget")
        .with_attributes("Electronics", "A1", "pcs")
        .with_partner("SUP1", "Supplier A")
        .with_warehouse("WH001")
        .with_document("DOC1")
        .with_timestamp("2024-01-15T10:30:00")
        .with_note("first batch")
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_field_order() {
    let line = encode_line("mgr1", &full_record());
    let fields: Vec<&str> = line.split('|').collect();

    assert_eq!(fields.len(), FIELD_COUNT);
    assert_eq!(
        fields,
        vec![
            "2024-01-15T10:30:00",
            "mgr1",
            "T1",
            "ITEM001",
            "Widget",
            "in",
            "100",
            "25.5",
            "Electronics",
            "A1",
            "pcs",
            "SUP1",
            "Supplier A",
            "WH001",
            "DOC1",
            "first batch",
        ]
    );
    assert!(!line.contains('\n'));
}

#[test]
fn test_decode_restores_record() {
    let record = full_record();
    let entry = decode_line(&encode_line("mgr1", &record)).unwrap();
    assert_eq!(entry.partition_id, "mgr1");
    assert_eq!(entry.record, record);
}

#[test]
fn test_missing_document_is_empty_field() {
    let mut record = full_record();
    record.document_no = None;
    let line = encode_line("mgr1", &record);
    assert_eq!(line.split('|').nth(14), Some(""));
    assert_eq!(decode_line(&line).unwrap().record.document_no, None);
}

#[test]
fn test_unit_price_shortest_form() {
    let mut record = full_record();
    record.unit_price = 0.1;
    let line = encode_line("mgr1", &record);
    assert_eq!(line.split('|').nth(7), Some("0.1"));
    assert_eq!(decode_line(&line).unwrap().record.unit_price, 0.1);
}

// =============================================================================
// Escaping Tests
// =============================================================================

#[test]
fn test_separator_and_newlines_escaped() {
    let record = full_record()
        .with_note("a|b\nc\r\nd\\e")
        .with_item_name("pipe|name");
    let line = encode_line("mgr1", &record);

    assert_eq!(line.matches('|').count(), FIELD_COUNT - 1);
    assert!(!line.contains('\n'));
    assert!(!line.contains('\r'));

    let decoded = decode_line(&line).unwrap().record;
    assert_eq!(decoded.note, "a|b\nc\r\nd\\e");
    assert_eq!(decoded.item_name, "pipe|name");
}

// =============================================================================
// Malformed Line Tests
// =============================================================================

#[test]
fn test_wrong_field_count() {
    assert_eq!(decode_line("a|b|c"), Err(LineError::FieldCount(3)));
    assert_eq!(decode_line(""), Err(LineError::FieldCount(1)));
}

#[test]
fn test_bad_numbers() {
    let line = encode_line("mgr1", &full_record());

    let mut fields: Vec<String> = line.split('|').map(String::from).collect();
    fields[6] = "many".to_string();
    assert!(matches!(decode_line(&fields.join("|")), Err(LineError::Quantity(_))));

    let mut fields: Vec<String> = line.split('|').map(String::from).collect();
    fields[7] = "cheap".to_string();
    assert!(matches!(decode_line(&fields.join("|")), Err(LineError::UnitPrice(_))));
}

#[test]
fn test_unknown_type() {
    let line = encode_line("mgr1", &full_record()).replacen("|in|", "|sideways|", 1);
    assert!(matches!(decode_line(&line), Err(LineError::Type(t)) if t == "sideways"));
}

#[test]
fn test_bad_escapes() {
    let line = encode_line("mgr1", &full_record());
    assert!(matches!(decode_line(&format!("{}\\", line)), Err(LineError::DanglingEscape)));
    assert!(matches!(
        decode_line(&line.replacen("first batch", "bad\\q", 1)),
        Err(LineError::Escape('q'))
    ));
}
