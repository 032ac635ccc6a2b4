//! WAL line format
//!
//! One record per line, 16 pipe-separated fields:
//!
//! ```text
//! timestamp|partition|trans_id|item_id|item_name|type|quantity|unit_price|
//! category|model|unit|partner_id|partner_name|warehouse_id|document_no|note
//! ```
//!
//! Inside a field `\` is written as `\\`, `|` as `\p`, LF as `\n` and CR as
//! `\r`, so the separator count never depends on the data.

use thiserror::Error;

use crate::record::{TransactionRecord, TransactionType};

/// Number of fields on every WAL line
pub const FIELD_COUNT: usize = 16;

/// Field separator
pub const FIELD_SEPARATOR: char = '|';

/// Why a WAL line could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("bad escape sequence '\\{0}'")]
    Escape(char),

    #[error("dangling escape at end of line")]
    DanglingEscape,

    #[error("quantity '{0}' is not an integer")]
    Quantity(String),

    #[error("unit price '{0}' is not a number")]
    UnitPrice(String),

    #[error("unknown transaction type '{0}'")]
    Type(String),
}

/// A decoded WAL line
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    pub partition_id: String,
    pub record: TransactionRecord,
}

/// Encode one record as a WAL line, without the trailing newline
pub fn encode_line(partition_id: &str, record: &TransactionRecord) -> String {
    let quantity = record.quantity.to_string();
    let unit_price = record.unit_price.to_string();
    let fields: [&str; FIELD_COUNT] = [
        &record.timestamp,
        partition_id,
        &record.trans_id,
        &record.item_id,
        &record.item_name,
        record.kind.as_str(),
        &quantity,
        &unit_price,
        &record.category,
        &record.model,
        &record.unit,
        &record.partner_id,
        &record.partner_name,
        &record.warehouse_id,
        record.document_no.as_deref().unwrap_or(""),
        &record.note,
    ];

    let mut line = String::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            line.push(FIELD_SEPARATOR);
        }
        escape_into(&mut line, field);
    }
    line
}

/// Decode one WAL line (without its newline)
pub fn decode_line(line: &str) -> Result<WalEntry, LineError> {
    let fields = split_fields(line)?;
    if fields.len() != FIELD_COUNT {
        return Err(LineError::FieldCount(fields.len()));
    }

    let mut fields = fields.into_iter();
    // Length checked above, so every next() below yields a value
    let mut next = || fields.next().unwrap_or_default();

    let timestamp = next();
    let partition_id = next();
    let trans_id = next();
    let item_id = next();
    let item_name = next();
    let kind_text = next();
    let quantity_text = next();
    let unit_price_text = next();

    let kind = match kind_text.as_str() {
        "in" => TransactionType::In,
        "out" => TransactionType::Out,
        _ => return Err(LineError::Type(kind_text)),
    };
    let quantity: i64 = quantity_text
        .parse()
        .map_err(|_| LineError::Quantity(quantity_text.clone()))?;
    let unit_price: f64 = unit_price_text
        .parse()
        .map_err(|_| LineError::UnitPrice(unit_price_text.clone()))?;

    let category = next();
    let model = next();
    let unit = next();
    let partner_id = next();
    let partner_name = next();
    let warehouse_id = next();
    let document_no = next();
    let note = next();

    Ok(WalEntry {
        partition_id,
        record: TransactionRecord {
            trans_id,
            item_id,
            item_name,
            kind,
            quantity,
            unit_price,
            category,
            model,
            unit,
            partner_id,
            partner_name,
            warehouse_id,
            document_no: if document_no.is_empty() {
                None
            } else {
                Some(document_no)
            },
            timestamp,
            note,
        },
    })
}

fn escape_into(out: &mut String, field: &str) {
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\p"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

/// Split on unescaped separators, resolving escapes
fn split_fields(line: &str) -> Result<Vec<String>, LineError> {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => current.push('\\'),
                Some('p') => current.push('|'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => return Err(LineError::Escape(other)),
                None => return Err(LineError::DanglingEscape),
            },
            FIELD_SEPARATOR => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);

    Ok(fields)
}
