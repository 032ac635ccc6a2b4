//! Transaction records
//!
//! A [`TransactionRecord`] is a single stock movement. It is the only fact the
//! ledger stores; every other view is computed from a sequence of them.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, LedgerError, Result};

/// Largest quantity a single movement may carry
pub const MAX_QUANTITY: i64 = i32::MAX as i64;

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Goods received into a warehouse
    In,
    /// Goods issued from a warehouse
    Out,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::In => "in",
            TransactionType::Out => "out",
        }
    }

    /// +1 for inbound, -1 for outbound
    pub fn sign(&self) -> i64 {
        match self {
            TransactionType::In => 1,
            TransactionType::Out => -1,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(TransactionType::In),
            "out" => Ok(TransactionType::Out),
            other => Err(LedgerError::invalid_transaction_type(
                format!("transaction type must be 'in' or 'out', got '{}'", other),
                ErrorContext::new("record", "parse_type"),
            )),
        }
    }
}

/// A single immutable stock movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Unique within its partition
    pub trans_id: String,
    pub item_id: String,
    #[serde(default)]
    pub item_name: String,

    // -------------------------------------------------------------------------
    // Movement
    // -------------------------------------------------------------------------
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub unit_price: f64,

    // -------------------------------------------------------------------------
    // Item attributes
    // -------------------------------------------------------------------------
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub unit: String,

    // -------------------------------------------------------------------------
    // Counterpart, location and grouping
    // -------------------------------------------------------------------------
    /// Supplier for inbound, customer for outbound
    #[serde(default)]
    pub partner_id: String,
    #[serde(default)]
    pub partner_name: String,
    #[serde(default)]
    pub warehouse_id: String,
    /// Groups the records of one business document
    #[serde(default)]
    pub document_no: Option<String>,

    /// ISO-8601; filled in by the store when empty
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub note: String,
}

impl TransactionRecord {
    /// Create a record with the required fields; everything else is empty
    pub fn new(
        trans_id: impl Into<String>,
        item_id: impl Into<String>,
        kind: TransactionType,
        quantity: i64,
        unit_price: f64,
    ) -> Self {
        Self {
            trans_id: trans_id.into(),
            item_id: item_id.into(),
            item_name: String::new(),
            kind,
            quantity,
            unit_price,
            category: String::new(),
            model: String::new(),
            unit: String::new(),
            partner_id: String::new(),
            partner_name: String::new(),
            warehouse_id: String::new(),
            document_no: None,
            timestamp: String::new(),
            note: String::new(),
        }
    }

    pub fn with_item_name(mut self, name: impl Into<String>) -> Self {
        self.item_name = name.into();
        self
    }

    pub fn with_attributes(
        mut self,
        category: impl Into<String>,
        model: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        self.category = category.into();
        self.model = model.into();
        self.unit = unit.into();
        self
    }

    pub fn with_partner(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.partner_id = id.into();
        self.partner_name = name.into();
        self
    }

    pub fn with_warehouse(mut self, warehouse_id: impl Into<String>) -> Self {
        self.warehouse_id = warehouse_id.into();
        self
    }

    pub fn with_document(mut self, document_no: impl Into<String>) -> Self {
        let document_no = document_no.into();
        self.document_no = if document_no.is_empty() {
            None
        } else {
            Some(document_no)
        };
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// quantity × unit_price
    pub fn total_amount(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    pub fn is_inbound(&self) -> bool {
        self.kind == TransactionType::In
    }

    pub fn is_outbound(&self) -> bool {
        self.kind == TransactionType::Out
    }

    /// Quantity with the movement's sign applied
    pub fn signed_quantity(&self) -> i64 {
        self.kind.sign() * self.quantity
    }

    /// The document number, if the record belongs to one
    pub fn document(&self) -> Option<&str> {
        self.document_no.as_deref().filter(|d| !d.is_empty())
    }

    /// Rough heap + inline footprint, used for status reporting
    pub fn approximate_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.trans_id.len()
            + self.item_id.len()
            + self.item_name.len()
            + self.category.len()
            + self.model.len()
            + self.unit.len()
            + self.partner_id.len()
            + self.partner_name.len()
            + self.warehouse_id.len()
            + self.document_no.as_ref().map_or(0, String::len)
            + self.timestamp.len()
            + self.note.len()
    }

    /// Check the field invariants every stored record must satisfy.
    ///
    /// The transaction type needs no check here: it is an enum, and invalid
    /// text is rejected when it is parsed.
    pub fn validate(&self, partition_id: &str) -> Result<()> {
        let context = || {
            ErrorContext::new("record", "validate")
                .partition(partition_id)
                .transaction(self.trans_id.as_str())
        };

        if self.trans_id.is_empty() || self.item_id.is_empty() {
            return Err(LedgerError::invalid_argument(
                format!(
                    "transaction id and item id cannot be empty (trans_id='{}', item_id='{}')",
                    self.trans_id, self.item_id
                ),
                context(),
            ));
        }

        if self.quantity <= 0 || self.quantity > MAX_QUANTITY {
            return Err(LedgerError::invalid_argument(
                format!(
                    "quantity must be between 1 and {}, got {}",
                    MAX_QUANTITY, self.quantity
                ),
                context(),
            ));
        }

        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(LedgerError::invalid_argument(
                format!("unit price must be a non-negative number, got {}", self.unit_price),
                context(),
            ));
        }

        if !is_valid_timestamp(&self.timestamp) {
            return Err(LedgerError::invalid_argument(
                format!("timestamp '{}' is not ISO-8601", self.timestamp),
                context(),
            ));
        }

        Ok(())
    }
}

/// Accepts RFC 3339 (`2024-01-15T10:30:00.000Z`) and naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` timestamps.
pub fn is_valid_timestamp(timestamp: &str) -> bool {
    parse_timestamp(timestamp).is_some()
}

/// Instant a timestamp denotes. Naive timestamps are taken as UTC.
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Order two timestamps by the instant they denote, falling back to text
/// order when either does not parse.
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Current UTC time, millisecond precision, `Z` suffix
pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
