//! Error types for stockledger
//!
//! Every public operation returns [`Result`], whose error carries a kind, a
//! human readable message and the structured context it happened in.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias using LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Coarse classification of a [`LedgerError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    InvalidArgument,
    /// Transaction type text was neither `in` nor `out`
    InvalidTransactionType,
    /// `trans_id` already published in the partition
    DuplicateKey,
    /// WAL, snapshot or lock I/O failed
    IoFailure,
    /// Recovered data failed the integrity check
    DataCorruption,
    /// Unknown partition
    NotFound,
    /// Another writer handle is live for the partition
    WriterBusy,
}

impl ErrorKind {
    /// Numeric code handed to wire collaborators.
    pub fn code(&self) -> u32 {
        match self {
            ErrorKind::InvalidArgument => 1001,
            ErrorKind::NotFound => 2002,
            ErrorKind::DuplicateKey => 2003,
            ErrorKind::InvalidTransactionType => 2004,
            ErrorKind::WriterBusy => 2008,
            ErrorKind::IoFailure => 3001,
            ErrorKind::DataCorruption => 3005,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidTransactionType => "invalid_transaction_type",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::DataCorruption => "data_corruption",
            ErrorKind::NotFound => "not_found",
            ErrorKind::WriterBusy => "writer_busy",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an error happened: component, operation and the ids involved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub component: &'static str,
    pub operation: &'static str,
    pub partition_id: Option<String>,
    pub trans_id: Option<String>,
}

impl ErrorContext {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            partition_id: None,
            trans_id: None,
        }
    }

    /// Attach the partition id
    pub fn partition(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    /// Attach the transaction id
    pub fn transaction(mut self, trans_id: impl Into<String>) -> Self {
        self.trans_id = Some(trans_id.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.component.is_empty() {
            f.write_str("-")?;
        } else {
            write!(f, "{}::{}", self.component, self.operation)?;
        }
        if let Some(partition) = &self.partition_id {
            write!(f, " partition={}", partition)?;
        }
        if let Some(trans_id) = &self.trans_id {
            write!(f, " trans_id={}", trans_id)?;
        }
        Ok(())
    }
}

/// Unified error type for stockledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("invalid argument: {message} [{context}]")]
    InvalidArgument {
        message: String,
        context: ErrorContext,
    },

    #[error("invalid transaction type: {message} [{context}]")]
    InvalidTransactionType {
        message: String,
        context: ErrorContext,
    },

    #[error("duplicate key: {message} [{context}]")]
    DuplicateKey {
        message: String,
        context: ErrorContext,
    },

    // -------------------------------------------------------------------------
    // Durability Errors
    // -------------------------------------------------------------------------
    #[error("I/O failure: {message} [{context}]")]
    IoFailure {
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<io::Error>,
    },

    #[error("data corruption: {message} [{context}]")]
    DataCorruption {
        message: String,
        context: ErrorContext,
    },

    // -------------------------------------------------------------------------
    // Lookup / Ownership Errors
    // -------------------------------------------------------------------------
    #[error("not found: {message} [{context}]")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    #[error("writer busy: {message} [{context}]")]
    WriterBusy {
        message: String,
        context: ErrorContext,
    },
}

impl LedgerError {
    pub fn invalid_argument(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::InvalidArgument {
            message: message.into(),
            context,
        }
    }

    pub fn invalid_transaction_type(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::InvalidTransactionType {
            message: message.into(),
            context,
        }
    }

    pub fn duplicate_key(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::DuplicateKey {
            message: message.into(),
            context,
        }
    }

    pub fn io(source: io::Error, context: ErrorContext) -> Self {
        LedgerError::IoFailure {
            message: source.to_string(),
            context,
            source: Some(source),
        }
    }

    pub fn io_message(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::IoFailure {
            message: message.into(),
            context,
            source: None,
        }
    }

    pub fn data_corruption(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::DataCorruption {
            message: message.into(),
            context,
        }
    }

    pub fn not_found(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn writer_busy(message: impl Into<String>, context: ErrorContext) -> Self {
        LedgerError::WriterBusy {
            message: message.into(),
            context,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            LedgerError::InvalidTransactionType { .. } => ErrorKind::InvalidTransactionType,
            LedgerError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            LedgerError::IoFailure { .. } => ErrorKind::IoFailure,
            LedgerError::DataCorruption { .. } => ErrorKind::DataCorruption,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::WriterBusy { .. } => ErrorKind::WriterBusy,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            LedgerError::InvalidArgument { message, .. }
            | LedgerError::InvalidTransactionType { message, .. }
            | LedgerError::DuplicateKey { message, .. }
            | LedgerError::IoFailure { message, .. }
            | LedgerError::DataCorruption { message, .. }
            | LedgerError::NotFound { message, .. }
            | LedgerError::WriterBusy { message, .. } => message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            LedgerError::InvalidArgument { context, .. }
            | LedgerError::InvalidTransactionType { context, .. }
            | LedgerError::DuplicateKey { context, .. }
            | LedgerError::IoFailure { context, .. }
            | LedgerError::DataCorruption { context, .. }
            | LedgerError::NotFound { context, .. }
            | LedgerError::WriterBusy { context, .. } => context,
        }
    }

    /// Replace the context, keeping kind and message
    pub fn with_context(mut self, new_context: ErrorContext) -> Self {
        match &mut self {
            LedgerError::InvalidArgument { context, .. }
            | LedgerError::InvalidTransactionType { context, .. }
            | LedgerError::DuplicateKey { context, .. }
            | LedgerError::IoFailure { context, .. }
            | LedgerError::DataCorruption { context, .. }
            | LedgerError::NotFound { context, .. }
            | LedgerError::WriterBusy { context, .. } => *context = new_context,
        }
        self
    }
}

impl From<io::Error> for LedgerError {
    fn from(source: io::Error) -> Self {
        LedgerError::io(source, ErrorContext::default())
    }
}
