//! Protocol messages

use crate::error::LedgerError;

/// Message type byte in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Uint32Array = 0x01,
    StringArray = 0x02,
    Mixed = 0x03,
    Response = 0x04,
    Error = 0x05,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Uint32Array),
            0x02 => Some(Self::StringArray),
            0x03 => Some(Self::Mixed),
            0x04 => Some(Self::Response),
            0x05 => Some(Self::Error),
            _ => None,
        }
    }
}

/// A decoded frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Uint32Array(Vec<u32>),
    StringArray(Vec<String>),
    Mixed {
        numbers: Vec<u32>,
        strings: Vec<String>,
    },
    Response {
        status: u32,
        message: String,
    },
    Error {
        code: u32,
        message: String,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Uint32Array(_) => MessageType::Uint32Array,
            Message::StringArray(_) => MessageType::StringArray,
            Message::Mixed { .. } => MessageType::Mixed,
            Message::Response { .. } => MessageType::Response,
            Message::Error { .. } => MessageType::Error,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Message::Response {
            status: 0,
            message: message.into(),
        }
    }

    /// Error frame carrying the error's stable numeric code
    pub fn from_error(error: &LedgerError) -> Self {
        Message::Error {
            code: error.kind().code(),
            message: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Message::Error { .. })
    }
}
