//! Protocol Module
//!
//! Binary framing for exchanging ledger data with external clients.
//!
//! ## Frame Format
//! ```text
//! ┌───────────┬─────────┬─────────┬───────────┬──────────────┬────────────┐
//! │ Magic (4) │ Ver (1) │ Type(1) │ Flags (2) │ Payload (4)  │ CRC32 (4)  │
//! └───────────┴─────────┴─────────┴───────────┴──────────────┴────────────┘
//!   followed by `Payload` bytes
//! ```
//!
//! ### Message Types
//! - 0x01: UINT32_ARRAY
//! - 0x02: STRING_ARRAY
//! - 0x03: MIXED (u32 array then string array)
//! - 0x04: RESPONSE (status + message)
//! - 0x05: ERROR (code + message)
//!
//! The CRC32 covers the payload only. A frame whose checksum does not match
//! is rejected as corrupt.

mod codec;
mod message;

pub use codec::{
    decode_message, encode_message, read_message, write_message, FrameHeader, HEADER_SIZE, MAGIC,
    MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
pub use message::{Message, MessageType};
