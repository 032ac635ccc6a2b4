//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Payload by Message Type
//! - UINT32_ARRAY: count (4) + count × value (4)
//! - STRING_ARRAY: count (4) + count × (len (4) + UTF-8 bytes)
//! - MIXED:        UINT32_ARRAY payload + STRING_ARRAY payload
//! - RESPONSE:     status (4) + len (4) + UTF-8 message
//! - ERROR:        code (4) + len (4) + UTF-8 message
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ErrorContext, LedgerError, Result};

use super::{Message, MessageType};

/// Frame header size
pub const HEADER_SIZE: usize = 16;

/// First four bytes of every frame
pub const MAGIC: u32 = 0x1234_5678;

pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub flags: u16,
    pub payload_size: u32,
    pub checksum: u32,
}

impl FrameHeader {
    /// Parse and check the fixed 16-byte header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(protocol_error(format!(
                "incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let magic = buf.get_u32();
        let version = buf.get_u8();
        let type_byte = buf.get_u8();
        let flags = buf.get_u16();
        let payload_size = buf.get_u32();
        let checksum = buf.get_u32();

        if magic != MAGIC {
            return Err(protocol_error(format!("bad magic 0x{:08x}", magic)));
        }
        if version != PROTOCOL_VERSION {
            return Err(protocol_error(format!("unsupported version {}", version)));
        }
        let message_type = MessageType::from_u8(type_byte)
            .ok_or_else(|| protocol_error(format!("unknown message type 0x{:02x}", type_byte)))?;
        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(protocol_error(format!(
                "payload too large: {} bytes (max {})",
                payload_size, MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self {
            message_type,
            flags,
            payload_size,
            checksum,
        })
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a message as one complete frame. Payloads over
/// [`MAX_PAYLOAD_SIZE`] are rejected, as the decoder would.
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let mut payload = BytesMut::new();
    match message {
        Message::Uint32Array(values) => put_u32_array(&mut payload, values),
        Message::StringArray(values) => put_string_array(&mut payload, values),
        Message::Mixed { numbers, strings } => {
            put_u32_array(&mut payload, numbers);
            put_string_array(&mut payload, strings);
        }
        Message::Response { status, message } => put_status(&mut payload, *status, message),
        Message::Error { code, message } => put_status(&mut payload, *code, message),
    }

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(LedgerError::invalid_argument(
            format!(
                "payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            ),
            ErrorContext::new("protocol", "encode"),
        ));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(MAGIC);
    frame.put_u8(PROTOCOL_VERSION);
    frame.put_u8(message.message_type() as u8);
    frame.put_u16(0);
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.extend_from_slice(&payload);
    Ok(frame.freeze())
}

fn put_u32_array(buf: &mut BytesMut, values: &[u32]) {
    buf.reserve(4 + values.len() * 4);
    buf.put_u32(values.len() as u32);
    for value in values {
        buf.put_u32(*value);
    }
}

fn put_string_array(buf: &mut BytesMut, values: &[String]) {
    buf.put_u32(values.len() as u32);
    for value in values {
        buf.put_u32(value.len() as u32);
        buf.extend_from_slice(value.as_bytes());
    }
}

fn put_status(buf: &mut BytesMut, code: u32, message: &str) {
    buf.put_u32(code);
    buf.put_u32(message.len() as u32);
    buf.extend_from_slice(message.as_bytes());
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one complete frame. Bytes after the frame are ignored.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let header = FrameHeader::parse(bytes)?;
    let total_len = HEADER_SIZE + header.payload_size as usize;
    if bytes.len() < total_len {
        return Err(protocol_error(format!(
            "incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    decode_payload(&header, &bytes[HEADER_SIZE..total_len])
}

fn decode_payload(header: &FrameHeader, payload: &[u8]) -> Result<Message> {
    let actual = crc32fast::hash(payload);
    if actual != header.checksum {
        return Err(LedgerError::data_corruption(
            format!(
                "checksum mismatch: header 0x{:08x}, payload 0x{:08x}",
                header.checksum, actual
            ),
            ErrorContext::new("protocol", "decode"),
        ));
    }

    let mut buf = payload;
    let message = match header.message_type {
        MessageType::Uint32Array => Message::Uint32Array(take_u32_array(&mut buf)?),
        MessageType::StringArray => Message::StringArray(take_string_array(&mut buf)?),
        MessageType::Mixed => Message::Mixed {
            numbers: take_u32_array(&mut buf)?,
            strings: take_string_array(&mut buf)?,
        },
        MessageType::Response => {
            let status = take_u32(&mut buf)?;
            Message::Response {
                status,
                message: take_string(&mut buf)?,
            }
        }
        MessageType::Error => {
            let code = take_u32(&mut buf)?;
            Message::Error {
                code,
                message: take_string(&mut buf)?,
            }
        }
    };

    if buf.has_remaining() {
        return Err(protocol_error(format!(
            "{} trailing bytes in payload",
            buf.remaining()
        )));
    }
    Ok(message)
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(protocol_error("payload truncated"));
    }
    Ok(buf.get_u32())
}

fn take_u32_array(buf: &mut &[u8]) -> Result<Vec<u32>> {
    let count = take_u32(buf)? as usize;
    if buf.remaining() < count.saturating_mul(4) {
        return Err(protocol_error(format!(
            "array of {} values exceeds payload",
            count
        )));
    }
    Ok((0..count).map(|_| buf.get_u32()).collect())
}

fn take_string(buf: &mut &[u8]) -> Result<String> {
    let len = take_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(protocol_error(format!("string of {} bytes exceeds payload", len)));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| protocol_error(format!("invalid UTF-8: {}", e)))
}

fn take_string_array(buf: &mut &[u8]) -> Result<Vec<String>> {
    let count = take_u32(buf)? as usize;
    // Each string needs at least its length prefix
    if buf.remaining() < count.saturating_mul(4) {
        return Err(protocol_error(format!(
            "array of {} strings exceeds payload",
            count
        )));
    }
    (0..count).map(|_| take_string(buf)).collect()
}

// =============================================================================
// Stream I/O
// =============================================================================

/// Read exactly one frame from a stream
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|e| LedgerError::io(e, ErrorContext::new("protocol", "read")))?;
    let header = FrameHeader::parse(&header_bytes)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| LedgerError::io(e, ErrorContext::new("protocol", "read")))?;

    decode_payload(&header, &payload)
}

/// Write one frame and flush
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let frame = encode_message(message)?;
    writer
        .write_all(&frame)
        .and_then(|_| writer.flush())
        .map_err(|e| LedgerError::io(e, ErrorContext::new("protocol", "write")))
}

fn protocol_error(message: impl Into<String>) -> LedgerError {
    LedgerError::invalid_argument(message, ErrorContext::new("protocol", "decode"))
}
