//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Frame Format
//! ```text
//! ┌────────────┬──────────┬──────────┬──────────────────────┬──────────┐
//! │ Version(1) │ Kind (1) │ Len (4)  │ Body (Len bytes)     │ CRC (4)  │
//! └────────────┴──────────┴──────────┴──────────────────────┴──────────┘
//! ```
//!
//! The body is the bincode encoding of a [`Request`] or [`Response`].
//! The CRC covers the body only.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Request, Response};
use crate::error::{MarinaError, Result};

/// Current envelope version
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Header size: version (1) + kind (1) + body length (4)
pub const HEADER_SIZE: usize = 6;

/// Trailer size: CRC32 of the body
pub const TRAILER_SIZE: usize = 4;

/// Maximum body size (16 MB)
pub const MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0x01,
    Response = 0x02,
}

/// A message that can travel in a frame
pub trait WireMessage: Serialize + DeserializeOwned + Send + 'static {
    const KIND: FrameKind;
}

impl WireMessage for Request {
    const KIND: FrameKind = FrameKind::Request;
}

impl WireMessage for Response {
    const KIND: FrameKind = FrameKind::Response;
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Encode a message into a complete frame
pub fn encode_frame<M: WireMessage>(message: &M) -> Result<Bytes> {
    let body = bincode::serialize(message)?;
    if body.len() > MAX_BODY_SIZE as usize {
        return Err(MarinaError::Serialization(format!(
            "Body too large: {} bytes (max {})",
            body.len(),
            MAX_BODY_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body.len() + TRAILER_SIZE);
    frame.put_u8(PROTOCOL_VERSION);
    frame.put_u8(M::KIND as u8);
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    frame.put_u32(crc32fast::hash(&body));

    Ok(frame.freeze())
}

/// Validate a frame header and return the body length
fn parse_header(header: &[u8]) -> Result<usize> {
    let version = header[0];
    if version != PROTOCOL_VERSION {
        return Err(MarinaError::Protocol(format!(
            "Unsupported protocol version: 0x{:02x}",
            version
        )));
    }

    let body_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    if body_len > MAX_BODY_SIZE {
        return Err(MarinaError::Protocol(format!(
            "Body too large: {} bytes (max {})",
            body_len, MAX_BODY_SIZE
        )));
    }

    Ok(body_len as usize)
}

fn check_kind(header: &[u8], expected: FrameKind) -> Result<()> {
    let kind = header[1];
    if kind != expected as u8 {
        return Err(MarinaError::Protocol(format!(
            "Unexpected frame kind: 0x{:02x} (expected 0x{:02x})",
            kind, expected as u8
        )));
    }
    Ok(())
}

/// Verify checksum and decode a frame body
fn decode_body<M: WireMessage>(body: &[u8], trailer: &[u8]) -> Result<M> {
    let stored_crc = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed_crc = crc32fast::hash(body);
    if stored_crc != computed_crc {
        return Err(MarinaError::Protocol(format!(
            "Checksum mismatch: stored 0x{:08x}, computed 0x{:08x}",
            stored_crc, computed_crc
        )));
    }

    bincode::deserialize(body)
        .map_err(|e| MarinaError::Protocol(format!("Malformed body: {}", e)))
}

/// Decode a message from a complete frame
pub fn decode_frame<M: WireMessage>(bytes: &[u8]) -> Result<M> {
    if bytes.len() < HEADER_SIZE {
        return Err(MarinaError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let body_len = parse_header(&bytes[..HEADER_SIZE])?;
    let total_len = HEADER_SIZE + body_len + TRAILER_SIZE;
    if bytes.len() < total_len {
        return Err(MarinaError::Protocol(format!(
            "Incomplete frame: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }
    check_kind(&bytes[..HEADER_SIZE], M::KIND)?;

    let body = &bytes[HEADER_SIZE..HEADER_SIZE + body_len];
    let trailer = &bytes[HEADER_SIZE + body_len..total_len];
    decode_body(body, trailer)
}

pub fn encode_request(request: &Request) -> Result<Bytes> {
    encode_frame(request)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    decode_frame(bytes)
}

pub fn encode_response(response: &Response) -> Result<Bytes> {
    encode_frame(response)
}

pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    decode_frame(bytes)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame from a stream and decode it
///
/// Blocks until a full frame is received or an error occurs.
/// I/O errors are returned as-is; the caller decides what counts as a disconnect.
pub fn read_message<M: WireMessage, R: Read>(reader: &mut R) -> Result<M> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let body_len = parse_header(&header)?;

    // Consume body and trailer before checking the kind so the stream stays aligned
    let mut rest = vec![0u8; body_len + TRAILER_SIZE];
    reader.read_exact(&mut rest)?;

    check_kind(&header, M::KIND)?;
    let (body, trailer) = rest.split_at(body_len);
    decode_body(body, trailer)
}

/// Encode a message and write it to a stream
pub fn write_message<M: WireMessage, W: Write>(writer: &mut W, message: &M) -> Result<()> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    read_message(reader)
}

pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    write_message(writer, request)
}

pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    read_message(reader)
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    write_message(writer, response)
}
