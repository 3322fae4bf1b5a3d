//! Protocol Module
//!
//! Defines the message schema and framing for client-server communication.
//!
//! ## Frame Format (V1)
//! ```text
//! ┌────────────┬──────────┬──────────┬──────────────────────┬──────────┐
//! │ Version(1) │ Kind (1) │ Len (4)  │ Body (Len bytes)     │ CRC (4)  │
//! └────────────┴──────────┴──────────┴──────────────────────┴──────────┘
//! ```
//!
//! ### Kinds
//! - 0x01: REQUEST  - Body: command, argument, payload, credentials
//! - 0x02: RESPONSE - Body: response code, body text
//!
//! ### Control Codes
//! - CLIENT_EXIT: ends the originating session
//! - SERVER_EXIT: ends the originating session and shuts the server down

mod request;
mod response;
mod codec;

pub use request::{Request, User, EXIT_COMMAND};
pub use response::{Response, ResponseCode};
pub use codec::{
    decode_frame, decode_request, decode_response, encode_frame, encode_request,
    encode_response, read_message, read_request, read_response, write_message, write_request,
    write_response, FrameKind, WireMessage, HEADER_SIZE, MAX_BODY_SIZE, PROTOCOL_VERSION,
    TRAILER_SIZE,
};
