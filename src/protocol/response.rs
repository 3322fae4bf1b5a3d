//! Response definitions
//!
//! Represents responses to clients.

use serde::{Deserialize, Serialize};

/// Response status codes
///
/// `ClientExit` and `ServerExit` carry control-flow meaning for the session loop.
/// Everything else is forwarded to the peer untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    Ok,
    Error,
    ClientExit,
    ServerExit,
    InternalError,
    Busy,

    /// Application-specific status
    Status(u16),
}

impl ResponseCode {
    /// Whether a session that produced this code must stop
    pub fn ends_session(self) -> bool {
        matches!(self, ResponseCode::ClientExit | ResponseCode::ServerExit)
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Status code
    pub code: ResponseCode,

    /// Human-readable body (may be empty)
    pub body: String,
}

impl Response {
    pub fn new(code: ResponseCode, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// Create an OK response
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(ResponseCode::Ok, body)
    }

    /// Create an ERROR response
    pub fn error(body: impl Into<String>) -> Self {
        Self::new(ResponseCode::Error, body)
    }

    /// Create an INTERNAL_ERROR response (computation fault)
    pub fn internal_error(body: impl Into<String>) -> Self {
        Self::new(ResponseCode::InternalError, body)
    }

    /// Create a BUSY response (compute pool saturated)
    pub fn busy(body: impl Into<String>) -> Self {
        Self::new(ResponseCode::Busy, body)
    }
}
