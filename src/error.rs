//! Error types for Marina
//!
//! Provides a unified error type for the server, the client, and the wire protocol.

use std::io::ErrorKind;

use thiserror::Error;

/// Result type alias using MarinaError
pub type Result<T> = std::result::Result<T, MarinaError>;

/// Unified error type for Marina operations
#[derive(Debug, Error)]
pub enum MarinaError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer went away (EOF, reset, aborted, broken pipe)
    #[error("Disconnected: {0}")]
    Disconnected(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Admission rejected: controller is shut down")]
    AdmissionRejected,

    #[error("Worker pool '{0}' is saturated")]
    PoolSaturated(String),

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Server has not been started")]
    NotStarted,

    #[error("Server is already stopped")]
    AlreadyStopped,
}

impl MarinaError {
    /// Whether this error means the transport is unusable and a reconnect may help
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, MarinaError::Io(_) | MarinaError::Disconnected(_))
    }

    /// Fold I/O errors that mean "peer went away" into `Disconnected`
    pub(crate) fn classify_io(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => MarinaError::Disconnected(err.to_string()),
            _ => MarinaError::Io(err),
        }
    }
}

impl From<bincode::Error> for MarinaError {
    fn from(err: bincode::Error) -> Self {
        MarinaError::Serialization(err.to_string())
    }
}
