//! # Marina
//!
//! A client/server pair for operating on a shared remote collection:
//! - Bounded admission of concurrent connections
//! - Per-connection sessions with pipelined, ordered responses
//! - Shared compute pool isolating command faults from I/O
//! - Reconnecting client with fixed backoff and an attempt budget
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Client Session                          │
//! │           (connect → authenticate → request loop)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  framed Request / Response
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Acceptor / Server Loop                     │
//! │              (admission controller, shutdown)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  one thread per connection
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Connection  │          │ Connection  │
//!   │  Session    │   ...    │  Session    │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────────────────────────────┐
//!   │     Dispatcher (compute pool)       │
//!   │   authenticate / execute handler    │
//!   └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod client;
pub mod collection;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MarinaError, Result};
pub use config::{ClientConfig, ServerConfig};
pub use network::{RequestHandler, Server, ServerHandle};
pub use client::{ClientOutcome, ClientSession, Interaction};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Marina
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
