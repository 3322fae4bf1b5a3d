//! Network Module
//!
//! TCP server side of Marina plus the message channel both roles share.
//!
//! ## Architecture
//! - Single acceptor thread gated by the admission controller
//! - One thread per admitted connection
//! - Shared compute pool for request handling
//! - Per-connection transmission worker for pipelined, ordered writes

mod admission;
mod channel;
mod connection;
mod dispatcher;
mod pool;
mod server;
mod shutdown;

pub use admission::{AdmissionController, AdmissionPermit};
pub use channel::{ChannelReader, ChannelWriter, MessageChannel};
pub use connection::{Connection, SessionOutcome, SessionState};
pub use dispatcher::{Dispatcher, RequestHandler};
pub use pool::{TaskHandle, WorkerPool};
pub use server::{Server, ServerHandle, ServerState};
pub use shutdown::{shutdown_channel, ShutdownListener, ShutdownReason, ShutdownTrigger};
