//! Connection Handler
//!
//! Runs the read → dispatch → write loop for one accepted client.
//!
//! ## States
//! ```text
//!  Unauthenticated ──OK from authenticate──▶ Serving
//!        │                                     │
//!        └──exit code / I/O fault / bad frame──┴──▶ Closed
//! ```
//!
//! Writes are handed to a single-worker transmission pool so the next read can
//! start while the previous response is still being written. At most one write
//! is in flight, which keeps responses in request order.

use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Backpressure;
use crate::error::{MarinaError, Result};
use crate::network::admission::AdmissionPermit;
use crate::network::channel::{ChannelReader, ChannelWriter, MessageChannel};
use crate::network::dispatcher::Dispatcher;
use crate::network::pool::{TaskHandle, WorkerPool};
use crate::network::shutdown::{ShutdownReason, ShutdownTrigger};
use crate::protocol::{Request, Response, ResponseCode, User};

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Serving(User),
    Closed,
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Serving(user) => Some(user),
            _ => None,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer asked to disconnect
    ClientExit,

    /// Peer issued the administrative shutdown command
    ServerExit,

    /// Peer went away or the socket failed on read
    Disconnected,

    /// Peer sent a frame that could not be decoded
    ProtocolFault,

    /// A response could not be written
    WriteFailed,
}

/// Handles a single client connection
pub struct Connection {
    /// Receiving half, used only by the session thread
    reader: ChannelReader,

    /// Sending half, used by the transmission worker
    writer: Arc<Mutex<ChannelWriter>>,

    /// One worker, one queue slot: keeps writes ordered
    transmitter: WorkerPool,

    dispatcher: Dispatcher,

    shutdown: ShutdownTrigger,

    state: SessionState,

    /// Peer address for logging
    peer_addr: String,

    /// Released when the connection is dropped; declared last so the socket
    /// and the transmission pool are gone first
    _permit: AdmissionPermit,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(
        id: u64,
        stream: TcpStream,
        permit: AdmissionPermit,
        dispatcher: Dispatcher,
        shutdown: ShutdownTrigger,
    ) -> Result<Self> {
        let channel = MessageChannel::new(stream)?;
        let peer_addr = channel.peer_addr().to_string();
        let (reader, writer) = channel.split();
        let transmitter = WorkerPool::new(format!("session-{}-tx", id), 1, 1, Backpressure::Block)?;

        Ok(Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            transmitter,
            dispatcher,
            shutdown,
            state: SessionState::Unauthenticated,
            peer_addr,
            _permit: permit,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Always ends in `Closed` with the admission permit released.
    pub fn run(mut self) -> SessionOutcome {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let outcome = self.serve();
        self.close();

        if outcome == SessionOutcome::ServerExit {
            self.shutdown.fire(ShutdownReason::ServerExit);
        }
        tracing::info!("Client {} disconnected ({:?})", self.peer_addr, outcome);
        outcome
    }

    fn serve(&mut self) -> SessionOutcome {
        let mut in_flight: Option<TaskHandle<Result<()>>> = None;

        loop {
            let request: Request = match self.reader.receive() {
                Ok(request) => request,
                Err(MarinaError::Disconnected(reason)) => {
                    tracing::debug!("Client {} disconnected: {}", self.peer_addr, reason);
                    return SessionOutcome::Disconnected;
                }
                Err(MarinaError::Protocol(reason)) => {
                    tracing::warn!("Malformed request from {}: {}", self.peer_addr, reason);
                    return SessionOutcome::ProtocolFault;
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return SessionOutcome::Disconnected;
                }
            };

            tracing::trace!("Received request from {}: {:?}", self.peer_addr, request.command);

            let response = self.handle_request(request);
            let code = response.code;

            // Wait out the previous write before queueing the next one
            if let Some(previous) = in_flight.take() {
                if !self.finish_write(previous) {
                    return SessionOutcome::WriteFailed;
                }
            }
            match self.transmit(response) {
                Ok(handle) => in_flight = Some(handle),
                Err(e) => {
                    tracing::error!("Could not queue response for {}: {}", self.peer_addr, e);
                    return SessionOutcome::WriteFailed;
                }
            }

            if code.ends_session() {
                // The exit takes effect even if its acknowledgement is lost
                if let Some(last) = in_flight.take() {
                    self.finish_write(last);
                }
                return match code {
                    ResponseCode::ServerExit => SessionOutcome::ServerExit,
                    _ => SessionOutcome::ClientExit,
                };
            }
        }
    }

    /// Dispatch one request and advance the authentication state
    fn handle_request(&mut self, request: Request) -> Response {
        if request.is_empty() {
            tracing::warn!("Client {} sent an empty request", self.peer_addr);
            return Response::error("Empty command.");
        }

        let command = request.command.clone();
        let credentials = request.user.clone();
        let response = self.dispatcher.dispatch(request, self.state.user());

        tracing::info!(
            "Request '{}' from {} processed: {:?}",
            command,
            self.peer_addr,
            response.code
        );

        if self.state == SessionState::Unauthenticated && response.code == ResponseCode::Ok {
            match credentials {
                Some(user) => {
                    tracing::info!("Client {} authenticated as '{}'", self.peer_addr, user.login);
                    self.state = SessionState::Serving(user);
                }
                None => tracing::warn!(
                    "Authentication of {} succeeded without credentials; staying unauthenticated",
                    self.peer_addr
                ),
            }
        }

        response
    }

    /// Queue a response on the transmission worker
    fn transmit(&self, response: Response) -> Result<TaskHandle<Result<()>>> {
        let writer = Arc::clone(&self.writer);
        self.transmitter.submit(move || {
            let mut writer = writer.lock();
            match writer.send(&response) {
                Err(MarinaError::Serialization(reason)) => {
                    tracing::error!("Response could not be encoded: {}", reason);
                    writer.send(&Response::internal_error("The response could not be encoded."))
                }
                other => other,
            }
        })
    }

    /// Wait for a queued write; false if it failed
    fn finish_write(&self, handle: TaskHandle<Result<()>>) -> bool {
        match handle.wait() {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                false
            }
            Err(e) => {
                tracing::error!("Transmission to {} failed: {}", self.peer_addr, e);
                false
            }
        }
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
        self.transmitter.shutdown();
        self.writer.lock().close();
    }
}
