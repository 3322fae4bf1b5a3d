//! Shutdown Signal
//!
//! One-shot channel through which sessions (and operators) ask the acceptor
//! to stop the whole server.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::network::admission::AdmissionController;

/// Why the server is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A session received a SERVER_EXIT response
    ServerExit,

    /// `ServerHandle::stop` was called
    Stop,

    /// The accept loop ended on its own
    Drained,
}

/// Create a connected trigger/listener pair
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownListener) {
    let (sender, receiver) = channel::bounded(1);
    (
        ShutdownTrigger {
            sender,
            admission: None,
        },
        ShutdownListener { receiver },
    )
}

/// Sending side; cheap to clone into every session
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Sender<ShutdownReason>,

    /// Closed inline by `fire`, before the caller can release a permit
    admission: Option<AdmissionController>,
}

impl ShutdownTrigger {
    /// Close `admission` synchronously whenever this trigger fires
    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Request shutdown. Only the first reason is kept.
    ///
    /// The attached admission controller is already shut down when this returns.
    pub fn fire(&self, reason: ShutdownReason) {
        if let Some(admission) = &self.admission {
            admission.shutdown();
        }
        if self.sender.try_send(reason).is_ok() {
            tracing::debug!("Shutdown requested ({:?})", reason);
        }
    }
}

/// Receiving side, observed by the acceptor
pub struct ShutdownListener {
    receiver: Receiver<ShutdownReason>,
}

impl ShutdownListener {
    /// Block until a shutdown is requested
    ///
    /// Returns `None` if every trigger was dropped without firing.
    pub fn wait(&self) -> Option<ShutdownReason> {
        self.receiver.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<ShutdownReason> {
        match self.receiver.recv_timeout(timeout) {
            Ok(reason) => Some(reason),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
