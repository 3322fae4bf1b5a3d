//! TCP Server
//!
//! Accepts connections under the admission bound and runs one session thread
//! per client.
//!
//! ## Shutdown
//! Sessions and [`ServerHandle::stop`] push into a one-shot shutdown channel.
//! A watcher thread turns the first signal into: state `Stopping`, admission
//! closed. The accept loop then exits, the listener is dropped, and `run`
//! waits for every live session before reporting `Stopped`.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::sync::WaitGroup;
use parking_lot::{Condvar, Mutex};
use tracing::Span;

use crate::config::{resolve_addr, ServerConfig};
use crate::error::{MarinaError, Result};
use crate::network::admission::{AdmissionController, AdmissionPermit};
use crate::network::connection::Connection;
use crate::network::dispatcher::{Dispatcher, RequestHandler};
use crate::network::pool::WorkerPool;
use crate::network::shutdown::{shutdown_channel, ShutdownListener, ShutdownReason, ShutdownTrigger};

/// Server lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not yet listening
    Idle,
    Running,
    /// Shutdown requested, sessions draining
    Stopping,
    Stopped,
}

struct Shared {
    state: Mutex<ServerState>,
    state_changed: Condvar,
    local_addr: Mutex<Option<SocketAddr>>,
    admission: AdmissionController,
    trigger: ShutdownTrigger,
    active_sessions: AtomicUsize,
}

impl Shared {
    fn set_state(&self, next: ServerState) {
        *self.state.lock() = next;
        self.state_changed.notify_all();
    }

    /// True as soon as any trigger fired, even before the watcher updates the state
    fn is_stopping(&self) -> bool {
        self.admission.is_shut_down()
            || matches!(
                *self.state.lock(),
                ServerState::Stopping | ServerState::Stopped
            )
    }

    /// Enter `Stopping` (if still running) and unblock admission
    fn begin_shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state == ServerState::Running {
                *state = ServerState::Stopping;
                self.state_changed.notify_all();
            }
        }
        self.admission.shutdown();
    }
}

/// Decrements the live-session count when a session thread finishes
struct ActiveSession(Arc<Shared>);

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// TCP server for Marina
pub struct Server {
    config: ServerConfig,
    handler: Arc<dyn RequestHandler>,
    shared: Arc<Shared>,
    shutdown_listener: Option<ShutdownListener>,
    span: Span,
}

impl Server {
    /// Create a new server with the given config and handler
    pub fn new(config: ServerConfig, handler: Arc<dyn RequestHandler>) -> Self {
        let admission = AdmissionController::new(config.max_connections);
        let (trigger, listener) = shutdown_channel();
        let trigger = trigger.with_admission(admission.clone());
        let span = tracing::info_span!("server", listen = %config.listen_addr);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServerState::Idle),
                state_changed: Condvar::new(),
                local_addr: Mutex::new(None),
                admission,
                trigger,
                active_sessions: AtomicUsize::new(0),
            }),
            config,
            handler,
            shutdown_listener: Some(listener),
            span,
        }
    }

    /// Get a handle for stopping and observing the server from other threads
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start the server (blocking)
    ///
    /// Returns once shutdown was requested and every session has closed.
    /// Fails without retrying if the listen address is unusable.
    pub fn run(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        let shutdown_listener = self.shutdown_listener.take().ok_or_else(|| {
            tracing::error!("Server was already run once");
            MarinaError::AlreadyStopped
        })?;

        tracing::info!("Starting the server...");
        let listener = self.bind()?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let compute = Arc::new(WorkerPool::new(
            "compute",
            self.config.worker_threads,
            self.config.task_queue_capacity,
            self.config.backpressure,
        )?);
        let dispatcher = Dispatcher::new(Arc::clone(&self.handler), Arc::clone(&compute));

        let shared = Arc::clone(&self.shared);
        let watcher = thread::Builder::new()
            .name("shutdown-watcher".to_string())
            .spawn(move || {
                if let Some(reason) = shutdown_listener.wait() {
                    if reason != ShutdownReason::Drained {
                        tracing::info!("Shutdown requested: {:?}", reason);
                    }
                }
                shared.begin_shutdown();
            })?;

        *self.shared.local_addr.lock() = Some(local_addr);
        self.shared.set_state(ServerState::Running);
        tracing::info!("Server is running on {}", local_addr);

        let sessions = WaitGroup::new();
        self.accept_loop(&listener, &dispatcher, &sessions);

        drop(listener);
        tracing::info!(
            "Stopped accepting; ending work with {} connected client(s)...",
            self.shared.active_sessions.load(Ordering::SeqCst)
        );
        sessions.wait();

        drop(dispatcher);
        if let Ok(mut pool) = Arc::try_unwrap(compute) {
            pool.shutdown();
        }

        self.shared.trigger.fire(ShutdownReason::Drained);
        if watcher.join().is_err() {
            tracing::warn!("Shutdown watcher exited abnormally");
        }

        self.shared.set_state(ServerState::Stopped);
        tracing::info!("Server work is complete.");
        Ok(())
    }

    fn bind(&self) -> Result<TcpListener> {
        let addrs = resolve_addr(&self.config.listen_addr).map_err(|e| {
            tracing::error!("Server cannot be started: {}", e);
            e
        })?;
        self.config.validate().map_err(|e| {
            tracing::error!("Server cannot be started: {}", e);
            e
        })?;

        TcpListener::bind(&addrs[..]).map_err(|e| {
            tracing::error!(
                "An error occurred while trying to use '{}': {}",
                self.config.listen_addr,
                e
            );
            MarinaError::Io(e)
        })
    }

    fn accept_loop(&self, listener: &TcpListener, dispatcher: &Dispatcher, sessions: &WaitGroup) {
        let mut next_id: u64 = 0;

        loop {
            let permit = match self.shared.admission.acquire() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("Admission closed, leaving accept loop");
                    break;
                }
            };
            tracing::debug!("Permission for a new connection received");

            // Dropping the permit on this path releases it
            let Some((stream, addr)) = self.accept_one(listener) else {
                break;
            };

            next_id += 1;
            self.spawn_session(next_id, stream, addr, permit, dispatcher, sessions);
        }
    }

    /// Poll the listener until a client arrives or shutdown begins
    fn accept_one(&self, listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
        let poll = self.config.accept_poll_interval();

        loop {
            if self.shared.is_stopping() {
                return None;
            }
            match listener.accept() {
                Ok((stream, addr)) => {
                    if self.shared.is_stopping() {
                        tracing::debug!("Refusing {} accepted during shutdown", addr);
                        return None;
                    }
                    // Accepted sockets may inherit non-blocking mode on some platforms
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Could not configure connection from {}: {}", addr, e);
                        continue;
                    }
                    tracing::info!("Connection with the client {} established", addr);
                    return Some((stream, addr));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) => {
                    tracing::warn!("Error occurred while connecting to a client: {}", e);
                    thread::sleep(poll);
                }
            }
        }
    }

    fn spawn_session(
        &self,
        id: u64,
        stream: TcpStream,
        addr: SocketAddr,
        permit: AdmissionPermit,
        dispatcher: &Dispatcher,
        sessions: &WaitGroup,
    ) {
        let dispatcher = dispatcher.clone();
        let trigger = self.shared.trigger.clone();
        let wait_group = sessions.clone();
        let span = tracing::info_span!(parent: &self.span, "session", id, peer = %addr);

        self.shared.active_sessions.fetch_add(1, Ordering::SeqCst);
        let active = ActiveSession(Arc::clone(&self.shared));

        let spawned = thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn(move || {
                let _wait_group = wait_group;
                let _active = active;
                let _enter = span.enter();

                match Connection::new(id, stream, permit, dispatcher, trigger) {
                    Ok(connection) => {
                        connection.run();
                    }
                    Err(e) => tracing::warn!("Could not set up connection: {}", e),
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Could not start a session for {}: {}", addr, e);
        }
    }
}

/// Cloneable control handle for a [`Server`]
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Stop the server and wait for all sessions to close
    ///
    /// Fails with `NotStarted` before the server is listening and with
    /// `AlreadyStopped` if shutdown is already underway. Neither changes state.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            ServerState::Idle => {
                tracing::error!("Cannot stop a server that hasn't been started yet!");
                return Err(MarinaError::NotStarted);
            }
            ServerState::Running if self.shared.admission.is_shut_down() => {
                tracing::warn!("Server is already stopping");
                return Err(MarinaError::AlreadyStopped);
            }
            ServerState::Stopping | ServerState::Stopped => {
                tracing::warn!("Server is already stopping");
                return Err(MarinaError::AlreadyStopped);
            }
            ServerState::Running => {
                *state = ServerState::Stopping;
                self.shared.state_changed.notify_all();
            }
        }

        tracing::info!("Stopping the server...");
        self.shared.trigger.fire(ShutdownReason::Stop);
        self.shared.admission.shutdown();

        while *state != ServerState::Stopped {
            self.shared.state_changed.wait(&mut state);
        }
        Ok(())
    }

    /// Block until the server is fully stopped
    pub fn wait_stopped(&self) {
        let mut state = self.shared.state.lock();
        while *state != ServerState::Stopped {
            self.shared.state_changed.wait(&mut state);
        }
    }

    /// Wait until the server is listening and return its bound address
    pub fn wait_ready(&self, timeout: Duration) -> Option<SocketAddr> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while *state == ServerState::Idle {
            if self
                .shared
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        drop(state);
        self.local_addr()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock()
    }

    pub fn state(&self) -> ServerState {
        *self.shared.state.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ServerState::Stopped
    }

    /// Session threads currently alive
    pub fn active_sessions(&self) -> usize {
        self.shared.active_sessions.load(Ordering::SeqCst)
    }

    /// Admission permits currently held
    pub fn admission_in_use(&self) -> usize {
        self.shared.admission.in_use()
    }
}
