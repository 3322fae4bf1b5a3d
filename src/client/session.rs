//! Client Session
//!
//! Owns the connection to the server and recovers it after transient failures.

use std::net::SocketAddr;
use std::thread;

use tracing::Span;

use super::Interaction;
use crate::config::{resolve_addr, ClientConfig};
use crate::error::{MarinaError, Result};
use crate::network::MessageChannel;
use crate::protocol::{Request, Response, ResponseCode, User, EXIT_COMMAND};

/// How a client run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// The user exited or ran out of input
    Finished,

    /// The server stayed unreachable for the whole attempt budget
    AttemptsExhausted,
}

/// A client's session against one server
pub struct ClientSession<I: Interaction> {
    config: ClientConfig,
    interaction: I,
    channel: Option<MessageChannel>,

    /// Credential request that last succeeded, replayed after a reconnect
    credentials: Option<Request>,
    user: Option<User>,

    /// Consecutive failed connection attempts; reset by a successful connect
    failed_attempts: u32,

    /// Every connection attempt made so far
    connection_attempts: u64,

    span: Span,
}

impl<I: Interaction> ClientSession<I> {
    pub fn new(config: ClientConfig, interaction: I) -> Self {
        let span = tracing::info_span!("client", server = %config.server_addr);
        Self {
            config,
            interaction,
            channel: None,
            credentials: None,
            user: None,
            failed_attempts: 0,
            connection_attempts: 0,
            span,
        }
    }

    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts
    }

    /// The authenticated user, once the server accepted the credentials
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn interaction(&self) -> &I {
        &self.interaction
    }

    pub fn into_interaction(self) -> I {
        self.interaction
    }

    /// Run the whole client lifecycle (blocking)
    ///
    /// Only configuration errors are returned as `Err`; running out of
    /// connection attempts is a normal outcome.
    pub fn run(&mut self) -> Result<ClientOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        let addrs = match self
            .config
            .validate()
            .and_then(|_| resolve_addr(&self.config.server_addr))
        {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::error!("Client cannot be started: {}", e);
                self.interaction
                    .notify("The client cannot be started: server address or settings are invalid!");
                return Err(e);
            }
        };

        let outcome = loop {
            match self.run_once(&addrs) {
                Ok(outcome) => break outcome,
                Err(e) if e.is_connection_failure() => {
                    if self.failed_attempts >= self.config.max_reconnect_attempts {
                        tracing::warn!(
                            "Giving up after {} failed connection attempts",
                            self.failed_attempts
                        );
                        self.interaction.notify("Maximum connection attempts exceeded!");
                        break ClientOutcome::AttemptsExhausted;
                    }
                    self.backoff();
                }
                Err(e) => {
                    self.disconnect();
                    tracing::error!("Client stopped: {}", e);
                    self.interaction.notify("The client cannot continue!");
                    return Err(e);
                }
            }
        };

        self.disconnect();
        self.interaction.notify("Client work completed.");
        Ok(outcome)
    }

    fn run_once(&mut self, addrs: &[SocketAddr]) -> Result<ClientOutcome> {
        self.connect(addrs)?;
        if self.authenticate(addrs)? {
            self.process_requests(addrs);
        }
        Ok(ClientOutcome::Finished)
    }

    fn connect(&mut self, addrs: &[SocketAddr]) -> Result<()> {
        if self.connection_attempts > 0 {
            self.interaction.notify("Reconnecting to server...");
        }
        self.connection_attempts += 1;
        self.disconnect();

        match MessageChannel::connect(addrs, self.config.connect_timeout()) {
            Ok(channel) => {
                tracing::debug!("Connected to {}", channel.peer_addr());
                self.channel = Some(channel);
                self.failed_attempts = 0;
                self.interaction.notify("Connected to server.");
                Ok(())
            }
            Err(e) => {
                self.failed_attempts += 1;
                tracing::debug!(
                    "Connection attempt {} failed: {}",
                    self.connection_attempts,
                    e
                );
                self.interaction
                    .notify("An error occurred while connecting to the server!");
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    /// Sleep for the configured delay; a bad delay means no sleep
    fn backoff(&mut self) {
        match self.config.reconnect_delay() {
            Some(delay) => {
                tracing::debug!("Waiting {:?} before reconnecting", delay);
                thread::sleep(delay);
            }
            None => {
                tracing::warn!(
                    "Reconnection delay {}ms is invalid, retrying immediately",
                    self.config.reconnect_delay_ms
                );
                self.interaction.notify(&format!(
                    "Connection timeout '{}' is out of possible range! Reconnecting immediately.",
                    self.config.reconnect_delay_ms
                ));
            }
        }
    }

    /// One request/response round trip; a transport failure drops the channel
    fn exchange(&mut self, request: &Request) -> Result<Response> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| MarinaError::Disconnected("not connected".to_string()))?;

        let result = channel
            .send(request)
            .and_then(|_| channel.receive::<Response>());

        if let Err(e) = &result {
            if e.is_connection_failure() {
                self.disconnect();
            }
        }
        result
    }

    /// Returns `false` if the user stopped before authenticating
    fn authenticate(&mut self, addrs: &[SocketAddr]) -> Result<bool> {
        loop {
            let Some(request) = self.interaction.credentials() else {
                return Ok(false);
            };
            if request.is_empty() {
                continue;
            }

            // Channel lost to an earlier failed restore
            if self.channel.is_none() {
                self.backoff();
                if !self.restore_for_authentication(addrs)? {
                    continue;
                }
            }

            match self.exchange(&request) {
                Ok(response) => {
                    self.interaction.render(&response);
                    if response.code == ResponseCode::Ok {
                        self.user = Some(request.user.clone().unwrap_or_default());
                        self.credentials = Some(request);
                        return Ok(true);
                    }
                    if response.code.ends_session() {
                        return Ok(false);
                    }
                }
                Err(e) if e.is_connection_failure() => {
                    self.interaction
                        .notify("The connection to the server has been terminated!");
                    self.restore_for_authentication(addrs)?;
                }
                Err(MarinaError::Serialization(reason)) => {
                    tracing::warn!("Credentials could not be encoded: {}", reason);
                    self.interaction
                        .notify("An error occurred while sending data to the server!");
                }
                Err(e) => {
                    tracing::warn!("Bad authentication exchange: {}", e);
                    self.interaction
                        .notify("An error occurred while reading received data!");
                }
            }
        }
    }

    /// One reconnection attempt during authentication
    ///
    /// `Ok(false)` leaves the user to try again; `Err` once the budget is spent.
    fn restore_for_authentication(&mut self, addrs: &[SocketAddr]) -> Result<bool> {
        match self.connect(addrs) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.interaction.notify("Try repeating authentication later.");
                if self.failed_attempts >= self.config.max_reconnect_attempts {
                    return Err(e);
                }
                Ok(false)
            }
        }
    }

    /// Interactive loop; ends after the exit command is sent
    fn process_requests(&mut self, addrs: &[SocketAddr]) {
        let user = self.user.clone().unwrap_or_default();
        let mut last_code = None;

        loop {
            let request = self
                .interaction
                .next_request(last_code, &user)
                .unwrap_or_else(|| Request::new(EXIT_COMMAND));
            if request.is_empty() {
                continue;
            }
            let is_exit = request.is_exit();

            match self.exchange(&request) {
                Ok(response) => {
                    last_code = Some(response.code);
                    self.interaction.render(&response);
                }
                Err(e) if e.is_connection_failure() => {
                    self.interaction
                        .notify("The connection to the server has been terminated!");
                    match self.reconnect_inline(addrs) {
                        Ok(()) => self
                            .interaction
                            .notify("Connection restored; repeat the command if it had no effect."),
                        Err(e) => {
                            tracing::debug!("Inline reconnection failed: {}", e);
                            if is_exit {
                                self.interaction
                                    .notify("The command will not be registered on the server.");
                            } else {
                                self.interaction.notify("Try repeating the command later.");
                            }
                        }
                    }
                }
                Err(MarinaError::Serialization(reason)) => {
                    tracing::warn!("Request '{}' could not be encoded: {}", request.command, reason);
                    self.interaction
                        .notify("An error occurred while sending data to the server!");
                }
                Err(e) => {
                    tracing::warn!("Bad exchange for '{}': {}", request.command, e);
                    self.interaction
                        .notify("An error occurred while reading received data!");
                }
            }

            if is_exit {
                return;
            }
        }
    }

    /// Connect once and replay the stored credentials
    fn reconnect_inline(&mut self, addrs: &[SocketAddr]) -> Result<()> {
        self.connect(addrs)?;
        let Some(credentials) = self.credentials.clone() else {
            return Ok(());
        };

        let response = self.exchange(&credentials)?;
        if response.code != ResponseCode::Ok {
            self.disconnect();
            return Err(MarinaError::Protocol(format!(
                "re-authentication rejected: {}",
                response.body
            )));
        }
        Ok(())
    }
}
