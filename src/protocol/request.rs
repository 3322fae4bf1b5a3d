//! Request definitions
//!
//! Represents requests from clients.

use serde::{Deserialize, Serialize};

/// Command name that ends a client session
pub const EXIT_COMMAND: &str = "exit";

/// Login and password pair attached to authentication requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub password: String,
}

impl User {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// A request sent from client to server
///
/// An empty command name marks the no-op sentinel, which is never transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Command name
    pub command: String,

    /// Simple string argument (may be empty)
    pub argument: String,

    /// Optional command-specific data
    pub payload: Option<Vec<u8>>,

    /// Credentials, present on authentication requests
    pub user: Option<User>,
}

impl Request {
    /// Create a request with just a command name
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// The no-op sentinel
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = argument.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Check for the no-op sentinel
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    pub fn is_exit(&self) -> bool {
        self.command == EXIT_COMMAND
    }
}
