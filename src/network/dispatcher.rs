//! Request Dispatcher
//!
//! Routes a request to authentication or execution and runs it on the
//! shared compute pool.

use std::sync::Arc;

use crate::error::MarinaError;
use crate::network::pool::WorkerPool;
use crate::protocol::{Request, Response, User};

/// Business logic the server delegates to
///
/// Implementations may serialize access to shared state internally.
/// The dispatcher never calls them concurrently for the same connection.
pub trait RequestHandler: Send + Sync + 'static {
    /// Check credentials. An `Ok` response authenticates the connection.
    fn authenticate(&self, request: &Request) -> Response;

    /// Run a command on behalf of an authenticated user
    fn execute(&self, request: &Request, user: &User) -> Response;
}

/// Fault boundary between a session's I/O loop and the handler
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn RequestHandler>,
    pool: Arc<WorkerPool>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn RequestHandler>, pool: Arc<WorkerPool>) -> Self {
        Self { handler, pool }
    }

    /// Compute the response for `request`
    ///
    /// Without a user the request goes to `authenticate`, otherwise to `execute`.
    /// Never fails: pool and handler faults come back as error responses.
    pub fn dispatch(&self, request: Request, user: Option<&User>) -> Response {
        let handler = Arc::clone(&self.handler);
        let command = request.command.clone();

        let submitted = match user.cloned() {
            None => self.pool.submit(move || handler.authenticate(&request)),
            Some(user) => self.pool.submit(move || handler.execute(&request, &user)),
        };

        match submitted.and_then(|task| task.wait()) {
            Ok(response) => response,
            Err(MarinaError::PoolSaturated(pool)) => {
                tracing::warn!("Compute pool '{}' saturated, refusing '{}'", pool, command);
                Response::busy("The server is busy, try again later.")
            }
            Err(MarinaError::TaskPanicked(message)) => {
                tracing::error!("Command '{}' panicked: {}", command, message);
                Response::internal_error(format!(
                    "An internal error occurred while processing '{}'.",
                    command
                ))
            }
            Err(e) => {
                tracing::error!("Command '{}' could not be processed: {}", command, e);
                Response::internal_error("The request could not be processed.")
            }
        }
    }
}
