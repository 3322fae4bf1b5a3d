//! Client Module
//!
//! The client's single outbound session and the user-facing seam it drives.
//!
//! ## Phases
//! - Connecting: resolve once, connect with bounded retries and fixed backoff
//! - Authenticating: send credential requests until the server answers OK
//! - Active: send user requests one at a time until the exit command

mod console;
mod session;

pub use console::Console;
pub use session::{ClientOutcome, ClientSession};

use crate::protocol::{Request, Response, ResponseCode, User};

/// Everything the client needs from the person (or script) driving it
pub trait Interaction {
    /// Build the next credential request. `None` means input is exhausted.
    fn credentials(&mut self) -> Option<Request>;

    /// Build the next request. `Request::empty()` is skipped without a round trip;
    /// `None` means input is exhausted and is treated as the exit command.
    fn next_request(&mut self, last: Option<ResponseCode>, user: &User) -> Option<Request>;

    /// Show a server response
    fn render(&mut self, response: &Response);

    /// Show a one-line status message from the client itself
    fn notify(&mut self, message: &str);
}
