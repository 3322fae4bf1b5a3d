//! Client Tests
//!
//! Reconnection budget, authentication phase, and the active request loop.

#[path = "../common/mod.rs"]
mod common;
