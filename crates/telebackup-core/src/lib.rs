//! Core logic for telebackup: copy messages from source channels into a
//! destination channel, skipping anything already copied.
//!
//! This crate is intentionally client-agnostic. The messaging platform lives
//! behind the `ChannelClient` port implemented in adapter crates.

pub mod config;
pub mod copier;
pub mod domain;
pub mod errors;
pub mod joiner;
pub mod logging;
pub mod messaging;
pub mod retry;
pub mod shutdown;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
