//! viewport-stream - live capture-to-WebSocket video streaming
//!
//! Frames pulled from a capture host are converted, encoded and pushed to
//! every subscribed WebSocket client, each with its own encoder session
//! and options.

pub mod capture;
pub mod config;
pub mod error;
pub mod state;
pub mod stream;
pub mod utils;
pub mod video;
pub mod web;

#[cfg(test)]
mod test_support;

pub use error::{AppError, Result};
