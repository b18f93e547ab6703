//! dosedock-relay library crate.
//!
//! Turns medication reminder events into SMS and spoken notifications.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod tts;

pub use error::{Error, Result};
