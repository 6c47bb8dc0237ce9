//! Shared utilities for the rawusb front-ends
//!
//! Logging setup, a small error type and hex helpers for USB ids and
//! transfer payloads.

pub mod error;
pub mod hex;
pub mod logging;

pub use error::{Error, Result};
pub use hex::{format_hex, parse_hex_bytes, parse_hex_id};
pub use logging::setup_logging;
