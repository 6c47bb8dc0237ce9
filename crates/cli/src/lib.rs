//! Command line front-end for rawusb
//!
//! The `rawusb` binary is a thin wrapper around [`commands`]; configuration
//! lives in [`config`].

pub mod commands;
pub mod config;

pub use commands::{TransferRequest, list, transfer};
pub use config::CliConfig;
