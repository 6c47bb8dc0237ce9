//! Error types for discovery, handle lifecycle and transfers

use descriptor::{EndpointDirection, TransferType};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The native USB context could not be created
    #[error("Failed to initialize USB context: {0}")]
    Init(#[source] rusb::Error),

    /// Listing devices or reading a descriptor failed mid-scan
    #[error("Device discovery failed ({context}): {source}")]
    Discovery {
        context: String,
        #[source]
        source: rusb::Error,
    },

    /// A rescan could not find the device an open was asked for
    #[error("Device {vendor_id:04x}:{product_id:04x} port {port} interface {interface} not found")]
    NotFound {
        vendor_id: u16,
        product_id: u16,
        port: u8,
        interface: u8,
    },

    #[error("Failed to open device: {0}")]
    Open(#[source] rusb::Error),

    #[error("Failed to enable kernel driver auto-detach: {0}")]
    AutoDetach(#[source] rusb::Error),

    #[error("Failed to detach kernel driver from interface {interface}: {source}")]
    Detach {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Failed to claim interface {interface}: {source}")]
    Claim {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Failed to release interface {interface}: {source}")]
    Release {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Unsupported {direction} transfer type: {transfer_type}")]
    UnsupportedTransfer {
        direction: EndpointDirection,
        transfer_type: TransferType,
    },

    /// The transfer did not complete within the handle's timeout
    #[error("Transfer on endpoint {endpoint:#04x} timed out after {timeout:?}")]
    Timeout { endpoint: u8, timeout: Duration },

    #[error("Transfer on endpoint {endpoint:#04x} failed: {source}")]
    Transfer {
        endpoint: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Device handle is closed")]
    Closed,

    #[error("USB context is shutting down")]
    ShuttingDown,

    #[error("{0} device handle(s) still open")]
    HandlesOutstanding(usize),
}

impl Error {
    /// Whether the operation failed only because its deadline expired
    ///
    /// Timeouts leave the handle usable, so callers may simply retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub(crate) fn discovery(context: impl Into<String>, source: rusb::Error) -> Self {
        Error::Discovery {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound {
            vendor_id: 0x1209,
            product_id: 0x0001,
            port: 4,
            interface: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("1209:0001"));
        assert!(msg.contains("port 4"));
    }

    #[test]
    fn test_timeout_is_distinct() {
        let timeout = Error::Timeout {
            endpoint: 0x81,
            timeout: Duration::from_millis(1),
        };
        let transfer = Error::Transfer {
            endpoint: 0x81,
            source: rusb::Error::Pipe,
        };
        assert!(timeout.is_timeout());
        assert!(!transfer.is_timeout());
        assert!(timeout.to_string().contains("0x81"));
    }
}
