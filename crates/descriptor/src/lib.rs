//! USB descriptor model for rawusb
//!
//! Value types for the descriptors a device reports and the protocol
//! vocabulary used to classify them. Nothing here talks to hardware; the
//! discovery engine and the native backends share these definitions.
//!
//! # Example
//!
//! ```
//! use descriptor::{EndpointDescriptor, EndpointDirection, TransferType};
//!
//! let ep = EndpointDescriptor::new(0x81, 0x02);
//! assert_eq!(ep.direction(), EndpointDirection::In);
//! assert_eq!(ep.transfer_type(), TransferType::Bulk);
//! assert_eq!(ep.transfer_type().to_string(), "bulk");
//! ```

pub mod descriptors;
pub mod info;
pub mod types;

pub use descriptors::{
    ConfigDescriptor, DeviceDescriptor, EndpointDescriptor, Interface, InterfaceDescriptor,
};
pub use info::{DeviceInfo, EndpointInfo};
pub use types::{
    Class, DescriptorType, EndpointDirection, IsoSyncType, Milliamperes, Protocol, Speed,
    TransferType, UsageType,
};
