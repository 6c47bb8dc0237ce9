//! Matched raw interface records

use crate::types::{Class, Protocol, Speed, TransferType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An endpoint chosen for raw reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// bEndpointAddress, direction bit included
    pub address: u8,
    pub transfer_type: TransferType,
}

/// A device alternate setting exposing one usable IN and one usable OUT
/// endpoint of the same transfer type
///
/// Produced by discovery. Both endpoints are always present; an alternate
/// setting offering only one direction never yields a `DeviceInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// `vvvv:pppp:NN` built from vendor, product and port number
    ///
    /// Human readable, not unique across re-enumeration if the topology changes.
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,

    pub class: Class,
    pub sub_class: Class,
    pub protocol: Protocol,

    /// bInterfaceNumber of the matched interface
    pub interface: u8,
    pub alternate_setting: u8,
    pub interface_class: Class,
    pub interface_sub_class: Class,
    pub interface_protocol: Protocol,

    /// Endpoint used by reads
    pub reader: EndpointInfo,
    /// Endpoint used by writes
    pub writer: EndpointInfo,

    pub bus_number: u8,
    pub address: u8,
    /// Physical port number, used to find the device again on open
    pub port: u8,
    pub speed: Speed,
}

impl DeviceInfo {
    /// Build the display path for a device
    pub fn path_for(vendor_id: u16, product_id: u16, port: u8) -> String {
        format!("{:04x}:{:04x}:{:02}", vendor_id, product_id, port)
    }

    /// Whether `other` names the same physical port and interface
    ///
    /// This is the only identity that survives a rescan.
    pub fn same_interface(&self, other: &DeviceInfo) -> bool {
        self.port == other.port && self.interface == other.interface
    }

    /// Short "vid:pid class (subclass) protocol" line for display
    pub fn describe(&self) -> String {
        let (class, sub_class, protocol) = if self.class == Class::PER_INTERFACE {
            (
                self.interface_class,
                self.interface_sub_class,
                self.interface_protocol,
            )
        } else {
            (self.class, self.sub_class, self.protocol)
        };

        format!(
            "{:04x}:{:04x} {} ({}) {}",
            self.vendor_id, self.product_id, class, sub_class.0, protocol
        )
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bus {:03} addr {:03} if {} alt {} in {:#04x} ({}) out {:#04x} ({})",
            self.path,
            self.bus_number,
            self.address,
            self.interface,
            self.alternate_setting,
            self.reader.address,
            self.reader.transfer_type,
            self.writer.address,
            self.writer.transfer_type,
        )
    }
}
