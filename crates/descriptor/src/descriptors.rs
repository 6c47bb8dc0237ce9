//! Descriptor value tree
//!
//! Plain copies of the standard descriptors a device reports:
//! device -> configuration -> interface -> alternate setting -> endpoint.
//! Native backends translate their own descriptor objects into these so the
//! discovery engine can walk them without touching the native layer.

use crate::types::{
    Class, EndpointDirection, IsoSyncType, Milliamperes, Protocol, REMOTE_WAKEUP_MASK,
    SELF_POWERED_MASK, TransferType, UsageType, ENDPOINT_NUMBER_MASK,
};
use serde::{Deserialize, Serialize};

/// Standard device descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// bcdUSB
    pub usb_version: u16,
    pub class: Class,
    pub sub_class: Class,
    pub protocol: Protocol,
    pub max_packet_size_0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// bcdDevice
    pub device_version: u16,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// Minimal descriptor with the given identifiers, class 0 and no configurations
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            usb_version: 0x0200,
            class: Class::PER_INTERFACE,
            sub_class: Class(0),
            protocol: Protocol(0),
            max_packet_size_0: 64,
            vendor_id,
            product_id,
            device_version: 0x0100,
            num_configurations: 0,
        }
    }
}

/// Configuration descriptor together with its interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDescriptor {
    /// bConfigurationValue
    pub number: u8,
    /// bmAttributes
    pub attributes: u8,
    pub max_power: Milliamperes,
    pub interfaces: Vec<Interface>,
}

impl ConfigDescriptor {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            attributes: 0x80,
            max_power: Milliamperes(100),
            interfaces: Vec::new(),
        }
    }

    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn self_powered(&self) -> bool {
        self.attributes & SELF_POWERED_MASK != 0
    }

    pub fn remote_wakeup(&self) -> bool {
        self.attributes & REMOTE_WAKEUP_MASK != 0
    }
}

/// An interface and every alternate setting it offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub number: u8,
    pub alt_settings: Vec<InterfaceDescriptor>,
}

impl Interface {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            alt_settings: Vec::new(),
        }
    }

    pub fn with_alt_setting(mut self, alt: InterfaceDescriptor) -> Self {
        self.alt_settings.push(alt);
        self
    }
}

/// Interface descriptor for one alternate setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub class: Class,
    pub sub_class: Class,
    pub protocol: Protocol,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(interface_number: u8, alternate_setting: u8, class: Class) -> Self {
        Self {
            interface_number,
            alternate_setting,
            class,
            sub_class: Class(0),
            protocol: Protocol(0),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoints.push(endpoint);
        self
    }
}

/// Endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// bEndpointAddress, direction bit included
    pub address: u8,
    /// bmAttributes
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    pub fn new(address: u8, attributes: u8) -> Self {
        Self {
            address,
            attributes,
            max_packet_size: 64,
            interval: 0,
        }
    }

    pub fn number(&self) -> u8 {
        self.address & ENDPOINT_NUMBER_MASK
    }

    pub fn direction(&self) -> EndpointDirection {
        EndpointDirection::from_address(self.address)
    }

    pub fn transfer_type(&self) -> TransferType {
        TransferType::from_attributes(self.attributes)
    }

    pub fn iso_sync_type(&self) -> IsoSyncType {
        IsoSyncType::from_attributes(self.attributes)
    }

    pub fn usage_type(&self) -> UsageType {
        UsageType::from_attributes(self.attributes)
    }
}
