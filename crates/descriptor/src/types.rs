//! USB protocol vocabulary
//!
//! Classification types shared by every other part of the stack. Each value
//! renders to a short canonical name; codes without a known name render as
//! their decimal value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Endpoint address bit selecting the direction (set = IN)
pub const ENDPOINT_DIRECTION_MASK: u8 = 0x80;
/// Endpoint address bits holding the endpoint number
pub const ENDPOINT_NUMBER_MASK: u8 = 0x0f;
/// Endpoint attribute bits holding the transfer type
pub const TRANSFER_TYPE_MASK: u8 = 0x03;
/// Endpoint attribute bits holding the isochronous synchronisation type
pub const ISO_SYNC_TYPE_MASK: u8 = 0x0c;
/// Endpoint attribute bits holding the usage type
pub const USAGE_TYPE_MASK: u8 = 0x30;

/// Configuration attribute bit: device is self powered
pub const SELF_POWERED_MASK: u8 = 0x40;
/// Configuration attribute bit: device supports remote wakeup
pub const REMOTE_WAKEUP_MASK: u8 = 0x20;

// Control request type bit fields (bmRequestType).
// "Standard" and "reserved" types are deliberately absent.
pub const CONTROL_IN: u8 = 0x80;
pub const CONTROL_OUT: u8 = 0x00;
pub const CONTROL_CLASS: u8 = 0x20;
pub const CONTROL_VENDOR: u8 = 0x40;
pub const CONTROL_DEVICE: u8 = 0x00;
pub const CONTROL_INTERFACE: u8 = 0x01;
pub const CONTROL_ENDPOINT: u8 = 0x02;
pub const CONTROL_OTHER: u8 = 0x03;

/// USB-IF class (or subclass) code
///
/// See <https://www.usb.org/defined-class-codes>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Class(pub u8);

impl Class {
    pub const PER_INTERFACE: Class = Class(0x00);
    pub const AUDIO: Class = Class(0x01);
    pub const COMM: Class = Class(0x02);
    pub const HID: Class = Class(0x03);
    pub const PHYSICAL: Class = Class(0x05);
    pub const IMAGE: Class = Class(0x06);
    /// Legacy name for [`Class::IMAGE`]
    pub const PTP: Class = Class::IMAGE;
    pub const PRINTER: Class = Class(0x07);
    pub const MASS_STORAGE: Class = Class(0x08);
    pub const HUB: Class = Class(0x09);
    pub const DATA: Class = Class(0x0a);
    pub const SMART_CARD: Class = Class(0x0b);
    pub const CONTENT_SECURITY: Class = Class(0x0d);
    pub const VIDEO: Class = Class(0x0e);
    pub const PERSONAL_HEALTHCARE: Class = Class(0x0f);
    pub const AUDIO_VIDEO: Class = Class(0x10);
    pub const BILLBOARD: Class = Class(0x11);
    pub const USB_TYPE_C_BRIDGE: Class = Class(0x12);
    pub const DIAGNOSTIC_DEVICE: Class = Class(0xdc);
    pub const WIRELESS: Class = Class(0xe0);
    pub const MISCELLANEOUS: Class = Class(0xef);
    pub const APPLICATION: Class = Class(0xfe);
    pub const VENDOR_SPEC: Class = Class(0xff);

    /// Canonical name, if the code is a defined class
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Class::PER_INTERFACE => "per-interface",
            Class::AUDIO => "audio",
            Class::COMM => "communications",
            Class::HID => "human interface device",
            Class::PHYSICAL => "physical",
            Class::IMAGE => "image",
            Class::PRINTER => "printer",
            Class::MASS_STORAGE => "mass storage",
            Class::HUB => "hub",
            Class::DATA => "data",
            Class::SMART_CARD => "smart card",
            Class::CONTENT_SECURITY => "content security",
            Class::VIDEO => "video",
            Class::PERSONAL_HEALTHCARE => "personal healthcare",
            Class::AUDIO_VIDEO => "audio/video",
            Class::BILLBOARD => "billboard",
            Class::USB_TYPE_C_BRIDGE => "USB type-C bridge",
            Class::DIAGNOSTIC_DEVICE => "diagnostic device",
            Class::WIRELESS => "wireless",
            Class::MISCELLANEOUS => "miscellaneous",
            Class::APPLICATION => "application-specific",
            Class::VENDOR_SPEC => "vendor-specific",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Class protocol code, qualified by the class and subclass it appears with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocol(pub u8);

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor type code (bDescriptorType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorType(pub u8);

impl DescriptorType {
    pub const DEVICE: DescriptorType = DescriptorType(0x01);
    pub const CONFIG: DescriptorType = DescriptorType(0x02);
    pub const STRING: DescriptorType = DescriptorType(0x03);
    pub const INTERFACE: DescriptorType = DescriptorType(0x04);
    pub const ENDPOINT: DescriptorType = DescriptorType(0x05);
    pub const HID: DescriptorType = DescriptorType(0x21);
    pub const REPORT: DescriptorType = DescriptorType(0x22);
    pub const PHYSICAL: DescriptorType = DescriptorType(0x23);
    pub const HUB: DescriptorType = DescriptorType(0x29);

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            DescriptorType::DEVICE => "device",
            DescriptorType::CONFIG => "configuration",
            DescriptorType::STRING => "string",
            DescriptorType::INTERFACE => "interface",
            DescriptorType::ENDPOINT => "endpoint",
            DescriptorType::HID => "HID",
            DescriptorType::REPORT => "HID report",
            DescriptorType::PHYSICAL => "physical",
            DescriptorType::HUB => "hub",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Direction of data flow on an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointDirection {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl EndpointDirection {
    /// Derive the direction from a bEndpointAddress byte (bit 7)
    pub fn from_address(address: u8) -> Self {
        if address & ENDPOINT_DIRECTION_MASK == ENDPOINT_DIRECTION_MASK {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        }
    }
}

impl fmt::Display for EndpointDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndpointDirection::In => "IN",
            EndpointDirection::Out => "OUT",
        })
    }
}

/// Endpoint transfer type (bits 0-1 of bmAttributes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & TRANSFER_TYPE_MASK {
            0x0 => TransferType::Control,
            0x1 => TransferType::Isochronous,
            0x2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }

    /// Raw two-bit code
    pub fn code(self) -> u8 {
        match self {
            TransferType::Control => 0x0,
            TransferType::Isochronous => 0x1,
            TransferType::Bulk => 0x2,
            TransferType::Interrupt => 0x3,
        }
    }

    /// Whether raw read/write dispatch can drive this transfer type
    pub fn is_raw(self) -> bool {
        matches!(self, TransferType::Bulk | TransferType::Interrupt)
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferType::Control => "control",
            TransferType::Isochronous => "isochronous",
            TransferType::Bulk => "bulk",
            TransferType::Interrupt => "interrupt",
        })
    }
}

/// Isochronous synchronisation type (bits 2-3 of bmAttributes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsoSyncType {
    None,
    Async,
    Adaptive,
    Sync,
}

impl IsoSyncType {
    pub fn from_attributes(attributes: u8) -> Self {
        match (attributes & ISO_SYNC_TYPE_MASK) >> 2 {
            0x0 => IsoSyncType::None,
            0x1 => IsoSyncType::Async,
            0x2 => IsoSyncType::Adaptive,
            _ => IsoSyncType::Sync,
        }
    }
}

impl fmt::Display for IsoSyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsoSyncType::None => "unsynchronized",
            IsoSyncType::Async => "asynchronous",
            IsoSyncType::Adaptive => "adaptive",
            IsoSyncType::Sync => "synchronous",
        })
    }
}

/// Usage type for isochronous and interrupt endpoints (bits 4-5 of bmAttributes)
///
/// USB 3.0 reuses the same bit values with different meanings for the two
/// transfer types, so the variant depends on both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageType {
    Undefined,
    IsoData,
    IsoFeedback,
    IsoImplicit,
    InterruptPeriodic,
    InterruptNotification,
}

impl UsageType {
    pub fn from_attributes(attributes: u8) -> Self {
        let bits = (attributes & USAGE_TYPE_MASK) >> 4;
        match (TransferType::from_attributes(attributes), bits) {
            (TransferType::Isochronous, 0x0) => UsageType::IsoData,
            (TransferType::Isochronous, 0x1) => UsageType::IsoFeedback,
            (TransferType::Isochronous, 0x2) => UsageType::IsoImplicit,
            (TransferType::Interrupt, 0x0) => UsageType::InterruptPeriodic,
            (TransferType::Interrupt, 0x1) => UsageType::InterruptNotification,
            _ => UsageType::Undefined,
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UsageType::Undefined => "undefined usage",
            UsageType::IsoData => "data",
            UsageType::IsoFeedback => "feedback",
            UsageType::IsoImplicit => "implicit data",
            UsageType::InterruptPeriodic => "periodic",
            UsageType::InterruptNotification => "notification",
        })
    }
}

/// Negotiated device speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Speed(pub u8);

impl Speed {
    pub const UNKNOWN: Speed = Speed(0);
    pub const LOW: Speed = Speed(1);
    pub const FULL: Speed = Speed(2);
    pub const HIGH: Speed = Speed(3);
    pub const SUPER: Speed = Speed(4);

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Speed::UNKNOWN => "unknown",
            Speed::LOW => "low",
            Speed::FULL => "full",
            Speed::HIGH => "high",
            Speed::SUPER => "super",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Unit of current consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milliamperes(pub u32);

impl fmt::Display for Milliamperes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mA", self.0)
    }
}
