//! Native USB access layer
//!
//! The discovery engine and handle lifecycle only talk to hardware through
//! [`UsbBackend`]. [`crate::LibusbBackend`] drives libusb via rusb; the
//! [`crate::mock`] backend serves in-memory device trees for tests.
//!
//! Failures are reported as [`rusb::Error`] so that "not supported",
//! "not found" and "timeout" can be told apart regardless of backend.

use descriptor::{ConfigDescriptor, DeviceDescriptor, Speed};
use std::time::Duration;

/// Stable identifier of a native device while it stays plugged in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub bus_number: u8,
    pub address: u8,
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}:{:03}", self.bus_number, self.address)
    }
}

/// Capability interface to the platform USB library
///
/// `Device` values are reference counted by the native layer: cloning one
/// retains the native device object and dropping it releases it.
pub trait UsbBackend: Send + Sync + 'static {
    type Device: Clone + Send + Sync + 'static;
    type Handle: Send + 'static;

    /// Create the native context. Called at most once until it succeeds.
    fn init(&self) -> Result<(), rusb::Error>;

    /// Destroy the native context. Only called once every handle is closed.
    fn teardown(&self);

    /// List every attached device
    fn devices(&self) -> Result<Vec<Self::Device>, rusb::Error>;

    fn device_key(&self, device: &Self::Device) -> DeviceKey;

    /// Whether both values refer to the same native device object.
    /// A replugged device may reuse the key of the one it replaced.
    fn same_device(&self, a: &Self::Device, b: &Self::Device) -> bool;

    fn port_number(&self, device: &Self::Device) -> u8;

    fn speed(&self, device: &Self::Device) -> Speed;

    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor, rusb::Error>;

    fn config_descriptor(
        &self,
        device: &Self::Device,
        index: u8,
    ) -> Result<ConfigDescriptor, rusb::Error>;

    fn open(&self, device: &Self::Device) -> Result<Self::Handle, rusb::Error>;

    fn close(&self, handle: Self::Handle);

    fn set_auto_detach_kernel_driver(
        &self,
        handle: &mut Self::Handle,
        enable: bool,
    ) -> Result<(), rusb::Error>;

    fn detach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8)
    -> Result<(), rusb::Error>;

    fn claim_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<(), rusb::Error>;

    fn release_interface(&self, handle: &mut Self::Handle, interface: u8)
    -> Result<(), rusb::Error>;

    // Synchronous transfers. A zero timeout waits forever.

    fn read_bulk(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    fn write_bulk(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    fn read_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    fn write_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;
}
