//! libusb backend built on rusb

use crate::backend::{DeviceKey, UsbBackend};
use descriptor::{
    Class, ConfigDescriptor, DeviceDescriptor, EndpointDescriptor, Interface, InterfaceDescriptor,
    Milliamperes, Protocol, Speed,
};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// [`UsbBackend`] over a process-owned libusb context
///
/// The libusb context is created by [`UsbBackend::init`] rather than on
/// construction so that building the backend never touches the system.
#[derive(Default)]
pub struct LibusbBackend {
    context: Mutex<Option<Context>>,
}

impl LibusbBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self) -> Result<Context, rusb::Error> {
        self.context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(rusb::Error::NotFound)
    }
}

impl UsbBackend for LibusbBackend {
    type Device = Device<Context>;
    type Handle = DeviceHandle<Context>;

    fn init(&self) -> Result<(), rusb::Error> {
        let mut context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        if context.is_none() {
            *context = Some(Context::new()?);
            debug!("Created libusb context");
        }
        Ok(())
    }

    fn teardown(&self) {
        if self
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            debug!("Released libusb context");
        }
    }

    fn devices(&self) -> Result<Vec<Self::Device>, rusb::Error> {
        let list = self.context()?.devices()?;
        Ok(list.iter().collect())
    }

    fn device_key(&self, device: &Self::Device) -> DeviceKey {
        DeviceKey {
            bus_number: device.bus_number(),
            address: device.address(),
        }
    }

    fn same_device(&self, a: &Self::Device, b: &Self::Device) -> bool {
        a.as_raw() == b.as_raw()
    }

    fn port_number(&self, device: &Self::Device) -> u8 {
        device.port_number()
    }

    fn speed(&self, device: &Self::Device) -> Speed {
        map_device_speed(device.speed())
    }

    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor, rusb::Error> {
        let desc = device.device_descriptor()?;

        Ok(DeviceDescriptor {
            usb_version: version_to_bcd(desc.usb_version()),
            class: Class(desc.class_code()),
            sub_class: Class(desc.sub_class_code()),
            protocol: Protocol(desc.protocol_code()),
            max_packet_size_0: desc.max_packet_size(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            device_version: version_to_bcd(desc.device_version()),
            num_configurations: desc.num_configurations(),
        })
    }

    fn config_descriptor(
        &self,
        device: &Self::Device,
        index: u8,
    ) -> Result<ConfigDescriptor, rusb::Error> {
        let config = device.config_descriptor(index)?;

        let mut attributes = 0x80;
        if config.self_powered() {
            attributes |= descriptor::types::SELF_POWERED_MASK;
        }
        if config.remote_wakeup() {
            attributes |= descriptor::types::REMOTE_WAKEUP_MASK;
        }

        let interfaces = config
            .interfaces()
            .map(|interface| Interface {
                number: interface.number(),
                alt_settings: interface
                    .descriptors()
                    .map(|alt| InterfaceDescriptor {
                        interface_number: alt.interface_number(),
                        alternate_setting: alt.setting_number(),
                        class: Class(alt.class_code()),
                        sub_class: Class(alt.sub_class_code()),
                        protocol: Protocol(alt.protocol_code()),
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| EndpointDescriptor {
                                address: ep.address(),
                                attributes: endpoint_attributes(&ep),
                                max_packet_size: ep.max_packet_size(),
                                interval: ep.interval(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(ConfigDescriptor {
            number: config.number(),
            attributes,
            max_power: Milliamperes(u32::from(config.max_power())),
            interfaces,
        })
    }

    fn open(&self, device: &Self::Device) -> Result<Self::Handle, rusb::Error> {
        device.open()
    }

    fn close(&self, handle: Self::Handle) {
        drop(handle);
    }

    fn set_auto_detach_kernel_driver(
        &self,
        handle: &mut Self::Handle,
        enable: bool,
    ) -> Result<(), rusb::Error> {
        handle.set_auto_detach_kernel_driver(enable)
    }

    fn detach_kernel_driver(
        &self,
        handle: &mut Self::Handle,
        interface: u8,
    ) -> Result<(), rusb::Error> {
        handle.detach_kernel_driver(interface)
    }

    fn claim_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<(), rusb::Error> {
        handle.claim_interface(interface)
    }

    fn release_interface(
        &self,
        handle: &mut Self::Handle,
        interface: u8,
    ) -> Result<(), rusb::Error> {
        handle.release_interface(interface)
    }

    fn read_bulk(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        handle.read_bulk(endpoint, buf, timeout)
    }

    fn write_bulk(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        handle.write_bulk(endpoint, buf, timeout)
    }

    fn read_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        handle.read_interrupt(endpoint, buf, timeout)
    }

    fn write_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        handle.write_interrupt(endpoint, buf, timeout)
    }
}

/// Map rusb device speed to the descriptor model's speed codes
fn map_device_speed(speed: rusb::Speed) -> Speed {
    match speed {
        rusb::Speed::Low => Speed::LOW,
        rusb::Speed::Full => Speed::FULL,
        rusb::Speed::High => Speed::HIGH,
        rusb::Speed::Super | rusb::Speed::SuperPlus => Speed::SUPER,
        _ => Speed::UNKNOWN,
    }
}

fn version_to_bcd(version: rusb::Version) -> u16 {
    (u16::from(version.major()) << 8)
        | (u16::from(version.minor() & 0x0f) << 4)
        | u16::from(version.sub_minor() & 0x0f)
}

/// Rebuild bmAttributes from rusb's decoded endpoint fields
fn endpoint_attributes(ep: &rusb::EndpointDescriptor<'_>) -> u8 {
    let transfer = match ep.transfer_type() {
        rusb::TransferType::Control => 0x0,
        rusb::TransferType::Isochronous => 0x1,
        rusb::TransferType::Bulk => 0x2,
        rusb::TransferType::Interrupt => 0x3,
    };
    let sync = match ep.sync_type() {
        rusb::SyncType::NoSync => 0x0,
        rusb::SyncType::Asynchronous => 0x1,
        rusb::SyncType::Adaptive => 0x2,
        rusb::SyncType::Synchronous => 0x3,
    };
    let usage = match ep.usage_type() {
        rusb::UsageType::Data => 0x0,
        rusb::UsageType::Feedback => 0x1,
        rusb::UsageType::FeedbackData => 0x2,
        rusb::UsageType::Reserved => 0x3,
    };
    transfer | (sync << 2) | (usage << 4)
}
