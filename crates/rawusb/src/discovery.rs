//! Device discovery
//!
//! Walks the native device list and the configuration -> interface ->
//! alternate setting -> endpoint tree of every device that passes the
//! vendor/product filter. An alternate setting matches when it offers an IN
//! and an OUT endpoint of the same raw transfer type (bulk or interrupt).
//!
//! HID devices and HID interfaces are skipped: the operating system's HID
//! stack owns those.

use crate::arena::{DeviceArena, Retained};
use crate::backend::UsbBackend;
use crate::error::{Error, Result};
use descriptor::{
    Class, DeviceInfo, EndpointDescriptor, EndpointDirection, EndpointInfo, TransferType,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Vendor/product filter for a scan
///
/// `None` and `Some(0)` both match any value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    /// Match every device
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new(vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    pub fn vendor(vendor_id: u16) -> Self {
        Self::new(Some(vendor_id), None)
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        Self::field_matches(self.vendor_id, vendor_id)
            && Self::field_matches(self.product_id, product_id)
    }

    fn field_matches(filter: Option<u16>, value: u16) -> bool {
        match filter {
            None | Some(0) => true,
            Some(wanted) => wanted == value,
        }
    }
}

/// A matched alternate setting and the device reference that keeps it valid
///
/// Holding a `Discovered` keeps one reference on the native device. Drop it
/// (or call [`Discovered::release`]) once it is no longer needed.
#[derive(Debug)]
pub struct Discovered<D: Clone> {
    pub info: DeviceInfo,
    retained: Retained<D>,
}

impl<D: Clone> Discovered<D> {
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn retained(&self) -> &Retained<D> {
        &self.retained
    }

    pub fn release(self) {
        self.retained.release();
    }

    pub(crate) fn into_parts(self) -> (DeviceInfo, Retained<D>) {
        (self.info, self.retained)
    }
}

/// Result of a scan: everything matched so far, plus the error that stopped it
#[derive(Debug)]
pub struct ScanOutcome<D: Clone> {
    pub devices: Vec<Discovered<D>>,
    pub error: Option<Error>,
}

impl<D: Clone> ScanOutcome<D> {
    pub(crate) fn failed(error: Error) -> Self {
        Self {
            devices: Vec::new(),
            error: Some(error),
        }
    }

    /// Discard partial results if the scan failed
    pub fn into_result(self) -> Result<Vec<Discovered<D>>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.devices),
        }
    }
}

/// Run a full scan against `backend`, retaining each match in `arena`
pub(crate) fn scan_devices<B: UsbBackend>(
    backend: &B,
    arena: &Arc<DeviceArena<B::Device>>,
    filter: DeviceFilter,
) -> ScanOutcome<B::Device> {
    let mut devices = Vec::new();
    let error = collect_matches(backend, arena, filter, &mut devices).err();

    debug!(
        "Scan matched {} interface(s){}",
        devices.len(),
        if error.is_some() { " before failing" } else { "" }
    );

    ScanOutcome { devices, error }
}

fn collect_matches<B: UsbBackend>(
    backend: &B,
    arena: &Arc<DeviceArena<B::Device>>,
    filter: DeviceFilter,
    found: &mut Vec<Discovered<B::Device>>,
) -> Result<()> {
    // The list owns one native reference per device; anything not retained
    // below goes away when it is dropped on return.
    let list = backend
        .devices()
        .map_err(|e| Error::discovery("listing devices", e))?;

    for (index, device) in list.iter().enumerate() {
        let desc = backend
            .device_descriptor(device)
            .map_err(|e| Error::discovery(format!("device {} descriptor", index), e))?;

        if !filter.matches(desc.vendor_id, desc.product_id) {
            continue;
        }
        if desc.class == Class::HID {
            trace!(
                "Skipping HID device {:04x}:{:04x}",
                desc.vendor_id, desc.product_id
            );
            continue;
        }

        let key = backend.device_key(device);
        let port = backend.port_number(device);
        let speed = backend.speed(device);

        for config_index in 0..desc.num_configurations {
            let config = backend
                .config_descriptor(device, config_index)
                .map_err(|e| {
                    Error::discovery(format!("device {} config {}", index, config_index), e)
                })?;

            for interface in &config.interfaces {
                for alt in &interface.alt_settings {
                    if alt.class == Class::HID {
                        continue;
                    }
                    let Some((reader, writer)) = select_endpoints(&alt.endpoints) else {
                        continue;
                    };

                    let info = DeviceInfo {
                        path: DeviceInfo::path_for(desc.vendor_id, desc.product_id, port),
                        vendor_id: desc.vendor_id,
                        product_id: desc.product_id,
                        class: desc.class,
                        sub_class: desc.sub_class,
                        protocol: desc.protocol,
                        interface: alt.interface_number,
                        alternate_setting: alt.alternate_setting,
                        interface_class: alt.class,
                        interface_sub_class: alt.sub_class,
                        interface_protocol: alt.protocol,
                        reader,
                        writer,
                        bus_number: key.bus_number,
                        address: key.address,
                        port,
                        speed,
                    };
                    debug!("Matched {}", info);

                    found.push(Discovered {
                        info,
                        retained: arena.retain(key, device, |a, b| backend.same_device(a, b)),
                    });
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
struct Pair {
    reader: Option<EndpointInfo>,
    writer: Option<EndpointInfo>,
}

impl Pair {
    fn complete(self) -> Option<(EndpointInfo, EndpointInfo)> {
        Some((self.reader?, self.writer?))
    }
}

/// Pick the IN/OUT endpoint pair for one alternate setting
///
/// Control and isochronous endpoints are ignored. When several endpoints
/// share a direction the last one scanned wins. If the last IN and last OUT
/// endpoints differ in transfer type, the complete bulk pair is used, then
/// the complete interrupt pair.
pub fn select_endpoints(endpoints: &[EndpointDescriptor]) -> Option<(EndpointInfo, EndpointInfo)> {
    let mut bulk = Pair::default();
    let mut interrupt = Pair::default();
    let mut last_in: Option<EndpointInfo> = None;
    let mut last_out: Option<EndpointInfo> = None;

    for ep in endpoints {
        let transfer_type = ep.transfer_type();
        let pair = match transfer_type {
            TransferType::Bulk => &mut bulk,
            TransferType::Interrupt => &mut interrupt,
            _ => continue,
        };

        let endpoint = EndpointInfo {
            address: ep.address,
            transfer_type,
        };
        match ep.direction() {
            EndpointDirection::In => {
                pair.reader = Some(endpoint);
                last_in = Some(endpoint);
            }
            EndpointDirection::Out => {
                pair.writer = Some(endpoint);
                last_out = Some(endpoint);
            }
        }
    }

    if let (Some(reader), Some(writer)) = (last_in, last_out)
        && reader.transfer_type == writer.transfer_type
    {
        return Some((reader, writer));
    }

    bulk.complete().or_else(|| interrupt.complete())
}
