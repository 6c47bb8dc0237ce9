//! Raw USB interface access
//!
//! Discovers vendor-specific USB interfaces that expose a bulk or interrupt
//! IN/OUT endpoint pair, claims them and moves bytes over them with
//! blocking transfers.
//!
//! - [`Context`] owns the native layer. [`global`] returns the process-wide
//!   libusb context; tests build their own over [`mock::MockBackend`].
//! - [`Context::enumerate`] returns one [`Discovered`] record per matching
//!   alternate setting. Each holds a device reference until dropped.
//! - [`Context::open`] finds the device again by port and interface and
//!   returns a [`DeviceHandle`] with the interface claimed.
//! - [`DeviceHandle::read`] and [`DeviceHandle::write`] perform one transfer
//!   each, honouring the handle's timeouts.
//!
//! # Example
//!
//! ```no_run
//! use rawusb::DeviceFilter;
//! use std::time::Duration;
//!
//! # fn main() -> rawusb::Result<()> {
//! let context = rawusb::global();
//! let devices = context.enumerate(DeviceFilter::vendor(0x1209))?;
//!
//! if let Some(device) = devices.first() {
//!     let handle = context.open(&device.info)?;
//!     handle.set_read_timeout(Some(Duration::from_millis(500)));
//!
//!     handle.write(b"ping")?;
//!     let mut buf = [0u8; 64];
//!     let n = handle.read(&mut buf)?;
//!     println!("{} bytes back", n);
//! }
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod backend;
pub mod context;
pub mod discovery;
pub mod error;
pub mod handle;
pub mod libusb;
pub mod mock;
mod transfer;

pub use arena::{DeviceArena, Retained};
pub use backend::{DeviceKey, UsbBackend};
pub use context::{Context, global};
pub use discovery::{DeviceFilter, Discovered, ScanOutcome, select_endpoints};
pub use error::{Error, Result};
pub use handle::DeviceHandle;
pub use libusb::LibusbBackend;

pub use descriptor::{DeviceInfo, EndpointInfo, TransferType};
