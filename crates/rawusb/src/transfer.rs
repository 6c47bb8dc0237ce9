//! Synchronous transfer dispatch
//!
//! Reads go to the handle's IN endpoint and writes to its OUT endpoint, as
//! bulk or interrupt transfers depending on the endpoint type resolved at
//! discovery. The handle lock is held for the whole native call, so only one
//! transfer per handle is in flight at a time.

use crate::backend::UsbBackend;
use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use descriptor::{EndpointDirection, EndpointInfo, TransferType};
use std::time::Duration;
use tracing::{trace, warn};

impl<B: UsbBackend> DeviceHandle<B> {
    /// Send `data` to the OUT endpoint, returning the number of bytes written
    ///
    /// Zero-length buffers are passed to the native layer unchanged.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let state = self.lock_state();
        let native = state.native.as_ref().ok_or(Error::Closed)?;
        let endpoint = self.info.writer;
        let timeout = state.write_timeout;
        let backend = &self.shared.backend;

        let result = match endpoint.transfer_type {
            TransferType::Interrupt => {
                backend.write_interrupt(native, endpoint.address, data, native_timeout(timeout))
            }
            TransferType::Bulk => {
                backend.write_bulk(native, endpoint.address, data, native_timeout(timeout))
            }
            other => {
                return Err(Error::UnsupportedTransfer {
                    direction: EndpointDirection::Out,
                    transfer_type: other,
                });
            }
        };

        complete(endpoint, timeout, result)
    }

    /// Fill `buf` from the IN endpoint, returning the number of bytes read
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let state = self.lock_state();
        let native = state.native.as_ref().ok_or(Error::Closed)?;
        let endpoint = self.info.reader;
        let timeout = state.read_timeout;
        let backend = &self.shared.backend;

        let result = match endpoint.transfer_type {
            TransferType::Interrupt => {
                backend.read_interrupt(native, endpoint.address, buf, native_timeout(timeout))
            }
            TransferType::Bulk => {
                backend.read_bulk(native, endpoint.address, buf, native_timeout(timeout))
            }
            other => {
                return Err(Error::UnsupportedTransfer {
                    direction: EndpointDirection::In,
                    transfer_type: other,
                });
            }
        };

        complete(endpoint, timeout, result)
    }
}

/// Longest timeout libusb can represent, in milliseconds
const MAX_NATIVE_TIMEOUT_MS: u128 = u32::MAX as u128;

/// Convert a handle timeout to the whole milliseconds libusb takes
///
/// libusb treats zero as "wait forever", so a bounded timeout is rounded up
/// to at least one millisecond and clamped to what fits in 32 bits.
fn native_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        None => Duration::ZERO,
        Some(timeout) => {
            let ms = timeout
                .as_micros()
                .div_ceil(1000)
                .clamp(1, MAX_NATIVE_TIMEOUT_MS);
            Duration::from_millis(ms as u64)
        }
    }
}

fn complete(
    endpoint: EndpointInfo,
    timeout: Option<Duration>,
    result: std::result::Result<usize, rusb::Error>,
) -> Result<usize> {
    match result {
        Ok(transferred) => {
            trace!(
                "{} transfer on {:#04x}: {} bytes",
                endpoint.transfer_type, endpoint.address, transferred
            );
            Ok(transferred)
        }
        Err(rusb::Error::Timeout) => Err(Error::Timeout {
            endpoint: endpoint.address,
            timeout: native_timeout(timeout),
        }),
        Err(source) => {
            warn!(
                "{} transfer on {:#04x} failed: {}",
                endpoint.transfer_type, endpoint.address, source
            );
            Err(Error::Transfer {
                endpoint: endpoint.address,
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::discovery::DeviceFilter;
    use crate::mock::{MockBackend, MockDeviceSpec};

    fn open_raw() -> (Context<MockBackend>, DeviceHandle<MockBackend>) {
        let backend = MockBackend::new();
        backend.add_device(MockDeviceSpec::raw(1, 4, 2, 0x1209, 0x0001));
        let context = Context::new(backend);

        let found = context.enumerate(DeviceFilter::any()).unwrap();
        let handle = context.open(&found[0].info).unwrap();
        (context, handle)
    }

    #[test]
    fn test_unsupported_transfer_type_skips_native_call() {
        let (context, mut handle) = open_raw();
        handle.info.writer.transfer_type = TransferType::Isochronous;
        handle.info.reader.transfer_type = TransferType::Control;

        let err = handle.write(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedTransfer {
                direction: EndpointDirection::Out,
                transfer_type: TransferType::Isochronous,
            }
        ));

        let mut buf = [0u8; 8];
        let err = handle.read(&mut buf).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransfer { .. }));

        assert!(context.backend().transfers().is_empty());
    }

    #[test]
    fn test_transfer_on_closed_handle() {
        let (context, handle) = open_raw();
        handle.close().unwrap();

        assert!(matches!(handle.write(&[0]), Err(Error::Closed)));
        assert!(matches!(handle.read(&mut [0u8; 4]), Err(Error::Closed)));
        assert!(context.backend().transfers().is_empty());
    }

    #[test]
    fn test_native_timeout_zero_means_forever() {
        assert_eq!(native_timeout(None), Duration::ZERO);
        assert_eq!(
            native_timeout(Some(Duration::from_millis(5))),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_native_timeout_never_rounds_to_forever() {
        assert_eq!(
            native_timeout(Some(Duration::from_micros(500))),
            Duration::from_millis(1)
        );
        assert_eq!(
            native_timeout(Some(Duration::from_nanos(1))),
            Duration::from_millis(1)
        );
        assert_eq!(native_timeout(Some(Duration::ZERO)), Duration::from_millis(1));
        assert_eq!(
            native_timeout(Some(Duration::from_micros(1500))),
            Duration::from_millis(2)
        );
    }

    #[test]
    fn test_native_timeout_clamped_to_u32_millis() {
        let max = Duration::from_millis(u64::from(u32::MAX));
        assert_eq!(native_timeout(Some(max)), max);
        assert_eq!(native_timeout(Some(Duration::from_secs(u64::MAX))), max);
    }

    #[test]
    fn test_sub_millisecond_timeout_reaches_backend_bounded() {
        let (context, handle) = open_raw();
        handle.set_write_timeout(Some(Duration::from_micros(500)));
        handle.write(&[1]).unwrap();

        let log = context.backend().transfers();
        assert_eq!(log[0].timeout, Duration::from_millis(1));
        assert_ne!(log[0].timeout.as_millis(), 0);
    }
}
