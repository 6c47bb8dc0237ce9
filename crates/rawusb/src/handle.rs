//! Device handle lifecycle
//!
//! Opening turns a [`DeviceInfo`] from an earlier scan into a claimed
//! interface:
//! 1. rescan with the same vendor/product filter and pick the candidate on
//!    the same port and interface, releasing every other candidate at once
//! 2. open a native handle on it
//! 3. enable kernel driver auto-detach
//! 4. detach any kernel driver bound to the interface
//! 5. claim the interface
//!
//! Every failure releases what was acquired before returning.

use crate::arena::Retained;
use crate::backend::UsbBackend;
use crate::context::Shared;
use crate::discovery::DeviceFilter;
use crate::error::{Error, Result};
use descriptor::DeviceInfo;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) struct HandleState<B: UsbBackend> {
    pub(crate) native: Option<B::Handle>,
    pub(crate) retained: Option<Retained<B::Device>>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
}

/// An open, claimed raw USB interface
///
/// Reads, writes, timeout changes and close are serialised by a lock owned
/// by this handle; separate handles never wait on each other. Dropping the
/// handle closes it.
pub struct DeviceHandle<B: UsbBackend> {
    pub(crate) info: DeviceInfo,
    pub(crate) shared: Arc<Shared<B>>,
    id: u64,
    pub(crate) state: Mutex<HandleState<B>>,
}

pub(crate) fn open<B: UsbBackend>(
    shared: &Arc<Shared<B>>,
    info: &DeviceInfo,
) -> Result<DeviceHandle<B>> {
    let guard = shared.lock_initialized()?;

    let filter = DeviceFilter::new(Some(info.vendor_id), Some(info.product_id));
    // A failed scan drops its partial results, releasing their references
    let candidates = shared.scan_locked(&guard, filter).into_result()?;

    let mut selected = None;
    for candidate in candidates {
        if selected.is_none() && candidate.info.same_interface(info) {
            selected = Some(candidate);
        } else {
            candidate.release();
        }
    }

    let (resolved, retained) = selected
        .ok_or(Error::NotFound {
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            port: info.port,
            interface: info.interface,
        })?
        .into_parts();

    let backend = &shared.backend;
    let mut native = backend.open(retained.device()).map_err(Error::Open)?;
    debug!("Opened native handle for {}", resolved.path);

    if let Err(e) = prepare_interface(backend, &mut native, resolved.interface) {
        backend.close(native);
        return Err(e);
    }

    let id = match shared.register() {
        Ok(id) => id,
        Err(e) => {
            if let Err(release) = backend.release_interface(&mut native, resolved.interface) {
                debug!("Release during aborted open failed: {}", release);
            }
            backend.close(native);
            return Err(e);
        }
    };

    info!(
        "Claimed interface {} on {} (in {:#04x}, out {:#04x})",
        resolved.interface, resolved.path, resolved.reader.address, resolved.writer.address
    );

    Ok(DeviceHandle {
        info: resolved,
        shared: Arc::clone(shared),
        id,
        state: Mutex::new(HandleState {
            native: Some(native),
            retained: Some(retained),
            read_timeout: None,
            write_timeout: None,
        }),
    })
}

/// Detach kernel drivers and claim `interface`
fn prepare_interface<B: UsbBackend>(
    backend: &B,
    native: &mut B::Handle,
    interface: u8,
) -> Result<()> {
    match backend.set_auto_detach_kernel_driver(native, true) {
        Ok(()) => {}
        Err(rusb::Error::NotSupported) => {
            debug!("Kernel driver auto-detach not supported on this platform");
        }
        Err(e) => return Err(Error::AutoDetach(e)),
    }

    match backend.detach_kernel_driver(native, interface) {
        Ok(()) => debug!("Detached kernel driver from interface {}", interface),
        // NotSupported off Linux, NotFound when no kernel driver is bound
        Err(rusb::Error::NotSupported) | Err(rusb::Error::NotFound) => {}
        Err(source) => return Err(Error::Detach { interface, source }),
    }

    backend
        .claim_interface(native, interface)
        .map_err(|source| Error::Claim { interface, source })
}

impl<B: UsbBackend> DeviceHandle<B> {
    /// The device record re-resolved when this handle was opened
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, HandleState<B>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().native.is_none()
    }

    /// Timeout for later reads; `None` blocks indefinitely
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.lock_state().read_timeout = timeout;
    }

    /// Timeout for later writes; `None` blocks indefinitely
    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        self.lock_state().write_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.lock_state().read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.lock_state().write_timeout
    }

    /// Release the interface and close the native handle
    ///
    /// Closing twice is a no-op. Cleanup always completes; a failure to
    /// release the interface is reported afterwards.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock_state();
        let Some(mut native) = state.native.take() else {
            return Ok(());
        };

        let backend = &self.shared.backend;
        let released = backend.release_interface(&mut native, self.info.interface);
        backend.close(native);
        if let Some(retained) = state.retained.take() {
            retained.release();
        }
        drop(state);

        self.shared.deregister(self.id);
        info!("Closed {} interface {}", self.info.path, self.info.interface);

        released.map_err(|source| Error::Release {
            interface: self.info.interface,
            source,
        })
    }
}

impl<B: UsbBackend> Drop for DeviceHandle<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing {} on drop: {}", self.info.path, e);
        }
    }
}

impl<B: UsbBackend> std::fmt::Debug for DeviceHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never wait on the lock; a transfer may hold it indefinitely
        let state = match self.state.try_lock() {
            Ok(state) => Self::describe_state(&state),
            Err(TryLockError::Poisoned(e)) => Self::describe_state(&e.into_inner()),
            Err(TryLockError::WouldBlock) => "busy",
        };
        f.debug_struct("DeviceHandle")
            .field("path", &self.info.path)
            .field("interface", &self.info.interface)
            .field("state", &state)
            .finish()
    }
}

impl<B: UsbBackend> DeviceHandle<B> {
    fn describe_state(state: &HandleState<B>) -> &'static str {
        if state.native.is_some() { "open" } else { "closed" }
    }
}
