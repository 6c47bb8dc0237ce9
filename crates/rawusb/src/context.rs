//! Process-wide coordination point
//!
//! A [`Context`] owns the native backend, the reference arena and the set of
//! open device handles. Native initialisation happens lazily on the first
//! scan or open, under the same mutex that serialises scans and opens.
//!
//! Teardown order is enforced: [`Context::shutdown`] refuses new scans and
//! opens, waits until every handle is closed, and only then tears the native
//! layer down.

use crate::arena::DeviceArena;
use crate::backend::UsbBackend;
use crate::discovery::{self, DeviceFilter, Discovered, ScanOutcome};
use crate::error::{Error, Result};
use crate::handle::{self, DeviceHandle};
use crate::libusb::LibusbBackend;
use descriptor::DeviceInfo;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Registry {
    open: HashSet<u64>,
    next_id: u64,
}

pub(crate) struct Shared<B: UsbBackend> {
    pub(crate) backend: B,
    pub(crate) arena: Arc<DeviceArena<B::Device>>,
    /// Guards "is the native context initialised" and serialises scans/opens
    scan_lock: Mutex<bool>,
    registry: Mutex<Registry>,
    registry_changed: Condvar,
    shutting_down: AtomicBool,
}

/// Guard held for the duration of a scan or open
pub(crate) struct ScanGuard<'a> {
    _initialized: MutexGuard<'a, bool>,
}

impl<B: UsbBackend> Shared<B> {
    /// Take the scan lock, creating the native context on first use
    pub(crate) fn lock_initialized(&self) -> Result<ScanGuard<'_>> {
        let mut initialized = self.scan_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }

        if !*initialized {
            self.backend.init().map_err(Error::Init)?;
            *initialized = true;
            debug!("Native USB context initialized");
        }

        Ok(ScanGuard {
            _initialized: initialized,
        })
    }

    pub(crate) fn scan_locked(
        &self,
        _guard: &ScanGuard<'_>,
        filter: DeviceFilter,
    ) -> ScanOutcome<B::Device> {
        discovery::scan_devices(&self.backend, &self.arena, filter)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a newly opened handle, unless teardown has begun
    pub(crate) fn register(&self) -> Result<u64> {
        let mut registry = self.registry();
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }

        registry.next_id += 1;
        let id = registry.next_id;
        registry.open.insert(id);
        Ok(id)
    }

    pub(crate) fn deregister(&self, id: u64) {
        let mut registry = self.registry();
        if registry.open.remove(&id) {
            self.registry_changed.notify_all();
        }
    }
}

/// Entry point for discovering and opening raw USB interfaces
pub struct Context<B: UsbBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: UsbBackend> Context<B> {
    /// Create a context over `backend`. The native layer is not touched yet.
    pub fn new(backend: B) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                arena: DeviceArena::new(),
                scan_lock: Mutex::new(false),
                registry: Mutex::new(Registry::default()),
                registry_changed: Condvar::new(),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Reference arena backing every discovered device
    pub fn arena(&self) -> &DeviceArena<B::Device> {
        &self.shared.arena
    }

    /// Scan all devices, keeping whatever matched before any failure
    ///
    /// Every returned record holds one device reference.
    pub fn scan(&self, filter: DeviceFilter) -> ScanOutcome<B::Device> {
        match self.shared.lock_initialized() {
            Ok(guard) => self.shared.scan_locked(&guard, filter),
            Err(e) => ScanOutcome::failed(e),
        }
    }

    /// Scan all devices, failing as a whole if the scan did not complete
    pub fn enumerate(&self, filter: DeviceFilter) -> Result<Vec<Discovered<B::Device>>> {
        self.scan(filter).into_result()
    }

    /// Open and claim the interface described by `info`
    ///
    /// The device is found again by a fresh scan, matched on port number and
    /// interface number.
    pub fn open(&self, info: &DeviceInfo) -> Result<DeviceHandle<B>> {
        handle::open(&self.shared, info)
    }

    /// Number of handles opened through this context and not yet closed
    pub fn open_handles(&self) -> usize {
        self.shared.registry().open.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::Acquire)
    }

    /// Refuse new work, wait for every handle to close, then tear down
    pub fn shutdown(&self) {
        let mut registry = self.begin_shutdown();
        while !registry.open.is_empty() {
            debug!("Waiting for {} open handle(s)", registry.open.len());
            registry = self
                .shared
                .registry_changed
                .wait(registry)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(registry);

        self.teardown();
    }

    /// Like [`Context::shutdown`], but give up after `timeout`
    ///
    /// On timeout the native layer stays up and new work stays refused.
    pub fn shutdown_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut registry = self.begin_shutdown();

        while !registry.open.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                let outstanding = registry.open.len();
                warn!("Shutdown timed out with {} open handle(s)", outstanding);
                return Err(Error::HandlesOutstanding(outstanding));
            }
            registry = self
                .shared
                .registry_changed
                .wait_timeout(registry, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        drop(registry);

        self.teardown();
        Ok(())
    }

    fn begin_shutdown(&self) -> MutexGuard<'_, Registry> {
        let registry = self.shared.registry();
        if !self.shared.shutting_down.swap(true, Ordering::AcqRel) {
            info!("USB context shutting down");
        }
        registry
    }

    fn teardown(&self) {
        let mut initialized = self
            .shared
            .scan_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if *initialized {
            self.shared.backend.teardown();
            *initialized = false;
            info!("USB context torn down");
        }
    }
}

static GLOBAL: OnceLock<Context<LibusbBackend>> = OnceLock::new();

/// The process-wide libusb context
pub fn global() -> &'static Context<LibusbBackend> {
    GLOBAL.get_or_init(|| Context::new(LibusbBackend::new()))
}
