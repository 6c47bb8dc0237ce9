//! In-memory backend for tests
//!
//! [`MockBackend`] serves device trees built from [`MockDeviceSpec`]s and
//! keeps the bookkeeping tests need: live native references per device,
//! open/claim/release/close counts and a log of every transfer with its
//! start and end time. Failures and transfer behaviour are scriptable.
//!
//! # Example
//!
//! ```
//! use rawusb::mock::{MockBackend, MockDeviceSpec};
//! use rawusb::{Context, DeviceFilter};
//!
//! let backend = MockBackend::new();
//! backend.add_device(MockDeviceSpec::raw(1, 2, 3, 0x1209, 0x0001));
//!
//! let context = Context::new(backend.clone());
//! let found = context.enumerate(DeviceFilter::any()).unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].info.path, "1209:0001:03");
//! ```

use crate::backend::{DeviceKey, UsbBackend};
use descriptor::{
    Class, ConfigDescriptor, DeviceDescriptor, EndpointDescriptor, EndpointDirection, Interface,
    InterfaceDescriptor, Speed, TransferType,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for a transfer told to never complete with no timeout set
const NEVER: Duration = Duration::from_secs(3600);

/// Description of one simulated device
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub key: DeviceKey,
    pub port: u8,
    pub speed: Speed,
    pub descriptor: DeviceDescriptor,
    pub configs: Vec<ConfigDescriptor>,
}

impl MockDeviceSpec {
    /// A device with no configurations
    pub fn new(bus_number: u8, address: u8, port: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            key: DeviceKey {
                bus_number,
                address,
            },
            port,
            speed: Speed::HIGH,
            descriptor: DeviceDescriptor::new(vendor_id, product_id),
            configs: Vec::new(),
        }
    }

    /// A vendor-specific device with one interface offering bulk IN 0x81 and bulk OUT 0x01
    pub fn raw(bus_number: u8, address: u8, port: u8, vendor_id: u16, product_id: u16) -> Self {
        Self::new(bus_number, address, port, vendor_id, product_id).with_config(
            ConfigDescriptor::new(1).with_interface(raw_interface(
                0,
                &[(0x81, 0x02), (0x01, 0x02)],
            )),
        )
    }

    pub fn with_class(mut self, class: Class) -> Self {
        self.descriptor.class = class;
        self
    }

    pub fn with_config(mut self, config: ConfigDescriptor) -> Self {
        self.configs.push(config);
        self.descriptor.num_configurations = self.configs.len() as u8;
        self
    }
}

/// Vendor-specific interface with a single alternate setting
///
/// `endpoints` are `(bEndpointAddress, bmAttributes)` pairs in scan order.
pub fn raw_interface(number: u8, endpoints: &[(u8, u8)]) -> Interface {
    let alt = endpoints.iter().fold(
        InterfaceDescriptor::new(number, 0, Class::VENDOR_SPEC),
        |alt, &(address, attributes)| {
            alt.with_endpoint(EndpointDescriptor::new(address, attributes))
        },
    );
    Interface::new(number).with_alt_setting(alt)
}

/// Scripted behaviour for transfers on one endpoint
#[derive(Debug, Clone)]
pub enum MockTransfer {
    /// Complete immediately
    Complete,
    /// Complete after the delay, or time out first if the timeout is shorter
    Delay(Duration),
    /// Block until the timeout expires, then report a timeout
    NeverComplete,
    /// Fail immediately with the given error
    Fail(rusb::Error),
}

/// One transfer as seen by the mock
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub key: DeviceKey,
    pub endpoint: u8,
    pub transfer_type: TransferType,
    pub direction: EndpointDirection,
    /// Bytes written, for OUT transfers
    pub data: Vec<u8>,
    pub timeout: Duration,
    pub started: Instant,
    pub finished: Instant,
    pub result: Result<usize, rusb::Error>,
}

#[derive(Default)]
struct Failures {
    init: Option<rusb::Error>,
    listing: Option<rusb::Error>,
    descriptor: HashMap<DeviceKey, rusb::Error>,
    config: HashMap<DeviceKey, rusb::Error>,
    open: HashMap<DeviceKey, rusb::Error>,
    auto_detach: Option<rusb::Error>,
    detach: Option<rusb::Error>,
    claim: HashMap<DeviceKey, rusb::Error>,
    release: Option<rusb::Error>,
}

#[derive(Default)]
struct MockState {
    devices: Mutex<Vec<Arc<MockDeviceSpec>>>,
    live: Mutex<HashMap<DeviceKey, usize>>,
    failures: Mutex<Failures>,
    scripts: Mutex<HashMap<(DeviceKey, u8), MockTransfer>>,
    read_data: Mutex<HashMap<(DeviceKey, u8), VecDeque<Vec<u8>>>>,
    claimed: Mutex<HashSet<(DeviceKey, u8)>>,
    log: Mutex<Vec<TransferRecord>>,
    init_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    claim_calls: AtomicUsize,
    release_calls: AtomicUsize,
    detach_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockState {
    fn adjust_live(&self, key: DeviceKey, retain: bool) {
        let mut live = lock(&self.live);
        let count = live.entry(key).or_insert(0);
        if retain {
            *count += 1;
        } else {
            *count -= 1;
            if *count == 0 {
                live.remove(&key);
            }
        }
    }
}

/// Native device object; clones and drops are counted as native retain/release
pub struct MockDevice {
    spec: Arc<MockDeviceSpec>,
    state: Arc<MockState>,
}

impl MockDevice {
    fn new(spec: Arc<MockDeviceSpec>, state: Arc<MockState>) -> Self {
        state.adjust_live(spec.key, true);
        Self { spec, state }
    }

    pub fn key(&self) -> DeviceKey {
        self.spec.key
    }

    pub fn vendor_id(&self) -> u16 {
        self.spec.descriptor.vendor_id
    }
}

impl Clone for MockDevice {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.spec), Arc::clone(&self.state))
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.adjust_live(self.spec.key, false);
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MockDevice").field(&self.spec.key).finish()
    }
}

/// Native handle on a [`MockDevice`]
#[derive(Debug)]
pub struct MockHandle {
    key: DeviceKey,
}

/// Scriptable [`UsbBackend`]; clones share state
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, spec: MockDeviceSpec) {
        lock(&self.state.devices).push(Arc::new(spec));
    }

    pub fn remove_device(&self, key: DeviceKey) {
        lock(&self.state.devices).retain(|spec| spec.key != key);
    }

    // Failure injection

    pub fn fail_init(&self, error: Option<rusb::Error>) {
        lock(&self.state.failures).init = error;
    }

    pub fn fail_listing(&self, error: Option<rusb::Error>) {
        lock(&self.state.failures).listing = error;
    }

    pub fn fail_descriptor(&self, key: DeviceKey, error: rusb::Error) {
        lock(&self.state.failures).descriptor.insert(key, error);
    }

    pub fn fail_config(&self, key: DeviceKey, error: rusb::Error) {
        lock(&self.state.failures).config.insert(key, error);
    }

    pub fn fail_open(&self, key: DeviceKey, error: rusb::Error) {
        lock(&self.state.failures).open.insert(key, error);
    }

    pub fn fail_auto_detach(&self, error: Option<rusb::Error>) {
        lock(&self.state.failures).auto_detach = error;
    }

    pub fn fail_detach(&self, error: Option<rusb::Error>) {
        lock(&self.state.failures).detach = error;
    }

    pub fn fail_claim(&self, key: DeviceKey, error: rusb::Error) {
        lock(&self.state.failures).claim.insert(key, error);
    }

    pub fn fail_release(&self, error: Option<rusb::Error>) {
        lock(&self.state.failures).release = error;
    }

    // Transfer scripting

    pub fn script(&self, key: DeviceKey, endpoint: u8, behaviour: MockTransfer) {
        lock(&self.state.scripts).insert((key, endpoint), behaviour);
    }

    /// Queue bytes for the next read on an IN endpoint
    pub fn push_read(&self, key: DeviceKey, endpoint: u8, data: Vec<u8>) {
        lock(&self.state.read_data)
            .entry((key, endpoint))
            .or_default()
            .push_back(data);
    }

    // Bookkeeping

    /// Native references currently alive for one device
    pub fn live_refs(&self, key: DeviceKey) -> usize {
        lock(&self.state.live).get(&key).copied().unwrap_or(0)
    }

    /// Native references currently alive across every device
    pub fn total_live_refs(&self) -> usize {
        lock(&self.state.live).values().sum()
    }

    pub fn init_calls(&self) -> usize {
        self.state.init_calls.load(Ordering::SeqCst)
    }

    pub fn teardown_calls(&self) -> usize {
        self.state.teardown_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.state.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn claim_calls(&self) -> usize {
        self.state.claim_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.state.release_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.state.detach_calls.load(Ordering::SeqCst)
    }

    /// Native handles opened and not yet closed
    pub fn open_native_handles(&self) -> usize {
        self.open_calls() - self.close_calls()
    }

    pub fn is_claimed(&self, key: DeviceKey, interface: u8) -> bool {
        lock(&self.state.claimed).contains(&(key, interface))
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        lock(&self.state.log).clone()
    }

    fn transfer(
        &self,
        handle: &MockHandle,
        endpoint: u8,
        transfer_type: TransferType,
        buf: Buf<'_>,
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        let started = Instant::now();
        let behaviour = lock(&self.state.scripts)
            .get(&(handle.key, endpoint))
            .cloned()
            .unwrap_or(MockTransfer::Complete);

        let outcome = match behaviour {
            MockTransfer::Complete => Ok(()),
            MockTransfer::Fail(e) => Err(e),
            MockTransfer::NeverComplete => {
                thread::sleep(if timeout.is_zero() { NEVER } else { timeout });
                Err(rusb::Error::Timeout)
            }
            MockTransfer::Delay(delay) => {
                if !timeout.is_zero() && timeout < delay {
                    thread::sleep(timeout);
                    Err(rusb::Error::Timeout)
                } else {
                    thread::sleep(delay);
                    Ok(())
                }
            }
        };

        let (direction, data, result) = match buf {
            Buf::Out(data) => (
                EndpointDirection::Out,
                data.to_vec(),
                outcome.map(|()| data.len()),
            ),
            Buf::In(buf) => {
                let result = outcome.map(|()| {
                    let queued = lock(&self.state.read_data)
                        .get_mut(&(handle.key, endpoint))
                        .and_then(|queue| queue.pop_front())
                        .unwrap_or_default();
                    let len = queued.len().min(buf.len());
                    buf[..len].copy_from_slice(&queued[..len]);
                    len
                });
                (EndpointDirection::In, Vec::new(), result)
            }
        };

        lock(&self.state.log).push(TransferRecord {
            key: handle.key,
            endpoint,
            transfer_type,
            direction,
            data,
            timeout,
            started,
            finished: Instant::now(),
            result: result.clone(),
        });
        result
    }
}

enum Buf<'a> {
    In(&'a mut [u8]),
    Out(&'a [u8]),
}

impl UsbBackend for MockBackend {
    type Device = MockDevice;
    type Handle = MockHandle;

    fn init(&self) -> Result<(), rusb::Error> {
        self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.state.failures).init {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn teardown(&self) {
        self.state.teardown_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn devices(&self) -> Result<Vec<Self::Device>, rusb::Error> {
        if let Some(e) = lock(&self.state.failures).listing {
            return Err(e);
        }

        let specs = lock(&self.state.devices).clone();
        Ok(specs
            .into_iter()
            .map(|spec| MockDevice::new(spec, Arc::clone(&self.state)))
            .collect())
    }

    fn device_key(&self, device: &Self::Device) -> DeviceKey {
        device.spec.key
    }

    fn same_device(&self, a: &Self::Device, b: &Self::Device) -> bool {
        Arc::ptr_eq(&a.spec, &b.spec)
    }

    fn port_number(&self, device: &Self::Device) -> u8 {
        device.spec.port
    }

    fn speed(&self, device: &Self::Device) -> Speed {
        device.spec.speed
    }

    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor, rusb::Error> {
        match lock(&self.state.failures).descriptor.get(&device.spec.key) {
            Some(e) => Err(*e),
            None => Ok(device.spec.descriptor.clone()),
        }
    }

    fn config_descriptor(
        &self,
        device: &Self::Device,
        index: u8,
    ) -> Result<ConfigDescriptor, rusb::Error> {
        if let Some(e) = lock(&self.state.failures).config.get(&device.spec.key) {
            return Err(*e);
        }
        device
            .spec
            .configs
            .get(usize::from(index))
            .cloned()
            .ok_or(rusb::Error::NotFound)
    }

    fn open(&self, device: &Self::Device) -> Result<Self::Handle, rusb::Error> {
        if let Some(e) = lock(&self.state.failures).open.get(&device.spec.key) {
            return Err(*e);
        }
        let attached = lock(&self.state.devices)
            .iter()
            .any(|spec| Arc::ptr_eq(spec, &device.spec));
        if !attached {
            return Err(rusb::Error::NoDevice);
        }
        self.state.open_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MockHandle {
            key: device.spec.key,
        })
    }

    fn close(&self, _handle: Self::Handle) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_auto_detach_kernel_driver(
        &self,
        _handle: &mut Self::Handle,
        _enable: bool,
    ) -> Result<(), rusb::Error> {
        match lock(&self.state.failures).auto_detach {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn detach_kernel_driver(
        &self,
        _handle: &mut Self::Handle,
        _interface: u8,
    ) -> Result<(), rusb::Error> {
        self.state.detach_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.state.failures).detach {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn claim_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<(), rusb::Error> {
        self.state.claim_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = lock(&self.state.failures).claim.get(&handle.key) {
            return Err(*e);
        }
        lock(&self.state.claimed).insert((handle.key, interface));
        Ok(())
    }

    fn release_interface(
        &self,
        handle: &mut Self::Handle,
        interface: u8,
    ) -> Result<(), rusb::Error> {
        self.state.release_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.claimed).remove(&(handle.key, interface));
        match lock(&self.state.failures).release {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn read_bulk(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.transfer(handle, endpoint, TransferType::Bulk, Buf::In(buf), timeout)
    }

    fn write_bulk(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.transfer(handle, endpoint, TransferType::Bulk, Buf::Out(buf), timeout)
    }

    fn read_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.transfer(handle, endpoint, TransferType::Interrupt, Buf::In(buf), timeout)
    }

    fn write_interrupt(
        &self,
        handle: &Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.transfer(handle, endpoint, TransferType::Interrupt, Buf::Out(buf), timeout)
    }
}
