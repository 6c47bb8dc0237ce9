//! Reference retention for discovered devices
//!
//! Native device objects only live as long as the device list they came
//! from, unless something keeps an extra reference. The arena keeps exactly
//! one native reference per physical device and counts how many outstanding
//! [`Retained`] guards need it. The native reference is dropped when the
//! count reaches zero.
//!
//! Bus/address pairs are reused after an unplug, so a key alone does not
//! identify a device. Each retain asks the caller whether the device it holds
//! is the one already stored under that key; if not, the new device gets its
//! own record and older guards keep pointing at the old one.
//!
//! A `Retained` guard is the single outstanding reference a discovered
//! device record owns. It cannot be cloned; dropping it (or calling
//! [`Retained::release`]) gives the reference back.

use crate::backend::DeviceKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

type RecordId = u64;

struct Record<D> {
    key: DeviceKey,
    device: D,
    refs: AtomicUsize,
}

struct Records<D> {
    by_id: HashMap<RecordId, Arc<Record<D>>>,
    /// Most recently retained record for each key
    current: HashMap<DeviceKey, RecordId>,
    next_id: RecordId,
}

/// Reference-counted store of native device objects
pub struct DeviceArena<D> {
    records: Mutex<Records<D>>,
}

impl<D: Clone> DeviceArena<D> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Records {
                by_id: HashMap::new(),
                current: HashMap::new(),
                next_id: 0,
            }),
        })
    }

    fn records(&self) -> MutexGuard<'_, Records<D>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take one reference on `device`
    ///
    /// `same_device` tells whether the record stored under `key` holds this
    /// very device. If it does, only the counter moves; otherwise a clone of
    /// `device` is stored in a fresh record.
    pub fn retain(
        self: &Arc<Self>,
        key: DeviceKey,
        device: &D,
        same_device: impl Fn(&D, &D) -> bool,
    ) -> Retained<D> {
        let (id, record) = {
            let mut records = self.records();
            let existing = records
                .current
                .get(&key)
                .and_then(|id| records.by_id.get(id).map(|record| (*id, record)))
                .filter(|(_, record)| same_device(&record.device, device))
                .map(|(id, record)| (id, Arc::clone(record)));

            let (id, record) = match existing {
                Some(found) => found,
                None => {
                    if records.current.contains_key(&key) {
                        debug!("Device {} was replaced, retaining the new one separately", key);
                    }
                    records.next_id += 1;
                    let id = records.next_id;
                    let record = Arc::new(Record {
                        key,
                        device: device.clone(),
                        refs: AtomicUsize::new(0),
                    });
                    records.by_id.insert(id, Arc::clone(&record));
                    records.current.insert(key, id);
                    (id, record)
                }
            };

            let refs = record.refs.fetch_add(1, Ordering::AcqRel) + 1;
            trace!("Retained device {} (refs={})", key, refs);
            (id, record)
        };

        Retained {
            arena: Arc::clone(self),
            id,
            record,
            released: false,
        }
    }

    fn release(&self, id: RecordId) {
        let mut records = self.records();
        let Some(record) = records.by_id.get(&id) else {
            return;
        };

        let key = record.key;
        let previous = record.refs.fetch_sub(1, Ordering::AcqRel);
        trace!("Released device {} (refs={})", key, previous - 1);
        if previous == 1 {
            records.by_id.remove(&id);
            if records.current.get(&key) == Some(&id) {
                records.current.remove(&key);
            }
        }
    }

    /// Outstanding references on every device seen under one key
    pub fn refs(&self, key: DeviceKey) -> usize {
        self.records()
            .by_id
            .values()
            .filter(|record| record.key == key)
            .map(|record| record.refs.load(Ordering::Acquire))
            .sum()
    }

    /// Outstanding references across every device
    pub fn outstanding(&self) -> usize {
        self.records()
            .by_id
            .values()
            .map(|record| record.refs.load(Ordering::Acquire))
            .sum()
    }

    /// Number of distinct native devices currently held
    pub fn len(&self) -> usize {
        self.records().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().by_id.is_empty()
    }
}

/// One outstanding reference on an arena device
pub struct Retained<D: Clone> {
    arena: Arc<DeviceArena<D>>,
    id: RecordId,
    record: Arc<Record<D>>,
    released: bool,
}

impl<D: Clone> Retained<D> {
    pub fn key(&self) -> DeviceKey {
        self.record.key
    }

    /// The retained native device object
    pub fn device(&self) -> &D {
        &self.record.device
    }

    /// Give the reference back now instead of on drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.arena.release(self.id);
        }
    }
}

impl<D: Clone> Drop for Retained<D> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl<D: Clone> std::fmt::Debug for Retained<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retained")
            .field("key", &self.record.key)
            .finish()
    }
}
