use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::reading::{DeviceReading, DEFAULT_DEVICES};

/// Latest reading per known device.
///
/// The set of known devices is fixed at construction. Readings for any other
/// identifier are ignored rather than treated as errors. Each entry is
/// replaced as a whole under the write lock, so readers never observe a mix
/// of old and new fields.
pub struct DeviceStateStore {
    devices: RwLock<HashMap<String, DeviceReading>>,
}

impl DeviceStateStore {
    /// Create a store for the given device identifiers, each starting from a
    /// zero reading.
    pub fn new<I, S>(known_devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices = known_devices
            .into_iter()
            .map(|id| {
                let id = id.into();
                let reading = DeviceReading::zero(id.clone());
                (id, reading)
            })
            .collect();

        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Store for the left (`ESQ`) and right (`DIR`) leg nodes.
    pub fn with_default_devices() -> Self {
        Self::new(DEFAULT_DEVICES)
    }

    pub fn is_known(&self, device_id: &str) -> bool {
        self.read().contains_key(device_id)
    }

    /// Sorted list of the identifiers this store accepts.
    pub fn known_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Replace the stored reading for `reading.device_id()`.
    ///
    /// Returns `false` without touching anything when the device is unknown.
    pub fn update(&self, reading: DeviceReading) -> bool {
        let mut devices = self.write();
        match devices.get_mut(reading.device_id()) {
            Some(slot) => {
                *slot = reading;
                true
            }
            None => {
                tracing::trace!("Ignoring reading from unknown device {:?}", reading.device_id());
                false
            }
        }
    }

    pub fn snapshot(&self, device_id: &str) -> Option<DeviceReading> {
        self.read().get(device_id).cloned()
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, DeviceReading> {
        self.read()
            .iter()
            .map(|(id, reading)| (id.clone(), reading.clone()))
            .collect()
    }

    /// Receive time of the device's current reading.
    pub fn last_seen(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.read().get(device_id).map(DeviceReading::received_at)
    }

    // A panic while holding the lock cannot leave a half-written entry, since
    // entries are only ever replaced whole.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DeviceReading>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DeviceReading>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::with_default_devices()
    }
}
