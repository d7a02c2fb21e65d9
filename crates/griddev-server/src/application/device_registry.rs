//! Registry of open devices keyed by server-assigned id.
//!
//! Each device sits behind its own mutex so that a long draw call on one
//! device does not block lookups.  The registry map itself is guarded by the
//! command router's state lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use griddev_core::Device;

/// Shared handle to an open device.
pub type DeviceHandle = Arc<Mutex<Box<dyn Device>>>;

#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<i32, DeviceHandle>,
    last_id: i32,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `device` under the next id and returns that id.
    pub fn insert(&mut self, device: Box<dyn Device>) -> i32 {
        self.last_id += 1;
        self.devices.insert(self.last_id, Arc::new(Mutex::new(device)));
        self.last_id
    }

    pub fn get(&self, id: i32) -> Option<DeviceHandle> {
        self.devices.get(&id).cloned()
    }

    pub fn remove(&mut self, id: i32) -> Option<DeviceHandle> {
        self.devices.remove(&id)
    }

    /// Number of open devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Total number of ids ever assigned.
    pub fn created(&self) -> i32 {
        self.last_id
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.devices.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("DeviceRegistry")
            .field("ids", &ids)
            .field("last_id", &self.last_id)
            .finish()
    }
}
