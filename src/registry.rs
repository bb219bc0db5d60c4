use std::sync::Mutex;

/// A tracked device. The serial is transport-assigned and opaque; it is the
/// only identity this crate keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
}

/// In-memory set of currently attached devices, keyed by serial.
///
/// The watcher is the only steady-state writer; any thread may read. All
/// membership state sits behind one mutex and every read is a snapshot, so
/// no caller observes a half-applied diff. The supported configuration has
/// at most one entry.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a serial. Returns false when it was already present.
    pub fn add(&self, serial: &str) -> bool {
        let mut devices = self.lock();
        if devices.iter().any(|device| device.serial == serial) {
            return false;
        }
        devices.push(Device {
            serial: serial.to_string(),
        });
        true
    }

    /// Drop a serial. Returns false when it was not present.
    pub fn remove(&self, serial: &str) -> bool {
        let mut devices = self.lock();
        let before = devices.len();
        devices.retain(|device| device.serial != serial);
        devices.len() != before
    }

    /// The sole tracked device, or None when nothing is attached.
    ///
    /// Single-device support is intentional; a multi-device deployment would
    /// replace this with lookup by serial.
    pub fn current(&self) -> Option<Device> {
        self.lock().first().cloned()
    }

    /// Snapshot of all tracked serials, in attach order.
    pub fn serials(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|device| device.serial.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Device>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let registry = DeviceRegistry::new();
        assert!(registry.add("ABC123"));
        assert!(!registry.add("ABC123"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_of_absent_serial_changes_nothing() {
        let registry = DeviceRegistry::new();
        registry.add("ABC123");
        assert!(!registry.remove("OTHER"));
        assert_eq!(registry.serials(), vec!["ABC123".to_string()]);
        assert!(registry.remove("ABC123"));
        assert!(registry.is_empty());
    }

    #[test]
    fn current_returns_the_sole_tracked_device() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.current(), None);
        registry.add("ABC123");
        assert_eq!(
            registry.current().map(|device| device.serial),
            Some("ABC123".to_string())
        );
    }
}
