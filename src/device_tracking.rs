use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::adb::Adb;
use crate::registry::DeviceRegistry;

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub poll_interval: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct DeviceWatcherHandle {
    stop_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl DeviceWatcherHandle {
    /// Signal the watcher and wait for its thread to finish. The flag is
    /// checked at the top of every iteration, so this returns within one
    /// poll cycle plus one enumeration.
    pub fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }
}

/// Serials that changed in one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDelta {
    pub attached: Vec<String>,
    pub detached: Vec<String>,
}

/// Reconcile the registry against one enumeration: add serials that appeared,
/// drop serials that vanished. After the call, registry membership equals the
/// observed set exactly; an empty observation empties the registry.
pub fn sync_registry(registry: &DeviceRegistry, observed: &[String]) -> RegistryDelta {
    let known = registry.serials();
    let mut delta = RegistryDelta::default();

    for serial in observed {
        if registry.add(serial) {
            delta.attached.push(serial.clone());
        }
    }
    for serial in &known {
        if !observed.contains(serial) && registry.remove(serial) {
            delta.detached.push(serial.clone());
        }
    }
    delta
}

/// Spawn the background watcher: enumerate devices on a fixed interval and
/// keep the registry in sync. A failed enumeration carries no information,
/// so the registry is left untouched and the loop continues; the watcher
/// never exits on its own.
pub fn start_device_watcher(
    adb: Arc<Adb>,
    registry: Arc<DeviceRegistry>,
    options: WatcherOptions,
    trace_id: String,
) -> DeviceWatcherHandle {
    let trace_id = if trace_id.trim().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        trace_id
    };
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_thread = Arc::clone(&stop_flag);

    let join = thread::spawn(move || {
        info!(
            trace_id = %trace_id,
            interval_ms = options.poll_interval.as_millis() as u64,
            "device watcher started"
        );
        while !stop_thread.load(Ordering::Relaxed) {
            match adb.devices(&trace_id) {
                Ok(summaries) => {
                    let observed: Vec<String> =
                        summaries.into_iter().map(|summary| summary.serial).collect();
                    let delta = sync_registry(&registry, &observed);
                    for serial in &delta.attached {
                        info!(trace_id = %trace_id, serial = %serial, "device attached");
                    }
                    for serial in &delta.detached {
                        info!(trace_id = %trace_id, serial = %serial, "device detached");
                    }
                }
                Err(err) => {
                    warn!(
                        trace_id = %trace_id,
                        error = %err,
                        "device enumeration failed; keeping last known devices"
                    );
                }
            }
            thread::sleep(options.poll_interval);
        }
        info!(trace_id = %trace_id, "device watcher stopped");
    });

    DeviceWatcherHandle { stop_flag, join }
}
