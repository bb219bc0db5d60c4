pub mod adb;
pub mod boot;
pub mod config;
pub mod db;
pub mod device_tracking;
pub mod error;
pub mod logging;
pub mod provision;
pub mod registry;

pub use adb::Adb;
pub use boot::{wait_boot_complete, BootPhase, BootWaitMachine, BootWaitOptions, EncryptionMode};
pub use config::ProvisionConfig;
pub use db::SettingsDb;
pub use device_tracking::{start_device_watcher, DeviceWatcherHandle, WatcherOptions};
pub use error::{ProvisionError, ProvisionResult};
pub use provision::{file_digest, Provisioner};
pub use registry::{Device, DeviceRegistry};
