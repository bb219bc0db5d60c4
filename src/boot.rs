use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::adb::Adb;
use crate::error::{ProvisionError, ProvisionResult};

/// Value of `vold.decrypt` once the framework restarts after disk unlock.
pub const DECRYPT_TRIGGER: &str = "trigger_restart_framework";

const ANIMATION_STOPPED: &str = "stopped";
const BOOT_COMPLETED: &str = "1";

const VOLD_DECRYPT_PROP: &str = "vold.decrypt";
const BOOT_ANIMATION_PROP: &str = "init.svc.bootanim";
const BOOT_COMPLETED_PROP: &str = "sys.boot_completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    AwaitingDecryptTrigger,
    AwaitingAnimationStart,
    AwaitingAnimationEnd,
    AwaitingBootProperty,
    Complete,
}

#[derive(Debug, Clone)]
pub struct BootWaitOptions {
    pub encryption: EncryptionMode,
    /// Delay between polls. Zero busy-polls.
    pub poll_delay: Duration,
    /// Upper bound for the whole wait. None waits forever.
    pub deadline: Option<Duration>,
}

impl Default for BootWaitOptions {
    fn default() -> Self {
        Self {
            encryption: EncryptionMode::Off,
            poll_delay: Duration::from_millis(200),
            deadline: None,
        }
    }
}

/// The boot-readiness protocol, free of I/O: `property` names the system
/// property to query next and `observe` consumes one raw reading.
///
/// Unencrypted boots watch a single flag: `sys.boot_completed` is unset
/// while booting and exactly `1` afterwards. Encrypted boots go through
/// three phases: the decrypt sentinel, then the boot animation starting
/// (`init.svc.bootanim` no longer `stopped`), then the animation stopping
/// again, which is the completion signal.
#[derive(Debug)]
pub struct BootWaitMachine {
    phase: BootPhase,
}

impl BootWaitMachine {
    pub fn new(mode: EncryptionMode) -> Self {
        let phase = match mode {
            EncryptionMode::On => BootPhase::AwaitingDecryptTrigger,
            EncryptionMode::Off => BootPhase::AwaitingBootProperty,
        };
        Self { phase }
    }

    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == BootPhase::Complete
    }

    /// Property to query next, or None once the wait is complete.
    pub fn property(&self) -> Option<&'static str> {
        match self.phase {
            BootPhase::AwaitingDecryptTrigger => Some(VOLD_DECRYPT_PROP),
            BootPhase::AwaitingAnimationStart | BootPhase::AwaitingAnimationEnd => {
                Some(BOOT_ANIMATION_PROP)
            }
            BootPhase::AwaitingBootProperty => Some(BOOT_COMPLETED_PROP),
            BootPhase::Complete => None,
        }
    }

    /// Feed one observed property value and return the resulting phase.
    /// Values that do not satisfy the current phase leave it unchanged.
    pub fn observe(&mut self, raw: &str) -> BootPhase {
        let value = raw.trim();
        self.phase = match self.phase {
            BootPhase::AwaitingDecryptTrigger if value == DECRYPT_TRIGGER => {
                BootPhase::AwaitingAnimationStart
            }
            BootPhase::AwaitingAnimationStart if value != ANIMATION_STOPPED => {
                BootPhase::AwaitingAnimationEnd
            }
            BootPhase::AwaitingAnimationEnd if value == ANIMATION_STOPPED => BootPhase::Complete,
            BootPhase::AwaitingBootProperty if value == BOOT_COMPLETED => BootPhase::Complete,
            phase => phase,
        };
        self.phase
    }
}

/// Block until the device reports its boot sequence finished.
///
/// Unencrypted devices first block on `wait-for-device`; that wait and the
/// property polls spend from the same deadline. Every poll is one shell
/// invocation; a process-level failure aborts the wait immediately. An
/// elapsed deadline yields `ProvisionError::Deadline`.
pub fn wait_boot_complete(
    adb: &Adb,
    serial: &str,
    options: &BootWaitOptions,
    trace_id: &str,
) -> ProvisionResult<()> {
    let started = Instant::now();

    if options.encryption == EncryptionMode::Off {
        let reached = match options.deadline {
            Some(deadline) => adb.execute_with_timeout(
                Some(serial),
                &["wait-for-device".to_string()],
                deadline,
                trace_id,
            ),
            None => adb.wait_for_device(serial, trace_id),
        };
        if let Err(err) = reached {
            return Err(match err {
                ProvisionError::Timeout { .. } => ProvisionError::Deadline {
                    message: format!("boot wait for {serial} gave up waiting for the device"),
                    waited: started.elapsed(),
                },
                other => other,
            });
        }
    }

    let mut machine = BootWaitMachine::new(options.encryption);
    info!(
        trace_id = %trace_id,
        serial = %serial,
        phase = ?machine.phase(),
        "waiting for boot to complete"
    );

    while let Some(property) = machine.property() {
        if let Some(deadline) = options.deadline {
            if started.elapsed() >= deadline {
                return Err(ProvisionError::Deadline {
                    message: format!(
                        "boot wait for {serial} gave up in phase {:?}",
                        machine.phase()
                    ),
                    waited: started.elapsed(),
                });
            }
        }

        let value = adb.getprop(serial, property, trace_id)?;
        let before = machine.phase();
        let after = machine.observe(&value);
        if after != before {
            info!(trace_id = %trace_id, serial = %serial, phase = ?after, "boot phase advanced");
        }
        if machine.is_complete() {
            break;
        }
        thread::sleep(options.poll_delay);
    }

    info!(
        trace_id = %trace_id,
        serial = %serial,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "boot completed"
    );
    Ok(())
}
