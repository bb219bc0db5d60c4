pub mod locator;
pub mod parse;
pub mod runner;

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::AdbSettings;
use crate::error::{ProvisionError, ProvisionResult};

pub use parse::DeviceSummary;
pub use runner::CommandOutput;

use locator::{is_bare_name, resolve_adb_program, search_path, validate_adb_program};
use parse::parse_devices_output;
use runner::{render_command_line, run_command, run_command_with_timeout};

/// The command channel to one adb installation.
///
/// Construction resolves and validates the executable and runs `adb version`
/// as a self test; a channel that constructed successfully never re-validates.
/// Every call issues exactly one transport invocation and either returns the
/// captured output (exit code zero) or a `ProvisionError::Process` carrying
/// the command line, exit code and raw output. No call retries on its own.
#[derive(Debug, Clone)]
pub struct Adb {
    program: String,
    command_timeout: Option<Duration>,
}

impl Adb {
    pub fn new(settings: &AdbSettings, trace_id: &str) -> ProvisionResult<Self> {
        let resolved = resolve_adb_program(&settings.command_path);
        let program = if is_bare_name(&resolved) {
            match search_path(&resolved) {
                Some(hit) => hit.to_string_lossy().to_string(),
                None => {
                    return Err(ProvisionError::config(format!(
                        "`{resolved}` was not found on PATH"
                    )))
                }
            }
        } else {
            validate_adb_program(&resolved).map_err(ProvisionError::config)?;
            resolved
        };

        let adb = Self {
            program,
            command_timeout: settings.command_timeout(),
        };

        match adb.execute(None, &["version".to_string()], trace_id) {
            Ok(output) => {
                info!(
                    trace_id = %trace_id,
                    program = %adb.program,
                    version = %output.stdout.lines().next().unwrap_or_default(),
                    "adb channel ready"
                );
                Ok(adb)
            }
            Err(err) => Err(ProvisionError::config(format!(
                "adb self-test failed: {err}"
            ))),
        }
    }

    /// The resolved executable this channel spawns.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Issue one bridge invocation: `adb [-s serial] args...`.
    ///
    /// A process killed by a signal reports no exit code; that is surfaced
    /// as a process failure with exit code -1, never as success.
    pub fn execute(
        &self,
        serial: Option<&str>,
        args: &[String],
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        self.run(serial, args, self.command_timeout, trace_id)
    }

    /// Like `execute`, but this one call is bounded by `timeout` regardless
    /// of the channel default.
    pub fn execute_with_timeout(
        &self,
        serial: Option<&str>,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        self.run(serial, args, Some(timeout), trace_id)
    }

    fn run(
        &self,
        serial: Option<&str>,
        args: &[String],
        timeout: Option<Duration>,
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        let mut full_args = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = serial {
            full_args.push("-s".to_string());
            full_args.push(serial.to_string());
        }
        full_args.extend_from_slice(args);

        debug!(
            trace_id = %trace_id,
            command = %render_command_line(&self.program, &full_args),
            "executing bridge command"
        );

        let output = match timeout {
            Some(timeout) => run_command_with_timeout(&self.program, &full_args, timeout)?,
            None => run_command(&self.program, &full_args)?,
        };

        match output.exit_code {
            Some(0) => Ok(output),
            code => Err(ProvisionError::Process {
                command_line: render_command_line(&self.program, &full_args),
                exit_code: code.unwrap_or(-1),
                output: output.combined_output(),
            }),
        }
    }

    pub fn devices(&self, trace_id: &str) -> ProvisionResult<Vec<DeviceSummary>> {
        let output = self.execute(None, &["devices".to_string()], trace_id)?;
        Ok(parse_devices_output(&output.stdout))
    }

    /// Run a shell command on the device. The command travels as a single
    /// argument after `shell`: the transport joins anything further with
    /// unescaped spaces before the device shell parses it, so pre-tokenized
    /// forms would lose their structure. A command that fails inside the
    /// shell but exits zero is still a success at this layer; callers decide
    /// what the output means.
    pub fn shell(
        &self,
        serial: &str,
        command: &str,
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        let args = vec!["shell".to_string(), command.to_string()];
        self.execute(Some(serial), &args, trace_id)
    }

    /// Read one system property, trimmed. An unset property reads as "".
    pub fn getprop(&self, serial: &str, name: &str, trace_id: &str) -> ProvisionResult<String> {
        let output = self.shell(serial, &format!("getprop {name}"), trace_id)?;
        Ok(output.stdout.trim().to_string())
    }

    pub fn push(
        &self,
        serial: &str,
        local: &Path,
        remote: &str,
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        let args = vec![
            "push".to_string(),
            local.to_string_lossy().to_string(),
            remote.to_string(),
        ];
        self.execute(Some(serial), &args, trace_id)
    }

    pub fn pull(
        &self,
        serial: &str,
        remote: &str,
        local: &Path,
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        let args = vec![
            "pull".to_string(),
            remote.to_string(),
            local.to_string_lossy().to_string(),
        ];
        self.execute(Some(serial), &args, trace_id)
    }

    pub fn install(
        &self,
        serial: &str,
        apk: &Path,
        trace_id: &str,
    ) -> ProvisionResult<CommandOutput> {
        let args = vec![
            "install".to_string(),
            "-r".to_string(),
            apk.to_string_lossy().to_string(),
        ];
        self.execute(Some(serial), &args, trace_id)
    }

    /// Block until the transport reports the device present.
    pub fn wait_for_device(&self, serial: &str, trace_id: &str) -> ProvisionResult<CommandOutput> {
        self.execute(Some(serial), &["wait-for-device".to_string()], trace_id)
    }
}
