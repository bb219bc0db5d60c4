use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{ProvisionError, ProvisionResult};

/// Captured output of one finished bridge process. `exit_code` is `None`
/// when the process was killed by a signal.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// The raw output as a single text: stdout followed by stderr. This is
    /// the transport-level view callers inspect; no parsing happens here.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}{}", self.stdout, self.stderr)
        }
    }
}

pub fn render_command_line(program: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_string());
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

/// Run to completion with no watchdog; blocks for as long as the child runs.
pub fn run_command(program: &str, args: &[String]) -> ProvisionResult<CommandOutput> {
    let (mut child, stdout_handle, stderr_handle) = spawn_with_drains(program, args)?;

    let status = child.wait().map_err(|err| ProvisionError::Launch {
        command_line: render_command_line(program, args),
        source: err,
    })?;

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code: status.code(),
    })
}

/// Run with a watchdog; the child is killed once `timeout` elapses.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> ProvisionResult<CommandOutput> {
    let (mut child, stdout_handle, stderr_handle) = spawn_with_drains(program, args)?;

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(ProvisionError::Timeout {
                        command_line: render_command_line(program, args),
                        timeout,
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(ProvisionError::Launch {
                    command_line: render_command_line(program, args),
                    source: err,
                });
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

type DrainHandle = std::thread::JoinHandle<Vec<u8>>;

fn spawn_with_drains(
    program: &str,
    args: &[String],
) -> ProvisionResult<(std::process::Child, DrainHandle, DrainHandle)> {
    let launch_error = |source: io::Error| ProvisionError::Launch {
        command_line: render_command_line(program, args),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(launch_error)?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can
    // block once the pipe buffer fills and never reach its exit.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| launch_error(io::Error::other("stdout pipe unavailable")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| launch_error(io::Error::other("stderr pipe unavailable")))?;

    let stdout_handle = std::thread::spawn(move || drain(stdout));
    let stderr_handle = std::thread::spawn(move || drain(stderr));

    Ok((child, stdout_handle, stderr_handle))
}

fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut buffer = Vec::<u8>::new();
    let mut temp = [0u8; 4096];
    loop {
        match reader.read(&mut temp) {
            Ok(0) => break,
            Ok(count) => buffer.extend_from_slice(&temp[..count]),
            Err(_) => break,
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn does_not_deadlock_on_large_stdout() {
        // Regression test: if stdout/stderr are piped but not drained, the
        // child blocks once the pipe buffer fills and an otherwise-fast
        // command "hangs" until the watchdog fires.
        let args = sh("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done");
        let output = run_command_with_timeout("sh", &args, Duration::from_secs(10))
            .expect("large-output command should complete without timing out");
        assert_eq!(output.exit_code, Some(0));
        assert!(
            output.stdout.len() >= 1_000_000,
            "expected stdout >= 1MB, got {}",
            output.stdout.len()
        );
    }

    #[test]
    fn preserves_exit_code() {
        let output = run_command("sh", &sh("exit 3")).expect("run");
        assert_eq!(output.exit_code, Some(3));
    }

    #[test]
    fn captures_streams_separately_and_combined() {
        let output = run_command("sh", &sh("echo out; echo err 1>&2")).expect("run");
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined_output(), "out\nerr\n");
    }

    #[test]
    fn kills_child_on_timeout() {
        let err = run_command_with_timeout("sh", &sh("sleep 5"), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { .. }));
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let err = run_command("/this/path/should/not/exist/adb", &[]).unwrap_err();
        assert!(matches!(err, ProvisionError::Launch { .. }));
    }
}
