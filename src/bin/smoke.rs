use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use droidprov::boot::{BootWaitOptions, EncryptionMode};
use droidprov::config::load_config;
use droidprov::device_tracking::{start_device_watcher, WatcherOptions};
use droidprov::logging::init_logging;
use droidprov::registry::DeviceRegistry;
use droidprov::{wait_boot_complete, Adb};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    adb_path: Option<String>,
    json: bool,
    watch_secs: Option<u64>,
    boot_wait: bool,
    encrypted: bool,
    deadline_secs: Option<u64>,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    adb_program: Option<String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut adb_path: Option<String> = None;
    let mut json = false;
    let mut watch_secs: Option<u64> = None;
    let mut boot_wait = false;
    let mut encrypted = false;
    let mut deadline_secs: Option<u64> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--adb" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--adb requires a value".to_string())?;
                adb_path = Some(value);
            }
            "--json" => {
                json = true;
            }
            "--watch" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--watch requires a value".to_string())?;
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("--watch expects seconds, got `{value}`"))?;
                watch_secs = Some(secs);
            }
            "--boot-wait" => {
                boot_wait = true;
            }
            "--encrypted" => {
                encrypted = true;
            }
            "--deadline" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--deadline requires a value".to_string())?;
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("--deadline expects seconds, got `{value}`"))?;
                deadline_secs = Some(secs);
            }
            "-h" | "--help" => {
                return Err(
                    "Usage: cargo run --bin smoke -- [--serial SERIAL] [--adb PATH] [--json] [--watch SECS] [--boot-wait] [--encrypted] [--deadline SECS]\n"
                        .to_string(),
                );
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        serial,
        adb_path,
        json,
        watch_secs,
        boot_wait,
        encrypted,
        deadline_secs,
    })
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<Option<String>, String>,
{
    let start = Instant::now();
    match f() {
        Ok(detail) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                detail,
                error: None,
            });
            Ok(())
        }
        Err(err) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                detail: None,
                error: Some(err),
            });
            Err(())
        }
    }
}

fn skip_check(checks: &mut Vec<SmokeCheck>, name: &'static str) {
    checks.push(SmokeCheck {
        name,
        status: "skip",
        duration_ms: 0,
        detail: None,
        error: None,
    });
}

fn finish(summary: SmokeSummary, json: bool) -> ! {
    let output = if json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut lines = format!(
            "status: {}\ntrace_id: {}\n",
            summary.status, summary.trace_id
        );
        for check in &summary.checks {
            lines.push_str(&format!("  {:<14} {}", check.name, check.status));
            if let Some(detail) = &check.detail {
                lines.push_str(&format!("  ({detail})"));
            }
            if let Some(error) = &check.error {
                lines.push_str(&format!("  {error}"));
            }
            lines.push('\n');
        }
        lines
    };
    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    init_logging();
    let trace_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().to_rfc3339();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut status = "pass";
    let mut serial = args.serial.clone();

    let mut config = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            checks.push(SmokeCheck {
                name: "load_config",
                status: "fail",
                duration_ms: 0,
                detail: None,
                error: Some(err.to_string()),
            });
            finish(
                SmokeSummary {
                    tool: "droidprov_smoke",
                    status: "fail",
                    trace_id,
                    started_at,
                    serial,
                    adb_program: None,
                    checks,
                },
                args.json,
            );
        }
    };
    checks.push(SmokeCheck {
        name: "load_config",
        status: "pass",
        duration_ms: 0,
        detail: None,
        error: None,
    });
    if let Some(path) = &args.adb_path {
        config.adb.command_path = path.clone();
    }

    // Channel construction includes the adb self-test.
    let adb = match Adb::new(&config.adb, &trace_id) {
        Ok(adb) => Arc::new(adb),
        Err(err) => {
            checks.push(SmokeCheck {
                name: "resolve_adb",
                status: "fail",
                duration_ms: 0,
                detail: None,
                error: Some(err.to_string()),
            });
            skip_check(&mut checks, "list_devices");
            skip_check(&mut checks, "watch_devices");
            skip_check(&mut checks, "boot_wait");
            finish(
                SmokeSummary {
                    tool: "droidprov_smoke",
                    status: "fail",
                    trace_id,
                    started_at,
                    serial,
                    adb_program: None,
                    checks,
                },
                args.json,
            );
        }
    };
    let adb_program = adb.program().to_string();
    checks.push(SmokeCheck {
        name: "resolve_adb",
        status: "pass",
        duration_ms: 0,
        detail: Some(adb_program.clone()),
        error: None,
    });

    if run_check(&mut checks, "list_devices", || {
        let devices = adb.devices(&trace_id).map_err(|err| err.to_string())?;
        let online: Vec<_> = devices.iter().filter(|d| d.state == "device").collect();
        if serial.is_none() && online.len() == 1 {
            serial = Some(online[0].serial.clone());
        }
        if devices.is_empty() {
            return Ok(Some("no devices attached".to_string()));
        }
        let listed = devices
            .iter()
            .map(|d| format!("{} [{}]", d.serial, d.state))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Some(listed))
    })
    .is_err()
    {
        status = "fail";
    }

    if let Some(secs) = args.watch_secs {
        if run_check(&mut checks, "watch_devices", || {
            let registry = Arc::new(DeviceRegistry::new());
            let handle = start_device_watcher(
                Arc::clone(&adb),
                Arc::clone(&registry),
                WatcherOptions {
                    poll_interval: config.tracking.poll_interval(),
                },
                trace_id.clone(),
            );
            thread::sleep(Duration::from_secs(secs));
            handle.stop();
            let serials = registry.serials();
            Ok(Some(format!(
                "tracked {}: [{}]",
                serials.len(),
                serials.join(", ")
            )))
        })
        .is_err()
        {
            status = "fail";
        }
    } else {
        skip_check(&mut checks, "watch_devices");
    }

    if args.boot_wait {
        if run_check(&mut checks, "boot_wait", || {
            let serial = serial.as_deref().ok_or_else(|| {
                "no device serial; pass --serial or set ANDROID_SERIAL".to_string()
            })?;
            let options = BootWaitOptions {
                encryption: if args.encrypted || config.boot.encrypted {
                    EncryptionMode::On
                } else {
                    EncryptionMode::Off
                },
                poll_delay: config.boot.poll_delay(),
                deadline: args
                    .deadline_secs
                    .map(Duration::from_secs)
                    .or_else(|| config.boot.deadline()),
            };
            let start = Instant::now();
            wait_boot_complete(&adb, serial, &options, &trace_id)
                .map_err(|err| err.to_string())?;
            Ok(Some(format!(
                "booted after {} ms",
                start.elapsed().as_millis()
            )))
        })
        .is_err()
        {
            status = "fail";
        }
    } else {
        skip_check(&mut checks, "boot_wait");
    }

    finish(
        SmokeSummary {
            tool: "droidprov_smoke",
            status,
            trace_id,
            started_at,
            serial,
            adb_program: Some(adb_program),
            checks,
        },
        args.json,
    );
}
