use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::adb::Adb;
use crate::boot::{wait_boot_complete, BootWaitOptions};
use crate::error::{ProvisionError, ProvisionResult};

const DIGEST_BLOCK_SIZE: usize = 1 << 20;

const BUSYBOX_STAGING_DIR: &str = "/system/newbin";
const PROMOTED_TOOLS: [&str; 4] = ["grep", "sed", "cp", "pkill"];

/// Higher-level provisioning steps for one device, composed out of plain
/// bridge invocations. Holds no state beyond the channel and the serial.
pub struct Provisioner<'a> {
    adb: &'a Adb,
    serial: &'a str,
}

impl<'a> Provisioner<'a> {
    pub fn new(adb: &'a Adb, serial: &'a str) -> Self {
        Self { adb, serial }
    }

    /// Block until this device finishes booting.
    pub fn wait_boot_complete(
        &self,
        options: &BootWaitOptions,
        trace_id: &str,
    ) -> ProvisionResult<()> {
        wait_boot_complete(self.adb, self.serial, options, trace_id)
    }

    /// Push a local file into a remote directory, then optionally set its
    /// ownership and mode. `owner` is the combined `owner.group` form the
    /// device's chown accepts, e.g. `app_1.app_1`; `mode` is octal text
    /// like `644`. Returns the remote path of the pushed file.
    pub fn push_and_set_file(
        &self,
        local: &Path,
        remote_dir: &str,
        owner: Option<&str>,
        mode: Option<&str>,
        trace_id: &str,
    ) -> ProvisionResult<String> {
        let file_name = local
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ProvisionError::file(format!("no usable file name in {}", local.display()))
            })?;
        let remote = format!("{}/{file_name}", remote_dir.trim_end_matches('/'));

        self.adb.push(self.serial, local, &remote, trace_id)?;
        if let Some(owner) = owner {
            self.adb
                .shell(self.serial, &format!("chown {owner} {remote}"), trace_id)?;
        }
        if let Some(mode) = mode {
            self.adb
                .shell(self.serial, &format!("chmod {mode} {remote}"), trace_id)?;
        }
        info!(trace_id = %trace_id, serial = %self.serial, remote = %remote, "file pushed");
        Ok(remote)
    }

    /// Staged busybox install: push the binary into a scratch directory,
    /// let `--install` expand the applet links there, then promote the
    /// tools later steps rely on into `/system/bin` and drop the staging
    /// directory.
    pub fn install_busybox(&self, local_busybox: &Path, trace_id: &str) -> ProvisionResult<()> {
        self.adb.shell(
            self.serial,
            &format!("mkdir {BUSYBOX_STAGING_DIR}"),
            trace_id,
        )?;
        let busybox = self.push_and_set_file(
            local_busybox,
            BUSYBOX_STAGING_DIR,
            None,
            Some("755"),
            trace_id,
        )?;
        self.adb.shell(
            self.serial,
            &format!("{busybox} --install {BUSYBOX_STAGING_DIR}"),
            trace_id,
        )?;
        for tool in PROMOTED_TOOLS {
            self.adb.shell(
                self.serial,
                &format!("mv {BUSYBOX_STAGING_DIR}/{tool} /system/bin"),
                trace_id,
            )?;
        }
        self.adb.shell(
            self.serial,
            &format!("rm -r {BUSYBOX_STAGING_DIR}"),
            trace_id,
        )?;
        info!(trace_id = %trace_id, serial = %self.serial, "busybox installed");
        Ok(())
    }

    /// Owner id of an installed package's data directory, or None when the
    /// package has no entry under `/data/data`.
    pub fn app_id(&self, package: &str, trace_id: &str) -> ProvisionResult<Option<String>> {
        let output = self.adb.shell(self.serial, "ls -l /data/data", trace_id)?;
        Ok(parse_app_owner(&output.stdout, package))
    }
}

/// Pick the owner column out of an `ls -l` listing for the entry named
/// `package`. Handles listings both with and without a link-count column.
fn parse_app_owner(listing: &str, package: &str) -> Option<String> {
    for line in listing.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 || *tokens.last()? != package {
            continue;
        }
        let owner = if tokens[1].chars().all(|ch| ch.is_ascii_digit()) {
            tokens[2]
        } else {
            tokens[1]
        };
        return Some(owner.to_string());
    }
    None
}

/// Streaming SHA-256 hex digest of a local file, read in 1 MiB blocks.
pub fn file_digest(path: &Path) -> ProvisionResult<String> {
    let mut file = File::open(path).map_err(|err| {
        ProvisionError::file(format!("cannot open {}: {err}", path.display()))
    })?;
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; DIGEST_BLOCK_SIZE];
    loop {
        let read = file.read(&mut block).map_err(|err| {
            ProvisionError::file(format!("cannot read {}: {err}", path.display()))
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdbSettings;
    use std::fs;

    #[test]
    fn digest_matches_known_vector() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("input");
        fs::write(&path, b"abc").expect("write input");
        assert_eq!(
            file_digest(&path).expect("digest"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_of_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = file_digest(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ProvisionError::File { .. }));
    }

    #[test]
    fn finds_owner_in_listing_without_link_counts() {
        let listing = "drwxr-x--x u0_a51 u0_a51 2021-03-01 10:22 com.example.app\n\
                       drwxr-x--x u0_a52 u0_a52 2021-03-01 10:23 com.other.app\n";
        assert_eq!(
            parse_app_owner(listing, "com.other.app"),
            Some("u0_a52".to_string())
        );
    }

    #[test]
    fn finds_owner_in_listing_with_link_counts() {
        let listing = "drwx------ 4 u0_a80 u0_a80 4096 2021-03-01 10:22 com.example.app\n";
        assert_eq!(
            parse_app_owner(listing, "com.example.app"),
            Some("u0_a80".to_string())
        );
    }

    #[test]
    fn absent_package_has_no_owner() {
        let listing = "drwxr-x--x u0_a51 u0_a51 2021-03-01 10:22 com.example.app\n";
        assert_eq!(parse_app_owner(listing, "com.missing.app"), None);
    }

    fn logging_adb(dir: &tempfile::TempDir) -> (Adb, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.path().join("commands.log");
        let path = dir.path().join("adb");
        fs::write(
            &path,
            format!(
                "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then echo ok; exit 0; fi\necho \"$@\" >> {}\nexit 0\n",
                log.display()
            ),
        )
        .expect("write fake adb");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake adb");
        let settings = AdbSettings {
            command_path: path.to_string_lossy().to_string(),
            command_timeout_secs: 0,
        };
        (Adb::new(&settings, "trace").expect("channel"), log)
    }

    fn logged_lines(log: &Path) -> Vec<String> {
        fs::read_to_string(log)
            .expect("read log")
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn push_and_set_file_runs_push_chown_chmod_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (adb, log) = logging_adb(&dir);
        let local = dir.path().join("hosts");
        fs::write(&local, "127.0.0.1 localhost\n").expect("write local");

        let provisioner = Provisioner::new(&adb, "ABC123");
        let remote = provisioner
            .push_and_set_file(&local, "/system/etc/", Some("root.shell"), Some("644"), "trace")
            .expect("push");
        assert_eq!(remote, "/system/etc/hosts");

        let lines = logged_lines(&log);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("push") && lines[0].ends_with("/system/etc/hosts"));
        assert!(lines[1].contains("chown root.shell /system/etc/hosts"));
        assert!(lines[2].contains("chmod 644 /system/etc/hosts"));
    }

    #[test]
    fn install_busybox_stages_and_promotes_tools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (adb, log) = logging_adb(&dir);
        let local = dir.path().join("busybox");
        fs::write(&local, "binary").expect("write local");

        Provisioner::new(&adb, "ABC123")
            .install_busybox(&local, "trace")
            .expect("install");

        let lines = logged_lines(&log);
        assert_eq!(lines.len(), 9);
        assert!(lines[0].contains("mkdir /system/newbin"));
        assert!(lines[1].contains("push") && lines[1].ends_with("/system/newbin/busybox"));
        assert!(lines[2].contains("chmod 755 /system/newbin/busybox"));
        assert!(lines[3].contains("/system/newbin/busybox --install /system/newbin"));
        assert!(lines[4].contains("mv /system/newbin/grep /system/bin"));
        assert!(lines[5].contains("mv /system/newbin/sed /system/bin"));
        assert!(lines[6].contains("mv /system/newbin/cp /system/bin"));
        assert!(lines[7].contains("mv /system/newbin/pkill /system/bin"));
        assert!(lines[8].contains("rm -r /system/newbin"));
    }

    #[test]
    fn app_id_reads_the_data_directory_listing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("adb");
        fs::write(
            &path,
            "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then echo ok; exit 0; fi\n\
             echo 'drwxr-x--x u0_a51 u0_a51 2021-03-01 10:22 com.example.app'\nexit 0\n",
        )
        .expect("write fake adb");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake adb");
        let settings = AdbSettings {
            command_path: path.to_string_lossy().to_string(),
            command_timeout_secs: 0,
        };
        let adb = Adb::new(&settings, "trace").expect("channel");

        let owner = Provisioner::new(&adb, "ABC123")
            .app_id("com.example.app", "trace")
            .expect("app id");
        assert_eq!(owner, Some("u0_a51".to_string()));
    }
}
