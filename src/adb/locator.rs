use std::fs;
use std::path::{Path, PathBuf};

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

/// Walk PATH for a bare program name, returning the first executable hit.
pub fn search_path(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable_file(candidate))
}

pub fn is_bare_name(program: &str) -> bool {
    !program.contains(std::path::MAIN_SEPARATOR)
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("adb command is empty".to_string());
    }
    if is_bare_name(program) {
        if search_path(program).is_none() {
            return Err(format!("`{program}` was not found on PATH"));
        }
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("adb path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("adb executable not found at the configured path".to_string());
    }
    if !is_executable_file(path) {
        return Err("adb path is not an executable file".to_string());
    }
    Ok(())
}

fn is_executable_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_double_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/android/platform-tools/adb\"  "),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn strips_wrapping_single_quotes() {
        assert_eq!(
            normalize_command_path("  '/opt/android/platform-tools/adb'  "),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn resolves_empty_to_default_adb() {
        assert_eq!(resolve_adb_program(""), "adb");
        assert_eq!(resolve_adb_program("   "), "adb");
    }

    #[test]
    fn validates_nonexistent_path() {
        let err = validate_adb_program("/this/path/should/not/exist/adb").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
    }

    #[test]
    fn finds_shell_on_path() {
        assert!(search_path("sh").is_some());
        assert!(validate_adb_program("sh").is_ok());
    }

    #[test]
    fn rejects_bare_name_missing_from_path() {
        let err = validate_adb_program("droidprov-no-such-tool").unwrap_err();
        assert!(err.contains("PATH"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_file_without_exec_bit() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "#!/bin/sh").expect("write");
        let err = validate_adb_program(&file.path().to_string_lossy()).unwrap_err();
        assert!(err.contains("not an executable"));
    }
}
