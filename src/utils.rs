//! Utility functions shared across the onionsd library
//!
//! Command execution for the system tools the crate wraps (`lsblk`,
//! `parted`, `udisksctl`, `nmcli`, ...), cross-platform permission
//! handling, modification-time preservation, and small formatting helpers.

use crate::error::{OnionSdError, Result};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, trace};

/// Run a system tool, capturing its output
///
/// The command and arguments are logged at debug level; a non-zero exit is
/// not an error here (callers inspect `status` themselves, since several
/// tools communicate through exit codes). A missing executable maps to
/// [`OnionSdError::ToolMissing`].
pub(crate) fn run(program: &str, args: &[&str]) -> Result<Output> {
    debug!("Running: {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            OnionSdError::ToolMissing(program.to_string())
        } else {
            OnionSdError::Io(e)
        }
    })?;
    if !output.status.success() {
        debug!(
            "{} exited {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Run a command that requires root privileges
///
/// Executes directly when the process is already root, otherwise prepends
/// `pkexec` so the user is prompted for authorisation via polkit.
pub(crate) fn run_privileged(program: &str, args: &[&str]) -> Result<Output> {
    if is_root() {
        return run(program, args);
    }
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(program);
    full.extend_from_slice(args);
    run("pkexec", &full)
}

/// Whether the current process has an effective uid of root
#[cfg(unix)]
pub(crate) fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
pub(crate) fn is_root() -> bool {
    false
}

/// Extract a failure detail from a finished command: stderr, falling back
/// to stdout when stderr is empty
pub(crate) fn output_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Copy the source file's modification time onto the destination
///
/// Best-effort: FAT32 and similar filesystems may refuse, which is fine -
/// the copier's contract is "preserve where the filesystem supports it".
pub(crate) fn preserve_mtime(src_metadata: &fs::Metadata, dst: &Path) {
    let mtime = filetime::FileTime::from_last_modification_time(src_metadata);
    if let Err(e) = filetime::set_file_mtime(dst, mtime) {
        trace!("Could not set mtime on {:?}: {}", dst, e);
    }
}

/// Set Unix permissions
#[cfg(unix)]
pub(crate) fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Set permissions (non-Unix: only the read-only bit can be expressed)
#[cfg(not(unix))]
pub(crate) fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

/// Replace path-unsafe characters in a directory-name component
///
/// Used for the version suffix of snapshot directory names: `/`, `\` and
/// spaces become underscores.
pub(crate) fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Format bytes in human-readable form
///
/// Binary units: values below 1024 bytes print as whole numbers, larger
/// values with two decimal places.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("v4.3.1-1"), "v4.3.1-1");
        assert_eq!(sanitize_component("beta 2/rc\\1"), "beta_2_rc_1");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
    }

    #[test]
    fn test_missing_tool_maps_to_tool_missing() {
        let err = run("definitely-not-a-real-tool-xyz", &[]).unwrap_err();
        assert!(matches!(err, OnionSdError::ToolMissing(_)));
    }
}
