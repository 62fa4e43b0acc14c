//! SD card state detection
//!
//! Classifies a mounted card by the marker directories at its root and
//! probes the installed Onion version. Two classifications exist:
//!
//! - [`detect_state`] is the snapshot-labelling probe used by the backup
//!   catalog. It only checks markers, so it never reports
//!   [`SdState::Empty`].
//! - [`classify_layout`] is the fuller probe used by device workflows. It
//!   filters out OS artefacts (`System Volume Information` and friends) and
//!   reports [`SdState::Empty`] when nothing meaningful remains.
//!
//! Both probes and the version reader are infallible by design: unreadable
//! or missing paths degrade to `Unknown` / empty-string results.

use crate::types::SdState;
use std::fs;
use std::path::Path;

/// Marker directory for an Onion OS install (its update staging area)
const ONION_MARKER: &str = ".tmp_update";

/// Marker directory for the stock vendor firmware
const STOCK_MARKER: &str = "miyoo";

/// Entries that do not count as real card content
const IGNORED_ARTEFACTS: &[&str] = &[
    "System Volume Information",
    ".Trash-1000",
    "$RECYCLE.BIN",
    ".fseventsd",
    ".Spotlight-V100",
];

/// Candidate version-file locations, probed in order
const VERSION_CANDIDATES: &[&str] = &[
    ".tmp_update/onionVersion/version.txt",
    ".tmp_update/config/version.txt",
    ".tmp_update/version.txt",
];

/// Classify a mount root for snapshot labelling
///
/// Presence of the Onion update staging directory wins; otherwise the stock
/// application directory marks a stock card; anything else is `Unknown`.
pub fn detect_state(mount: &Path) -> SdState {
    if mount.join(ONION_MARKER).is_dir() {
        return SdState::Onion;
    }
    if mount.join(STOCK_MARKER).join("app").is_dir() || mount.join(STOCK_MARKER).is_dir() {
        return SdState::Stock;
    }
    SdState::Unknown
}

/// Classify a mount root's full layout, including emptiness
///
/// Unlike [`detect_state`] this lists the root's entries, discards common
/// hidden/system artefacts, and reports [`SdState::Empty`] when nothing
/// meaningful remains. A missing or unreadable mount is `Unknown`.
pub fn classify_layout(mount: &Path) -> SdState {
    if !mount.is_dir() {
        return SdState::Unknown;
    }
    let entries = match fs::read_dir(mount) {
        Ok(iter) => iter
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect::<Vec<String>>(),
        Err(_) => return SdState::Unknown,
    };

    let meaningful = entries
        .iter()
        .any(|name| !IGNORED_ARTEFACTS.contains(&name.as_str()));
    if !meaningful {
        return SdState::Empty;
    }

    if entries.iter().any(|name| name == ONION_MARKER) {
        return SdState::Onion;
    }
    if entries.iter().any(|name| name == STOCK_MARKER) {
        return SdState::Stock;
    }
    SdState::Unknown
}

/// Read the installed Onion version string from the card
///
/// Probes the known candidate locations under the Onion marker directory
/// and returns the first non-empty trimmed value. Returns an empty string
/// when no candidate exists or is readable; this probe never fails.
pub fn detect_version(mount: &Path) -> String {
    for candidate in VERSION_CANDIDATES {
        let path = mount.join(candidate);
        if !path.is_file() {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path) {
            let version = content.trim();
            if !version.is_empty() {
                return version.to_string();
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_state_markers() {
        let root = TempDir::new().unwrap();
        assert_eq!(detect_state(root.path()), SdState::Unknown);

        fs::create_dir(root.path().join("miyoo")).unwrap();
        assert_eq!(detect_state(root.path()), SdState::Stock);

        // Onion marker wins over the stock marker.
        fs::create_dir(root.path().join(".tmp_update")).unwrap();
        assert_eq!(detect_state(root.path()), SdState::Onion);
    }

    #[test]
    fn test_classify_layout_empty_and_artefacts() {
        let root = TempDir::new().unwrap();
        assert_eq!(classify_layout(root.path()), SdState::Empty);

        fs::create_dir(root.path().join("System Volume Information")).unwrap();
        fs::create_dir(root.path().join(".Trash-1000")).unwrap();
        assert_eq!(classify_layout(root.path()), SdState::Empty);

        fs::write(root.path().join("random.bin"), "x").unwrap();
        assert_eq!(classify_layout(root.path()), SdState::Unknown);
    }

    #[test]
    fn test_classify_layout_missing_mount() {
        assert_eq!(classify_layout(Path::new("/no/such/mount")), SdState::Unknown);
    }

    #[test]
    fn test_detect_version_first_nonempty_candidate() {
        let root = TempDir::new().unwrap();
        assert_eq!(detect_version(root.path()), "");

        let cfg = root.path().join(".tmp_update/config");
        fs::create_dir_all(&cfg).unwrap();
        fs::write(cfg.join("version.txt"), "4.2.0\n").unwrap();
        assert_eq!(detect_version(root.path()), "4.2.0");

        // The onionVersion location is probed first and takes precedence.
        let primary = root.path().join(".tmp_update/onionVersion");
        fs::create_dir_all(&primary).unwrap();
        fs::write(primary.join("version.txt"), "  4.3.1-1  \n").unwrap();
        assert_eq!(detect_version(root.path()), "4.3.1-1");
    }

    #[test]
    fn test_detect_version_skips_empty_files() {
        let root = TempDir::new().unwrap();
        let primary = root.path().join(".tmp_update/onionVersion");
        fs::create_dir_all(&primary).unwrap();
        fs::write(primary.join("version.txt"), "   \n").unwrap();
        fs::write(root.path().join(".tmp_update/version.txt"), "4.0.0").unwrap();
        assert_eq!(detect_version(root.path()), "4.0.0");
    }
}
