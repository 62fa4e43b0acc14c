//! Error types for the onionsd library
//!
//! This module defines all error types that can occur during SD card
//! operations. Public operations never panic and never leak raw low-level
//! exceptions: expected failures surface as dedicated variants with
//! descriptive messages, and unexpected I/O problems are wrapped at the
//! operation boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the onionsd library
pub type Result<T> = std::result::Result<T, OnionSdError>;

/// Main error type for all onionsd operations
#[derive(Debug, Error)]
pub enum OnionSdError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors while talking to the GitHub API or downloading assets
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Errors reading or extracting a release zip archive
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// SD card mount point does not exist or is not a directory
    #[error("SD card mount point does not exist: {0:?}")]
    MountNotFound(PathBuf),

    /// Backup snapshot directory does not exist
    #[error("Backup path does not exist: {0:?}")]
    BackupNotFound(PathBuf),

    /// One or more requested category keys are not in the category table
    #[error("Unknown backup categories: {}", .0.join(", "))]
    UnknownCategories(Vec<String>),

    /// The caller passed an empty category list
    #[error("No categories selected")]
    NoCategoriesSelected,

    /// The snapshot directory could not be created
    #[error("Failed to create backup directory {path:?}: {source}")]
    SnapshotDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// A backup aborted mid-copy; the partially populated snapshot remains on disk
    #[error("Backup failed while copying '{category}' (partial snapshot at {path:?}): {source}")]
    BackupAborted {
        /// Path of the partially written snapshot directory
        path: PathBuf,
        /// Category being copied when the failure occurred
        category: String,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// A restore or migration copy failed; already-copied files remain on disk
    #[error("Copy failed for '{category}': {source}")]
    Copy {
        /// Category or job label being copied when the failure occurred
        category: String,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// A system tool exited non-zero
    #[error("{command} failed: {detail}")]
    CommandFailed {
        /// The tool that failed (e.g. `lsblk`, `parted`)
        command: String,
        /// Captured stderr (or stdout when stderr is empty)
        detail: String,
    },

    /// A required system tool is not installed
    #[error("Required tool not found: {0}")]
    ToolMissing(String),

    /// Device-level operation failure (format, eject, mount)
    #[error("Device error: {0}")]
    Device(String),

    /// The configuration definitions document is missing its top-level key
    #[error("'{key}' key not found in configuration document (available: {available:?})")]
    MissingConfigKey {
        /// Key that was expected
        key: String,
        /// Keys actually present in the document
        available: Vec<String>,
    },

    /// Unrecognized package kind string
    #[error("Unknown package type: {0:?}")]
    UnknownPackageKind(String),

    /// Package source directory missing from the staging area
    #[error("Package source not found for '{name}': {path:?}")]
    PackageNotStaged {
        /// Package name
        name: String,
        /// Staging path that was probed
        path: PathBuf,
    },

    /// Package is already installed at the SD card root
    #[error("Package '{name}' already installed at {path:?}")]
    PackageAlreadyInstalled {
        /// Package name
        name: String,
        /// Existing installation path
        path: PathBuf,
    },

    /// Package directory not present at the SD card root
    #[error("Package '{name}' is not installed (directory not found: {path:?})")]
    PackageNotInstalled {
        /// Package name
        name: String,
        /// Installation path that was probed
        path: PathBuf,
    },

    /// WiFi SSID must not be empty
    #[error("SSID cannot be empty")]
    EmptySsid,

    /// Release archive missing from disk
    #[error("Zip file not found: {0:?}")]
    ZipNotFound(PathBuf),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OnionSdError {
    /// Create a device error with a custom message
    pub fn device(msg: impl Into<String>) -> Self {
        OnionSdError::Device(msg.into())
    }

    /// Create a command-failure error from a tool name and its captured output
    pub fn command_failed(command: impl Into<String>, detail: impl Into<String>) -> Self {
        OnionSdError::CommandFailed {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        OnionSdError::Internal(msg.into())
    }

    /// Check whether this error belongs to the fail-fast validation class
    ///
    /// Validation errors are detected before any side effect: nothing was
    /// created or copied, so the operation can simply be retried with
    /// corrected input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OnionSdError::MountNotFound(_)
                | OnionSdError::BackupNotFound(_)
                | OnionSdError::UnknownCategories(_)
                | OnionSdError::NoCategoriesSelected
                | OnionSdError::UnknownPackageKind(_)
                | OnionSdError::PackageNotStaged { .. }
                | OnionSdError::PackageAlreadyInstalled { .. }
                | OnionSdError::PackageNotInstalled { .. }
                | OnionSdError::EmptySsid
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OnionSdError::UnknownCategories(vec!["foo".into(), "bar".into()]);
        assert_eq!(err.to_string(), "Unknown backup categories: foo, bar");
    }

    #[test]
    fn test_validation_classification() {
        assert!(OnionSdError::NoCategoriesSelected.is_validation());
        assert!(OnionSdError::MountNotFound(PathBuf::from("/nope")).is_validation());
        assert!(!OnionSdError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied"
        ))
        .is_validation());
    }

    #[test]
    fn test_backup_aborted_carries_partial_path() {
        let err = OnionSdError::BackupAborted {
            path: PathBuf::from("/backups/20250101_000000_onion"),
            category: "saves".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("saves"));
        assert!(msg.contains("20250101_000000_onion"));
    }
}
