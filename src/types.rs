//! Core data types shared across the onionsd library
//!
//! This module contains the data structures used by more than one
//! component:
//!
//! - **Card state**: [`SdState`] - what firmware layout a mounted card holds
//! - **Progress**: [`CopyProgress`] - per-file events emitted during copies
//! - **Operation results**: [`BackupReport`], [`RestoreReport`],
//!   [`MigrationReport`] - what a completed operation did
//! - **Catalog records**: [`BackupEntry`] - one row of a backup listing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a mounted SD card's contents
///
/// Determined by the presence of marker directories at the card root; see
/// [`crate::detect`]. Serialized in lowercase inside snapshot sidecars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdState {
    /// Onion OS is installed (`.tmp_update` present)
    Onion,
    /// Stock vendor firmware (`miyoo` present, no `.tmp_update`)
    Stock,
    /// Mount point holds no meaningful entries
    Empty,
    /// Contents do not match a known layout
    #[default]
    Unknown,
}

impl SdState {
    /// Lowercase string form, as used in snapshot directory names
    pub fn as_str(&self) -> &'static str {
        match self {
            SdState::Onion => "onion",
            SdState::Stock => "stock",
            SdState::Empty => "empty",
            SdState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SdState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted after each file copied
///
/// Events are synchronous and ephemeral: the sink is invoked on the calling
/// thread immediately after each file lands, and nothing is persisted. The
/// counts are global across the whole multi-category operation, so a sink
/// can drive a single progress bar without knowing the category split.
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// Logical category (or migration job label) this file belongs to
    pub category: String,
    /// Path of the file just copied, relative to its category source root
    pub file: PathBuf,
    /// Files completed so far across the entire operation
    pub completed: usize,
    /// Total files expected across the entire operation
    pub total: usize,
}

/// Caller-supplied sink for [`CopyProgress`] events
///
/// The sink runs on the same thread as the copy; a slow sink stalls the
/// whole operation.
pub type ProgressSink<'a> = &'a mut dyn FnMut(&CopyProgress);

/// Result of a completed backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    /// Snapshot directory that was created
    pub path: PathBuf,
    /// Card state detected before the copy
    pub state: SdState,
    /// Firmware version detected before the copy (may be empty)
    pub version: String,
    /// Categories actually captured (absent sources are omitted)
    pub categories: Vec<String>,
    /// Files copied across all captured categories
    pub total_files: usize,
}

impl BackupReport {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        format!(
            "Backup completed: {} files in {} categories.",
            self.total_files,
            self.categories.len()
        )
    }
}

/// Result of a completed restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Categories actually restored (those present in the snapshot)
    pub categories: Vec<String>,
    /// Files copied back onto the card
    pub total_files: usize,
}

impl RestoreReport {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        format!(
            "Restore completed: {} files in {} categories.",
            self.total_files,
            self.categories.len()
        )
    }
}

/// Result of a completed stock-to-Onion migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Labels of the jobs that qualified and ran
    pub jobs: Vec<String>,
    /// Files copied across all jobs
    pub total_files: usize,
}

impl MigrationReport {
    /// Whether any recognised data was found on the stock card
    pub fn migrated_anything(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        if self.jobs.is_empty() {
            "Nothing to migrate: no recognised data found on stock SD.".to_string()
        } else {
            format!("Migration completed: {} files copied.", self.total_files)
        }
    }
}

/// One row of a backup listing
///
/// Produced by [`crate::backup::list_backups`] from a snapshot's sidecar.
/// Field values come from the sidecar document; missing keys fall back to
/// type-appropriate defaults rather than failing the listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Snapshot directory path
    pub path: PathBuf,
    /// Directory name (timestamp-prefixed, sortable)
    pub name: String,
    /// ISO-8601 completion timestamp recorded in the sidecar
    pub date: String,
    /// Categories captured in the snapshot
    pub categories: Vec<String>,
    /// Free-text description supplied at creation time
    pub description: String,
    /// Card state at creation time
    pub state: SdState,
    /// Firmware version at creation time (may be empty)
    pub version: String,
    /// Files recorded in the sidecar
    pub total_files: usize,
}

/// A release asset listed by the GitHub API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Git tag (e.g. `v4.3.1`)
    pub tag_name: String,
    /// Release title
    pub name: String,
    /// Whether GitHub marks this release as a prerelease
    pub prerelease: bool,
    /// Publication timestamp as reported by the API
    pub published_at: String,
    /// Direct download URL of the `.zip` asset
    pub download_url: String,
    /// Compressed asset size in bytes
    pub size: u64,
}

/// Fetched releases split by channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseCatalog {
    /// Regular releases
    pub stable: Vec<ReleaseInfo>,
    /// Prereleases
    pub beta: Vec<ReleaseInfo>,
}

/// A release zip already present on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedRelease {
    /// File name of the archive
    pub filename: String,
    /// Absolute path of the archive
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time
    pub modified: DateTime<Utc>,
}

/// An available update for the companion desktop application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppUpdate {
    /// Tag of the newer release
    pub version: String,
    /// Download URL (zip asset when present, release page otherwise)
    pub download_url: String,
}

/// Saved WiFi credentials, read from the host or from the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    /// Network SSID
    pub ssid: String,
    /// Pre-shared key; `None` when no key is stored
    pub psk: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        let json = serde_json::to_string(&SdState::Onion).unwrap();
        assert_eq!(json, "\"onion\"");
        let back: SdState = serde_json::from_str("\"stock\"").unwrap();
        assert_eq!(back, SdState::Stock);
    }

    #[test]
    fn test_migration_summary() {
        let empty = MigrationReport {
            jobs: vec![],
            total_files: 0,
        };
        assert!(!empty.migrated_anything());
        assert!(empty.summary().contains("Nothing to migrate"));

        let done = MigrationReport {
            jobs: vec!["Roms".into()],
            total_files: 3,
        };
        assert_eq!(done.summary(), "Migration completed: 3 files copied.");
    }
}
