//! Backup catalog: snapshot creation, listing and sizing
//!
//! A snapshot is a timestamped directory under the backup root holding a
//! copy of the selected categories plus a `backup_info.json` sidecar. The
//! sidecar records provenance (card state, firmware version, description)
//! and the total file count; it is written once on success and never
//! mutated afterwards.
//!
//! Failure semantics follow the card-first philosophy: once the bulk data
//! is safely on disk, a sidecar write failure only logs a warning, while a
//! copy failure aborts immediately and reports the partially populated
//! snapshot path so the caller can decide what to do with it.

use crate::categories;
use crate::copier;
use crate::detect;
use crate::error::{OnionSdError, Result};
use crate::types::{BackupEntry, BackupReport, CopyProgress, ProgressSink, SdState};
use crate::utils;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Sidecar file name, one per snapshot directory
pub const SIDECAR_NAME: &str = "backup_info.json";

/// Snapshot sidecar document
///
/// Every field carries a `serde` default so consumers tolerate sidecars
/// written by older or newer versions: a missing key reads as its
/// type-appropriate empty value instead of failing the listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupInfo {
    /// ISO-8601 completion timestamp (local time)
    #[serde(default)]
    pub date: String,
    /// Categories actually captured
    #[serde(default)]
    pub categories: Vec<String>,
    /// Caller-supplied free-text description
    #[serde(default)]
    pub description: String,
    /// Card state detected at creation time
    #[serde(default)]
    pub state: SdState,
    /// Firmware version detected at creation time (possibly empty)
    #[serde(default)]
    pub version: String,
    /// Files copied across all captured categories
    #[serde(default)]
    pub total_files: usize,
}

/// Back up selected categories from the SD card
///
/// Creates a timestamped snapshot directory under `backup_dir` named
/// `YYYYMMDD_HHMMSS_<state>` with the sanitized firmware version appended
/// when one is detected. Validation (mount exists, category keys known,
/// selection non-empty) happens before anything is created on disk.
///
/// The total file count across all requested categories is computed up
/// front so the progress sink sees a stable denominator. Categories whose
/// source directory does not exist are skipped silently and excluded from
/// the recorded category list.
///
/// # Errors
///
/// - [`OnionSdError::MountNotFound`], [`OnionSdError::UnknownCategories`],
///   [`OnionSdError::NoCategoriesSelected`] before any side effect
/// - [`OnionSdError::SnapshotDirectory`] when the snapshot directory cannot
///   be created
/// - [`OnionSdError::BackupAborted`] on a copy failure; the error carries
///   the partial snapshot path and no sidecar is written
pub fn create_backup(
    sd_mount: &Path,
    backup_dir: &Path,
    categories: &[&str],
    description: &str,
    progress: Option<ProgressSink<'_>>,
) -> Result<BackupReport> {
    if !sd_mount.is_dir() {
        return Err(OnionSdError::MountNotFound(sd_mount.to_path_buf()));
    }
    let selected = categories::resolve(categories)?;

    let state = detect::detect_state(sd_mount);
    let version = detect::detect_version(sd_mount);

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut dir_name = format!("{timestamp}_{state}");
    if !version.is_empty() {
        dir_name.push('_');
        dir_name.push_str(&utils::sanitize_component(&version));
    }

    let backup_path = unique_snapshot_path(backup_dir, &dir_name);
    fs::create_dir_all(&backup_path).map_err(|source| OnionSdError::SnapshotDirectory {
        path: backup_path.clone(),
        source,
    })?;

    let total_files: usize = selected
        .iter()
        .map(|cat| copier::count_files(&sd_mount.join(cat.path)))
        .sum();

    let mut noop = |_: &CopyProgress| {};
    let sink: ProgressSink<'_> = match progress {
        Some(s) => s,
        None => &mut noop,
    };

    let mut files_done = 0usize;
    let mut backed_up: Vec<String> = Vec::new();

    for cat in &selected {
        let src_dir = sd_mount.join(cat.path);
        if !src_dir.is_dir() {
            info!(
                "Skipping category '{}': source directory does not exist ({:?})",
                cat.key, src_dir
            );
            continue;
        }
        let dst_dir = backup_path.join(cat.path);

        let copied = copier::copy_tree(
            &src_dir,
            &dst_dir,
            cat.key,
            files_done,
            total_files,
            Some(&mut *sink),
        )
        .map_err(|e| abort_backup(&backup_path, cat.key, e))?;

        files_done += copied;
        backed_up.push(cat.key.to_string());
    }

    let metadata = BackupInfo {
        date: Local::now().to_rfc3339(),
        categories: backed_up.clone(),
        description: description.to_string(),
        state,
        version: version.clone(),
        total_files: files_done,
    };

    let info_path = backup_path.join(SIDECAR_NAME);
    match serde_json::to_string_pretty(&metadata) {
        Ok(json) => {
            if let Err(e) = fs::write(&info_path, json) {
                warn!("Could not write {}: {}", SIDECAR_NAME, e);
            }
        }
        Err(e) => warn!("Could not serialize {}: {}", SIDECAR_NAME, e),
    }

    Ok(BackupReport {
        path: backup_path,
        state,
        version,
        categories: backed_up,
        total_files: files_done,
    })
}

/// List all snapshots found under `backup_dir`, newest first
///
/// Snapshot directories carry a sortable timestamp prefix, so reverse
/// lexicographic name order equals newest-first. Directories without a
/// readable, parseable sidecar are silently skipped.
pub fn list_backups(backup_dir: &Path) -> Vec<BackupEntry> {
    let mut results = Vec::new();
    if !backup_dir.is_dir() {
        return results;
    }

    let mut dirs: Vec<PathBuf> = match fs::read_dir(backup_dir) {
        Ok(iter) => iter
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) => {
            warn!("Could not read backup directory {:?}: {}", backup_dir, e);
            return results;
        }
    };
    dirs.sort();
    dirs.reverse();

    for dir in dirs {
        let info_path = dir.join(SIDECAR_NAME);
        if !info_path.is_file() {
            continue;
        }
        let data = match fs::read_to_string(&info_path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping backup {:?}: {}", dir.file_name(), e);
                continue;
            }
        };
        let info: BackupInfo = match serde_json::from_str(&data) {
            Ok(info) => info,
            Err(e) => {
                warn!("Skipping backup {:?}: {}", dir.file_name(), e);
                continue;
            }
        };

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        results.push(BackupEntry {
            path: dir,
            name,
            date: info.date,
            categories: info.categories,
            description: info.description,
            state: info.state,
            version: info.version,
            total_files: info.total_files,
        });
    }

    results
}

/// Total size in bytes of the given categories within a snapshot
///
/// Categories absent from the snapshot or unrecognized contribute zero, as
/// does any file whose metadata cannot be read.
pub fn get_backup_size(backup_path: &Path, categories: &[&str]) -> u64 {
    categories
        .iter()
        .filter_map(|key| categories::find(key))
        .map(|cat| copier::dir_size(&backup_path.join(cat.path)))
        .sum()
}

/// Pick a snapshot directory name that does not collide
///
/// Names are unique per second; two backups triggered within the same
/// second for the same state/version get `_2`, `_3`, ... suffixes rather
/// than merging into one directory.
fn unique_snapshot_path(backup_dir: &Path, base_name: &str) -> PathBuf {
    let candidate = backup_dir.join(base_name);
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 2u32;
    loop {
        let candidate = backup_dir.join(format!("{base_name}_{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn abort_backup(backup_path: &Path, category: &str, err: OnionSdError) -> OnionSdError {
    match err {
        OnionSdError::Io(source) => OnionSdError::BackupAborted {
            path: backup_path.to_path_buf(),
            category: category.to_string(),
            source,
        },
        other => other,
    }
}
