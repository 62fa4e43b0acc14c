//! Restore engine: replay a snapshot onto a card
//!
//! The mirror image of [`crate::backup::create_backup`]. A restore reads
//! the snapshot and writes to the target mount; it never modifies the
//! snapshot, and it neither reads nor writes the sidecar - the categories
//! to restore come from the caller (typically via a listing).

use crate::categories;
use crate::copier;
use crate::error::{OnionSdError, Result};
use crate::types::{CopyProgress, ProgressSink, RestoreReport};
use std::path::Path;
use tracing::info;

/// Restore selected categories from a snapshot to the SD card
///
/// Validates both paths and the category selection before touching the
/// filesystem, precomputes the total file count from the snapshot side,
/// then copies each requested category onto the card in caller order.
/// Categories absent from the snapshot are skipped, not failed.
///
/// # Errors
///
/// - [`OnionSdError::BackupNotFound`] / [`OnionSdError::MountNotFound`] /
///   [`OnionSdError::UnknownCategories`] /
///   [`OnionSdError::NoCategoriesSelected`] before any side effect
/// - [`OnionSdError::Copy`] on the first copy failure; files already
///   restored remain on the card
pub fn restore_backup(
    backup_path: &Path,
    sd_mount: &Path,
    categories: &[&str],
    progress: Option<ProgressSink<'_>>,
) -> Result<RestoreReport> {
    if !backup_path.is_dir() {
        return Err(OnionSdError::BackupNotFound(backup_path.to_path_buf()));
    }
    if !sd_mount.is_dir() {
        return Err(OnionSdError::MountNotFound(sd_mount.to_path_buf()));
    }
    let selected = categories::resolve(categories)?;

    let total_files: usize = selected
        .iter()
        .map(|cat| copier::count_files(&backup_path.join(cat.path)))
        .sum();

    let mut noop = |_: &CopyProgress| {};
    let sink: ProgressSink<'_> = match progress {
        Some(s) => s,
        None => &mut noop,
    };

    let mut files_done = 0usize;
    let mut restored: Vec<String> = Vec::new();

    for cat in &selected {
        let src_dir = backup_path.join(cat.path);
        if !src_dir.is_dir() {
            info!(
                "Skipping category '{}': not present in backup ({:?})",
                cat.key, src_dir
            );
            continue;
        }
        let dst_dir = sd_mount.join(cat.path);

        let copied = copier::copy_tree(
            &src_dir,
            &dst_dir,
            cat.key,
            files_done,
            total_files,
            Some(&mut *sink),
        )
        .map_err(|e| wrap_copy_error(cat.key, e))?;

        files_done += copied;
        restored.push(cat.key.to_string());
    }

    Ok(RestoreReport {
        categories: restored,
        total_files: files_done,
    })
}

fn wrap_copy_error(category: &str, err: OnionSdError) -> OnionSdError {
    match err {
        OnionSdError::Io(source) => OnionSdError::Copy {
            category: category.to_string(),
            source,
        },
        other => other,
    }
}
