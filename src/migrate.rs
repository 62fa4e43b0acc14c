//! Stock-to-Onion migration
//!
//! One-shot remapping of data from a stock vendor card onto an Onion card.
//! Save data moves between layouts (`RetroArch/.retroarch/{saves,states}`
//! on stock vs `Saves/CurrentProfile/{saves,states}` on Onion); ROMs, BIOS
//! and box art keep the same relative path on both.

use crate::copier;
use crate::error::{OnionSdError, Result};
use crate::types::{CopyProgress, MigrationReport, ProgressSink};
use std::path::{Path, PathBuf};

/// Save-data directories that move between the two layouts
const SAVE_MAPPINGS: &[(&str, &str)] = &[
    ("RetroArch/.retroarch/saves", "Saves/CurrentProfile/saves"),
    ("RetroArch/.retroarch/states", "Saves/CurrentProfile/states"),
];

/// Directories with identical relative paths on both layouts
const SHARED_DIRS: &[&str] = &["Roms", "BIOS", "Imgs"];

struct CopyJob {
    src: PathBuf,
    dst: PathBuf,
    label: String,
}

/// Migrate data from a stock card to an Onion card
///
/// Builds a fixed job list - the two save remappings followed by the three
/// shared directories - keeping only jobs whose stock-side source exists.
/// An empty job list is a success ("nothing to migrate"), not an error,
/// and creates no directories on the Onion card. Otherwise the combined
/// file total is computed up front and the jobs run in fixed order, each
/// reporting progress under its descriptive label.
///
/// # Errors
///
/// - [`OnionSdError::MountNotFound`] when either mount is missing
/// - [`OnionSdError::Copy`] on the first copy failure; completed jobs'
///   files remain on the Onion card
pub fn migrate_stock_to_onion(
    stock_mount: &Path,
    onion_mount: &Path,
    progress: Option<ProgressSink<'_>>,
) -> Result<MigrationReport> {
    if !stock_mount.is_dir() {
        return Err(OnionSdError::MountNotFound(stock_mount.to_path_buf()));
    }
    if !onion_mount.is_dir() {
        return Err(OnionSdError::MountNotFound(onion_mount.to_path_buf()));
    }

    let mut jobs: Vec<CopyJob> = Vec::new();

    for (stock_rel, onion_rel) in SAVE_MAPPINGS {
        let src = stock_mount.join(stock_rel);
        if src.is_dir() {
            jobs.push(CopyJob {
                src,
                dst: onion_mount.join(onion_rel),
                label: format!("saves ({stock_rel})"),
            });
        }
    }

    for dirname in SHARED_DIRS {
        let src = stock_mount.join(dirname);
        if src.is_dir() {
            jobs.push(CopyJob {
                src,
                dst: onion_mount.join(dirname),
                label: dirname.to_string(),
            });
        }
    }

    if jobs.is_empty() {
        return Ok(MigrationReport {
            jobs: vec![],
            total_files: 0,
        });
    }

    let total_files: usize = jobs.iter().map(|j| copier::count_files(&j.src)).sum();

    let mut noop = |_: &CopyProgress| {};
    let sink: ProgressSink<'_> = match progress {
        Some(s) => s,
        None => &mut noop,
    };

    let mut files_done = 0usize;
    for job in &jobs {
        let copied = copier::copy_tree(
            &job.src,
            &job.dst,
            &job.label,
            files_done,
            total_files,
            Some(&mut *sink),
        )
        .map_err(|e| wrap_copy_error(&job.label, e))?;
        files_done += copied;
    }

    Ok(MigrationReport {
        jobs: jobs.into_iter().map(|j| j.label).collect(),
        total_files: files_done,
    })
}

fn wrap_copy_error(label: &str, err: OnionSdError) -> OnionSdError {
    match err {
        OnionSdError::Io(source) => OnionSdError::Copy {
            category: label.to_string(),
            source,
        },
        other => other,
    }
}
