//! Recursive, metadata-preserving directory tree copying
//!
//! The copier underlies every backup, restore, migration and package
//! install in the crate. Files are visited in a deterministic full-tree
//! path order so progress reporting and tests are reproducible, and each
//! file's permission bits and modification time are carried over where the
//! destination filesystem supports them.
//!
//! A missing source directory is not an error: the call is a no-op that
//! reports zero files copied. Callers rely on this to skip categories that
//! do not exist on a particular card.

use crate::error::{OnionSdError, Result};
use crate::types::{CopyProgress, ProgressSink};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively count regular files inside `directory`
///
/// Returns 0 when the directory does not exist or is not a directory.
/// Unreadable entries are skipped rather than counted or reported; the
/// result feeds progress totals, not correctness checks.
pub fn count_files(directory: &Path) -> usize {
    if !directory.is_dir() {
        return 0;
    }
    WalkDir::new(directory)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Copy a directory tree from `src` to `dst` with per-file progress
///
/// Every regular file beneath `src` is copied to the equivalent relative
/// position beneath `dst`, creating intermediate directories as needed.
/// Files are copied in lexicographic full-path order. After each file the
/// progress sink (when supplied) receives the `category` label, the file's
/// path relative to `src`, and running counts offset by `files_done` /
/// bounded by `total_files` - the caller threads these through a
/// multi-category operation so one sink can drive a single progress bar.
///
/// # Returns
///
/// The number of files copied **during this call only**.
///
/// # Errors
///
/// Any underlying I/O failure (permission denied, disk full, unreadable
/// entry) aborts the call with [`OnionSdError::Io`]. No cleanup is
/// attempted; files already copied remain at the destination.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    category: &str,
    files_done: usize,
    total_files: usize,
    mut progress: Option<ProgressSink<'_>>,
) -> Result<usize> {
    if !src.is_dir() {
        return Ok(0);
    }

    fs::create_dir_all(dst)?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(walk_error_to_io)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut copied = 0;
    for file in &files {
        let relative = file.strip_prefix(src).map_err(|_| {
            OnionSdError::internal(format!("path {:?} is not under {:?}", file, src))
        })?;
        let dest = dst.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        // fs::copy carries the permission bits; the mtime needs a second pass.
        fs::copy(file, &dest)?;
        let metadata = fs::metadata(file)?;
        utils::preserve_mtime(&metadata, &dest);
        copied += 1;

        if let Some(sink) = progress.as_mut() {
            sink(&CopyProgress {
                category: category.to_string(),
                file: relative.to_path_buf(),
                completed: files_done + copied,
                total: total_files,
            });
        }
    }

    Ok(copied)
}

/// Sum the on-disk sizes of all regular files beneath `dir`
///
/// Missing directories contribute zero, and so does any file whose
/// metadata cannot be read.
pub(crate) fn dir_size(dir: &Path) -> u64 {
    if !dir.is_dir() {
        return 0;
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn walk_error_to_io(e: walkdir::Error) -> OnionSdError {
    let msg = e.to_string();
    OnionSdError::Io(
        e.into_io_error()
            .unwrap_or_else(|| std::io::Error::other(msg)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_tree(root: &Path) {
        fs::create_dir_all(root.join("sub/deep")).unwrap();
        fs::write(root.join("b.txt"), "bee").unwrap();
        fs::write(root.join("a.txt"), "ay").unwrap();
        fs::write(root.join("sub/deep/c.bin"), [0u8; 16]).unwrap();
    }

    #[test]
    fn test_missing_source_is_noop() {
        let dst = TempDir::new().unwrap();
        let copied = copy_tree(
            Path::new("/no/such/source"),
            &dst.path().join("out"),
            "",
            0,
            0,
            None,
        )
        .unwrap();
        assert_eq!(copied, 0);
        assert!(!dst.path().join("out").exists());
    }

    #[test]
    fn test_copies_content_and_relative_paths() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        seed_tree(src.path());

        let copied = copy_tree(src.path(), dst.path(), "", 0, 0, None).unwrap();
        assert_eq!(copied, 3);
        assert_eq!(fs::read_to_string(dst.path().join("a.txt")).unwrap(), "ay");
        assert_eq!(
            fs::read(dst.path().join("sub/deep/c.bin")).unwrap(),
            [0u8; 16]
        );
    }

    #[test]
    fn test_progress_events_are_ordered_and_offset() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        seed_tree(src.path());

        let mut events: Vec<(String, PathBuf, usize, usize)> = Vec::new();
        let mut sink = |p: &CopyProgress| {
            events.push((p.category.clone(), p.file.clone(), p.completed, p.total));
        };
        let copied = copy_tree(src.path(), dst.path(), "saves", 5, 8, Some(&mut sink)).unwrap();
        assert_eq!(copied, 3);

        let files: Vec<&PathBuf> = events.iter().map(|(_, f, _, _)| f).collect();
        assert_eq!(
            files,
            vec![
                &PathBuf::from("a.txt"),
                &PathBuf::from("b.txt"),
                &PathBuf::from("sub/deep/c.bin"),
            ]
        );
        assert_eq!(events[0].2, 6);
        assert_eq!(events[2].2, 8);
        assert!(events.iter().all(|(c, _, _, t)| c == "saves" && *t == 8));
    }

    #[test]
    fn test_count_files() {
        let src = TempDir::new().unwrap();
        seed_tree(src.path());
        assert_eq!(count_files(src.path()), 3);
        assert_eq!(count_files(Path::new("/no/such/dir")), 0);
    }

    #[test]
    fn test_dir_size_sums_file_lengths() {
        let src = TempDir::new().unwrap();
        seed_tree(src.path());
        assert_eq!(dir_size(src.path()), 3 + 2 + 16);
        assert_eq!(dir_size(Path::new("/no/such/dir")), 0);
    }
}
