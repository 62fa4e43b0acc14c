//! Onion OS release download and installation
//!
//! Talks to the GitHub releases API for the Onion firmware (and for the
//! companion desktop app's update check), downloads release zips with
//! chunked progress, and extracts them onto a mounted SD card with a
//! path-traversal guard.

use crate::error::{OnionSdError, Result};
use crate::types::{AppUpdate, DownloadedRelease, ReleaseCatalog, ReleaseInfo};
use crate::utils;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// GitHub releases endpoint for the Onion firmware
pub const ONION_RELEASES_URL: &str = "https://api.github.com/repos/OnionUI/Onion/releases";

/// GitHub releases endpoint for the companion desktop app
pub const APP_RELEASES_URL: &str =
    "https://api.github.com/repos/schmurtzm/Onion-Desktop-Tools/releases";

/// Network timeout for API calls and downloads
const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Read size for chunked downloads and extraction
const CHUNK_SIZE: usize = 64 * 1024;

/// Directories expected on the card after a successful extraction
pub const EXPECTED_DIRS: &[&str] = &[".tmp_update", "BIOS", "RetroArch", "miyoo", "Themes"];

/// Sink invoked after each downloaded chunk: (bytes so far, total if known)
pub type DownloadSink<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Sink invoked per extracted archive entry: (entry name, index, total)
pub type ExtractSink<'a> = &'a mut dyn FnMut(&str, usize, usize);

// GitHub API types for deserialization
#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    #[serde(default)]
    name: String,
    #[serde(default)]
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

fn client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .user_agent("onionsd")
        .timeout(NETWORK_TIMEOUT)
        .build()?)
}

fn github_get(url: &str) -> Result<Vec<GithubRelease>> {
    let releases = client()?
        .get(url)
        .header("Accept", "application/vnd.github+json")
        .send()?
        .error_for_status()?
        .json()?;
    Ok(releases)
}

fn zip_asset(release: &GithubRelease) -> Option<&GithubAsset> {
    release
        .assets
        .iter()
        .find(|a| a.name.to_lowercase().ends_with(".zip"))
}

/// Query the Onion OS GitHub releases, split into stable and beta
///
/// Releases without a downloadable `.zip` asset are skipped.
pub fn fetch_releases() -> Result<ReleaseCatalog> {
    let mut catalog = ReleaseCatalog::default();

    for release in github_get(ONION_RELEASES_URL)? {
        let Some(asset) = zip_asset(&release) else {
            continue;
        };
        let entry = ReleaseInfo {
            tag_name: release.tag_name.clone(),
            name: release.name.clone().unwrap_or_default(),
            prerelease: release.prerelease,
            published_at: release.published_at.clone().unwrap_or_default(),
            download_url: asset.browser_download_url.clone(),
            size: asset.size,
        };
        if entry.prerelease {
            catalog.beta.push(entry);
        } else {
            catalog.stable.push(entry);
        }
    }

    Ok(catalog)
}

/// Download a release zip from `url` into `dest_dir`
///
/// The file name is taken from the URL's last path segment. The body is
/// streamed in 64 KiB chunks; after each chunk the sink (when supplied)
/// receives the byte count so far and the total from `Content-Length`,
/// which may be unknown.
pub fn download_release(
    url: &str,
    dest_dir: &Path,
    mut progress: Option<DownloadSink<'_>>,
) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;

    let filename = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("onion_release.zip");
    let dest_path = dest_dir.join(filename);

    let response = client()?
        .get(url)
        .header("Accept", "application/vnd.github+json")
        .send()?
        .error_for_status()?;
    let total_bytes = response.content_length();

    let mut reader = response;
    let mut file = File::create(&dest_path)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        if let Some(sink) = progress.as_mut() {
            sink(downloaded, total_bytes);
        }
    }

    info!("Downloaded {:?} ({} bytes)", dest_path, downloaded);
    Ok(dest_path)
}

/// List already-downloaded release zips, newest-modified first
///
/// Returns an empty list when the directory does not exist.
pub fn downloaded_releases(downloads_dir: &Path) -> Vec<DownloadedRelease> {
    let mut results: Vec<DownloadedRelease> = Vec::new();
    let Ok(entries) = fs::read_dir(downloads_dir) else {
        return results;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_zip = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if !path.is_file() || !is_zip {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        results.push(DownloadedRelease {
            filename: entry.file_name().to_string_lossy().into_owned(),
            path,
            size: metadata.len(),
            modified,
        });
    }

    results.sort_by(|a, b| b.modified.cmp(&a.modified));
    results
}

/// Total uncompressed size in bytes of a zip archive's entries
pub fn required_space(zip_path: &Path) -> Result<u64> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut total = 0u64;
    for i in 0..archive.len() {
        total += archive.by_index_raw(i)?.size();
    }
    Ok(total)
}

/// Extract an Onion release zip onto a mounted SD card
///
/// Hidden entries (such as `.tmp_update`) are preserved. Entries whose
/// resolved path would escape the mount are skipped with a warning rather
/// than failing the extraction. Unix permission bits stored in the archive
/// are restored best-effort - FAT32 typically refuses, which is fine.
///
/// The sink (when supplied) receives each entry's name, its index and the
/// total entry count.
pub fn extract_to_sd(
    zip_path: &Path,
    sd_mount: &Path,
    mut progress: Option<ExtractSink<'_>>,
) -> Result<()> {
    if !zip_path.is_file() {
        return Err(OnionSdError::ZipNotFound(zip_path.to_path_buf()));
    }
    if !sd_mount.is_dir() {
        return Err(OnionSdError::MountNotFound(sd_mount.to_path_buf()));
    }

    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let total_files = archive.len();

    for index in 0..total_files {
        let mut entry = archive.by_index(index)?;

        // enclosed_name rejects absolute paths and any `..` escape.
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping potentially unsafe path: {}", entry.name());
            continue;
        };
        let target = sd_mount.join(relative);

        if let Some(sink) = progress.as_mut() {
            sink(entry.name(), index, total_files);
        }

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&target)?;
        std::io::copy(&mut entry, &mut outfile)?;

        if let Some(mode) = entry.unix_mode() {
            if mode != 0 {
                if let Err(e) = utils::set_permissions(&target, mode) {
                    tracing::trace!("Could not set mode on {:?}: {}", target, e);
                }
            }
        }
    }

    Ok(())
}

/// Check that the expected Onion directories exist after extraction
///
/// Returns the missing directory names; an empty list means the install
/// looks complete.
pub fn verify_extraction(sd_mount: &Path) -> Vec<String> {
    EXPECTED_DIRS
        .iter()
        .filter(|d| !sd_mount.join(d).is_dir())
        .map(|d| d.to_string())
        .collect()
}

/// Check whether a newer version of the desktop app exists
///
/// Compares the newest non-draft release tag against `current_version`
/// numerically. An update check must never crash the application, so any
/// failure is logged and reported as "no update".
pub fn check_app_update(current_version: &str) -> Option<AppUpdate> {
    let releases = match github_get(APP_RELEASES_URL) {
        Ok(releases) => releases,
        Err(e) => {
            warn!("App update check failed: {}", e);
            return None;
        }
    };

    let latest = releases.iter().find(|r| !r.draft)?;
    if parse_version(&latest.tag_name) <= parse_version(current_version) {
        return None;
    }

    let download_url = zip_asset(latest)
        .map(|a| a.browser_download_url.clone())
        .unwrap_or_else(|| latest.html_url.clone());

    Some(AppUpdate {
        version: latest.tag_name.clone(),
        download_url,
    })
}

/// Extract a comparable version from a tag string like `v4.3.1`
///
/// The first run of dot-separated digits is parsed; tags without digits
/// compare as `[0]`.
fn parse_version(tag: &str) -> Vec<u32> {
    let start = match tag.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => idx,
        None => return vec![0],
    };
    let run: String = tag[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let parts: Vec<u32> = run
        .split('.')
        .filter_map(|p| p.parse::<u32>().ok())
        .collect();
    if parts.is_empty() {
        vec![0]
    } else {
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut buffer));
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, contents) in entries {
                if name.ends_with('/') {
                    writer.add_directory(*name, options).unwrap();
                } else {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(contents).unwrap();
                }
            }
            writer.finish().unwrap();
        }
        buffer
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v4.3.1"), vec![4, 3, 1]);
        assert_eq!(parse_version("4.2"), vec![4, 2]);
        assert_eq!(parse_version("release"), vec![0]);
        assert!(parse_version("v4.3.1") > parse_version("v4.3"));
        assert!(parse_version("v4.10.0") > parse_version("v4.9.9"));
    }

    #[test]
    fn test_extract_skips_traversal_entries() {
        let dir = TempDir::new().unwrap();
        let zip_bytes = build_zip(&[
            (".tmp_update/", b"" as &[u8]),
            (".tmp_update/updater", b"bin"),
            ("../escape.txt", b"nope"),
            ("BIOS/bios.bin", b"data"),
        ]);
        let zip_path = dir.path().join("release.zip");
        fs::write(&zip_path, zip_bytes).unwrap();

        let mount = TempDir::new().unwrap();
        extract_to_sd(&zip_path, mount.path(), None).unwrap();

        assert!(mount.path().join(".tmp_update/updater").is_file());
        assert!(mount.path().join("BIOS/bios.bin").is_file());
        assert!(!mount.path().join("../escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_extract_reports_progress_per_entry() {
        let dir = TempDir::new().unwrap();
        let zip_bytes = build_zip(&[("a.txt", b"a" as &[u8]), ("b.txt", b"b")]);
        let zip_path = dir.path().join("release.zip");
        fs::write(&zip_path, zip_bytes).unwrap();

        let mount = TempDir::new().unwrap();
        let mut seen: Vec<(String, usize, usize)> = Vec::new();
        let mut sink = |name: &str, index: usize, total: usize| {
            seen.push((name.to_string(), index, total));
        };
        extract_to_sd(&zip_path, mount.path(), Some(&mut sink)).unwrap();
        assert_eq!(
            seen,
            vec![("a.txt".to_string(), 0, 2), ("b.txt".to_string(), 1, 2)]
        );
    }

    #[test]
    fn test_required_space_sums_uncompressed_sizes() {
        let dir = TempDir::new().unwrap();
        let zip_bytes = build_zip(&[("a.bin", &[0u8; 100] as &[u8]), ("b.bin", &[0u8; 28])]);
        let zip_path = dir.path().join("release.zip");
        fs::write(&zip_path, zip_bytes).unwrap();
        assert_eq!(required_space(&zip_path).unwrap(), 128);
    }

    #[test]
    fn test_verify_extraction_reports_missing_dirs() {
        let mount = TempDir::new().unwrap();
        for d in [".tmp_update", "BIOS", "RetroArch"] {
            fs::create_dir(mount.path().join(d)).unwrap();
        }
        let missing = verify_extraction(mount.path());
        assert_eq!(missing, vec!["miyoo".to_string(), "Themes".to_string()]);
    }

    #[test]
    fn test_downloaded_releases_missing_dir_is_empty() {
        assert!(downloaded_releases(Path::new("/no/such/dir")).is_empty());
    }
}
