//! Emulator and application package management
//!
//! Onion ships optional emulators and apps as staged directory trees under
//! `App/PackageManager/data/{Emu,RApp,App}/` on the card. Installing a
//! package copies its tree to the card root; uninstalling removes that
//! copy. ROM directories are never touched by uninstallation.

use crate::copier;
use crate::error::{OnionSdError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Staging area for package trees, relative to the SD card root
pub const PACKAGE_DATA_DIR: &str = "App/PackageManager/data";

/// The three package kinds Onion recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    /// Core emulators
    Emu,
    /// RetroArch-based apps
    RApp,
    /// Standalone applications
    App,
}

impl PackageKind {
    /// All kinds, in staging-directory scan order
    pub const ALL: &'static [PackageKind] = &[PackageKind::Emu, PackageKind::RApp, PackageKind::App];

    /// Directory name under the staging area and the card root
    pub fn dir_name(&self) -> &'static str {
        match self {
            PackageKind::Emu => "Emu",
            PackageKind::RApp => "RApp",
            PackageKind::App => "App",
        }
    }

    /// Canonical short name used in external APIs
    pub fn short_name(&self) -> &'static str {
        match self {
            PackageKind::Emu => "emu",
            PackageKind::RApp => "rapp",
            PackageKind::App => "app",
        }
    }

    /// Parse a short name (case-insensitive)
    pub fn from_short(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "emu" => Ok(PackageKind::Emu),
            "rapp" => Ok(PackageKind::RApp),
            "app" => Ok(PackageKind::App),
            _ => Err(OnionSdError::UnknownPackageKind(value.to_string())),
        }
    }
}

/// Status of one staged package
#[derive(Debug, Clone)]
pub struct PackageStatus {
    /// Package directory name (e.g. `GBA`)
    pub name: String,
    /// Which kind of package it is
    pub kind: PackageKind,
    /// Whether the package is installed at the card root
    pub installed: bool,
    /// Whether `Roms/<name>` contains at least one non-hidden file
    pub has_roms: bool,
}

fn rom_dir_for(sd_mount: &Path, package_name: &str) -> PathBuf {
    sd_mount.join("Roms").join(package_name)
}

/// Whether the ROM folder for a package contains any real files
///
/// Only regular files count, and hidden files (leading `.`) are skipped
/// since they are typically metadata.
fn has_roms(sd_mount: &Path, package_name: &str) -> bool {
    let rom_dir = rom_dir_for(sd_mount, package_name);
    let Ok(entries) = fs::read_dir(&rom_dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|entry| {
        entry.path().is_file()
            && !entry.file_name().to_string_lossy().starts_with('.')
    })
}

fn is_installed(sd_mount: &Path, package_name: &str, kind: PackageKind) -> bool {
    sd_mount.join(kind.dir_name()).join(package_name).is_dir()
}

/// Scan the staging area for available packages
///
/// Looks in the `Emu`, `RApp` and `App` staging subdirectories. Unreadable
/// directories are warned about and skipped; the scan itself never fails.
pub fn scan_packages(sd_mount: &Path) -> Vec<PackageStatus> {
    let data_root = sd_mount.join(PACKAGE_DATA_DIR);
    let mut packages = Vec::new();

    for &kind in PackageKind::ALL {
        let type_path = data_root.join(kind.dir_name());
        let entries = match fs::read_dir(&type_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Package type directory does not exist: {:?}", type_path);
                continue;
            }
            Err(e) => {
                warn!("Permission denied reading package directory {:?}: {}", type_path, e);
                continue;
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        for name in names {
            let installed = is_installed(sd_mount, &name, kind);
            let roms = has_roms(sd_mount, &name);
            packages.push(PackageStatus {
                name,
                kind,
                installed,
                has_roms: roms,
            });
        }
    }

    info!("Scanned {} packages", packages.len());
    packages
}

/// Install a package by copying its staged tree to the card root
///
/// # Errors
///
/// - [`OnionSdError::PackageNotStaged`] when the staged source is missing
/// - [`OnionSdError::PackageAlreadyInstalled`] when the destination exists
///   (uninstall first to reinstall)
pub fn install_package(sd_mount: &Path, package_name: &str, kind: PackageKind) -> Result<()> {
    let source = sd_mount
        .join(PACKAGE_DATA_DIR)
        .join(kind.dir_name())
        .join(package_name);
    let destination = sd_mount.join(kind.dir_name()).join(package_name);

    if !source.is_dir() {
        return Err(OnionSdError::PackageNotStaged {
            name: package_name.to_string(),
            path: source,
        });
    }
    if destination.is_dir() {
        return Err(OnionSdError::PackageAlreadyInstalled {
            name: package_name.to_string(),
            path: destination,
        });
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    copier::copy_tree(&source, &destination, package_name, 0, 0, None)?;
    info!(
        "Installed package {} ({}): {:?} -> {:?}",
        package_name,
        kind.short_name(),
        source,
        destination
    );
    Ok(())
}

/// Remove a package directory from the card root
///
/// Only the installed copy under the kind directory is deleted; staged
/// data and ROM files stay in place.
pub fn uninstall_package(sd_mount: &Path, package_name: &str, kind: PackageKind) -> Result<()> {
    let target = sd_mount.join(kind.dir_name()).join(package_name);

    if !target.is_dir() {
        return Err(OnionSdError::PackageNotInstalled {
            name: package_name.to_string(),
            path: target,
        });
    }

    fs::remove_dir_all(&target)?;
    info!(
        "Uninstalled package {} ({}): removed {:?}",
        package_name,
        kind.short_name(),
        target
    );
    Ok(())
}

/// Install every emulator whose ROM folder contains files
///
/// Only `emu` packages qualify; already-installed ones and those without
/// ROMs are skipped. Individual install failures are warned about and do
/// not stop the sweep. Returns the names that were installed.
pub fn auto_install(sd_mount: &Path) -> Vec<String> {
    let mut installed_names = Vec::new();

    for pkg in scan_packages(sd_mount) {
        if pkg.kind != PackageKind::Emu || pkg.installed || !pkg.has_roms {
            continue;
        }
        match install_package(sd_mount, &pkg.name, PackageKind::Emu) {
            Ok(()) => {
                info!("Auto-installed: {}", pkg.name);
                installed_names.push(pkg.name);
            }
            Err(e) => warn!("Auto-install failed for {}: {}", pkg.name, e),
        }
    }

    info!(
        "Auto-install complete: {} packages installed",
        installed_names.len()
    );
    installed_names
}
