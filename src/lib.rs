//! # onionsd - SD card toolkit for Onion OS handhelds
//!
//! A library for installing and maintaining Onion OS (custom firmware for
//! Miyoo handhelds) on removable SD cards: backing up and restoring user
//! data, migrating from the stock firmware layout, detecting what a card
//! holds, formatting and ejecting the card itself, and downloading and
//! extracting firmware releases.
//!
//! ## Overview
//!
//! The crate is organised around a small set of explicit, synchronous
//! operations. Every operation takes the paths it works on as arguments
//! and returns a typed result; there is no shared state between calls.
//!
//! - **Backups** ([`backup`]): copy selected data categories from a card
//!   into a timestamped snapshot directory with a JSON sidecar.
//! - **Restores** ([`restore`]): replay a snapshot's categories back onto
//!   a card. Snapshots are never modified by a restore.
//! - **Migration** ([`migrate`]): one-shot remap of stock-firmware save
//!   data and shared directories onto an Onion card.
//! - **Detection** ([`detect`]): classify a card as `onion`, `stock`,
//!   `empty` or `unknown` and probe the installed firmware version.
//! - **Devices** ([`device`]): enumerate removable drives, format as
//!   FAT32, check, mount, unmount and eject - wrapping `lsblk`, `parted`,
//!   `mkfs.vfat`, `fsck.vfat` and `udisksctl`.
//! - **Releases** ([`installer`]): fetch the Onion GitHub releases,
//!   download a release zip with progress, extract it onto a card with a
//!   path-traversal guard, and verify the result.
//! - **Settings** ([`config`]): toggle Onion's flag-file configuration
//!   dotfiles on the card.
//! - **Packages** ([`packages`]): install/uninstall staged emulator and
//!   app packages, including ROM-aware auto-install.
//! - **WiFi** ([`wifi`]): harvest saved networks from the host via
//!   `nmcli` and write `wpa_supplicant.conf` to the card.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use onionsd::{backup, restore};
//! use std::path::Path;
//!
//! # fn main() -> onionsd::Result<()> {
//! // Back up saves and ROMs from a mounted card.
//! let report = backup::create_backup(
//!     Path::new("/media/user/ONION"),
//!     Path::new("/home/user/onion-backups"),
//!     &["saves", "roms"],
//!     "before 4.4 upgrade",
//!     None,
//! )?;
//! println!("{}", report.summary());
//!
//! // Later: restore the same categories onto a fresh card.
//! let restored = restore::restore_backup(
//!     &report.path,
//!     Path::new("/media/user/ONION"),
//!     &["saves", "roms"],
//!     None,
//! )?;
//! println!("{}", restored.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress reporting
//!
//! Long copies accept an optional sink invoked synchronously after each
//! file with a [`types::CopyProgress`] event carrying the category, the
//! file's relative path, and running counts that are global across the
//! whole multi-category operation:
//!
//! ```rust,no_run
//! # use onionsd::{backup, types::CopyProgress};
//! # use std::path::Path;
//! # fn main() -> onionsd::Result<()> {
//! let mut sink = |p: &CopyProgress| {
//!     println!("[{}] {} ({}/{})", p.category, p.file.display(), p.completed, p.total);
//! };
//! backup::create_backup(
//!     Path::new("/media/user/ONION"),
//!     Path::new("/home/user/onion-backups"),
//!     &["saves"],
//!     "",
//!     Some(&mut sink),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! The sink runs on the calling thread; operations are blocking and not
//! cancellable mid-flight.
//!
//! ## Failure model
//!
//! Expected failures never panic and never surface as raw low-level
//! errors: each operation validates its inputs before touching the
//! filesystem and returns a descriptive [`OnionSdError`] variant.
//! Validation failures (`is_validation()`) guarantee that nothing was
//! created; copy failures abort immediately and leave already-copied
//! files in place, with the error naming the category (and, for backups,
//! the partial snapshot path). A failed sidecar write after a successful
//! copy only logs a warning - the bulk data on disk is the backup.
//!
//! ## Module organization
//!
//! - [`backup`]: snapshot creation, listing and sizing
//! - [`restore`]: snapshot replay
//! - [`migrate`]: stock-to-Onion migration
//! - [`copier`]: the tree copier underlying all of the above
//! - [`detect`]: card state and version detection
//! - [`categories`]: the static category table
//! - [`device`]: block-device management
//! - [`installer`]: release download and extraction
//! - [`config`]: configuration dotfiles
//! - [`packages`]: emulator/app package management
//! - [`wifi`]: WiFi provisioning
//! - [`types`]: shared data structures
//! - [`error`]: error types and handling

pub mod backup;
pub mod categories;
pub mod config;
pub mod copier;
pub mod detect;
pub mod device;
pub mod error;
pub mod installer;
pub mod migrate;
pub mod packages;
pub mod restore;
pub mod types;
pub mod wifi;

mod utils;

// Re-export main types for convenience
pub use backup::{create_backup, get_backup_size, list_backups, BackupInfo};
pub use categories::{Category, BACKUP_CATEGORIES};
pub use detect::{classify_layout, detect_state, detect_version};
pub use error::{OnionSdError, Result};
pub use migrate::migrate_stock_to_onion;
pub use restore::restore_backup;
pub use types::*;
pub use utils::format_bytes;
