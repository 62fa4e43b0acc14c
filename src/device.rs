//! SD card device management
//!
//! Wraps the Linux block-device tooling the desktop app relies on:
//! `lsblk` (JSON mode) for enumeration, `parted`/`mkfs.vfat`/`partprobe`
//! for formatting, `fsck.vfat` for checking, and `udisksctl` for
//! unprivileged mount/unmount/power-off. Operations that need root are
//! executed directly when the process is root, or via `pkexec` otherwise;
//! the formatter batches every privileged step into one script so the user
//! authenticates only once.

use crate::error::{OnionSdError, Result};
use crate::utils;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Tools that live in `/sbin` on Debian, off the normal user PATH
const SBIN_TOOLS: &[&str] = &["parted", "mkfs.vfat", "fsck.vfat", "partprobe"];

/// FAT32 labels are capped at 11 ASCII characters
const MAX_LABEL_LEN: usize = 11;

/// Cards above this size get 64 KiB clusters (128 sectors)
const LARGE_CARD_BYTES: u64 = 137_438_953_472;

/// A removable drive visible to the system
#[derive(Debug, Clone)]
pub struct DriveInfo {
    /// Kernel name (e.g. `sdb`)
    pub name: String,
    /// Device node path (e.g. `/dev/sdb`)
    pub device: String,
    /// Human-readable size as reported by lsblk
    pub size: String,
    /// Mount point of the whole-disk device, if any
    pub mountpoint: Option<String>,
    /// Filesystem type, if any
    pub fstype: Option<String>,
    /// Device model string, trimmed
    pub model: String,
    /// Transport (e.g. `usb`)
    pub tran: Option<String>,
    /// Volume label, if any
    pub label: Option<String>,
    /// Partitions of this drive
    pub partitions: Vec<PartitionInfo>,
}

/// A partition of a block device
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    /// Kernel name (e.g. `sdb1`)
    pub name: String,
    /// Device node path (e.g. `/dev/sdb1`)
    pub device: String,
    /// Human-readable size as reported by lsblk
    pub size: String,
    /// Mount point, if mounted
    pub mountpoint: Option<String>,
    /// Filesystem type, if any
    pub fstype: Option<String>,
    /// Volume label, if any
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LsblkReport {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default, deserialize_with = "de_removable")]
    rm: bool,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tran: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// lsblk reports `rm` as a bool or as `"1"`/`"0"` depending on version
fn de_removable<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Num(f64),
        Str(String),
    }
    Ok(match Option::<Flag>::deserialize(d)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Num(n)) => n != 0.0,
        Some(Flag::Str(s)) => s.trim() == "1",
        None => false,
    })
}

/// Enumerate removable drives visible to the system
///
/// Runs `lsblk` in JSON mode and keeps only whole disks flagged removable.
pub fn list_removable_drives() -> Result<Vec<DriveInfo>> {
    let output = utils::run(
        "lsblk",
        &[
            "-J",
            "-o",
            "NAME,SIZE,TYPE,MOUNTPOINT,FSTYPE,RM,MODEL,TRAN,LABEL",
        ],
    )?;
    if !output.status.success() {
        return Err(OnionSdError::command_failed(
            "lsblk",
            utils::output_detail(&output),
        ));
    }
    let report: LsblkReport = serde_json::from_slice(&output.stdout)?;
    Ok(removable_disks(report))
}

fn removable_disks(report: LsblkReport) -> Vec<DriveInfo> {
    report
        .blockdevices
        .into_iter()
        .filter(|dev| dev.rm && dev.kind == "disk")
        .map(|dev| {
            let partitions = dev
                .children
                .iter()
                .filter(|c| c.kind == "part")
                .map(partition_info)
                .collect();
            DriveInfo {
                device: format!("/dev/{}", dev.name),
                size: dev.size.unwrap_or_default(),
                mountpoint: dev.mountpoint,
                fstype: dev.fstype,
                model: dev.model.unwrap_or_default().trim().to_string(),
                tran: dev.tran,
                label: dev.label,
                partitions,
                name: dev.name,
            }
        })
        .collect()
}

fn partition_info(child: &LsblkDevice) -> PartitionInfo {
    PartitionInfo {
        name: child.name.clone(),
        device: format!("/dev/{}", child.name),
        size: child.size.clone().unwrap_or_default(),
        mountpoint: child.mountpoint.clone(),
        fstype: child.fstype.clone(),
        label: child.label.clone(),
    }
}

/// List the partitions of one device via `lsblk`
pub fn drive_partitions(device: &str) -> Result<Vec<PartitionInfo>> {
    let device = normalize_device(device);
    let output = utils::run(
        "lsblk",
        &[
            "-J",
            "-o",
            "NAME,SIZE,TYPE,MOUNTPOINT,FSTYPE,LABEL",
            &device,
        ],
    )?;
    if !output.status.success() {
        return Err(OnionSdError::command_failed(
            "lsblk",
            utils::output_detail(&output),
        ));
    }
    let report: LsblkReport = serde_json::from_slice(&output.stdout)?;
    Ok(report
        .blockdevices
        .iter()
        .flat_map(|dev| dev.children.iter())
        .filter(|c| c.kind == "part")
        .map(partition_info)
        .collect())
}

/// Format a whole-disk device as FAT32 with an MBR partition table
///
/// The label is clamped to 11 uppercase characters. Mounted partitions are
/// unmounted via `udisksctl` first (no root needed), then a single batched
/// script runs the privileged sequence: mklabel msdos, mkpart primary
/// fat32, partprobe, udevadm settle, mkfs.vfat. Cards above 128 GiB get
/// 128-sector clusters.
///
/// # Errors
///
/// [`OnionSdError::Device`] with the captured tool output when the batched
/// script fails.
pub fn format_sd_card(device: &str, label: &str) -> Result<String> {
    let device = normalize_device(device);
    let label: String = label.chars().take(MAX_LABEL_LEN).collect::<String>().to_uppercase();
    let partition_device = partition_device_for(&device);

    let cluster_sectors = if card_size_bytes(&device) > LARGE_CARD_BYTES {
        "128"
    } else {
        "64"
    };

    // Unmount via udisksctl first so pkexec is the only prompt the user sees.
    for part in drive_partitions(&device).unwrap_or_default() {
        if part.mountpoint.is_some() {
            let _ = utils::run("udisksctl", &["unmount", "-b", &part.device]);
        }
    }

    let script = format!(
        "#!/bin/sh\n\
         set -e\n\
         \n\
         # Unmount anything still mounted\n\
         for p in {device}*; do\n\
         \tumount \"$p\" 2>/dev/null || true\n\
         done\n\
         \n\
         # Create MBR partition table\n\
         {parted} -s {device} mklabel msdos\n\
         \n\
         # Create single FAT32 partition\n\
         {parted} -s -a optimal {device} mkpart primary fat32 1MiB 100%\n\
         \n\
         # Tell the kernel about the new partition table\n\
         {partprobe} {device}\n\
         udevadm settle --timeout=5\n\
         sleep 1\n\
         \n\
         # Format as FAT32\n\
         {mkfs} -F32 -s {cluster_sectors} -n {label} {partition_device}\n\
         \n\
         udevadm settle --timeout=5\n",
        parted = tool_path("parted"),
        partprobe = tool_path("partprobe"),
        mkfs = tool_path("mkfs.vfat"),
    );

    let mut script_file = tempfile::Builder::new()
        .suffix(".sh")
        .tempfile()
        .map_err(OnionSdError::Io)?;
    script_file.write_all(script.as_bytes())?;
    script_file.flush()?;
    utils::set_permissions(script_file.path(), 0o755)?;

    let script_path = script_file.path().to_string_lossy().into_owned();
    let output = utils::run_privileged(&script_path, &[])?;
    if !output.status.success() {
        return Err(OnionSdError::device(format!(
            "Format failed: {}",
            utils::output_detail(&output)
        )));
    }

    Ok(format!(
        "Successfully formatted {device} as FAT32 (label={label})"
    ))
}

/// Run a non-destructive filesystem check on the first partition
///
/// Uses `fsck.vfat -n` (read-only). The partition is unmounted first to
/// avoid "filesystem is mounted" warnings. Returns the combined
/// stdout/stderr of the check regardless of its verdict.
pub fn check_disk(device: &str) -> Result<String> {
    let device = normalize_device(device);
    let partition_device = partition_device_for(&device);

    for part in drive_partitions(&device).unwrap_or_default() {
        if part.mountpoint.is_some() && part.device == partition_device {
            let _ = utils::run("udisksctl", &["unmount", "-b", &partition_device]);
        }
    }

    let fsck = tool_path("fsck.vfat");
    let output = utils::run_privileged(&fsck, &["-n", &partition_device])?;
    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(combined.trim().to_string())
}

/// Safely eject a drive: unmount every partition, then power it off
///
/// `udisksctl power-off` is preferred (no root needed); `eject` is the
/// fallback.
pub fn eject_drive(device: &str) -> Result<String> {
    let device = normalize_device(device);

    for part in drive_partitions(&device)? {
        if part.mountpoint.is_none() {
            continue;
        }
        let output = utils::run("udisksctl", &["unmount", "-b", &part.device])?;
        if !output.status.success() {
            let fallback = utils::run_privileged("umount", &[&part.device])?;
            if !fallback.status.success() {
                return Err(OnionSdError::device(format!(
                    "Failed to unmount {}: {}",
                    part.device,
                    utils::output_detail(&fallback)
                )));
            }
        }
    }

    let output = utils::run("udisksctl", &["power-off", "-b", &device])?;
    if output.status.success() {
        return Ok(format!("Drive {device} has been safely ejected."));
    }

    match utils::run_privileged("eject", &[&device]) {
        Ok(fallback) if fallback.status.success() => {
            Ok(format!("Drive {device} has been ejected (via eject)."))
        }
        Ok(fallback) => Err(OnionSdError::device(format!(
            "Failed to eject {device}: {}",
            utils::output_detail(&fallback)
        ))),
        Err(OnionSdError::ToolMissing(_)) => Err(OnionSdError::device(format!(
            "Failed to power-off {device}: {}",
            utils::output_detail(&output)
        ))),
        Err(e) => Err(e),
    }
}

/// Mount a partition via `udisksctl` and return the mount point
///
/// udisksctl mounts under `/media/<user>/...` and prints
/// `Mounted /dev/sdb1 at /media/user/ONION`; when that line cannot be
/// parsed, lsblk is queried for the mount point instead.
pub fn mount_partition(partition: &str) -> Result<String> {
    let partition = normalize_device(partition);

    let output = utils::run("udisksctl", &["mount", "-b", &partition])?;
    if !output.status.success() {
        return Err(OnionSdError::device(format!(
            "Mount failed for {partition}: {}",
            utils::output_detail(&output)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if let Some((_, rest)) = stdout.trim().split_once(" at ") {
        return Ok(rest.trim_end_matches('.').to_string());
    }

    debug!("Could not parse udisksctl output, falling back to lsblk");
    let info = utils::run("lsblk", &["-n", "-o", "MOUNTPOINT", &partition])?;
    let mountpoint = String::from_utf8_lossy(&info.stdout).trim().to_string();
    if mountpoint.is_empty() {
        return Err(OnionSdError::device(format!(
            "Mounted {partition} but could not determine the mount point"
        )));
    }
    Ok(mountpoint)
}

/// Unmount a partition via `udisksctl`, falling back to `umount`
pub fn unmount_partition(partition: &str) -> Result<String> {
    let partition = normalize_device(partition);

    let output = utils::run("udisksctl", &["unmount", "-b", &partition])?;
    if output.status.success() {
        return Ok(format!("Unmounted {partition}."));
    }

    let fallback = utils::run_privileged("umount", &[&partition])?;
    if fallback.status.success() {
        return Ok(format!("Unmounted {partition} (via umount)."));
    }

    Err(OnionSdError::device(format!(
        "Failed to unmount {partition}: {}",
        utils::output_detail(&fallback)
    )))
}

/// Free space in bytes available to an unprivileged user at `path`
///
/// Returns 0 when the path is invalid or the query fails.
#[cfg(unix)]
pub fn free_space(path: &Path) -> u64 {
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => stat.blocks_available() as u64 * stat.fragment_size() as u64,
        Err(_) => 0,
    }
}

#[cfg(not(unix))]
pub fn free_space(_path: &Path) -> u64 {
    0
}

/// Normalise a device name to an absolute `/dev/...` path
fn normalize_device(device: &str) -> String {
    if device.starts_with("/dev/") {
        device.to_string()
    } else {
        format!("/dev/{device}")
    }
}

/// First-partition device node for a whole-disk device
///
/// `/dev/sdb` becomes `/dev/sdb1`; names ending in a digit get a `p`
/// separator, so `/dev/mmcblk0` becomes `/dev/mmcblk0p1`.
fn partition_device_for(device: &str) -> String {
    let base = device.rsplit('/').next().unwrap_or(device);
    if base.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{device}p1")
    } else {
        format!("{device}1")
    }
}

/// Size of a whole-disk device in bytes, read from sysfs
fn card_size_bytes(device: &str) -> u64 {
    let name = device.rsplit('/').next().unwrap_or(device);
    let sysfs = format!("/sys/block/{name}/size");
    match fs::read_to_string(&sysfs) {
        Ok(content) => content.trim().parse::<u64>().unwrap_or(0) * 512,
        Err(e) => {
            warn!("Could not read {}: {}", sysfs, e);
            0
        }
    }
}

/// Absolute path for a tool, falling back to the bare name
fn tool_path(name: &str) -> String {
    if SBIN_TOOLS.contains(&name) {
        let sbin = format!("/sbin/{name}");
        if Path::new(&sbin).is_file() {
            return sbin;
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_device() {
        assert_eq!(normalize_device("sdb"), "/dev/sdb");
        assert_eq!(normalize_device("/dev/sdb"), "/dev/sdb");
    }

    #[test]
    fn test_partition_device_for() {
        assert_eq!(partition_device_for("/dev/sdb"), "/dev/sdb1");
        assert_eq!(partition_device_for("/dev/mmcblk0"), "/dev/mmcblk0p1");
    }

    #[test]
    fn test_removable_filtering_tolerates_rm_encodings() {
        let json = r#"{
            "blockdevices": [
                {"name": "sda", "size": "512G", "type": "disk", "rm": false},
                {"name": "sdb", "size": "59.5G", "type": "disk", "rm": "1",
                 "model": " SD Reader ", "tran": "usb",
                 "children": [
                    {"name": "sdb1", "size": "59.5G", "type": "part",
                     "mountpoint": "/media/user/ONION", "fstype": "vfat", "label": "ONION"}
                 ]},
                {"name": "sdc", "size": "32G", "type": "disk", "rm": 1},
                {"name": "loop0", "size": "4K", "type": "loop", "rm": false}
            ]
        }"#;
        let report: LsblkReport = serde_json::from_str(json).unwrap();
        let drives = removable_disks(report);
        assert_eq!(drives.len(), 2);
        assert_eq!(drives[0].device, "/dev/sdb");
        assert_eq!(drives[0].model, "SD Reader");
        assert_eq!(drives[0].partitions.len(), 1);
        assert_eq!(
            drives[0].partitions[0].mountpoint.as_deref(),
            Some("/media/user/ONION")
        );
        assert_eq!(drives[1].device, "/dev/sdc");
    }

    #[test]
    fn test_rm_null_is_not_removable() {
        let json = r#"{"blockdevices": [{"name": "sdd", "type": "disk", "rm": null}]}"#;
        let report: LsblkReport = serde_json::from_str(json).unwrap();
        assert!(removable_disks(report).is_empty());
    }
}
