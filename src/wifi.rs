//! WiFi provisioning for the card
//!
//! Reads saved WiFi connections from the host via NetworkManager's `nmcli`
//! and writes WPA supplicant configuration to `appconfigs/
//! wpa_supplicant.conf` on the card, which is where Onion's network stack
//! looks for credentials.

use crate::error::{OnionSdError, Result};
use crate::types::WifiCredentials;
use crate::utils;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// WPA supplicant config location, relative to the SD card root
pub const WPA_SUPPLICANT_PATH: &str = "appconfigs/wpa_supplicant.conf";

fn supplicant_config(ssid: &str, psk: &str) -> String {
    format!(
        "ctrl_interface=/var/run/wpa_supplicant\n\
         update_config=1\n\
         network={{\n\
         \x20   ssid=\"{ssid}\"\n\
         \x20   psk=\"{psk}\"\n\
         }}\n"
    )
}

/// Retrieve saved WiFi connections from the host via `nmcli`
///
/// Lists every saved NetworkManager connection, then queries each one for
/// its SSID and pre-shared key. Connections that are not WiFi (no SSID) or
/// whose details cannot be read are skipped.
///
/// # Errors
///
/// [`OnionSdError::ToolMissing`] when `nmcli` is not installed, or
/// [`OnionSdError::CommandFailed`] when the connection listing fails.
pub fn host_wifi_networks() -> Result<Vec<WifiCredentials>> {
    let output = utils::run("nmcli", &["-t", "-f", "NAME,UUID", "connection", "show"])?;
    if !output.status.success() {
        return Err(OnionSdError::command_failed(
            "nmcli",
            utils::output_detail(&output),
        ));
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    let mut networks = Vec::new();

    for line in listing.lines().filter(|l| !l.trim().is_empty()) {
        // Terse output separates with ':'. Connection names may contain
        // colons, so split from the right - UUIDs never do.
        let Some((name, uuid)) = line.rsplit_once(':') else {
            debug!("Skipping malformed connection line: {}", line);
            continue;
        };
        let uuid = uuid.trim();

        match connection_details(uuid)? {
            Some(creds) => {
                debug!("Found WiFi network: {}", creds.ssid);
                networks.push(creds);
            }
            None => debug!("Skipping connection {:?} ({}): not WiFi", name, uuid),
        }
    }

    info!("Found {} saved WiFi networks", networks.len());
    Ok(networks)
}

/// Query `nmcli` for one connection's SSID and PSK
///
/// Returns `None` for non-WiFi connections (no SSID field) and for
/// connections whose details cannot be retrieved.
fn connection_details(uuid: &str) -> Result<Option<WifiCredentials>> {
    let output = utils::run("nmcli", &["-s", "connection", "show", uuid])?;
    if !output.status.success() {
        debug!(
            "Failed to get details for UUID {}: {}",
            uuid,
            utils::output_detail(&output)
        );
        return Ok(None);
    }

    let details = String::from_utf8_lossy(&output.stdout);
    let mut ssid = None;
    let mut psk = None;

    for line in details.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("802-11-wireless.ssid:") {
            let value = value.trim();
            if !value.is_empty() && value != "--" {
                ssid = Some(value.to_string());
            }
        } else if let Some(value) = line.strip_prefix("802-11-wireless-security.psk:") {
            let value = value.trim();
            if !value.is_empty() && value != "--" {
                psk = Some(value.to_string());
            }
        }
    }

    Ok(ssid.map(|ssid| WifiCredentials { ssid, psk }))
}

/// Write WPA supplicant configuration to the card
///
/// Creates `appconfigs/wpa_supplicant.conf` with LF line endings (the
/// handheld's supplicant rejects CRLF).
///
/// # Errors
///
/// [`OnionSdError::EmptySsid`] before anything is written, or the
/// underlying I/O error.
pub fn write_wifi_config(sd_mount: &Path, ssid: &str, psk: &str) -> Result<()> {
    if ssid.is_empty() {
        return Err(OnionSdError::EmptySsid);
    }

    let conf_path = sd_mount.join(WPA_SUPPLICANT_PATH);
    if let Some(parent) = conf_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&conf_path, supplicant_config(ssid, psk))?;

    info!("Wrote WiFi config for SSID {:?} to {:?}", ssid, conf_path);
    Ok(())
}

/// Read existing WiFi configuration from the card
///
/// Parses `appconfigs/wpa_supplicant.conf` for the SSID and pre-shared
/// key. Returns `None` when the file is missing, unreadable, or holds no
/// SSID.
pub fn read_wifi_config(sd_mount: &Path) -> Option<WifiCredentials> {
    let conf_path = sd_mount.join(WPA_SUPPLICANT_PATH);
    if !conf_path.is_file() {
        debug!("No WiFi config found at {:?}", conf_path);
        return None;
    }

    let content = match fs::read_to_string(&conf_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read WiFi config at {:?}: {}", conf_path, e);
            return None;
        }
    };

    let ssid = extract_field(&content, "ssid");
    let psk = extract_field(&content, "psk");

    match ssid {
        Some(ssid) => Some(WifiCredentials { ssid, psk }),
        None => {
            warn!(
                "WiFi config exists at {:?} but no SSID could be parsed",
                conf_path
            );
            None
        }
    }
}

/// Extract a `field=value` assignment from supplicant config content
///
/// Handles quoted (`ssid="Home"`) and unquoted (`psk=abc123`) values.
fn extract_field(content: &str, field: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(field) else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(value) = rest.strip_prefix('=') else {
            continue;
        };
        let value = value.trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
            continue;
        }
        if !value.is_empty() {
            return Some(value.split_whitespace().next().unwrap_or("").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_roundtrip() {
        let card = TempDir::new().unwrap();
        write_wifi_config(card.path(), "Home Network", "hunter2 hunter2").unwrap();

        let conf = fs::read_to_string(card.path().join(WPA_SUPPLICANT_PATH)).unwrap();
        assert!(conf.contains("ssid=\"Home Network\""));
        assert!(!conf.contains('\r'));

        let creds = read_wifi_config(card.path()).unwrap();
        assert_eq!(creds.ssid, "Home Network");
        assert_eq!(creds.psk.as_deref(), Some("hunter2 hunter2"));
    }

    #[test]
    fn test_empty_ssid_is_rejected() {
        let card = TempDir::new().unwrap();
        assert!(matches!(
            write_wifi_config(card.path(), "", "pw"),
            Err(OnionSdError::EmptySsid)
        ));
        assert!(!card.path().join(WPA_SUPPLICANT_PATH).exists());
    }

    #[test]
    fn test_read_missing_config() {
        let card = TempDir::new().unwrap();
        assert!(read_wifi_config(card.path()).is_none());
    }

    #[test]
    fn test_extract_field_unquoted() {
        let content = "network={\n  ssid=plain\n  psk=secret123\n}\n";
        assert_eq!(extract_field(content, "ssid").as_deref(), Some("plain"));
        assert_eq!(extract_field(content, "psk").as_deref(), Some("secret123"));
    }

    #[test]
    fn test_extract_field_absent() {
        let content = "network={\n  ssid=\"OnlySsid\"\n}\n";
        assert_eq!(extract_field(content, "psk"), None);
    }
}
