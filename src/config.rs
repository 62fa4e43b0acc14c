//! Onion OS configuration dotfiles
//!
//! Onion stores its settings as empty flag files in `.tmp_update/config/`
//! on the SD card: the file exists, the setting is enabled; the file is
//! absent, it is disabled. Which flags exist is described by a JSON
//! definitions document shipped alongside the application (not on the
//! card), keyed by UI category.

use crate::error::{OnionSdError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Flag-file directory, relative to the SD card root
pub const CONFIG_DIR: &str = ".tmp_update/config";

/// Top-level key of the definitions document
const DEFINITIONS_KEY: &str = "Onion_Configuration";

/// One toggleable option from the definitions document
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigOption {
    /// Dotfile name on the card (e.g. `.noAutoStart`)
    pub filename: String,
    /// Display label, when the document carries one
    #[serde(default)]
    pub label: String,
    /// Longer description, when the document carries one
    #[serde(default)]
    pub description: String,
}

/// The parsed definitions document: category name to options
pub type ConfigDefinitions = BTreeMap<String, Vec<ConfigOption>>;

/// Load the configuration definitions document
///
/// The document is a JSON object whose `Onion_Configuration` key maps
/// category names (e.g. "System", "Time") to option lists. A document
/// without that key fails with [`OnionSdError::MissingConfigKey`] naming
/// the keys that are present.
pub fn load_config_definitions(config_path: &Path) -> Result<ConfigDefinitions> {
    debug!("Loading config definitions from {:?}", config_path);
    let data = fs::read_to_string(config_path)?;
    let document: BTreeMap<String, serde_json::Value> = serde_json::from_str(&data)?;

    let Some(raw) = document.get(DEFINITIONS_KEY) else {
        return Err(OnionSdError::MissingConfigKey {
            key: DEFINITIONS_KEY.to_string(),
            available: document.keys().cloned().collect(),
        });
    };
    let definitions: ConfigDefinitions = serde_json::from_value(raw.clone())?;

    let total_options: usize = definitions.values().map(Vec::len).sum();
    info!(
        "Loaded {} configuration categories with {} total options",
        definitions.len(),
        total_options
    );
    Ok(definitions)
}

/// Read which settings are currently enabled on the card
///
/// For each option in the definitions, the setting is enabled when its
/// flag file exists under `.tmp_update/config/`. Returns a map from flag
/// filename to its state.
pub fn current_settings(sd_mount: &Path, definitions: &ConfigDefinitions) -> BTreeMap<String, bool> {
    let config_dir = sd_mount.join(CONFIG_DIR);
    debug!("Scanning config directory: {:?}", config_dir);

    let mut settings = BTreeMap::new();
    for option in definitions.values().flatten() {
        let enabled = config_dir.join(&option.filename).exists();
        settings.insert(option.filename.clone(), enabled);
    }
    settings
}

/// Enable or disable a single setting on the card
///
/// Enabling creates the empty flag file (and the config directory when
/// missing); disabling removes the file. Disabling a setting that is
/// already disabled is a no-op.
pub fn toggle_setting(sd_mount: &Path, filename: &str, enabled: bool) -> Result<()> {
    let config_dir = sd_mount.join(CONFIG_DIR);
    let file_path = config_dir.join(filename);

    if enabled {
        fs::create_dir_all(&config_dir)?;
        fs::File::create(&file_path)?;
        info!("Enabled setting: {} (created {:?})", filename, file_path);
    } else if file_path.exists() {
        fs::remove_file(&file_path)?;
        info!("Disabled setting: {} (removed {:?})", filename, file_path);
    } else {
        debug!("Setting {} already disabled", filename);
    }
    Ok(())
}

/// Apply a full set of settings at once
pub fn apply_settings(sd_mount: &Path, settings: &BTreeMap<String, bool>) -> Result<()> {
    info!("Applying {} settings to {:?}", settings.len(), sd_mount);
    for (filename, enabled) in settings {
        toggle_setting(sd_mount, filename, *enabled)?;
    }
    let enabled_count = settings.values().filter(|v| **v).count();
    info!(
        "Applied settings: {} enabled, {} disabled",
        enabled_count,
        settings.len() - enabled_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "Onion_Configuration": {
            "System": [
                {"filename": ".noAutoStart", "label": "Disable auto-start"},
                {"filename": ".menuInverted"}
            ],
            "Time": [
                {"filename": ".ntpState", "label": "NTP sync"}
            ]
        },
        "Other_Section": {}
    }"#;

    fn write_sample(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("config.json");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_load_definitions() {
        let dir = TempDir::new().unwrap();
        let defs = load_config_definitions(&write_sample(&dir)).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs["System"].len(), 2);
        assert_eq!(defs["System"][0].filename, ".noAutoStart");
        assert_eq!(defs["System"][1].label, "");
    }

    #[test]
    fn test_load_definitions_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"Something_Else": {}}"#).unwrap();
        let err = load_config_definitions(&path).unwrap_err();
        match err {
            OnionSdError::MissingConfigKey { key, available } => {
                assert_eq!(key, "Onion_Configuration");
                assert_eq!(available, vec!["Something_Else".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_toggle_and_read_settings() {
        let dir = TempDir::new().unwrap();
        let defs = load_config_definitions(&write_sample(&dir)).unwrap();
        let card = TempDir::new().unwrap();

        let initial = current_settings(card.path(), &defs);
        assert_eq!(initial.len(), 3);
        assert!(initial.values().all(|v| !v));

        toggle_setting(card.path(), ".noAutoStart", true).unwrap();
        let after = current_settings(card.path(), &defs);
        assert!(after[".noAutoStart"]);
        assert!(!after[".ntpState"]);

        // Disabling twice is harmless.
        toggle_setting(card.path(), ".noAutoStart", false).unwrap();
        toggle_setting(card.path(), ".noAutoStart", false).unwrap();
        assert!(!current_settings(card.path(), &defs)[".noAutoStart"]);
    }

    #[test]
    fn test_apply_settings() {
        let card = TempDir::new().unwrap();
        let mut wanted = BTreeMap::new();
        wanted.insert(".noAutoStart".to_string(), true);
        wanted.insert(".ntpState".to_string(), false);
        apply_settings(card.path(), &wanted).unwrap();
        assert!(card.path().join(CONFIG_DIR).join(".noAutoStart").exists());
        assert!(!card.path().join(CONFIG_DIR).join(".ntpState").exists());
    }
}
