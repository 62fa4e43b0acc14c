//! Backup category definitions
//!
//! A category is a named class of user data with a fixed relative path
//! under the SD card root. The table is immutable and defined once; every
//! backup, restore and sizing operation validates its requested keys
//! against it before touching the filesystem.

use crate::error::{OnionSdError, Result};

/// A named class of data with a fixed relative path on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// Stable machine key, stored in sidecars and passed by callers
    pub key: &'static str,
    /// Human-readable name for UI display
    pub label: &'static str,
    /// Path relative to the SD card root (and mirrored inside snapshots)
    pub path: &'static str,
}

/// The full category table, in canonical display order
pub const BACKUP_CATEGORIES: &[Category] = &[
    Category {
        key: "roms",
        label: "ROMs",
        path: "Roms",
    },
    Category {
        key: "imgs",
        label: "Images (box art)",
        path: "Imgs",
    },
    Category {
        key: "saves",
        label: "Saves",
        path: "Saves",
    },
    Category {
        key: "ra_config",
        label: "RetroArch config",
        path: "RetroArch/.retroarch",
    },
    Category {
        key: "bios",
        label: "BIOS",
        path: "BIOS",
    },
    Category {
        key: "onion_config",
        label: "Onion config",
        path: ".tmp_update/config",
    },
];

/// Look up a category by its machine key
pub fn find(key: &str) -> Option<&'static Category> {
    BACKUP_CATEGORIES.iter().find(|c| c.key == key)
}

/// Resolve a requested key list against the table
///
/// Fails with [`OnionSdError::UnknownCategories`] naming every unrecognized
/// key, or [`OnionSdError::NoCategoriesSelected`] for an empty request.
/// Called by every operation before any directory is created or file
/// copied; the resolved entries preserve caller order.
pub fn resolve(keys: &[&str]) -> Result<Vec<&'static Category>> {
    let mut resolved = Vec::with_capacity(keys.len());
    let mut invalid = Vec::new();
    for key in keys {
        match find(key) {
            Some(cat) => resolved.push(cat),
            None => invalid.push(key.to_string()),
        }
    }
    if !invalid.is_empty() {
        return Err(OnionSdError::UnknownCategories(invalid));
    }
    if keys.is_empty() {
        return Err(OnionSdError::NoCategoriesSelected);
    }
    Ok(resolved)
}

/// Validate a requested key list without resolving it
pub fn validate(keys: &[&str]) -> Result<()> {
    resolve(keys).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_keys_are_unique() {
        for (i, a) in BACKUP_CATEGORIES.iter().enumerate() {
            for b in &BACKUP_CATEGORIES[i + 1..] {
                assert_ne!(a.key, b.key);
                assert_ne!(a.path, b.path);
            }
        }
    }

    #[test]
    fn test_find_known_key() {
        let cat = find("ra_config").unwrap();
        assert_eq!(cat.path, "RetroArch/.retroarch");
    }

    #[test]
    fn test_validate_reports_all_unknown_keys() {
        let err = validate(&["saves", "nope", "also_nope"]).unwrap_err();
        match err {
            OnionSdError::UnknownCategories(keys) => {
                assert_eq!(keys, vec!["nope".to_string(), "also_nope".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_selection() {
        assert!(matches!(
            validate(&[]),
            Err(OnionSdError::NoCategoriesSelected)
        ));
    }
}
