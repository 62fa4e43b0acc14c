//! Integration tests for stock-to-Onion migration

use anyhow::Result;
use onionsd::migrate::migrate_stock_to_onion;
use onionsd::types::CopyProgress;
use onionsd::OnionSdError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn saves_are_remapped_to_the_onion_layout() -> Result<()> {
    let stock = TempDir::new()?;
    let onion = TempDir::new()?;

    let saves = stock.path().join("RetroArch/.retroarch/saves");
    fs::create_dir_all(&saves)?;
    fs::write(saves.join("zelda.srm"), "a")?;
    fs::write(saves.join("mario.srm"), "b")?;
    fs::write(saves.join("metroid.srm"), "c")?;

    let report = migrate_stock_to_onion(stock.path(), onion.path(), None)?;
    assert!(report.migrated_anything());
    assert_eq!(report.total_files, 3);
    assert_eq!(report.summary(), "Migration completed: 3 files copied.");

    let target = onion.path().join("Saves/CurrentProfile/saves");
    let mut names: Vec<String> = fs::read_dir(&target)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["mario.srm", "metroid.srm", "zelda.srm"]);
    // The stock-layout path must not be recreated on the Onion card.
    assert!(!onion.path().join("RetroArch").exists());
    Ok(())
}

#[test]
fn nothing_to_migrate_is_success_and_touches_nothing() -> Result<()> {
    let stock = TempDir::new()?;
    let onion = TempDir::new()?;
    // A stock card with none of the recognised directories.
    fs::create_dir_all(stock.path().join("miyoo/app"))?;

    let report = migrate_stock_to_onion(stock.path(), onion.path(), None)?;
    assert!(!report.migrated_anything());
    assert_eq!(report.total_files, 0);
    assert!(report.summary().contains("Nothing to migrate"));
    assert_eq!(fs::read_dir(onion.path())?.count(), 0);
    Ok(())
}

#[test]
fn jobs_run_in_fixed_order_with_combined_totals() -> Result<()> {
    let stock = TempDir::new()?;
    let onion = TempDir::new()?;

    let states = stock.path().join("RetroArch/.retroarch/states");
    fs::create_dir_all(&states)?;
    fs::write(states.join("zelda.state"), "st")?;

    fs::create_dir_all(stock.path().join("Roms/GBA"))?;
    fs::write(stock.path().join("Roms/GBA/game.gba"), "rom")?;

    fs::create_dir_all(stock.path().join("BIOS"))?;
    fs::write(stock.path().join("BIOS/gba_bios.bin"), "bios")?;

    let mut events: Vec<CopyProgress> = Vec::new();
    let mut sink = |p: &CopyProgress| events.push(p.clone());
    let report = migrate_stock_to_onion(stock.path(), onion.path(), Some(&mut sink))?;

    assert_eq!(report.total_files, 3);
    assert_eq!(
        report.jobs,
        vec![
            "saves (RetroArch/.retroarch/states)".to_string(),
            "Roms".to_string(),
            "BIOS".to_string(),
        ]
    );

    // One global denominator across all jobs, counts monotonic.
    assert!(events.iter().all(|e| e.total == 3));
    let completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
    assert_eq!(completed, vec![1, 2, 3]);
    let labels: Vec<&str> = events.iter().map(|e| e.category.as_str()).collect();
    assert_eq!(
        labels,
        vec!["saves (RetroArch/.retroarch/states)", "Roms", "BIOS"]
    );

    assert!(onion
        .path()
        .join("Saves/CurrentProfile/states/zelda.state")
        .is_file());
    assert!(onion.path().join("Roms/GBA/game.gba").is_file());
    Ok(())
}

#[test]
fn missing_mounts_fail_validation() {
    let onion = TempDir::new().unwrap();
    let err =
        migrate_stock_to_onion(Path::new("/no/such/stock"), onion.path(), None).unwrap_err();
    assert!(matches!(err, OnionSdError::MountNotFound(_)));

    let stock = TempDir::new().unwrap();
    let err =
        migrate_stock_to_onion(stock.path(), Path::new("/no/such/onion"), None).unwrap_err();
    assert!(matches!(err, OnionSdError::MountNotFound(_)));
}
