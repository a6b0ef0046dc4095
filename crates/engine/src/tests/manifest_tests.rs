use super::helpers::{manifest_entries, open_engine, test_config};
use crate::manifest::Manifest;
use crate::{Engine, EngineError};
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

// --------------------- File format ---------------------

#[test]
fn load_or_create_starts_empty() -> Result<()> {
    let dir = tempdir()?;
    let m = Manifest::load_or_create(dir.path())?;
    assert!(m.entries.is_empty());
    assert!(!dir.path().join("MANIFEST").exists(), "created lazily on save");
    Ok(())
}

#[test]
fn save_and_reload_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load_or_create(dir.path())?;
    m.set_runs(vec!["run-b.sst".into(), "run-a.sst".into()]);
    m.save()?;

    let reloaded = Manifest::load_or_create(dir.path())?;
    assert_eq!(reloaded.entries, vec!["run-b.sst", "run-a.sst"]);
    assert!(reloaded.contains("run-a.sst"));
    assert!(!reloaded.contains("run-c.sst"));
    Ok(())
}

#[test]
fn comments_and_blank_lines_are_skipped() -> Result<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("MANIFEST"),
        "# header\n\nrun-1.sst\n  \n# tail\nrun-2.sst\n",
    )?;

    let m = Manifest::load_or_create(dir.path())?;
    assert_eq!(m.entries, vec!["run-1.sst", "run-2.sst"]);
    Ok(())
}

#[test]
fn add_front_keeps_newest_first() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load_or_create(dir.path())?;
    m.add_front("older.sst".into());
    m.add_front("newer.sst".into());
    assert_eq!(m.entries, vec!["newer.sst", "older.sst"]);
    Ok(())
}

#[test]
fn path_separators_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("MANIFEST"), "../../etc/passwd\n")?;

    match Manifest::load_or_create(dir.path()) {
        Err(EngineError::Corruption(_)) => Ok(()),
        other => panic!("expected corruption, got {:?}", other.map(|m| m.entries)),
    }
}

#[test]
fn save_replaces_previous_contents() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load_or_create(dir.path())?;
    m.set_runs(vec!["run-1.sst".into(), "run-2.sst".into()]);
    m.save()?;

    m.set_runs(vec!["run-3.sst".into()]);
    m.save()?;

    let reloaded = Manifest::load_or_create(dir.path())?;
    assert_eq!(reloaded.entries, vec!["run-3.sst"]);
    Ok(())
}

// --------------------- Engine integration ---------------------

#[test]
fn manifest_tracks_flushes_newest_first() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.force_flush()?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    engine.force_flush()?;

    let entries = manifest_entries(dir.path());
    assert_eq!(entries.len(), 2);

    let snap_names: Vec<String> = engine
        .shared
        .tables
        .snapshot()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(entries, snap_names, "manifest mirrors the live run order");
    Ok(())
}

#[test]
fn manifest_shrinks_after_compaction() -> Result<()> {
    let dir = tempdir()?;
    let mut cfg = test_config(dir.path());
    cfg.compaction_min_threshold = 2;
    let engine = Engine::open(cfg)?;

    engine.put(b"x".to_vec(), b"v1".to_vec())?;
    engine.force_flush()?;
    engine.put(b"x".to_vec(), b"v2".to_vec())?;
    engine.force_flush()?;

    engine.compact_now()?;

    let entries = manifest_entries(dir.path());
    assert_eq!(entries.len(), 1);
    assert!(entries[0].ends_with(".sst"));
    Ok(())
}

#[test]
fn missing_manifest_is_rebuilt_from_directory_scan() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = open_engine(dir.path());
        engine.put(b"a".to_vec(), b"old".to_vec())?;
        engine.force_flush()?;
        engine.put(b"a".to_vec(), b"new".to_vec())?;
        engine.force_flush()?;
        engine.close()?;
    }

    fs::remove_file(dir.path().join("sst").join("MANIFEST"))?;

    let engine = open_engine(dir.path());
    assert_eq!(engine.run_count(), 2);
    // newest-first order restored from run names
    assert_eq!(engine.get(b"a")?, Some(b"new".to_vec()));
    assert_eq!(manifest_entries(dir.path()).len(), 2);
    Ok(())
}

#[test]
fn manifest_entry_for_a_vanished_run_is_dropped() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = open_engine(dir.path());
        engine.put(b"a".to_vec(), b"1".to_vec())?;
        engine.force_flush()?;
        engine.close()?;
    }

    // delete the run behind the manifest's back
    let entries = manifest_entries(dir.path());
    fs::remove_dir_all(dir.path().join("sst").join(&entries[0]))?;

    let engine = open_engine(dir.path());
    assert_eq!(engine.run_count(), 0);
    assert!(manifest_entries(dir.path()).is_empty());
    Ok(())
}
