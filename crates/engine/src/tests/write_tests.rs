use super::helpers::{open_engine, open_engine_with};
use crate::EngineError;
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Basic writes ---------------------

#[test]
fn put_then_get() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;

    assert_eq!(engine.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b")?, Some(b"2".to_vec()));
    assert_eq!(engine.get(b"c")?, None);
    Ok(())
}

#[test]
fn overwrite_returns_latest() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"a".to_vec(), b"2".to_vec())?;

    assert_eq!(engine.get(b"a")?, Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn sequence_numbers_are_monotonic() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    assert_eq!(engine.seq(), 0);
    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.delete(b"a".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    assert_eq!(engine.seq(), 3);
    Ok(())
}

// --------------------- Tombstone semantics ---------------------

#[test]
fn delete_then_get_returns_not_found() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.delete(b"a".to_vec())?;
    assert_eq!(engine.get(b"a")?, None);

    // ...and the tombstone survives the flush boundary
    engine.force_flush()?;
    assert_eq!(engine.get(b"a")?, None);
    Ok(())
}

#[test]
fn put_after_delete_revives() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.delete(b"k".to_vec())?;
    engine.put(b"k".to_vec(), b"v".to_vec())?;

    assert_eq!(engine.get(b"k")?, Some(b"v".to_vec()));
    Ok(())
}

#[test]
fn delete_of_missing_key_is_fine() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.delete(b"never-existed".to_vec())?;
    assert_eq!(engine.get(b"never-existed")?, None);
    Ok(())
}

// --------------------- Validation ---------------------

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let err = engine.put(Vec::new(), b"v".to_vec()).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[test]
fn oversized_key_and_value_are_rejected() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let big_key = vec![b'k'; 64 * 1024 + 1];
    assert!(matches!(
        engine.put(big_key, b"v".to_vec()),
        Err(EngineError::InvalidArgument(_))
    ));

    let big_value = vec![b'v'; 10 * 1024 * 1024 + 1];
    assert!(matches!(
        engine.put(b"k".to_vec(), big_value),
        Err(EngineError::InvalidArgument(_))
    ));
}

// --------------------- Flush handoff ---------------------

#[test]
fn small_threshold_produces_runs() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine_with(dir.path(), 64);

    for i in 0..40u64 {
        engine.put(format!("key{:04}", i).into_bytes(), vec![b'v'; 16])?;
    }
    engine.force_flush()?;

    assert!(engine.run_count() > 1, "should have flushed multiple runs");

    for i in 0..40u64 {
        let key = format!("key{:04}", i).into_bytes();
        assert_eq!(engine.get(&key)?, Some(vec![b'v'; 16]));
    }
    Ok(())
}

#[test]
fn force_flush_on_empty_memtable_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.force_flush()?;
    assert_eq!(engine.run_count(), 0);
    Ok(())
}

#[test]
fn force_flush_drains_the_memtable() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    assert!(engine.memtable_bytes() > 0);

    engine.force_flush()?;
    assert_eq!(engine.memtable_bytes(), 0);
    assert_eq!(engine.sealed_memtable_count(), 0);
    assert_eq!(engine.run_count(), 1);
    assert_eq!(engine.get(b"a")?, Some(b"1".to_vec()));
    Ok(())
}

#[test]
fn many_keys_with_deletes() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine_with(dir.path(), 4096);

    for i in 0..500u64 {
        engine.put(format!("key{:04}", i).into_bytes(), vec![b'v'; 64])?;
    }
    for i in (0..500u64).step_by(2) {
        engine.delete(format!("key{:04}", i).into_bytes())?;
    }

    for i in 0..500u64 {
        let key = format!("key{:04}", i).into_bytes();
        if i % 2 == 0 {
            assert_eq!(engine.get(&key)?, None, "key{:04} should be deleted", i);
        } else {
            assert!(engine.get(&key)?.is_some(), "key{:04} should exist", i);
        }
    }
    Ok(())
}

// --------------------- Close ---------------------

#[test]
fn operations_after_close_are_cancelled() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.close()?;

    assert!(matches!(
        engine.put(b"b".to_vec(), b"2".to_vec()),
        Err(EngineError::Cancelled)
    ));
    assert!(matches!(engine.get(b"a"), Err(EngineError::Cancelled)));
    assert!(matches!(engine.delete(b"a".to_vec()), Err(EngineError::Cancelled)));
    Ok(())
}

#[test]
fn close_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    engine.put(b"a".to_vec(), b"1".to_vec())?;

    engine.close()?;
    engine.close()?;
    Ok(())
}

#[test]
fn close_flushes_the_active_memtable() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.close()?;

    assert_eq!(super::helpers::count_run_dirs(dir.path()), 1);
    Ok(())
}
