use super::*;
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn make_put(key: &[u8], value: &[u8]) -> WalRecord {
    WalRecord::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn make_del(key: &[u8]) -> WalRecord {
    WalRecord::Del { key: key.to_vec() }
}

fn replay_all(path: &std::path::Path) -> Result<Vec<WalRecord>, WalError> {
    let mut reader = WalReader::open(path)?;
    let mut recs = Vec::new();
    reader.replay(|r| recs.push(r))?;
    Ok(recs)
}

fn replay_from_bytes(data: &[u8]) -> Result<Vec<WalRecord>, WalError> {
    let cursor = Cursor::new(data.to_vec());
    let mut reader = WalReader::from_reader(cursor);
    let mut recs = Vec::new();
    reader.replay(|r| recs.push(r))?;
    Ok(recs)
}

// -------------------- Basic write & replay --------------------

#[test]
fn write_and_replay_put_and_del() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"k", b"v1")).unwrap();
        w.append(&make_put(b"k2", b"v2")).unwrap();
        w.append(&make_del(b"k")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(
        recs,
        vec![make_put(b"k", b"v1"), make_put(b"k2", b"v2"), make_del(b"k")]
    );
}

#[test]
fn empty_file_replays_to_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");
    fs::write(&path, b"").unwrap();

    let recs = replay_all(&path).unwrap();
    assert!(recs.is_empty());
}

#[test]
fn empty_key_and_value_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"", b"")).unwrap();
        w.append(&make_del(b"")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![make_put(b"", b""), make_del(b"")]);
}

#[test]
fn appends_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"a", b"1")).unwrap();
    }
    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"b", b"2")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![make_put(b"a", b"1"), make_put(b"b", b"2")]);
}

#[test]
fn wire_layout_is_op_len_key_len_value_crc() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"ab", b"xyz")).unwrap();
    }

    let bytes = fs::read(&path).unwrap();
    // op(1) + key_len(4) + key(2) + val_len(4) + val(3) + crc(4)
    assert_eq!(bytes.len(), 18);
    assert_eq!(bytes[0], OP_PUT);
    assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 2);
    assert_eq!(&bytes[5..7], b"ab");
    assert_eq!(u32::from_le_bytes(bytes[7..11].try_into().unwrap()), 3);
    assert_eq!(&bytes[11..14], b"xyz");
}

// -------------------- Torn tails --------------------

#[test]
fn torn_tail_of_any_length_is_tolerated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"first", b"value-1")).unwrap();
        w.append(&make_put(b"second", b"value-2")).unwrap();
    }

    let full = fs::read(&path).unwrap();
    // op(1)+len(4)+key(6)+len(4)+val(7)+crc(4) for the second record
    let second_len = 1 + 4 + 6 + 4 + 7 + 4;

    for cut in 1..=second_len {
        let truncated = &full[..full.len() - cut];
        let recs = replay_from_bytes(truncated)
            .unwrap_or_else(|e| panic!("cut of {} bytes must not fail: {:?}", cut, e));
        assert_eq!(
            recs,
            vec![make_put(b"first", b"value-1")],
            "cut of {} bytes should leave exactly the first record",
            cut
        );
    }
}

#[test]
fn torn_tail_inside_first_record_yields_empty_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"only", b"record")).unwrap();
    }

    let full = fs::read(&path).unwrap();
    let recs = replay_from_bytes(&full[..3]).unwrap();
    assert!(recs.is_empty());
}

// -------------------- Corruption --------------------

#[test]
fn unknown_op_code_is_corrupt() {
    let data = vec![9u8, 0, 0, 0, 0];
    assert!(matches!(replay_from_bytes(&data), Err(WalError::Corrupt)));
}

#[test]
fn flipped_value_byte_fails_crc() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"key", b"value")).unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() - 6; // inside the value, before the crc
    bytes[mid] ^= 0xff;

    assert!(matches!(replay_from_bytes(&bytes), Err(WalError::Corrupt)));
}

#[test]
fn corruption_in_middle_aborts_even_with_valid_records_after() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryRecord).unwrap();
        w.append(&make_put(b"aaa", b"111")).unwrap();
        w.append(&make_put(b"bbb", b"222")).unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    bytes[6] ^= 0x01; // inside the first record's key

    assert!(matches!(replay_from_bytes(&bytes), Err(WalError::Corrupt)));
}

#[test]
fn absurd_key_length_is_corrupt() {
    let mut data = vec![OP_DELETE];
    data.extend_from_slice(&u32::MAX.to_le_bytes());
    assert!(matches!(replay_from_bytes(&data), Err(WalError::Corrupt)));
}

// -------------------- Sync policies --------------------

#[test]
fn every_n_policy_appends_and_replays() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryN(10)).unwrap();
        for i in 0..25u32 {
            w.append(&make_put(format!("k{}", i).as_bytes(), b"v")).unwrap();
        }
        w.sync_to_disk().unwrap();
    }

    assert_eq!(replay_all(&path).unwrap().len(), 25);
}

#[test]
fn every_millis_policy_appends_and_replays() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal-0.log");

    {
        let mut w = WalWriter::create(&path, SyncPolicy::EveryMillis(1_000)).unwrap();
        w.append(&make_put(b"a", b"1")).unwrap();
        w.append(&make_put(b"b", b"2")).unwrap();
        w.close().unwrap();
    }

    assert_eq!(replay_all(&path).unwrap().len(), 2);
}

// -------------------- Rotation --------------------

#[test]
fn rotate_switches_segments_and_preserves_old() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("wal-0.log");
    let second = dir.path().join("wal-1.log");

    let mut w = WalWriter::create(&first, SyncPolicy::EveryRecord).unwrap();
    w.append(&make_put(b"old", b"1")).unwrap();

    w.rotate(&second).unwrap();
    assert_eq!(w.path(), second.as_path());
    w.append(&make_put(b"new", b"2")).unwrap();
    w.close().unwrap();

    assert_eq!(replay_all(&first).unwrap(), vec![make_put(b"old", b"1")]);
    assert_eq!(replay_all(&second).unwrap(), vec![make_put(b"new", b"2")]);
}
