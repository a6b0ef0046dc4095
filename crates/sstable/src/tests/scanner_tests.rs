use super::build_run;
use crate::{RunScanner, TableOptions};
use tempfile::tempdir;

#[test]
fn scans_entries_in_ascending_order() {
    let dir = tempdir().unwrap();
    let path = build_run(
        dir.path(),
        "run-1",
        TableOptions::default(),
        &[
            (b"zebra", Some(b"3"), 3),
            (b"apple", Some(b"1"), 1),
            (b"mango", Some(b"2"), 2),
        ],
    );

    let mut s = RunScanner::open(&path).unwrap();
    let mut seen = Vec::new();
    while s.has_next().unwrap() {
        let (key, entry) = s.next_entry().unwrap().unwrap();
        seen.push((key, entry.seq));
    }

    assert_eq!(
        seen,
        vec![
            (b"apple".to_vec(), 1),
            (b"mango".to_vec(), 2),
            (b"zebra".to_vec(), 3)
        ]
    );
    assert!(!s.has_next().unwrap());
    assert!(s.next_entry().unwrap().is_none());
}

#[test]
fn peek_does_not_advance() {
    let dir = tempdir().unwrap();
    let path = build_run(
        dir.path(),
        "run-1",
        TableOptions::default(),
        &[(b"a", Some(b"1"), 1), (b"b", Some(b"2"), 2)],
    );

    let mut s = RunScanner::open(&path).unwrap();
    assert_eq!(s.peek_key().unwrap(), Some(&b"a"[..]));
    assert_eq!(s.peek_key().unwrap(), Some(&b"a"[..]));

    let (key, _) = s.next_entry().unwrap().unwrap();
    assert_eq!(key, b"a");
    assert_eq!(s.peek_key().unwrap(), Some(&b"b"[..]));
}

#[test]
fn tombstones_are_scanned_too() {
    let dir = tempdir().unwrap();
    let path = build_run(
        dir.path(),
        "run-1",
        TableOptions::default(),
        &[(b"dead", None, 5), (b"live", Some(b"v"), 6)],
    );

    let mut s = RunScanner::open(&path).unwrap();
    let (k1, e1) = s.next_entry().unwrap().unwrap();
    assert_eq!(k1, b"dead");
    assert_eq!(e1.value, None);
    assert_eq!(e1.seq, 5);

    let (k2, e2) = s.next_entry().unwrap().unwrap();
    assert_eq!(k2, b"live");
    assert_eq!(e2.value, Some(b"v".to_vec()));
}

#[test]
fn two_scanners_on_one_run_are_independent() {
    let dir = tempdir().unwrap();
    let path = build_run(
        dir.path(),
        "run-1",
        TableOptions::default(),
        &[(b"a", Some(b"1"), 1), (b"b", Some(b"2"), 2)],
    );

    let mut s1 = RunScanner::open(&path).unwrap();
    let mut s2 = RunScanner::open(&path).unwrap();

    s1.next_entry().unwrap();
    assert_eq!(s2.peek_key().unwrap(), Some(&b"a"[..]));
}
