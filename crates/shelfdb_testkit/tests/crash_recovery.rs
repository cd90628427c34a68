//! Recovery after interrupted appends, damaged lines and failed rewrites.

use shelfdb_core::{WalBackend, WriteOp};
use shelfdb_storage::StorageBackend;
use shelfdb_testkit::crash::CrashableBackend;

fn put(store: &str, key: u8, value: u8) -> WriteOp {
    WriteOp::Put {
        store: store.to_string(),
        key: vec![key],
        value: vec![value],
    }
}

#[test]
fn torn_tail_is_dropped_and_later_appends_start_clean() {
    let (backend, handle) = CrashableBackend::new();
    let mut wal = WalBackend::open(Box::new(backend), false).unwrap();
    wal.put("s", vec![1], vec![1]).unwrap();
    wal.put("s", vec![2], vec![2]).unwrap();

    handle.crash_after(10);
    assert!(wal.put("s", vec![3], vec![3]).is_err());
    assert!(handle.has_crashed());
    // The failed put never reached memory.
    assert_eq!(wal.get("s", &[3]), None);

    let (survived, next) = CrashableBackend::with_data(handle.data());
    let mut wal = WalBackend::open(Box::new(survived), false).unwrap();
    assert_eq!(wal.len("s"), 2);
    assert_eq!(wal.replay_report().truncated_bytes, 10);

    wal.put("s", vec![4], vec![4]).unwrap();
    drop(wal);
    let wal = WalBackend::open(Box::new(next.restart()), false).unwrap();
    assert_eq!(wal.replay_report().skipped, 0);
    assert_eq!(wal.len("s"), 3);
}

#[test]
fn interrupted_batch_applies_nothing() {
    let (backend, handle) = CrashableBackend::new();
    let mut wal = WalBackend::open(Box::new(backend), false).unwrap();
    wal.apply_batch(vec![put("s", 1, 1)]).unwrap();

    handle.crash_after(40);
    let result = wal.apply_batch(vec![put("s", 2, 2), put("s", 3, 3), put("t", 1, 1)]);
    assert!(result.is_err());

    let wal = WalBackend::open(Box::new(handle.restart()), false).unwrap();
    assert_eq!(wal.len("s"), 1);
    assert_eq!(wal.len("t"), 0);
    assert_eq!(wal.get("s", &[1]), Some(vec![1]));
}

#[test]
fn damaged_line_is_skipped_without_losing_neighbours() {
    let (backend, handle) = CrashableBackend::new();
    let mut wal = WalBackend::open(Box::new(backend), false).unwrap();
    wal.put("s", vec![1], vec![1]).unwrap();
    drop(wal);

    let mut image = handle.data();
    image.extend_from_slice(b"{\"op\":\"put\",\"store\":\"s\",\"key\":\"zz\"}\n");
    image.extend_from_slice(b"\x00\x01garbage\n");
    let (mut backend, _) = CrashableBackend::with_data(image);
    let line = shelfdb_core::wal::LogEntry::put("s", vec![2], vec![2])
        .encode_line()
        .unwrap();
    backend.append(&line).unwrap();

    let wal = WalBackend::open(Box::new(backend), false).unwrap();
    let report = wal.replay_report();
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(wal.get("s", &[1]), Some(vec![1]));
    assert_eq!(wal.get("s", &[2]), Some(vec![2]));
}

#[test]
fn failed_compaction_keeps_old_log() {
    let (backend, handle) = CrashableBackend::new();
    let mut wal = WalBackend::open(Box::new(backend), false).unwrap();
    for i in 0..5 {
        wal.put("s", vec![i], vec![i]).unwrap();
    }
    wal.delete("s", &[0]).unwrap();
    let before = handle.data();

    handle.set_fail_on_replace(true);
    assert!(wal.compact().is_err());
    assert_eq!(handle.data(), before);

    // Still usable, and the old log still replays to the same state.
    wal.put("s", vec![9], vec![9]).unwrap();
    let wal = WalBackend::open(Box::new(handle.restart()), false).unwrap();
    assert_eq!(wal.len("s"), 5);
    assert_eq!(wal.get("s", &[0]), None);
}

#[test]
fn writes_after_a_lost_rewrite_handle_fail_instead_of_vanishing() {
    let (backend, handle) = CrashableBackend::new();
    let mut wal = WalBackend::open(Box::new(backend), false).unwrap();
    for i in 0..4 {
        wal.put("s", vec![i], vec![i]).unwrap();
    }
    wal.put("s", vec![0], vec![7]).unwrap();

    handle.set_detach_on_replace(true);
    assert!(wal.compact().is_err());
    assert!(wal.put("s", vec![9], vec![9]).is_err());

    let wal = WalBackend::open(Box::new(handle.restart()), false).unwrap();
    assert_eq!(wal.replay_report().applied, 4);
    assert_eq!(wal.get("s", &[0]), Some(vec![7]));
    assert_eq!(wal.get("s", &[9]), None);
}
