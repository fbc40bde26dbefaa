//! # Engine Integration Tests
//!
//! Exercise the write path (WAL -> memtable -> flush -> compaction), crash
//! recovery, and column-family lifecycle through the public API.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use takumi_core::config::DbConfig;
use takumi_core::error::Error;
use takumi_core::traits::Disposable;
use takumi_storage::{ColumnFamilyOptions, Database};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config(data_dir: &std::path::Path) -> DbConfig {
    let mut config = DbConfig::with_data_dir(data_dir);
    // Background loops stay quiet; tests drive flush/compaction explicitly.
    config.flush_interval = Duration::from_secs(3600);
    config.compaction_interval = Duration::from_secs(3600);
    config
}

async fn open_db(data_dir: &std::path::Path) -> Database {
    Database::open(test_config(data_dir)).await.unwrap()
}

#[tokio::test]
async fn test_put_get_delete() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    db.put_cf(&cf, b"key", b"value").await.unwrap();
    let value = db.get_cf(&cf, b"key").await.unwrap().unwrap();
    assert_eq!(&value[..], b"value");

    db.delete_cf(&cf, b"key").await.unwrap();
    assert!(db.get_cf(&cf, b"key").await.unwrap().is_none());
    assert!(db.get_cf(&cf, b"missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sequence_numbers_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    let s1 = db.put_cf(&cf, b"a", b"1").await.unwrap();
    let s2 = db.put_cf(&cf, b"b", b"2").await.unwrap();
    let s3 = db.delete_cf(&cf, b"a").await.unwrap();
    assert!(s1 < s2 && s2 < s3);
    assert_eq!(db.latest_sequence(), s3);
}

#[tokio::test]
async fn test_reads_survive_flush() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    for i in 0..100 {
        let key = format!("key_{:03}", i);
        let value = format!("value_{}", i);
        db.put_cf(&cf, key.as_bytes(), value.as_bytes()).await.unwrap();
    }

    db.flush().await.unwrap();

    // All reads now come from the level-0 file.
    for i in 0..100 {
        let key = format!("key_{:03}", i);
        let value = db.get_cf(&cf, key.as_bytes()).await.unwrap().unwrap();
        assert_eq!(value, format!("value_{}", i).as_bytes());
    }

    let live = db.capture_live_files();
    assert_eq!(live.len(), 1);
    assert_eq!(live.files[0].level, 0);
    assert_eq!(live.files[0].entry_count, 100);
}

#[tokio::test]
async fn test_newer_flush_shadows_older() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    db.put_cf(&cf, b"key", b"old").await.unwrap();
    db.flush().await.unwrap();
    db.put_cf(&cf, b"key", b"new").await.unwrap();
    db.flush().await.unwrap();

    let value = db.get_cf(&cf, b"key").await.unwrap().unwrap();
    assert_eq!(&value[..], b"new");
}

#[tokio::test]
async fn test_tombstone_shadows_across_flushes() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    db.put_cf(&cf, b"key", b"value").await.unwrap();
    db.flush().await.unwrap();
    db.delete_cf(&cf, b"key").await.unwrap();
    db.flush().await.unwrap();

    assert!(db.get_cf(&cf, b"key").await.unwrap().is_none());
}

#[tokio::test]
async fn test_crash_recovery_replays_wal() {
    let dir = TempDir::new().unwrap();

    // First session: write without flushing, then "crash".
    {
        let db = open_db(dir.path()).await;
        let cf = db.default_column_family();
        for i in 0..50 {
            db.put_cf(&cf, format!("key_{}", i).as_bytes(), b"recovered")
                .await
                .unwrap();
        }
        db.delete_cf(&cf, b"key_0").await.unwrap();
        drop(db);
    }

    // Second session: everything must come back from the WAL.
    {
        let db = open_db(dir.path()).await;
        let cf = db.default_column_family();

        assert!(db.get_cf(&cf, b"key_0").await.unwrap().is_none());
        for i in 1..50 {
            let value = db
                .get_cf(&cf, format!("key_{}", i).as_bytes())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&value[..], b"recovered");
        }
    }
}

#[tokio::test]
async fn test_flushed_data_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let db = open_db(dir.path()).await;
        let cf = db.default_column_family();
        db.put_cf(&cf, b"durable", b"yes").await.unwrap();
        db.flush().await.unwrap();
    }

    {
        let db = open_db(dir.path()).await;
        let cf = db.default_column_family();
        let value = db.get_cf(&cf, b"durable").await.unwrap().unwrap();
        assert_eq!(&value[..], b"yes");
    }
}

#[tokio::test]
async fn test_compaction_merges_level_zero() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    // Build enough level-0 files to cross the threshold.
    for i in 0..5 {
        db.put_cf(&cf, format!("key_{}", i).as_bytes(), format!("v{}", i).as_bytes())
            .await
            .unwrap();
        db.flush().await.unwrap();
    }
    assert_eq!(db.capture_live_files().len(), 5);

    db.compact().await.unwrap();

    let live = db.capture_live_files();
    assert_eq!(live.len(), 1);
    assert_eq!(live.files[0].level, 1);

    // Inputs are gone from disk (nothing pinned them).
    let sstables: Vec<_> = std::fs::read_dir(dir.path().join("sstables"))
        .unwrap()
        .collect();
    assert_eq!(sstables.len(), 1);

    for i in 0..5 {
        let value = db
            .get_cf(&cf, format!("key_{}", i).as_bytes())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, format!("v{}", i).as_bytes());
    }
}

#[tokio::test]
async fn test_compaction_drops_deleted_keys() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    for i in 0..4 {
        db.put_cf(&cf, format!("key_{}", i).as_bytes(), b"v").await.unwrap();
        db.flush().await.unwrap();
    }
    db.delete_cf(&cf, b"key_0").await.unwrap();
    db.flush().await.unwrap();

    db.compact().await.unwrap();

    assert!(db.get_cf(&cf, b"key_0").await.unwrap().is_none());
    let live = db.capture_live_files();
    assert_eq!(live.len(), 1);
    assert_eq!(live.files[0].entry_count, 3, "tombstone and victim dropped");
}

#[tokio::test]
async fn test_column_family_lifecycle() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;

    let events = db
        .create_column_family("events", ColumnFamilyOptions::default())
        .await
        .unwrap();
    db.put_cf(&events, b"e1", b"login").await.unwrap();

    // Keyspaces are independent.
    let default = db.default_column_family();
    assert!(db.get_cf(&default, b"e1").await.unwrap().is_none());

    // Duplicate names are rejected.
    match db.create_column_family("events", ColumnFamilyOptions::default()).await {
        Err(Error::InvalidArgument { .. }) => {}
        other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
    }

    let stale = events.clone();
    db.drop_column_family(&events).await.unwrap();

    match db.get_cf(&stale, b"e1").await {
        Err(Error::NotFound { .. }) => {}
        other => panic!("expected NotFound for dropped family, got {:?}", other),
    }
    assert!(db.column_family("events").is_none());
}

#[tokio::test]
async fn test_default_column_family_cannot_be_dropped() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let default = db.default_column_family();

    match db.drop_column_family(&default).await {
        Err(Error::InvalidArgument { .. }) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
}

#[tokio::test]
async fn test_released_handle_fails_illegal_state() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;

    let cf = db
        .create_column_family("scratch", ColumnFamilyOptions::default())
        .await
        .unwrap();
    cf.dispose();

    match db.put_cf(&cf, b"k", b"v").await {
        Err(Error::IllegalState { .. }) => {}
        other => panic!("expected IllegalState, got {:?}", other),
    }

    // A fresh handle to the same family still works.
    let fresh = db.column_family("scratch").unwrap();
    db.put_cf(&fresh, b"k", b"v").await.unwrap();
}

#[tokio::test]
async fn test_unknown_comparator_rejected() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;

    let options = ColumnFamilyOptions {
        comparator: "locale-aware".to_string(),
    };
    match db.create_column_family("weird", options).await {
        Err(Error::InvalidArgument { .. }) => {}
        other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_operations_fail_after_close() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    db.put_cf(&cf, b"key", b"value").await.unwrap();
    db.close().await.unwrap();

    match db.put_cf(&cf, b"key2", b"value2").await {
        Err(Error::IllegalState { .. }) => {}
        other => panic!("expected IllegalState, got {:?}", other),
    }
    match db.get_cf(&cf, b"key").await {
        Err(Error::IllegalState { .. }) => {}
        other => panic!("expected IllegalState, got {:?}", other),
    }

    // close() flushed; data is durable for the next open.
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();
    let value = db.get_cf(&cf, b"key").await.unwrap().unwrap();
    assert_eq!(&value[..], b"value");
}

#[tokio::test]
async fn test_randomized_writes_round_trip() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    let mut rng = StdRng::seed_from_u64(7);
    let mut expected: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

    for i in 0..400 {
        let key = format!("key_{:03}", rng.gen_range(0..150)).into_bytes();
        if rng.gen_bool(0.2) {
            db.delete_cf(&cf, &key).await.unwrap();
            expected.remove(&key);
        } else {
            let value = format!("value_{}", i).into_bytes();
            db.put_cf(&cf, &key, &value).await.unwrap();
            expected.insert(key, value);
        }

        // Interleave flushes so reads span memtable and sorted files.
        if i % 97 == 0 {
            db.flush().await.unwrap();
        }
    }
    db.flush().await.unwrap();
    db.compact().await.unwrap();

    for i in 0..150 {
        let key = format!("key_{:03}", i).into_bytes();
        let got = db.get_cf(&cf, &key).await.unwrap();
        assert_eq!(
            got.as_deref(),
            expected.get(&key).map(|v| v.as_slice()),
            "mismatch for key_{:03}",
            i
        );
    }
}

#[tokio::test]
async fn test_empty_key_rejected() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).await;
    let cf = db.default_column_family();

    match db.put_cf(&cf, b"", b"v").await {
        Err(Error::InvalidArgument { .. }) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
}
