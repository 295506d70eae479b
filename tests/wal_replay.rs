use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ArborDB::wal::{wal_path, WAL_HDR_SIZE};
use ArborDB::{Error, Root, Store, StoreBuilder, StoreConfig};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("arbor-{}-{}-{}", prefix, pid, t))
}

fn cfg(dir: &PathBuf) -> StoreConfig {
    StoreBuilder::from_default()
        .data_path(Some(dir))
        .compact_interval_secs(0)
        .build()
}

fn get(store: &Store, key: &[u8]) -> ArborDB::Result<Vec<u8>> {
    store.view(|txn| Ok(txn.get(key)?.value().to_vec()))
}

#[test]
fn commits_and_deletes_survive_reopen() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = unique_root("wal-reopen");
    {
        let store = Store::open(cfg(&dir))?;
        store.update(|txn| {
            txn.set(b"a", b"1")?;
            txn.set(b"b", b"2")
        })?;
        store.update(|txn| {
            txn.delete(b"a")?;
            txn.set(b"c", b"3")
        })?;
        store.close()?;
    }
    let store = Store::open(cfg(&dir))?;
    assert!(matches!(get(&store, b"a"), Err(Error::NotFound)));
    assert_eq!(get(&store, b"b")?, b"2");
    assert_eq!(get(&store, b"c")?, b"3");
    store.close()?;
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn torn_tail_is_dropped() -> Result<()> {
    let dir = unique_root("wal-torn");
    {
        let store = Store::open(cfg(&dir))?;
        store.update(|txn| txn.set(b"k", b"v"))?;
        store.close()?;
    }
    let wal = wal_path(&dir);
    let clean_len = fs::metadata(&wal)?.len();
    {
        let mut f = OpenOptions::new().append(true).open(&wal)?;
        f.write_all(&[1, 0, 0, 0, 9, 9, 9])?;
        f.sync_all()?;
    }

    let store = Store::open(cfg(&dir))?;
    assert_eq!(get(&store, b"k")?, b"v");
    assert_eq!(fs::metadata(&wal)?.len(), clean_len, "torn tail must be truncated");
    store.update(|txn| txn.set(b"k2", b"v2"))?;
    store.close()?;

    let store = Store::open(cfg(&dir))?;
    assert_eq!(get(&store, b"k2")?, b"v2");
    store.close()?;
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn corrupted_last_frame_is_discarded() -> Result<()> {
    let dir = unique_root("wal-crc");
    {
        let store = Store::open(cfg(&dir))?;
        store.update(|txn| txn.set(b"first", b"ok"))?;
        store.update(|txn| txn.set(b"second", b"lost"))?;
        store.close()?;
    }
    let wal = wal_path(&dir);
    let len = fs::metadata(&wal)?.len();
    assert!(len > WAL_HDR_SIZE as u64);
    {
        let mut f = OpenOptions::new().read(true).write(true).open(&wal)?;
        let mut last = [0u8; 1];
        f.seek(SeekFrom::Start(len - 1))?;
        f.read_exact(&mut last)?;
        f.seek(SeekFrom::Start(len - 1))?;
        f.write_all(&[!last[0]])?;
        f.sync_all()?;
    }

    let store = Store::open(cfg(&dir))?;
    assert_eq!(get(&store, b"first")?, b"ok");
    assert!(matches!(get(&store, b"second"), Err(Error::NotFound)));
    store.close()?;
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn compaction_shrinks_wal_and_keeps_live_data() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = unique_root("wal-compact");
    let wal = wal_path(&dir);
    {
        let store = Store::open(cfg(&dir))?;
        let items = Root::new(&store).root_item("compact/items", "compaction test")?;
        items.create_child(b"kept", b"value", &[b"kept-idx".as_slice()])?;
        for i in 0..200u32 {
            store.update(|txn| txn.set(b"hot", &i.to_be_bytes()))?;
        }
        store.update(|txn| txn.set(b"gone", b"x"))?;
        store.update(|txn| txn.delete(b"gone"))?;

        let before = fs::metadata(&wal)?.len();
        store.compact()?;
        let after = fs::metadata(&wal)?.len();
        assert!(after < before, "compaction must shrink the WAL: {} -> {}", before, after);

        // the store keeps working on the rewritten file
        store.update(|txn| txn.set(b"after", b"compact"))?;
        store.close()?;
    }
    let store = Store::open(cfg(&dir))?;
    assert_eq!(get(&store, b"hot")?, 199u32.to_be_bytes());
    assert!(matches!(get(&store, b"gone"), Err(Error::NotFound)));
    assert_eq!(get(&store, b"after")?, b"compact");
    let items = Root::new(&store).root_item("compact/items", "compaction test")?;
    assert_eq!(items.read_child_by_index(b"kept-idx")?.value(), b"value");
    store.close()?;
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn background_compaction_shrinks_wal() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = unique_root("wal-bg-compact");
    let wal = wal_path(&dir);
    {
        let store = Store::open(
            StoreBuilder::from_default()
                .data_path(Some(&dir))
                .compact_interval_secs(1)
                .compact_min_bytes(0)
                .build(),
        )?;
        for i in 0..200u32 {
            store.update(|txn| txn.set(b"hot", &i.to_be_bytes()))?;
        }
        // 200 commit frames; one live key fits in a single small snapshot frame
        let uncompacted = WAL_HDR_SIZE as u64 + 200 * 40;
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut len = fs::metadata(&wal)?.len();
        while len >= 1024 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(200));
            len = fs::metadata(&wal)?.len();
        }
        assert!(len < 1024, "background compaction did not run, wal is {} bytes", len);
        assert!(len < uncompacted);
        store.close()?;
    }
    let store = Store::open(cfg(&dir))?;
    assert_eq!(get(&store, b"hot")?, 199u32.to_be_bytes());
    store.close()?;
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn in_memory_store_writes_nothing() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.update(|txn| txn.set(b"k", b"v"))?;
    store.compact()?;
    assert_eq!(get(&store, b"k")?, b"v");
    assert!(store.config().is_in_memory());
    Ok(())
}
