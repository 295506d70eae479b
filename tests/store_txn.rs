use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use ArborDB::util::now_secs;
use ArborDB::{Entry, Error, IterOptions, Store, StoreBuilder, StoreConfig, Txn};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("arbor-{}-{}-{}", prefix, pid, t))
}

fn keys(txn: &Txn, opts: IterOptions) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut it = txn.iter(opts);
    it.rewind();
    while let Some(k) = it.key() {
        out.push(k.to_vec());
        it.next();
    }
    out
}

#[test]
fn readers_see_their_snapshot() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Store::open_in_memory()?;
    store.update(|txn| txn.set(b"k", b"v1"))?;

    let reader = store.begin(false)?;
    store.update(|txn| txn.set(b"k", b"v2"))?;
    store.update(|txn| txn.set(b"new", b"n"))?;

    assert_eq!(reader.get(b"k")?.value(), b"v1");
    assert!(matches!(reader.get(b"new"), Err(Error::NotFound)));
    drop(reader);

    store.view(|txn| {
        assert_eq!(txn.get(b"k")?.value(), b"v2");
        Ok(())
    })?;
    Ok(())
}

#[test]
fn concurrent_write_after_read_conflicts() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.update(|txn| txn.set(b"counter", b"1"))?;

    let mut t1 = store.begin(true)?;
    assert_eq!(t1.get(b"counter")?.value(), b"1");

    store.update(|txn| txn.set(b"counter", b"2"))?;

    t1.set(b"counter", b"from-t1")?;
    assert!(matches!(t1.commit(), Err(Error::Conflict)));
    assert!(ArborDB::metrics::snapshot().txn_conflicts >= 1);
    assert!(matches!(t1.commit(), Err(Error::TxnDiscarded)));

    store.view(|txn| {
        assert_eq!(txn.get(b"counter")?.value(), b"2");
        Ok(())
    })?;

    // disjoint keys commit fine
    let mut t2 = store.begin(true)?;
    t2.get(b"counter")?;
    store.update(|txn| txn.set(b"other", b"x"))?;
    t2.set(b"mine", b"y")?;
    t2.commit()?;
    Ok(())
}

#[test]
fn txn_rules() -> Result<()> {
    let store = Store::open_in_memory()?;

    let mut ro = store.begin(false)?;
    assert!(matches!(ro.set(b"k", b"v"), Err(Error::ReadOnlyTxn)));
    assert!(matches!(ro.delete(b"k"), Err(Error::ReadOnlyTxn)));
    ro.commit()?;

    let mut rw = store.begin(true)?;
    assert!(matches!(rw.set(b"", b"v"), Err(Error::EmptyKey)));
    rw.set(b"k", b"v")?;
    rw.discard();
    rw.discard();
    assert!(matches!(rw.commit(), Err(Error::TxnDiscarded)));

    // a failing closure discards its writes
    let res: ArborDB::Result<()> = store.update(|txn| {
        txn.set(b"k", b"v")?;
        Err(Error::NotFound)
    });
    assert!(res.is_err());
    store.view(|txn| {
        assert!(!txn.exists(b"k")?);
        Ok(())
    })?;
    Ok(())
}

#[test]
fn iterator_merges_pending_writes() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.update(|txn| {
        for k in [b"p:1".as_slice(), b"p:3", b"p:5", b"q:1"] {
            txn.set(k, b"")?;
        }
        Ok(())
    })?;

    let mut txn = store.begin(true)?;
    txn.set(b"p:2", b"")?;
    txn.delete(b"p:3")?;

    assert_eq!(
        keys(&txn, IterOptions::with_prefix(b"p:")),
        vec![b"p:1".to_vec(), b"p:2".to_vec(), b"p:5".to_vec()]
    );
    assert_eq!(
        keys(&txn, IterOptions::with_prefix(b"p:").reverse(true)),
        vec![b"p:5".to_vec(), b"p:2".to_vec(), b"p:1".to_vec()]
    );

    let mut it = txn.iter(IterOptions::with_prefix(b"p:"));
    it.seek(b"p:3");
    assert_eq!(it.key(), Some(b"p:5".as_slice()));
    assert!(it.valid_for_prefix(b"p:5"));
    it.next();
    assert!(!it.valid());

    let mut it = txn.iter(IterOptions::with_prefix(b"p:").reverse(true));
    it.seek(b"p:4");
    assert_eq!(it.key(), Some(b"p:2".as_slice()));
    drop(it);
    txn.discard();
    Ok(())
}

#[test]
fn iteration_spans_many_batches() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.update(|txn| {
        for i in 0..500u32 {
            txn.set(&i.to_be_bytes(), b"")?;
        }
        Ok(())
    })?;
    let got = store.view(|txn| Ok(keys(txn, IterOptions::default())))?;
    assert_eq!(got.len(), 500);
    assert!(got.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn drop_prefix_removes_only_matching_keys() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.update(|txn| {
        txn.set(b"a:1", b"")?;
        txn.set(b"a:2", b"")?;
        txn.set(b"b:1", b"")
    })?;
    store.drop_prefix(b"a:")?;
    let left = store.view(|txn| Ok(keys(txn, IterOptions::default())))?;
    assert_eq!(left, vec![b"b:1".to_vec()]);
    Ok(())
}

#[test]
fn expired_entries_are_invisible() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.update(|txn| {
        txn.set_entry(Entry::new(b"old", b"v").with_expires_at(now_secs().saturating_sub(1)))?;
        txn.set_entry(Entry::new(b"fresh", b"v").with_ttl(Duration::from_secs(3600)))
    })?;
    store.view(|txn| {
        assert!(matches!(txn.get(b"old"), Err(Error::NotFound)));
        assert!(txn.get(b"fresh")?.expires_at() > now_secs());
        assert_eq!(keys(txn, IterOptions::default()), vec![b"fresh".to_vec()]);
        Ok(())
    })?;
    Ok(())
}

#[test]
fn sequences_continue_after_reopen() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = unique_root("seq");
    {
        let store = Store::open(StoreBuilder::from_default().data_path(Some(&dir)).seq_bandwidth(10).build())?;
        let seq = store.sequence(b"ids", 0)?;
        for want in 0..15u64 {
            assert_eq!(seq.next()?, want);
        }
        let other = store.sequence(b"other", 3)?;
        assert_eq!(other.next()?, 0);
        store.close()?;
        assert!(matches!(seq.next(), Err(Error::Closed)));
    }
    let store = Store::open(StoreConfig::at(&dir))?;
    let seq = store.sequence(b"ids", 0)?;
    assert_eq!(seq.next()?, 15, "unused lease is returned on close");
    assert_eq!(store.sequence(b"other", 3)?.next()?, 1);
    store.close()?;
    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn sequence_handles_share_a_counter() -> Result<()> {
    let store = Store::open_in_memory()?;
    let seq = store.sequence(b"shared", 4)?;
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let s = seq.clone();
            std::thread::spawn(move || (0..25).map(|_| s.next()).collect::<ArborDB::Result<Vec<u64>>>())
        })
        .collect();
    let mut all = Vec::new();
    for t in threads {
        all.extend(t.join().expect("thread")?);
    }
    all.sort_unstable();
    assert_eq!(all, (0..100).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn buffered_writes_land_after_flush_and_close() -> Result<()> {
    let dir = unique_root("buffered");
    {
        let store = Store::open(StoreBuilder::from_default().data_path(Some(&dir)).write_queue(8).build())?;
        for i in 0..50u32 {
            store.write_buffered(Entry::new(&i.to_be_bytes(), b"b"))?;
        }
        store.flush_buffered()?;
        let n = store.view(|txn| Ok(keys(txn, IterOptions::default()).len()))?;
        assert_eq!(n, 50);

        for i in 50..60u32 {
            store.write_buffered(Entry::new(&i.to_be_bytes(), b"b"))?;
        }
        store.close()?;
        assert!(matches!(store.write_buffered(Entry::new(b"late", b"")), Err(Error::Closed)));
    }
    let store = Store::open(StoreConfig::at(&dir))?;
    let n = store.view(|txn| Ok(keys(txn, IterOptions::default()).len()))?;
    assert_eq!(n, 60);
    store.close()?;
    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn directory_is_locked_while_open() -> Result<()> {
    let dir = unique_root("lock");
    let store = Store::open(StoreConfig::at(&dir))?;
    assert!(Store::open(StoreConfig::at(&dir)).is_err());
    store.close()?;
    store.close()?;
    assert!(store.is_closed());
    assert!(matches!(store.begin(false), Err(Error::Closed)));

    let again = Store::open(StoreConfig::at(&dir))?;
    drop(again);
    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
