//! store — встроенное упорядоченное транзакционное KV-хранилище.
//!
//! Разделение:
//! - engine.rs     — MVCC-карта, оракул, коммит, компакция.
//! - txn.rs        — транзакции (get/set/delete/iter/commit/discard).
//! - iter.rs       — итератор с префиксом, seek и обратным порядком.
//! - sequence.rs   — последовательности с арендой диапазонов.
//! - background.rs — поток буферизованной записи и периодической компакции.
//!
//! Режимы:
//! - in-memory: `data_path == None`, на диск ничего не пишется;
//! - persistent: LOCK + WAL в `data_path`, реплей при открытии.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::lock::try_lock_dir;
use crate::util::expires_at_from_ttl;
use crate::wal::{wal_replay, Wal};

mod background;
mod engine;
mod iter;
mod sequence;
mod txn;

pub use iter::{Iter, IterOptions};
pub use sequence::Sequence;
pub use txn::Txn;

use background::{Msg, Worker};
use engine::{apply_replayed, Core, Value};
use sequence::SeqShared;

// -------------------- Entry / StoreItem --------------------

/// A full write: key, value, metadata byte and absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub meta: u8,
    /// Unix seconds, 0 = never.
    pub expires_at: u64,
}

impl Entry {
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            value: value.to_vec(),
            meta: 0,
            expires_at: 0,
        }
    }

    pub fn with_meta(mut self, meta: u8) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Expire `ttl` from now; zero keeps the entry forever.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = expires_at_from_ttl(ttl);
        self
    }
}

/// A visible entry returned by a read. Cheap to clone.
#[derive(Clone)]
pub struct StoreItem {
    key: Vec<u8>,
    value: Arc<Value>,
}

impl StoreItem {
    pub(crate) fn new(key: Vec<u8>, value: Arc<Value>) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value.data
    }

    pub fn meta(&self) -> u8 {
        self.value.meta
    }

    pub fn expires_at(&self) -> u64 {
        self.value.expires_at
    }
}

impl std::fmt::Debug for StoreItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreItem")
            .field("key", &self.key)
            .field("len", &self.value.data.len())
            .field("meta", &self.value.meta)
            .field("expires_at", &self.value.expires_at)
            .finish()
    }
}

// -------------------- Store --------------------

struct StoreInner {
    core: Arc<Core>,
    worker: Mutex<Option<Worker>>,
    sequences: Mutex<Vec<Arc<SeqShared>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl StoreInner {
    fn close(&self) -> Result<()> {
        if self.core.is_closed() {
            return Ok(());
        }
        let mut first_err: Option<Error> = None;

        if let Some(w) = lock(&self.worker).take() {
            if let Err(e) = w.shutdown() {
                first_err.get_or_insert(e);
            }
        }
        for seq in lock(&self.sequences).drain(..) {
            if let Err(e) = seq.release() {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.core.sync_wal() {
            first_err.get_or_insert(e);
        }
        self.core.mark_closed();
        info!("store closed");
        debug!("store metrics: {}", crate::metrics::snapshot());

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("store close on drop: {}", e);
        }
    }
}

/// Embedded ordered transactional key-value store.
///
/// Cloning is cheap and yields another handle to the same store; [`Store::close`]
/// (or dropping the last handle) stops the background writer, releases sequence
/// leases and syncs the WAL.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn open(cfg: StoreConfig) -> Result<Self> {
        info!("store: open {}", cfg);

        let core = match cfg.data_path.clone() {
            None => Core::new(cfg, None, None, 0, BTreeMap::new()),
            Some(root) => {
                let guard = try_lock_dir(&root)?;
                let mut data = BTreeMap::new();
                let max_lsn = wal_replay(&root, |_, ops| {
                    apply_replayed(&mut data, ops);
                    Ok(())
                })?;
                let wal = Wal::open_for_append(&root, cfg.wal_fsync)?;
                debug!(
                    "store: recovered {} key(s) up to lsn {} from {}",
                    data.len(),
                    max_lsn,
                    wal.path().display()
                );
                Core::new(cfg, Some(guard), Some(wal), max_lsn, data)
            }
        };
        let core = Arc::new(core);
        let worker = Worker::spawn(Arc::clone(&core))?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                core,
                worker: Mutex::new(Some(worker)),
                sequences: Mutex::new(Vec::new()),
            }),
        })
    }

    /// In-memory store with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.core.cfg
    }

    pub fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }

    /// Start a transaction; `update = false` gives a read-only one.
    pub fn begin(&self, update: bool) -> Result<Txn> {
        Txn::begin(Arc::clone(&self.inner.core), update)
    }

    /// Run `f` in a read-only transaction.
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Txn) -> Result<T>,
    {
        let mut txn = self.begin(false)?;
        let out = f(&txn);
        txn.discard();
        out
    }

    /// Run `f` in a read-write transaction; commit on `Ok`, discard on `Err`.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Txn) -> Result<T>,
    {
        let mut txn = self.begin(true)?;
        let out = f(&mut txn)?;
        txn.commit()?;
        Ok(out)
    }

    /// Delete every key starting with `prefix` in one commit.
    pub fn drop_prefix(&self, prefix: &[u8]) -> Result<()> {
        self.update(|txn| {
            let mut keys = Vec::new();
            {
                let mut it = txn.iter(IterOptions::with_prefix(prefix));
                it.rewind();
                while let Some(k) = it.key() {
                    keys.push(k.to_vec());
                    it.next();
                }
            }
            for k in &keys {
                txn.delete(k)?;
            }
            debug!("drop_prefix: {} key(s)", keys.len());
            Ok(())
        })
    }

    /// Rewrite the WAL keeping only live entries.
    pub fn compact(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.inner.core.compact()
    }

    /// Persistent sequence stored under `key`; `bandwidth == 0` uses the
    /// configured default.
    pub fn sequence(&self, key: &[u8], bandwidth: u64) -> Result<Sequence> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let bw = if bandwidth == 0 {
            self.config().seq_bandwidth
        } else {
            bandwidth
        };
        let seq = Sequence::new(Arc::clone(&self.inner.core), key, bw);
        lock(&self.inner.sequences).push(seq.shared());
        Ok(seq)
    }

    fn sender(&self) -> Result<std::sync::mpsc::SyncSender<Msg>> {
        lock(&self.inner.worker)
            .as_ref()
            .map(Worker::sender)
            .ok_or(Error::Closed)
    }

    /// Queue `entry` for the background writer. Blocks while the queue is full.
    pub fn write_buffered(&self, entry: Entry) -> Result<()> {
        if entry.key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.sender()?
            .send(Msg::Write(entry))
            .map_err(|_| Error::Closed)
    }

    /// Wait until everything queued so far has been committed.
    pub fn flush_buffered(&self) -> Result<()> {
        let (ack_tx, ack_rx) = std::sync::mpsc::sync_channel(1);
        self.sender()?
            .send(Msg::Flush(ack_tx))
            .map_err(|_| Error::Closed)?;
        ack_rx.recv().map_err(|_| Error::Closed)
    }

    /// Stop the background writer, release sequences, sync the WAL. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("cfg", &self.inner.core.cfg)
            .field("closed", &self.is_closed())
            .finish()
    }
}
