//! store/txn — транзакции: снимок на read_ts, буфер записей, оптимистичный коммит.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use super::engine::{Core, Value, Writes};
use super::iter::{Iter, IterOptions};
use super::{Entry, StoreItem};
use crate::error::{Error, Result};
use crate::metrics::record_txn_discard;
use crate::util::now_secs;

/// A store transaction.
///
/// Reads see the snapshot taken at `begin` plus the transaction's own pending
/// writes. Writes are buffered and applied atomically by [`Txn::commit`], which
/// fails with [`Error::Conflict`] if a key this transaction read was committed
/// by someone else in the meantime. Dropping an unfinished transaction discards it.
pub struct Txn {
    core: Arc<Core>,
    read_ts: u64,
    update: bool,
    pending: Writes,
    reads: RefCell<HashSet<Vec<u8>>>,
    done: bool,
}

impl Txn {
    pub(crate) fn begin(core: Arc<Core>, update: bool) -> Result<Self> {
        if core.is_closed() {
            return Err(Error::Closed);
        }
        let read_ts = core.begin_read();
        Ok(Self {
            core,
            read_ts,
            update,
            pending: Writes::new(),
            reads: RefCell::new(HashSet::new()),
            done: false,
        })
    }

    #[inline]
    pub fn is_update(&self) -> bool {
        self.update
    }

    #[inline]
    pub fn read_ts(&self) -> u64 {
        self.read_ts
    }

    fn ensure_open(&self) -> Result<()> {
        if self.done {
            Err(Error::TxnDiscarded)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if !self.update {
            return Err(Error::ReadOnlyTxn);
        }
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        Ok(())
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub(crate) fn pending(&self) -> &Writes {
        &self.pending
    }

    /// Remember a key for conflict detection (update transactions only).
    pub(crate) fn note_read(&self, key: &[u8]) {
        if self.update {
            self.reads.borrow_mut().insert(key.to_vec());
        }
    }

    // ----- reads -----

    pub fn get(&self, key: &[u8]) -> Result<StoreItem> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if let Some(w) = self.pending.get(key) {
            return match w {
                Some(v) if !v.is_expired_at(now_secs()) => Ok(StoreItem::new(key.to_vec(), Arc::clone(v))),
                _ => Err(Error::NotFound),
            };
        }
        self.note_read(key);
        self.core
            .get_at(key, self.read_ts)
            .map(|v| StoreItem::new(key.to_vec(), v))
            .ok_or(Error::NotFound)
    }

    /// True if `key` is visible in this transaction.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Ordered iterator over this transaction's view. Position it with
    /// [`Iter::rewind`] or [`Iter::seek`] before reading.
    pub fn iter(&self, opts: IterOptions) -> Iter<'_> {
        Iter::new(self, opts)
    }

    // ----- writes -----

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set_entry(Entry::new(key, value))
    }

    pub fn set_entry(&mut self, e: Entry) -> Result<()> {
        self.ensure_writable(&e.key)?;
        let Entry {
            key,
            value,
            meta,
            expires_at,
        } = e;
        self.pending.insert(
            key,
            Some(Arc::new(Value {
                data: value,
                meta,
                expires_at,
            })),
        );
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_writable(key)?;
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    // ----- completion -----

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.done = true;
        let res = if self.update {
            let writes = std::mem::take(&mut self.pending);
            let reads = self.reads.borrow();
            self.core.commit(self.read_ts, &reads, writes)
        } else {
            Ok(())
        };
        self.core.end_read(self.read_ts);
        res
    }

    /// Drop all pending writes. Idempotent.
    pub fn discard(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.pending.clear();
        self.core.end_read(self.read_ts);
        record_txn_discard();
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("read_ts", &self.read_ts)
            .field("update", &self.update)
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish()
    }
}
