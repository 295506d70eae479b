//! store/engine — MVCC-данные, оракул меток времени, применение коммитов.
//!
//! Каждый ключ хранит версии по возрастанию commit_ts; `None` — надгробие.
//! Чтение на read_ts видит последнюю версию с ts <= read_ts. Старые версии
//! удаляются, когда ни одна активная транзакция их больше не видит.
//!
//! Порядок блокировок: oracle -> data -> wal.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::lock::LockGuard;
use crate::metrics::{record_ttl_skipped, record_txn_commit, record_txn_conflict};
use crate::util::now_secs;
use crate::wal::{Wal, WalOp};

/// Stored value of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub data: Vec<u8>,
    pub meta: u8,
    /// Unix seconds, 0 = never.
    pub expires_at: u64,
}

impl Value {
    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
struct Version {
    ts: u64,
    value: Option<Arc<Value>>,
}

/// Pending writes of a transaction: `None` deletes the key.
pub(crate) type Writes = BTreeMap<Vec<u8>, Option<Arc<Value>>>;

#[derive(Debug, Default)]
struct Oracle {
    committed_ts: u64,
    /// read_ts -> number of open transactions reading at it
    active_reads: BTreeMap<u64, usize>,
}

impl Oracle {
    fn watermark(&self) -> u64 {
        self.active_reads
            .keys()
            .next()
            .copied()
            .unwrap_or(self.committed_ts)
    }
}

pub(crate) struct Core {
    pub(crate) cfg: StoreConfig,
    data: RwLock<BTreeMap<Vec<u8>, Vec<Version>>>,
    oracle: Mutex<Oracle>,
    wal: Option<Mutex<Wal>>,
    closed: AtomicBool,
    dir_lock: Mutex<Option<LockGuard>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl Core {
    /// `initial` is the replayed data set; every entry gets version `committed_ts`.
    pub(crate) fn new(
        cfg: StoreConfig,
        lock_guard: Option<LockGuard>,
        wal: Option<Wal>,
        committed_ts: u64,
        initial: BTreeMap<Vec<u8>, Value>,
    ) -> Self {
        let data = initial
            .into_iter()
            .map(|(k, v)| {
                let ver = Version {
                    ts: committed_ts,
                    value: Some(Arc::new(v)),
                };
                (k, vec![ver])
            })
            .collect();
        Self {
            cfg,
            data: RwLock::new(data),
            oracle: Mutex::new(Oracle {
                committed_ts,
                active_reads: BTreeMap::new(),
            }),
            wal: wal.map(Mutex::new),
            closed: AtomicBool::new(false),
            dir_lock: Mutex::new(lock_guard),
        }
    }

    fn read_data(&self) -> RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<Version>>> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<Version>>> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse further commits and release the directory lock, even while other
    /// handles (sequences, iterators) still hold the core.
    pub(crate) fn mark_closed(&self) {
        let _oracle = lock(&self.oracle);
        self.closed.store(true, Ordering::Release);
        lock(&self.dir_lock).take();
    }

    // ----- read timestamps -----

    pub(crate) fn begin_read(&self) -> u64 {
        let mut o = lock(&self.oracle);
        let ts = o.committed_ts;
        *o.active_reads.entry(ts).or_insert(0) += 1;
        ts
    }

    pub(crate) fn end_read(&self, ts: u64) {
        let mut o = lock(&self.oracle);
        if let Some(n) = o.active_reads.get_mut(&ts) {
            *n -= 1;
            if *n == 0 {
                o.active_reads.remove(&ts);
            }
        }
    }

    // ----- reads -----

    fn visible(versions: &[Version], read_ts: u64) -> Option<&Arc<Value>> {
        versions
            .iter()
            .rev()
            .find(|v| v.ts <= read_ts)
            .and_then(|v| v.value.as_ref())
    }

    /// Visible, non-expired value of `key` at `read_ts`.
    pub(crate) fn get_at(&self, key: &[u8], read_ts: u64) -> Option<Arc<Value>> {
        let data = self.read_data();
        let v = Self::visible(data.get(key)?, read_ts)?;
        if v.is_expired_at(now_secs()) {
            record_ttl_skipped();
            return None;
        }
        Some(Arc::clone(v))
    }

    /// Up to `limit` visible entries under `prefix`, starting at `from` and moving
    /// forward (or backward when `reverse`). The bool is true when the batch was
    /// cut by `limit` (more may follow).
    pub(crate) fn scan(
        &self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        reverse: bool,
        read_ts: u64,
        limit: usize,
    ) -> (Vec<(Vec<u8>, Arc<Value>)>, bool) {
        let data = self.read_data();
        let now = now_secs();
        let mut out = Vec::new();

        let iter: Box<dyn Iterator<Item = (&Vec<u8>, &Vec<Version>)> + '_> = if reverse {
            Box::new(data.range::<[u8], _>((Bound::Unbounded, from)).rev())
        } else {
            Box::new(data.range::<[u8], _>((from, Bound::Unbounded)))
        };

        let mut full = false;
        for (k, versions) in iter {
            if !k.starts_with(prefix) {
                break;
            }
            let Some(v) = Self::visible(versions, read_ts) else {
                continue;
            };
            if v.is_expired_at(now) {
                record_ttl_skipped();
                continue;
            }
            out.push((k.clone(), Arc::clone(v)));
            if out.len() >= limit {
                full = true;
                break;
            }
        }
        (out, full)
    }

    /// Every live entry (latest version, not expired).
    pub(crate) fn live_entries(&self) -> Vec<WalOp> {
        let data = self.read_data();
        let now = now_secs();
        data.iter()
            .filter_map(|(k, versions)| {
                let v = versions.last()?.value.as_ref()?;
                if v.is_expired_at(now) {
                    return None;
                }
                Some(WalOp::Set {
                    key: k.clone(),
                    value: v.data.clone(),
                    meta: v.meta,
                    expires_at: v.expires_at,
                })
            })
            .collect()
    }

    // ----- commit -----

    /// Validate the read set and apply `writes` as one atomic commit.
    /// A transaction without writes commits trivially.
    pub(crate) fn commit(&self, read_ts: u64, reads: &HashSet<Vec<u8>>, writes: Writes) -> Result<()> {
        let mut oracle = lock(&self.oracle);
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if writes.is_empty() {
            record_txn_commit();
            return Ok(());
        }

        {
            let data = self.read_data();
            let conflict = reads.iter().any(|k| {
                data.get(k)
                    .and_then(|vs| vs.last())
                    .map_or(false, |v| v.ts > read_ts)
            });
            if conflict {
                record_txn_conflict();
                debug!("commit: conflict for txn at read_ts={}", read_ts);
                return Err(Error::Conflict);
            }
        }

        let commit_ts = oracle.committed_ts + 1;

        if let Some(wal) = &self.wal {
            let ops: Vec<WalOp> = writes
                .iter()
                .map(|(k, v)| match v {
                    Some(v) => WalOp::Set {
                        key: k.clone(),
                        value: v.data.clone(),
                        meta: v.meta,
                        expires_at: v.expires_at,
                    },
                    None => WalOp::Delete { key: k.clone() },
                })
                .collect();
            lock(wal).append_commit(commit_ts, &ops)?;
        }

        let watermark = oracle.watermark().min(commit_ts);
        {
            let mut data = self.write_data();
            for (k, v) in writes {
                let versions = data.entry(k.clone()).or_default();
                versions.push(Version { ts: commit_ts, value: v });
                prune(versions, watermark);
                if versions.is_empty() {
                    data.remove(&k);
                }
            }
        }

        oracle.committed_ts = commit_ts;
        record_txn_commit();
        Ok(())
    }

    // ----- maintenance -----

    /// Rewrite the WAL with only the live entries and drop dead versions from memory.
    pub(crate) fn compact(&self) -> Result<()> {
        let oracle = lock(&self.oracle);
        let watermark = oracle.watermark();
        {
            let mut data = self.write_data();
            data.retain(|_, versions| {
                prune(versions, watermark);
                !versions.is_empty()
            });
        }
        if let Some(wal) = &self.wal {
            let live = self.live_entries();
            lock(wal).rewrite(oracle.committed_ts, &live)?;
        }
        Ok(())
    }

    /// WAL size in bytes (0 for in-memory stores).
    pub(crate) fn wal_len(&self) -> u64 {
        self.wal.as_ref().map_or(0, |w| lock(w).len())
    }

    pub(crate) fn sync_wal(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            lock(wal).fsync()?;
        }
        Ok(())
    }
}

/// Fold one replayed WAL frame into the recovered data set.
pub(crate) fn apply_replayed(data: &mut BTreeMap<Vec<u8>, Value>, ops: Vec<WalOp>) {
    for op in ops {
        match op {
            WalOp::Set {
                key,
                value,
                meta,
                expires_at,
            } => {
                data.insert(
                    key,
                    Value {
                        data: value,
                        meta,
                        expires_at,
                    },
                );
            }
            WalOp::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

/// Keep every version newer than `watermark` plus the newest one at or below it.
/// A tombstone that nobody can see past is dropped entirely.
fn prune(versions: &mut Vec<Version>, watermark: u64) {
    let keep_from = versions
        .iter()
        .rposition(|v| v.ts <= watermark)
        .unwrap_or(0);
    if keep_from > 0 {
        versions.drain(..keep_from);
    }
    if versions.len() == 1 && versions[0].value.is_none() && versions[0].ts <= watermark {
        versions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ver(ts: u64, v: Option<&[u8]>) -> Version {
        Version {
            ts,
            value: v.map(|d| {
                Arc::new(Value {
                    data: d.to_vec(),
                    meta: 0,
                    expires_at: 0,
                })
            }),
        }
    }

    #[test]
    fn prune_keeps_versions_visible_to_readers() {
        let mut vs = vec![ver(1, Some(b"a")), ver(3, Some(b"b")), ver(5, Some(b"c"))];
        prune(&mut vs, 4);
        assert_eq!(vs.iter().map(|v| v.ts).collect::<Vec<_>>(), vec![3, 5]);

        let mut vs = vec![ver(1, Some(b"a")), ver(2, None)];
        prune(&mut vs, 2);
        assert!(vs.is_empty(), "invisible tombstone is dropped");

        let mut vs = vec![ver(1, Some(b"a")), ver(2, None)];
        prune(&mut vs, 1);
        assert_eq!(vs.len(), 2, "reader at ts 1 still sees the value");
    }
}
