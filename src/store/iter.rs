//! store/iter — упорядоченный итератор транзакции.
//!
//! Записи выбираются пачками под read-lock хранилища; между пачками lock не
//! держится, поэтому пользовательский код между `next()` может открывать другие
//! транзакции. Каждая пачка сливается с незакоммиченными записями самой транзакции.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use super::engine::Value;
use super::txn::Txn;
use super::StoreItem;
use crate::util::now_secs;

const BATCH: usize = 64;

#[derive(Clone, Debug, Default)]
pub struct IterOptions {
    /// Only keys starting with this prefix are visited.
    pub prefix: Vec<u8>,
    /// Descending key order.
    pub reverse: bool,
}

impl IterOptions {
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
            reverse: false,
        }
    }

    pub fn reverse(mut self, on: bool) -> Self {
        self.reverse = on;
        self
    }
}

/// Smallest key greater than every key starting with `prefix`; None if unbounded.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last < u8::MAX {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

fn bound_ref(b: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match b {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

pub struct Iter<'a> {
    txn: &'a Txn,
    opts: IterOptions,
    buf: VecDeque<(Vec<u8>, Arc<Value>)>,
    /// Where the next batch starts; None once the range is exhausted.
    next_from: Option<Bound<Vec<u8>>>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(txn: &'a Txn, opts: IterOptions) -> Self {
        Self {
            txn,
            opts,
            buf: VecDeque::new(),
            next_from: None,
        }
    }

    /// First key in iteration order (last one when reversed).
    pub fn rewind(&mut self) {
        let from = self.start_bound();
        self.reposition(Some(from));
    }

    /// First key >= `key` (<= `key` when reversed).
    pub fn seek(&mut self, key: &[u8]) {
        let prefix = self.opts.prefix.as_slice();
        let from = if !self.opts.reverse {
            if key < prefix {
                Some(Bound::Included(prefix.to_vec()))
            } else {
                Some(Bound::Included(key.to_vec()))
            }
        } else if key.starts_with(prefix) {
            Some(Bound::Included(key.to_vec()))
        } else if key < prefix {
            None
        } else {
            Some(self.start_bound())
        };
        self.reposition(from);
    }

    #[inline]
    pub fn valid(&self) -> bool {
        !self.buf.is_empty()
    }

    #[inline]
    pub fn valid_for_prefix(&self, prefix: &[u8]) -> bool {
        self.key().map_or(false, |k| k.starts_with(prefix))
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.buf.front().map(|(k, _)| k.as_slice())
    }

    pub fn item(&self) -> Option<StoreItem> {
        self.buf
            .front()
            .map(|(k, v)| StoreItem::new(k.clone(), Arc::clone(v)))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        self.buf.pop_front();
        if self.buf.is_empty() {
            self.fill();
        }
    }

    fn start_bound(&self) -> Bound<Vec<u8>> {
        if !self.opts.reverse {
            Bound::Included(self.opts.prefix.clone())
        } else {
            match prefix_successor(&self.opts.prefix) {
                Some(s) => Bound::Excluded(s),
                None => Bound::Unbounded,
            }
        }
    }

    fn reposition(&mut self, from: Option<Bound<Vec<u8>>>) {
        self.buf.clear();
        self.next_from = from;
        self.fill();
    }

    fn fill(&mut self) {
        let prefix = self.opts.prefix.as_slice();
        let reverse = self.opts.reverse;

        while self.buf.is_empty() {
            let Some(from) = self.next_from.take() else {
                return;
            };
            let (batch, full) =
                self.txn
                    .core()
                    .scan(prefix, bound_ref(&from), reverse, self.txn.read_ts(), BATCH);
            let edge = if full {
                batch.last().map(|(k, _)| k.clone())
            } else {
                None
            };

            let mut merged: BTreeMap<Vec<u8>, Option<Arc<Value>>> =
                batch.into_iter().map(|(k, v)| (k, Some(v))).collect();

            let edge_bound = match &edge {
                Some(k) => Bound::Included(k.as_slice()),
                None => Bound::Unbounded,
            };
            let pending = self.txn.pending();
            let own: Box<dyn Iterator<Item = (&Vec<u8>, &Option<Arc<Value>>)> + '_> = if reverse {
                Box::new(pending.range::<[u8], _>((edge_bound, bound_ref(&from))).rev())
            } else {
                Box::new(pending.range::<[u8], _>((bound_ref(&from), edge_bound)))
            };
            for (k, w) in own.take_while(|(k, _)| k.starts_with(prefix)) {
                merged.insert(k.clone(), w.clone());
            }

            let now = now_secs();
            let live = merged
                .into_iter()
                .filter_map(|(k, w)| w.filter(|v| !v.is_expired_at(now)).map(|v| (k, v)));
            if reverse {
                self.buf.extend(live.rev());
            } else {
                self.buf.extend(live);
            }
            for (k, _) in &self.buf {
                self.txn.note_read(k);
            }

            self.next_from = edge.map(Bound::Excluded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_skips_trailing_ff() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(b""), None);
    }
}
