//! Ordered iteration over children.
//!
//! The callback receives a view that is reused for every step; `clone()` it to
//! keep it past the call.

use super::Item;
use crate::error::Result;
use crate::keypath;
use crate::store::{Iter, IterOptions, Txn};

/// Position `it` for a child range: the reverse scan from an empty remainder
/// starts at the last key of the prefix.
fn position(it: &mut Iter<'_>, prefix: &[u8], seek: &[u8], reverse: bool) {
    if reverse && seek.len() == prefix.len() {
        it.rewind();
    } else {
        it.seek(seek);
    }
}

impl Item {
    /// Visit children in key order.
    ///
    /// Only keys sharing `start[..prefix_count]` are visited; the scan seeks to the
    /// whole `start`. An empty `start` means the first child (the last one when
    /// `reverse`). Return `false` from `cb` to stop.
    pub fn range_children<F>(&self, start: &[u8], prefix_count: usize, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(&Item) -> bool,
    {
        self.store
            .view(|txn| self.range_children_in(txn, start, prefix_count, reverse, cb))
    }

    pub fn range_children_in<F>(
        &self,
        txn: &Txn,
        start: &[u8],
        prefix_count: usize,
        reverse: bool,
        mut cb: F,
    ) -> Result<()>
    where
        F: FnMut(&Item) -> bool,
    {
        let base = self.children_base();
        let (prefix, seek) = keypath::range_prefix(&base, start, prefix_count)?;
        let key_off = base.len() + 1;

        let mut it = txn.iter(IterOptions::with_prefix(&prefix).reverse(reverse));
        position(&mut it, &prefix, &seek, reverse);

        let mut view = Item {
            store: self.store.clone(),
            depth: self.depth + 1,
            base_key: base,
            key: Vec::new(),
            indexes: Vec::new(),
            value: Vec::new(),
            expires_at: 0,
        };
        while let Some(entry) = it.item() {
            let (indexes, value) = keypath::decode_value(entry.meta(), entry.value())?;
            view.key.clear();
            view.key.extend_from_slice(&entry.key()[key_off..]);
            view.indexes = indexes;
            view.value = value;
            view.expires_at = entry.expires_at();
            if !cb(&view) {
                break;
            }
            it.next();
        }
        Ok(())
    }

    /// Like [`Item::range_children`] but only hands out child keys.
    pub fn range_child_keys<F>(&self, start: &[u8], prefix_count: usize, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        self.store
            .view(|txn| self.range_child_keys_in(txn, start, prefix_count, reverse, cb))
    }

    pub fn range_child_keys_in<F>(
        &self,
        txn: &Txn,
        start: &[u8],
        prefix_count: usize,
        reverse: bool,
        mut cb: F,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let base = self.children_base();
        let (prefix, seek) = keypath::range_prefix(&base, start, prefix_count)?;
        let key_off = base.len() + 1;

        let mut it = txn.iter(IterOptions::with_prefix(&prefix).reverse(reverse));
        position(&mut it, &prefix, &seek, reverse);
        while let Some(k) = it.key() {
            if !cb(&k[key_off..]) {
                break;
            }
            it.next();
        }
        Ok(())
    }
}
