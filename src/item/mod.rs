//! item — узел иерархического хранилища.
//!
//! Разделение:
//! - create.rs — create_child / create_child_expires_at / quick_child
//! - read.rs   — read_child / read_child_by_index (+ `_in(txn)`)
//! - update.rs — update / update_value
//! - delete.rs — delete / delete_children (каскадно, одна транзакция)
//! - range.rs  — range_children / range_child_keys (+ `_in(txn)`)
//!
//! Каждая изменяющая операция открывает ровно одну read-write транзакцию и
//! коммитит её только при успехе. `Item` — снимок записи на момент чтения, он не
//! синхронизируется с последующими изменениями.

use crate::consts::ROOT_DEPTH;
use crate::error::{Error, Result};
use crate::keypath;
use crate::store::{Store, StoreItem};

mod create;
mod delete;
mod range;
mod read;
mod update;

/// Changes applied by [`Item::update`] in one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    /// Renames of existing indexes (by position).
    pub index_changes: Vec<IndexChange>,
    /// New indexes appended after the existing ones.
    pub index_additions: Vec<Vec<u8>>,
    /// New payload; `None` keeps the current one.
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexChange {
    pub index: usize,
    pub new_index: Vec<u8>,
}

impl IndexChange {
    pub fn new(index: usize, new_index: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            new_index: new_index.into(),
        }
    }
}

/// A node of the tree: depth, ancestor path, own key, indexes and payload.
#[derive(Clone)]
pub struct Item {
    store: Store,
    depth: i32,
    base_key: Vec<u8>,
    key: Vec<u8>,
    indexes: Vec<Vec<u8>>,
    value: Vec<u8>,
    expires_at: u64,
}

impl Item {
    /// The depth -1 anchor: no key, no indexes, never stored.
    pub(crate) fn virtual_root(store: &Store) -> Self {
        Self {
            store: store.clone(),
            depth: ROOT_DEPTH,
            base_key: Vec::new(),
            key: Vec::new(),
            indexes: Vec::new(),
            value: Vec::new(),
            expires_at: 0,
        }
    }

    /// Child of `self` materialized from its primary entry.
    fn child_from_entry(&self, base_key: Vec<u8>, key: Vec<u8>, entry: &StoreItem) -> Result<Self> {
        let (indexes, value) = keypath::decode_value(entry.meta(), entry.value())?;
        Ok(Self {
            store: self.store.clone(),
            depth: self.depth + 1,
            base_key,
            key,
            indexes,
            value,
            expires_at: entry.expires_at(),
        })
    }

    /// Base of this item's children.
    #[inline]
    fn children_base(&self) -> Vec<u8> {
        keypath::child_base(self.depth, &self.base_key, &self.key)
    }

    #[inline]
    fn is_virtual_root(&self) -> bool {
        self.depth < 0
    }

    // ----- accessors -----

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Copy the key into `buf`, reusing its allocation.
    pub fn copy_key(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.extend_from_slice(&self.key);
    }

    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    pub fn index(&self, i: usize) -> Option<&[u8]> {
        self.indexes.get(i).map(Vec::as_slice)
    }

    pub fn copy_index(&self, i: usize, buf: &mut Vec<u8>) -> Result<()> {
        let idx = self.indexes.get(i).ok_or(Error::InvalidIndex)?;
        buf.clear();
        buf.extend_from_slice(idx);
        Ok(())
    }

    pub fn indexes(&self) -> &[Vec<u8>] {
        &self.indexes
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn base_key(&self) -> &[u8] {
        &self.base_key
    }

    /// Absolute expiry in Unix seconds, 0 = never.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Key of the primary entry in the store (empty for the virtual root).
    pub fn full_key(&self) -> Vec<u8> {
        if self.is_virtual_root() {
            return Vec::new();
        }
        keypath::main_key(&self.base_key, &self.key)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("depth", &self.depth)
            .field("base_key", &self.base_key)
            .field("key", &self.key)
            .field("indexes", &self.indexes)
            .field("value_len", &self.value.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
