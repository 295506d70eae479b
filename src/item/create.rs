use super::Item;
use crate::error::{Error, Result};
use crate::keypath;
use crate::store::{Entry, Txn};

impl Item {
    /// Create a child with `indexes`, each unique among this item's children.
    ///
    /// Fails with `AlreadyExists` / `IndexAlreadyExists` without writing anything.
    pub fn create_child<I: AsRef<[u8]>>(&self, key: &[u8], value: &[u8], indexes: &[I]) -> Result<Item> {
        keypath::validate_key(key)?;
        keypath::validate_indexes(indexes)?;

        let base = self.children_base();
        let full = keypath::main_key(&base, key);
        let (meta, stored) = keypath::encode_value(indexes, value);

        self.store.update(|txn| {
            ensure_absent(txn, &full, Error::AlreadyExists)?;
            for idx in indexes {
                let ik = keypath::index_key(&base, idx.as_ref());
                ensure_absent(txn, &ik, Error::IndexAlreadyExists)?;
                txn.set(&ik, key)?;
            }
            txn.set_entry(Entry {
                key: full,
                value: stored,
                meta,
                expires_at: 0,
            })
        })?;

        Ok(Item {
            store: self.store.clone(),
            depth: self.depth + 1,
            base_key: base,
            key: key.to_vec(),
            indexes: indexes.iter().map(|i| i.as_ref().to_vec()).collect(),
            value: value.to_vec(),
            expires_at: 0,
        })
    }

    /// Create an index-less child that disappears at `expires_at` (Unix seconds).
    /// The child is read-only: updates fail with `InvalidOnExpiring`.
    pub fn create_child_expires_at(&self, key: &[u8], value: &[u8], expires_at: u64) -> Result<()> {
        if self.is_virtual_root() {
            return Err(Error::ChangeRoot);
        }
        keypath::validate_key(key)?;
        let full = keypath::main_key(&self.children_base(), key);
        self.store.update(|txn| {
            ensure_absent(txn, &full, Error::AlreadyExists)?;
            txn.set_entry(Entry::new(&full, value).with_expires_at(expires_at))
        })
    }

    /// Create an index-less child without returning it.
    pub fn quick_child(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.is_virtual_root() {
            return Err(Error::ChangeRoot);
        }
        keypath::validate_key(key)?;
        let full = keypath::main_key(&self.children_base(), key);
        self.store.update(|txn| {
            ensure_absent(txn, &full, Error::AlreadyExists)?;
            txn.set(&full, value)
        })
    }
}

/// `Err(err)` if `key` is visible in `txn`.
fn ensure_absent(txn: &Txn, key: &[u8], err: Error) -> Result<()> {
    if txn.exists(key)? {
        return Err(err);
    }
    Ok(())
}
