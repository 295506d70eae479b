use super::Item;
use crate::error::{Error, Result};
use crate::keypath;
use crate::store::Txn;

impl Item {
    pub fn read_child(&self, key: &[u8]) -> Result<Item> {
        keypath::validate_key(key)?;
        self.store.view(|txn| self.read_child_in(txn, key))
    }

    /// [`Item::read_child`] inside a caller-supplied transaction.
    pub fn read_child_in(&self, txn: &Txn, key: &[u8]) -> Result<Item> {
        keypath::validate_key(key)?;
        let base = self.children_base();
        let entry = txn.get(&keypath::main_key(&base, key))?;
        self.child_from_entry(base, key.to_vec(), &entry)
    }

    /// Resolve `index` to a child key, then load that child.
    ///
    /// `NotFound` when the index is unknown; `IndexedItemNotFound` when the
    /// index entry points at a missing primary entry.
    pub fn read_child_by_index(&self, index: &[u8]) -> Result<Item> {
        keypath::validate_index(index)?;
        self.store.view(|txn| self.read_child_by_index_in(txn, index))
    }

    pub fn read_child_by_index_in(&self, txn: &Txn, index: &[u8]) -> Result<Item> {
        keypath::validate_index(index)?;
        let base = self.children_base();
        let owner = txn.get(&keypath::index_key(&base, index))?;
        let key = owner.value().to_vec();
        let entry = match txn.get(&keypath::main_key(&base, &key)) {
            Err(Error::NotFound) => return Err(Error::IndexedItemNotFound),
            other => other?,
        };
        self.child_from_entry(base, key, &entry)
    }
}
