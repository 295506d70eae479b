use super::{Item, ItemUpdate};
use crate::consts::MAX_INDEXES;
use crate::error::{Error, Result};
use crate::keypath;
use crate::store::Entry;

impl Item {
    fn ensure_mutable(&self) -> Result<()> {
        if self.depth < 1 {
            return Err(Error::ChangeRoot);
        }
        if self.expires_at != 0 {
            return Err(Error::InvalidOnExpiring);
        }
        Ok(())
    }

    /// Apply index renames, index additions and/or a new value atomically.
    ///
    /// Renames write the new index entry before deleting the old one. The item
    /// itself is only changed after the transaction commits.
    pub fn update(&mut self, upd: &ItemUpdate) -> Result<()> {
        self.ensure_mutable()?;
        if self.indexes.len() + upd.index_additions.len() > MAX_INDEXES {
            return Err(Error::TooManyIndexes);
        }
        for add in &upd.index_additions {
            keypath::validate_index(add)?;
        }
        for ch in &upd.index_changes {
            if ch.index >= self.indexes.len() {
                return Err(Error::InvalidIndex);
            }
            keypath::validate_index(&ch.new_index)?;
        }

        let mut indexes = self.indexes.clone();
        let value = upd.value.clone().unwrap_or_else(|| self.value.clone());
        let full = keypath::main_key(&self.base_key, &self.key);
        let base = &self.base_key;
        let key = &self.key;

        self.store.update(|txn| {
            // registers the primary entry in the read set
            txn.get(&full)?;

            for ch in &upd.index_changes {
                let new_key = keypath::index_key(base, &ch.new_index);
                if txn.exists(&new_key)? {
                    return Err(Error::IndexAlreadyExists);
                }
                txn.set(&new_key, key)?;
                txn.delete(&keypath::index_key(base, &indexes[ch.index]))?;
                indexes[ch.index] = ch.new_index.clone();
            }
            for add in &upd.index_additions {
                let new_key = keypath::index_key(base, add);
                if txn.exists(&new_key)? {
                    return Err(Error::IndexAlreadyExists);
                }
                txn.set(&new_key, key)?;
                indexes.push(add.clone());
            }

            let (meta, stored) = keypath::encode_value(&indexes, &value);
            txn.set_entry(Entry {
                key: full.clone(),
                value: stored,
                meta,
                expires_at: 0,
            })
        })?;

        self.indexes = indexes;
        self.value = value;
        Ok(())
    }

    /// Replace only the payload.
    pub fn update_value(&mut self, value: &[u8]) -> Result<()> {
        self.ensure_mutable()?;
        let full = keypath::main_key(&self.base_key, &self.key);
        let (meta, stored) = keypath::encode_value(&self.indexes, value);
        self.store.update(|txn| {
            txn.get(&full)?;
            txn.set_entry(Entry {
                key: full.clone(),
                value: stored,
                meta,
                expires_at: 0,
            })
        })?;
        self.value = value.to_vec();
        Ok(())
    }
}
