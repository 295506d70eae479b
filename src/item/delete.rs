use super::Item;
use crate::error::{Error, Result};
use crate::keypath;
use crate::store::{IterOptions, Txn};

impl Item {
    /// Delete this item together with all its descendants and index entries.
    pub fn delete(&self) -> Result<()> {
        if self.is_virtual_root() {
            return Err(Error::ChangeRoot);
        }
        let full = keypath::main_key(&self.base_key, &self.key);
        let children = self.children_base();
        self.store.update(|txn| {
            // index entries come from the stored value, not from this snapshot
            let stored = txn.get(&full)?;
            let (indexes, _) = keypath::decode_value(stored.meta(), stored.value())?;
            delete_subtree(txn, &children)?;
            for idx in &indexes {
                txn.delete(&keypath::index_key(&self.base_key, idx))?;
            }
            txn.delete(&full)
        })
    }

    /// Delete every descendant, depth-first, in one transaction.
    pub fn delete_children(&self) -> Result<()> {
        if self.is_virtual_root() {
            return Err(Error::ChangeRoot);
        }
        let children = self.children_base();
        self.store.update(|txn| delete_subtree(txn, &children))
    }
}

/// Remove all children under `base` and, before each child, its own subtree.
fn delete_subtree(txn: &mut Txn, base: &[u8]) -> Result<()> {
    let prefix = keypath::main_prefix(base);
    let mut children: Vec<(Vec<u8>, Vec<Vec<u8>>)> = Vec::new();
    {
        let mut it = txn.iter(IterOptions::with_prefix(&prefix));
        it.rewind();
        while let Some(entry) = it.item() {
            let (indexes, _) = keypath::decode_value(entry.meta(), entry.value())?;
            children.push((entry.key()[prefix.len()..].to_vec(), indexes));
            it.next();
        }
    }

    for (key, indexes) in children {
        // children of a stored node always have depth >= 0
        delete_subtree(txn, &keypath::child_base(0, base, &key))?;
        for idx in &indexes {
            txn.delete(&keypath::index_key(base, idx))?;
        }
        txn.delete(&keypath::main_key(base, &key))?;
    }
    Ok(())
}
