//! Root — allocator of depth-0 items.
//!
//! Every feature asks for its own namespace by a human-readable name; the root
//! item gets the next free 2-byte key (big-endian, starting at
//! FIRST_USER_ROOT_KEY) and carries the name as its only index.

use byteorder::{BigEndian, ByteOrder};

use crate::consts::{FIRST_USER_ROOT_KEY, ROOT_KEY_LEN};
use crate::error::{Error, Result};
use crate::item::Item;
use crate::store::Store;

#[derive(Clone, Debug)]
pub struct Root {
    item: Item,
}

impl Root {
    pub fn new(store: &Store) -> Self {
        Self {
            item: Item::virtual_root(store),
        }
    }

    /// The virtual root (depth -1), for ranging over root items.
    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Find the root item called `name` or create it with `description` as value.
    ///
    /// An existing item must carry the same description, otherwise
    /// `DescriptionDoesNotMatch`.
    pub fn root_item(&self, name: &str, description: &str) -> Result<Item> {
        match self.item.read_child_by_index(name.as_bytes()) {
            Ok(found) => {
                if found.value() != description.as_bytes() {
                    return Err(Error::DescriptionDoesNotMatch);
                }
                return Ok(found);
            }
            Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        let next = self.next_free_key()?;
        let mut key = [0u8; ROOT_KEY_LEN];
        BigEndian::write_u16(&mut key, next);
        self.item
            .create_child(&key, description.as_bytes(), &[name.as_bytes()])
    }

    /// Scan the allocated keys from FIRST_USER_ROOT_KEY up to the first gap.
    fn next_free_key(&self) -> Result<u16> {
        let mut start = [0u8; ROOT_KEY_LEN];
        BigEndian::write_u16(&mut start, FIRST_USER_ROOT_KEY);

        let mut last = FIRST_USER_ROOT_KEY - 1;
        let mut err = None;
        self.item.range_child_keys(&start, 0, false, |key| {
            if key.len() != ROOT_KEY_LEN {
                err = Some(Error::BadRootKey);
                return false;
            }
            let k = BigEndian::read_u16(key);
            if k <= last {
                err = Some(Error::RangeSameOrBackwards);
                return false;
            }
            if k > last + 1 {
                return false;
            }
            last = k;
            true
        })?;
        match err {
            Some(e) => Err(e),
            None => last.checked_add(1).ok_or(Error::RootKeysExhausted),
        }
    }
}
