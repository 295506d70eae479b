use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PersistentState;
use crate::error::{Error, Result};
use crate::item::Item;
use crate::root::Root;

pub const ROOT_STATE_NAME: &str = "arbor/rootstate";
const ROOT_STATE_DESCRIPTION: &str = "arbor persistent state: children keyed by state name, valued by JSON";

/// JSON states stored as children of one root item. Names are child keys, so
/// they must be 2..=255 bytes long.
#[derive(Debug)]
pub struct RootState {
    item: Item,
}

impl RootState {
    pub fn new(root: &Root) -> Result<Self> {
        Ok(Self {
            item: root.root_item(ROOT_STATE_NAME, ROOT_STATE_DESCRIPTION)?,
        })
    }
}

impl PersistentState for RootState {
    fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<()> {
        let body = serde_json::to_vec(state)?;
        match self.item.read_child(name.as_bytes()) {
            Ok(mut existing) => existing.update_value(&body),
            Err(Error::NotFound) => self.item.quick_child(name.as_bytes(), &body),
            Err(e) => Err(e),
        }
    }

    fn retrieve<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let child = self.item.read_child(name.as_bytes())?;
        Ok(serde_json::from_slice(child.value())?)
    }
}
