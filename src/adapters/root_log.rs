use std::borrow::Cow;
use std::time::SystemTime;

use super::Logger;
use crate::error::{Error, Result};
use crate::item::Item;
use crate::root::Root;
use crate::util::{bytes_to_time, time_to_bytes, UniqueClock};

pub const ROOT_LOG_NAME: &str = "arbor/rootlog";
const ROOT_LOG_DESCRIPTION: &str = "arbor logs: children keyed by creation time, valued by log name";

const NO_INDEXES: &[&[u8]] = &[];

/// Logs stored in the item tree.
///
/// Layout: root item -> one child per log (key = creation time, value = name)
/// -> one child per message (key = message time, value = text).
#[derive(Debug)]
pub struct RootLog {
    item: Item,
    clock: UniqueClock,
}

impl RootLog {
    pub fn new(root: &Root) -> Result<Self> {
        Ok(Self {
            item: root.root_item(ROOT_LOG_NAME, ROOT_LOG_DESCRIPTION)?,
            clock: UniqueClock::new(),
        })
    }

    pub fn new_log(&self, name: &str) -> Result<RootLogger> {
        let created = self.clock.next();
        let item = self
            .item
            .create_child(&time_to_bytes(created), name.as_bytes(), NO_INDEXES)?;
        Ok(RootLogger::new(item, created))
    }

    pub fn open(&self, created: SystemTime) -> Result<RootLogger> {
        let item = self.item.read_child(&time_to_bytes(created))?;
        Ok(RootLogger::new(item, created))
    }

    /// Remove the log and all of its messages.
    pub fn delete(&self, created: SystemTime) -> Result<()> {
        self.item.read_child(&time_to_bytes(created))?.delete()
    }

    /// Visit logs by creation time starting at `start`: `cb(created, name)`.
    pub fn range<F>(&self, start: SystemTime, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(SystemTime, &str) -> bool,
    {
        range_timed(&self.item, start, reverse, cb)
    }

    /// Visit the messages of one log starting at `start`: `cb(at, message)`.
    pub fn range_log<F>(&self, created: SystemTime, start: SystemTime, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(SystemTime, &str) -> bool,
    {
        self.open(created)?.range(start, reverse, cb)
    }
}

/// Handle on one log; messages get strictly increasing timestamps.
#[derive(Debug)]
pub struct RootLogger {
    item: Item,
    created: SystemTime,
    clock: UniqueClock,
}

impl RootLogger {
    fn new(item: Item, created: SystemTime) -> Self {
        Self {
            item,
            created,
            clock: UniqueClock::new(),
        }
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.item.value())
    }

    pub fn range<F>(&self, start: SystemTime, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(SystemTime, &str) -> bool,
    {
        range_timed(&self.item, start, reverse, cb)
    }
}

impl Logger for RootLogger {
    fn log(&self, msg: &str) -> Result<()> {
        self.item
            .quick_child(&time_to_bytes(self.clock.next()), msg.as_bytes())
    }
}

/// Children keyed by 12-byte times, valued by text.
fn range_timed<F>(parent: &Item, start: SystemTime, reverse: bool, mut cb: F) -> Result<()>
where
    F: FnMut(SystemTime, &str) -> bool,
{
    let mut err: Option<Error> = None;
    parent.range_children(&time_to_bytes(start), 0, reverse, |child| {
        match bytes_to_time(child.key()) {
            Ok(at) => cb(at, &String::from_utf8_lossy(child.value())),
            Err(e) => {
                err = Some(e);
                false
            }
        }
    })?;
    err.map_or(Ok(()), Err)
}
