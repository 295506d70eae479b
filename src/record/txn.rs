use std::sync::Arc;

use super::{range_in, read_in, Prefixes, Record};
use crate::error::Result;
use crate::store::Txn;

/// Record operations inside one store transaction.
///
/// Nothing is written until [`RecorderTxn::commit`]; dropping it discards.
#[derive(Debug)]
pub struct RecorderTxn {
    txn: Txn,
    prefixes: Arc<Prefixes>,
}

impl RecorderTxn {
    pub(crate) fn new(txn: Txn, prefixes: Arc<Prefixes>) -> Self {
        Self { txn, prefixes }
    }

    pub fn write<R: Record>(&mut self, rec: &R) -> Result<()> {
        let entry = self.prefixes.entry(rec)?;
        self.txn.set_entry(entry)
    }

    pub fn read<R: Record>(&self, rec: &mut R) -> Result<()> {
        read_in(&self.prefixes, &self.txn, rec)
    }

    pub fn delete<R: Record>(&mut self, rec: &R) -> Result<()> {
        let key = self.prefixes.full_key(rec)?;
        self.txn.delete(&key)
    }

    pub fn range<R, F>(&self, rec: &R, prefix_bytes: usize, reverse: bool, cb: F) -> Result<()>
    where
        R: Record,
        F: FnMut(&R) -> bool,
    {
        range_in(&self.prefixes, &self.txn, rec, prefix_bytes, reverse, cb)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.txn.commit()
    }

    pub fn discard(&mut self) {
        self.txn.discard()
    }
}
