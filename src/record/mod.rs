//! record — плоские типизированные записи поверх хранилища.
//!
//! Ключ записи: `name ++ 0x00 ++ key`, где name — 3 строчные ASCII-буквы типа.
//! Тело записи — JSON (serde). Последовательности типа лежат под
//! `name ++ 's' ++ key`, поэтому никогда не пересекаются с записями.
//!
//! - mod.rs — Record, Recorder (запись/чтение/диапазоны/буферизованная запись).
//! - txn.rs — RecorderTxn: те же операции внутри одной транзакции.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::consts::{RECORD_KEY_SEPARATOR, RECORD_NAME_LEN, RECORD_SEQ_MARKER};
use crate::error::{Error, Result};
use crate::store::{Entry, IterOptions, Sequence, Store, Txn};

mod txn;

pub use crate::util::{bytes_to_time, time_to_bytes};
pub use txn::RecorderTxn;

/// A typed record stored as JSON under `name ++ 0x00 ++ key`.
///
/// Fields that make up the key are usually `#[serde(skip)]`ed: they are restored
/// through [`Record::set_key`] when a record is read back.
pub trait Record: Serialize + DeserializeOwned {
    /// Three lowercase ASCII letters, constant for the type.
    fn name(&self) -> &'static str;

    fn key(&self) -> Result<Vec<u8>>;

    fn set_key(&mut self, key: &[u8]) -> Result<()>;

    /// Time to live once written; zero keeps the record forever.
    fn ttl(&self) -> Duration {
        Duration::ZERO
    }
}

/// Registered record types: name -> `name ++ 0x00`.
#[derive(Debug)]
pub(crate) struct Prefixes {
    by_name: HashMap<String, Vec<u8>>,
}

impl Prefixes {
    fn new(names: &[&str]) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::NoRecordTypes);
        }
        let mut by_name = HashMap::with_capacity(names.len());
        for &name in names {
            if name.len() != RECORD_NAME_LEN || !name.bytes().all(|b| b.is_ascii_lowercase()) {
                return Err(Error::RecordNameLength(name.to_string()));
            }
            let mut prefix = name.as_bytes().to_vec();
            prefix.push(RECORD_KEY_SEPARATOR);
            if by_name.insert(name.to_string(), prefix).is_some() {
                return Err(Error::DuplicateRecordName(name.to_string()));
            }
        }
        Ok(Self { by_name })
    }

    pub(crate) fn prefix<R: Record>(&self, rec: &R) -> Result<&[u8]> {
        self.by_name
            .get(rec.name())
            .map(Vec::as_slice)
            .ok_or_else(|| Error::RecordNotDefined(rec.name().to_string()))
    }

    pub(crate) fn full_key<R: Record>(&self, rec: &R) -> Result<Vec<u8>> {
        let mut k = self.prefix(rec)?.to_vec();
        k.extend_from_slice(&rec.key()?);
        Ok(k)
    }

    /// Store entry for `rec`: JSON body, expiry from its ttl.
    pub(crate) fn entry<R: Record>(&self, rec: &R) -> Result<Entry> {
        let key = self.full_key(rec)?;
        let body = serde_json::to_vec(rec)?;
        Ok(Entry {
            key,
            value: body,
            meta: 0,
            expires_at: 0,
        }
        .with_ttl(rec.ttl()))
    }
}

// ----- operations shared by Recorder and RecorderTxn -----

pub(crate) fn read_in<R: Record>(p: &Prefixes, txn: &Txn, rec: &mut R) -> Result<()> {
    let key = rec.key()?;
    let item = txn.get(&p.full_key(rec)?)?;
    let mut fresh: R = serde_json::from_slice(item.value())?;
    fresh.set_key(&key)?;
    *rec = fresh;
    Ok(())
}

pub(crate) fn range_in<R, F>(
    p: &Prefixes,
    txn: &Txn,
    rec: &R,
    prefix_bytes: usize,
    reverse: bool,
    mut cb: F,
) -> Result<()>
where
    R: Record,
    F: FnMut(&R) -> bool,
{
    let type_prefix = p.prefix(rec)?;
    let key = rec.key()?;
    if prefix_bytes >= key.len() {
        return Err(Error::PrefixBytesTooLong);
    }
    let mut bound = type_prefix.to_vec();
    bound.extend_from_slice(&key[..prefix_bytes]);
    let mut seek = type_prefix.to_vec();
    seek.extend_from_slice(&key);
    let key_off = type_prefix.len();

    let mut it = txn.iter(IterOptions::with_prefix(&bound).reverse(reverse));
    it.seek(&seek);
    while let Some(item) = it.item() {
        let mut found: R = serde_json::from_slice(item.value())?;
        found.set_key(&item.key()[key_off..])?;
        if !cb(&found) {
            break;
        }
        it.next();
    }
    Ok(())
}

// ----- Recorder -----

/// Entry point of the record store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Recorder {
    store: Store,
    prefixes: Arc<Prefixes>,
}

impl Recorder {
    /// `names` lists every record type this recorder will handle.
    pub fn new(store: &Store, names: &[&str]) -> Result<Self> {
        Ok(Self {
            store: store.clone(),
            prefixes: Arc::new(Prefixes::new(names)?),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Save `rec`, overwriting any record with the same key.
    pub fn write<R: Record>(&self, rec: &R) -> Result<()> {
        let entry = self.prefixes.entry(rec)?;
        self.store.update(|txn| txn.set_entry(entry))
    }

    /// Queue `rec` for the background writer. For non-critical data such as logs.
    pub fn write_buffered<R: Record>(&self, rec: &R) -> Result<()> {
        let entry = self.prefixes.entry(rec)?;
        self.store.write_buffered(entry)
    }

    /// Load the record with `rec`'s key into `rec`.
    pub fn read<R: Record>(&self, rec: &mut R) -> Result<()> {
        self.store.view(|txn| read_in(&self.prefixes, txn, rec))
    }

    pub fn delete<R: Record>(&self, rec: &R) -> Result<()> {
        let key = self.prefixes.full_key(rec)?;
        self.store.update(|txn| txn.delete(&key))
    }

    /// Visit records of `rec`'s type starting at its key, bounded to keys sharing
    /// the first `prefix_bytes` bytes of it. `prefix_bytes` must be shorter than
    /// the key.
    pub fn range<R, F>(&self, rec: &R, prefix_bytes: usize, reverse: bool, cb: F) -> Result<()>
    where
        R: Record,
        F: FnMut(&R) -> bool,
    {
        self.store
            .view(|txn| range_in(&self.prefixes, txn, rec, prefix_bytes, reverse, cb))
    }

    /// Delete every record of `rec`'s type whose key starts with `key_prefix`.
    pub fn delete_prefix<R: Record>(&self, rec: &R, key_prefix: &[u8]) -> Result<()> {
        let mut prefix = self.prefixes.prefix(rec)?.to_vec();
        prefix.extend_from_slice(key_prefix);
        self.store.drop_prefix(&prefix)
    }

    /// Sequence in `rec`'s type namespace, leased with the configured bandwidth.
    pub fn sequence<R: Record>(&self, rec: &R, key: &[u8]) -> Result<Sequence> {
        let mut seq_key = self.prefixes.prefix(rec)?.to_vec();
        seq_key[RECORD_NAME_LEN] = RECORD_SEQ_MARKER;
        seq_key.extend_from_slice(key);
        self.store.sequence(&seq_key, 0)
    }

    pub fn transaction(&self, update: bool) -> Result<RecorderTxn> {
        Ok(RecorderTxn::new(
            self.store.begin(update)?,
            Arc::clone(&self.prefixes),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_reject_bad_configs() {
        assert!(matches!(Prefixes::new(&[]), Err(Error::NoRecordTypes)));
        assert!(matches!(
            Prefixes::new(&["abcd"]),
            Err(Error::RecordNameLength(n)) if n == "abcd"
        ));
        assert!(matches!(Prefixes::new(&["Abc"]), Err(Error::RecordNameLength(_))));
        assert!(matches!(
            Prefixes::new(&["abc", "xyz", "abc"]),
            Err(Error::DuplicateRecordName(n)) if n == "abc"
        ));
        let p = Prefixes::new(&["abc", "xyz"]).unwrap();
        assert_eq!(p.by_name["xyz"], b"xyz\x00".to_vec());
    }
}
