//! Error kinds of the whole crate.
//!
//! Item/root/record operations return these directly. WAL and lock internals work
//! with `anyhow::Result` (context-rich I/O errors) and are wrapped into
//! [`Error::Storage`] at the store boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // ----- validation -----
    #[error("key invalid length, must be at least 2 and at most 255 bytes")]
    KeyInvalid,
    #[error("more than 255 indexes specified")]
    TooManyIndexes,
    #[error("a specified index is longer than 255 bytes")]
    IndexTooLong,
    #[error("index is empty")]
    EmptyIndex,
    #[error("index number is out of range")]
    InvalidIndex,
    #[error("prefix count is more than start key length")]
    PrefixCountTooLong,
    #[error("root key not 2 bytes long")]
    BadRootKey,
    #[error("store key is empty")]
    EmptyKey,

    // ----- not found / consistency -----
    #[error("item not found")]
    NotFound,
    #[error("indexed item not found")]
    IndexedItemNotFound,
    #[error("root keys are not strictly increasing")]
    RangeSameOrBackwards,
    #[error("no free root item key left")]
    RootKeysExhausted,

    // ----- conflicts -----
    #[error("item with the specified key already exists")]
    AlreadyExists,
    #[error("index already exists for something else")]
    IndexAlreadyExists,
    #[error("transaction conflict, the read set changed before commit")]
    Conflict,

    // ----- immutability / configuration -----
    #[error("root item may not be changed")]
    ChangeRoot,
    #[error("value cannot be updated on an expiring item")]
    InvalidOnExpiring,
    #[error("description does not match")]
    DescriptionDoesNotMatch,

    // ----- malformed stored values -----
    #[error("bad value format, flags byte not recognized")]
    NoFlags,
    #[error("bad value format, no index count")]
    NoIndexCount,
    #[error("bad value format, no index length")]
    NoIndexLength,
    #[error("bad value format, index length more than value length")]
    BadIndexLength,

    // ----- records -----
    #[error("no record types configured")]
    NoRecordTypes,
    #[error("duplicate record name: {0}")]
    DuplicateRecordName(String),
    #[error("record name must be exactly 3 lowercase ASCII letters: {0}")]
    RecordNameLength(String),
    #[error("record type used that was not configured: {0}")]
    RecordNotDefined(String),
    #[error("prefix bytes as long or longer than key bytes")]
    PrefixBytesTooLong,
    #[error("invalid time bytes length {0}, expected 12")]
    BadTimeBytes(usize),

    // ----- store -----
    #[error("write on a read-only transaction")]
    ReadOnlyTxn,
    #[error("transaction already committed or discarded")]
    TxnDiscarded,
    #[error("store is closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for plain absence (not for `IndexedItemNotFound`, which is corruption).
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// Malformed stored value: fatal for the affected entry, never retried.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::NoFlags | Error::NoIndexCount | Error::NoIndexLength | Error::BadIndexLength
        )
    }
}
