#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod consts;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod util;

// Хранилище: WAL + упорядоченный транзакционный движок
pub mod wal;   // src/wal/{mod,encode,reader,writer,replay}.rs
pub mod store; // src/store/{mod,engine,txn,iter,sequence,background}.rs

// Дерево элементов поверх хранилища
pub mod keypath;
pub mod item; // src/item/{mod,create,read,update,delete,range}.rs
pub mod root;

// Плоские типизированные записи и адаптеры (логи / состояние)
pub mod record;   // src/record/{mod,txn}.rs
pub mod adapters; // src/adapters/{mod,root_log,root_state,record_log,record_state}.rs

// Удобные реэкспорты
pub use config::{StoreBuilder, StoreConfig};
pub use error::{Error, Result};
pub use item::{IndexChange, Item, ItemUpdate};
pub use record::{Record, Recorder, RecorderTxn};
pub use root::Root;
pub use store::{Entry, Iter, IterOptions, Sequence, Store, StoreItem, Txn};
