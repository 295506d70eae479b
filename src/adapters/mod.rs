//! adapters — готовые хранилища логов и состояния поверх дерева и записей.
//!
//! - root_log.rs     — RootLog / RootLogger: логи как дети root item "arbor/rootlog".
//! - root_state.rs   — RootState: JSON-состояния как дети root item "arbor/rootstate".
//! - record_log.rs   — RecordLog / RecordLogger: записи "log" + "lge" (буферизованно, TTL).
//! - record_state.rs — RecordState: записи "ste".

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

mod record_log;
mod record_state;
mod root_log;
mod root_state;

pub use record_log::{RecordLog, RecordLogger};
pub use record_state::RecordState;
pub use root_log::{RootLog, RootLogger};
pub use root_state::RootState;

/// Append-only message sink.
pub trait Logger {
    fn log(&self, msg: &str) -> Result<()>;
}

/// Named JSON state, overwritten on every save.
pub trait PersistentState {
    fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<()>;

    /// `NotFound` if nothing was saved under `name`.
    fn retrieve<T: DeserializeOwned>(&self, name: &str) -> Result<T>;
}
