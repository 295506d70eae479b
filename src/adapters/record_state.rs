use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::PersistentState;
use crate::error::Result;
use crate::record::{Record, Recorder};

pub const STATE_RECORD: &str = "ste";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateRecord {
    #[serde(skip)]
    name: Vec<u8>,
    #[serde(rename = "State")]
    state: serde_json::Value,
}

impl Record for StateRecord {
    fn name(&self) -> &'static str {
        STATE_RECORD
    }

    fn key(&self) -> Result<Vec<u8>> {
        Ok(self.name.clone())
    }

    fn set_key(&mut self, key: &[u8]) -> Result<()> {
        self.name = key.to_vec();
        Ok(())
    }
}

/// JSON states in the record store. The recorder must be configured with
/// [`RecordState::RECORD_NAMES`].
#[derive(Debug)]
pub struct RecordState {
    recorder: Recorder,
}

impl RecordState {
    pub const RECORD_NAMES: [&'static str; 1] = [STATE_RECORD];

    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

impl PersistentState for RecordState {
    fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<()> {
        self.recorder.write(&StateRecord {
            name: name.as_bytes().to_vec(),
            state: serde_json::to_value(state)?,
        })
    }

    fn retrieve<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let mut rec = StateRecord {
            name: name.as_bytes().to_vec(),
            ..StateRecord::default()
        };
        self.recorder.read(&mut rec)?;
        Ok(serde_json::from_value(rec.state)?)
    }
}
