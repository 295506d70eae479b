use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use super::Logger;
use crate::consts::TIME_BYTES_LEN;
use crate::error::{Error, Result};
use crate::record::{bytes_to_time, time_to_bytes, Record, Recorder};
use crate::util::UniqueClock;

pub const LOG_RECORD: &str = "log";
pub const LOG_ENTRY_RECORD: &str = "lge";

/// Header of a log; key = creation time.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LogRecord {
    #[serde(skip)]
    created: Vec<u8>,
    #[serde(rename = "LogName")]
    name: String,
}

impl Record for LogRecord {
    fn name(&self) -> &'static str {
        LOG_RECORD
    }

    fn key(&self) -> Result<Vec<u8>> {
        if self.created.len() != TIME_BYTES_LEN {
            return Err(Error::BadTimeBytes(self.created.len()));
        }
        Ok(self.created.clone())
    }

    fn set_key(&mut self, key: &[u8]) -> Result<()> {
        bytes_to_time(key)?;
        self.created = key.to_vec();
        Ok(())
    }
}

/// One message; key = log creation time ++ message time.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LogEntryRecord {
    #[serde(skip)]
    key: Vec<u8>,
    #[serde(skip)]
    ttl: Duration,
    #[serde(rename = "Message")]
    message: String,
}

impl LogEntryRecord {
    fn at(created: SystemTime, at: SystemTime) -> Self {
        let mut key = time_to_bytes(created).to_vec();
        key.extend_from_slice(&time_to_bytes(at));
        Self {
            key,
            ..Self::default()
        }
    }
}

impl Record for LogEntryRecord {
    fn name(&self) -> &'static str {
        LOG_ENTRY_RECORD
    }

    fn key(&self) -> Result<Vec<u8>> {
        if self.key.len() != 2 * TIME_BYTES_LEN {
            return Err(Error::BadTimeBytes(self.key.len()));
        }
        Ok(self.key.clone())
    }

    fn set_key(&mut self, key: &[u8]) -> Result<()> {
        if key.len() != 2 * TIME_BYTES_LEN {
            return Err(Error::BadTimeBytes(key.len()));
        }
        self.key = key.to_vec();
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Logs in the record store. The recorder must be configured with
/// [`RecordLog::RECORD_NAMES`].
#[derive(Debug)]
pub struct RecordLog {
    recorder: Recorder,
    clock: UniqueClock,
}

impl RecordLog {
    pub const RECORD_NAMES: [&'static str; 2] = [LOG_RECORD, LOG_ENTRY_RECORD];

    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            clock: UniqueClock::new(),
        }
    }

    pub fn new_log(&self, name: &str) -> Result<RecordLogger> {
        let created = self.clock.next();
        self.recorder.write(&LogRecord {
            created: time_to_bytes(created).to_vec(),
            name: name.to_string(),
        })?;
        Ok(RecordLogger::new(self.recorder.clone(), created, name.to_string()))
    }

    pub fn open(&self, created: SystemTime) -> Result<RecordLogger> {
        let mut rec = LogRecord {
            created: time_to_bytes(created).to_vec(),
            ..LogRecord::default()
        };
        self.recorder.read(&mut rec)?;
        Ok(RecordLogger::new(self.recorder.clone(), created, rec.name))
    }

    /// Remove the log and its messages; `NotFound` if there is no such log.
    pub fn delete(&self, created: SystemTime) -> Result<()> {
        let mut rec = LogRecord {
            created: time_to_bytes(created).to_vec(),
            ..LogRecord::default()
        };
        self.recorder.read(&mut rec)?;
        self.recorder
            .delete_prefix(&LogEntryRecord::default(), &time_to_bytes(created))?;
        self.recorder.delete(&rec)
    }

    /// Visit logs by creation time starting at `start`: `cb(created, name)`.
    pub fn range<F>(&self, start: SystemTime, reverse: bool, mut cb: F) -> Result<()>
    where
        F: FnMut(SystemTime, &str) -> bool,
    {
        let from = LogRecord {
            created: time_to_bytes(start).to_vec(),
            ..LogRecord::default()
        };
        let mut err: Option<Error> = None;
        self.recorder.range(&from, 0, reverse, |rec| match bytes_to_time(&rec.created) {
            Ok(at) => cb(at, &rec.name),
            Err(e) => {
                err = Some(e);
                false
            }
        })?;
        err.map_or(Ok(()), Err)
    }

    /// Visit the messages of one log starting at `start`: `cb(at, message)`.
    pub fn range_log<F>(&self, created: SystemTime, start: SystemTime, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(SystemTime, &str) -> bool,
    {
        range_entries(&self.recorder, created, start, reverse, cb)
    }
}

/// Handle on one log. Messages go through the buffered writer and become visible
/// after [`crate::Store::flush_buffered`] or close.
#[derive(Debug)]
pub struct RecordLogger {
    recorder: Recorder,
    created: SystemTime,
    name: String,
    ttl: Duration,
    clock: UniqueClock,
}

impl RecordLogger {
    fn new(recorder: Recorder, created: SystemTime, name: String) -> Self {
        Self {
            recorder,
            created,
            name,
            ttl: Duration::ZERO,
            clock: UniqueClock::new(),
        }
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages logged from now on expire after `ttl` (zero keeps them).
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn range<F>(&self, start: SystemTime, reverse: bool, cb: F) -> Result<()>
    where
        F: FnMut(SystemTime, &str) -> bool,
    {
        range_entries(&self.recorder, self.created, start, reverse, cb)
    }
}

impl Logger for RecordLogger {
    fn log(&self, msg: &str) -> Result<()> {
        let mut rec = LogEntryRecord::at(self.created, self.clock.next());
        rec.ttl = self.ttl;
        rec.message = msg.to_string();
        self.recorder.write_buffered(&rec)
    }
}

fn range_entries<F>(
    recorder: &Recorder,
    created: SystemTime,
    start: SystemTime,
    reverse: bool,
    mut cb: F,
) -> Result<()>
where
    F: FnMut(SystemTime, &str) -> bool,
{
    let from = LogEntryRecord::at(created, start);
    let mut err: Option<Error> = None;
    recorder.range(&from, TIME_BYTES_LEN, reverse, |rec| {
        match bytes_to_time(&rec.key[TIME_BYTES_LEN..]) {
            Ok(at) => cb(at, &rec.message),
            Err(e) => {
                err = Some(e);
                false
            }
        }
    })?;
    err.map_or(Ok(()), Err)
}
