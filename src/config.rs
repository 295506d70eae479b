//! Centralized configuration and builder for the store.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - StoreConfig::from_env() reads the ARB_* env vars; builder/setters override them.
//! - An absent data path means an in-memory store (nothing touches the disk).
//!
//! Defaults:
//! - wal_fsync = false (the WAL is written on every commit, fsync is opt-in)
//! - write_queue = 100 buffered entries before `write_buffered` blocks
//! - compact_interval_secs = 60, compact_min_bytes = 1 MiB
//! - seq_bandwidth = 100 numbers leased per sequence round-trip

use std::fmt;
use std::path::PathBuf;

/// Top-level configuration for [`crate::Store`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding LOCK and the WAL. None => in-memory store.
    /// Env: ARB_DATA_PATH (empty string => None)
    pub data_path: Option<PathBuf>,

    /// fsync the WAL after every commit.
    /// Env: ARB_WAL_FSYNC ("1|true|on|yes" => true)
    pub wal_fsync: bool,

    /// Capacity of the buffered-write channel.
    /// Env: ARB_WRITE_QUEUE (default 100, minimum 1)
    pub write_queue: usize,

    /// Period of background WAL compaction in seconds (0 disables it).
    /// Env: ARB_COMPACT_INTERVAL_SECS (default 60)
    pub compact_interval_secs: u64,

    /// Background compaction runs only when the WAL is at least this large.
    /// Env: ARB_COMPACT_MIN_BYTES (default 1 MiB)
    pub compact_min_bytes: u64,

    /// How many sequence numbers are leased per store round-trip.
    /// Env: ARB_SEQ_BANDWIDTH (default 100, minimum 1)
    pub seq_bandwidth: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            wal_fsync: false,
            write_queue: 100,
            compact_interval_secs: 60,
            compact_min_bytes: 1024 * 1024,
            seq_bandwidth: 100,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "on" || s == "yes"
    })
}

fn env_num<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
}

impl StoreConfig {
    /// In-memory configuration (no data path), env ignored.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Persistent configuration rooted at `path`, env ignored.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            data_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("ARB_DATA_PATH") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.data_path = Some(PathBuf::from(s));
            }
        }
        if let Some(on) = env_flag("ARB_WAL_FSYNC") {
            cfg.wal_fsync = on;
        }
        if let Some(n) = env_num::<usize>("ARB_WRITE_QUEUE") {
            cfg.write_queue = n.max(1);
        }
        if let Some(n) = env_num::<u64>("ARB_COMPACT_INTERVAL_SECS") {
            cfg.compact_interval_secs = n;
        }
        if let Some(n) = env_num::<u64>("ARB_COMPACT_MIN_BYTES") {
            cfg.compact_min_bytes = n;
        }
        if let Some(n) = env_num::<u64>("ARB_SEQ_BANDWIDTH") {
            cfg.seq_bandwidth = n.max(1);
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_data_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.data_path = path.map(Into::into);
        self
    }

    pub fn with_wal_fsync(mut self, on: bool) -> Self {
        self.wal_fsync = on;
        self
    }

    pub fn with_write_queue(mut self, n: usize) -> Self {
        self.write_queue = n.max(1);
        self
    }

    pub fn with_compact_interval_secs(mut self, secs: u64) -> Self {
        self.compact_interval_secs = secs;
        self
    }

    pub fn with_compact_min_bytes(mut self, bytes: u64) -> Self {
        self.compact_min_bytes = bytes;
        self
    }

    pub fn with_seq_bandwidth(mut self, n: u64) -> Self {
        self.seq_bandwidth = n.max(1);
        self
    }

    #[inline]
    pub fn is_in_memory(&self) -> bool {
        self.data_path.is_none()
    }

    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreConfig {{ \
             data_path: {}, \
             wal_fsync: {}, \
             write_queue: {}, \
             compact_interval_secs: {}, \
             compact_min_bytes: {}, \
             seq_bandwidth: {} \
             }}",
            self.data_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string()),
            self.wal_fsync,
            self.write_queue,
            self.compact_interval_secs,
            self.compact_min_bytes,
            self.seq_bandwidth,
        )
    }
}

/// Lightweight builder that produces a StoreConfig.
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    cfg: StoreConfig,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: StoreConfig::from_env(),
        }
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: StoreConfig::default(),
        }
    }

    pub fn data_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.cfg.data_path = path.map(Into::into);
        self
    }

    pub fn wal_fsync(mut self, on: bool) -> Self {
        self.cfg.wal_fsync = on;
        self
    }

    pub fn write_queue(mut self, n: usize) -> Self {
        self.cfg.write_queue = n.max(1);
        self
    }

    pub fn compact_interval_secs(mut self, secs: u64) -> Self {
        self.cfg.compact_interval_secs = secs;
        self
    }

    pub fn compact_min_bytes(mut self, bytes: u64) -> Self {
        self.cfg.compact_min_bytes = bytes;
        self
    }

    pub fn seq_bandwidth(mut self, n: u64) -> Self {
        self.cfg.seq_bandwidth = n.max(1);
        self
    }

    pub fn build(self) -> StoreConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = StoreBuilder::from_default()
            .data_path(Some("/tmp/arbor-cfg"))
            .wal_fsync(true)
            .write_queue(0)
            .seq_bandwidth(7)
            .build();
        assert_eq!(cfg.data_path, Some(PathBuf::from("/tmp/arbor-cfg")));
        assert!(cfg.wal_fsync);
        assert_eq!(cfg.write_queue, 1, "queue capacity is clamped to 1");
        assert_eq!(cfg.seq_bandwidth, 7);
        assert!(!cfg.is_in_memory());
    }

    #[test]
    fn env_vars_are_parsed_and_clamped() {
        std::env::set_var("ARB_DATA_PATH", " /tmp/arbor-env ");
        std::env::set_var("ARB_WAL_FSYNC", "Yes");
        std::env::set_var("ARB_WRITE_QUEUE", "0");
        std::env::set_var("ARB_COMPACT_INTERVAL_SECS", "5");
        std::env::set_var("ARB_COMPACT_MIN_BYTES", "4096");
        std::env::set_var("ARB_SEQ_BANDWIDTH", "not-a-number");

        let cfg = StoreConfig::from_env();
        assert_eq!(cfg.data_path, Some(PathBuf::from("/tmp/arbor-env")));
        assert!(cfg.wal_fsync);
        assert_eq!(cfg.write_queue, 1, "queue capacity is clamped to 1");
        assert_eq!(cfg.compact_interval_secs, 5);
        assert_eq!(cfg.compact_min_bytes, 4096);
        assert_eq!(cfg.seq_bandwidth, 100, "unparsable value keeps the default");

        std::env::set_var("ARB_SEQ_BANDWIDTH", "0");
        std::env::set_var("ARB_DATA_PATH", "");
        let cfg = StoreBuilder::new().write_queue(3).build();
        assert_eq!(cfg.seq_bandwidth, 1);
        assert!(cfg.is_in_memory());
        assert_eq!(cfg.write_queue, 3);

        for name in [
            "ARB_DATA_PATH",
            "ARB_WAL_FSYNC",
            "ARB_WRITE_QUEUE",
            "ARB_COMPACT_INTERVAL_SECS",
            "ARB_COMPACT_MIN_BYTES",
            "ARB_SEQ_BANDWIDTH",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn in_memory_display() {
        let cfg = StoreConfig::in_memory();
        assert!(cfg.is_in_memory());
        assert!(cfg.to_string().contains("data_path: in-memory"));
    }
}
