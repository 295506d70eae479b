//! Lightweight global metrics for the store.
//!
//! Thread-safe atomic counters for:
//! - transactions (commits / conflicts / discards)
//! - WAL (appends, bytes, fsyncs, compactions, replayed frames)
//! - buffered writes (entries and background batches)
//! - read-side TTL (expired entries skipped)
//! - sequences (lease round-trips)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Transactions -----
static TXN_COMMITS: AtomicU64 = AtomicU64::new(0);
static TXN_CONFLICTS: AtomicU64 = AtomicU64::new(0);
static TXN_DISCARDS: AtomicU64 = AtomicU64::new(0);

// ----- WAL -----
static WAL_APPENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static WAL_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static WAL_FSYNC_CALLS: AtomicU64 = AtomicU64::new(0);
static WAL_COMPACTIONS: AtomicU64 = AtomicU64::new(0);
static WAL_REPLAYED_FRAMES: AtomicU64 = AtomicU64::new(0);

// ----- Buffered writes -----
static BUFFERED_ENTRIES: AtomicU64 = AtomicU64::new(0);
static BUFFERED_BATCHES: AtomicU64 = AtomicU64::new(0);

// ----- TTL -----
static TTL_SKIPPED: AtomicU64 = AtomicU64::new(0);

// ----- Sequences -----
static SEQ_LEASES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub txn_commits: u64,
    pub txn_conflicts: u64,
    pub txn_discards: u64,

    pub wal_appends_total: u64,
    pub wal_bytes_written: u64,
    pub wal_fsync_calls: u64,
    pub wal_compactions: u64,
    pub wal_replayed_frames: u64,

    pub buffered_entries: u64,
    pub buffered_batches: u64,

    pub ttl_skipped: u64,

    pub seq_leases: u64,
}

impl MetricsSnapshot {
    /// Share of commit attempts rejected as conflicts.
    pub fn conflict_ratio(&self) -> f64 {
        let total = self.txn_commits + self.txn_conflicts;
        if total == 0 {
            0.0
        } else {
            self.txn_conflicts as f64 / total as f64
        }
    }

    pub fn avg_buffered_batch(&self) -> f64 {
        if self.buffered_batches == 0 {
            0.0
        } else {
            self.buffered_entries as f64 / self.buffered_batches as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "txn commits={} conflicts={} ({:.2}%) discards={}; \
             wal appends={} bytes={} fsyncs={} compactions={} replayed={}; \
             buffered entries={} batches={} (avg {:.1}); ttl skipped={}; seq leases={}",
            self.txn_commits,
            self.txn_conflicts,
            self.conflict_ratio() * 100.0,
            self.txn_discards,
            self.wal_appends_total,
            self.wal_bytes_written,
            self.wal_fsync_calls,
            self.wal_compactions,
            self.wal_replayed_frames,
            self.buffered_entries,
            self.buffered_batches,
            self.avg_buffered_batch(),
            self.ttl_skipped,
            self.seq_leases,
        )
    }
}

// ----- Recorders (transactions) -----
pub fn record_txn_commit() {
    TXN_COMMITS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_txn_conflict() {
    TXN_CONFLICTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_txn_discard() {
    TXN_DISCARDS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (WAL) -----
pub fn record_wal_append(frame_len: usize) {
    WAL_APPENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    WAL_BYTES_WRITTEN.fetch_add(frame_len as u64, Ordering::Relaxed);
}

pub fn record_wal_fsync() {
    WAL_FSYNC_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_wal_compaction() {
    WAL_COMPACTIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_wal_replayed(frames: u64) {
    WAL_REPLAYED_FRAMES.fetch_add(frames, Ordering::Relaxed);
}

// ----- Recorders (buffered writes) -----
pub fn record_buffered_batch(entries: u64) {
    BUFFERED_BATCHES.fetch_add(1, Ordering::Relaxed);
    BUFFERED_ENTRIES.fetch_add(entries, Ordering::Relaxed);
}

// ----- Recorders (TTL / sequences) -----
pub fn record_ttl_skipped() {
    TTL_SKIPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_seq_lease() {
    SEQ_LEASES.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        txn_commits: TXN_COMMITS.load(Ordering::Relaxed),
        txn_conflicts: TXN_CONFLICTS.load(Ordering::Relaxed),
        txn_discards: TXN_DISCARDS.load(Ordering::Relaxed),

        wal_appends_total: WAL_APPENDS_TOTAL.load(Ordering::Relaxed),
        wal_bytes_written: WAL_BYTES_WRITTEN.load(Ordering::Relaxed),
        wal_fsync_calls: WAL_FSYNC_CALLS.load(Ordering::Relaxed),
        wal_compactions: WAL_COMPACTIONS.load(Ordering::Relaxed),
        wal_replayed_frames: WAL_REPLAYED_FRAMES.load(Ordering::Relaxed),

        buffered_entries: BUFFERED_ENTRIES.load(Ordering::Relaxed),
        buffered_batches: BUFFERED_BATCHES.load(Ordering::Relaxed),

        ttl_skipped: TTL_SKIPPED.load(Ordering::Relaxed),

        seq_leases: SEQ_LEASES.load(Ordering::Relaxed),
    }
}

/// Reset all counters (useful in tests).
pub fn reset() {
    for c in [
        &TXN_COMMITS,
        &TXN_CONFLICTS,
        &TXN_DISCARDS,
        &WAL_APPENDS_TOTAL,
        &WAL_BYTES_WRITTEN,
        &WAL_FSYNC_CALLS,
        &WAL_COMPACTIONS,
        &WAL_REPLAYED_FRAMES,
        &BUFFERED_ENTRIES,
        &BUFFERED_BATCHES,
        &TTL_SKIPPED,
        &SEQ_LEASES,
    ] {
        c.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_handle_zero() {
        let s = MetricsSnapshot::default();
        assert_eq!(s.conflict_ratio(), 0.0);
        assert_eq!(s.avg_buffered_batch(), 0.0);

        let s = MetricsSnapshot {
            txn_commits: 3,
            txn_conflicts: 1,
            buffered_entries: 10,
            buffered_batches: 4,
            ..Default::default()
        };
        assert!((s.conflict_ratio() - 0.25).abs() < f64::EPSILON);
        assert!((s.avg_buffered_batch() - 2.5).abs() < f64::EPSILON);

        let line = s.to_string();
        assert!(line.contains("conflicts=1 (25.00%)"), "{}", line);
        assert!(line.contains("batches=4 (avg 2.5)"), "{}", line);
    }
}
