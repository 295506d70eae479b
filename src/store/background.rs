//! store/background — поток записи буферизованных значений и компакции WAL.
//!
//! - Ограниченный канал (`write_queue`): `write_buffered` блокируется при заполнении.
//! - Подряд идущие записи из очереди объединяются в одну транзакцию.
//! - Раз в `compact_interval_secs` WAL переписывается, если он не меньше
//!   `compact_min_bytes`.
//! - Остановка: `Shutdown(ack)`; поток дописывает очередь, отвечает и выходит.

use anyhow::anyhow;
use log::{debug, info, warn};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::engine::Core;
use super::txn::Txn;
use super::Entry;
use crate::error::{Error, Result};
use crate::metrics::record_buffered_batch;

pub(crate) enum Msg {
    Write(Entry),
    Flush(SyncSender<()>),
    Shutdown(SyncSender<()>),
}

pub(crate) struct Worker {
    tx: SyncSender<Msg>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(core: Arc<Core>) -> Result<Self> {
        let (tx, rx) = sync_channel(core.cfg.write_queue);
        let handle = std::thread::Builder::new()
            .name("arbor-writer".into())
            .spawn(move || run(core, rx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub(crate) fn sender(&self) -> SyncSender<Msg> {
        self.tx.clone()
    }

    /// Ask the thread to drain its queue and stop, then join it.
    pub(crate) fn shutdown(mut self) -> Result<()> {
        let (ack_tx, ack_rx) = sync_channel(1);
        if self.tx.send(Msg::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
        if let Some(h) = self.handle.take() {
            h.join()
                .map_err(|_| Error::Storage(anyhow!("background writer panicked")))?;
        }
        Ok(())
    }
}

fn commit_batch(core: &Arc<Core>, batch: Vec<Entry>) {
    let n = batch.len() as u64;
    let res = Txn::begin(Arc::clone(core), true).and_then(|mut txn| {
        for e in batch {
            txn.set_entry(e)?;
        }
        txn.commit()
    });
    match res {
        Ok(()) => record_buffered_batch(n),
        Err(e) => warn!("background writer: dropping batch of {} entries: {}", n, e),
    }
}

fn maybe_compact(core: &Core) {
    let len = core.wal_len();
    if len < core.cfg.compact_min_bytes {
        debug!("background compaction skipped: wal {} bytes", len);
        return;
    }
    if let Err(e) = core.compact() {
        warn!("background compaction failed: {}", e);
    }
}

fn run(core: Arc<Core>, rx: Receiver<Msg>) {
    let interval = if core.cfg.is_in_memory() || core.cfg.compact_interval_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(core.cfg.compact_interval_secs))
    };
    let max_batch = core.cfg.write_queue;
    let mut next_compact = interval.map(|iv| Instant::now() + iv);

    loop {
        let msg = match next_compact {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(m) => Some(m),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(m) => Some(m),
                Err(_) => break,
            },
        };

        let control = match msg {
            None => {
                maybe_compact(&core);
                next_compact = interval.map(|iv| Instant::now() + iv);
                continue;
            }
            Some(Msg::Write(first)) => {
                let mut batch = vec![first];
                let mut tail = None;
                while batch.len() < max_batch {
                    match rx.try_recv() {
                        Ok(Msg::Write(e)) => batch.push(e),
                        Ok(other) => {
                            tail = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&core, batch);
                tail
            }
            Some(other) => Some(other),
        };

        match control {
            Some(Msg::Flush(ack)) => {
                let _ = ack.send(());
            }
            Some(Msg::Shutdown(ack)) => {
                let _ = ack.send(());
                info!("background writer stopped");
                return;
            }
            Some(Msg::Write(_)) | None => {}
        }
    }
    debug!("background writer: channel closed");
}
