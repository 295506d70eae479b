//! store/sequence — монотонные счётчики с арендой диапазонов.
//!
//! Ключ последовательности хранит первое ещё не выданное число (u64 BE).
//! Каждая аренда резервирует `bandwidth` чисел одной транзакцией; при закрытии
//! хранилища неиспользованный остаток возвращается.

use anyhow::anyhow;
use byteorder::{BigEndian, ByteOrder};
use std::sync::{Arc, Mutex, MutexGuard};

use super::engine::Core;
use super::txn::Txn;
use crate::error::{Error, Result};
use crate::metrics::record_seq_lease;

#[derive(Debug, Default)]
struct SeqState {
    next: u64,
    leased: u64,
}

pub(crate) struct SeqShared {
    core: Arc<Core>,
    key: Vec<u8>,
    bandwidth: u64,
    state: Mutex<SeqState>,
}

impl SeqShared {
    fn state(&self) -> MutexGuard<'_, SeqState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lease(&self, st: &mut SeqState) -> Result<()> {
        let mut txn = Txn::begin(Arc::clone(&self.core), true)?;
        let start = match txn.get(&self.key) {
            Ok(it) => {
                if it.value().len() != 8 {
                    return Err(Error::Storage(anyhow!(
                        "sequence key holds {} bytes, expected 8",
                        it.value().len()
                    )));
                }
                BigEndian::read_u64(it.value())
            }
            Err(Error::NotFound) => 0,
            Err(e) => return Err(e),
        };
        let leased = start.saturating_add(self.bandwidth);
        txn.set(&self.key, &leased.to_be_bytes())?;
        txn.commit()?;
        st.next = start;
        st.leased = leased;
        record_seq_lease();
        Ok(())
    }

    /// Give back the unused part of the current lease.
    pub(crate) fn release(&self) -> Result<()> {
        let mut st = self.state();
        if st.next >= st.leased {
            return Ok(());
        }
        let mut txn = Txn::begin(Arc::clone(&self.core), true)?;
        txn.set(&self.key, &st.next.to_be_bytes())?;
        txn.commit()?;
        st.leased = st.next;
        Ok(())
    }
}

/// Handle to a persistent sequence, see [`crate::Store::sequence`].
#[derive(Clone)]
pub struct Sequence {
    shared: Arc<SeqShared>,
}

impl Sequence {
    pub(crate) fn new(core: Arc<Core>, key: &[u8], bandwidth: u64) -> Self {
        Self {
            shared: Arc::new(SeqShared {
                core,
                key: key.to_vec(),
                bandwidth: bandwidth.max(1),
                state: Mutex::new(SeqState::default()),
            }),
        }
    }

    pub(crate) fn shared(&self) -> Arc<SeqShared> {
        Arc::clone(&self.shared)
    }

    /// Next number; starts at 0 for a fresh key.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Result<u64> {
        let mut st = self.shared.state();
        if st.next >= st.leased {
            self.shared.lease(&mut st)?;
        }
        let v = st.next;
        st.next += 1;
        Ok(v)
    }

    pub fn release(&self) -> Result<()> {
        self.shared.release()
    }

    pub fn key(&self) -> &[u8] {
        &self.shared.key
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("key", &self.shared.key)
            .field("bandwidth", &self.shared.bandwidth)
            .finish()
    }
}
