//! wal/replay — восстановление данных из WAL при открытии хранилища.
//!
//! - Кадры COMMIT и SNAPSHOT применяются по порядку через callback.
//! - Частичный хвост или CRC mismatch завершают реплей; файл усекается до
//!   последнего валидного кадра, чтобы дозапись шла с чистой границы.
//! - Неизвестные типы кадров пропускаются.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::fs::OpenOptions;

use crate::metrics::record_wal_replayed;

use super::encode::{decode_ops, WalOp};
use super::reader::{read_next_record, CrcMismatch};
use super::{check_wal_file_header, wal_path, WAL_HDR_SIZE, WAL_REC_COMMIT, WAL_REC_SNAPSHOT};

/// Проиграть WAL из `root`, передавая операции каждого кадра в `apply(lsn, ops)`.
/// Возвращает максимальный встреченный LSN (0, если журнал пуст или отсутствует).
pub fn wal_replay<F>(root: &std::path::Path, mut apply: F) -> Result<u64>
where
    F: FnMut(u64, Vec<WalOp>) -> Result<()>,
{
    let path = wal_path(root);
    if !path.exists() {
        debug!("wal_replay: no WAL at {}, nothing to do", path.display());
        return Ok(0);
    }

    let mut f = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open wal {}", path.display()))?;

    let len = f.metadata()?.len();
    if len < WAL_HDR_SIZE as u64 {
        debug!("wal_replay: WAL shorter than header, treated as empty");
        return Ok(0);
    }
    check_wal_file_header(&mut f).with_context(|| format!("replay {}", path.display()))?;

    let mut pos = WAL_HDR_SIZE as u64;
    let mut frames = 0u64;
    let mut max_lsn = 0u64;

    loop {
        let (rec, next) = match read_next_record(&mut f, pos, len) {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) if e.downcast_ref::<CrcMismatch>().is_some() => {
                warn!("wal_replay: {}, stop", e);
                break;
            }
            Err(e) => return Err(e.context(format!("replay {}", path.display()))),
        };

        match rec.rec_type {
            WAL_REC_COMMIT | WAL_REC_SNAPSHOT => {
                let ops = decode_ops(&rec.payload)
                    .map_err(|e| anyhow!("frame at pos {}: {}", rec.pos, e))?;
                apply(rec.lsn, ops)?;
                frames += 1;
            }
            other => debug!("wal_replay: skip unknown record type {} at {}", other, rec.pos),
        }
        max_lsn = max_lsn.max(rec.lsn);
        pos = next;
    }

    if pos < len {
        debug!(
            "wal_replay: truncating torn tail {} -> {} in {}",
            len,
            pos,
            path.display()
        );
        f.set_len(pos)?;
        f.sync_all()?;
    }

    record_wal_replayed(frames);
    if frames > 0 {
        info!("WAL replay: applied {} frame(s), max lsn {}", frames, max_lsn);
    } else {
        debug!("WAL replay: nothing to apply");
    }
    Ok(max_lsn)
}
