//! WAL (ARBWAL01) — журнал коммитов хранилища.
//!
//! Разделение:
//! - encode.rs — кодирование кадров (заголовок + CRC32C) и списка операций коммита.
//! - reader.rs — последовательное чтение кадров с проверкой CRC.
//! - writer.rs — дозапись коммитов (Wal), fsync, переписывание при компакции.
//! - replay.rs — реплей при открытии, усечение частичного хвоста.
//!
//! Формат файла:
//! - заголовок 16 байт: [magic "ARBWAL01"][reserved u64]
//! - кадры: [type u8][flags u8][reserved u16][lsn u64][len u32][crc32c u32][payload]
//!
//! Все числа в кадрах — little-endian.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// -------------------- Константы формата --------------------

pub const WAL_FILE: &str = "wal-000001.log";
pub const WAL_MAGIC: &[u8; 8] = b"ARBWAL01";
pub const WAL_HDR_SIZE: usize = 16; // magic8 + reserved u64

// Record header: 20 bytes (CRC на смещении 16..20)
pub const WAL_REC_HDR_SIZE: usize = 20;

pub const WAL_REC_OFF_TYPE: usize = 0;
pub const WAL_REC_OFF_FLAGS: usize = 1;
pub const WAL_REC_OFF_RESERVED: usize = 2;
pub const WAL_REC_OFF_LSN: usize = 4;
pub const WAL_REC_OFF_LEN: usize = 12;
pub const WAL_REC_OFF_CRC32: usize = 16;

// Типы кадров
pub const WAL_REC_COMMIT: u8 = 1;
/// Written only by compaction: the live data set at the time of the rewrite.
pub const WAL_REC_SNAPSHOT: u8 = 2;

// -------------------- Общие утилиты --------------------

/// CRC32C по двум срезам без аллокаций.
#[inline]
pub fn crc32c_of_parts(head_without_crc: &[u8], payload: &[u8]) -> u32 {
    let c = crc32c::crc32c_append(0, head_without_crc);
    crc32c::crc32c_append(c, payload)
}

/// Записать 16-байтовый заголовок файла WAL в начало `f`.
pub fn write_wal_file_header(f: &mut File) -> Result<()> {
    f.seek(SeekFrom::Start(0))?;
    f.write_all(WAL_MAGIC)?;
    f.write_all(&[0u8; WAL_HDR_SIZE - 8])?;
    Ok(())
}

/// Проверить magic в заголовке. Ошибка, если файл короче заголовка.
pub fn check_wal_file_header(f: &mut File) -> Result<()> {
    if f.metadata()?.len() < WAL_HDR_SIZE as u64 {
        return Err(anyhow!("wal too small (< header)"));
    }
    let mut magic = [0u8; 8];
    f.seek(SeekFrom::Start(0))?;
    f.read_exact(&mut magic)?;
    if &magic != WAL_MAGIC {
        return Err(anyhow!("bad WAL magic"));
    }
    Ok(())
}

pub fn wal_path(root: &Path) -> PathBuf {
    root.join(WAL_FILE)
}

// -------------------- Подмодули и re-export --------------------

pub mod encode;
pub mod reader;
pub mod replay;
pub mod writer;

pub use encode::WalOp;
pub use reader::{CrcMismatch, WalRecord};
pub use replay::wal_replay;
pub use writer::Wal;
