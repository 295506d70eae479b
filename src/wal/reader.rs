//! wal/reader — последовательное чтение кадров WAL с проверкой CRC.
//!
//! - Валидирует CRC32C по header[0..crc) + payload.
//! - Толерантен к частичному хвосту (возвращает Ok(None)).
//! - При несовпадении CRC возвращает ошибку с [`CrcMismatch`] внутри, чтобы реплей
//!   мог отличить повреждённый хвост от I/O ошибки (`err.downcast_ref::<CrcMismatch>()`).
//!
//! Использование:
//!   let len = file.metadata()?.len();
//!   let mut pos = WAL_HDR_SIZE as u64;
//!   while let Some((rec, next)) = read_next_record(&mut file, pos, len)? {
//!       /* обработка rec */
//!       pos = next;
//!   }

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use super::{
    crc32c_of_parts, WAL_REC_HDR_SIZE, WAL_REC_OFF_CRC32, WAL_REC_OFF_FLAGS, WAL_REC_OFF_LEN,
    WAL_REC_OFF_LSN, WAL_REC_OFF_TYPE,
};

/// Одна запись WAL, считанная с диска.
#[derive(Debug)]
pub struct WalRecord {
    pub rec_type: u8,
    pub flags: u8,
    pub lsn: u64,
    pub payload: Vec<u8>,
    /// Позиция начала заголовка записи.
    pub pos: u64,
    /// Заголовок + payload.
    pub len_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcMismatch {
    pub pos: u64,
    pub stored: u32,
    pub calc: u32,
}

impl fmt::Display for CrcMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WAL CRC mismatch at pos {} (stored={}, calc={})",
            self.pos, self.stored, self.calc
        )
    }
}

impl std::error::Error for CrcMismatch {}

/// Считать следующую запись с позиции `pos`; `file_len` — текущая длина файла.
///
/// - Ok(Some((rec, next_pos))) — запись прочитана и валидна.
/// - Ok(None) — конец файла или частичный хвост.
/// - Err(e) — CRC mismatch ([`CrcMismatch`]) или I/O ошибка.
pub fn read_next_record<F: Read + Seek>(
    f: &mut F,
    pos: u64,
    file_len: u64,
) -> Result<Option<(WalRecord, u64)>> {
    if pos + (WAL_REC_HDR_SIZE as u64) > file_len {
        return Ok(None);
    }

    f.seek(SeekFrom::Start(pos))?;
    let mut rhdr = [0u8; WAL_REC_HDR_SIZE];
    if let Err(e) = f.read_exact(&mut rhdr) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(anyhow!("wal read header: {}", e));
    }

    let payload_len = LittleEndian::read_u32(&rhdr[WAL_REC_OFF_LEN..WAL_REC_OFF_LEN + 4]) as usize;
    let total = WAL_REC_HDR_SIZE as u64 + payload_len as u64;
    let next_pos = pos + total;
    if next_pos > file_len {
        return Ok(None);
    }

    let mut payload = vec![0u8; payload_len];
    if let Err(e) = f.read_exact(&mut payload) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(anyhow!("wal read payload: {}", e));
    }

    let stored = LittleEndian::read_u32(&rhdr[WAL_REC_OFF_CRC32..WAL_REC_OFF_CRC32 + 4]);
    let calc = crc32c_of_parts(&rhdr[..WAL_REC_OFF_CRC32], &payload);
    if stored != calc {
        return Err(CrcMismatch { pos, stored, calc }.into());
    }

    let rec = WalRecord {
        rec_type: rhdr[WAL_REC_OFF_TYPE],
        flags: rhdr[WAL_REC_OFF_FLAGS],
        lsn: LittleEndian::read_u64(&rhdr[WAL_REC_OFF_LSN..WAL_REC_OFF_LSN + 8]),
        payload,
        pos,
        len_total: total,
    };
    Ok(Some((rec, next_pos)))
}

#[cfg(test)]
mod tests {
    use super::super::encode::write_record;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn partial_tail_is_soft_eof() {
        let mut buf = Vec::new();
        write_record(&mut buf, 1, 1, b"first").unwrap();
        write_record(&mut buf, 1, 2, b"second").unwrap();
        let cut = buf.len() - 3;
        let mut cur = Cursor::new(buf[..cut].to_vec());

        let (r1, next) = read_next_record(&mut cur, 0, cut as u64).unwrap().unwrap();
        assert_eq!(r1.lsn, 1);
        assert_eq!(r1.payload, b"first");
        assert!(read_next_record(&mut cur, next, cut as u64).unwrap().is_none());
    }

    #[test]
    fn flipped_byte_reports_crc_mismatch() {
        let mut buf = Vec::new();
        write_record(&mut buf, 1, 9, b"payload").unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let len = buf.len() as u64;
        let mut cur = Cursor::new(buf);
        let err = read_next_record(&mut cur, 0, len).unwrap_err();
        let m = err.downcast_ref::<CrcMismatch>().expect("crc mismatch");
        assert_eq!(m.pos, 0);
    }
}
