//! wal/encode — кодирование кадров WAL и полезной нагрузки коммита.
//!
//! Что здесь:
//! - build_hdr_with_crc / write_record: заголовок кадра (20 байт) с CRC32C по
//!   header[0..crc) + payload, запись [header][payload] по текущей позиции.
//! - WalOp + encode_ops / decode_ops: список операций одного коммита.
//!
//! Операция: [kind u8: 1 set | 2 delete][meta u8][expires_at u64][klen u32][vlen u32][key][value]

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::Write;

use super::{
    crc32c_of_parts, WAL_REC_HDR_SIZE, WAL_REC_OFF_CRC32, WAL_REC_OFF_FLAGS, WAL_REC_OFF_LEN,
    WAL_REC_OFF_LSN, WAL_REC_OFF_RESERVED, WAL_REC_OFF_TYPE,
};

const OP_SET: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_HDR_SIZE: usize = 1 + 1 + 8 + 4 + 4;

/// Одна операция внутри кадра COMMIT/SNAPSHOT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalOp {
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        meta: u8,
        expires_at: u64,
    },
    Delete {
        key: Vec<u8>,
    },
}

impl WalOp {
    pub fn key(&self) -> &[u8] {
        match self {
            WalOp::Set { key, .. } | WalOp::Delete { key } => key,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            WalOp::Set { key, value, .. } => OP_HDR_SIZE + key.len() + value.len(),
            WalOp::Delete { key } => OP_HDR_SIZE + key.len(),
        }
    }
}

/// Построить заголовок кадра с заполненным CRC32C.
pub fn build_hdr_with_crc(rec_type: u8, lsn: u64, payload: &[u8]) -> [u8; WAL_REC_HDR_SIZE] {
    let mut hdr = [0u8; WAL_REC_HDR_SIZE];
    hdr[WAL_REC_OFF_TYPE] = rec_type;
    hdr[WAL_REC_OFF_FLAGS] = 0;
    LittleEndian::write_u16(&mut hdr[WAL_REC_OFF_RESERVED..WAL_REC_OFF_RESERVED + 2], 0);
    LittleEndian::write_u64(&mut hdr[WAL_REC_OFF_LSN..WAL_REC_OFF_LSN + 8], lsn);
    LittleEndian::write_u32(
        &mut hdr[WAL_REC_OFF_LEN..WAL_REC_OFF_LEN + 4],
        payload.len() as u32,
    );

    let crc = crc32c_of_parts(&hdr[..WAL_REC_OFF_CRC32], payload);
    LittleEndian::write_u32(&mut hdr[WAL_REC_OFF_CRC32..WAL_REC_OFF_CRC32 + 4], crc);
    hdr
}

/// Записать один кадр [header][payload] в текущую позицию writer'а.
/// Возвращает полный размер кадра.
pub fn write_record<W: Write>(
    writer: &mut W,
    rec_type: u8,
    lsn: u64,
    payload: &[u8],
) -> Result<usize> {
    if payload.len() > u32::MAX as usize {
        return Err(anyhow!(
            "payload too large for WAL record: {} bytes (max {})",
            payload.len(),
            u32::MAX
        ));
    }

    let hdr = build_hdr_with_crc(rec_type, lsn, payload);
    writer.write_all(&hdr)?;
    if !payload.is_empty() {
        writer.write_all(payload)?;
    }
    Ok(WAL_REC_HDR_SIZE + payload.len())
}

pub fn encode_ops(ops: &[WalOp]) -> Vec<u8> {
    let total: usize = ops.iter().map(WalOp::encoded_len).sum();
    let mut out = Vec::with_capacity(total);
    let mut hdr = [0u8; OP_HDR_SIZE];
    for op in ops {
        let (kind, meta, exp, key, value): (u8, u8, u64, &[u8], &[u8]) = match op {
            WalOp::Set {
                key,
                value,
                meta,
                expires_at,
            } => (OP_SET, *meta, *expires_at, key.as_slice(), value.as_slice()),
            WalOp::Delete { key } => (OP_DELETE, 0, 0, key.as_slice(), &[][..]),
        };
        hdr[0] = kind;
        hdr[1] = meta;
        LittleEndian::write_u64(&mut hdr[2..10], exp);
        LittleEndian::write_u32(&mut hdr[10..14], key.len() as u32);
        LittleEndian::write_u32(&mut hdr[14..18], value.len() as u32);
        out.extend_from_slice(&hdr);
        out.extend_from_slice(key);
        out.extend_from_slice(value);
    }
    out
}

pub fn decode_ops(mut buf: &[u8]) -> Result<Vec<WalOp>> {
    let mut ops = Vec::new();
    while !buf.is_empty() {
        if buf.len() < OP_HDR_SIZE {
            return Err(anyhow!("wal op header truncated ({} bytes left)", buf.len()));
        }
        let kind = buf[0];
        let meta = buf[1];
        let expires_at = LittleEndian::read_u64(&buf[2..10]);
        let klen = LittleEndian::read_u32(&buf[10..14]) as usize;
        let vlen = LittleEndian::read_u32(&buf[14..18]) as usize;
        let body = &buf[OP_HDR_SIZE..];
        if body.len() < klen + vlen {
            return Err(anyhow!(
                "wal op body truncated: need {}, have {}",
                klen + vlen,
                body.len()
            ));
        }
        let key = body[..klen].to_vec();
        let op = match kind {
            OP_SET => WalOp::Set {
                key,
                value: body[klen..klen + vlen].to_vec(),
                meta,
                expires_at,
            },
            OP_DELETE => WalOp::Delete { key },
            other => return Err(anyhow!("unknown wal op kind {}", other)),
        };
        ops.push(op);
        buf = &body[klen + vlen..];
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_decode_what_was_encoded() {
        let ops = vec![
            WalOp::Set {
                key: b"alpha".to_vec(),
                value: b"one".to_vec(),
                meta: 1,
                expires_at: 42,
            },
            WalOp::Delete {
                key: b"beta".to_vec(),
            },
            WalOp::Set {
                key: b"gamma".to_vec(),
                value: Vec::new(),
                meta: 0,
                expires_at: 0,
            },
        ];
        let buf = encode_ops(&ops);
        assert_eq!(decode_ops(&buf).unwrap(), ops);
        assert!(decode_ops(&buf[..buf.len() - 1]).is_err());
    }

    #[test]
    fn header_crc_covers_payload() {
        let a = build_hdr_with_crc(1, 7, b"payload");
        let b = build_hdr_with_crc(1, 7, b"paylo4d");
        assert_ne!(a[WAL_REC_OFF_CRC32..], b[WAL_REC_OFF_CRC32..]);
        assert_eq!(a[..WAL_REC_OFF_CRC32], b[..WAL_REC_OFF_CRC32]);
    }
}
