//! Key-path codec: tree position <-> flat ordered store key, index set + payload
//! <-> stored value.
//!
//! Key of a node at depth d with ancestors a0..a(d-1):
//!   [len(a0)][a0] .. [len(a(d-1))][a(d-1)] ++ [role] ++ [own key]
//! role = MAIN_KEY_PREFIX for the primary entry, INDEX_KEY_PREFIX for index entries.
//! Everything before the role byte is the node's `base`.
//!
//! Value: raw payload when there are no indexes (meta = 0); otherwise
//! meta = META_INDEXED and `[count][len][index]..[payload]`.

use crate::consts::{
    INDEX_KEY_PREFIX, MAIN_KEY_PREFIX, MAX_INDEXES, MAX_INDEX_LEN, MAX_KEY_LEN, META_INDEXED,
    META_KNOWN_BITS, MIN_KEY_LEN,
};
use crate::error::{Error, Result};

// ----- keys -----

/// Base of the children of the node (`parent_depth`, `parent_base`, `parent_key`).
/// Children of the virtual root have an empty base.
pub fn child_base(parent_depth: i32, parent_base: &[u8], parent_key: &[u8]) -> Vec<u8> {
    if parent_depth < 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(parent_base.len() + 1 + parent_key.len());
    out.extend_from_slice(parent_base);
    out.push(parent_key.len() as u8);
    out.extend_from_slice(parent_key);
    out
}

fn role_key(base: &[u8], role: u8, tail: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(base.len() + 1 + tail.len());
    out.extend_from_slice(base);
    out.push(role);
    out.extend_from_slice(tail);
    out
}

#[inline]
pub fn main_key(base: &[u8], key: &[u8]) -> Vec<u8> {
    role_key(base, MAIN_KEY_PREFIX, key)
}

#[inline]
pub fn index_key(base: &[u8], index: &[u8]) -> Vec<u8> {
    role_key(base, INDEX_KEY_PREFIX, index)
}

/// Prefix of every primary entry under `base`.
#[inline]
pub fn main_prefix(base: &[u8]) -> Vec<u8> {
    role_key(base, MAIN_KEY_PREFIX, &[])
}

/// Iteration bounds for a child range: `(prefix, seek)`.
///
/// `prefix` = main prefix ++ start[..prefix_count] bounds the scan,
/// `seek` = prefix ++ start[prefix_count..] positions it.
pub fn range_prefix(base: &[u8], start: &[u8], prefix_count: usize) -> Result<(Vec<u8>, Vec<u8>)> {
    if prefix_count > start.len() {
        return Err(Error::PrefixCountTooLong);
    }
    let prefix = role_key(base, MAIN_KEY_PREFIX, &start[..prefix_count]);
    let mut seek = prefix.clone();
    seek.extend_from_slice(&start[prefix_count..]);
    Ok((prefix, seek))
}

// ----- validation -----

pub fn validate_key(key: &[u8]) -> Result<()> {
    if key.len() < MIN_KEY_LEN || key.len() > MAX_KEY_LEN {
        return Err(Error::KeyInvalid);
    }
    Ok(())
}

pub fn validate_index(index: &[u8]) -> Result<()> {
    if index.is_empty() {
        return Err(Error::EmptyIndex);
    }
    if index.len() > MAX_INDEX_LEN {
        return Err(Error::IndexTooLong);
    }
    Ok(())
}

pub fn validate_indexes<I: AsRef<[u8]>>(indexes: &[I]) -> Result<()> {
    if indexes.len() > MAX_INDEXES {
        return Err(Error::TooManyIndexes);
    }
    indexes.iter().try_for_each(|i| validate_index(i.as_ref()))
}

// ----- values -----

/// Pack indexes and payload into `(meta, stored value)`.
pub fn encode_value<I: AsRef<[u8]>>(indexes: &[I], payload: &[u8]) -> (u8, Vec<u8>) {
    if indexes.is_empty() {
        return (0, payload.to_vec());
    }
    let idx_bytes: usize = indexes.iter().map(|i| 1 + i.as_ref().len()).sum();
    let mut out = Vec::with_capacity(1 + idx_bytes + payload.len());
    out.push(indexes.len() as u8);
    for i in indexes {
        let i = i.as_ref();
        out.push(i.len() as u8);
        out.extend_from_slice(i);
    }
    out.extend_from_slice(payload);
    (META_INDEXED, out)
}

/// Unpack a stored value into `(indexes, payload)`.
pub fn decode_value(meta: u8, raw: &[u8]) -> Result<(Vec<Vec<u8>>, Vec<u8>)> {
    if meta & !META_KNOWN_BITS != 0 {
        return Err(Error::NoFlags);
    }
    if meta & META_INDEXED == 0 {
        return Ok((Vec::new(), raw.to_vec()));
    }
    let (&count, mut rest) = raw.split_first().ok_or(Error::NoIndexCount)?;
    let mut indexes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (&len, tail) = rest.split_first().ok_or(Error::NoIndexLength)?;
        let len = len as usize;
        if len > tail.len() {
            return Err(Error::BadIndexLength);
        }
        indexes.push(tail[..len].to_vec());
        rest = &tail[len..];
    }
    Ok((indexes, rest.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_layout() {
        assert!(child_base(-1, b"", b"").is_empty());
        let b0 = child_base(0, b"", &[0, 16]);
        assert_eq!(b0, vec![2, 0, 16]);
        let b1 = child_base(1, &b0, b"ab");
        assert_eq!(b1, vec![2, 0, 16, 2, b'a', b'b']);
        assert_eq!(main_key(&b1, b"xy"), vec![2, 0, 16, 2, b'a', b'b', 0, b'x', b'y']);
        assert_eq!(index_key(&b0, b"nm"), vec![2, 0, 16, 1, b'n', b'm']);
    }

    #[test]
    fn range_prefix_splits_start() {
        let (p, s) = range_prefix(b"B", b"abc", 2).unwrap();
        assert_eq!(p, b"B\x00ab".to_vec());
        assert_eq!(s, b"B\x00abc".to_vec());
        assert!(matches!(
            range_prefix(b"B", b"ab", 3),
            Err(Error::PrefixCountTooLong)
        ));
    }

    #[test]
    fn value_codec_and_malformed_inputs() {
        let (meta, raw) = encode_value::<&[u8]>(&[], b"payload");
        assert_eq!(meta, 0);
        assert_eq!(raw, b"payload");

        let (meta, raw) = encode_value(&[b"i1".as_slice(), b"idx2".as_slice()], b"pl");
        assert_eq!(meta, META_INDEXED);
        assert_eq!(raw, b"\x02\x02i1\x04idx2pl".to_vec());
        let (idx, pl) = decode_value(meta, &raw).unwrap();
        assert_eq!(idx, vec![b"i1".to_vec(), b"idx2".to_vec()]);
        assert_eq!(pl, b"pl");

        assert!(matches!(decode_value(0x80, b"x"), Err(Error::NoFlags)));
        assert!(matches!(decode_value(META_INDEXED, b""), Err(Error::NoIndexCount)));
        assert!(matches!(decode_value(META_INDEXED, b"\x02\x01a"), Err(Error::NoIndexLength)));
        assert!(matches!(decode_value(META_INDEXED, b"\x01\x05ab"), Err(Error::BadIndexLength)));
    }

    #[test]
    fn validation_limits_are_bytes() {
        assert!(matches!(validate_key(b"a"), Err(Error::KeyInvalid)));
        assert!(validate_key(&[0u8; 255]).is_ok());
        assert!(matches!(validate_key(&[0u8; 256]), Err(Error::KeyInvalid)));
        // two bytes, one character
        assert!(validate_key("é".as_bytes()).is_ok());

        let many: Vec<&[u8]> = vec![b"x".as_slice(); 256];
        assert!(matches!(validate_indexes(&many), Err(Error::TooManyIndexes)));
        assert!(matches!(validate_indexes(&[vec![1u8; 256]]), Err(Error::IndexTooLong)));
        assert!(matches!(validate_indexes(&[b"".as_slice()]), Err(Error::EmptyIndex)));
    }

    #[test]
    fn encoded_child_order_matches_raw_key_order() {
        let mut rng = oorandom::Rand32::new(0x5eed);
        let base = child_base(0, b"", &[0, 16]);
        let mut raw: Vec<Vec<u8>> = (0..200)
            .map(|_| {
                let len = 2 + rng.rand_range(0..8) as usize;
                (0..len).map(|_| rng.rand_range(0..256) as u8).collect()
            })
            .collect();
        raw.sort();
        raw.dedup();
        let encoded: Vec<Vec<u8>> = raw.iter().map(|k| main_key(&base, k)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }
}
