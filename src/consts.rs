//! Общие константы форматов (key path, value flags, limits, records).

// -------- Key path --------
/// Depth of the virtual root: it has no key and no on-disk representation.
pub const ROOT_DEPTH: i32 = -1;
/// Role marker of a primary (main) entry.
pub const MAIN_KEY_PREFIX: u8 = 0;
/// Role marker of an index entry.
pub const INDEX_KEY_PREFIX: u8 = 1;

// -------- Root items --------
/// Root item keys are 2-byte big-endian integers; 0..16 are reserved.
pub const FIRST_USER_ROOT_KEY: u16 = 16;
pub const ROOT_KEY_LEN: usize = 2;

// -------- Limits (bytes, not characters) --------
pub const MIN_KEY_LEN: usize = 2;
pub const MAX_KEY_LEN: usize = 255;
pub const MAX_INDEXES: usize = 255;
pub const MAX_INDEX_LEN: usize = 255;

// -------- Entry metadata byte --------
/// The stored value is `[count][len][index]...[payload]`, not a raw payload.
pub const META_INDEXED: u8 = 0x1;
pub const META_KNOWN_BITS: u8 = META_INDEXED;

// -------- Files --------
pub const LOCK_FILE: &str = "LOCK";

// -------- Records --------
pub const RECORD_NAME_LEN: usize = 3;
pub const RECORD_KEY_SEPARATOR: u8 = 0;
/// Replaces the separator byte in the prefix of record sequences.
pub const RECORD_SEQ_MARKER: u8 = b's';

// -------- Sortable timestamps --------
/// [secs u64 BE][nanos u32 BE]
pub const TIME_BYTES_LEN: usize = 12;
