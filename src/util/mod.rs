//! util — общие утилиты.
//!
//! Содержит:
//! - now_secs(): текущее Unix-время в секундах.
//! - time_to_bytes()/bytes_to_time(): сортируемое 12-байтовое представление времени.
//! - UniqueClock: монотонный источник уникальных меток времени (ключи логов).

use byteorder::{BigEndian, ByteOrder};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::consts::TIME_BYTES_LEN;
use crate::error::{Error, Result};

/// Current Unix time in seconds.
#[inline]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Absolute expiry (Unix seconds) for a time-to-live; zero ttl => 0 (never).
#[inline]
pub fn expires_at_from_ttl(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        0
    } else {
        // round up so that a sub-second ttl still expires in the future
        now_secs().saturating_add(ttl.as_secs().max(1))
    }
}

/// Encode a time as `[secs u64 BE][nanos u32 BE]`. Byte order == time order.
/// Times before the epoch clamp to the epoch.
pub fn time_to_bytes(t: SystemTime) -> [u8; TIME_BYTES_LEN] {
    let d = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    let mut out = [0u8; TIME_BYTES_LEN];
    BigEndian::write_u64(&mut out[0..8], d.as_secs());
    BigEndian::write_u32(&mut out[8..12], d.subsec_nanos());
    out
}

pub fn bytes_to_time(data: &[u8]) -> Result<SystemTime> {
    if data.len() != TIME_BYTES_LEN {
        return Err(Error::BadTimeBytes(data.len()));
    }
    let secs = BigEndian::read_u64(&data[0..8]);
    let nanos = BigEndian::read_u32(&data[8..12]);
    Ok(UNIX_EPOCH + Duration::new(secs, nanos))
}

/// Hands out strictly increasing timestamps, even when the wall clock repeats
/// or steps back.
#[derive(Debug, Default)]
pub struct UniqueClock {
    last: Mutex<Option<SystemTime>>,
}

impl UniqueClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> SystemTime {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let now = SystemTime::now();
        let t = match *last {
            Some(prev) if now <= prev => prev + Duration::from_nanos(1),
            _ => now,
        };
        *last = Some(t);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_monotonic_nonzero() {
        let a = now_secs();
        let b = now_secs();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn time_bytes_roundtrip_and_order() {
        let t1 = UNIX_EPOCH + Duration::new(1_700_000_000, 5);
        let t2 = UNIX_EPOCH + Duration::new(1_700_000_000, 6);
        let t3 = UNIX_EPOCH + Duration::new(1_700_000_001, 0);
        let (b1, b2, b3) = (time_to_bytes(t1), time_to_bytes(t2), time_to_bytes(t3));
        assert!(b1 < b2 && b2 < b3);
        assert_eq!(bytes_to_time(&b2).unwrap(), t2);
        assert!(matches!(bytes_to_time(&b1[..11]), Err(Error::BadTimeBytes(11))));
    }

    #[test]
    fn unique_clock_never_repeats() {
        let c = UniqueClock::new();
        let mut prev = c.next();
        for _ in 0..1000 {
            let t = c.next();
            assert!(t > prev);
            prev = t;
        }
    }

    #[test]
    fn ttl_zero_never_expires() {
        assert_eq!(expires_at_from_ttl(Duration::ZERO), 0);
        assert!(expires_at_from_ttl(Duration::from_millis(10)) > now_secs() - 1);
    }
}
