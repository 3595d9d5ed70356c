use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier of one bucket's backend job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Id of the job covering `instant`'s minute.
    pub fn for_instant(instant: DateTime<Utc>) -> Self {
        let key = bucket_key(instant);
        Self(bytes_to_hex(&Sha256::digest(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `instant` truncated to the whole minute.
pub fn bucket_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .duration_trunc(TimeDelta::minutes(1))
        .unwrap_or_else(|_| {
            // Only reachable at the edges of chrono's range.
            instant
                .with_nanosecond(0)
                .and_then(|dt| dt.with_second(0))
                .unwrap_or(instant)
        })
}

/// Human-readable key hashed into the [`JobId`].
pub fn bucket_key(instant: DateTime<Utc>) -> String {
    format!("reminder-{}", bucket_start(instant).format("%Y-%m-%dT%H:%MZ"))
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(nibble_to_hex(byte >> 4));
        out.push(nibble_to_hex(byte & 0x0f));
    }
    out
}

fn nibble_to_hex(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'a' + (nibble - 10)) as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, h, m, s)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn same_minute_shares_a_job() {
        assert_eq!(JobId::for_instant(at(12, 0, 5)), JobId::for_instant(at(12, 0, 45)));
        assert_ne!(JobId::for_instant(at(12, 0, 59)), JobId::for_instant(at(12, 1, 0)));
    }

    #[test]
    fn key_is_minute_precision() {
        assert_eq!(bucket_key(at(12, 0, 45)), "reminder-2025-04-02T12:00Z");
        assert_eq!(bucket_start(at(9, 30, 59)), at(9, 30, 0));
    }

    #[test]
    fn id_is_lowercase_sha256_hex() {
        let id = JobId::for_instant(at(12, 0, 0));
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }
}
