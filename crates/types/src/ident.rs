//! Sortable item identifiers.
//!
//! Every item persisted in a partition is keyed by a 20-byte identifier: a
//! 4-byte big-endian seconds-since-epoch prefix followed by a 16-byte payload.
//! The prefix makes ids globally time-ordered; the payload makes them unique.
//!
//! Each partition seeds one [`ItemId`] with a random payload at construction
//! and advances it with [`ItemId::next`] for every item written. The counter
//! is only touched under the partition's write lock, so the key order of the
//! underlying engine coincides with creation order. A process restart reseeds
//! the payload, but the time prefix keeps later ids sorting after earlier
//! ones; no counter persistence is needed.

use std::fmt;

use chrono::{DateTime, Utc};
use snafu::Snafu;

/// Custom epoch: 2024-01-01 00:00:00 UTC (seconds since Unix epoch).
const EPOCH_SECS: i64 = 1_704_067_200;

/// Serialized length of an [`ItemId`] in bytes.
pub const ITEM_ID_LEN: usize = 20;

/// Length of the random payload portion.
const PAYLOAD_LEN: usize = 16;

/// Errors from identifier validation.
#[derive(Debug, Snafu)]
pub enum IdError {
    /// The byte slice is not exactly [`ITEM_ID_LEN`] bytes.
    #[snafu(display("expected {ITEM_ID_LEN} bytes, got {actual}"))]
    InvalidLength {
        /// Length of the rejected input.
        actual: usize,
    },
}

/// A 20-byte lexicographically sortable item identifier.
///
/// Ordering of the raw bytes equals ordering by creation time, which is what
/// the partition store relies on for its forward scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId([u8; ITEM_ID_LEN]);

impl ItemId {
    /// Creates a fresh identifier: the current time in the prefix and a
    /// random payload.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let secs = (now.timestamp() - EPOCH_SECS).clamp(0, i64::from(u32::MAX)) as u32;
        let payload: [u8; PAYLOAD_LEN] = rand::random();

        let mut bytes = [0u8; ITEM_ID_LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&payload);
        Self(bytes)
    }

    /// Returns the identifier that sorts immediately after this one.
    ///
    /// Increments the 160-bit value by one; a payload overflow carries into
    /// the time prefix, preserving strict monotonicity.
    #[must_use]
    pub fn next(&self) -> Self {
        let mut bytes = self.0;
        for b in bytes.iter_mut().rev() {
            let (v, overflow) = b.overflowing_add(1);
            *b = v;
            if !overflow {
                break;
            }
        }
        Self(bytes)
    }

    /// Validates and parses an identifier from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidLength`] unless the input is exactly
    /// [`ITEM_ID_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; ITEM_ID_LEN] =
            bytes.try_into().map_err(|_| IdError::InvalidLength { actual: bytes.len() })?;
        Ok(Self(arr))
    }

    /// Returns the raw 20 bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ITEM_ID_LEN] {
        &self.0
    }

    /// Returns the raw bytes as an owned vector, the form stored on items.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Returns the creation instant encoded in the prefix, at second
    /// granularity.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(EPOCH_SECS + i64::from(secs), 0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_id(&self.0))
    }
}

/// Renders arbitrary id bytes as lowercase hex for error messages and logs.
///
/// Accepts any length so that ill-formed caller input can still be quoted.
#[must_use]
pub fn display_id(id: &[u8]) -> String {
    let mut out = String::with_capacity(id.len() * 2);
    for b in id {
        use fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_generate_encodes_timestamp() {
        let id = ItemId::generate(fixed_now());
        assert_eq!(id.timestamp(), fixed_now());
    }

    #[test]
    fn test_next_is_strictly_increasing() {
        let mut id = ItemId::generate(fixed_now());
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let succ = id.next();
            assert!(succ > id, "next() must sort after its predecessor");
            assert!(seen.insert(succ), "ids must be unique");
            id = succ;
        }
    }

    #[test]
    fn test_payload_overflow_carries_into_timestamp() {
        let mut bytes = [0xFFu8; ITEM_ID_LEN];
        bytes[..4].copy_from_slice(&7u32.to_be_bytes());
        let id = ItemId::from_bytes(&bytes).unwrap();

        let succ = id.next();
        assert!(succ > id);
        assert_eq!(&succ.as_bytes()[..4], &8u32.to_be_bytes());
        assert_eq!(&succ.as_bytes()[4..], &[0u8; 16]);
    }

    #[test]
    fn test_later_generation_sorts_after_earlier() {
        let early = ItemId::generate(fixed_now());
        let late = ItemId::generate(fixed_now() + chrono::TimeDelta::seconds(2));
        assert!(late > early);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        let err = ItemId::from_bytes(b"not-a-sortable-id").unwrap_err();
        assert!(matches!(err, IdError::InvalidLength { actual: 17 }));

        let err = ItemId::from_bytes(&[]).unwrap_err();
        assert!(matches!(err, IdError::InvalidLength { actual: 0 }));
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let id = ItemId::generate(fixed_now());
        let parsed = ItemId::from_bytes(id.as_bytes()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_display_is_hex() {
        let id = ItemId::from_bytes(&[0xAB; ITEM_ID_LEN]).unwrap();
        assert_eq!(id.to_string(), "ab".repeat(ITEM_ID_LEN));
        assert_eq!(display_id(&[0x01, 0xFF]), "01ff");
    }
}
