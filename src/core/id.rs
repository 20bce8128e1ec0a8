// src/core/id.rs

//! Object identifiers and the validator every storage entry point runs
//! externally supplied ids through.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::core::error::{Error, Result};

/// Length of the canonical hex form of an [`ObjectId`].
pub const OBJECT_ID_HEX_LEN: usize = 24;

// Five bytes fixed for the lifetime of the process, plus a counter seeded at
// random. Together with the timestamp they keep generated ids unique.
static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| {
    let seed = Uuid::new_v4().into_bytes();
    [seed[0], seed[1], seed[2], seed[3], seed[4]]
});

static COUNTER: Lazy<AtomicU32> = Lazy::new(|| {
    let seed = Uuid::new_v4().into_bytes();
    AtomicU32::new(u32::from_be_bytes([0, seed[5], seed[6], seed[7]]))
});

/// A 12-byte identifier, written as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a fresh id: 4 bytes of seconds since the epoch, 5 process
    /// bytes and a 3 byte counter.
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the 24-character hex form. Uppercase digits are accepted; the
    /// value always prints back in lowercase.
    pub fn parse_str(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidIdentifier("empty object id given".to_string()));
        }
        if raw.len() != OBJECT_ID_HEX_LEN {
            return Err(Error::InvalidIdentifier(format!(
                "'{raw}' is not a {OBJECT_ID_HEX_LEN}-character hex object id"
            )));
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(raw, &mut bytes).map_err(|_| {
            Error::InvalidIdentifier(format!("'{raw}' contains non-hex characters"))
        })?;
        Ok(Self(bytes))
    }

    pub fn is_valid(raw: &str) -> bool {
        Self::parse_str(raw).is_ok()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Anything a caller may hand us as a target or finding identifier.
pub trait IntoObjectId {
    fn into_object_id(self) -> Result<ObjectId>;
}

impl IntoObjectId for ObjectId {
    fn into_object_id(self) -> Result<ObjectId> {
        Ok(self)
    }
}

impl IntoObjectId for &ObjectId {
    fn into_object_id(self) -> Result<ObjectId> {
        Ok(*self)
    }
}

impl IntoObjectId for &str {
    fn into_object_id(self) -> Result<ObjectId> {
        ObjectId::parse_str(self)
    }
}

impl IntoObjectId for String {
    fn into_object_id(self) -> Result<ObjectId> {
        ObjectId::parse_str(&self)
    }
}

impl IntoObjectId for &String {
    fn into_object_id(self) -> Result<ObjectId> {
        ObjectId::parse_str(self)
    }
}

impl<T: IntoObjectId> IntoObjectId for Option<T> {
    fn into_object_id(self) -> Result<ObjectId> {
        match self {
            Some(raw) => raw.into_object_id(),
            None => Err(Error::InvalidIdentifier("no object id given".to_string())),
        }
    }
}

/// Validates an externally supplied identifier and returns its canonical form.
///
/// Canonical ids pass through untouched; strings are parsed; an absent value,
/// an empty string or anything that is not 24 hex characters fails with
/// [`Error::InvalidIdentifier`].
pub fn validate_and_normalize<I: IntoObjectId>(raw: I) -> Result<ObjectId> {
    raw.into_object_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn test_accepts_canonical_hex() {
        let id = validate_and_normalize(SAMPLE).unwrap();
        assert_eq!(id.to_hex(), SAMPLE);
        assert_eq!(id.to_string(), SAMPLE);
    }

    #[test]
    fn test_rejects_malformed_strings() {
        let bad = [
            "",
            "507f1f77bcf86cd79943901",
            "507f1f77bcf86cd7994390111",
            "507f1f77bcf86cd79943901g",
            " 507f1f77bcf86cd799439011",
            "not-an-object-id-at-all!",
            "zzzzzzzzzzzzzzzzzzzzzzzz",
        ];
        for raw in bad {
            assert!(
                matches!(validate_and_normalize(raw), Err(Error::InvalidIdentifier(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_absent_value() {
        let absent: Option<&str> = None;
        assert!(matches!(
            validate_and_normalize(absent),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_is_idempotent() {
        let once = validate_and_normalize(SAMPLE).unwrap();
        let twice = validate_and_normalize(once).unwrap();
        let from_text = validate_and_normalize(once.to_hex()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, from_text);
    }

    #[test]
    fn test_uppercase_is_normalized() {
        let id = validate_and_normalize("507F1F77BCF86CD799439011").unwrap();
        assert_eq!(id.to_hex(), SAMPLE);
    }

    #[test]
    fn test_generated_ids_are_distinct_and_valid() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(ObjectId::is_valid(&a.to_hex()));
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let id = ObjectId::parse_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
