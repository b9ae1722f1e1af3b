//! Opaque version stamps and versioned records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An opaque row-stamp assigned by the store on every successful write.
///
/// The optimistic guard only ever compares tokens for equality; the byte
/// layout belongs to the store that issued them. Tokens render as 16
/// lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionToken([u8; 8]);

impl VersionToken {
    /// Creates a token from raw stamp bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(formatter, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Error returned when a string is not a valid version token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version token '{0}': expected 16 hex characters")]
pub struct ParseVersionTokenError(String);

impl FromStr for VersionToken {
    type Err = ParseVersionTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 16 || !value.is_ascii() {
            return Err(ParseVersionTokenError(value.to_string()));
        }

        let mut bytes = [0u8; 8];
        for (index, byte) in bytes.iter_mut().enumerate() {
            let pair = &value[index * 2..index * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| ParseVersionTokenError(value.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for VersionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A stored entity together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord<I, P> {
    /// Unique identifier of the entity.
    pub id: I,
    /// Mutable business fields.
    pub payload: P,
    /// Version current at the time the record was read or written.
    pub version: VersionToken,
}

impl<I, P> VersionedRecord<I, P> {
    #[must_use]
    pub const fn new(id: I, payload: P, version: VersionToken) -> Self {
        Self {
            id,
            payload,
            version,
        }
    }
}
