//! Idempotency keys.
//!
//! An [`IdempotencyKey`] identifies one logical operation attempt-set. Keys
//! are opaque to the coordinator: the only requirements are that they are
//! present, not blank, bounded in length and free of control characters.

use std::fmt;

use super::error::IdempotencyError;

/// Maximum accepted key length in bytes.
pub const MAX_KEY_LENGTH: usize = 255;

/// A validated, caller-supplied idempotency key.
///
/// Construction goes through [`IdempotencyKey::parse`], so holding an
/// `IdempotencyKey` means the key has already passed validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validates a raw key.
    ///
    /// Surrounding whitespace is trimmed before validation.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError::InvalidKey`] if the key is empty after
    /// trimming, longer than [`MAX_KEY_LENGTH`] bytes, or contains control
    /// characters.
    pub fn parse(raw: &str) -> Result<Self, IdempotencyError> {
        let key = raw.trim();

        if key.is_empty() {
            return Err(IdempotencyError::InvalidKey(
                "idempotency key must not be empty".to_string(),
            ));
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(IdempotencyError::InvalidKey(format!(
                "idempotency key must not exceed {MAX_KEY_LENGTH} bytes"
            )));
        }

        if key.chars().any(char::is_control) {
            return Err(IdempotencyError::InvalidKey(
                "idempotency key must not contain control characters".to_string(),
            ));
        }

        Ok(Self(key.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc")]
    #[case("  padded-key  ")]
    #[case("6f1d1c2e-58a4-4f38-9d0b-2d6d8b0b6a11")]
    fn parse_accepts_well_formed_keys(#[case] raw: &str) {
        let key = IdempotencyKey::parse(raw).unwrap();
        assert_eq!(key.as_str(), raw.trim());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    #[case("line\nbreak")]
    fn parse_rejects_malformed_keys(#[case] raw: &str) {
        let result = IdempotencyKey::parse(raw);
        assert!(matches!(result, Err(IdempotencyError::InvalidKey(_))));
    }

    #[rstest]
    fn parse_rejects_over_long_keys() {
        let raw = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(IdempotencyKey::parse(&raw).is_err());

        let raw = "k".repeat(MAX_KEY_LENGTH);
        assert!(IdempotencyKey::parse(&raw).is_ok());
    }

    #[rstest]
    fn display_renders_the_trimmed_key() {
        let key = IdempotencyKey::parse(" abc ").unwrap();
        assert_eq!(key.to_string(), "abc");
    }

    proptest! {
        #[test]
        fn printable_keys_round_trip(raw in "[a-zA-Z0-9_-]{1,64}") {
            let key = IdempotencyKey::parse(&raw).unwrap();
            prop_assert_eq!(key.as_str(), raw.as_str());
        }

        #[test]
        fn whitespace_only_keys_are_rejected(raw in "[ \t]{0,16}") {
            prop_assert!(IdempotencyKey::parse(&raw).is_err());
        }
    }
}
