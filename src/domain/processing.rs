//! Idempotent processing requests and their results.

use serde::{Deserialize, Serialize};

use super::issue::Timestamp;
use crate::coordination::IdempotencyKey;

/// Body of an idempotent processing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub value: i64,
}

/// Outcome of processing, shared by every caller using the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedResult {
    /// The idempotency key the result was produced for.
    pub id: String,
    pub processed_value: i64,
    pub processed_at: Timestamp,
}

impl ProcessedResult {
    /// Builds the result for `request` under `key`.
    ///
    /// This is a pure function; the processing time is passed in.
    #[must_use]
    pub fn process(key: &IdempotencyKey, request: ProcessRequest, processed_at: Timestamp) -> Self {
        Self {
            id: key.to_string(),
            processed_value: request.value,
            processed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn process_copies_key_and_value() {
        let key = IdempotencyKey::parse("abc").unwrap();
        let now = Timestamp::now();

        let result = ProcessedResult::process(&key, ProcessRequest { value: 10 }, now);

        assert_eq!(result.id, "abc");
        assert_eq!(result.processed_value, 10);
        assert_eq!(result.processed_at, now);
    }

    #[rstest]
    fn serializes_with_camel_case_fields() {
        let key = IdempotencyKey::parse("abc").unwrap();
        let result = ProcessedResult::process(&key, ProcessRequest { value: 999 }, Timestamp::now());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["processedValue"], 999);
        assert!(json.get("processedAt").is_some());
    }
}
