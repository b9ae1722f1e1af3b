//! Cache status headers for idempotent responses.
//!
//! # Headers
//!
//! - `X-Cache`: `HIT` | `MISS`
//! - `X-Cache-Key`: the idempotency key the response belongs to
//!
//! `MISS` marks the request whose call ran the operation. Requests that
//! joined an in-flight execution or were served a completed entry get `HIT`.
//! Headers are only attached to successful responses.

use std::fmt;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::coordination::{ExecutionOrigin, IdempotencyKey};

/// `X-Cache` header name.
pub const X_CACHE: &str = "x-cache";

/// `X-Cache-Key` header name.
pub const X_CACHE_KEY: &str = "x-cache-key";

// =============================================================================
// Cache Status
// =============================================================================

/// Value of the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }

    #[must_use]
    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

impl From<ExecutionOrigin> for CacheStatus {
    fn from(origin: ExecutionOrigin) -> Self {
        if origin.is_hit() { Self::Hit } else { Self::Miss }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Builds the cache headers for a successful idempotent response.
///
/// `X-Cache-Key` is omitted if the key is not a valid header value.
#[must_use]
pub fn build_cache_headers(status: CacheStatus, key: &IdempotencyKey) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(X_CACHE), status.header_value());
    if let Ok(value) = HeaderValue::from_str(key.as_str()) {
        headers.insert(HeaderName::from_static(X_CACHE_KEY), value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ExecutionOrigin::Executed, CacheStatus::Miss)]
    #[case(ExecutionOrigin::Joined, CacheStatus::Hit)]
    #[case(ExecutionOrigin::Cached, CacheStatus::Hit)]
    fn origin_maps_to_status(#[case] origin: ExecutionOrigin, #[case] expected: CacheStatus) {
        assert_eq!(CacheStatus::from(origin), expected);
    }

    #[rstest]
    fn headers_carry_status_and_key() {
        let key = IdempotencyKey::parse("abc").unwrap();
        let headers = build_cache_headers(CacheStatus::Hit, &key);

        assert_eq!(headers.get("x-cache").unwrap(), "HIT");
        assert_eq!(headers.get("x-cache-key").unwrap(), "abc");
    }
}
