//! og Auth - AWS request signing
//!
//! Produces the authentication headers for outbound requests: AWS Signature
//! Version 2 (`Authorization: AWS key:sig`) and Version 4
//! (`AWS4-HMAC-SHA256 ...` plus `x-amz-date` / `x-amz-content-sha256`),
//! with optional chunked payload signing for V4.
//!
//! Signing is path-style only; credentials are read from the request
//! context, where the request producers project them.

pub mod chunked;
pub mod sigv2;
pub mod sigv4;

// Re-exports
pub use chunked::{chunked_length, ChunkSigner};
pub use sigv2::SigV2Signer;
pub use sigv4::{PayloadMode, SigV4Signature, SigV4Signer};

use chrono::{TimeZone, Utc};

/// RFC 1123 Date header value for an epoch-millisecond timestamp
pub(crate) fn http_date(epoch_ms: u64) -> String {
    let dt = Utc
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_default();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// (`yyyymmddThhmmssZ`, `yyyymmdd`) for an epoch-millisecond timestamp
pub(crate) fn amz_date(epoch_ms: u64) -> (String, String) {
    let dt = Utc
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_default();
    (
        dt.format("%Y%m%dT%H%M%SZ").to_string(),
        dt.format("%Y%m%d").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_formats() {
        let ms = 1430419247000;
        assert_eq!(http_date(ms), "Thu, 30 Apr 2015 18:40:47 GMT");
        let (long, short) = amz_date(ms);
        assert_eq!(long, "20150430T184047Z");
        assert_eq!(short, "20150430");
    }
}
