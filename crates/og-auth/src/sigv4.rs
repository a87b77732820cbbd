//! AWS Signature V4 signing
//!
//! Produces the `Authorization`, `x-amz-date` and `x-amz-content-sha256`
//! headers for outbound S3 API requests.
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-authenticating-requests.html

use crate::{amz_date, http_date};
use hmac::{Hmac, Mac};
use og_common::{ContextKey, Error, HttpRequest, Result};
use og_supply::materialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Literal payload hash used with chunked signing
pub const STREAMING_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";

/// Literal payload hash used when the payload is not signed
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// How the request payload enters the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// SHA-256 of the body bytes
    #[default]
    Signed,
    /// `UNSIGNED-PAYLOAD`
    Unsigned,
    /// `STREAMING-AWS4-HMAC-SHA256-PAYLOAD`; the body is framed and signed
    /// chunk by chunk
    Streaming,
}

/// The signature and scope material produced by a signing pass
///
/// Chunked signing needs the seed signature and the signing key to chain
/// chunk signatures off the request signature.
#[derive(Debug, Clone)]
pub struct SigV4Signature {
    pub signature: String,
    pub signing_key: Vec<u8>,
    pub amz_date: String,
    pub credential_scope: String,
}

/// AWS Signature V4 signer
#[derive(Debug)]
pub struct SigV4Signer {
    /// AWS region (e.g., "us-east-1")
    region: String,
    /// Service name (usually "s3")
    service: String,
    payload_mode: PayloadMode,
}

impl SigV4Signer {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
            payload_mode: PayloadMode::Signed,
        }
    }

    pub fn with_payload_mode(mut self, mode: PayloadMode) -> Self {
        self.payload_mode = mode;
        self
    }

    pub fn payload_mode(&self) -> PayloadMode {
        self.payload_mode
    }

    /// Sign an outbound request in place
    ///
    /// Credentials come from the request context. `Host` and `Date` headers
    /// are added when absent; every header present at signing time except
    /// `Authorization` is signed.
    pub fn sign(&self, request: &mut HttpRequest) -> Result<SigV4Signature> {
        let access_key = request
            .context
            .get(ContextKey::Username)
            .ok_or_else(|| Error::configuration("request context missing username"))?
            .to_string();
        let secret_key = request
            .context
            .get(ContextKey::Password)
            .ok_or_else(|| Error::configuration("request context missing password"))?
            .to_string();

        let (amz_date_str, date_stamp) = amz_date(request.message_time_ms);

        if request.header("host").is_none() {
            let authority = request
                .uri
                .authority()
                .ok_or_else(|| Error::internal("request URI has no authority"))?
                .to_string();
            request.add_header("Host", authority);
        }
        if request.header("date").is_none() {
            let date = http_date(request.message_time_ms);
            request.add_header("Date", date);
        }

        let payload_hash = match self.payload_mode {
            PayloadMode::Signed => hex_sha256(&materialize(&request.body)),
            PayloadMode::Unsigned => UNSIGNED_PAYLOAD.to_string(),
            PayloadMode::Streaming => STREAMING_PAYLOAD.to_string(),
        };
        request.set_header("x-amz-date", amz_date_str.clone());
        request.set_header("x-amz-content-sha256", payload_hash.clone());

        let (canonical_request, signed_headers) = build_canonical_request(request, &payload_hash);
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date_str,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&secret_key, &date_stamp, &self.region, &self.service);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        request.set_header(
            "Authorization",
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                access_key, credential_scope, signed_headers, signature
            ),
        );

        Ok(SigV4Signature {
            signature,
            signing_key,
            amz_date: amz_date_str,
            credential_scope,
        })
    }
}

/// Build the canonical request and the signed-headers list
fn build_canonical_request(request: &HttpRequest, payload_hash: &str) -> (String, String) {
    // Canonical headers: lowercase keys, trimmed values, sorted; duplicate
    // keys collapse into one comma-joined line.
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &request.headers {
        let name_lower = name.to_lowercase();
        if name_lower == "authorization" {
            continue;
        }
        headers
            .entry(name_lower)
            .or_default()
            .push(value.trim().to_string());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.join(",")))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_uri = uri_encode_path(request.uri.path());
    let canonical_query = canonical_query_string(request.uri.query().unwrap_or(""));

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.as_str(),
        canonical_uri,
        canonical_query,
        canonical_headers,
        signed_headers,
        payload_hash
    );
    (canonical_request, signed_headers)
}

/// Canonical query string: URI-encoded pairs sorted by key
fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|param| {
            let mut parts = param.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            (uri_encode(key, true), uri_encode(value, true))
        })
        .collect();
    params.sort();
    params
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// AWS-style URI encoding of a path, preserving `/`
fn uri_encode_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    uri_encode(path, false)
}

/// AWS-style URI encoding
///
/// Unreserved characters pass through; everything else is percent-encoded,
/// including `/` when `encode_slash` is set.
fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            b'/' if !encode_slash => result.push('/'),
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}

/// Derive the signing key
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Uri};
    use og_common::{Body, Operation};

    fn example_request() -> HttpRequest {
        let mut request = HttpRequest::new(
            Method::PUT,
            Uri::from_static("http://127.0.0.1:8080/container/object"),
            Operation::Write,
            1430419247000,
        );
        request.body = Body::zeroes(35);
        request.context.set(ContextKey::Username, "AKIDEXAMPLE");
        request.context.set(
            ContextKey::Password,
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        );
        request
    }

    #[test]
    fn test_known_signature() {
        let mut request = example_request();
        SigV4Signer::new("dsnet", "s3").sign(&mut request).unwrap();

        assert_eq!(request.header("x-amz-date"), Some("20150430T184047Z"));
        assert_eq!(
            request.header("x-amz-content-sha256"),
            Some("0d5535e13cc9708d0ff0289af2fae27e564b6bcbcd9242f5140d96957744a517")
        );
        assert_eq!(
            request.header("authorization"),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150430/dsnet/s3/aws4_request, \
                 SignedHeaders=date;host;x-amz-content-sha256;x-amz-date, \
                 Signature=32e574543e02fb2f975dce2af9ec6c2ddea845ce023fa56b18b70574a5e42986"
            )
        );
    }

    #[test]
    fn test_equal_bodies_share_payload_hash() {
        let signer = SigV4Signer::new("dsnet", "s3");
        let mut first = example_request();
        let mut second = example_request();
        second.body = Body::zeroes(35);
        signer.sign(&mut first).unwrap();
        signer.sign(&mut second).unwrap();
        assert_eq!(
            first.header("x-amz-content-sha256"),
            second.header("x-amz-content-sha256")
        );
    }

    #[test]
    fn test_date_changes_signature_not_signed_headers() {
        let signer = SigV4Signer::new("dsnet", "s3");
        let mut first = example_request();
        let mut second = example_request();
        second.message_time_ms += 1000;
        let sig_a = signer.sign(&mut first).unwrap();
        let sig_b = signer.sign(&mut second).unwrap();
        assert_ne!(sig_a.signature, sig_b.signature);

        let signed = |req: &HttpRequest| {
            req.header("authorization")
                .and_then(|a| a.split("SignedHeaders=").nth(1))
                .and_then(|rest| rest.split(',').next())
                .map(str::to_string)
        };
        assert_eq!(signed(&first), signed(&second));
    }

    #[test]
    fn test_streaming_mode_sets_literal_hash() {
        let mut request = example_request();
        SigV4Signer::new("dsnet", "s3")
            .with_payload_mode(PayloadMode::Streaming)
            .sign(&mut request)
            .unwrap();
        assert_eq!(
            request.header("x-amz-content-sha256"),
            Some(STREAMING_PAYLOAD)
        );
    }

    #[test]
    fn test_unsigned_mode_sets_literal_hash() {
        let mut request = example_request();
        SigV4Signer::new("dsnet", "s3")
            .with_payload_mode(PayloadMode::Unsigned)
            .sign(&mut request)
            .unwrap();
        assert_eq!(
            request.header("x-amz-content-sha256"),
            Some(UNSIGNED_PAYLOAD)
        );
    }

    #[test]
    fn test_canonical_query_sorted_with_bare_keys() {
        assert_eq!(
            canonical_query_string("uploadId=u&partNumber=3"),
            "partNumber=3&uploadId=u"
        );
        assert_eq!(canonical_query_string("uploads"), "uploads=");
        assert_eq!(canonical_query_string(""), "");
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("hello", true), "hello");
        assert_eq!(uri_encode("a b", true), "a%20b");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
        assert_eq!(uri_encode_path("/c/o"), "/c/o");
    }

    #[test]
    fn test_derive_signing_key_length() {
        let key = derive_signing_key("secret", "20150430", "dsnet", "s3");
        assert_eq!(key.len(), 32);
    }
}
