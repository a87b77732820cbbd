//! AWS Signature V2 signing
//!
//! Produces `Authorization: AWS <key>:<sig>` for outbound S3 API requests.
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/userguide/RESTAuthentication.html
//!
//! Known limitations, kept intentionally: path-style resources only, and
//! query parameters outside the recognized subresource set do not
//! participate in the canonical resource.

use crate::http_date;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use og_common::{ContextKey, Error, HttpRequest, Result};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

/// Subresources that participate in the canonical resource
const SUB_RESOURCES: &[&str] = &[
    "acl",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// AWS Signature V2 signer
#[derive(Debug, Default)]
pub struct SigV2Signer;

impl SigV2Signer {
    pub fn new() -> Self {
        Self
    }

    /// Sign an outbound request in place
    ///
    /// Credentials come from the request context; a `Date` header is added
    /// from the message time when none is present.
    pub fn sign(&self, request: &mut HttpRequest) -> Result<()> {
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

        if request.header("date").is_none() && request.header("x-amz-date").is_none() {
            let date = http_date(request.message_time_ms);
            request.add_header("Date", date);
        }

        let string_to_sign = build_string_to_sign(request);
        let signature = calculate_signature(&secret_key, &string_to_sign);
        request.set_header("Authorization", format!("AWS {access_key}:{signature}"));
        Ok(())
    }
}

/// Build the V2 string to sign
fn build_string_to_sign(request: &HttpRequest) -> String {
    let method = request.method.as_str();
    let content_md5 = request.header("content-md5").unwrap_or("");
    let content_type = request.header("content-type").unwrap_or("");

    // x-amz-date wins the date line when present.
    let date_line = request
        .header("x-amz-date")
        .or_else(|| request.header("date"))
        .unwrap_or("");

    format!(
        "{}\n{}\n{}\n{}\n{}{}",
        method,
        content_md5,
        content_type,
        date_line,
        canonicalized_amz_headers(request),
        canonicalized_resource(request),
    )
}

/// Canonicalized x-amz-* headers, sorted by lowercased key
///
/// `x-amz-date` is excluded; it already occupies the date line.
fn canonicalized_amz_headers(request: &HttpRequest) -> String {
    let mut amz_headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &request.headers {
        let name_lower = name.to_lowercase();
        if name_lower.starts_with("x-amz-") && name_lower != "x-amz-date" {
            amz_headers
                .entry(name_lower)
                .or_default()
                .push(value.trim().to_string());
        }
    }

    let mut result = String::new();
    for (name, values) in amz_headers {
        result.push_str(&name);
        result.push(':');
        result.push_str(&values.join(","));
        result.push('\n');
    }
    result
}

/// Path plus the recognized subresources, sorted by key
fn canonicalized_resource(request: &HttpRequest) -> String {
    let mut resource = request.uri.path().to_string();
    if resource.is_empty() {
        resource.push('/');
    }

    let Some(query) = request.uri.query() else {
        return resource;
    };

    let mut sub_resources: Vec<(&str, Option<&str>)> = Vec::new();
    for param in query.split('&') {
        let mut parts = param.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next();
        if SUB_RESOURCES.contains(&key) {
            sub_resources.push((key, value));
        }
    }
    if sub_resources.is_empty() {
        return resource;
    }

    sub_resources.sort_by(|a, b| a.0.cmp(b.0));
    let joined: Vec<String> = sub_resources
        .into_iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{k}={v}"),
            None => k.to_string(),
        })
        .collect();
    resource.push('?');
    resource.push_str(&joined.join("&"));
    resource
}

fn calculate_signature(secret_key: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
