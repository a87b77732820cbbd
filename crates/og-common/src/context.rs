//! Per-request context
//!
//! Each request carries a mutable string-keyed map that context producers
//! write into and later pipeline stages read from. The recognized keys are a
//! closed enumeration; anything else passes through opaquely.

use std::collections::HashMap;
use std::fmt;

/// Recognized context keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    RequestId,
    ObjectName,
    ObjectSize,
    ContainerName,
    ContainerPrefix,
    ContainerSuffix,
    Username,
    Password,
    KeystoneToken,
    StorageAccountName,
    MultipartRequest,
    MultipartUploadId,
    MultipartPartNumber,
    MultipartPartSize,
    MultipartMaxParts,
    MultipartContainer,
    MultipartBodyDataType,
    ContentMd5,
    LegalHold,
    ObjectRetention,
    ResponseBodyConsumer,
}

impl ContextKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::RequestId => "x-og-request-id",
            ContextKey::ObjectName => "x-og-object-name",
            ContextKey::ObjectSize => "x-og-object-size",
            ContextKey::ContainerName => "x-og-container-name",
            ContextKey::ContainerPrefix => "x-og-container-prefix",
            ContextKey::ContainerSuffix => "x-og-container-suffix",
            ContextKey::Username => "x-og-username",
            ContextKey::Password => "x-og-password",
            ContextKey::KeystoneToken => "x-og-keystone-token",
            ContextKey::StorageAccountName => "x-og-storage-account-name",
            ContextKey::MultipartRequest => "x-og-multipart-request",
            ContextKey::MultipartUploadId => "x-og-multipart-upload-id",
            ContextKey::MultipartPartNumber => "x-og-multipart-part-number",
            ContextKey::MultipartPartSize => "x-og-multipart-part-size",
            ContextKey::MultipartMaxParts => "x-og-multipart-max-parts",
            ContextKey::MultipartContainer => "x-og-multipart-container",
            ContextKey::MultipartBodyDataType => "x-og-multipart-body-data-type",
            ContextKey::ContentMd5 => "x-og-content-md5",
            ContextKey::LegalHold => "x-og-legal-hold",
            ContextKey::ObjectRetention => "x-og-object-retention",
            ContextKey::ResponseBodyConsumer => "x-og-response-body-consumer",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request mutable metadata map
///
/// Never shared between requests; cloned into the response so listeners can
/// observe what the producers recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    entries: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: ContextKey, value: impl Into<String>) {
        self.entries.insert(key.as_str().to_string(), value.into());
    }

    /// Insert an unrecognized key as-is
    pub fn set_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: ContextKey) -> Option<&str> {
        self.entries.get(key.as_str()).map(String::as_str)
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Typed read of a numeric value
    pub fn get_u64(&self, key: ContextKey) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn contains(&self, key: ContextKey) -> bool {
        self.entries.contains_key(key.as_str())
    }

    pub fn remove(&mut self, key: ContextKey) -> Option<String> {
        self.entries.remove(key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
