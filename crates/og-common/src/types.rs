//! Core types for og
//!
//! This module defines the identifiers and descriptors passed between the
//! suppliers, the object population store and the load driver.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Operation kinds the generator can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// PUT a new object
    Write,
    /// PUT over an existing object
    Overwrite,
    /// GET an existing object
    Read,
    /// HEAD an existing object
    Metadata,
    /// DELETE an existing object
    Delete,
    /// GET on the container
    List,
    /// Multipart upload (initiate / part / complete / abort)
    MultipartWrite,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::Overwrite => "overwrite",
            Operation::Read => "read",
            Operation::Metadata => "metadata",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::MultipartWrite => "multipart_write",
        }
    }

    /// All operations, in summary display order
    pub const ALL: [Operation; 7] = [
        Operation::Write,
        Operation::Overwrite,
        Operation::Read,
        Operation::Metadata,
        Operation::Delete,
        Operation::List,
        Operation::MultipartWrite,
    ];

    /// Whether this operation selects an existing name from the population
    #[must_use]
    pub fn needs_existing_object(&self) -> bool {
        matches!(
            self,
            Operation::Overwrite | Operation::Read | Operation::Metadata | Operation::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object name: 16 lowercase hex characters on the wire, 8 raw bytes in
/// storage
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectName([u8; 8]);

impl ObjectName {
    /// Generate a fresh random name
    pub fn random() -> Self {
        let uuid = Uuid::new_v4();
        let bytes: [u8; 8] = uuid.as_bytes()[..8]
            .try_into()
            .expect("uuid has 16 bytes");
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Parse the 16-character hex form
    pub fn from_hex(s: &str) -> Option<Self> {
        let decoded = hex::decode(s).ok()?;
        let bytes: [u8; 8] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectName({})", hex::encode(self.0))
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Credentials attached to a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access key / username
    pub username: String,
    /// Secret key / password
    pub password: String,
    /// Keystone token, when authenticating against a Swift-style endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystone_token: Option<String>,
    /// Storage account, for accounts addressed in the URI path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_account_name: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            keystone_token: None,
            storage_account_name: None,
        }
    }
}

/// How request body bytes are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// No body
    None,
    /// All-zero bytes
    Zeroes,
    /// Seeded pseudo-random bytes
    Random,
    /// Bytes reproducing previously written content for this object
    Existing,
    /// Caller-provided bytes
    Custom,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::None => "none",
            DataType::Zeroes => "zeroes",
            DataType::Random => "random",
            DataType::Existing => "existing",
            DataType::Custom => "custom",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body descriptor
///
/// The descriptor is cheap to clone; actual bytes are materialized lazily by
/// the body sources in `og-supply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub data_type: DataType,
    /// Size in bytes
    pub size: u64,
    /// Seed for `Random` and `Existing` content
    pub seed: Option<u64>,
    /// Literal content for `Custom`
    pub content: Option<Bytes>,
}

impl Body {
    /// An empty body (size is always zero)
    pub fn none() -> Self {
        Self {
            data_type: DataType::None,
            size: 0,
            seed: None,
            content: None,
        }
    }

    pub fn zeroes(size: u64) -> Self {
        Self {
            data_type: DataType::Zeroes,
            size,
            seed: None,
            content: None,
        }
    }

    pub fn random(size: u64, seed: u64) -> Self {
        Self {
            data_type: DataType::Random,
            size,
            seed: Some(seed),
            content: None,
        }
    }

    /// Content regenerated from a previously written object's seed
    pub fn existing(size: u64, seed: u64) -> Self {
        Self {
            data_type: DataType::Existing,
            size,
            seed: Some(seed),
            content: None,
        }
    }

    pub fn custom(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            data_type: DataType::Custom,
            size: content.len() as u64,
            seed: None,
            content: Some(content),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_hex_roundtrip() {
        let name = ObjectName::random();
        let hex = name.to_string();
        assert_eq!(hex.len(), 16);
        assert_eq!(ObjectName::from_hex(&hex), Some(name));
    }

    #[test]
    fn test_object_name_rejects_bad_hex() {
        assert!(ObjectName::from_hex("not hex").is_none());
        assert!(ObjectName::from_hex("abcd").is_none());
    }

    #[test]
    fn test_body_none_is_empty() {
        let body = Body::none();
        assert_eq!(body.size, 0);
        assert!(body.is_empty());
    }

    #[test]
    fn test_body_custom_size_tracks_content() {
        let body = Body::custom(vec![1u8, 2, 3]);
        assert_eq!(body.size, 3);
        assert_eq!(body.data_type, DataType::Custom);
    }

    #[test]
    fn test_operation_existing_object() {
        assert!(Operation::Read.needs_existing_object());
        assert!(Operation::Delete.needs_existing_object());
        assert!(!Operation::Write.needs_existing_object());
        assert!(!Operation::MultipartWrite.needs_existing_object());
    }
}
