//! HTTP request and response records
//!
//! The generator's own view of a request: a method, a URI, a case-sensitive
//! ordered header list, a lazy body descriptor and the per-request context.
//! The transport adapter translates this into whatever the HTTP client
//! needs; the signers add headers before the request is handed over.

use crate::context::{Context, ContextKey};
use crate::types::{Body, Operation};
use bytes::Bytes;
use http::{Method, Uri};

/// An outbound request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Uri,
    /// Case-sensitive, insertion-ordered headers
    pub headers: Vec<(String, String)>,
    pub body: Body,
    /// Request creation time, epoch milliseconds
    pub message_time_ms: u64,
    pub operation: Operation,
    pub context: Context,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri, operation: Operation, message_time_ms: u64) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: Body::none(),
            message_time_ms,
            operation,
            context: Context::new(),
        }
    }

    /// First header value matching `name` case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append a header, keeping insertion order
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replace a header in place, or append when absent
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            entry.1 = value.into();
        } else {
            self.headers.push((name.to_string(), value.into()));
        }
    }

    /// The request id stamped by the producer
    pub fn request_id(&self) -> Option<&str> {
        self.context.get(ContextKey::RequestId)
    }
}

/// An observed response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    /// Consumed body bytes; empty unless the request asked for the body to
    /// be retained (multipart initiate responses do)
    pub body: Bytes,
    /// Total body bytes consumed off the wire
    pub body_len: u64,
    /// Context echoed from the request, including the request id
    pub context: Context,
}

impl HttpResponse {
    /// First header value matching `name` case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is in the 2xx class
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context.get(ContextKey::RequestId)
    }
}
