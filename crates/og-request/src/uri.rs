//! Request URI assembly
//!
//! URIs follow
//! `scheme://[container.]host[:port]/[uri_root/][api_version/][storage_account/][container][/object][?k=v&…]`.
//! Virtual-host style moves the container into the host and omits it from
//! the path. Query parameters keep their insertion order; a parameter
//! without a value renders as a bare key.

use http::Uri;
use og_common::config::TargetConfig;
use og_common::{Error, Result};

/// A query parameter: bare keys carry no value
pub type QueryParam = (String, Option<String>);

/// Builds request URIs from the target configuration
#[derive(Debug, Clone)]
pub struct UriBuilder {
    scheme: String,
    host: String,
    port: Option<u16>,
    uri_root: Option<String>,
    api_version: Option<String>,
    virtual_host: bool,
}

impl UriBuilder {
    pub fn new(target: &TargetConfig) -> Self {
        Self {
            scheme: target.scheme.clone(),
            host: target.host.clone(),
            port: target.port,
            uri_root: target.uri_root.clone(),
            api_version: target.api_version.clone(),
            virtual_host: target.virtual_host,
        }
    }

    /// Assemble a URI for the given addressing components
    pub fn build(
        &self,
        storage_account: Option<&str>,
        container: Option<&str>,
        object: Option<&str>,
        query: &[QueryParam],
    ) -> Result<Uri> {
        let mut authority = String::new();
        if self.virtual_host {
            if let Some(container) = container {
                authority.push_str(container);
                authority.push('.');
            }
        }
        authority.push_str(&self.host);
        if let Some(port) = self.port {
            authority.push(':');
            authority.push_str(&port.to_string());
        }

        let mut path = String::from("/");
        for segment in [
            self.uri_root.as_deref(),
            self.api_version.as_deref(),
            storage_account,
        ]
        .into_iter()
        .flatten()
        {
            path.push_str(segment);
            path.push('/');
        }
        if !self.virtual_host {
            if let Some(container) = container {
                path.push_str(container);
                if object.is_some() {
                    path.push('/');
                }
            }
        }
        if let Some(object) = object {
            path.push_str(object);
        }

        let mut uri = format!("{}://{}{}", self.scheme, authority, path);
        if !query.is_empty() {
            uri.push('?');
            for (i, (key, value)) in query.iter().enumerate() {
                if i > 0 {
                    uri.push('&');
                }
                uri.push_str(key);
                if let Some(value) = value {
                    uri.push('=');
                    uri.push_str(value);
                }
            }
        }

        uri.parse::<Uri>()
            .map_err(|e| Error::internal(format!("assembled invalid URI {uri}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> UriBuilder {
        UriBuilder::new(&TargetConfig {
            scheme: "http".into(),
            host: "127.0.0.1".into(),
            port: Some(8080),
            uri_root: None,
            api_version: None,
            container: "bucket".into(),
            virtual_host: false,
        })
    }

    #[test]
    fn test_path_style_object_uri() {
        let uri = builder()
            .build(None, Some("bucket"), Some("obj"), &[])
            .unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:8080/bucket/obj");
    }

    #[test]
    fn test_container_only_uri() {
        let uri = builder().build(None, Some("bucket"), None, &[]).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:8080/bucket");
    }

    #[test]
    fn test_virtual_host_moves_container() {
        let mut b = builder();
        b.virtual_host = true;
        let uri = b.build(None, Some("bucket"), Some("obj"), &[]).unwrap();
        assert_eq!(uri.to_string(), "http://bucket.127.0.0.1:8080/obj");
    }

    #[test]
    fn test_prefix_segments_in_order() {
        let mut b = builder();
        b.uri_root = Some("root".into());
        b.api_version = Some("v1".into());
        let uri = b
            .build(Some("account"), Some("bucket"), Some("obj"), &[])
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "http://127.0.0.1:8080/root/v1/account/bucket/obj"
        );
    }

    #[test]
    fn test_query_order_and_bare_keys() {
        let uri = builder()
            .build(
                None,
                Some("bucket"),
                Some("obj"),
                &[
                    ("partNumber".into(), Some("3".into())),
                    ("uploadId".into(), Some("u1".into())),
                ],
            )
            .unwrap();
        assert_eq!(uri.query(), Some("partNumber=3&uploadId=u1"));

        let uri = builder()
            .build(None, Some("bucket"), Some("obj"), &[("uploads".into(), None)])
            .unwrap();
        assert_eq!(uri.query(), Some("uploads"));
    }

    #[test]
    fn test_round_trip_recovers_components() {
        let mut b = builder();
        b.uri_root = Some("root".into());
        let uri = b.build(None, Some("bucket"), Some("obj"), &[]).unwrap();
        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.host(), Some("127.0.0.1"));
        assert_eq!(uri.port_u16(), Some(8080));
        assert_eq!(uri.path(), "/root/bucket/obj");
    }
}
