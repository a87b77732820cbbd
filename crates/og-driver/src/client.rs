//! HTTP client interface
//!
//! The driver consumes the transport through this narrow seam; connection
//! pooling, timeouts and TLS live inside the reqwest implementation. Tests
//! substitute an in-process client.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use og_common::config::ClientConfig;
use og_common::{ContextKey, Error, HttpRequest, HttpResponse, Result};
use og_supply::{materialize, BodyReader, ThrottledReader};
use std::io::Read;
use std::time::Duration;

/// Executes one request and yields its response
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed client
pub struct ReqwestClient {
    client: reqwest::Client,
    write_throttle_bps: Option<u64>,
}

impl ReqwestClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.concurrency)
            .build()
            .map_err(|e| Error::configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            write_throttle_bps: config.write_throttle_bps,
        })
    }

    fn outbound_body(&self, request: &HttpRequest) -> reqwest::Body {
        match self.write_throttle_bps {
            // Throttled bodies stream so the token bucket paces the wire.
            Some(rate) => {
                let reader = ThrottledReader::new(BodyReader::new(request.body.clone()), rate);
                reqwest::Body::wrap_stream(read_stream(reader))
            }
            None => reqwest::Body::from(materialize(&request.body)),
        }
    }
}

/// Bridge a blocking reader into a byte stream, one chunk per blocking read
fn read_stream<R>(reader: R) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send
where
    R: Read + Send + 'static,
{
    futures::stream::try_unfold(reader, |mut reader| async move {
        let (chunk, reader) = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; 64 * 1024];
            match reader.read(&mut buf) {
                Ok(0) => Ok((None, reader)),
                Ok(n) => {
                    buf.truncate(n);
                    Ok((Some(Bytes::from(buf)), reader))
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(chunk.map(|chunk| (chunk, reader)))
    })
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.uri.to_string());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(self.outbound_body(request));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::transient(e.to_string()))?;

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        // Drain the body; retain it only when the request asked for it.
        let retain = request.context.contains(ContextKey::ResponseBodyConsumer);
        let mut body_len = 0u64;
        let mut retained = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| Error::transient(e.to_string()))?
        {
            body_len += chunk.len() as u64;
            if retain {
                retained.extend_from_slice(&chunk);
            }
        }

        Ok(HttpResponse {
            status_code,
            headers,
            body: Bytes::from(retained),
            body_len,
            context: request.context.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use og_common::Body;

    #[tokio::test]
    async fn test_read_stream_yields_whole_body() {
        let reader = BodyReader::new(Body::zeroes(200_000));
        let chunks: Vec<_> = read_stream(reader).collect().await;
        let total: usize = chunks.iter().map(|c| c.as_ref().unwrap().len()).sum();
        assert_eq!(total, 200_000);
    }
}
