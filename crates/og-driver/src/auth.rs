//! Request signing stage
//!
//! Applies the configured authentication scheme to each request on its way
//! to the client. Chunked SigV4 signing rewrites the body into the framed
//! form and fixes up `Content-Length` before the transport sees it.

use og_auth::{chunked_length, ChunkSigner, PayloadMode, SigV2Signer, SigV4Signer};
use og_common::config::{AuthConfig, AuthKind};
use og_common::{Body, HttpRequest, Result};
use og_supply::materialize;

/// The signing behavior wired into the driver
pub enum AuthMode {
    None,
    V2(SigV2Signer),
    V4 {
        signer: SigV4Signer,
        /// Frame and sign the body chunk by chunk
        chunked: bool,
        chunk_size: usize,
    },
}

impl AuthMode {
    pub fn from_config(config: &AuthConfig) -> Self {
        match config.kind {
            AuthKind::None => Self::None,
            AuthKind::AwsV2 => Self::V2(SigV2Signer::new()),
            AuthKind::AwsV4 => {
                let mode = if config.aws_chunked {
                    PayloadMode::Streaming
                } else if config.unsigned_payload {
                    PayloadMode::Unsigned
                } else {
                    PayloadMode::Signed
                };
                Self::V4 {
                    signer: SigV4Signer::new(&config.region, &config.service)
                        .with_payload_mode(mode),
                    chunked: config.aws_chunked,
                    chunk_size: config.chunk_size,
                }
            }
        }
    }

    /// Sign the request in place
    pub fn apply(&self, request: &mut HttpRequest) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::V2(signer) => signer.sign(request),
            Self::V4 {
                signer,
                chunked,
                chunk_size,
            } => {
                let signature = signer.sign(request)?;
                if *chunked && !request.body.is_empty() {
                    let wire_length = chunked_length(request.body.size, *chunk_size as u64);
                    let plain = materialize(&request.body);
                    let mut chunk_signer = ChunkSigner::new(&signature);
                    request.body = Body::custom(chunk_signer.frame_all(&plain, *chunk_size));
                    request.set_header("Content-Length", wire_length.to_string());
                }
                Ok(())
            }
        }
    }
}
