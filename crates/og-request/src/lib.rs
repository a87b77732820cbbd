//! og Request - Request production
//!
//! Turns the declarative workload description into a stream of individual
//! HTTP requests: single-step object operations and multi-step multipart
//! upload sessions, combined by a weighted mix.

pub mod mix;
pub mod multipart;
pub mod single;
pub mod uri;

// Re-exports
pub use mix::MixSupplier;
pub use multipart::MultipartSupplier;
pub use single::SingleRequestSupplier;
pub use uri::UriBuilder;

use async_trait::async_trait;
use og_common::{HttpRequest, Result};

/// A source of outbound requests
///
/// `get` may suspend (the multipart supplier waits for a session to become
/// actionable); `stop` makes any waiting or future `get` return
/// `Error::Stopped`.
#[async_trait]
pub trait RequestSupplier: Send + Sync {
    async fn get(&self) -> Result<HttpRequest>;

    fn stop(&self) {}
}

/// Current epoch time in milliseconds
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
