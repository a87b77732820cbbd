//! Event dispatch
//!
//! Every completed exchange flows through one dispatcher as a
//! request/response pair. Listeners are registered in the driver's wiring
//! and invoked in registration order; the dispatch task feeds events in
//! publication order. A listener failure aborts the test.

use async_trait::async_trait;
use og_common::{Error, HttpRequest, HttpResponse, Result};
use std::sync::Arc;
use std::time::Duration;

/// A completed request/response exchange
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request: HttpRequest,
    pub response: HttpResponse,
    /// Wall time between submission and response completion
    pub latency: Duration,
}

/// Observes completed exchanges
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &RequestEvent) -> Result<()>;
}

/// Invokes listeners in registration order
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Deliver one event to every listener
    ///
    /// The first listener error wins and is surfaced as fatal.
    pub async fn publish(&self, event: &RequestEvent) -> Result<()> {
        for listener in &self.listeners {
            listener
                .on_event(event)
                .await
                .map_err(|e| Error::Listener(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, Uri};
    use og_common::Operation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> RequestEvent {
        let request = HttpRequest::new(
            Method::GET,
            Uri::from_static("http://localhost/c/o"),
            Operation::Read,
            0,
        );
        let response = HttpResponse {
            status_code: 200,
            headers: Vec::new(),
            body: Bytes::new(),
            body_len: 0,
            context: request.context.clone(),
        };
        RequestEvent {
            request,
            response,
            latency: Duration::from_millis(1),
        }
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl EventListener for Counter {
        async fn on_event(&self, _event: &RequestEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventListener for Failing {
        async fn on_event(&self, _event: &RequestEvent) -> Result<()> {
            Err(Error::internal("listener exploded"))
        }
    }

    #[tokio::test]
    async fn test_all_listeners_see_the_event() {
        let first = Arc::new(Counter(AtomicUsize::new(0)));
        let second = Arc::new(Counter(AtomicUsize::new(0)));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(first.clone());
        dispatcher.subscribe(second.clone());

        dispatcher.publish(&event()).await.unwrap();
        assert_eq!(first.0.load(Ordering::Relaxed), 1);
        assert_eq!(second.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_listener_failure_is_fatal() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Arc::new(Failing));
        let err = dispatcher.publish(&event()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
