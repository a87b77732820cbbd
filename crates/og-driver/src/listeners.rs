//! Built-in event listeners
//!
//! Wired by the driver: the population store learns about completed writes
//! and deletes, the multipart supplier advances its sessions, and the
//! statistics counters tick.

use crate::events::{EventListener, RequestEvent};
use crate::stats::Statistics;
use async_trait::async_trait;
use og_common::{ContextKey, ObjectName, Operation, Result};
use og_request::multipart::{phase, MultipartSupplier};
use og_store::{ObjectRecord, ObjectStore};
use std::sync::Arc;
use tracing::warn;

/// Keeps the object population in step with observed responses
pub struct StoreListener {
    store: Arc<ObjectStore>,
}

impl StoreListener {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventListener for StoreListener {
    async fn on_event(&self, event: &RequestEvent) -> Result<()> {
        let ctx = &event.response.context;
        let Some(name) = ctx.get(ContextKey::ObjectName).and_then(ObjectName::from_hex) else {
            return Ok(());
        };
        let success = event.response.is_success();

        match event.request.operation {
            Operation::Write => {
                if success {
                    let size = ctx.get_u64(ContextKey::ObjectSize).unwrap_or(0);
                    self.store.add(ObjectRecord::new(name, 1, size))?;
                }
            }
            Operation::Overwrite | Operation::Read | Operation::Metadata => {
                self.store.release_read(name);
            }
            Operation::Delete => {
                self.store.release_delete(name, success)?;
            }
            Operation::MultipartWrite => {
                // Only a successful COMPLETE makes the object selectable.
                if success && ctx.get(ContextKey::MultipartRequest) == Some(phase::COMPLETE) {
                    let size = ctx.get_u64(ContextKey::ObjectSize).unwrap_or(0);
                    self.store.add(ObjectRecord::new(name, 1, size))?;
                }
            }
            Operation::List => {}
        }
        Ok(())
    }
}

/// Advances multipart sessions from their responses
pub struct MultipartListener {
    supplier: Arc<MultipartSupplier>,
}

impl MultipartListener {
    pub fn new(supplier: Arc<MultipartSupplier>) -> Self {
        Self { supplier }
    }
}

#[async_trait]
impl EventListener for MultipartListener {
    async fn on_event(&self, event: &RequestEvent) -> Result<()> {
        self.supplier.handle_response(&event.response).await
    }
}

/// Ticks the shared counters
pub struct StatsListener {
    stats: Arc<Statistics>,
}

impl StatsListener {
    pub fn new(stats: Arc<Statistics>) -> Self {
        Self { stats }
    }
}

#[async_trait]
impl EventListener for StatsListener {
    async fn on_event(&self, event: &RequestEvent) -> Result<()> {
        let latency_us = event.latency.as_micros() as u64;
        if event.response.status_code == 0 {
            warn!(
                operation = %event.request.operation,
                request_id = event.request.request_id().unwrap_or(""),
                "request failed without a response"
            );
        }
        self.stats.record(
            event.request.operation,
            event.response.status_code,
            event.request.body.size,
            event.response.body_len,
            latency_us,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, Uri};
    use og_common::{Context, HttpRequest, HttpResponse};
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(operation: Operation, status: u16, ctx: Context) -> RequestEvent {
        let mut request = HttpRequest::new(
            Method::PUT,
            Uri::from_static("http://localhost/bucket/obj"),
            operation,
            0,
        );
        request.context = ctx.clone();
        let response = HttpResponse {
            status_code: status,
            headers: Vec::new(),
            body: Bytes::new(),
            body_len: 0,
            context: ctx,
        };
        RequestEvent {
            request,
            response,
            latency: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_write_success_adds_to_population() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let listener = StoreListener::new(store.clone());

        let name = ObjectName::random();
        let mut ctx = Context::new();
        ctx.set(ContextKey::ObjectName, name.to_string());
        ctx.set(ContextKey::ObjectSize, "1024");

        listener
            .on_event(&event(Operation::Write, 200, ctx.clone()))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        // A failed write never enters the population.
        let mut failed_ctx = Context::new();
        failed_ctx.set(ContextKey::ObjectName, ObjectName::random().to_string());
        failed_ctx.set(ContextKey::ObjectSize, "1024");
        listener
            .on_event(&event(Operation::Write, 500, failed_ctx))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_commits_on_success() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let listener = StoreListener::new(store.clone());

        let record = ObjectRecord::new(ObjectName::random(), 1, 64);
        store.add(record).unwrap();
        let checked_out = store.name_for_delete().unwrap();

        let mut ctx = Context::new();
        ctx.set(ContextKey::ObjectName, checked_out.name.to_string());
        listener
            .on_event(&event(Operation::Delete, 204, ctx))
            .await
            .unwrap();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let listener = StoreListener::new(store.clone());

        store
            .add(ObjectRecord::new(ObjectName::random(), 1, 64))
            .unwrap();
        let checked_out = store.name_for_delete().unwrap();

        let mut ctx = Context::new();
        ctx.set(ContextKey::ObjectName, checked_out.name.to_string());
        listener
            .on_event(&event(Operation::Delete, 503, ctx))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        // The name is selectable again.
        assert!(store.name_for_read().is_ok());
    }

    #[tokio::test]
    async fn test_stats_listener_records() {
        let stats = Arc::new(Statistics::new());
        let listener = StatsListener::new(stats.clone());
        listener
            .on_event(&event(Operation::Read, 200, Context::new()))
            .await
            .unwrap();
        assert_eq!(stats.total(), 1);
        assert_eq!(stats.status_count(200), 1);
    }
}
