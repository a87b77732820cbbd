//! Single-step request production
//!
//! One supplier per configured operation choice. Each `get` runs the context
//! producers in order (object name, size, container, credentials, retention),
//! assembles the URI, attaches the body and headers, and stamps the request
//! id and operation tag.

use crate::uri::{QueryParam, UriBuilder};
use crate::{now_ms, RequestSupplier};
use async_trait::async_trait;
use http::Method;
use og_common::config::{OperationChoice, SizeSpec, TargetConfig};
use og_common::{
    Body, Context, ContextKey, Credential, DataType, HttpRequest, ObjectName, Operation, Result,
};
use og_store::ObjectStore;
use og_supply::{Md5Cache, RangeMode, RangedSupplier};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Produces single-step requests for one operation choice
pub struct SingleRequestSupplier {
    operation: Operation,
    data: DataType,
    content_md5: bool,
    legal_hold: Option<String>,
    retention_secs: Option<u64>,
    container: String,
    credential: Credential,
    uri: UriBuilder,
    store: Arc<ObjectStore>,
    inner: Mutex<SupplierState>,
}

struct SupplierState {
    size: SizeSupplier,
    md5: Md5Cache,
}

pub(crate) enum SizeSupplier {
    Fixed(u64),
    Ranged(RangedSupplier),
}

impl SizeSupplier {
    pub(crate) fn new(spec: SizeSpec) -> Result<Self> {
        Ok(match spec {
            SizeSpec::Fixed { bytes } => Self::Fixed(bytes),
            SizeSpec::Range { min, max } => {
                Self::Ranged(RangedSupplier::new(min, max, RangeMode::Random)?)
            }
        })
    }

    pub(crate) fn get(&mut self) -> u64 {
        match self {
            Self::Fixed(bytes) => *bytes,
            Self::Ranged(supplier) => supplier.get(),
        }
    }
}

impl SingleRequestSupplier {
    pub fn new(
        choice: &OperationChoice,
        target: &TargetConfig,
        credential: Credential,
        store: Arc<ObjectStore>,
    ) -> Result<Self> {
        Ok(Self {
            operation: choice.operation,
            data: choice.data,
            content_md5: choice.content_md5,
            legal_hold: choice.legal_hold.clone(),
            retention_secs: choice.retention_secs,
            container: target.container.clone(),
            credential,
            uri: UriBuilder::new(target),
            store,
            inner: Mutex::new(SupplierState {
                size: SizeSupplier::new(choice.object_size)?,
                md5: Md5Cache::new(),
            }),
        })
    }

    fn method(&self) -> Method {
        match self.operation {
            Operation::Write | Operation::Overwrite => Method::PUT,
            Operation::Read | Operation::List => Method::GET,
            Operation::Metadata => Method::HEAD,
            Operation::Delete => Method::DELETE,
            // Multipart choices route to the multipart supplier in wiring.
            Operation::MultipartWrite => Method::POST,
        }
    }

    /// Resolve the object this request addresses, checking existing names
    /// out of the population where the operation requires one
    fn resolve_object(&self) -> Result<Option<(ObjectName, u64)>> {
        match self.operation {
            Operation::Write => {
                let name = ObjectName::random();
                let size = self.inner.lock().size.get();
                Ok(Some((name, size)))
            }
            Operation::Overwrite | Operation::Read | Operation::Metadata => {
                let record = self.store.name_for_read()?;
                Ok(Some((record.name, record.size)))
            }
            Operation::Delete => {
                let record = self.store.name_for_delete()?;
                Ok(Some((record.name, record.size)))
            }
            Operation::List | Operation::MultipartWrite => Ok(None),
        }
    }

    fn body_for(&self, name: ObjectName, size: u64) -> Body {
        match (self.operation, self.data) {
            (Operation::Write | Operation::Overwrite, DataType::Zeroes) => Body::zeroes(size),
            (Operation::Write | Operation::Overwrite, DataType::Random) => {
                Body::random(size, seed_for(name))
            }
            (Operation::Write | Operation::Overwrite, DataType::Existing) => {
                Body::existing(size, seed_for(name))
            }
            _ => Body::none(),
        }
    }
}

/// Body seed derived from the object name, so re-writes of the same object
/// reproduce the same bytes
pub(crate) fn seed_for(name: ObjectName) -> u64 {
    u64::from_be_bytes(*name.as_bytes())
}

#[async_trait]
impl RequestSupplier for SingleRequestSupplier {
    async fn get(&self) -> Result<HttpRequest> {
        let mut ctx = Context::new();

        // Context producers run in order; later stages observe earlier
        // side effects through the context.
        ctx.set(ContextKey::ContainerName, self.container.clone());
        let resolved = self.resolve_object()?;
        if let Some((name, size)) = resolved {
            ctx.set(ContextKey::ObjectName, name.to_string());
            ctx.set(ContextKey::ObjectSize, size.to_string());
        }

        ctx.set(ContextKey::Username, self.credential.username.clone());
        ctx.set(ContextKey::Password, self.credential.password.clone());
        if let Some(token) = &self.credential.keystone_token {
            ctx.set(ContextKey::KeystoneToken, token.clone());
        }
        if let Some(account) = &self.credential.storage_account_name {
            ctx.set(ContextKey::StorageAccountName, account.clone());
        }

        let object_path = resolved.map(|(name, _)| name.to_string());
        let uri = self.uri.build(
            self.credential.storage_account_name.as_deref(),
            Some(&self.container),
            object_path.as_deref(),
            &[] as &[QueryParam],
        )?;

        let mut request = HttpRequest::new(self.method(), uri, self.operation, now_ms());

        if let Some((name, size)) = resolved {
            request.body = self.body_for(name, size);
        }
        if let Some(token) = &self.credential.keystone_token {
            request.add_header("X-Auth-Token", token.clone());
        }
        if self.content_md5 && !request.body.is_empty() {
            let digest = self.inner.lock().md5.get(request.body.size);
            request.add_header("Content-MD5", digest.clone());
            ctx.set(ContextKey::ContentMd5, digest);
        }
        if matches!(self.operation, Operation::Write | Operation::Overwrite) {
            if let Some(hold) = &self.legal_hold {
                request.add_header("X-Amz-Object-Lock-Legal-Hold", hold.clone());
                ctx.set(ContextKey::LegalHold, hold.clone());
            }
            if let Some(secs) = self.retention_secs {
                request.add_header("X-Amz-Object-Lock-Retain-Until-Date", secs.to_string());
                ctx.set(ContextKey::ObjectRetention, secs.to_string());
            }
        }

        ctx.set(ContextKey::RequestId, Uuid::new_v4().to_string());
        request.context = ctx;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_common::config::{OperationChoice, SizeSpec};
    use og_common::Error;
    use og_store::ObjectRecord;
    use tempfile::TempDir;

    fn target() -> TargetConfig {
        TargetConfig {
            container: "bucket".into(),
            ..TargetConfig::default()
        }
    }

    fn supplier(operation: Operation, dir: &TempDir) -> SingleRequestSupplier {
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let choice = OperationChoice {
            operation,
            object_size: SizeSpec::Fixed { bytes: 1024 },
            data: DataType::Random,
            content_md5: operation == Operation::Write,
            ..OperationChoice::default()
        };
        SingleRequestSupplier::new(&choice, &target(), Credential::new("user", "pass"), store)
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_request_shape() {
        let dir = TempDir::new().unwrap();
        let request = supplier(Operation::Write, &dir).get().await.unwrap();

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.operation, Operation::Write);
        assert_eq!(request.body.size, 1024);
        assert!(request.header("content-md5").is_some());

        let name = request.context.get(ContextKey::ObjectName).unwrap();
        assert_eq!(request.uri.path(), format!("/bucket/{name}"));
        assert_eq!(request.context.get(ContextKey::Username), Some("user"));
        assert!(request.request_id().is_some());
    }

    #[tokio::test]
    async fn test_read_draws_from_population() {
        let dir = TempDir::new().unwrap();
        let supplier = supplier(Operation::Read, &dir);
        let known = ObjectRecord::new(ObjectName::random(), 1, 2048);
        supplier.store.add(known).unwrap();

        let request = supplier.get().await.unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.context.get(ContextKey::ObjectName),
            Some(known.name.to_string().as_str())
        );
        assert_eq!(request.context.get_u64(ContextKey::ObjectSize), Some(2048));
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn test_read_empty_population_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let result = supplier(Operation::Read, &dir).get().await;
        assert!(matches!(result, Err(Error::EmptyPopulation)));
    }

    #[tokio::test]
    async fn test_delete_checks_out_exclusively() {
        let dir = TempDir::new().unwrap();
        let supplier = supplier(Operation::Delete, &dir);
        supplier
            .store
            .add(ObjectRecord::new(ObjectName::random(), 1, 1))
            .unwrap();

        let request = supplier.get().await.unwrap();
        assert_eq!(request.method, Method::DELETE);
        // The only record is checked out for delete now.
        assert!(matches!(supplier.get().await, Err(Error::EmptyPopulation)));
    }

    #[tokio::test]
    async fn test_list_addresses_container() {
        let dir = TempDir::new().unwrap();
        let request = supplier(Operation::List, &dir).get().await.unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.uri.path(), "/bucket");
        assert!(request.context.get(ContextKey::ObjectName).is_none());
    }

    #[test]
    fn test_seed_is_stable_per_name() {
        let name = ObjectName::random();
        assert_eq!(seed_for(name), seed_for(name));
    }
}
