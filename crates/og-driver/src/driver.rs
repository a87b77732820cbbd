//! The run loop
//!
//! One producer loop pulls requests, signs them and spawns their execution;
//! one dispatch task consumes completed exchanges in publication order and
//! feeds the listeners and the stopping conditions. Stopping is observed at
//! every suspension point; graceful shutdown drains in-flight requests,
//! immediate shutdown cancels them.

use crate::auth::AuthMode;
use crate::client::HttpClient;
use crate::events::{EventDispatcher, RequestEvent};
use crate::scheduler::Scheduler;
use crate::stats::Statistics;
use crate::stopping::StoppingCondition;
use bytes::Bytes;
use og_common::{Error, HttpRequest, HttpResponse, Result};
use og_request::{MultipartSupplier, RequestSupplier};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Backoff applied when the population cannot satisfy a request
const SKIP_BACKOFF: Duration = Duration::from_millis(5);

/// What a finished run looked like
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub operations: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub aborts: u64,
    pub skips: u64,
    pub elapsed: Duration,
    pub stopped_by: String,
}

/// Owns the runtime: supplier, signer, client, scheduler and listeners
pub struct Driver {
    supplier: Arc<dyn RequestSupplier>,
    auth: AuthMode,
    client: Arc<dyn HttpClient>,
    scheduler: Scheduler,
    dispatcher: Arc<EventDispatcher>,
    stats: Arc<Statistics>,
    conditions: Vec<StoppingCondition>,
    /// Abort counts come from the multipart supplier when one is wired
    multipart: Option<Arc<MultipartSupplier>>,
    immediate_shutdown: bool,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        supplier: Arc<dyn RequestSupplier>,
        auth: AuthMode,
        client: Arc<dyn HttpClient>,
        scheduler: Scheduler,
        dispatcher: EventDispatcher,
        stats: Arc<Statistics>,
        conditions: Vec<StoppingCondition>,
        multipart: Option<Arc<MultipartSupplier>>,
        immediate_shutdown: bool,
    ) -> Self {
        Self {
            supplier,
            auth,
            client,
            scheduler,
            dispatcher: Arc::new(dispatcher),
            stats,
            conditions,
            multipart,
            immediate_shutdown,
        }
    }

    fn aborts(&self) -> u64 {
        self.multipart.as_ref().map(|m| m.aborted()).unwrap_or(0)
    }

    /// Run until a stopping condition fires or the supplier terminates
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let deadline = self
            .conditions
            .iter()
            .find_map(StoppingCondition::deadline)
            .map(|limit| started + limit);
        let runtime_reason = self
            .conditions
            .iter()
            .find(|c| c.deadline().is_some())
            .map(ToString::to_string);

        // First stop reason wins.
        let (stop_tx, mut stop_rx) = watch::channel::<Option<String>>(None);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<RequestEvent>();
        let dispatch = self.spawn_dispatch(event_rx, stop_tx.clone());

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut run_error: Option<Error> = None;

        loop {
            if stop_rx.borrow().is_some() {
                break;
            }

            let permit = tokio::select! {
                permit = self.scheduler.admit() => permit,
                _ = stop_rx.changed() => break,
                _ = sleep_until(deadline) => {
                    let _ = stop_tx.send(Some(runtime_reason.clone().unwrap_or_default()));
                    break;
                }
            };

            let pulled = tokio::select! {
                result = self.supplier.get() => result,
                _ = stop_rx.changed() => break,
                _ = sleep_until(deadline) => {
                    let _ = stop_tx.send(Some(runtime_reason.clone().unwrap_or_default()));
                    break;
                }
            };
            let mut request = match pulled {
                Ok(request) => request,
                Err(Error::Stopped) => break,
                Err(e) if e.is_population_miss() => {
                    self.stats.record_skip();
                    drop(permit);
                    tokio::time::sleep(SKIP_BACKOFF).await;
                    continue;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "supplier error, skipping request");
                    continue;
                }
                Err(e) => {
                    let _ = stop_tx.send(Some("internal error".to_string()));
                    run_error = Some(e);
                    break;
                }
            };

            if let Err(e) = self.auth.apply(&mut request) {
                let _ = stop_tx.send(Some("signing failure".to_string()));
                run_error = Some(e);
                break;
            }

            let client = self.client.clone();
            let event_tx = event_tx.clone();
            tasks.spawn(async move {
                // The permit rides with the request; dropping it on
                // completion re-opens the concurrency slot.
                let _permit = permit;
                let submitted = Instant::now();
                let response = match client.execute(&request).await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(error = %e, "request failed in transport");
                        failure_response(&request)
                    }
                };
                let _ = event_tx.send(RequestEvent {
                    request,
                    response,
                    latency: submitted.elapsed(),
                });
            });
        }

        // Shutdown: wake anything parked in the supplier, then drain or
        // cancel the in-flight requests.
        self.supplier.stop();
        if self.immediate_shutdown {
            tasks.abort_all();
        }
        while tasks.join_next().await.is_some() {}
        drop(event_tx);

        match dispatch.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                run_error.get_or_insert(e);
            }
            Err(e) => {
                run_error.get_or_insert(Error::internal(format!("dispatch task: {e}")));
            }
        }

        if let Some(error) = run_error {
            return Err(error);
        }

        let stopped_by = stop_rx
            .borrow()
            .clone()
            .unwrap_or_else(|| "supplier terminated".to_string());
        let summary = RunSummary {
            operations: self.stats.total(),
            status_counts: self.stats.status_counts(),
            aborts: self.aborts(),
            skips: self.stats.skips(),
            elapsed: started.elapsed(),
            stopped_by,
        };
        info!(
            operations = summary.operations,
            aborts = summary.aborts,
            skips = summary.skips,
            stopped_by = %summary.stopped_by,
            "run finished"
        );
        Ok(summary)
    }

    /// The dispatch task: publication-order delivery plus condition checks
    fn spawn_dispatch(
        &self,
        mut event_rx: mpsc::UnboundedReceiver<RequestEvent>,
        stop_tx: watch::Sender<Option<String>>,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let dispatcher = self.dispatcher.clone();
        let stats = self.stats.clone();
        let conditions = self.conditions.clone();
        let multipart = self.multipart.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Err(e) = dispatcher.publish(&event).await {
                    let _ = stop_tx.send(Some("listener failure".to_string()));
                    return Err(e);
                }

                let aborts = multipart.as_ref().map(|m| m.aborted()).unwrap_or(0);
                if let Some(met) = conditions.iter().find(|c| c.is_met(&stats, aborts)) {
                    let _ = stop_tx.send(Some(met.to_string()));
                }
            }
            Ok(())
        })
    }
}

/// Synthetic response for a request that never reached the wire or died
/// in transport; status zero marks the failure class
fn failure_response(request: &HttpRequest) -> HttpResponse {
    HttpResponse {
        status_code: 0,
        headers: Vec::new(),
        body: Bytes::new(),
        body_len: 0,
        context: request.context.clone(),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::{StatsListener, StoreListener};
    use async_trait::async_trait;
    use og_common::config::{
        OperationChoice, SchedulerConfig, SizeSpec, TargetConfig,
    };
    use og_common::{Credential, DataType, Operation};
    use og_request::SingleRequestSupplier;
    use og_store::ObjectStore;
    use std::sync::atomic::{AtomicU16, Ordering};
    use tempfile::TempDir;

    /// In-process client with a fixed delay and scriptable status
    struct MockClient {
        delay: Duration,
        status: AtomicU16,
    }

    impl MockClient {
        fn ok(delay: Duration) -> Self {
            Self {
                delay,
                status: AtomicU16::new(200),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockClient {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(HttpResponse {
                status_code: self.status.load(Ordering::Relaxed),
                headers: Vec::new(),
                body: Bytes::new(),
                body_len: 0,
                context: request.context.clone(),
            })
        }
    }

    fn write_supplier(store: &Arc<ObjectStore>) -> Arc<SingleRequestSupplier> {
        let choice = OperationChoice {
            operation: Operation::Write,
            object_size: SizeSpec::Fixed { bytes: 128 },
            data: DataType::Zeroes,
            ..OperationChoice::default()
        };
        Arc::new(
            SingleRequestSupplier::new(
                &choice,
                &TargetConfig::default(),
                Credential::new("u", "p"),
                store.clone(),
            )
            .unwrap(),
        )
    }

    fn driver(
        supplier: Arc<dyn RequestSupplier>,
        client: Arc<dyn HttpClient>,
        store: &Arc<ObjectStore>,
        conditions: Vec<StoppingCondition>,
    ) -> (Driver, Arc<Statistics>) {
        let stats = Arc::new(Statistics::new());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Arc::new(StoreListener::new(store.clone())));
        dispatcher.subscribe(Arc::new(StatsListener::new(stats.clone())));
        let driver = Driver::new(
            supplier,
            AuthMode::None,
            client,
            Scheduler::from_config(&SchedulerConfig::Concurrency { permits: 4 }).unwrap(),
            dispatcher,
            stats.clone(),
            conditions,
            None,
            false,
        );
        (driver, stats)
    }

    #[tokio::test]
    async fn test_stops_on_operation_count() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let (driver, stats) = driver(
            write_supplier(&store),
            Arc::new(MockClient::ok(Duration::from_millis(1))),
            &store,
            vec![StoppingCondition::TotalOperations(20)],
        );

        let summary = driver.run().await.unwrap();
        assert!(summary.operations >= 20, "ran {}", summary.operations);
        // The graceful drain lets at most the in-flight window finish.
        assert!(summary.operations <= 32, "ran {}", summary.operations);
        assert_eq!(summary.stopped_by, "20 operations");
        assert_eq!(stats.status_count(200), summary.operations);
        // Every successful write entered the population.
        assert_eq!(store.len() as u64, summary.operations);
    }

    #[tokio::test]
    async fn test_stops_on_runtime() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let (driver, _stats) = driver(
            write_supplier(&store),
            Arc::new(MockClient::ok(Duration::from_millis(10))),
            &store,
            vec![StoppingCondition::Runtime(Duration::from_millis(250))],
        );

        let started = std::time::Instant::now();
        let summary = driver.run().await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "stopped in {elapsed:?}");
        assert!(elapsed < Duration::from_millis(750), "stopped in {elapsed:?}");
        assert!(summary.operations > 0);
    }

    #[tokio::test]
    async fn test_population_misses_count_as_skips() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        // Reads against an empty population can only skip.
        let choice = OperationChoice {
            operation: Operation::Read,
            ..OperationChoice::default()
        };
        let supplier = Arc::new(
            SingleRequestSupplier::new(
                &choice,
                &TargetConfig::default(),
                Credential::new("u", "p"),
                store.clone(),
            )
            .unwrap(),
        );
        let (driver, stats) = driver(
            supplier,
            Arc::new(MockClient::ok(Duration::from_millis(1))),
            &store,
            vec![StoppingCondition::Runtime(Duration::from_millis(100))],
        );

        let summary = driver.run().await.unwrap();
        assert_eq!(summary.operations, 0);
        assert!(summary.skips > 0);
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_listener_failure_aborts_run() {
        struct Exploding;

        #[async_trait]
        impl crate::events::EventListener for Exploding {
            async fn on_event(&self, _event: &RequestEvent) -> Result<()> {
                Err(Error::internal("subscriber exploded"))
            }
        }

        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path(), "objects").unwrap());
        let stats = Arc::new(Statistics::new());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Arc::new(Exploding));
        let driver = Driver::new(
            write_supplier(&store),
            AuthMode::None,
            Arc::new(MockClient::ok(Duration::from_millis(1))),
            Scheduler::from_config(&SchedulerConfig::Concurrency { permits: 2 }).unwrap(),
            dispatcher,
            stats,
            vec![StoppingCondition::Runtime(Duration::from_secs(5))],
            None,
            false,
        );

        let result = driver.run().await;
        assert!(matches!(result, Err(Error::Listener(_))));
    }
}
