//! og - object-storage workload generator
//!
//! Loads a workload description, wires the suppliers, signer, client and
//! listeners together, runs the load test and prints a summary. Exit codes:
//! 0 on success, 1 on a configuration error, 2 when the test aborted.

use clap::Parser;
use og_common::config::WorkloadConfig;
use og_common::{Error, Operation, Result};
use og_driver::{
    AuthMode, Driver, EventDispatcher, MultipartListener, ReqwestClient, RunSummary, Scheduler,
    StatsListener, Statistics, StoppingCondition, StoreListener,
};
use og_request::{MixSupplier, MultipartSupplier, RequestSupplier, SingleRequestSupplier};
use og_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "og")]
#[command(about = "og - object-storage workload generator")]
#[command(version)]
struct Args {
    /// Workload description file (JSON)
    #[arg(short, long)]
    workload: Option<PathBuf>,

    /// Override the target host
    #[arg(long)]
    host: Option<String>,

    /// Override the runtime limit (seconds)
    #[arg(long)]
    runtime: Option<f64>,

    /// Override the client concurrency
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<WorkloadConfig> {
    let mut config = match &args.workload {
        Some(path) => {
            let data = std::fs::read(path).map_err(|e| {
                Error::configuration(format!("cannot read workload {}: {e}", path.display()))
            })?;
            serde_json::from_slice(&data)
                .map_err(|e| Error::configuration(format!("workload parse: {e}")))?
        }
        None => WorkloadConfig::default(),
    };

    if let Some(host) = &args.host {
        config.target.host = host.clone();
    }
    if let Some(runtime) = args.runtime {
        config.stopping.runtime_secs = Some(runtime);
    }
    if let Some(concurrency) = args.concurrency {
        config.client.concurrency = concurrency;
    }

    config.validate()?;
    Ok(config)
}

/// Build the wiring and run the test
async fn run(config: WorkloadConfig) -> Result<(RunSummary, Arc<Statistics>)> {
    let store = Arc::new(ObjectStore::open(&config.store.dir, &config.store.prefix)?);
    info!(
        population = store.len(),
        dir = %config.store.dir.display(),
        "object population loaded"
    );
    if store.is_empty()
        && config
            .operations
            .iter()
            .any(|choice| choice.operation.needs_existing_object())
    {
        warn!("population is empty; reads and deletes will skip until writes land");
    }

    let credential = config.auth.credential.clone();
    let mut choices: Vec<(Arc<dyn RequestSupplier>, f64)> = Vec::new();
    let mut multipart: Option<Arc<MultipartSupplier>> = None;
    for choice in &config.operations {
        let supplier: Arc<dyn RequestSupplier> = match choice.operation {
            Operation::MultipartWrite => match &multipart {
                // All multipart entries share one session manager.
                Some(existing) => existing.clone(),
                None => {
                    let supplier = Arc::new(MultipartSupplier::new(
                        &config.multipart,
                        choice,
                        &config.target,
                        credential.clone(),
                    )?);
                    multipart = Some(supplier.clone());
                    supplier
                }
            },
            _ => Arc::new(SingleRequestSupplier::new(
                choice,
                &config.target,
                credential.clone(),
                store.clone(),
            )?),
        };
        choices.push((supplier, choice.weight));
    }
    let mix = Arc::new(MixSupplier::new(choices)?);

    let stats = Arc::new(Statistics::new());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.subscribe(Arc::new(StoreListener::new(store.clone())));
    if let Some(multipart) = &multipart {
        dispatcher.subscribe(Arc::new(MultipartListener::new(multipart.clone())));
    }
    dispatcher.subscribe(Arc::new(StatsListener::new(stats.clone())));

    let driver = Driver::new(
        mix,
        AuthMode::from_config(&config.auth),
        Arc::new(ReqwestClient::new(&config.client)?),
        Scheduler::from_config(&config.scheduler)?,
        dispatcher,
        stats.clone(),
        StoppingCondition::from_config(&config.stopping),
        multipart,
        config.stopping.immediate_shutdown,
    );

    let summary = driver.run().await?;
    Ok((summary, stats))
}

fn print_summary(summary: &RunSummary, stats: &Statistics) {
    println!("--- og summary ---");
    println!("operations:     {}", summary.operations);
    println!("skips:          {}", summary.skips);
    println!("aborts:         {}", summary.aborts);
    println!("elapsed:        {:.3}s", summary.elapsed.as_secs_f64());
    println!("stopped by:     {}", summary.stopped_by);
    println!("bytes sent:     {}", stats.bytes_sent());
    println!("bytes received: {}", stats.bytes_received());
    if !summary.status_counts.is_empty() {
        println!("status counts:");
        for (status, count) in &summary.status_counts {
            if *status == 0 {
                println!("  transport failures: {count}");
            } else {
                println!("  {status}: {count}");
            }
        }
    }
    let latency = stats.latency();
    if latency.count() > 0 {
        println!(
            "latency:        mean {}us, p50 {}us, p99 {}us, max {}us",
            latency.mean_us(),
            latency.percentile_us(50.0),
            latency.percentile_us(99.0),
            latency.max_us()
        );
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    match run(config).await {
        Ok((summary, stats)) => {
            print_summary(&summary, &stats);
            std::process::exit(0);
        }
        Err(e) => {
            error!(error = %e, "test aborted");
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args {
            workload: None,
            host: Some("storage.example".to_string()),
            runtime: Some(1.5),
            concurrency: Some(32),
            log_level: "info".to_string(),
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.target.host, "storage.example");
        assert_eq!(config.stopping.runtime_secs, Some(1.5));
        assert_eq!(config.client.concurrency, 32);
    }

    #[test]
    fn test_missing_workload_file_is_config_error() {
        let args = Args {
            workload: Some(PathBuf::from("/does/not/exist.json")),
            host: None,
            runtime: None,
            concurrency: None,
            log_level: "info".to_string(),
        };
        let err = load_config(&args).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_default_config_needs_a_stop_condition() {
        let args = Args {
            workload: None,
            host: None,
            runtime: None,
            concurrency: None,
            log_level: "info".to_string(),
        };
        // The built-in defaults carry no stopping condition; the CLI
        // runtime override is what makes them valid above.
        assert!(load_config(&args).is_err());
    }
}
