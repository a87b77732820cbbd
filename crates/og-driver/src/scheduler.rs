//! Admission control
//!
//! Either a fixed concurrency cap (semaphore permits travel with the
//! in-flight request) or an inter-arrival process that spaces submissions by
//! sampled gaps: constant, uniform, or exponential for a Poisson arrival
//! stream.

use og_common::config::SchedulerConfig;
use og_common::{Error, Result};
use parking_lot::Mutex;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Spaces request submissions
pub struct Scheduler {
    kind: Kind,
}

enum Kind {
    Concurrency(Arc<Semaphore>),
    InterArrival(Mutex<Gap>),
}

enum Gap {
    Constant(Duration),
    /// Gap sampled uniformly between the two bounds
    Uniform { min: Duration, max: Duration },
    Poisson(Exp<f64>),
}

impl Scheduler {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let kind = match *config {
            SchedulerConfig::Concurrency { permits } => {
                Kind::Concurrency(Arc::new(Semaphore::new(permits)))
            }
            SchedulerConfig::Constant { ops_per_sec } => {
                Kind::InterArrival(Mutex::new(Gap::Constant(Duration::from_secs_f64(
                    1.0 / ops_per_sec,
                ))))
            }
            SchedulerConfig::Uniform {
                min_ops_per_sec,
                max_ops_per_sec,
            } => Kind::InterArrival(Mutex::new(Gap::Uniform {
                min: Duration::from_secs_f64(1.0 / max_ops_per_sec),
                max: Duration::from_secs_f64(1.0 / min_ops_per_sec),
            })),
            SchedulerConfig::Poisson { mean_ops_per_sec } => {
                let exp = Exp::new(mean_ops_per_sec)
                    .map_err(|e| Error::configuration(format!("poisson rate: {e}")))?;
                Kind::InterArrival(Mutex::new(Gap::Poisson(exp)))
            }
        };
        Ok(Self { kind })
    }

    /// Wait for admission
    ///
    /// Under a concurrency cap the returned permit must ride along with the
    /// in-flight request and drop on completion; inter-arrival scheduling
    /// returns no permit.
    pub async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.kind {
            Kind::Concurrency(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore is never closed"),
            ),
            Kind::InterArrival(gap) => {
                let wait = {
                    let gap = gap.lock();
                    match &*gap {
                        Gap::Constant(duration) => *duration,
                        Gap::Uniform { min, max } => {
                            let secs =
                                rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
                            Duration::from_secs_f64(secs)
                        }
                        Gap::Poisson(exp) => {
                            Duration::from_secs_f64(exp.sample(&mut rand::thread_rng()))
                        }
                    }
                };
                tokio::time::sleep(wait).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_concurrency_caps_in_flight() {
        let scheduler = Scheduler::from_config(&SchedulerConfig::Concurrency { permits: 2 })
            .unwrap();
        let first = scheduler.admit().await.unwrap();
        let _second = scheduler.admit().await.unwrap();

        // Third admission only proceeds once a permit returns.
        let blocked = tokio::time::timeout(Duration::from_millis(50), scheduler.admit()).await;
        assert!(blocked.is_err());

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(200), scheduler.admit()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_constant_rate_spaces_admissions() {
        let scheduler =
            Scheduler::from_config(&SchedulerConfig::Constant { ops_per_sec: 50.0 }).unwrap();
        let start = Instant::now();
        for _ in 0..5 {
            assert!(scheduler.admit().await.is_none());
        }
        // Five admissions at 50 ops/s take at least 100 ms.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_poisson_admits() {
        let scheduler = Scheduler::from_config(&SchedulerConfig::Poisson {
            mean_ops_per_sec: 1000.0,
        })
        .unwrap();
        for _ in 0..3 {
            scheduler.admit().await;
        }
    }
}
