//! Stopping conditions
//!
//! Any registered condition ends the run: elapsed runtime, total
//! operations, total aborts, or a per-status-code count. Runtime is enforced
//! by a deadline in the driver; the rest are checked after every completed
//! exchange.

use crate::stats::Statistics;
use og_common::config::StoppingConfig;
use std::fmt;
use std::time::Duration;

/// One reason to end the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoppingCondition {
    Runtime(Duration),
    TotalOperations(u64),
    TotalAborts(u64),
    StatusCount { status: u16, count: u64 },
}

impl StoppingCondition {
    /// Expand the configuration into the conditions to monitor
    pub fn from_config(config: &StoppingConfig) -> Vec<Self> {
        let mut conditions = Vec::new();
        if let Some(secs) = config.runtime_secs {
            conditions.push(Self::Runtime(Duration::from_secs_f64(secs)));
        }
        if let Some(operations) = config.operations {
            conditions.push(Self::TotalOperations(operations));
        }
        if let Some(aborts) = config.aborts {
            conditions.push(Self::TotalAborts(aborts));
        }
        for limit in &config.status_counts {
            conditions.push(Self::StatusCount {
                status: limit.status,
                count: limit.count,
            });
        }
        conditions
    }

    /// Whether this condition is now met
    ///
    /// Runtime is deadline-driven in the run loop and never trips here.
    pub fn is_met(&self, stats: &Statistics, aborts: u64) -> bool {
        match *self {
            Self::Runtime(_) => false,
            Self::TotalOperations(limit) => stats.total() >= limit,
            Self::TotalAborts(limit) => aborts >= limit,
            Self::StatusCount { status, count } => stats.status_count(status) >= count,
        }
    }

    /// The runtime deadline, if this is the runtime condition
    pub fn deadline(&self) -> Option<Duration> {
        match *self {
            Self::Runtime(duration) => Some(duration),
            _ => None,
        }
    }
}

impl fmt::Display for StoppingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime(duration) => write!(f, "runtime {duration:?}"),
            Self::TotalOperations(limit) => write!(f, "{limit} operations"),
            Self::TotalAborts(limit) => write!(f, "{limit} aborts"),
            Self::StatusCount { status, count } => {
                write!(f, "{count} responses with status {status}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_common::config::StatusCountLimit;
    use og_common::Operation;

    #[test]
    fn test_from_config() {
        let config = StoppingConfig {
            runtime_secs: Some(0.25),
            operations: Some(100),
            status_counts: vec![StatusCountLimit {
                status: 503,
                count: 5,
            }],
            ..StoppingConfig::default()
        };
        let conditions = StoppingCondition::from_config(&config);
        assert_eq!(conditions.len(), 3);
        assert_eq!(
            conditions[0].deadline(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_operation_and_status_limits() {
        let stats = Statistics::new();
        let by_ops = StoppingCondition::TotalOperations(2);
        let by_status = StoppingCondition::StatusCount {
            status: 503,
            count: 1,
        };

        assert!(!by_ops.is_met(&stats, 0));
        stats.record(Operation::Write, 200, 0, 0, 1);
        stats.record(Operation::Write, 503, 0, 0, 1);
        assert!(by_ops.is_met(&stats, 0));
        assert!(by_status.is_met(&stats, 0));
    }

    #[test]
    fn test_abort_limit() {
        let stats = Statistics::new();
        let condition = StoppingCondition::TotalAborts(3);
        assert!(!condition.is_met(&stats, 2));
        assert!(condition.is_met(&stats, 3));
    }
}
