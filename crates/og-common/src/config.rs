//! Configuration types for og
//!
//! This module defines the workload description deserialized from the
//! workload JSON file. Validation happens once at startup; anything invalid
//! is a configuration error and the process exits with code 1.

use crate::error::{Error, Result};
use crate::types::{Credential, DataType, Operation};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root workload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Endpoint under test
    pub target: TargetConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// HTTP client configuration
    pub client: ClientConfig,
    /// Admission control
    pub scheduler: SchedulerConfig,
    /// Weighted operation mix
    pub operations: Vec<OperationChoice>,
    /// Multipart upload configuration
    pub multipart: MultipartConfig,
    /// Stopping conditions
    pub stopping: StoppingConfig,
    /// Object population store
    pub store: StoreConfig,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            auth: AuthConfig::default(),
            client: ClientConfig::default(),
            scheduler: SchedulerConfig::default(),
            operations: vec![OperationChoice::default()],
            multipart: MultipartConfig::default(),
            stopping: StoppingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl WorkloadConfig {
    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        self.scheduler.validate()?;
        self.client.validate()?;
        self.multipart.validate()?;

        if self.operations.is_empty() {
            return Err(Error::configuration("operation mix is empty"));
        }
        let mut total_weight = 0.0;
        for choice in &self.operations {
            choice.validate()?;
            total_weight += choice.weight;
        }
        if total_weight <= 0.0 {
            return Err(Error::configuration(
                "operation weights must sum to a positive value",
            ));
        }

        self.stopping.validate()?;
        Ok(())
    }
}

/// Endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// URI scheme (http or https)
    pub scheme: String,
    /// Host name or address
    pub host: String,
    /// Port, omitted from the URI when None
    pub port: Option<u16>,
    /// Optional path segment prepended to every URI
    pub uri_root: Option<String>,
    /// Optional API version path segment
    pub api_version: Option<String>,
    /// Container (bucket) name
    pub container: String,
    /// Address the container as part of the host instead of the path
    pub virtual_host: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: Some(8080),
            uri_root: None,
            api_version: None,
            container: "og-test".to_string(),
            virtual_host: false,
        }
    }
}

impl TargetConfig {
    fn validate(&self) -> Result<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(Error::configuration(format!(
                "unsupported scheme: {}",
                self.scheme
            )));
        }
        if self.host.is_empty() {
            return Err(Error::configuration("target host is empty"));
        }
        if self.container.is_empty() {
            return Err(Error::configuration("container name is empty"));
        }
        Ok(())
    }
}

/// Authentication scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    None,
    AwsV2,
    AwsV4,
}

/// Authentication configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub kind: AuthKind,
    pub credential: Credential,
    /// AWS region for SigV4 credential scope
    pub region: String,
    /// AWS service for SigV4 credential scope
    pub service: String,
    /// Sign bodies chunk by chunk (SigV4 only)
    pub aws_chunked: bool,
    /// Skip payload hashing (SigV4 only)
    pub unsigned_payload: bool,
    /// Chunk size for chunked signing
    pub chunk_size: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            kind: AuthKind::None,
            credential: Credential::default(),
            region: "us-east-1".to_string(),
            service: "s3".to_string(),
            aws_chunked: false,
            unsigned_payload: false,
            chunk_size: 64 * 1024,
        }
    }
}

/// HTTP client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum concurrently executing requests
    pub concurrency: usize,
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Write bandwidth cap in bytes per second (None = unlimited)
    pub write_throttle_bps: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            request_timeout_secs: 60,
            write_throttle_bps: None,
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::configuration("client concurrency must be positive"));
        }
        if self.write_throttle_bps == Some(0) {
            return Err(Error::configuration("write throttle must be positive"));
        }
        Ok(())
    }
}

/// Admission control: a fixed concurrency cap or an inter-arrival process
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerConfig {
    /// Keep up to `permits` requests in flight
    Concurrency { permits: usize },
    /// Fixed inter-arrival gap of 1/ops_per_sec
    Constant { ops_per_sec: f64 },
    /// Inter-arrival gap sampled uniformly between the two rates
    Uniform {
        min_ops_per_sec: f64,
        max_ops_per_sec: f64,
    },
    /// Exponentially distributed gaps with the given mean rate
    Poisson { mean_ops_per_sec: f64 },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::Concurrency { permits: 10 }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<()> {
        match *self {
            Self::Concurrency { permits } if permits == 0 => {
                Err(Error::configuration("scheduler permits must be positive"))
            }
            Self::Constant { ops_per_sec } if ops_per_sec <= 0.0 => {
                Err(Error::configuration("constant rate must be positive"))
            }
            Self::Uniform {
                min_ops_per_sec,
                max_ops_per_sec,
            } if min_ops_per_sec <= 0.0 || max_ops_per_sec < min_ops_per_sec => Err(
                Error::configuration("uniform rate bounds must satisfy 0 < min <= max"),
            ),
            Self::Poisson { mean_ops_per_sec } if mean_ops_per_sec <= 0.0 => {
                Err(Error::configuration("poisson mean rate must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Object size selection
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizeSpec {
    Fixed { bytes: u64 },
    Range { min: u64, max: u64 },
}

impl Default for SizeSpec {
    fn default() -> Self {
        Self::Fixed { bytes: 4096 }
    }
}

impl SizeSpec {
    fn validate(&self) -> Result<()> {
        if let Self::Range { min, max } = self {
            if min > max {
                return Err(Error::configuration(format!(
                    "object size range min {min} exceeds max {max}"
                )));
            }
        }
        Ok(())
    }
}

/// One entry of the weighted operation mix
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationChoice {
    pub operation: Operation,
    pub weight: f64,
    pub object_size: SizeSpec,
    pub data: DataType,
    /// Attach a Content-MD5 header to write bodies
    pub content_md5: bool,
    /// Legal-hold status stamped on written objects
    pub legal_hold: Option<String>,
    /// Retention period in seconds stamped on written objects
    pub retention_secs: Option<u64>,
}

impl Default for OperationChoice {
    fn default() -> Self {
        Self {
            operation: Operation::Write,
            weight: 1.0,
            object_size: SizeSpec::default(),
            data: DataType::Random,
            content_md5: false,
            legal_hold: None,
            retention_secs: None,
        }
    }
}

impl OperationChoice {
    fn validate(&self) -> Result<()> {
        if self.weight < 0.0 {
            return Err(Error::configuration(format!(
                "negative weight for operation {}",
                self.operation
            )));
        }
        self.object_size.validate()
    }
}

/// Multipart upload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    /// Size of every part except possibly the last
    pub part_size: u64,
    /// Concurrent upload sessions to keep in flight
    pub target_sessions: usize,
    /// Concurrent part requests per session
    pub max_concurrent_parts: u32,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: 5 * 1024 * 1024,
            target_sessions: 1,
            max_concurrent_parts: 1,
        }
    }
}

impl MultipartConfig {
    fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(Error::configuration("multipart part size must be positive"));
        }
        if self.target_sessions == 0 {
            return Err(Error::configuration(
                "multipart target sessions must be positive",
            ));
        }
        if self.max_concurrent_parts == 0 {
            return Err(Error::configuration(
                "multipart max concurrent parts must be positive",
            ));
        }
        Ok(())
    }
}

/// Per-status-code stopping limit
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StatusCountLimit {
    pub status: u16,
    pub count: u64,
}

/// Stopping conditions; the first one met ends the run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingConfig {
    /// Wall-clock runtime limit (seconds)
    pub runtime_secs: Option<f64>,
    /// Total operation count limit
    pub operations: Option<u64>,
    /// Total abort count limit
    pub aborts: Option<u64>,
    /// Per-status-code count limits
    pub status_counts: Vec<StatusCountLimit>,
    /// Cancel in-flight requests instead of draining them
    pub immediate_shutdown: bool,
}

impl StoppingConfig {
    fn validate(&self) -> Result<()> {
        if let Some(runtime) = self.runtime_secs {
            if runtime <= 0.0 {
                return Err(Error::configuration("runtime limit must be positive"));
            }
        }
        if self.runtime_secs.is_none()
            && self.operations.is_none()
            && self.aborts.is_none()
            && self.status_counts.is_empty()
        {
            return Err(Error::configuration("no stopping condition configured"));
        }
        Ok(())
    }
}

/// Object population store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding segment files and the sidecar
    pub dir: PathBuf,
    /// Segment file name prefix
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./og-objects"),
            prefix: "objects".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_invalid_without_stop() {
        // The default stopping config has no condition, which must be rejected.
        let config = WorkloadConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_config() {
        let mut config = WorkloadConfig::default();
        config.stopping.runtime_secs = Some(10.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_weights() {
        let mut config = WorkloadConfig::default();
        config.stopping.operations = Some(100);
        config.operations[0].weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_size_range() {
        let mut config = WorkloadConfig::default();
        config.stopping.operations = Some(100);
        config.operations[0].object_size = SizeSpec::Range { min: 10, max: 5 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nonpositive_rate() {
        let mut config = WorkloadConfig::default();
        config.stopping.operations = Some(100);
        config.scheduler = SchedulerConfig::Constant { ops_per_sec: 0.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let mut config = WorkloadConfig::default();
        config.stopping.runtime_secs = Some(1.5);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: WorkloadConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.target.container, config.target.container);
        assert_eq!(parsed.stopping.runtime_secs, Some(1.5));
    }
}
