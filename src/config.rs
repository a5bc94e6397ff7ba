//! Client Configuration
//!
//! Tunables for fan-out concurrency and timeouts. Loaded from YAML, with
//! every field optional:
//!
//! ```yaml
//! maxConcurrentSliverReads: 16
//! maxBytesInFlight: 67108864
//! statusConcurrency: 10
//! maxConcurrentNodeWrites: 50
//! operationTimeout: "2m"
//! requestTimeout: "30s"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`BlobClient`](crate::client::BlobClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Upper bound on concurrent sliver requests during a read.
    #[serde(default = "default_max_concurrent_sliver_reads")]
    pub max_concurrent_sliver_reads: usize,

    /// Data-volume budget for a read; with large slivers fewer requests are
    /// kept in flight.
    #[serde(default = "default_max_bytes_in_flight")]
    pub max_bytes_in_flight: u64,

    /// Concurrent status queries when verifying a blob's status.
    #[serde(default = "default_status_concurrency")]
    pub status_concurrency: usize,

    /// Concurrent per-node write pipelines. Unset means one per member.
    #[serde(default)]
    pub max_concurrent_node_writes: Option<usize>,

    /// Deadline for a whole read or write (e.g. "2m"). Unset means none.
    #[serde(default)]
    pub operation_timeout: Option<String>,

    /// Deadline for a single storage node request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_max_concurrent_sliver_reads() -> usize {
    16
}

fn default_max_bytes_in_flight() -> u64 {
    64 * 1024 * 1024
}

fn default_status_concurrency() -> usize {
    10
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sliver_reads: default_max_concurrent_sliver_reads(),
            max_bytes_in_flight: default_max_bytes_in_flight(),
            status_concurrency: default_status_concurrency(),
            max_concurrent_node_writes: None,
            operation_timeout: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_sliver_reads == 0 {
            return Err(Error::Config(
                "maxConcurrentSliverReads must be positive".into(),
            ));
        }
        if self.status_concurrency == 0 {
            return Err(Error::Config("statusConcurrency must be positive".into()));
        }
        if self.max_concurrent_node_writes == Some(0) {
            return Err(Error::Config(
                "maxConcurrentNodeWrites must be positive when set".into(),
            ));
        }
        self.operation_timeout()?;
        self.request_timeout()?;
        Ok(())
    }

    pub fn operation_timeout(&self) -> Result<Option<Duration>> {
        self.operation_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout)
    }

    /// Number of sliver requests to keep in flight for slivers of
    /// `sliver_size` bytes.
    pub fn sliver_read_concurrency(&self, sliver_size: u64) -> usize {
        let by_volume = self.max_bytes_in_flight / sliver_size.max(1);
        (by_volume.min(self.max_concurrent_sliver_reads as u64) as usize).max(1)
    }
}

/// Parse a Go-style duration such as `50ms`, `30s`, `2m`, `1h30m` or `1d`.
///
/// A trailing bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("empty duration string".to_string()));
    }

    let invalid = || Error::Config(format!("invalid duration: {}", s));
    let mut total_millis: u64 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(digits_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let millis_per_unit = match unit.to_ascii_lowercase().as_str() {
            "ms" => 1,
            "s" | "" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            other => return Err(Error::Config(format!("unknown duration unit: {}", other))),
        };
        total_millis = value
            .checked_mul(millis_per_unit)
            .and_then(|millis| total_millis.checked_add(millis))
            .ok_or_else(|| Error::Config(format!("duration out of range: {}", s)))?;
        rest = tail;
    }

    if total_millis == 0 {
        return Err(Error::Config("duration must be greater than 0".to_string()));
    }

    Ok(Duration::from_millis(total_millis))
}
