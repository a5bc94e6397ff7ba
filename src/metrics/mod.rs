//! Client Metrics
//!
//! Prometheus counters for read, write and retry outcomes, registered in a
//! per-client [`Registry`] so several clients can live in one process.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Error, FailureClass, Result};

/// Counters maintained by a [`BlobClient`](crate::client::BlobClient).
#[derive(Debug, Clone)]
pub struct ClientMetrics {
    registry: Registry,
    reads: IntCounterVec,
    writes: IntCounterVec,
    sliver_failures: IntCounterVec,
    epoch_retries: IntCounter,
}

impl ClientMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reads = IntCounterVec::new(
            Opts::new("slivernet_reads_total", "Blob reads by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let writes = IntCounterVec::new(
            Opts::new("slivernet_writes_total", "Blob writes by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let sliver_failures = IntCounterVec::new(
            Opts::new(
                "slivernet_sliver_failures_total",
                "Failed sliver requests by failure class",
            ),
            &["class"],
        )
        .map_err(metrics_error)?;
        let epoch_retries = IntCounter::new(
            "slivernet_epoch_retries_total",
            "Reads retried after invalidating the committee view",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(reads.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(writes.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(sliver_failures.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(epoch_retries.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            reads,
            writes,
            sliver_failures,
            epoch_retries,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_read<T>(&self, result: &Result<T>) {
        self.reads.with_label_values(&[outcome(result)]).inc();
    }

    pub fn record_write<T>(&self, result: &Result<T>) {
        self.writes.with_label_values(&[outcome(result)]).inc();
    }

    pub fn record_sliver_failure(&self, class: FailureClass) {
        self.sliver_failures
            .with_label_values(&[class.as_str()])
            .inc();
    }

    pub fn record_epoch_retry(&self) {
        self.epoch_retries.inc();
    }

    pub fn reads(&self, outcome: &str) -> u64 {
        self.reads.with_label_values(&[outcome]).get()
    }

    pub fn writes(&self, outcome: &str) -> u64 {
        self.writes.with_label_values(&[outcome]).get()
    }

    pub fn sliver_failures(&self, class: FailureClass) -> u64 {
        self.sliver_failures
            .with_label_values(&[class.as_str()])
            .get()
    }

    pub fn epoch_retries(&self) -> u64 {
        self.epoch_retries.get()
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) if e.is_epoch_transient() => "transient",
        Err(Error::Cancelled) | Err(Error::Timeout(_)) => "cancelled",
        Err(_) => "failure",
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
