//! # Time-Series Store
//!
//! The external sink `MetricSink` (worker-side, per-frame) and `Monitor`
//! (orchestrator-side, per-poll) both write `MetricPoint`s to — out of
//! scope as an implementation, the same way the frame-to-prediction
//! function is: the store itself is an
//! external collaborator. `HttpTimeSeriesStore` is the one concrete
//! adapter, posting batches to a configured HTTP endpoint with
//! `reqwest`; `NullTimeSeriesStore` is the disabled/test double.

use async_trait::async_trait;
use orchestrator_domain::value_objects::MetricPoint;
use orchestrator_domain::OrchestratorError;
use std::time::Duration;

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn write_points(&self, points: Vec<MetricPoint>) -> Result<(), OrchestratorError>;
}

/// Posts each batch as a JSON array to `endpoint` over HTTPS, retrying
/// with exponential backoff on the caller's behalf is NOT done here — the
/// Monitor's writer owns retry/backoff; this type is a thin,
/// single-attempt transport.
pub struct HttpTimeSeriesStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTimeSeriesStore {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OrchestratorError::internal_error(format!("building time-series client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl TimeSeriesStore for HttpTimeSeriesStore {
    async fn write_points(&self, points: Vec<MetricPoint>) -> Result<(), OrchestratorError> {
        if points.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(&self.endpoint)
            .json(&points)
            .send()
            .await
            .map_err(|e| OrchestratorError::operation_error(format!("time-series write: {e}")))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::operation_error(format!("time-series store returned {}", response.status())));
        }
        Ok(())
    }
}

/// Accepts and discards every batch. Used when no store endpoint is
/// configured and by tests that don't exercise the metrics path.
pub struct NullTimeSeriesStore;

#[async_trait]
impl TimeSeriesStore for NullTimeSeriesStore {
    async fn write_points(&self, _points: Vec<MetricPoint>) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

/// A test double that counts writes and can be made to fail on demand —
/// the harness S5 ("metric outage + replay") needs to simulate an
/// outage that recovers on the Nth attempt.
#[cfg(any(test, feature = "test-support"))]
pub struct FlakyTimeSeriesStore {
    pub fail_first_n: std::sync::atomic::AtomicUsize,
    pub received: parking_lot::Mutex<Vec<MetricPoint>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FlakyTimeSeriesStore {
    pub fn new(fail_first_n: usize) -> Self {
        Self { fail_first_n: std::sync::atomic::AtomicUsize::new(fail_first_n), received: parking_lot::Mutex::new(Vec::new()) }
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl TimeSeriesStore for FlakyTimeSeriesStore {
    async fn write_points(&self, points: Vec<MetricPoint>) -> Result<(), OrchestratorError> {
        use std::sync::atomic::Ordering;
        if self.fail_first_n.load(Ordering::SeqCst) > 0 {
            self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
            return Err(OrchestratorError::operation_error("simulated store outage"));
        }
        self.received.lock().extend(points);
        Ok(())
    }
}
