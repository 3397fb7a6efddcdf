//! Metrics for synchronizer runs
//!
//! # Metrics
//!
//! - `sync_runs_total`: Counter of runs by kind
//! - `sync_duration_seconds`: Histogram of run duration by kind and status
//! - `sync_records_added_total`: Counter of records added to the target
//! - `sync_records_updated_total`: Counter of records replaced in the target
//! - `sync_deletions_propagated_total`: Counter of tombstones applied
//! - `sync_errors_total`: Counter of failed runs by kind
//! - `sync_active_count`: Gauge of runs in progress
//!
//! # Examples
//!
//! ```
//! use agregllm::sync::metrics::SyncMetrics;
//!
//! let metrics = SyncMetrics::new("reconcile");
//! metrics.record_completion(2, 1, 0);
//! ```

use metrics::{counter, decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics for one synchronizer run
///
/// Recording is one-shot; dropping an unrecorded instance still releases the
/// active gauge.
#[derive(Debug)]
pub struct SyncMetrics {
    kind: &'static str,
    start: Instant,
    recorded: AtomicBool,
}

impl SyncMetrics {
    /// Starts tracking a run of the given kind (`reconcile`, `run`, `remote`)
    pub fn new(kind: &'static str) -> Self {
        increment_counter!("sync_runs_total", "kind" => kind);
        increment_gauge!("sync_active_count", 1.0, "kind" => kind);

        Self {
            kind,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    fn mark_recorded(&self) -> bool {
        !self.recorded.swap(true, Ordering::SeqCst)
    }

    /// Records a successful run
    ///
    /// # Arguments
    ///
    /// * `added` - Records added to the target
    /// * `updated` - Records replaced in the target
    /// * `deletions` - Tombstones applied to the source
    pub fn record_completion(&self, added: usize, updated: usize, deletions: usize) {
        if !self.mark_recorded() {
            return;
        }

        histogram!(
            "sync_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "kind" => self.kind,
            "status" => "success"
        );
        counter!("sync_records_added_total", added as u64, "kind" => self.kind);
        counter!("sync_records_updated_total", updated as u64, "kind" => self.kind);
        counter!("sync_deletions_propagated_total", deletions as u64, "kind" => self.kind);

        decrement_gauge!("sync_active_count", 1.0, "kind" => self.kind);
    }

    /// Records a failed run
    pub fn record_error(&self, error_type: &str) {
        if !self.mark_recorded() {
            return;
        }

        histogram!(
            "sync_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "kind" => self.kind,
            "status" => "error"
        );
        increment_counter!(
            "sync_errors_total",
            "kind" => self.kind,
            "error_type" => error_type.to_string()
        );

        decrement_gauge!("sync_active_count", 1.0, "kind" => self.kind);
    }

    #[cfg(test)]
    fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl Drop for SyncMetrics {
    fn drop(&mut self) {
        if !self.recorded.load(Ordering::SeqCst) {
            decrement_gauge!("sync_active_count", 1.0, "kind" => self.kind);
        }
    }
}

/// Installs the Prometheus exporter when built with the `prometheus` feature
///
/// Without the feature this is a no-op.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let _ = PrometheusBuilder::new().install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
