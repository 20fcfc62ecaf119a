//! Metrics collection for the ingest and index stages.

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names and recording helpers for the pipeline.
///
/// Names are fixed at construction so dashboards can rely on them; with no
/// recorder installed every call is a no-op.
pub struct MetricsCollector {
    /// Artifacts captured into the content store
    pub artifacts_ingested_total: &'static str,
    /// Messages fully parsed, normalized, and persisted
    pub messages_indexed_total: &'static str,
    /// Per-item failures, labeled by stage
    pub failures_total: &'static str,
    /// Wall-clock duration of a full stage drain, labeled by stage
    pub stage_duration_seconds: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            artifacts_ingested_total: "mailsieve_artifacts_ingested_total",
            messages_indexed_total: "mailsieve_messages_indexed_total",
            failures_total: "mailsieve_failures_total",
            stage_duration_seconds: "mailsieve_stage_duration_seconds",
        }
    }
}

impl MetricsCollector {
    /// Record artifacts captured by the intake stage.
    pub fn record_ingested(&self, count: usize) {
        counter!(self.artifacts_ingested_total).increment(count as u64);
    }

    /// Record messages persisted by the index stage.
    pub fn record_indexed(&self, count: usize) {
        counter!(self.messages_indexed_total).increment(count as u64);
    }

    /// Record per-item failures for a stage.
    pub fn record_failures(&self, stage: &'static str, count: usize) {
        counter!(self.failures_total, "stage" => stage).increment(count as u64);
    }

    /// Record the duration of a full stage drain.
    pub fn record_stage_duration(&self, stage: &'static str, duration: Duration) {
        histogram!(self.stage_duration_seconds, "stage" => stage).record(duration.as_secs_f64());
    }
}
