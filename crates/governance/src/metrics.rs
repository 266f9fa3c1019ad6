//! Metrics implementation using Prometheus.

use agent_sandbox_core::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Filter verdict labels for `command_filter_decisions_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Passthrough,
    KnownSafe,
    Approved,
    Rejected,
}

impl FilterDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::KnownSafe => "known_safe",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Count filter verdicts.
pub fn track_filter_decision(decision: FilterDecision, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!(
        "command_filter_decisions_total",
        "decision" => decision.as_str()
    )
    .increment(count as u64);
}

/// Time spent assessing one filter batch.
pub fn track_assessment_latency(latency_sec: f64) {
    metrics::histogram!("command_filter_assessment_duration_seconds").record(latency_sec);
}
