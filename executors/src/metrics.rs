use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder,
    register_histogram_vec_with_registry,
};

/// Histograms recorded by the batch engine
pub struct BatchMetrics {
    pub transaction_send_duration: HistogramVec,
    pub transaction_submitted_to_mined_duration: HistogramVec,
    pub batch_phase_duration: HistogramVec,
}

impl BatchMetrics {
    /// Create new batch metrics with the provided registry
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let transaction_send_duration = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "chainprof_transaction_send_duration_seconds",
                "Time to estimate, sign and broadcast a single transaction"
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
            &["chain_id"],
            registry
        )?;

        let transaction_submitted_to_mined_duration = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "chainprof_transaction_submitted_to_mined_duration_seconds",
                "Time from broadcast until a receipt is observed"
            )
            .buckets(vec![
                0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0
            ]),
            &["chain_id"],
            registry
        )?;

        let batch_phase_duration = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "chainprof_batch_phase_duration_seconds",
                "Wall-clock duration of a batch phase (submission or mining)"
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
            &["chain_id", "phase"],
            registry
        )?;

        Ok(BatchMetrics {
            transaction_send_duration,
            transaction_submitted_to_mined_duration,
            batch_phase_duration,
        })
    }
}

lazy_static! {
    static ref DEFAULT_METRICS_REGISTRY: Registry = Registry::new();

    static ref DEFAULT_METRICS: Option<BatchMetrics> = match BatchMetrics::new(&DEFAULT_METRICS_REGISTRY) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register batch metrics, metrics are disabled");
            None
        }
    };
}

/// Export metrics in Prometheus text format from the default registry
pub fn export_default_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = DEFAULT_METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_transaction_sent(chain_id: u64, duration_seconds: f64) {
    if let Some(metrics) = DEFAULT_METRICS.as_ref() {
        metrics
            .transaction_send_duration
            .with_label_values(&[&chain_id.to_string()])
            .observe(duration_seconds);
    }
}

pub fn record_transaction_mined(chain_id: u64, duration_seconds: f64) {
    if let Some(metrics) = DEFAULT_METRICS.as_ref() {
        metrics
            .transaction_submitted_to_mined_duration
            .with_label_values(&[&chain_id.to_string()])
            .observe(duration_seconds);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Submission,
    Mining,
}

impl BatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPhase::Submission => "submission",
            BatchPhase::Mining => "mining",
        }
    }
}

pub fn record_batch_phase(chain_id: u64, phase: BatchPhase, duration_seconds: f64) {
    if let Some(metrics) = DEFAULT_METRICS.as_ref() {
        metrics
            .batch_phase_duration
            .with_label_values(&[&chain_id.to_string(), phase.as_str()])
            .observe(duration_seconds);
    }
}

/// Helper to calculate duration in seconds from unix timestamps (milliseconds)
pub fn calculate_duration_seconds(start_timestamp_ms: u64, end_timestamp_ms: u64) -> f64 {
    (end_timestamp_ms.saturating_sub(start_timestamp_ms)) as f64 / 1000.0
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
