use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static PAYMENT_CAPTURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the Prometheus recorder for `metrics` macros and register the
/// capture counters. Safe to call more than once; later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
        }
    }

    PAYMENT_CAPTURES_TOTAL.get_or_init(|| {
        let registry = PROMETHEUS_REGISTRY.get_or_init(Registry::new);

        let counter = IntCounterVec::new(
            Opts::new(
                "payment_captures_total",
                "Capture and reconciliation attempts by outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid payment_captures_total definition");

        if let Err(e) = registry.register(Box::new(counter.clone())) {
            tracing::warn!(error = %e, "Failed to register payment_captures_total");
        }
        counter
    });
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Count one capture or reconciliation attempt.
///
/// `outcome` is `success` or the error code returned to the caller.
pub fn record_capture(operation: &str, outcome: &str) {
    if let Some(counter) = PAYMENT_CAPTURES_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}
