//! OpenTelemetry metrics for index provisioning.

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Metrics for provisioning runs.
pub struct ProvisionerMetrics {
    /// Index declarations acknowledged by the server
    pub indexes_declared: Counter<u64>,

    /// Failed runs, by error kind
    pub errors: Counter<u64>,

    /// Duration of a provisioning or verification run (seconds)
    pub run_duration: Histogram<f64>,
}

impl ProvisionerMetrics {
    /// Register metrics with the global meter provider.
    pub fn register() -> Self {
        let meter = opentelemetry::global::meter("karmabot.provisioner");
        Self::register_with_meter(&meter)
    }

    /// Register metrics with a specific meter (useful for testing).
    pub fn register_with_meter(meter: &Meter) -> Self {
        Self {
            indexes_declared: meter
                .u64_counter("provisioner_indexes_declared")
                .with_description("Index declarations acknowledged by MongoDB")
                .build(),
            errors: meter.u64_counter("provisioner_errors").with_description("Failed provisioning runs").build(),
            run_duration: meter
                .f64_histogram("provisioner_run_duration_seconds")
                .with_description("Provisioning run duration in seconds")
                .build(),
        }
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors.add(1, &[KeyValue::new("kind", kind)]);
    }
}
