use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, MeterProvider as _},
};

use crate::Error;

#[derive(Clone)]
pub struct Metrics {
    events_published_total: Counter<u64>,
    kubernetes_api_usage_total: Counter<u64>,
    reconciliation_errors_total: Counter<u64>,
    reconciliations_total: Counter<u64>,
    reconcile_duration_seconds: Histogram<f64>,
    validation_failures_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub fn new(provider: &opentelemetry_sdk::metrics::SdkMeterProvider) -> Self {
        let meter = provider.meter("pki-operator");

        let pki_operator_events_published_total = meter
            .u64_counter("pki_operator_events_published_total")
            .with_description("The total number of Kubernetes Events published.")
            .build();

        let pki_operator_kubernetes_api_usage_total = meter
            .u64_counter("pki_operator_kubernetes_api_usage_total")
            .with_description("The total number of Kubernetes API requests made.")
            .build();

        let pki_operator_reconciliation_errors_total = meter
            .u64_counter("pki_operator_reconciliation_errors_total")
            .with_description("The total number of reconciliation errors.")
            .build();

        let pki_operator_reconciliations_total = meter
            .u64_counter("pki_operator_reconciliations_total")
            .with_description("The total number of reconciliations.")
            .build();

        let pki_operator_reconcile_duration_seconds = meter
            .f64_histogram("pki_operator_reconcile_duration_seconds")
            .with_description("The reconcile duration in seconds.")
            .with_unit("s")
            .build();

        let pki_operator_validation_failures_total = meter
            .u64_counter("pki_operator_validation_failures_total")
            .with_description("The total number of objects that failed validation.")
            .build();

        Self {
            events_published_total: pki_operator_events_published_total,
            kubernetes_api_usage_total: pki_operator_kubernetes_api_usage_total,
            reconciliation_errors_total: pki_operator_reconciliation_errors_total,
            reconciliations_total: pki_operator_reconciliations_total,
            reconcile_duration_seconds: pki_operator_reconcile_duration_seconds,
            validation_failures_total: pki_operator_validation_failures_total,
        }
    }

    #[must_use]
    pub fn count_and_measure(&self, controller: &'static str) -> ControllerTimer {
        self.reconciliations_total
            .add(1, &[KeyValue::new("controller", controller)]);
        ControllerTimer {
            start: std::time::Instant::now(),
            metric: self.reconcile_duration_seconds.clone(),
            controller,
        }
    }

    pub fn event_published(&self, controller: &'static str, success: bool) {
        self.events_published_total.add(
            1,
            &[
                KeyValue::new("controller", controller),
                KeyValue::new("result", if success { "success" } else { "failure" }),
            ],
        );
    }

    pub fn reconcile_failure(&self, controller: &'static str, error: &Error) {
        let error = match error {
            Error::AllowedNames(_) => "allowed names",
            Error::Kube(_) => "kube",
            Error::MissingObjectKey(_) => "missing object key",
        };
        self.reconciliation_errors_total.add(
            1,
            &[
                KeyValue::new("controller", controller),
                KeyValue::new("error", error),
            ],
        );
    }

    pub fn validation_failure(&self, controller: &'static str) {
        self.validation_failures_total
            .add(1, &[KeyValue::new("controller", controller)]);
    }

    pub fn kubernetes_api_usage_count<R>(&self, verb: &'static str)
    where
        R: kube::Resource<DynamicType = ()>,
    {
        self.kubernetes_api_usage_total.add(
            1,
            &[
                KeyValue::new("kind", R::kind(&())),
                KeyValue::new("group", R::group(&())),
                KeyValue::new("verb", verb),
                KeyValue::new("version", R::version(&())),
            ],
        );
    }
}

pub struct ControllerTimer {
    start: std::time::Instant,
    metric: Histogram<f64>,
    controller: &'static str,
}

impl Drop for ControllerTimer {
    fn drop(&mut self) {
        self.metric.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("controller", self.controller)],
        );
    }
}
