use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    validation_failures_total: AtomicU64,
    inferences_total: AtomicU64,
    mock_predictions_total: AtomicU64,
    model_failures_total: AtomicU64,
    dosage_checks_total: AtomicU64,
    dosage_blocked_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub validation_failures_total: u64,
    pub inferences_total: u64,
    pub mock_predictions_total: u64,
    pub model_failures_total: u64,
    pub dosage_checks_total: u64,
    pub dosage_blocked_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("leafcare_requests_total").increment(1);
    }

    pub fn inc_validation_failure(&self, code: &'static str) {
        self.validation_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("leafcare_validation_failures_total", "code" => code).increment(1);
    }

    /// `mock` marks predictions served by the placeholder backend.
    pub fn inc_inference(&self, mock: bool) {
        self.inferences_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("leafcare_inferences_total").increment(1);
        if mock {
            self.mock_predictions_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("leafcare_mock_predictions_total").increment(1);
        }
    }

    pub fn inc_model_failure(&self) {
        self.model_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("leafcare_model_failures_total").increment(1);
    }

    pub fn record_dosage_check(&self, blocked: bool) {
        self.dosage_checks_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("leafcare_dosage_checks_total").increment(1);
        if blocked {
            self.dosage_blocked_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("leafcare_dosage_blocked_total").increment(1);
        }
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("leafcare_request_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            validation_failures_total: self.validation_failures_total.load(Ordering::Relaxed),
            inferences_total: self.inferences_total.load(Ordering::Relaxed),
            mock_predictions_total: self.mock_predictions_total.load(Ordering::Relaxed),
            model_failures_total: self.model_failures_total.load(Ordering::Relaxed),
            dosage_checks_total: self.dosage_checks_total.load(Ordering::Relaxed),
            dosage_blocked_total: self.dosage_blocked_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,leafcare_agents=info,leafcare_ml=info",
                service_name
            ))
        });

        let _ = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .try_init();
    });
}
