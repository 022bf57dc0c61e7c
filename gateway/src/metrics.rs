// HTTP-side metrics for the gateway

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub static METRICS: Lazy<GatewayMetrics> =
    Lazy::new(|| GatewayMetrics::new().expect("Failed to create gateway metrics"));

pub struct GatewayMetrics {
    pub http_requests_total: IntCounterVec,
    pub http_errors_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    registry: Registry,
}

impl GatewayMetrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("gateway_http_requests_total", "HTTP requests by endpoint"),
            &["endpoint"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_errors_total = IntCounterVec::new(
            Opts::new("gateway_http_errors_total", "HTTP error responses by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(http_errors_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "gateway_http_request_duration_seconds",
                "HTTP request latencies by endpoint",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            http_requests_total,
            http_errors_total,
            http_request_duration_seconds,
            registry,
        })
    }

    pub fn track_request(&self, endpoint: &str) {
        self.http_requests_total.with_label_values(&[endpoint]).inc();
    }

    pub fn track_error(&self, reason: &str) {
        self.http_errors_total.with_label_values(&[reason]).inc();
    }

    pub fn export(&self) -> prometheus::Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_export() {
        METRICS.track_request("/api/dashboard");
        METRICS.track_error("InsufficientStock");
        let text = METRICS.export().unwrap();
        assert!(text.contains("gateway_http_requests_total"));
    }
}
