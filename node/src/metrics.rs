//! # Prometheus Metrics
//!
//! Operational counters for the API server, rendered at `GET /metrics`.
//! Everything lives in a dedicated [`prometheus::Registry`] prefixed `bftx`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use bftx_protocol::ErrorKind;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Operations served, by operation name.
    pub operations_total: IntCounterVec,
    /// Failed operations, by operation name and error kind.
    pub failures_total: IntCounterVec,
    /// Stored transactions as of the last `/total` call.
    pub stored_transactions: IntGauge,
    /// Round trip of `broadcast_tx_sync`, local commit included.
    pub broadcast_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bftx".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Transaction operations served"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new("failures_total", "Transaction operations that failed"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let stored_transactions = IntGauge::new(
            "stored_transactions",
            "Transactions in the local store at the last count",
        )?;
        registry.register(Box::new(stored_transactions.clone()))?;

        let broadcast_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "broadcast_latency_seconds",
                "Broadcast latency in seconds, local commit included",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(broadcast_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            failures_total,
            stored_transactions,
            broadcast_latency_seconds,
        })
    }

    pub fn record(&self, operation: &str, failure: Option<ErrorKind>) {
        self.operations_total.with_label_values(&[operation]).inc();
        if let Some(kind) = failure {
            self.failures_total
                .with_label_values(&[operation, kind.as_str()])
                .inc();
        }
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_labelled_by_kind() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record("sign", None);
        metrics.record("sign", Some(ErrorKind::InvalidState));

        let text = metrics.encode().unwrap();
        assert!(text.contains("bftx_operations_total{operation=\"sign\"} 2"));
        assert!(text.contains("bftx_failures_total{kind=\"invalid_state\",operation=\"sign\"} 1"));
    }
}
