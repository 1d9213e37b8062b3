//! Prometheus metrics for the aggregation service.
//!
//! The `/metrics` endpoint is unauthenticated for scraping; restrict it to
//! the monitoring network at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Live path
pub static OBSERVATIONS_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_observations_total",
        "Uplink observation messages processed by the live path",
    )
    .expect("metric creation failed")
});

pub static CELLS_UPDATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_cells_updated_total",
        "Grid cells created or updated by the live path",
    )
    .expect("metric creation failed")
});

pub static REPORTS_DISCARDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_reports_discarded_total",
        "Reception reports filtered out before reaching the grid",
    )
    .expect("metric creation failed")
});

pub static REPORTS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_reports_failed_total",
        "Reception reports dropped on store failures",
    )
    .expect("metric creation failed")
});

pub static LIVE_MESSAGE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gridcover_live_message_duration_seconds",
            "Time to fold one uplink message into the grid",
        )
        .buckets(vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
    )
    .expect("metric creation failed")
});

// Reprocess path
pub static RELOCATIONS_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_relocations_total",
        "Gateway relocation events processed",
    )
    .expect("metric creation failed")
});

pub static CELLS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_cells_deleted_total",
        "Grid cells deleted ahead of antenna rebuilds",
    )
    .expect("metric creation failed")
});

pub static HISTORY_ROWS_REPLAYED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_history_rows_total",
        "Raw historical observations replayed during rebuilds",
    )
    .expect("metric creation failed")
});

pub static CELLS_REBUILT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gridcover_cells_rebuilt_total",
        "Grid cells written by antenna rebuilds",
    )
    .expect("metric creation failed")
});

pub static REBUILD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gridcover_rebuild_duration_seconds",
            "Time to rebuild all antennas of one relocated gateway",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 1800.0]),
    )
    .expect("metric creation failed")
});

// Transport edge
pub static MALFORMED_MESSAGES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gridcover_malformed_messages_total",
            "Undecodable bus payloads dropped, by stream",
        ),
        &["stream"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(OBSERVATIONS_PROCESSED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CELLS_UPDATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPORTS_DISCARDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPORTS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LIVE_MESSAGE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RELOCATIONS_PROCESSED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CELLS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(HISTORY_ROWS_REPLAYED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CELLS_REBUILT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REBUILD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MALFORMED_MESSAGES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_idempotently() {
        register_metrics();
        register_metrics();
        OBSERVATIONS_PROCESSED.inc();
        assert!(REGISTRY.gather().iter().any(|family| {
            family.get_name() == "gridcover_observations_total"
        }));
    }
}
