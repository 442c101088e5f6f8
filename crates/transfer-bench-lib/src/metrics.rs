// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the transfer benchmark.
//!
//! These give a live view of the load while a run is in progress; the CSV
//! stores remain the source of truth for the per-run summaries.

use crate::types::{ConcurrencyMode, Outcome};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder, exponential_buckets,
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
};
use std::time::Duration;

/// Counter for finished transfers, by mode and outcome.
pub static TRANSFER_BENCH_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "transfer_bench_outcomes_total",
        "Total number of finished transfer attempts by outcome",
        &["mode", "outcome"]
    )
    .unwrap()
});

/// Histogram for transfer latency in seconds, connection setup included.
/// Buckets range from 1ms to ~33 seconds (exponential).
pub static TRANSFER_BENCH_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "transfer_bench_latency_seconds",
        "Transfer latency from connect to release in seconds",
        &["mode"],
        exponential_buckets(0.001, 2.0, 16).unwrap()
    )
    .unwrap()
});

/// Gauge for transfers currently holding a worker slot.
pub static TRANSFER_BENCH_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "transfer_bench_in_flight",
        "Number of transfers currently executing"
    )
    .unwrap()
});

/// Counter for connection attempts that were retried after a transient failure.
pub static TRANSFER_BENCH_CONNECT_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "transfer_bench_connect_retries_total",
        "Total number of retried connection attempts"
    )
    .unwrap()
});

/// Records the outcome and latency of one transfer.
pub fn record_outcome(mode: ConcurrencyMode, outcome: &Outcome, latency: Duration) {
    TRANSFER_BENCH_OUTCOMES
        .with_label_values(&[mode.as_str(), outcome.label()])
        .inc();
    TRANSFER_BENCH_LATENCY_SECONDS
        .with_label_values(&[mode.as_str()])
        .observe(latency.as_secs_f64());
}

pub fn record_connect_retry() {
    TRANSFER_BENCH_CONNECT_RETRIES.inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_text() -> anyhow::Result<String> {
    let mut buffer = vec![];
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome() {
        record_outcome(
            ConcurrencyMode::Optimistic,
            &Outcome::Completed,
            Duration::from_millis(12),
        );
        record_outcome(
            ConcurrencyMode::Optimistic,
            &Outcome::Aborted {
                cause: "could not serialize access".into(),
            },
            Duration::from_millis(40),
        );
        assert!(
            TRANSFER_BENCH_OUTCOMES
                .with_label_values(&["opt", "aborted"])
                .get()
                >= 1
        );
    }

    #[test]
    fn test_gather_text_contains_registered_metrics() {
        record_connect_retry();
        let text = gather_text().unwrap();
        assert!(text.contains("transfer_bench_connect_retries_total"));
    }
}
