//! Prometheus metrics
//!
//! Registered once at first use; scraped through `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, HistogramVec, IntGauge, TextEncoder, register_counter_vec,
    register_histogram_vec, register_int_gauge,
};

lazy_static! {
    /// Completed requests by endpoint and outcome code ("ok" or an error code).
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "agent_proxy_requests_total",
        "Completed HTTP requests",
        &["endpoint", "outcome"]
    ).expect("failed to register REQUESTS_TOTAL");

    /// Wall-clock duration of agent runs, including tool turns.
    pub static ref RUN_DURATION: HistogramVec = register_histogram_vec!(
        "agent_proxy_run_duration_seconds",
        "End-to-end agent run duration",
        &["model"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register RUN_DURATION");

    /// Tool executions by tool name and outcome.
    pub static ref TOOL_EXECUTIONS: CounterVec = register_counter_vec!(
        "agent_proxy_tool_executions_total",
        "Tool executions by name and outcome",
        &["tool", "outcome"]
    ).expect("failed to register TOOL_EXECUTIONS");

    /// Agent runs currently holding a session.
    pub static ref ACTIVE_RUNS: IntGauge = register_int_gauge!(
        "agent_proxy_active_runs",
        "Agent runs currently in flight"
    ).expect("failed to register ACTIVE_RUNS");
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_includes_registered_metrics() {
        REQUESTS_TOTAL
            .with_label_values(&["/v1/chat/completions", "ok"])
            .inc();
        let text = gather();
        assert!(text.contains("agent_proxy_requests_total"));
    }
}
