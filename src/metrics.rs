//! Prometheus metrics for the agent core
//!
//! Collectors live in the default registry. Serving them over HTTP is the
//! host's business; [`gather_text`] renders them in the text exposition
//! format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Conversation Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Conversation turns handled by `process_query`.
    ///
    /// Labels:
    /// - outcome: "success" or "error"
    pub static ref AGENT_QUERIES: CounterVec = register_counter_vec!(
        "nextshell_agent_queries_total",
        "Conversation turns processed by the agent",
        &["outcome"]
    ).expect("failed to register AGENT_QUERIES metric");

    /// Context store failures that were logged and absorbed.
    ///
    /// Labels:
    /// - op: "load" or "save"
    pub static ref PERSISTENCE_FAILURES: CounterVec = register_counter_vec!(
        "nextshell_persistence_failures_total",
        "Context store failures absorbed by the agent",
        &["op"]
    ).expect("failed to register PERSISTENCE_FAILURES metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Completion Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Completion backend calls.
    ///
    /// Labels:
    /// - backend: "openai", "ollama", "simulated", ...
    /// - outcome: "success" or "error"
    pub static ref COMPLETION_CALLS: CounterVec = register_counter_vec!(
        "nextshell_completion_calls_total",
        "Completion backend calls",
        &["backend", "outcome"]
    ).expect("failed to register COMPLETION_CALLS metric");

    /// Completion backend latency in seconds.
    pub static ref COMPLETION_CALL_TIME: HistogramVec = register_histogram_vec!(
        "nextshell_completion_call_seconds",
        "Completion backend call latency",
        &["backend"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("failed to register COMPLETION_CALL_TIME metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Command Execution Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Commands run by the executor.
    ///
    /// Labels:
    /// - status: "success", "failure", "signal", "timeout", "cancelled", "error"
    pub static ref COMMAND_EXECUTIONS: CounterVec = register_counter_vec!(
        "nextshell_command_executions_total",
        "Commands run by the command executor",
        &["status"]
    ).expect("failed to register COMMAND_EXECUTIONS metric");

    /// Wall-clock time from spawn to exit, in seconds.
    pub static ref COMMAND_DURATION: Histogram = register_histogram!(
        "nextshell_command_duration_seconds",
        "Command execution duration",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    ).expect("failed to register COMMAND_DURATION metric");
}

/// Render every registered metric in Prometheus text format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
