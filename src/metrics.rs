//! Prometheus metrics for the agent loop and its tools
//!
//! All metrics live in the default global registry; [`encode_text`] renders
//! them in the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Loop
    // ─────────────────────────────────────────────────────────────────────────────

    /// Agent turns by final status ("success", "cycle_limit")
    pub static ref AGENT_TURNS: IntCounterVec = register_int_counter_vec!(
        "pipeagent_agent_turns_total",
        "Agent turns by final status",
        &["status"]
    ).expect("failed to register AGENT_TURNS metric");

    /// Model calls needed per turn
    pub static ref AGENT_CYCLES: Histogram = register_histogram!(
        "pipeagent_agent_cycles",
        "Model calls per agent turn",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0]
    ).expect("failed to register AGENT_CYCLES metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tools & Sandbox
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool dispatches by tool name and outcome ("ok", "error")
    pub static ref TOOL_CALLS: IntCounterVec = register_int_counter_vec!(
        "pipeagent_tool_calls_total",
        "Tool dispatches by tool and outcome",
        &["tool", "outcome"]
    ).expect("failed to register TOOL_CALLS metric");

    /// Sandbox executions by status ("success", "error", "timeout")
    pub static ref CODE_EXECUTIONS: IntCounterVec = register_int_counter_vec!(
        "pipeagent_code_executions_total",
        "Sandboxed code executions by status",
        &["status"]
    ).expect("failed to register CODE_EXECUTIONS metric");

    pub static ref CODE_EXECUTION_DURATION: Histogram = register_histogram!(
        "pipeagent_code_execution_duration_seconds",
        "Wall time of sandboxed code executions",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("failed to register CODE_EXECUTION_DURATION metric");

    /// Sandbox guests replaced, by reason ("timeout", "exited")
    pub static ref SANDBOX_RESTARTS: IntCounterVec = register_int_counter_vec!(
        "pipeagent_sandbox_restarts_total",
        "Sandbox guests replaced after a timeout or exit",
        &["reason"]
    ).expect("failed to register SANDBOX_RESTARTS metric");

    /// Model call latency by model id
    pub static ref MODEL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "pipeagent_model_call_duration_seconds",
        "Latency of model calls",
        &["model"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("failed to register MODEL_CALL_DURATION metric");

    /// Search hits returned, by provider tag ("google-cse", "fallback")
    pub static ref SEARCH_RESULTS: IntCounterVec = register_int_counter_vec!(
        "pipeagent_search_results_total",
        "Search hits returned by provider",
        &["provider"]
    ).expect("failed to register SEARCH_RESULTS metric");
}

/// Render every registered metric in the Prometheus text format
pub fn encode_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
