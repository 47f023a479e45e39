//! Request metrics: counters for tool invocations, iterations and timeouts,
//! histograms for provider and tool latency.

use std::time::Duration;

use metrics::{counter, histogram};

pub mod labels {
    pub const RESULT_SUCCESS: &str = "success";
    pub const RESULT_ERROR: &str = "error";
}

pub struct Metrics;

impl Metrics {
    pub fn record_tool_call(tool: &str, result: &'static str) {
        counter!(
            "toolgate_tool_calls_total",
            "tool" => tool.to_string(),
            "result" => result,
        )
        .increment(1);
    }

    pub fn record_tool_duration(tool: &str, duration: Duration) {
        histogram!(
            "toolgate_tool_duration_seconds",
            "tool" => tool.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_tool_timeout(tool: &str) {
        counter!(
            "toolgate_tool_timeouts_total",
            "tool" => tool.to_string(),
        )
        .increment(1);
    }

    pub fn record_loop_iteration(model: &str) {
        counter!(
            "toolgate_loop_iterations_total",
            "model" => model.to_string(),
        )
        .increment(1);
    }

    pub fn record_budget_breach(reason: &'static str) {
        counter!(
            "toolgate_budget_breaches_total",
            "reason" => reason,
        )
        .increment(1);
    }

    pub fn record_provider_latency(provider: &str, duration: Duration) {
        histogram!(
            "toolgate_provider_latency_seconds",
            "provider" => provider.to_string(),
        )
        .record(duration.as_secs_f64());
    }
}
