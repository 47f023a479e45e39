//! Run budget: iteration cap, wall-clock deadline, per-tool timeout.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::GatewayConfig;

#[derive(Debug, Clone)]
pub struct RunBudget {
    pub max_iterations: u32,
    pub deadline: Instant,
    pub per_tool_timeout: Duration,
    pub max_output_tokens: Option<u64>,
}

impl RunBudget {
    pub fn from_config(config: &GatewayConfig, max_output_tokens: Option<u64>) -> Self {
        Self {
            max_iterations: config.max_iterations,
            deadline: Instant::now() + config.max_duration(),
            per_tool_timeout: config.per_tool_timeout(),
            max_output_tokens,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Check the guards before a provider call. `iterations` counts calls
    /// already made.
    pub fn check(&self, iterations: u32) -> Result<(), BudgetBreach> {
        if iterations >= self.max_iterations {
            return Err(BudgetBreach::MaxToolCalls);
        }
        if self.expired() {
            return Err(BudgetBreach::Timeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetBreach {
    MaxToolCalls,
    Timeout,
}

impl BudgetBreach {
    /// Reason string carried in `incomplete_details`.
    pub fn reason(&self) -> &'static str {
        match self {
            BudgetBreach::MaxToolCalls => "max_tool_calls",
            BudgetBreach::Timeout => "timeout",
        }
    }
}
