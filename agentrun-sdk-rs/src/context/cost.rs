use crate::config::RunConfig;
use crate::error::{AgentError, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts model calls for one invocation and enforces the configured budget.
///
/// One instance exists per top-level invocation. Every context derived from
/// it holds the same instance, so the budget covers the whole agent tree.
#[derive(Debug, Default)]
pub struct InvocationCostManager {
    llm_calls: AtomicU64,
}

impl InvocationCostManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one model call. Fails once the count goes past a positive
    /// `max_llm_calls`; the count is incremented either way.
    pub fn increment_and_enforce_llm_calls_limit(&self, run_config: &RunConfig) -> Result<u64> {
        let calls = self.llm_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if run_config.enforces_llm_call_limit() && calls > run_config.max_llm_calls as u64 {
            return Err(AgentError::BudgetExceeded {
                limit: run_config.max_llm_calls,
            });
        }
        Ok(calls)
    }

    pub fn llm_calls(&self) -> u64 {
        self.llm_calls.load(Ordering::SeqCst)
    }
}
