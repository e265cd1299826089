//! Execution strategy selection

use crate::config::CodejailConfig;
#[cfg(feature = "embedded")]
use crate::debug::DebugExecutor;
use crate::package::LANGUAGE;
use crate::runner::{IsolationRunner, SandboxAdapter};
use crate::strategy::{Executor, JailedExecutor, StrategyKind};
use std::sync::Arc;
use thiserror::Error;

/// Strategy selection decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDecision {
    /// Selected strategy
    pub kind: StrategyKind,

    /// Reason for the selection
    pub reason: String,
}

impl StrategyDecision {
    pub fn is_unsafe(&self) -> bool {
        self.kind == StrategyKind::Debug
    }
}

/// Errors during strategy selection
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("In-process execution selected ({0}) but the embedded interpreter is not compiled in")]
    DebugUnavailable(String),
}

/// Picks the strategy once, from the force-debug override and the runner
pub struct StrategySelector {
    always_be_unsafe: bool,
    log_all_code: bool,
}

impl StrategySelector {
    pub fn new(config: &CodejailConfig) -> Self {
        Self {
            always_be_unsafe: config.always_be_unsafe,
            log_all_code: config.log_all_code,
        }
    }

    /// Decide between the jailed runner and in-process execution
    pub fn decide(&self, runner: &dyn IsolationRunner) -> StrategyDecision {
        if self.always_be_unsafe {
            return StrategyDecision {
                kind: StrategyKind::Debug,
                reason: "In-process execution forced by configuration".to_string(),
            };
        }
        if !runner.is_configured(LANGUAGE) {
            return StrategyDecision {
                kind: StrategyKind::Debug,
                reason: format!(
                    "Runner '{}' has no {} interpreter configured",
                    runner.name(),
                    LANGUAGE
                ),
            };
        }
        StrategyDecision {
            kind: StrategyKind::Isolated,
            reason: format!("Runner '{}' is configured for {}", runner.name(), LANGUAGE),
        }
    }

    /// Create the executor for a decision
    pub fn create_executor(
        &self,
        decision: &StrategyDecision,
        runner: Arc<dyn IsolationRunner>,
    ) -> Result<Box<dyn Executor>, SelectionError> {
        let executor: Box<dyn Executor> = match decision.kind {
            StrategyKind::Isolated => Box::new(
                JailedExecutor::new(SandboxAdapter::new(runner))
                    .with_code_logging(self.log_all_code),
            ),

            #[cfg(feature = "embedded")]
            StrategyKind::Debug => {
                Box::new(DebugExecutor::new().with_code_logging(self.log_all_code))
            }

            #[cfg(not(feature = "embedded"))]
            StrategyKind::Debug => {
                return Err(SelectionError::DebugUnavailable(decision.reason.clone()))
            }
        };

        Ok(executor)
    }
}
