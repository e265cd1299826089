//! Safe execution service - main entry point

use crate::config::CodejailConfig;
use crate::error::ExecError;
use crate::runner::IsolationRunner;
use crate::selector::{SelectionError, StrategyDecision, StrategySelector};
use crate::strategy::{Executor, StrategyKind};
use crate::types::{ExecutionRequest, InvocationId, ReducedState};
use std::sync::Arc;

/// Executes untrusted code with the strategy chosen at construction
pub struct SafeExec {
    executor: Box<dyn Executor>,
    decision: StrategyDecision,
}

impl SafeExec {
    /// Build from configuration, running code through its configured interpreters
    pub fn from_config(config: &CodejailConfig) -> Result<Self, SelectionError> {
        Self::with_runner(config, Arc::new(config.process_runner()))
    }

    /// Build around a custom isolation runner
    pub fn with_runner(
        config: &CodejailConfig,
        runner: Arc<dyn IsolationRunner>,
    ) -> Result<Self, SelectionError> {
        let selector = StrategySelector::new(config);
        let decision = selector.decide(runner.as_ref());
        let executor = selector.create_executor(&decision, runner)?;

        if decision.is_unsafe() {
            tracing::warn!(reason = %decision.reason, "Jailed code will run WITHOUT isolation");
        } else {
            tracing::info!(reason = %decision.reason, "Jailed code will run isolated");
        }

        Ok(Self { executor, decision })
    }

    /// Wrap an already-built executor
    pub fn with_executor(executor: Box<dyn Executor>, reason: impl Into<String>) -> Self {
        let decision = StrategyDecision {
            kind: executor.kind(),
            reason: reason.into(),
        };
        Self { executor, decision }
    }

    /// Execute code and recover the trust-reduced state it left behind
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ReducedState, ExecError> {
        self.execute_with_id(InvocationId::new(), request).await
    }

    /// Execute with a specific ID for log correlation
    pub async fn execute_with_id(
        &self,
        id: InvocationId,
        request: ExecutionRequest,
    ) -> Result<ReducedState, ExecError> {
        tracing::info!(
            invocation_id = %id,
            slug = request.slug_label(),
            strategy = %self.decision.kind,
            code_len = request.code.len(),
            "Executing code"
        );

        let result = self.executor.execute(request).await;

        match &result {
            Ok(state) => tracing::debug!(
                invocation_id = %id,
                output_len = state.output.len(),
                payload_len = state.payload.len(),
                display_names = state.display.len(),
                "Execution finished"
            ),
            Err(e) => tracing::info!(invocation_id = %id, error = %e, "Execution failed"),
        }

        result
    }

    pub fn strategy(&self) -> StrategyKind {
        self.decision.kind
    }

    pub fn decision(&self) -> &StrategyDecision {
        &self.decision
    }
}

impl std::fmt::Debug for SafeExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeExec")
            .field("decision", &self.decision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ProcessRunner, RunnerCommand};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        async fn execute(&self, request: ExecutionRequest) -> Result<ReducedState, ExecError> {
            Ok(ReducedState {
                output: request.code,
                ..Default::default()
            })
        }

        fn kind(&self) -> StrategyKind {
            StrategyKind::Isolated
        }
    }

    #[tokio::test]
    async fn test_execute_delegates_to_executor() {
        let service = SafeExec::with_executor(Box::new(Echo), "test");
        let state = service
            .execute(ExecutionRequest::new("print(1)").with_slug("unit"))
            .await
            .unwrap();
        assert_eq!(state.output, "print(1)");
        assert_eq!(service.strategy(), StrategyKind::Isolated);
        assert_eq!(service.decision().reason, "test");
    }

    #[test]
    fn test_from_config_selects_isolated_when_configured() {
        let config = CodejailConfig::default()
            .with_runner("python", RunnerCommand::new("/usr/bin/python3"));
        let service = SafeExec::from_config(&config).unwrap();
        assert_eq!(service.strategy(), StrategyKind::Isolated);
    }

    #[cfg(feature = "embedded")]
    #[test]
    fn test_missing_interpreter_selects_debug() {
        let service =
            SafeExec::with_runner(&CodejailConfig::default(), Arc::new(ProcessRunner::new()))
                .unwrap();
        assert_eq!(service.strategy(), StrategyKind::Debug);
    }

    #[cfg(not(feature = "embedded"))]
    #[test]
    fn test_missing_interpreter_without_embedded_is_an_error() {
        let result =
            SafeExec::with_runner(&CodejailConfig::default(), Arc::new(ProcessRunner::new()));
        assert!(matches!(result, Err(SelectionError::DebugUnavailable(_))));
    }
}
