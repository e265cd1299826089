//! Execution strategies

use crate::error::ExecError;
use crate::package::{package, LANGUAGE};
use crate::runner::{RunnerInput, SandboxAdapter};
use crate::types::{ExecutionRequest, ReducedState};
use crate::unpack::unpack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which way code is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Through an isolation runner, in a separate jailed interpreter
    Isolated,
    /// In this process, without any isolation
    Debug,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Isolated => write!(f, "isolated"),
            StrategyKind::Debug => write!(f, "debug"),
        }
    }
}

/// Runs code against a namespace and reduces what it left behind
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ReducedState, ExecError>;

    fn kind(&self) -> StrategyKind;
}

/// Packages code, runs it through the isolation runner and unpacks the frames
#[derive(Debug, Clone)]
pub struct JailedExecutor {
    adapter: SandboxAdapter,
    log_all_code: bool,
}

impl JailedExecutor {
    pub fn new(adapter: SandboxAdapter) -> Self {
        Self {
            adapter,
            log_all_code: false,
        }
    }

    pub fn with_code_logging(mut self, enabled: bool) -> Self {
        self.log_all_code = enabled;
        self
    }
}

#[async_trait]
impl Executor for JailedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ReducedState, ExecError> {
        let packaged = package(&request)?;

        if self.log_all_code {
            tracing::debug!(
                slug = request.slug_label(),
                code = %request.code,
                program = %packaged.program,
                stdin_len = packaged.stdin.len(),
                "Jailed program"
            );
        }

        let result = self
            .adapter
            .invoke(RunnerInput {
                language: LANGUAGE,
                program: &packaged.program,
                stdin: &packaged.stdin,
                files: &packaged.files,
                inline_files: &request.inline_files,
                slug: request.slug.as_deref(),
            })
            .await
            .map_err(ExecError::Runner)?;

        let state = unpack(result).inspect_err(|err| {
            if let ExecError::Protocol(reason) = err {
                tracing::error!(slug = request.slug_label(), %reason, "Jailed code broke the output protocol");
            }
        })?;

        if self.log_all_code {
            tracing::debug!(
                slug = request.slug_label(),
                payload_len = state.payload.as_bytes().len(),
                "Jailed result"
            );
        }
        Ok(state)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Isolated
    }
}
