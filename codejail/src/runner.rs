//! Isolation runner trait and the sandbox invocation adapter

mod process;

use crate::types::{InlineFile, SandboxResult};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub use process::{ProcessRunner, RunnerCommand, JAILED_CODE};

/// One invocation handed to an [`IsolationRunner`]
#[derive(Debug, Clone, Copy)]
pub struct RunnerInput<'a> {
    /// Interpreter to use, e.g. `python`
    pub language: &'a str,

    /// Program text to run
    pub program: &'a str,

    /// Bytes fed to the program's stdin
    pub stdin: &'a [u8],

    /// Files and directories copied (by base name) next to the program
    pub files: &'a [PathBuf],

    /// Files created next to the program from in-memory contents
    pub inline_files: &'a [InlineFile],

    /// Caller-meaningful label for log messages
    pub slug: Option<&'a str>,
}

/// Runs a program in an isolated interpreter.
///
/// Implementations own confinement entirely: resource limits, privilege
/// separation and cleanup of whatever they stage.
#[async_trait]
pub trait IsolationRunner: Send + Sync {
    /// Whether `language` can be run at all
    fn is_configured(&self, language: &str) -> bool;

    /// Run the program to completion and report its status and output
    async fn run(&self, input: RunnerInput<'_>) -> Result<SandboxResult>;

    /// Get runner name
    fn name(&self) -> &str;
}

/// Thin pass-through to the configured [`IsolationRunner`]
#[derive(Clone)]
pub struct SandboxAdapter {
    runner: Arc<dyn IsolationRunner>,
}

impl SandboxAdapter {
    pub fn new(runner: Arc<dyn IsolationRunner>) -> Self {
        Self { runner }
    }

    /// Invoke the runner; its result or failure is returned unchanged
    pub async fn invoke(&self, input: RunnerInput<'_>) -> Result<SandboxResult> {
        self.runner.run(input).await
    }

    pub fn runner(&self) -> &Arc<dyn IsolationRunner> {
        &self.runner
    }
}

impl std::fmt::Debug for SandboxAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxAdapter")
            .field("runner", &self.runner.name())
            .finish()
    }
}
