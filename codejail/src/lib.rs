//! codejail - run untrusted Python and recover a trust-reduced namespace
//!
//! Code runs either in a jailed interpreter behind an [`IsolationRunner`] or,
//! on development machines only, in-process on an embedded interpreter. Both
//! strategies hand back the same [`ReducedState`]: captured output, an opaque
//! payload, and two JSON-safe views of the globals the code left behind.

mod config;
#[cfg(feature = "embedded")]
mod debug;
mod error;
mod filter;
mod limits;
mod package;
mod reduce;
mod runner;
mod selector;
mod service;
mod stage;
mod strategy;
mod types;
mod unpack;
mod value;

pub use config::{CodejailConfig, ConfigError, ConfigResult, ENV_ALWAYS_UNSAFE, ENV_LOG_ALL_CODE};
#[cfg(feature = "embedded")]
pub use debug::DebugExecutor;
pub use error::ExecError;
pub use filter::reduce_to_json_safe;
pub use limits::RunnerLimits;
pub use package::{package, validate_inline_files, PackagedPayload, FRAME_MARKER, LANGUAGE};
pub use reduce::{
    display_rendering, encoded_len, full_rendering, python_dumps, reduce, reduce_namespace,
    ForeignValue, PayloadSink, PickleSink, Reduction, DISPLAY_LIMIT, RESERVED_NAMES,
};
pub use runner::{
    IsolationRunner, ProcessRunner, RunnerCommand, RunnerInput, SandboxAdapter, JAILED_CODE,
};
pub use selector::{SelectionError, StrategyDecision, StrategySelector};
pub use service::SafeExec;
pub use strategy::{Executor, JailedExecutor, StrategyKind};
pub use types::{
    ExecutionRequest, InlineFile, InvocationId, JsonNamespace, OpaquePayload, ReducedState,
    SandboxResult,
};
pub use unpack::unpack;
pub use value::{Namespace, Value};

/// Re-export common error types
pub type Result<T> = anyhow::Result<T>;
