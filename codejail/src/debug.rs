//! In-process executor on an embedded interpreter.
//!
//! Provides no isolation whatsoever. It exists for development machines that
//! have no jailed interpreter configured. Every step that touches process
//! state is a guard, so the working directory, `sys.path` and `sys.stdout`
//! are restored on every exit path, and the process-wide lock keeps two
//! invocations from ever overlapping.

use crate::error::ExecError;
use crate::filter::reduce_to_json_safe;
use crate::package::validate_inline_files;
use crate::reduce::{reduce, ForeignValue, PayloadSink};
use crate::stage::{stage_paths, write_inline_files};
use crate::strategy::{Executor, StrategyKind};
use crate::types::{ExecutionRequest, JsonNamespace, OpaquePayload, ReducedState};
use async_trait::async_trait;
use pyo3::prelude::*;
use pyo3::types::{IntoPyDict, PyBytes, PyDict, PyList, PyString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

static DEBUG_LOCK: Mutex<()> = Mutex::new(());

/// Runs code directly in this process
#[derive(Debug, Clone, Default)]
pub struct DebugExecutor {
    log_all_code: bool,
}

impl DebugExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code_logging(mut self, enabled: bool) -> Self {
        self.log_all_code = enabled;
        self
    }
}

#[async_trait]
impl Executor for DebugExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ReducedState, ExecError> {
        tracing::warn!(
            slug = request.slug_label(),
            "Running code in-process without any isolation"
        );
        if self.log_all_code {
            tracing::debug!(slug = request.slug_label(), code = %request.code, "Unjailed code");
        }

        tokio::task::spawn_blocking(move || run_in_process(&request))
            .await
            .map_err(|e| ExecError::Interpreter(format!("Debug execution task failed: {}", e)))?
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Debug
    }
}

fn run_in_process(request: &ExecutionRequest) -> Result<ReducedState, ExecError> {
    validate_inline_files(&request.inline_files)?;
    let globals = reduce_to_json_safe(&request.namespace);

    let _lock = DEBUG_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let scratch = tempfile::Builder::new()
        .prefix("codejail-debug-")
        .tempdir()?;
    stage_paths(scratch.path(), &request.files)?;
    write_inline_files(scratch.path(), &request.inline_files)?;

    let _cwd = WorkingDirGuard::enter(scratch.path())?;

    Python::with_gil(|py| execute_with_gil(py, request, &globals))
}

fn execute_with_gil(
    py: Python<'_>,
    request: &ExecutionRequest,
    globals: &JsonNamespace,
) -> Result<ReducedState, ExecError> {
    let g_dict = to_py_dict(py, globals).map_err(interpreter)?;

    let sys = py.import("sys").map_err(interpreter)?;
    let _path = SearchPathGuard::extend(sys, &request.python_path).map_err(interpreter)?;
    let capture = StdoutCapture::install(py, sys).map_err(interpreter)?;

    let outcome = py.run(&request.code, Some(g_dict), None);
    let output = capture.output().map_err(interpreter)?;
    drop(capture);

    outcome.map_err(|err| ExecError::Execution(describe(py, &err)))?;

    let entries: Vec<(String, &PyAny)> = g_dict
        .iter()
        .filter_map(|(name, value)| Some((name.extract::<String>().ok()?, value)))
        .collect();
    let sink = PyPickleSink::new(py).map_err(interpreter)?;
    let reduction = reduce(
        entries.iter().map(|(name, value)| (name.as_str(), *value)),
        sink,
    );

    Ok(ReducedState {
        output,
        payload: reduction.payload,
        display: reduction.display,
        full: reduction.full,
    })
}

/// Build interpreter globals from already-filtered JSON
fn to_py_dict<'py>(py: Python<'py>, globals: &JsonNamespace) -> PyResult<&'py PyDict> {
    let encoded = serde_json::to_string(globals)
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
    let decoded = py.import("json")?.call_method1("loads", (encoded,))?;
    Ok(decoded.downcast::<PyDict>()?)
}

/// `Kind: message`, as the caller sees a failed execution
fn describe(py: Python<'_>, err: &PyErr) -> String {
    let kind = err
        .get_type(py)
        .name()
        .map(str::to_string)
        .unwrap_or_else(|_| "Exception".to_string());
    format!("{}: {}", kind, err.value(py))
}

fn interpreter(err: PyErr) -> ExecError {
    ExecError::Interpreter(err.to_string())
}

struct WorkingDirGuard {
    previous: PathBuf,
}

impl WorkingDirGuard {
    fn enter(dir: &Path) -> std::io::Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        Ok(Self { previous })
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            tracing::error!(
                error = %e,
                dir = %self.previous.display(),
                "Failed to restore working directory"
            );
        }
    }
}

/// Restores a copy of `sys.path` taken before it was extended
struct SearchPathGuard<'py> {
    sys: &'py PyModule,
    saved: &'py PyList,
}

impl<'py> SearchPathGuard<'py> {
    fn extend(sys: &'py PyModule, entries: &[PathBuf]) -> PyResult<Self> {
        let path: &PyList = sys.getattr("path")?.downcast()?;
        let saved = PyList::new(sys.py(), path.iter());
        for entry in entries {
            path.append(PyString::new(sys.py(), &entry.to_string_lossy()))?;
        }
        Ok(Self { sys, saved })
    }
}

impl Drop for SearchPathGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sys.setattr("path", self.saved) {
            tracing::error!(error = %e, "Failed to restore sys.path");
        }
    }
}

/// Points `sys.stdout` at a string buffer until dropped
struct StdoutCapture<'py> {
    sys: &'py PyModule,
    previous: &'py PyAny,
    buffer: &'py PyAny,
}

impl<'py> StdoutCapture<'py> {
    fn install(py: Python<'py>, sys: &'py PyModule) -> PyResult<Self> {
        let previous = sys.getattr("stdout")?;
        let buffer = py.import("io")?.getattr("StringIO")?.call0()?;
        sys.setattr("stdout", buffer)?;
        Ok(Self {
            sys,
            previous,
            buffer,
        })
    }

    fn output(&self) -> PyResult<String> {
        self.buffer.call_method0("getvalue")?.extract()
    }
}

impl Drop for StdoutCapture<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sys.setattr("stdout", self.previous) {
            tracing::error!(error = %e, "Failed to restore sys.stdout");
        }
    }
}

impl ForeignValue for PyAny {
    fn to_json(&self) -> Option<serde_json::Value> {
        let py = self.py();
        let kwargs = [("allow_nan", false)].into_py_dict(py);
        let encoded: String = py
            .import("json")
            .and_then(|json| json.call_method("dumps", (self,), Some(kwargs)))
            .and_then(|encoded| encoded.extract())
            .ok()?;
        serde_json::from_str(&encoded).ok()
    }

    fn to_text(&self) -> Option<String> {
        self.str().ok().map(|text| text.to_string_lossy().into_owned())
    }

    fn type_label(&self) -> Option<String> {
        self.get_type()
            .str()
            .ok()
            .map(|text| text.to_string_lossy().into_owned())
    }
}

/// Pickles, with the interpreter's own `pickle`, whatever it can
struct PyPickleSink<'py> {
    pickle: &'py PyModule,
    kept: &'py PyDict,
}

impl<'py> PyPickleSink<'py> {
    fn new(py: Python<'py>) -> PyResult<Self> {
        Ok(Self {
            pickle: py.import("pickle")?,
            kept: PyDict::new(py),
        })
    }
}

impl PayloadSink<PyAny> for PyPickleSink<'_> {
    fn offer(&mut self, name: &str, value: &PyAny) -> bool {
        self.pickle.call_method1("dumps", (value,)).is_ok() && self.kept.set_item(name, value).is_ok()
    }

    fn finish(self) -> OpaquePayload {
        let pickled = self
            .pickle
            .call_method1("dumps", (self.kept,))
            .and_then(|bytes| Ok(bytes.downcast::<PyBytes>()?.as_bytes().to_vec()));
        match pickled {
            Ok(bytes) => OpaquePayload::new(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize payload; sending none");
                OpaquePayload::default()
            }
        }
    }
}
