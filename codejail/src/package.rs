//! Code packager: the far-side program and its stdin payload

use crate::error::ExecError;
use crate::reduce::{is_reserved, DISPLAY_LIMIT, RESERVED_NAMES};
use crate::types::{ExecutionRequest, InlineFile};
use crate::value::{Namespace, Value};
use serde_pickle::Value as PickleValue;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Language the isolation runner is asked for
pub const LANGUAGE: &str = "python";

/// Starts the header line in front of every output segment
pub const FRAME_MARKER: &str = "__CODEJAIL_FRAME__";

/// Everything one isolated invocation needs
#[derive(Debug, Clone)]
pub struct PackagedPayload {
    /// Program text run by the jailed interpreter
    pub program: String,

    /// Pickled `(code, globals)` fed to the program on stdin
    pub stdin: Vec<u8>,

    /// Files and directories to copy next to the program
    pub files: Vec<PathBuf>,
}

const PREAMBLE: &str = r#"import base64
import io
import json
import pickle
import sys

code, g_dict = pickle.load(sys.stdin.buffer)
"#;

const EXECUTE_AND_REDUCE: &str = r#"
_captured = io.StringIO()
sys.stdout = _captured
try:
    exec(code, g_dict)
finally:
    sys.stdout = sys.__stdout__

_reserved = frozenset(@RESERVED@)
_limit = @LIMIT@
_missing = object()


def _pickleable(v):
    try:
        pickle.dumps(v)
    except Exception:
        return False
    return True


def _render(v, bounded):
    try:
        encoded = json.dumps(v, allow_nan=False)
    except Exception:
        encoded = None
    if encoded is not None and (not bounded or len(encoded) <= _limit):
        return json.loads(encoded)
    try:
        text = str(v)
    except Exception:
        text = None
    if text is not None:
        if len(text) > 0 and (not bounded or len(text) < _limit):
            return text
        return _missing
    try:
        return str(type(v))
    except Exception:
        return _missing


_payload = {}
_display = {}
_full = {}
for _name, _value in list(g_dict.items()):
    if _name in _reserved:
        continue
    if _pickleable(_value):
        _payload[_name] = _value
    _shown = _render(_value, True)
    if _shown is not _missing:
        _display[_name] = _shown
    _kept = _render(_value, False)
    if _kept is not _missing:
        _full[_name] = _kept

try:
    _blob = pickle.dumps(_payload)
except Exception:
    _blob = pickle.dumps({})


def _frame(data):
    out = sys.__stdout__.buffer
    out.write(b"@MARKER@ %d\n" % len(data))
    out.write(data)


sys.__stdout__.flush()
_frame(_captured.getvalue().encode("utf-8", "backslashreplace"))
_frame(base64.b64encode(_blob))
_frame(json.dumps(_display).encode("utf-8"))
_frame(json.dumps(_full).encode("utf-8"))
sys.__stdout__.buffer.flush()
"#;

/// Reject inline file names that are not plain, flat names
pub fn validate_inline_files(files: &[InlineFile]) -> Result<(), ExecError> {
    for file in files {
        let name = file.name.as_str();
        if name.is_empty() || name == "." || name == ".." {
            return Err(ExecError::packaging(format!(
                "Inline file name {:?} is not a file name",
                name
            )));
        }
        if name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR) {
            return Err(ExecError::packaging(format!(
                "Inline file name {:?} must not contain a path separator",
                name
            )));
        }
    }
    Ok(())
}

/// Build the program, stdin payload and staging list for `request`
pub fn package(request: &ExecutionRequest) -> Result<PackagedPayload, ExecError> {
    validate_inline_files(&request.inline_files)?;

    let inline_names: HashSet<&str> = request
        .inline_files
        .iter()
        .map(|file| file.name.as_str())
        .collect();

    let mut files = request.files.clone();
    let mut program = String::from(PREAMBLE);

    for entry in &request.python_path {
        let base = entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ExecError::packaging(format!(
                    "Search path entry {} has no base name",
                    entry.display()
                ))
            })?;
        program.push_str(&format!("sys.path.append({})\n", python_literal(&base)));
        if !inline_names.contains(base.as_str()) {
            files.push(entry.clone());
        }
    }

    let reserved = RESERVED_NAMES
        .iter()
        .map(|name| python_literal(name))
        .collect::<Vec<_>>()
        .join(", ");
    program.push_str(
        &EXECUTE_AND_REDUCE
            .replace("@RESERVED@", &format!("[{}]", reserved))
            .replace("@LIMIT@", &DISPLAY_LIMIT.to_string())
            .replace("@MARKER@", FRAME_MARKER),
    );

    let stdin = encode_stdin(&request.code, &request.namespace)?;

    Ok(PackagedPayload {
        program,
        stdin,
        files,
    })
}

/// Pickle `(code, globals)`, leaving out reserved names
fn encode_stdin(code: &str, namespace: &Namespace) -> Result<Vec<u8>, ExecError> {
    let mut globals = BTreeMap::new();
    for (name, value) in namespace {
        if is_reserved(name) {
            tracing::debug!(name = %name, "Not sending reserved global");
            continue;
        }
        let pickled = value.to_pickle().ok_or_else(|| {
            ExecError::packaging(format!(
                "Global {:?} of type {} cannot be sent to jailed code",
                name,
                value.type_name()
            ))
        })?;
        globals.insert(Value::pickle_key(name), pickled);
    }

    let payload = PickleValue::Tuple(vec![
        PickleValue::String(code.to_string()),
        PickleValue::Dict(globals),
    ]);
    serde_pickle::value_to_vec(&payload, serde_pickle::SerOptions::new())
        .map_err(|err| ExecError::packaging(format!("Failed to serialize globals: {}", err)))
}

/// A JSON string literal is also a valid Python string literal
fn python_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
