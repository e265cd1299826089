//! Core types for jailed execution

use crate::value::{Namespace, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A JSON-safe namespace, as produced by the reduction codec and the trust filter
pub type JsonNamespace = BTreeMap<String, serde_json::Value>;

/// Unique identifier attached to every invocation's log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub uuid::Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file created in the scratch directory from in-memory contents.
///
/// The name must be flat: it is joined directly onto the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl InlineFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Request to execute code against a namespace
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// The code to execute
    pub code: String,

    /// Globals the code runs against
    pub namespace: Namespace,

    /// Files or directories copied into the working directory
    pub files: Vec<PathBuf>,

    /// Directories or zip files added to the module search path
    pub python_path: Vec<PathBuf>,

    /// Files created in the working directory from in-memory contents
    pub inline_files: Vec<InlineFile>,

    /// Caller-meaningful label used in log messages
    pub slug: Option<String>,
}

impl ExecutionRequest {
    /// Create a request with an empty namespace
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    /// Replace the namespace
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Set a single global
    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.namespace.insert(name.into(), value.into());
        self
    }

    /// Stage a file or directory
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Add a module search path entry
    pub fn with_python_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_path.push(path.into());
        self
    }

    /// Create a file from in-memory contents
    pub fn with_inline_file(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.inline_files.push(InlineFile::new(name, contents));
        self
    }

    /// Set the correlation label
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub(crate) fn slug_label(&self) -> &str {
        self.slug.as_deref().unwrap_or("<none>")
    }
}

/// What the isolation runner hands back for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxResult {
    /// Exit status (0 = success)
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl SandboxResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Full-fidelity serialization of the namespace produced by lower-trust code.
///
/// Kept as inert bytes. Nothing in this crate decodes it implicitly.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OpaquePayload(Vec<u8>);

impl OpaquePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the payload into plain pickle values.
    ///
    /// Globals are never resolved, so a payload naming classes or callables
    /// fails to decode instead of instantiating anything.
    pub fn decode(&self) -> Result<serde_pickle::Value, serde_pickle::Error> {
        serde_pickle::value_from_slice(&self.0, serde_pickle::DeOptions::new())
    }
}

impl std::fmt::Debug for OpaquePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpaquePayload({} bytes)", self.0.len())
    }
}

impl Serialize for OpaquePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

/// The trust-reduced state recovered from one execution
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReducedState {
    /// Whatever the code printed
    pub output: String,

    /// Opaque serialization of every serializable global
    pub payload: OpaquePayload,

    /// Short renderings, bounded for display
    pub display: JsonNamespace,

    /// Unbounded JSON-safe renderings
    pub full: JsonNamespace,
}
