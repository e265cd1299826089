//! Value reduction codec.
//!
//! Turns a post-execution namespace into three independent tiers:
//!
//! - an opaque payload holding a full-fidelity serialization of every value
//!   that can be serialized,
//! - a *display* mapping of short JSON-safe renderings,
//! - a *full* mapping of unbounded JSON-safe renderings.
//!
//! Every tier tolerates individual values that cannot be rendered: they are
//! dropped from that tier and the reduction carries on.

use crate::types::{JsonNamespace, OpaquePayload};
use crate::value::Value;
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::io;

/// Upper bound (in characters) for display renderings
pub const DISPLAY_LIMIT: usize = 100;

/// Names that never leave the execution, whatever their value
pub const RESERVED_NAMES: &[&str] = &["__builtins__"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// A value living on the far side of the trust boundary.
///
/// Each operation mirrors a Python builtin and returns `None` when that
/// builtin would raise.
pub trait ForeignValue {
    /// `json.loads(json.dumps(v, allow_nan=False))`
    fn to_json(&self) -> Option<Json>;

    /// `str(v)`
    fn to_text(&self) -> Option<String>;

    /// `str(type(v))`
    fn type_label(&self) -> Option<String>;
}

/// Collects the opaque payload tier
pub trait PayloadSink<V: ?Sized> {
    /// Offer a value; returns `false` if it cannot be serialized and was dropped
    fn offer(&mut self, name: &str, value: &V) -> bool;

    /// Serialize everything accepted so far
    fn finish(self) -> OpaquePayload
    where
        Self: Sized;
}

/// Output of [`reduce`]
#[derive(Debug, Clone, Default)]
pub struct Reduction {
    pub payload: OpaquePayload,
    pub display: JsonNamespace,
    pub full: JsonNamespace,
}

/// Reduce a namespace, skipping reserved names.
pub fn reduce<'a, V, I, S>(entries: I, mut sink: S) -> Reduction
where
    V: ForeignValue + ?Sized + 'a,
    I: IntoIterator<Item = (&'a str, &'a V)>,
    S: PayloadSink<V>,
{
    let mut display = JsonNamespace::new();
    let mut full = JsonNamespace::new();

    for (name, value) in entries {
        if is_reserved(name) {
            continue;
        }
        if !sink.offer(name, value) {
            tracing::debug!(name, "Dropping unserializable value from payload");
        }
        if let Some(rendered) = display_rendering(value) {
            display.insert(name.to_string(), rendered);
        }
        if let Some(rendered) = full_rendering(value) {
            full.insert(name.to_string(), rendered);
        }
    }

    Reduction {
        payload: sink.finish(),
        display,
        full,
    }
}

/// Bounded rendering: short JSON, else a 1..100 character `str()`, else the
/// type name if `str()` raised.
pub fn display_rendering<V: ForeignValue + ?Sized>(value: &V) -> Option<Json> {
    if let Some(json) = value.to_json() {
        if encoded_len(&json) <= DISPLAY_LIMIT {
            return Some(json);
        }
    }
    match value.to_text() {
        Some(text) => {
            let len = text.chars().count();
            (len > 0 && len < DISPLAY_LIMIT).then_some(Json::String(text))
        }
        None => value.type_label().map(Json::String),
    }
}

/// Unbounded rendering: JSON, else a non-empty `str()`, else the type name
/// if `str()` raised.
pub fn full_rendering<V: ForeignValue + ?Sized>(value: &V) -> Option<Json> {
    if let Some(json) = value.to_json() {
        return Some(json);
    }
    match value.to_text() {
        Some(text) => (!text.is_empty()).then_some(Json::String(text)),
        None => value.type_label().map(Json::String),
    }
}

/// Length in characters of `json.dumps(value)` with Python's default
/// separators and ASCII escaping.
pub fn encoded_len(value: &Json) -> usize {
    python_dumps(value).chars().count()
}

/// Encode like Python's `json.dumps` with default arguments
pub fn python_dumps(value: &Json) -> String {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PythonFormatter);
    // Serializing a `serde_json::Value` into memory cannot fail
    if value.serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// `", "` / `": "` separators and `\uXXXX` escapes for non-ASCII
struct PythonFormatter;

impl serde_json::ser::Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

impl ForeignValue for Value {
    fn to_json(&self) -> Option<Json> {
        Value::to_json(self)
    }

    fn to_text(&self) -> Option<String> {
        Value::to_text(self)
    }

    fn type_label(&self) -> Option<String> {
        Some(format!("<class '{}'>", self.type_name()))
    }
}

/// Payload sink for host values, producing a pickled `dict`
#[derive(Debug, Default)]
pub struct PickleSink {
    kept: BTreeMap<serde_pickle::HashableValue, serde_pickle::Value>,
}

impl PickleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadSink<Value> for PickleSink {
    fn offer(&mut self, name: &str, value: &Value) -> bool {
        match value.to_pickle() {
            Some(pickled) => {
                self.kept.insert(Value::pickle_key(name), pickled);
                true
            }
            None => false,
        }
    }

    fn finish(self) -> OpaquePayload {
        let dict = serde_pickle::Value::Dict(self.kept);
        match serde_pickle::value_to_vec(&dict, serde_pickle::SerOptions::new()) {
            Ok(bytes) => OpaquePayload::new(bytes),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize payload; sending none");
                OpaquePayload::default()
            }
        }
    }
}

/// Reduce a host namespace with the pickle payload sink
pub fn reduce_namespace(namespace: &crate::Namespace) -> Reduction {
    reduce(
        namespace.iter().map(|(name, value)| (name.as_str(), value)),
        PickleSink::new(),
    )
}
