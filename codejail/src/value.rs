//! Host-side model of foreign runtime values

use serde_pickle::{HashableValue, Value as PickleValue};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Variables handed to (and recovered from) foreign code, keyed by name
pub type Namespace = BTreeMap<String, Value>;

/// A Python value as the host sees it
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Ordered key/value pairs; keys need not be strings
    Dict(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// An object known only by its type name and its `str()` rendering.
    /// `text` is `None` when rendering raised.
    Object {
        type_name: String,
        text: Option<String>,
    },
}

impl Value {
    /// Python's name for the value's type
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Object { type_name, .. } => type_name,
        }
    }

    /// Equivalent of `str(v)`; `None` when the object's rendering raised
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Object { text, .. } => text.clone(),
            other => Some(other.repr()),
        }
    }

    /// Equivalent of `repr(v)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) -> fmt::Result {
        match self {
            Value::None => out.write_str("None"),
            Value::Bool(true) => out.write_str("True"),
            Value::Bool(false) => out.write_str("False"),
            Value::Int(i) => write!(out, "{}", i),
            Value::Float(f) => out.write_str(&float_repr(*f)),
            Value::Str(s) => out.write_str(&str_repr(s)),
            Value::Bytes(b) => out.write_str(&bytes_repr(b)),
            Value::List(items) => write_seq(out, "[", items, "]"),
            Value::Tuple(items) if items.len() == 1 => {
                out.write_char('(')?;
                items[0].write_repr(out)?;
                out.write_str(",)")
            }
            Value::Tuple(items) => write_seq(out, "(", items, ")"),
            Value::Set(items) if items.is_empty() => out.write_str("set()"),
            Value::Set(items) => write_seq(out, "{", items, "}"),
            Value::Dict(pairs) => {
                out.write_char('{')?;
                for (index, (key, value)) in pairs.iter().enumerate() {
                    if index > 0 {
                        out.write_str(", ")?;
                    }
                    key.write_repr(out)?;
                    out.write_str(": ")?;
                    value.write_repr(out)?;
                }
                out.write_char('}')
            }
            Value::Object { type_name, text } => match text {
                Some(text) => out.write_str(text),
                None => write!(out, "<{} object>", type_name),
            },
        }
    }

    /// Native JSON rendering, following `json.dumps(v, allow_nan=False)`.
    ///
    /// Dict keys that are `str`, `int`, `float`, `bool` or `None` are coerced
    /// to strings the way Python does; any other key, non-finite floats,
    /// bytes, sets and opaque objects have no rendering.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        match self {
            Value::None => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Int(i) => Some(Json::from(*i)),
            // Python's digits, so the encoded text matches `json.dumps`
            Value::Float(f) if f.is_finite() => serde_json::from_str(&float_repr(*f))
                .ok()
                .map(Json::Number),
            Value::Float(_) => None,
            Value::Str(s) => Some(Json::String(s.clone())),
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Option<Vec<_>>>()
                .map(Json::Array),
            Value::Dict(pairs) => {
                let mut map = serde_json::Map::new();
                for (key, value) in pairs {
                    map.insert(json_key(key)?, value.to_json()?);
                }
                Some(Json::Object(map))
            }
            Value::Bytes(_) | Value::Set(_) | Value::Object { .. } => None,
        }
    }

    /// Pickle-level representation; `None` for values pickle would reject
    pub fn to_pickle(&self) -> Option<PickleValue> {
        Some(match self {
            Value::None => PickleValue::None,
            Value::Bool(b) => PickleValue::Bool(*b),
            Value::Int(i) => PickleValue::I64(*i),
            Value::Float(f) => PickleValue::F64(*f),
            Value::Str(s) => PickleValue::String(s.clone()),
            Value::Bytes(b) => PickleValue::Bytes(b.clone()),
            Value::List(items) => PickleValue::List(pickle_all(items)?),
            Value::Tuple(items) => PickleValue::Tuple(pickle_all(items)?),
            Value::Set(items) => PickleValue::Set(
                items
                    .iter()
                    .map(|item| item.to_pickle()?.into_hashable().ok())
                    .collect::<Option<_>>()?,
            ),
            Value::Dict(pairs) => {
                let mut map = BTreeMap::new();
                for (key, value) in pairs {
                    map.insert(key.to_pickle()?.into_hashable().ok()?, value.to_pickle()?);
                }
                PickleValue::Dict(map)
            }
            Value::Object { .. } => return None,
        })
    }

    /// Pickle key for a namespace name
    pub(crate) fn pickle_key(name: &str) -> HashableValue {
        HashableValue::String(name.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => write!(f, "<{} object>", self.type_name()),
        }
    }
}

fn pickle_all(items: &[Value]) -> Option<Vec<PickleValue>> {
    items.iter().map(Value::to_pickle).collect()
}

fn json_key(key: &Value) -> Option<String> {
    match key {
        Value::Str(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) if f.is_finite() => Some(float_repr(*f)),
        Value::Bool(true) => Some("true".to_string()),
        Value::Bool(false) => Some("false".to_string()),
        Value::None => Some("null".to_string()),
        _ => None,
    }
}

fn write_seq(out: &mut String, open: &str, items: &[Value], close: &str) -> fmt::Result {
    out.write_str(open)?;
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.write_str(", ")?;
        }
        item.write_repr(out)?;
    }
    out.write_str(close)
}

/// `repr(float)`: shortest round-trip digits, exponent outside [1e-4, 1e16)
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", f);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or(0);
                let sign = if exponent < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exponent.abs())
            }
            None => formatted,
        };
    }
    let formatted = format!("{}", f);
    if formatted.contains('.') {
        formatted
    } else {
        format!("{}.0", formatted)
    }
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn bytes_repr(bytes: &[u8]) -> String {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote as char);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            b => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out.push(quote as char);
    out
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Dict(
                map.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
