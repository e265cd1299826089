//! Trust boundary filter: keep only the JSON-safe part of a namespace

use crate::reduce::is_reserved;
use crate::types::JsonNamespace;
use crate::value::{Namespace, Value};

/// Return only the JSON-safe part of `namespace`.
///
/// An entry survives when its value is null, bool, int, float, str, list,
/// tuple or dict, its JSON encoding decodes back to an equal value, its name
/// survives the same round trip, and the name is not reserved. The result is
/// built from the decoded JSON, so it shares nothing with the input.
pub fn reduce_to_json_safe(namespace: &Namespace) -> JsonNamespace {
    namespace
        .iter()
        .filter(|(name, _)| !is_reserved(name))
        .filter(|(_, value)| is_json_shaped(value))
        .filter_map(|(name, value)| {
            let decoded = round_trip(value)?;
            round_trip_key(name)?;
            Some((name.clone(), decoded))
        })
        .collect()
}

fn is_json_shaped(value: &Value) -> bool {
    matches!(
        value,
        Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::List(_)
            | Value::Tuple(_)
            | Value::Dict(_)
    )
}

fn round_trip(value: &Value) -> Option<serde_json::Value> {
    let json = value.to_json()?;
    let encoded = serde_json::to_string(&json).ok()?;
    let decoded: serde_json::Value = serde_json::from_str(&encoded).ok()?;
    equivalent(&Value::from(decoded.clone()), value).then_some(decoded)
}

fn round_trip_key(name: &str) -> Option<()> {
    let encoded = serde_json::to_string(name).ok()?;
    let decoded: String = serde_json::from_str(&encoded).ok()?;
    (decoded == name).then_some(())
}

/// Whether `decoded` (fresh out of JSON) equals `original`.
///
/// Lists and tuples are both ordered sequences; dict keys must have been
/// strings to begin with.
fn equivalent(decoded: &Value, original: &Value) -> bool {
    match (decoded, original) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b) | Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equivalent(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len()
                && b.iter().all(|(key, value)| match key {
                    Value::Str(_) => a
                        .iter()
                        .find(|(k, _)| k == key)
                        .is_some_and(|(_, v)| equivalent(v, value)),
                    _ => false,
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(value: Value) -> JsonNamespace {
        reduce_to_json_safe(&Namespace::from([("a".to_string(), value)]))
    }

    #[test]
    fn test_keeps_json_shapes() {
        assert_eq!(single(Value::None)["a"], json!(null));
        assert_eq!(single(Value::Int(17))["a"], json!(17));
        assert_eq!(single(Value::Float(1.5))["a"], json!(1.5));
        assert_eq!(single(Value::from("hi"))["a"], json!("hi"));
        assert_eq!(
            single(Value::Tuple(vec![Value::Int(1), Value::from("x")]))["a"],
            json!([1, "x"])
        );
        assert_eq!(
            single(Value::Dict(vec![(Value::from("k"), Value::List(vec![]))]))["a"],
            json!({"k": []})
        );
    }

    #[test]
    fn test_keeps_floats_that_are_hard_to_parse() {
        for f in [
            3.2383276483316235e-147,
            9.413004193968255e294,
            5e-324,
            f64::MAX,
            0.1 + 0.2,
        ] {
            let safe = single(Value::Float(f));
            assert_eq!(safe["a"].as_f64(), Some(f), "{:e} was not kept exactly", f);
        }
    }

    #[test]
    fn test_drops_values_that_do_not_round_trip() {
        assert!(single(Value::Float(f64::NAN)).is_empty());
        assert!(single(Value::Float(f64::INFINITY)).is_empty());
        assert!(single(Value::Bytes(b"raw".to_vec())).is_empty());
        assert!(single(Value::Set(vec![Value::Int(1)])).is_empty());
        assert!(single(Value::Object {
            type_name: "file".to_string(),
            text: Some("<file>".to_string()),
        })
        .is_empty());
        // int keys come back as strings
        assert!(single(Value::Dict(vec![(Value::Int(1), Value::Int(2))])).is_empty());
        // nested bytes poison the whole value
        assert!(single(Value::List(vec![Value::Int(1), Value::Bytes(vec![])])).is_empty());
    }

    #[test]
    fn test_drops_reserved_names() {
        let namespace = Namespace::from([
            ("__builtins__".to_string(), Value::Int(1)),
            ("ok".to_string(), Value::Int(2)),
        ]);
        let safe = reduce_to_json_safe(&namespace);
        assert_eq!(safe.len(), 1);
        assert_eq!(safe["ok"], json!(2));
    }

    #[test]
    fn test_is_pure() {
        let namespace = Namespace::from([
            ("a".to_string(), Value::Float(0.1)),
            ("b".to_string(), Value::from("é\u{0}")),
            ("c".to_string(), Value::Bytes(vec![0xff])),
        ]);
        let first = serde_json::to_vec(&reduce_to_json_safe(&namespace)).unwrap();
        let second = serde_json::to_vec(&reduce_to_json_safe(&namespace)).unwrap();
        assert_eq!(first, second);
        assert_eq!(namespace.len(), 3);
    }
}
