//! The `JSON` namespace, bridged through serde_json.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use ahash::AHashSet;

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    heap::{Heap, HeapData, HeapId, PropKey, Property},
    value::Value,
};

use super::Builtin;

pub(crate) fn make_namespace(heap: &mut Heap) -> Value {
    let id = heap.alloc_object(None);
    let obj = heap.expect_object_mut(id);
    obj.insert(PropKey::Str("stringify".into()), Value::Builtin(Builtin::JsonStringify));
    obj.insert(PropKey::Str("parse".into()), Value::Builtin(Builtin::JsonParse));
    Value::Ref(id)
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, args: &[Value]) -> RunResult<Value> {
    let first = args.first().cloned().unwrap_or(Value::Undefined);
    match b {
        Builtin::JsonStringify => {
            let mut seen = AHashSet::new();
            match to_json(interp, &first, &mut seen)? {
                Some(json) => {
                    let indent = match args.get(2) {
                        Some(Value::Num(n)) if *n >= 1.0 => Some(*n as usize),
                        _ => None,
                    };
                    let text = match indent {
                        Some(width) => pretty(&json, width),
                        None => json.to_string(),
                    };
                    Ok(Value::str(text))
                }
                // undefined and functions stringify to undefined.
                None => Ok(Value::Undefined),
            }
        }
        Builtin::JsonParse => {
            let Value::Str(text) = &first else {
                return Err(RunError::syntax_error("Unexpected token in JSON"));
            };
            let json: JsonValue = serde_json::from_str(text)
                .map_err(|e| RunError::syntax_error(format!("Unexpected token in JSON: {e}")))?;
            Ok(from_json(interp.heap, &json))
        }
        _ => unreachable!("non-json builtin dispatched to json"),
    }
}

/// Converts a script value to a JSON tree. `None` means the value has no
/// JSON representation (undefined, functions, symbols).
fn to_json(interp: &mut Interp, value: &Value, seen: &mut AHashSet<HeapId>) -> RunResult<Option<JsonValue>> {
    Ok(match value {
        Value::Undefined | Value::Symbol(_) | Value::Builtin(_) => None,
        Value::Null => Some(JsonValue::Null),
        Value::Bool(b) => Some(JsonValue::Bool(*b)),
        Value::Num(n) => {
            if !n.is_finite() {
                // NaN and infinities stringify to null.
                Some(JsonValue::Null)
            } else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                // Integral values print without a decimal point.
                Some(JsonValue::Number(JsonNumber::from(*n as i64)))
            } else {
                Some(JsonNumber::from_f64(*n).map_or(JsonValue::Null, JsonValue::Number))
            }
        }
        Value::BigInt(_) => {
            return Err(RunError::type_error("Do not know how to serialize a BigInt"));
        }
        Value::Str(s) => Some(JsonValue::String(s.to_string())),
        Value::Ref(id) => {
            if !seen.insert(*id) {
                return Err(RunError::type_error("Converting circular structure to JSON"));
            }
            let result = match interp.heap.get(*id) {
                HeapData::Array(arr) => {
                    let len = arr.length();
                    let values: Vec<Value> = (0..len)
                        .map(|i| arr.get_index(i).cloned().unwrap_or(Value::Undefined))
                        .collect();
                    let mut out = Vec::with_capacity(values.len());
                    for v in values {
                        // Array holes and non-serializable entries become null.
                        out.push(to_json(interp, &v, seen)?.unwrap_or(JsonValue::Null));
                    }
                    Some(JsonValue::Array(out))
                }
                HeapData::Object(obj) => {
                    let entries: Vec<(crate::value::JsStr, Property)> = obj
                        .props
                        .iter()
                        .filter_map(|(k, p)| match k {
                            PropKey::Str(s) => Some((s.clone(), p.clone())),
                            PropKey::Sym(_) => None,
                        })
                        .collect();
                    let mut out = JsonMap::new();
                    for (key, prop) in entries {
                        let v = match prop {
                            Property::Value(v) => v,
                            Property::Accessor { get: Some(g), .. } => {
                                interp.call_value(&g, value.clone(), &[])?
                            }
                            Property::Accessor { .. } => Value::Undefined,
                        };
                        if let Some(json) = to_json(interp, &v, seen)? {
                            out.insert(key.to_string(), json);
                        }
                    }
                    Some(JsonValue::Object(out))
                }
                HeapData::Closure(_) | HeapData::HostFunc(_) | HeapData::Resolver(_) => None,
                HeapData::Date(ms) => Some(JsonValue::String(super::date::to_iso_string(*ms))),
                _ => Some(JsonValue::Object(JsonMap::new())),
            };
            seen.remove(id);
            result
        }
    })
}

fn from_json(heap: &mut Heap, json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::str(s.clone()),
        JsonValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(|item| from_json(heap, item)).collect();
            Value::Ref(heap.alloc_array(values))
        }
        JsonValue::Object(map) => {
            let id = heap.alloc_object(None);
            for (key, item) in map {
                let value = from_json(heap, item);
                heap.expect_object_mut(id).insert(PropKey::Str(key.as_str().into()), value);
            }
            Value::Ref(id)
        }
    }
}

/// Minimal pretty-printer matching `JSON.stringify(v, null, width)`.
fn pretty(json: &JsonValue, width: usize) -> String {
    fn indent(out: &mut String, depth: usize, width: usize) {
        out.push('\n');
        for _ in 0..depth * width {
            out.push(' ');
        }
    }
    fn write(json: &JsonValue, out: &mut String, depth: usize, width: usize) {
        match json {
            JsonValue::Array(items) if !items.is_empty() => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    indent(out, depth + 1, width);
                    write(item, out, depth + 1, width);
                }
                indent(out, depth, width);
                out.push(']');
            }
            JsonValue::Object(map) if !map.is_empty() => {
                out.push('{');
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    indent(out, depth + 1, width);
                    out.push_str(&JsonValue::String(key.clone()).to_string());
                    out.push_str(": ");
                    write(item, out, depth + 1, width);
                }
                indent(out, depth, width);
                out.push('}');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    let mut out = String::new();
    write(json, &mut out, 0, width);
    out
}
