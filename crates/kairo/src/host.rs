//! The host interop boundary.
//!
//! [`HostValue`] is the public-facing value type: it owns all its data and
//! can be freely cloned, serialized, or stored. Unlike the internal `Value`
//! type it does not require the heap, so host callables and embedder results
//! never touch engine internals.
//!
//! # JSON serialization
//!
//! `HostValue` maps naturally onto JSON: `Undefined` and `Null` both
//! serialize to `null`, numbers/strings/booleans map directly, arrays map to
//! JSON arrays, and objects to JSON objects. BigInts serialize as decimal
//! strings.

use std::fmt;

use num_bigint::BigInt;

use crate::{
    heap::{Heap, HeapData, PropKey, Property},
    intern::Interner,
    value::{number_to_string, Value},
};

/// A script value that can cross the host boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Arbitrary-precision integer.
    BigInt(#[serde(with = "bigint_as_decimal_str")] BigInt),
    String(String),
    Array(Vec<HostValue>),
    /// Insertion-ordered key/value pairs.
    Object(Vec<(String, HostValue)>),
    /// An error value carrying its classification and message.
    Error { name: String, message: String },
    /// A value with no direct host mapping (function, promise, generator);
    /// carries its display rendering.
    Opaque(String),
}

impl HostValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The number payload, when this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", number_to_string(*n)),
            Self::BigInt(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            Self::Object(_) => write!(f, "[object Object]"),
            Self::Error { name, message } => {
                if message.is_empty() {
                    write!(f, "{name}")
                } else {
                    write!(f, "{name}: {message}")
                }
            }
            Self::Opaque(repr) => write!(f, "{repr}"),
        }
    }
}

/// A debug snapshot published by `console.log` and evaluator checkpoints.
#[derive(Debug, Clone)]
pub struct DebugMessage {
    /// Named values captured at the snapshot point.
    pub variables: Vec<(String, HostValue)>,
}

/// An unhandled exception or rejection published on the exception stream.
#[derive(Debug, Clone)]
pub struct ExceptionEvent {
    /// Rendered message of the thrown value.
    pub message: String,
    /// The thrown value itself, converted for the host.
    pub value: HostValue,
    /// Where the failure surfaced ("task", "unhandled rejection", ..).
    pub context: String,
}

/// A host callable: receives the receiver and the argument list, returns a
/// value or an error message that surfaces as a script error.
pub type HostCallable = Box<dyn Fn(&HostValue, &[HostValue]) -> Result<HostValue, String>>;

/// Registry of host callables referenced by `HostFunc` heap values.
#[derive(Default)]
pub(crate) struct HostRegistry {
    funcs: Vec<HostCallable>,
}

impl HostRegistry {
    pub fn register(&mut self, callable: HostCallable) -> usize {
        self.funcs.push(callable);
        self.funcs.len() - 1
    }

    pub fn call(&self, index: usize, this: &HostValue, args: &[HostValue]) -> Result<HostValue, String> {
        match self.funcs.get(index) {
            Some(f) => f(this, args),
            None => Err("host function is gone".to_owned()),
        }
    }
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry").field("funcs", &self.funcs.len()).finish()
    }
}

/// Depth bound for host conversion of cyclic object graphs.
const MAX_CONVERT_DEPTH: usize = 32;

/// Converts an engine value into its owned host mirror.
pub(crate) fn value_to_host(heap: &Heap, interner: &Interner, value: &Value) -> HostValue {
    convert(heap, interner, value, 0)
}

fn convert(heap: &Heap, interner: &Interner, value: &Value, depth: usize) -> HostValue {
    if depth > MAX_CONVERT_DEPTH {
        return HostValue::Opaque("[deep object]".to_owned());
    }
    match value {
        Value::Undefined => HostValue::Undefined,
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Num(n) => HostValue::Number(*n),
        Value::BigInt(b) => HostValue::BigInt((**b).clone()),
        Value::Str(s) => HostValue::String(s.to_string()),
        Value::Symbol(sym) => HostValue::Opaque(format!("Symbol({})", interner.resolve(*sym))),
        Value::Builtin(b) => HostValue::Opaque(format!("function {}() {{ [native code] }}", b.name())),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Array(arr) => {
                let mut items = Vec::with_capacity(arr.length() as usize);
                for i in 0..arr.length() {
                    let item = arr.get_index(i).cloned().unwrap_or(Value::Undefined);
                    items.push(convert(heap, interner, &item, depth + 1));
                }
                HostValue::Array(items)
            }
            HeapData::Object(obj) => {
                // Error objects cross the boundary as structured errors.
                if let (Some(Value::Str(name)), Some(message)) = (
                    obj.get_plain(&PropKey::Str("name".into())),
                    obj.get_plain(&PropKey::Str("message".into())),
                ) && obj.props.len() <= 3
                {
                    return HostValue::Error {
                        name: name.to_string(),
                        message: message.to_display(heap, interner),
                    };
                }
                let mut entries = Vec::with_capacity(obj.props.len());
                for (key, prop) in &obj.props {
                    if let (PropKey::Str(k), Property::Value(v)) = (key, prop) {
                        entries.push((k.to_string(), convert(heap, interner, v, depth + 1)));
                    }
                }
                HostValue::Object(entries)
            }
            _ => HostValue::Opaque(value.to_display(heap, interner)),
        },
    }
}

/// Converts a host value into an engine value, allocating as needed.
pub(crate) fn host_to_value(heap: &mut Heap, value: &HostValue) -> Value {
    match value {
        HostValue::Undefined => Value::Undefined,
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Number(n) => Value::Num(*n),
        HostValue::BigInt(b) => Value::BigInt(std::rc::Rc::new(b.clone())),
        HostValue::String(s) => Value::str(s.clone()),
        HostValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(|i| host_to_value(heap, i)).collect();
            Value::Ref(heap.alloc_array(values))
        }
        HostValue::Object(entries) => {
            let id = heap.alloc_object(None);
            for (key, item) in entries {
                let v = host_to_value(heap, item);
                heap.expect_object_mut(id).insert(PropKey::Str(key.as_str().into()), v);
            }
            Value::Ref(id)
        }
        HostValue::Error { name, message } => {
            let id = heap.alloc_object(None);
            let obj = heap.expect_object_mut(id);
            obj.insert(PropKey::Str("name".into()), Value::str(name.clone()));
            obj.insert(PropKey::Str("message".into()), Value::str(message.clone()));
            Value::Ref(id)
        }
        HostValue::Opaque(repr) => Value::str(repr.clone()),
    }
}

/// Serializes [`BigInt`] as its decimal string form, matching the
/// `HostValue` JSON mapping documented above.
mod bigint_as_decimal_str {
    use std::str::FromStr;

    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &BigInt, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(d)?;
        BigInt::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_data() {
        let mut heap = Heap::new();
        let interner = Interner::new();
        let original = HostValue::Object(vec![
            ("a".to_owned(), HostValue::Number(1.0)),
            ("b".to_owned(), HostValue::Array(vec![HostValue::String("x".to_owned()), HostValue::Null])),
        ]);
        let value = host_to_value(&mut heap, &original);
        let back = value_to_host(&heap, &interner, &value);
        assert_eq!(original, back);
    }

    #[test]
    fn display_matches_script_rendering() {
        assert_eq!(HostValue::Number(5.0).to_string(), "5");
        assert_eq!(HostValue::Undefined.to_string(), "undefined");
        assert_eq!(
            HostValue::Error {
                name: "TypeError".to_owned(),
                message: "boom".to_owned()
            }
            .to_string(),
            "TypeError: boom"
        );
    }
}
