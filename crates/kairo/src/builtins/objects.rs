//! Object statics, the shared object protocol, conversion globals, and the
//! console namespace.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    heap::{Heap, HeapData, PropKey, Property},
    value::Value,
};

use super::Builtin;

pub(crate) fn method(name: &str) -> Option<Builtin> {
    match name {
        "hasOwnProperty" => Some(Builtin::ObjHasOwnProperty),
        "toString" => Some(Builtin::ObjToString),
        _ => None,
    }
}

pub(crate) fn make_console(heap: &mut Heap) -> Value {
    let id = heap.alloc_object(None);
    heap.expect_object_mut(id)
        .insert(PropKey::Str("log".into()), Value::Builtin(Builtin::ConsoleLog));
    Value::Ref(id)
}

/// `console.log(..)` publishes a best-effort snapshot on the debug stream.
pub(crate) fn console_log(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    let mut variables = Vec::with_capacity(args.len() + 1);
    let mut rendered = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        rendered.push(arg.to_display(interp.heap, interp.interner));
        variables.push((
            format!("arg{i}"),
            crate::host::value_to_host(interp.heap, interp.interner, arg),
        ));
    }
    variables.push(("message".to_owned(), crate::host::HostValue::String(rendered.join(" "))));
    interp.debug.push(crate::host::DebugMessage { variables });
    Ok(Value::Undefined)
}

/// Conversion globals and Number statics.
pub(crate) fn call_global(interp: &mut Interp, b: Builtin, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let first = args.first().cloned().unwrap_or(Value::Undefined);
    Ok(match b {
        ParseInt => {
            let s = first.to_display(interp.heap, interp.interner);
            let radix = match args.get(1) {
                Some(Value::Num(n)) if *n != 0.0 => *n as u32,
                _ => 10,
            };
            Value::Num(parse_int(&s, radix))
        }
        ParseFloat => {
            let s = first.to_display(interp.heap, interp.interner);
            Value::Num(parse_float(&s))
        }
        IsNaN => Value::Bool(first.to_number(interp.heap)?.is_nan()),
        IsFinite => Value::Bool(first.to_number(interp.heap)?.is_finite()),
        StringCtor => Value::str(first.to_display(interp.heap, interp.interner)),
        NumberCtor => match &first {
            // Number(bigint) converts explicitly, unlike arithmetic mixing.
            Value::BigInt(b) => Value::Num(b.to_f64().unwrap_or(f64::NAN)),
            other => Value::Num(other.to_number(interp.heap)?),
        },
        BooleanCtor => Value::Bool(first.truthy()),
        BigIntCtor => match &first {
            Value::BigInt(_) => first.clone(),
            Value::Num(n) => {
                if n.fract() != 0.0 || !n.is_finite() {
                    return Err(RunError::range_error(
                        "The number is not a safe integer and cannot be converted to a BigInt",
                    ));
                }
                Value::BigInt(Rc::new(BigInt::from(*n as i64)))
            }
            Value::Str(s) => match s.trim().parse::<BigInt>() {
                Ok(v) => Value::BigInt(Rc::new(v)),
                Err(_) => return Err(RunError::syntax_error("Cannot convert string to a BigInt")),
            },
            Value::Bool(b) => Value::BigInt(Rc::new(BigInt::from(u8::from(*b)))),
            _ => return Err(RunError::type_error("Cannot convert value to a BigInt")),
        },
        SymbolCtor => {
            let desc = match &first {
                Value::Undefined => String::new(),
                other => other.to_display(interp.heap, interp.interner),
            };
            Value::Symbol(interp.interner.intern(&desc))
        }
        NumberIsInteger => Value::Bool(matches!(&first, Value::Num(n) if n.is_finite() && n.fract() == 0.0)),
        NumberIsFinite => Value::Bool(matches!(&first, Value::Num(n) if n.is_finite())),
        NumberIsNaN => Value::Bool(matches!(&first, Value::Num(n) if n.is_nan())),
        _ => unreachable!("non-global builtin dispatched to globals"),
    })
}

fn parse_int(s: &str, radix: u32) -> f64 {
    let t = s.trim();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (radix, t) = if (radix == 16 || radix == 10) && (t.starts_with("0x") || t.starts_with("0X")) {
        (16, &t[2..])
    } else {
        (radix, t)
    };
    let digits: String = t.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = i64::from_str_radix(&digits, radix).map_or(f64::NAN, |v| v as f64);
    if neg { -value } else { value }
}

fn parse_float(s: &str) -> f64 {
    let t = s.trim();
    // Longest numeric prefix.
    let mut end = 0;
    let bytes = t.as_bytes();
    let mut seen_dot = false;
    let mut seen_e = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        let ok = c.is_ascii_digit()
            || (c == '.' && !seen_dot && !seen_e)
            || ((c == 'e' || c == 'E') && !seen_e && end > 0)
            || ((c == '+' || c == '-') && (end == 0 || bytes[end - 1] == b'e' || bytes[end - 1] == b'E'));
        if !ok {
            break;
        }
        if c == '.' {
            seen_dot = true;
        }
        if c == 'e' || c == 'E' {
            seen_e = true;
        }
        end += 1;
    }
    if end == 0 {
        return f64::NAN;
    }
    t[..end].parse().unwrap_or(f64::NAN)
}

/// Object statics plus the shared object protocol methods.
pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let first = args.first().cloned().unwrap_or(Value::Undefined);
    match b {
        ObjectKeys => {
            let keys = own_string_keys(interp, &first);
            let values: Vec<Value> = keys.into_iter().map(Value::Str).collect();
            Ok(Value::Ref(interp.heap.alloc_array(values)))
        }
        ObjectValues => {
            let keys = own_string_keys(interp, &first);
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                out.push(interp.get_member(&first, &PropKey::Str(key))?);
            }
            Ok(Value::Ref(interp.heap.alloc_array(out)))
        }
        ObjectEntries => {
            let keys = own_string_keys(interp, &first);
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                let value = interp.get_member(&first, &PropKey::Str(key.clone()))?;
                let pair = interp.heap.alloc_array(vec![Value::Str(key), value]);
                out.push(Value::Ref(pair));
            }
            Ok(Value::Ref(interp.heap.alloc_array(out)))
        }
        ObjectAssign => {
            let Value::Ref(target_id) = &first else {
                return Err(RunError::type_error("Object.assign target must be an object"));
            };
            for source in args.get(1..).unwrap_or_default() {
                let keys = own_string_keys(interp, source);
                for key in keys {
                    let value = interp.get_member(source, &PropKey::Str(key.clone()))?;
                    interp.set_member(&Value::Ref(*target_id), PropKey::Str(key), value)?;
                }
            }
            Ok(first)
        }
        ObjectFreeze => {
            if let Value::Ref(id) = &first
                && let HeapData::Object(obj) = interp.heap.get_mut(*id)
            {
                obj.extensible = false;
            }
            Ok(first)
        }
        ObjectGetPrototypeOf => {
            if let Value::Ref(id) = &first
                && let HeapData::Object(obj) = interp.heap.get(*id)
            {
                return Ok(obj.proto.map_or(Value::Null, Value::Ref));
            }
            Ok(Value::Null)
        }
        ObjectCreate => {
            let proto = match &first {
                Value::Ref(id) => Some(*id),
                Value::Null => None,
                _ => return Err(RunError::type_error("Object prototype may only be an Object or null")),
            };
            Ok(Value::Ref(interp.heap.alloc_object(proto)))
        }
        ObjHasOwnProperty => {
            let key = first.to_property_key(interp.heap, interp.interner);
            let Value::Ref(id) = this else {
                return Ok(Value::Bool(false));
            };
            let has = match interp.heap.get(*id) {
                HeapData::Object(obj) => obj.props.contains_key(&key),
                HeapData::Array(arr) => {
                    if let Some(index) = key.as_str().and_then(crate::iterator::array_index) {
                        arr.get_index(index).is_some()
                    } else {
                        arr.extra.contains_key(&key)
                    }
                }
                _ => false,
            };
            Ok(Value::Bool(has))
        }
        ObjToString => Ok(Value::str(this.to_display(interp.heap, interp.interner))),
        _ => unreachable!("non-object builtin dispatched to objects"),
    }
}

/// Own enumerable string keys (insertion order, symbols skipped).
pub(crate) fn own_string_keys(interp: &Interp, value: &Value) -> Vec<crate::value::JsStr> {
    let Value::Ref(id) = value else {
        return Vec::new();
    };
    match interp.heap.get(*id) {
        HeapData::Object(obj) => obj
            .props
            .iter()
            .filter_map(|(k, p)| match (k, p) {
                (PropKey::Str(s), Property::Value(_) | Property::Accessor { .. }) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        HeapData::Array(arr) => arr
            .indices()
            .into_iter()
            .map(|i| crate::value::number_to_string(f64::from(i)).into())
            .collect(),
        _ => Vec::new(),
    }
}
