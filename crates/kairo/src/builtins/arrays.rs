//! Array statics and prototype methods.

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    heap::{HeapData, HeapId, JsArray},
    value::Value,
};

use super::Builtin;

pub(crate) fn method(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name {
        "push" => ArrPush,
        "pop" => ArrPop,
        "shift" => ArrShift,
        "unshift" => ArrUnshift,
        "slice" => ArrSlice,
        "indexOf" => ArrIndexOf,
        "join" => ArrJoin,
        "map" => ArrMap,
        "filter" => ArrFilter,
        "forEach" => ArrForEach,
        "includes" => ArrIncludes,
        "concat" => ArrConcat,
        "reverse" => ArrReverse,
        _ => return None,
    })
}

pub(crate) fn construct(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    // `new Array(n)` presizes; any other arity builds from the arguments.
    if args.len() == 1
        && let Value::Num(n) = &args[0]
    {
        if *n < 0.0 || n.fract() != 0.0 {
            return Err(RunError::range_error("Invalid array length"));
        }
        let mut arr = JsArray::new();
        arr.set_length(*n as u32);
        return Ok(Value::Ref(interp.heap.alloc(HeapData::Array(arr))));
    }
    Ok(Value::Ref(interp.heap.alloc_array(args.to_vec())))
}

pub(crate) fn call_static(interp: &mut Interp, b: Builtin, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    match b {
        ArrayIsArray => Ok(Value::Bool(matches!(
            args.first(),
            Some(Value::Ref(id)) if matches!(interp.heap.get(*id), HeapData::Array(_))
        ))),
        ArrayOf => Ok(Value::Ref(interp.heap.alloc_array(args.to_vec()))),
        ArrayFrom => {
            let source = args.first().cloned().unwrap_or(Value::Undefined);
            let iter = interp.get_iterator(&source)?;
            let mapper = args.get(1).cloned();
            let mut out = Vec::new();
            let mut index = 0f64;
            loop {
                let (done, value) = interp.iterator_next(&iter)?;
                if done {
                    break;
                }
                let value = match &mapper {
                    Some(f) => interp.call_value(f, Value::Undefined, &[value, Value::Num(index)])?,
                    None => value,
                };
                out.push(value);
                index += 1.0;
            }
            Ok(Value::Ref(interp.heap.alloc_array(out)))
        }
        _ => unreachable!("non-array static dispatched to arrays"),
    }
}

fn expect_array(interp: &Interp, this: &Value) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if matches!(interp.heap.get(*id), HeapData::Array(_)) => Ok(*id),
        _ => Err(RunError::type_error("Array method called on a non-array receiver")),
    }
}

fn snapshot_values(interp: &Interp, id: HeapId) -> Vec<Value> {
    let HeapData::Array(arr) = interp.heap.get(id) else {
        return Vec::new();
    };
    let len = arr.length();
    (0..len)
        .map(|i| arr.get_index(i).cloned().unwrap_or(Value::Undefined))
        .collect()
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let id = expect_array(interp, this)?;

    match b {
        ArrPush => {
            let HeapData::Array(arr) = interp.heap.get_mut(id) else { unreachable!() };
            for arg in args {
                arr.push(arg.clone());
            }
            let len = arr.length();
            Ok(Value::Num(f64::from(len)))
        }
        ArrPop => {
            let HeapData::Array(arr) = interp.heap.get_mut(id) else { unreachable!() };
            Ok(arr.pop().unwrap_or(Value::Undefined))
        }
        ArrShift => {
            let mut values = snapshot_values(interp, id);
            if values.is_empty() {
                return Ok(Value::Undefined);
            }
            let first = values.remove(0);
            *interp.heap.get_mut(id) = HeapData::Array(JsArray::from_values(values));
            Ok(first)
        }
        ArrUnshift => {
            let mut values = snapshot_values(interp, id);
            for (i, arg) in args.iter().enumerate() {
                values.insert(i, arg.clone());
            }
            let len = values.len() as f64;
            *interp.heap.get_mut(id) = HeapData::Array(JsArray::from_values(values));
            Ok(Value::Num(len))
        }
        ArrSlice => {
            let values = snapshot_values(interp, id);
            let len = values.len() as i64;
            let rel = |v: Option<&Value>, default: i64| -> RunResult<i64> {
                match v {
                    None | Some(Value::Undefined) => Ok(default),
                    Some(v) => {
                        let n = v.to_number(interp.heap)? as i64;
                        Ok(if n < 0 { (len + n).max(0) } else { n.min(len) })
                    }
                }
            };
            let start = rel(args.first(), 0)?;
            let end = rel(args.get(1), len)?;
            let out: Vec<Value> = if start < end {
                values[start as usize..end as usize].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::Ref(interp.heap.alloc_array(out)))
        }
        ArrIndexOf => {
            let values = snapshot_values(interp, id);
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            for (i, v) in values.iter().enumerate() {
                if v.strict_eq(&needle) {
                    return Ok(Value::Num(i as f64));
                }
            }
            Ok(Value::Num(-1.0))
        }
        ArrIncludes => {
            let values = snapshot_values(interp, id);
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            Ok(Value::Bool(values.iter().any(|v| v.same_value_zero(&needle))))
        }
        ArrJoin => {
            let values = snapshot_values(interp, id);
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_owned(),
                Some(v) => v.to_display(interp.heap, interp.interner),
            };
            let parts: Vec<String> = values
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display(interp.heap, interp.interner)
                    }
                })
                .collect();
            Ok(Value::str(parts.join(&sep)))
        }
        ArrMap | ArrFilter | ArrForEach => {
            let Some(callback) = args.first().cloned() else {
                return Err(RunError::type_error("callback is not a function"));
            };
            let values = snapshot_values(interp, id);
            let mut out = Vec::new();
            for (i, v) in values.into_iter().enumerate() {
                let call_args = [v.clone(), Value::Num(i as f64), this.clone()];
                let result = interp.call_value(&callback, Value::Undefined, &call_args)?;
                match b {
                    ArrMap => out.push(result),
                    ArrFilter => {
                        if result.truthy() {
                            out.push(v);
                        }
                    }
                    _ => {}
                }
            }
            if b == ArrForEach {
                Ok(Value::Undefined)
            } else {
                Ok(Value::Ref(interp.heap.alloc_array(out)))
            }
        }
        ArrConcat => {
            let mut values = snapshot_values(interp, id);
            for arg in args {
                match arg {
                    Value::Ref(other) if matches!(interp.heap.get(*other), HeapData::Array(_)) => {
                        values.extend(snapshot_values(interp, *other));
                    }
                    other => values.push(other.clone()),
                }
            }
            Ok(Value::Ref(interp.heap.alloc_array(values)))
        }
        ArrReverse => {
            let mut values = snapshot_values(interp, id);
            values.reverse();
            *interp.heap.get_mut(id) = HeapData::Array(JsArray::from_values(values));
            Ok(this.clone())
        }
        _ => unreachable!("non-array builtin dispatched to arrays"),
    }
}
