//! Map and WeakMap prototypes, plus generator/iterator method dispatch.

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    generator::{self, GenResume, GenStep},
    heap::{HeapData, HeapId, JsMap, JsWeakMap, NativeIter},
    iterator,
    value::{MapKey, Value},
};

use super::Builtin;

pub(crate) fn map_method(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name {
        "get" => MapGet,
        "set" => MapSet,
        "has" => MapHas,
        "delete" => MapDelete,
        "clear" => MapClear,
        "keys" => MapKeys,
        "values" => MapValues,
        "entries" => MapEntries,
        "forEach" => MapForEach,
        _ => return None,
    })
}

pub(crate) fn weak_map_method(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name {
        "get" => WeakMapGet,
        "set" => WeakMapSet,
        "has" => WeakMapHas,
        "delete" => WeakMapDelete,
        _ => return None,
    })
}

/// `new Map(entries?)` / `new WeakMap(entries?)`.
pub(crate) fn construct(interp: &mut Interp, b: Builtin, args: &[Value]) -> RunResult<Value> {
    let id = match b {
        Builtin::MapCtor => interp.heap.alloc(HeapData::Map(JsMap::default())),
        Builtin::WeakMapCtor => interp.heap.alloc(HeapData::WeakMap(JsWeakMap::default())),
        _ => unreachable!("non-collection constructor"),
    };
    if let Some(init) = args.first()
        && !init.is_nullish()
    {
        let iter = interp.get_iterator(init)?;
        loop {
            let (done, entry) = interp.iterator_next(&iter)?;
            if done {
                break;
            }
            let key = interp.get_member(&entry, &crate::heap::PropKey::Str("0".into()))?;
            let value = interp.get_member(&entry, &crate::heap::PropKey::Str("1".into()))?;
            set_entry(interp, id, b == Builtin::WeakMapCtor, key, value)?;
        }
    }
    Ok(Value::Ref(id))
}

fn set_entry(interp: &mut Interp, id: HeapId, weak: bool, key: Value, value: Value) -> RunResult<()> {
    if weak {
        let Value::Ref(key_id) = key else {
            return Err(RunError::type_error("Invalid value used as weak map key"));
        };
        let HeapData::WeakMap(map) = interp.heap.get_mut(id) else {
            unreachable!("weak map receiver");
        };
        map.entries.insert(key_id, value);
    } else {
        let HeapData::Map(map) = interp.heap.get_mut(id) else {
            unreachable!("map receiver");
        };
        map.entries.insert(MapKey(key), value);
    }
    Ok(())
}

fn expect_map(interp: &Interp, this: &Value) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if matches!(interp.heap.get(*id), HeapData::Map(_)) => Ok(*id),
        _ => Err(RunError::type_error("Receiver is not a Map")),
    }
}

fn expect_weak_map(interp: &Interp, this: &Value) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if matches!(interp.heap.get(*id), HeapData::WeakMap(_)) => Ok(*id),
        _ => Err(RunError::type_error("Receiver is not a WeakMap")),
    }
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let value = args.get(1).cloned().unwrap_or(Value::Undefined);

    match b {
        MapGet => {
            let id = expect_map(interp, this)?;
            let HeapData::Map(map) = interp.heap.get(id) else { unreachable!() };
            Ok(map.entries.get(&MapKey(key)).cloned().unwrap_or(Value::Undefined))
        }
        MapSet => {
            let id = expect_map(interp, this)?;
            set_entry(interp, id, false, key, value)?;
            // set() chains.
            Ok(this.clone())
        }
        MapHas => {
            let id = expect_map(interp, this)?;
            let HeapData::Map(map) = interp.heap.get(id) else { unreachable!() };
            Ok(Value::Bool(map.entries.contains_key(&MapKey(key))))
        }
        MapDelete => {
            let id = expect_map(interp, this)?;
            let HeapData::Map(map) = interp.heap.get_mut(id) else { unreachable!() };
            Ok(Value::Bool(map.entries.shift_remove(&MapKey(key)).is_some()))
        }
        MapClear => {
            let id = expect_map(interp, this)?;
            let HeapData::Map(map) = interp.heap.get_mut(id) else { unreachable!() };
            map.entries.clear();
            Ok(Value::Undefined)
        }
        MapKeys | MapValues => {
            let id = expect_map(interp, this)?;
            let HeapData::Map(map) = interp.heap.get(id) else { unreachable!() };
            let values: Vec<Value> = if b == MapKeys {
                map.entries.keys().map(|k| k.0.clone()).collect()
            } else {
                map.entries.values().cloned().collect()
            };
            let arr = interp.heap.alloc_array(values);
            let iter = NativeIter::Array { arr, idx: 0 };
            Ok(Value::Ref(interp.heap.alloc(HeapData::NativeIter(iter))))
        }
        MapEntries => {
            let id = expect_map(interp, this)?;
            let iter = NativeIter::MapEntries { map: id, idx: 0 };
            Ok(Value::Ref(interp.heap.alloc(HeapData::NativeIter(iter))))
        }
        MapForEach => {
            let id = expect_map(interp, this)?;
            let callback = key;
            let HeapData::Map(map) = interp.heap.get(id) else { unreachable!() };
            let entries: Vec<(Value, Value)> = map
                .entries
                .iter()
                .map(|(k, v)| (k.0.clone(), v.clone()))
                .collect();
            for (k, v) in entries {
                interp.call_value(&callback, Value::Undefined, &[v, k, this.clone()])?;
            }
            Ok(Value::Undefined)
        }
        WeakMapGet => {
            let id = expect_weak_map(interp, this)?;
            let Value::Ref(key_id) = key else {
                return Ok(Value::Undefined);
            };
            let HeapData::WeakMap(map) = interp.heap.get(id) else { unreachable!() };
            Ok(map.entries.get(&key_id).cloned().unwrap_or(Value::Undefined))
        }
        WeakMapSet => {
            let id = expect_weak_map(interp, this)?;
            set_entry(interp, id, true, key, value)?;
            Ok(this.clone())
        }
        WeakMapHas => {
            let id = expect_weak_map(interp, this)?;
            let Value::Ref(key_id) = key else {
                return Ok(Value::Bool(false));
            };
            let HeapData::WeakMap(map) = interp.heap.get(id) else { unreachable!() };
            Ok(Value::Bool(map.entries.contains_key(&key_id)))
        }
        WeakMapDelete => {
            let id = expect_weak_map(interp, this)?;
            let Value::Ref(key_id) = key else {
                return Ok(Value::Bool(false));
            };
            let HeapData::WeakMap(map) = interp.heap.get_mut(id) else { unreachable!() };
            Ok(Value::Bool(map.entries.remove(&key_id).is_some()))
        }
        _ => unreachable!("non-collection builtin dispatched to collections"),
    }
}

/// Generator `next`/`return`/`throw` and plain iterator `next`.
pub(crate) fn call_iter(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let arg = args.first().cloned().unwrap_or(Value::Undefined);
    match b {
        GenNext | GenReturn | GenThrow => {
            let Value::Ref(id) = this else {
                return Err(RunError::type_error("Receiver is not a generator"));
            };
            if !matches!(interp.heap.get(*id), HeapData::Generator(_)) {
                return Err(RunError::type_error("Receiver is not a generator"));
            }
            let resume = match b {
                GenNext => GenResume::Next(arg),
                GenReturn => GenResume::Return(arg),
                _ => GenResume::Throw(arg),
            };
            let (done, value) = match generator::step(interp, *id, resume)? {
                GenStep::Yield(v) => (false, v),
                GenStep::Done(v) => (true, v),
            };
            Ok(iterator::make_iter_result(interp, done, value))
        }
        IterNext => {
            let (done, value) = iterator::iterator_next(interp, this)?;
            Ok(iterator::make_iter_result(interp, done, value))
        }
        _ => unreachable!("non-iterator builtin dispatched to iterators"),
    }
}
