//! The iteration protocol.
//!
//! `for (x of it)` and `yield*` drive sync iterators; the CPS'd `for await`
//! drives the promise-returning shape through `__getAsyncIterator` /
//! `__iteratorNext`. Built-in containers (arrays, strings, maps) iterate
//! through native iterator states without allocating closure machinery;
//! anything else goes through `Symbol.iterator` or a plain `next` method,
//! wherever that method came from.

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    generator::{self, GenResume, GenStep},
    heap::{HeapData, HeapId, NativeIter, PropKey},
    intern::StaticSym,
    promise,
    value::Value,
};

/// Obtains a sync iterator for `value`.
pub(crate) fn get_iterator(interp: &mut Interp, value: &Value) -> RunResult<Value> {
    match value {
        Value::Str(s) => {
            let id = interp
                .heap
                .alloc(HeapData::NativeIter(NativeIter::Str { s: s.clone(), idx: 0 }));
            Ok(Value::Ref(id))
        }
        Value::Ref(id) => match interp.heap.get(*id) {
            HeapData::Array(_) => {
                let iter = NativeIter::Array { arr: *id, idx: 0 };
                Ok(Value::Ref(interp.heap.alloc(HeapData::NativeIter(iter))))
            }
            HeapData::Map(_) => {
                let iter = NativeIter::MapEntries { map: *id, idx: 0 };
                Ok(Value::Ref(interp.heap.alloc(HeapData::NativeIter(iter))))
            }
            HeapData::Generator(_) | HeapData::NativeIter(_) => Ok(value.clone()),
            HeapData::Object(_) => {
                let iter_key = PropKey::Sym(StaticSym::Iterator.into());
                let method = interp.get_member(value, &iter_key)?;
                if method.is_callable(interp.heap) {
                    return interp.call_value(&method, value.clone(), &[]);
                }
                // An object carrying a plain `next` method is already an
                // iterator, wherever that object was produced.
                let next = interp.get_member(value, &PropKey::Str("next".into()))?;
                if next.is_callable(interp.heap) {
                    return Ok(value.clone());
                }
                Err(not_iterable(interp, value))
            }
            _ => Err(not_iterable(interp, value)),
        },
        _ => Err(not_iterable(interp, value)),
    }
}

fn not_iterable(interp: &Interp, value: &Value) -> RunError {
    RunError::type_error(format!(
        "{} is not iterable",
        value.to_display(interp.heap, interp.interner)
    ))
}

/// `it.next()` with no argument.
pub(crate) fn iterator_next(interp: &mut Interp, iter: &Value) -> RunResult<(bool, Value)> {
    iterator_next_with(interp, iter, Value::Undefined)
}

/// `it.next(arg)`, normalized to a `(done, value)` pair.
pub(crate) fn iterator_next_with(interp: &mut Interp, iter: &Value, arg: Value) -> RunResult<(bool, Value)> {
    if let Value::Ref(id) = iter {
        match interp.heap.get(*id) {
            HeapData::NativeIter(_) => return native_next(interp, *id),
            HeapData::Generator(_) => {
                return Ok(match generator::step(interp, *id, GenResume::Next(arg))? {
                    GenStep::Yield(v) => (false, v),
                    GenStep::Done(v) => (true, v),
                });
            }
            _ => {}
        }
    }
    let next = interp.get_member(iter, &PropKey::Str("next".into()))?;
    if !next.is_callable(interp.heap) {
        return Err(RunError::type_error("iterator has no next method"));
    }
    let result = interp.call_value(&next, iter.clone(), &[arg])?;
    parse_iter_result(interp, &result)
}

/// Forwards `throw(e)` into an iterator. Returns `None` when the iterator
/// has no throw method (the caller re-raises locally).
pub(crate) fn iterator_throw(interp: &mut Interp, iter: &Value, error: Value) -> RunResult<Option<(bool, Value)>> {
    if let Value::Ref(id) = iter
        && matches!(interp.heap.get(*id), HeapData::Generator(_))
    {
        return Ok(Some(match generator::step(interp, *id, GenResume::Throw(error))? {
            GenStep::Yield(v) => (false, v),
            GenStep::Done(v) => (true, v),
        }));
    }
    let throw = interp.get_member(iter, &PropKey::Str("throw".into()))?;
    if !throw.is_callable(interp.heap) {
        return Ok(None);
    }
    let result = interp.call_value(&throw, iter.clone(), &[error])?;
    Ok(Some(parse_iter_result(interp, &result)?))
}

/// Closes an iterator with `return(v)`, ignoring iterators without one.
pub(crate) fn iterator_return(interp: &mut Interp, iter: &Value, value: Value) -> RunResult<()> {
    if let Value::Ref(id) = iter
        && matches!(interp.heap.get(*id), HeapData::Generator(_))
    {
        generator::step(interp, *id, GenResume::Return(value))?;
        return Ok(());
    }
    let ret = interp.get_member(iter, &PropKey::Str("return".into()))?;
    if ret.is_callable(interp.heap) {
        interp.call_value(&ret, iter.clone(), &[value])?;
    }
    Ok(())
}

/// Reads `done`/`value` off an iterator result object.
pub(crate) fn parse_iter_result(interp: &mut Interp, result: &Value) -> RunResult<(bool, Value)> {
    if !matches!(result, Value::Ref(_)) {
        return Err(RunError::type_error("iterator result is not an object"));
    }
    let done = interp.get_member(result, &PropKey::Str("done".into()))?.truthy();
    let value = interp.get_member(result, &PropKey::Str("value".into()))?;
    Ok((done, value))
}

/// Allocates a `{ value, done }` result object.
pub(crate) fn make_iter_result(interp: &mut Interp, done: bool, value: Value) -> Value {
    let id = interp.heap.alloc_object(None);
    let obj = interp.heap.expect_object_mut(id);
    obj.insert(PropKey::Str("value".into()), value);
    obj.insert(PropKey::Str("done".into()), Value::Bool(done));
    Value::Ref(id)
}

/// Advances a native iterator state.
fn native_next(interp: &mut Interp, id: HeapId) -> RunResult<(bool, Value)> {
    let HeapData::NativeIter(iter) = interp.heap.get_mut(id) else {
        return Err(RunError::type_error("not an iterator"));
    };
    match iter {
        NativeIter::Array { arr, idx } => {
            let arr = *arr;
            let i = *idx;
            *idx += 1;
            let HeapData::Array(data) = interp.heap.get(arr) else {
                return Err(RunError::type_error("array iterator target is gone"));
            };
            if i >= data.length() {
                Ok((true, Value::Undefined))
            } else {
                // Holes read as undefined.
                Ok((false, data.get_index(i).cloned().unwrap_or(Value::Undefined)))
            }
        }
        NativeIter::Str { s, idx } => {
            let rest: &str = &s[*idx..];
            match rest.chars().next() {
                Some(c) => {
                    *idx += c.len_utf8();
                    Ok((false, Value::str(c.to_string())))
                }
                None => Ok((true, Value::Undefined)),
            }
        }
        NativeIter::MapEntries { map, idx } => {
            let map = *map;
            let i = *idx;
            *idx += 1;
            let HeapData::Map(data) = interp.heap.get(map) else {
                return Err(RunError::type_error("map iterator target is gone"));
            };
            match data.entries.get_index(i) {
                Some((key, value)) => {
                    let pair = vec![key.0.clone(), value.clone()];
                    let entry = interp.heap.alloc_array(pair);
                    Ok((false, Value::Ref(entry)))
                }
                None => Ok((true, Value::Undefined)),
            }
        }
        NativeIter::Keys { keys, idx } => {
            let i = *idx;
            *idx += 1;
            match keys.get(i) {
                Some(key) => Ok((false, Value::Str(key.clone()))),
                None => Ok((true, Value::Undefined)),
            }
        }
        NativeIter::AsyncWrap { .. } => Err(RunError::type_error(
            "async iterator cannot be driven synchronously",
        )),
    }
}

// ==========================
// Async adaptation, used by the CPS runtime helpers.

/// `__getAsyncIterator(x)`: `x[Symbol.asyncIterator]()` if present, else a
/// wrapper around the sync iterator whose results are promise-lifted.
pub(crate) fn get_async_iterator(interp: &mut Interp, value: &Value) -> RunResult<Value> {
    if let Value::Ref(id) = value
        && matches!(interp.heap.get(*id), HeapData::Object(_))
    {
        let async_key = PropKey::Sym(StaticSym::AsyncIterator.into());
        let method = interp.get_member(value, &async_key)?;
        if method.is_callable(interp.heap) {
            return interp.call_value(&method, value.clone(), &[]);
        }
    }
    let inner = get_iterator(interp, value)?;
    let id = interp.heap.alloc(HeapData::NativeIter(NativeIter::AsyncWrap { inner }));
    Ok(Value::Ref(id))
}

/// `__iteratorNext(it)`: invokes `next()` and promise-lifts the result.
pub(crate) fn iterator_next_lifted(interp: &mut Interp, iter: &Value) -> RunResult<Value> {
    // The async wrapper drives its inner sync iterator.
    if let Value::Ref(id) = iter
        && let HeapData::NativeIter(NativeIter::AsyncWrap { inner }) = interp.heap.get(*id)
    {
        let inner = inner.clone();
        let (done, value) = iterator_next(interp, &inner)?;
        let result = make_iter_result(interp, done, value);
        return Ok(lift(interp, result));
    }

    if let Value::Ref(id) = iter
        && matches!(interp.heap.get(*id), HeapData::Generator(_) | HeapData::NativeIter(_))
    {
        let (done, value) = iterator_next(interp, iter)?;
        let result = make_iter_result(interp, done, value);
        return Ok(lift(interp, result));
    }

    let next = interp.get_member(iter, &PropKey::Str("next".into()))?;
    if !next.is_callable(interp.heap) {
        return Err(RunError::type_error("iterator has no next method"));
    }
    let result = interp.call_value(&next, iter.clone(), &[])?;
    // Already a promise: hand it through untouched.
    if let Value::Ref(id) = &result
        && matches!(interp.heap.get(*id), HeapData::Promise(_))
    {
        return Ok(result);
    }
    Ok(lift(interp, result))
}

/// Wraps a value in a resolved promise.
pub(crate) fn lift(interp: &mut Interp, value: Value) -> Value {
    let id = promise::alloc_promise(interp.heap);
    promise::resolve(interp.heap, interp.queue, id, value);
    Value::Ref(id)
}

/// Canonical array-index form of a property name, if it is one.
pub(crate) fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = key.parse().ok()?;
    if n < u64::from(u32::MAX) {
        Some(n as u32)
    } else {
        None
    }
}
