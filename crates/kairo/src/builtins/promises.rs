//! Promise statics, prototype methods, and the CPS runtime helpers.

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    heap::{HeapData, HeapId, Resolver, ResolverKind},
    iterator, promise,
    value::Value,
};

use super::Builtin;

fn expect_promise(interp: &Interp, this: &Value) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if matches!(interp.heap.get(*id), HeapData::Promise(_)) => Ok(*id),
        _ => Err(RunError::type_error("Receiver is not a promise")),
    }
}

fn resolver(interp: &mut Interp, target: HeapId, kind: ResolverKind) -> Value {
    Value::Ref(interp.heap.alloc(HeapData::Resolver(Resolver { target, kind })))
}

/// `new Promise(executor)`: the executor runs synchronously; an exception
/// from it rejects the promise.
pub(crate) fn construct(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    let Some(executor) = args.first().cloned() else {
        return Err(RunError::type_error("Promise resolver is not a function"));
    };
    if !executor.is_callable(interp.heap) {
        return Err(RunError::type_error("Promise resolver is not a function"));
    }
    let id = promise::alloc_promise(interp.heap);
    let resolve = resolver(interp, id, ResolverKind::Resolve);
    let reject = resolver(interp, id, ResolverKind::Reject);
    match interp.call_value(&executor, Value::Undefined, &[resolve, reject]) {
        Ok(_) => {}
        Err(err) if err.is_catchable() => {
            let reason = interp.thrown_to_value(err)?;
            promise::reject(interp.heap, interp.queue, id, reason);
        }
        Err(fatal) => return Err(fatal),
    }
    Ok(Value::Ref(id))
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    match b {
        PromiseResolve => {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            // An existing promise of this runtime passes through unchanged.
            if let Value::Ref(id) = &value
                && matches!(interp.heap.get(*id), HeapData::Promise(_))
            {
                return Ok(value);
            }
            let id = promise::alloc_promise(interp.heap);
            promise::resolve(interp.heap, interp.queue, id, value);
            Ok(Value::Ref(id))
        }
        PromiseReject => {
            let reason = args.first().cloned().unwrap_or(Value::Undefined);
            let id = promise::alloc_promise(interp.heap);
            promise::reject(interp.heap, interp.queue, id, reason);
            Ok(Value::Ref(id))
        }
        PromiseAll => promise_all(interp, args),
        PromiseRace => promise_race(interp, args),
        PromiseThen => {
            let id = expect_promise(interp, this)?;
            let on_fulfilled = args.first().filter(|v| v.is_callable(interp.heap)).cloned();
            let on_rejected = args.get(1).filter(|v| v.is_callable(interp.heap)).cloned();
            let derived = promise::then(interp.heap, interp.queue, id, on_fulfilled, on_rejected);
            Ok(Value::Ref(derived))
        }
        PromiseCatch => {
            let id = expect_promise(interp, this)?;
            let on_rejected = args.first().filter(|v| v.is_callable(interp.heap)).cloned();
            let derived = promise::then(interp.heap, interp.queue, id, None, on_rejected);
            Ok(Value::Ref(derived))
        }
        PromiseFinally => {
            let id = expect_promise(interp, this)?;
            // The callback observes the settlement but does not change it;
            // register it before the pass-through derivation so it runs
            // first.
            if let Some(callback) = args.first().filter(|v| v.is_callable(interp.heap)).cloned() {
                promise::observe(interp.heap, interp.queue, id, callback);
            }
            let derived = promise::then(interp.heap, interp.queue, id, None, None);
            Ok(Value::Ref(derived))
        }
        AwaitHelper => {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            if let Value::Ref(id) = &value
                && matches!(interp.heap.get(*id), HeapData::Promise(_))
            {
                return Ok(value);
            }
            Ok(iterator::lift(interp, value))
        }
        GetAsyncIterator => {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            iterator::get_async_iterator(interp, &value)
        }
        IteratorNext => {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            iterator::iterator_next_lifted(interp, &value)
        }
        _ => unreachable!("non-promise builtin dispatched to promises"),
    }
}

fn collect_iterable(interp: &mut Interp, value: &Value) -> RunResult<Vec<Value>> {
    let iter = interp.get_iterator(value)?;
    let mut out = Vec::new();
    loop {
        let (done, v) = interp.iterator_next(&iter)?;
        if done {
            return Ok(out);
        }
        out.push(v);
    }
}

/// `Promise.all([..])`: resolves with an array once every input fulfills,
/// rejects with the first rejection.
fn promise_all(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    let inputs = collect_iterable(interp, &args.first().cloned().unwrap_or(Value::Undefined))?;
    let target = promise::alloc_promise(interp.heap);
    if inputs.is_empty() {
        let results = interp.heap.alloc_array(vec![]);
        promise::resolve(interp.heap, interp.queue, target, Value::Ref(results));
        return Ok(Value::Ref(target));
    }

    let results = interp.heap.alloc_array(vec![Value::Undefined; inputs.len()]);
    let state = promise::alloc_all_state(interp.heap, inputs.len() as u32, results);
    let reject = resolver(interp, target, ResolverKind::Reject);

    for (index, input) in inputs.into_iter().enumerate() {
        let element = resolver(
            interp,
            target,
            ResolverKind::AllElement {
                index: index as u32,
                state,
            },
        );
        let input_promise = ensure_promise(interp, input);
        promise::then(
            interp.heap,
            interp.queue,
            input_promise,
            Some(element),
            Some(reject.clone()),
        );
    }
    Ok(Value::Ref(target))
}

/// `Promise.race([..])`: adopts the first settlement.
fn promise_race(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    let inputs = collect_iterable(interp, &args.first().cloned().unwrap_or(Value::Undefined))?;
    let target = promise::alloc_promise(interp.heap);
    let resolve = resolver(interp, target, ResolverKind::Resolve);
    let reject = resolver(interp, target, ResolverKind::Reject);
    for input in inputs {
        let input_promise = ensure_promise(interp, input);
        promise::then(
            interp.heap,
            interp.queue,
            input_promise,
            Some(resolve.clone()),
            Some(reject.clone()),
        );
    }
    Ok(Value::Ref(target))
}

fn ensure_promise(interp: &mut Interp, value: Value) -> HeapId {
    if let Value::Ref(id) = &value
        && matches!(interp.heap.get(*id), HeapData::Promise(_))
    {
        return *id;
    }
    let id = promise::alloc_promise(interp.heap);
    promise::resolve(interp.heap, interp.queue, id, value);
    id
}
