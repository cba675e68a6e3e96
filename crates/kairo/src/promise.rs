//! The promise state machine.
//!
//! A promise is a record of state, settled value, and reaction lists. State
//! transitions are one-way. Settling moves the matching reactions onto the
//! microtask queue; the evaluator runs them after the current synchronous
//! frame completes, in registration order.

use std::collections::VecDeque;

use crate::{
    heap::{Heap, HeapData, HeapId, PropKey, Property},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionKind {
    Fulfill,
    Reject,
}

/// A registered `then`/`catch`/`finally` callback. `handler` of `None` is a
/// pass-through reaction that forwards the settlement to `derived`.
#[derive(Debug, Clone)]
pub(crate) struct Reaction {
    pub handler: Option<Value>,
    /// The promise settled with the handler's result, when one was created.
    pub derived: Option<HeapId>,
}

#[derive(Debug, Clone)]
pub(crate) struct JsPromise {
    pub state: PromiseState,
    /// The settled value (or rejection reason); undefined while pending.
    pub result: Value,
    pub on_fulfilled: Vec<Reaction>,
    pub on_rejected: Vec<Reaction>,
    /// Whether a rejection handler was ever attached. Rejected promises that
    /// drain with this still false surface on the exception stream.
    pub handled: bool,
}

impl JsPromise {
    pub fn pending() -> Self {
        Self {
            state: PromiseState::Pending,
            result: Value::Undefined,
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
            handled: false,
        }
    }
}

/// A queued promise callback, run by the scheduler between synchronous
/// frames.
#[derive(Debug, Clone)]
pub(crate) enum Microtask {
    Reaction {
        kind: ReactionKind,
        handler: Option<Value>,
        arg: Value,
        derived: Option<HeapId>,
    },
    /// Adopt a thenable's eventual state: call `then_fn.call(thenable,
    /// resolve, reject)` once, where the capabilities settle `target`.
    AdoptThenable {
        thenable: Value,
        then_fn: Value,
        target: HeapId,
    },
}

/// The microtask queue plus unhandled-rejection bookkeeping. Host tasks live
/// on the engine itself since they close over it.
#[derive(Debug, Default)]
pub(crate) struct MicrotaskQueue {
    queue: VecDeque<Microtask>,
    /// Promises that rejected with no handler attached at settlement time.
    /// Checked again when the event loop drains to idle.
    rejection_candidates: Vec<HeapId>,
}

impl MicrotaskQueue {
    pub fn push(&mut self, task: Microtask) {
        self.queue.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Microtask> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn track_rejection(&mut self, id: HeapId) {
        self.rejection_candidates.push(id);
    }

    /// Drains the rejection candidates, returning those still unhandled.
    pub fn take_unhandled(&mut self, heap: &Heap) -> Vec<(HeapId, Value)> {
        std::mem::take(&mut self.rejection_candidates)
            .into_iter()
            .filter_map(|id| match heap.get(id) {
                HeapData::Promise(p) if !p.handled && p.state == PromiseState::Rejected => {
                    Some((id, p.result.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Allocates a fresh pending promise.
pub(crate) fn alloc_promise(heap: &mut Heap) -> HeapId {
    heap.alloc(HeapData::Promise(JsPromise::pending()))
}

/// Fulfills `id` with `value`. No-op when already settled.
pub(crate) fn fulfill(heap: &mut Heap, queue: &mut MicrotaskQueue, id: HeapId, value: Value) {
    let promise = heap.expect_promise_mut(id);
    if promise.state != PromiseState::Pending {
        return;
    }
    promise.state = PromiseState::Fulfilled;
    promise.result = value.clone();
    let reactions = std::mem::take(&mut promise.on_fulfilled);
    promise.on_rejected.clear();
    for reaction in reactions {
        queue.push(Microtask::Reaction {
            kind: ReactionKind::Fulfill,
            handler: reaction.handler,
            arg: value.clone(),
            derived: reaction.derived,
        });
    }
}

/// Rejects `id` with `reason`. No-op when already settled.
pub(crate) fn reject(heap: &mut Heap, queue: &mut MicrotaskQueue, id: HeapId, reason: Value) {
    let promise = heap.expect_promise_mut(id);
    if promise.state != PromiseState::Pending {
        return;
    }
    promise.state = PromiseState::Rejected;
    promise.result = reason.clone();
    let reactions = std::mem::take(&mut promise.on_rejected);
    promise.on_fulfilled.clear();
    if !promise.handled {
        queue.track_rejection(id);
    }
    for reaction in reactions {
        queue.push(Microtask::Reaction {
            kind: ReactionKind::Reject,
            handler: reaction.handler,
            arg: reason.clone(),
            derived: reaction.derived,
        });
    }
}

/// Resolves `id` with `value`, adopting thenables: resolving with a promise
/// (or any object carrying a callable `then`) defers to that thenable's
/// eventual state instead of fulfilling directly.
pub(crate) fn resolve(heap: &mut Heap, queue: &mut MicrotaskQueue, id: HeapId, value: Value) {
    enum Action {
        SelfCycle,
        Adopt(HeapId),
        Thenable(Value),
        Fulfill,
    }

    let action = if let Value::Ref(inner) = &value {
        match heap.get(*inner) {
            HeapData::Promise(_) if *inner == id => Action::SelfCycle,
            HeapData::Promise(_) => Action::Adopt(*inner),
            HeapData::Object(obj) => match obj.get_plain(&PropKey::Str("then".into())) {
                Some(then_fn) if then_fn.is_callable(heap) => Action::Thenable(then_fn.clone()),
                _ => Action::Fulfill,
            },
            _ => Action::Fulfill,
        }
    } else {
        Action::Fulfill
    };

    match action {
        Action::SelfCycle => {
            // Self-resolution deadlocks in spec terms; reject instead.
            let reason = Value::str("Chaining cycle detected");
            reject(heap, queue, id, reason);
        }
        Action::Adopt(inner) => adopt(heap, queue, id, inner),
        Action::Thenable(then_fn) => queue.push(Microtask::AdoptThenable {
            thenable: value,
            then_fn,
            target: id,
        }),
        Action::Fulfill => fulfill(heap, queue, id, value),
    }
}

/// Registers pass-through reactions on `inner` that settle `outer` the same
/// way.
fn adopt(heap: &mut Heap, queue: &mut MicrotaskQueue, outer: HeapId, inner: HeapId) {
    let inner_promise = heap.expect_promise_mut(inner);
    inner_promise.handled = true;
    match inner_promise.state {
        PromiseState::Pending => {
            inner_promise.on_fulfilled.push(Reaction {
                handler: None,
                derived: Some(outer),
            });
            inner_promise.on_rejected.push(Reaction {
                handler: None,
                derived: Some(outer),
            });
        }
        PromiseState::Fulfilled => {
            let value = inner_promise.result.clone();
            queue.push(Microtask::Reaction {
                kind: ReactionKind::Fulfill,
                handler: None,
                arg: value,
                derived: Some(outer),
            });
        }
        PromiseState::Rejected => {
            let reason = inner_promise.result.clone();
            queue.push(Microtask::Reaction {
                kind: ReactionKind::Reject,
                handler: None,
                arg: reason,
                derived: Some(outer),
            });
        }
    }
}

/// Registers `then(on_fulfilled, on_rejected)` on `id`, returning the
/// derived promise. Already-settled promises schedule the matching reaction
/// immediately.
pub(crate) fn then(
    heap: &mut Heap,
    queue: &mut MicrotaskQueue,
    id: HeapId,
    on_fulfilled: Option<Value>,
    on_rejected: Option<Value>,
) -> HeapId {
    let derived = alloc_promise(heap);
    let promise = heap.expect_promise_mut(id);
    // Any `then` forwards a rejection to the derived promise, so unhandled
    // tracking follows the chain tail rather than this promise.
    promise.handled = true;
    match promise.state {
        PromiseState::Pending => {
            promise.on_fulfilled.push(Reaction {
                handler: on_fulfilled,
                derived: Some(derived),
            });
            promise.on_rejected.push(Reaction {
                handler: on_rejected,
                derived: Some(derived),
            });
        }
        PromiseState::Fulfilled => {
            let arg = promise.result.clone();
            queue.push(Microtask::Reaction {
                kind: ReactionKind::Fulfill,
                handler: on_fulfilled,
                arg,
                derived: Some(derived),
            });
        }
        PromiseState::Rejected => {
            let arg = promise.result.clone();
            queue.push(Microtask::Reaction {
                kind: ReactionKind::Reject,
                handler: on_rejected,
                arg,
                derived: Some(derived),
            });
        }
    }
    derived
}

/// Registers an observer callback on both sides of `id` without deriving a
/// promise or affecting the settlement. Backs `finally`.
pub(crate) fn observe(heap: &mut Heap, queue: &mut MicrotaskQueue, id: HeapId, handler: Value) {
    let promise = heap.expect_promise_mut(id);
    match promise.state {
        PromiseState::Pending => {
            promise.on_fulfilled.push(Reaction {
                handler: Some(handler.clone()),
                derived: None,
            });
            promise.on_rejected.push(Reaction {
                handler: Some(handler),
                derived: None,
            });
        }
        PromiseState::Fulfilled => queue.push(Microtask::Reaction {
            kind: ReactionKind::Fulfill,
            handler: Some(handler),
            arg: Value::Undefined,
            derived: None,
        }),
        PromiseState::Rejected => queue.push(Microtask::Reaction {
            kind: ReactionKind::Reject,
            handler: Some(handler),
            arg: Value::Undefined,
            derived: None,
        }),
    }
}

/// Bookkeeping object for `Promise.all`: results array, remaining count, and
/// the combined target promise.
pub(crate) fn alloc_all_state(heap: &mut Heap, count: u32, results: HeapId) -> HeapId {
    let state = heap.alloc_object(None);
    let obj = heap.expect_object_mut(state);
    obj.insert(PropKey::Str("remaining".into()), Value::Num(f64::from(count)));
    obj.insert(PropKey::Str("results".into()), Value::Ref(results));
    state
}

/// Records one `Promise.all` element result. Returns the results array when
/// this was the last outstanding element.
pub(crate) fn all_element_settled(heap: &mut Heap, state: HeapId, index: u32, value: Value) -> Option<Value> {
    let obj = heap.expect_object_mut(state);
    let results = match obj.get_plain(&PropKey::Str("results".into())) {
        Some(Value::Ref(id)) => *id,
        _ => panic!("Promise.all state missing results array"),
    };
    let remaining = match obj.get_plain(&PropKey::Str("remaining".into())) {
        Some(Value::Num(n)) => *n,
        _ => panic!("Promise.all state missing counter"),
    };
    let remaining = remaining - 1.0;
    obj.props.insert(
        PropKey::Str("remaining".into()),
        Property::Value(Value::Num(remaining)),
    );
    if let HeapData::Array(arr) = heap.get_mut(results) {
        arr.set_index(index, value);
    }
    if remaining <= 0.0 {
        Some(Value::Ref(results))
    } else {
        None
    }
}
