//! Tests for promises, async functions, and the event loop.
//!
//! Side-effect ordering is observed through a host function that records
//! strings into a shared log, which makes the CPS transformation's "same
//! visible side effects" guarantee directly checkable.

use std::{cell::RefCell, rc::Rc, time::Duration};

use kairo::{Engine, EngineError, EngineLimits, HostValue};
use pretty_assertions::assert_eq;

/// An engine plus a shared log fed by the global `record(..)` function.
fn engine_with_log() -> (Engine, Rc<RefCell<Vec<String>>>) {
    let mut engine = Engine::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    engine
        .set_global_function("record", move |_this, args| {
            let entry = args.first().map(ToString::to_string).unwrap_or_default();
            sink.borrow_mut().push(entry);
            Ok(HostValue::Undefined)
        })
        .unwrap();
    (engine, log)
}

fn entries(log: &Rc<RefCell<Vec<String>>>) -> Vec<String> {
    log.borrow().clone()
}

// === Async functions ===

#[test]
fn async_function_settles_to_the_returned_value() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("async function f(){ return await Promise.resolve(42); } f().then(v => record('got:' + v));")
        .unwrap();
    assert_eq!(entries(&log), vec!["got:42"]);
}

#[test]
fn await_suspends_at_the_statement_boundary() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("async function f(){ record('a'); await Promise.resolve(); record('b'); } f(); record('sync');")
        .unwrap();
    // Code before the first await runs synchronously; the continuation runs
    // as a microtask after the synchronous frame.
    assert_eq!(entries(&log), vec!["a", "sync", "b"]);
}

#[test]
fn sync_throw_in_async_function_rejects_the_promise() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("async function f(){ throw new Error('early'); } f().catch(e => record('caught:' + e.message));")
        .unwrap();
    assert_eq!(entries(&log), vec!["caught:early"]);
}

#[test]
fn await_rejection_is_catchable_in_script() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "async function f(){ try { await Promise.reject(new Error('no')); record('skipped'); } \
             catch (e) { record('caught:' + e.message); } } f();",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["caught:no"]);
}

#[test]
fn async_loop_with_await_preserves_order() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "async function f(){ for (let i = 0; i < 3; i++) { await Promise.resolve(); record('i' + i); } \
             record('done'); } f();",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["i0", "i1", "i2", "done"]);
}

#[test]
fn async_while_with_break() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "async function f(){ let n = 0; while (true) { await Promise.resolve(); n++; \
             if (n === 2) break; } record('n=' + n); } f();",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["n=2"]);
}

#[test]
fn for_await_over_a_sync_iterable() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("async function f(){ let total = 0; for await (const v of [1,2,3]) { total += v; } record(total); } f();")
        .unwrap();
    assert_eq!(entries(&log), vec!["6"]);
}

#[test]
fn for_await_over_promises() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "let src = { [Symbol.iterator]() { let n = 0; return { next() { n++; \
             return n <= 2 ? { value: Promise.resolve(n), done: false } : { value: undefined, done: true }; } }; } }; \
             async function f(){ for await (const v of src) { record(v); } } f();",
        )
        .unwrap();
    // Promise-valued results are awaited before the body runs... the async
    // iterator wrapper lifts each result; values arrive settled.
    assert_eq!(entries(&log).len(), 2);
}

#[test]
fn finally_runs_before_the_resolution_of_a_return() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "async function f(){ try { await Promise.resolve(); return 'v'; } finally { record('cleanup'); } } \
             f().then(v => record('then:' + v));",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["cleanup", "then:v"]);
}

// === Promise runtime ===

#[test]
fn microtasks_run_in_registration_order() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("let p = Promise.resolve(1); p.then(v => record('h1')); p.then(v => record('h2')); record('sync');")
        .unwrap();
    assert_eq!(entries(&log), vec!["sync", "h1", "h2"]);
}

#[test]
fn then_chains_transform_values() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("Promise.resolve(2).then(v => v * 10).then(v => record('v:' + v));")
        .unwrap();
    assert_eq!(entries(&log), vec!["v:20"]);
}

#[test]
fn catch_recovers_and_the_chain_continues() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "Promise.reject(new Error('x')).catch(e => 'recovered').then(v => record(v));",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["recovered"]);
}

#[test]
fn finally_observes_without_changing_settlement() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("Promise.resolve(7).finally(() => record('fin')).then(v => record('v:' + v));")
        .unwrap();
    assert_eq!(entries(&log), vec!["fin", "v:7"]);
}

#[test]
fn executor_runs_synchronously_and_exceptions_reject() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("new Promise((res, rej) => { record('exec'); res(1); }); record('after');")
        .unwrap();
    assert_eq!(entries(&log), vec!["exec", "after"]);

    let (mut engine, log) = engine_with_log();
    engine
        .run("new Promise(() => { throw new Error('boom'); }).catch(e => record(e.message));")
        .unwrap();
    assert_eq!(entries(&log), vec!["boom"]);
}

#[test]
fn resolving_with_a_thenable_adopts_its_state() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "let thenable = { then(res, rej) { res('adopted'); } }; \
             Promise.resolve(thenable).then(v => record(v));",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["adopted"]);
}

#[test]
fn promise_all_collects_in_order() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("Promise.all([Promise.resolve(1), 2, Promise.resolve(3)]).then(vs => record(vs.join(',')));")
        .unwrap();
    assert_eq!(entries(&log), vec!["1,2,3"]);
}

#[test]
fn promise_all_rejects_on_first_rejection() {
    let (mut engine, log) = engine_with_log();
    engine
        .run(
            "Promise.all([Promise.resolve(1), Promise.reject(new Error('bad'))])\
             .then(v => record('ok'), e => record('err:' + e.message));",
        )
        .unwrap();
    assert_eq!(entries(&log), vec!["err:bad"]);
}

#[test]
fn promise_race_adopts_the_first_settled() {
    let (mut engine, log) = engine_with_log();
    engine
        .run("Promise.race([Promise.resolve('fast'), new Promise(() => {})]).then(v => record(v));")
        .unwrap();
    assert_eq!(entries(&log), vec!["fast"]);
}

// === Event loop ===

#[test]
fn host_tasks_run_fifo_after_microtasks() {
    let (mut engine, log) = engine_with_log();
    engine
        .schedule_task(|eng| {
            eng.evaluate("record('task1');").unwrap();
        })
        .unwrap();
    engine
        .schedule_task(|eng| {
            eng.evaluate("record('task2');").unwrap();
        })
        .unwrap();
    engine
        .run("Promise.resolve().then(() => record('micro')); record('main');")
        .unwrap();
    assert_eq!(entries(&log), vec!["main", "micro", "task1", "task2"]);
}

#[test]
fn tasks_scheduled_during_a_task_run_in_the_same_drain() {
    let (mut engine, log) = engine_with_log();
    engine
        .schedule_task(|eng| {
            eng.evaluate("record('outer');").unwrap();
            eng.schedule_task(|eng| {
                eng.evaluate("record('inner');").unwrap();
            })
            .unwrap();
        })
        .unwrap();
    engine.run("record('main');").unwrap();
    assert_eq!(entries(&log), vec!["main", "outer", "inner"]);
}

#[test]
fn queues_are_empty_after_run() {
    let (mut engine, _log) = engine_with_log();
    engine
        .run("Promise.resolve().then(() => Promise.resolve().then(() => record('deep')));")
        .unwrap();
    assert!(engine.is_idle());
}

#[test]
fn unhandled_rejection_surfaces_on_the_exception_stream() {
    let mut engine = Engine::new();
    engine.run("Promise.reject(new Error('lost'));").unwrap();
    let events = engine.exceptions();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].context, "unhandled promise rejection");
    assert!(events[0].message.contains("lost"), "{}", events[0].message);
}

#[test]
fn handled_rejection_does_not_surface() {
    let mut engine = Engine::new();
    engine
        .run("Promise.reject(new Error('seen')).catch(e => e);")
        .unwrap();
    assert!(engine.exceptions().is_empty());
}

#[test]
fn execution_timeout_interrupts_the_run() {
    let mut engine = Engine::with_limits(EngineLimits {
        timeout: Some(Duration::from_millis(50)),
        max_stack_depth: 256,
    });
    let err = engine.run("while (true) {}").unwrap_err();
    assert!(matches!(err, EngineError::Timeout));
}

#[test]
fn stack_overflow_raises_a_catchable_range_error() {
    let mut engine = Engine::new();
    let result = engine
        .run("function f(){ return f(); } let out; try { f(); } catch (e) { out = e.message; } out;")
        .unwrap();
    assert_eq!(result, HostValue::String("Maximum call stack size exceeded".to_owned()));
}

#[test]
fn dispose_discards_pending_tasks_and_marks_unusable() {
    let (mut engine, log) = engine_with_log();
    engine
        .schedule_task(|eng| {
            eng.evaluate("record('never');").unwrap();
        })
        .unwrap();
    engine.dispose();
    engine.dispose(); // idempotent
    assert!(matches!(engine.evaluate("1;"), Err(EngineError::Disposed)));
    assert!(matches!(engine.schedule_task(|_| {}), Err(EngineError::Disposed)));
    assert!(entries(&log).is_empty());
}
