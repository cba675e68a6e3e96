//! Host interop surface: global functions, value conversion, streams.

use std::{cell::RefCell, rc::Rc};

use kairo::{Engine, EngineError, HostValue};
use pretty_assertions::assert_eq;

#[test]
fn host_function_receives_receiver_and_arguments() {
    let mut engine = Engine::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    engine
        .set_global_function("probe", move |this, args| {
            sink.borrow_mut().push((this.clone(), args.to_vec()));
            Ok(HostValue::Number(args.len() as f64))
        })
        .unwrap();

    let result = engine.run("probe(1, 'two', [3]);").unwrap();
    assert_eq!(result, HostValue::Number(3.0));

    let calls = seen.borrow();
    assert_eq!(calls.len(), 1);
    let (this, args) = &calls[0];
    assert_eq!(*this, HostValue::Undefined);
    assert_eq!(args[0], HostValue::Number(1.0));
    assert_eq!(args[1], HostValue::String("two".to_owned()));
    assert_eq!(args[2], HostValue::Array(vec![HostValue::Number(3.0)]));
}

#[test]
fn host_function_as_method_receives_the_object_receiver() {
    let mut engine = Engine::new();
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    engine
        .set_global_function("whoAmI", move |this, _args| {
            *sink.borrow_mut() = Some(this.clone());
            Ok(HostValue::Undefined)
        })
        .unwrap();
    engine.run("let o = { tag: 'me', f: whoAmI }; o.f();").unwrap();
    let this = seen.borrow().clone().expect("host function was called");
    assert_eq!(
        this,
        HostValue::Object(vec![
            ("tag".to_owned(), HostValue::String("me".to_owned())),
            ("f".to_owned(), HostValue::Opaque("function whoAmI() { [host code] }".to_owned())),
        ])
    );
}

#[test]
fn host_errors_propagate_as_script_errors() {
    let mut engine = Engine::new();
    engine
        .set_global_function("explode", |_this, _args| Err("host went wrong".to_owned()))
        .unwrap();

    // Catchable inside script.
    let result = engine
        .run("let msg; try { explode(); } catch (e) { msg = e.message; } msg;")
        .unwrap();
    assert_eq!(result, HostValue::String("host went wrong".to_owned()));

    // Uncaught: surfaces to the embedder.
    let err = engine.run("explode();").unwrap_err();
    let EngineError::Script(e) = err else {
        panic!("expected script error");
    };
    assert_eq!(e.message, "host went wrong");
}

#[test]
fn host_values_round_trip_through_script() {
    let mut engine = Engine::new();
    engine
        .set_global_function("echo", |_this, args| {
            Ok(args.first().cloned().unwrap_or(HostValue::Undefined))
        })
        .unwrap();
    let result = engine
        .run("let v = echo({ n: 1, list: [true, null, 'x'] }); v.list[2] + v.n;")
        .unwrap();
    assert_eq!(result, HostValue::String("x1".to_owned()));
}

#[test]
fn console_log_feeds_the_debug_stream() {
    let mut engine = Engine::new();
    engine.run("console.log('hello', 42);").unwrap();
    let messages = engine.debug_messages();
    assert!(!messages.is_empty());
    let rendered = messages
        .iter()
        .flat_map(|m| m.variables.iter())
        .find(|(name, _)| name == "message")
        .map(|(_, v)| v.to_string())
        .expect("console.log publishes a message entry");
    assert_eq!(rendered, "hello 42");
}

#[test]
fn debug_stream_drains() {
    let mut engine = Engine::new();
    engine.run("console.log('once');").unwrap();
    assert!(!engine.debug_messages().is_empty());
    assert!(engine.debug_messages().is_empty());
}

#[test]
fn globals_persist_across_evaluations() {
    let mut engine = Engine::new();
    engine.run("let counter = 0; function bump(){ return ++counter; }").unwrap();
    assert_eq!(engine.run("bump();").unwrap(), HostValue::Number(1.0));
    assert_eq!(engine.run("bump();").unwrap(), HostValue::Number(2.0));
    assert_eq!(engine.run("counter;").unwrap(), HostValue::Number(2.0));
}

#[test]
fn heap_stats_reflect_allocation() {
    let mut engine = Engine::new();
    let before = engine.heap_stats();
    engine.run("let xs = [1,2,3]; let o = { a: xs };").unwrap();
    let after = engine.heap_stats();
    assert!(after.total_slots > before.total_slots);
    assert!(after.objects_by_type.get("Array").copied().unwrap_or(0) >= 1);
}

#[test]
fn bigint_crosses_the_host_boundary() {
    let mut engine = Engine::new();
    let result = engine.run("2n ** 100n;").unwrap();
    let HostValue::BigInt(b) = result else {
        panic!("expected bigint, got {result:?}");
    };
    assert_eq!(b.to_string(), "1267650600228229401496703205376");
}

#[test]
fn evaluate_does_not_drain_but_run_does() {
    let mut engine = Engine::new();
    let flag = Rc::new(RefCell::new(false));
    let sink = flag.clone();
    engine
        .set_global_function("mark", move |_this, _args| {
            *sink.borrow_mut() = true;
            Ok(HostValue::Undefined)
        })
        .unwrap();

    engine.evaluate("Promise.resolve().then(() => mark());").unwrap();
    assert!(!*flag.borrow(), "evaluate must not drain the microtask queue");

    engine.run(";").unwrap();
    assert!(*flag.borrow(), "run drains pending microtasks");
}
