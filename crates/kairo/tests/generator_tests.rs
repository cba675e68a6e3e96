//! Generator behavior through the embedding surface.
//!
//! The global scope persists across `evaluate` calls on one engine, so these
//! tests create a generator once and then drive it step by step, checking
//! each `next`/`throw`/`return` observation.

use kairo::{Engine, HostValue};
use pretty_assertions::assert_eq;

fn num(n: f64) -> HostValue {
    HostValue::Number(n)
}

fn s(text: &str) -> HostValue {
    HostValue::String(text.to_owned())
}

/// Drives a generator set up by `setup` through a sequence of expressions,
/// returning each completion value.
fn drive(setup: &str, steps: &[&str]) -> Vec<HostValue> {
    let mut engine = Engine::new();
    engine.run(setup).unwrap();
    steps
        .iter()
        .map(|step| engine.run(step).unwrap_or_else(|e| panic!("step {step:?} failed: {e}")))
        .collect()
}

#[test]
fn scenario_two_yields_sum() {
    assert_eq!(
        drive(
            "function* g(){ yield 1; yield 2; } let it = g();",
            &["it.next().value + it.next().value;"],
        ),
        vec![num(3.0)]
    );
}

#[test]
fn next_argument_resumes_the_yield_expression() {
    let results = drive(
        "function* g(){ let x = yield 1; yield x * 10; } let it = g();",
        &["it.next().value;", "it.next(5).value;", "it.next().done;"],
    );
    assert_eq!(results, vec![num(1.0), num(50.0), HostValue::Bool(true)]);
}

#[test]
fn yield_in_condition_positions_is_lowered() {
    let results = drive(
        "function* g(){ if (yield 'ask') { yield 'yes'; } else { yield 'no'; } } let it = g();",
        &["it.next().value;", "it.next(true).value;"],
    );
    assert_eq!(results, vec![s("ask"), s("yes")]);

    let results = drive(
        "function* g(){ if (yield 'ask') { yield 'yes'; } else { yield 'no'; } } let it = g();",
        &["it.next().value;", "it.next(false).value;"],
    );
    assert_eq!(results, vec![s("ask"), s("no")]);
}

#[test]
fn yield_inside_loops() {
    let results = drive(
        "function* g(){ for (let i = 0; i < 3; i++) { yield i; } return 'end'; } let it = g();",
        &[
            "it.next().value;",
            "it.next().value;",
            "it.next().value;",
            "let r = it.next(); r.value + ':' + r.done;",
        ],
    );
    assert_eq!(results, vec![num(0.0), num(1.0), num(2.0), s("end:true")]);
}

#[test]
fn while_loop_with_yield_condition() {
    let results = drive(
        "function* g(){ let n = 0; while (yield n) { n++; } return n; } let it = g();",
        &["it.next().value;", "it.next(true).value;", "it.next(true).value;", "it.next(false).value;"],
    );
    assert_eq!(results, vec![num(0.0), num(1.0), num(2.0), num(2.0)]);
}

#[test]
fn generator_return_completes_early() {
    let results = drive(
        "function* g(){ yield 1; yield 2; yield 3; } let it = g();",
        &["it.next().value;", "it.return(99).value;", "it.next().done;"],
    );
    assert_eq!(results, vec![num(1.0), num(99.0), HostValue::Bool(true)]);
}

#[test]
fn generator_throw_is_catchable_inside() {
    let results = drive(
        "function* g(){ try { yield 1; } catch (e) { yield 'caught:' + e.message; } } let it = g();",
        &["it.next().value;", "it.throw(new Error('oops')).value;"],
    );
    assert_eq!(results, vec![num(1.0), s("caught:oops")]);
}

#[test]
fn uncaught_generator_throw_propagates_to_the_driver() {
    let mut engine = Engine::new();
    engine.run("function* g(){ yield 1; } let it = g(); it.next();").unwrap();
    let err = engine.run("it.throw(new Error('escape'));").unwrap_err();
    assert!(err.to_string().contains("escape"), "{err}");
}

#[test]
fn finally_runs_on_generator_return() {
    let results = drive(
        "let log = ''; function* g(){ try { yield 1; yield 2; } finally { log += 'fin'; } } let it = g();",
        &["it.next().value;", "it.return(0).done;", "log;"],
    );
    assert_eq!(results, vec![num(1.0), HostValue::Bool(true), s("fin")]);
}

#[test]
fn delegated_yield_flows_values_and_returns() {
    let results = drive(
        "function* inner(){ yield 1; yield 2; return 3; } \
         function* outer(){ let v = yield* inner(); yield v; } let it = outer();",
        &["it.next().value;", "it.next().value;", "it.next().value;", "it.next().done;"],
    );
    assert_eq!(results, vec![num(1.0), num(2.0), num(3.0), HostValue::Bool(true)]);
}

#[test]
fn delegated_yield_forwards_next_arguments() {
    let results = drive(
        "function* inner(){ let got = yield 'in'; yield 'echo:' + got; } \
         function* outer(){ yield* inner(); } let it = outer();",
        &["it.next().value;", "it.next('hi').value;"],
    );
    assert_eq!(results, vec![s("in"), s("echo:hi")]);
}

#[test]
fn generators_are_iterable() {
    let mut engine = Engine::new();
    let result = engine
        .run("function* g(){ yield 1; yield 2; yield 3; } let sum = 0; for (const v of g()) sum += v; sum;")
        .unwrap();
    assert_eq!(result, num(6.0));

    let result = engine
        .run("function* h(){ yield 'a'; yield 'b'; } [...h()].join('-');")
        .unwrap();
    assert_eq!(result, s("a-b"));
}

#[test]
fn yield_inside_switch_and_nested_blocks() {
    let results = drive(
        "function* g(n){ switch (n) { case 1: yield 'one'; break; default: yield 'other'; } yield 'after'; } \
         let it = g(1);",
        &["it.next().value;", "it.next().value;", "it.next().done;"],
    );
    assert_eq!(results, vec![s("one"), s("after"), HostValue::Bool(true)]);
}

#[test]
fn generator_state_machine_is_reentrant_per_instance() {
    let mut engine = Engine::new();
    engine.run("function* g(){ yield 1; yield 2; } let a = g(); let b = g();").unwrap();
    assert_eq!(engine.run("a.next().value;").unwrap(), num(1.0));
    assert_eq!(engine.run("b.next().value;").unwrap(), num(1.0));
    assert_eq!(engine.run("a.next().value;").unwrap(), num(2.0));
    assert_eq!(engine.run("b.next().value;").unwrap(), num(2.0));
}

#[test]
fn done_generator_keeps_answering_done() {
    let results = drive(
        "function* g(){ yield 1; } let it = g();",
        &["it.next().done;", "it.next().done;", "it.next().value === undefined;"],
    );
    assert_eq!(
        results,
        vec![HostValue::Bool(false), HostValue::Bool(true), HostValue::Bool(true)]
    );
}
