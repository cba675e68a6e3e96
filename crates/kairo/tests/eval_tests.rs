//! End-to-end evaluation tests over the embedding surface.
//!
//! Each test builds a fresh engine, evaluates source, and checks the
//! completion value (the value of the last expression statement) through the
//! host value boundary.

use kairo::{Engine, EngineError, HostValue};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;

/// Evaluates source on a fresh engine and returns the completion value.
fn eval(source: &str) -> HostValue {
    let mut engine = Engine::new();
    engine.run(source).unwrap_or_else(|e| panic!("evaluation failed for {source:?}: {e}"))
}

/// Evaluates source expecting a script error; returns the rendered message.
fn eval_err(source: &str) -> String {
    let mut engine = Engine::new();
    match engine.run(source) {
        Err(EngineError::Script(e)) => e.to_string(),
        Err(other) => panic!("expected script error, got {other:?}"),
        Ok(v) => panic!("expected error, got {v:?}"),
    }
}

fn num(n: f64) -> HostValue {
    HostValue::Number(n)
}

fn s(text: &str) -> HostValue {
    HostValue::String(text.to_owned())
}

// === Expressions and operators ===

#[test]
fn arithmetic_and_string_concatenation() {
    assert_eq!(eval("1 + 2 * 3;"), num(7.0));
    assert_eq!(eval("'a' + 1;"), s("a1"));
    assert_eq!(eval("1 + '2';"), s("12"));
    assert_eq!(eval("10 % 3;"), num(1.0));
    assert_eq!(eval("2 ** 10;"), num(1024.0));
    assert_eq!(eval("7 / 2;"), num(3.5));
}

#[test]
fn strict_and_loose_equality() {
    assert_eq!(eval("NaN !== NaN;"), HostValue::Bool(true));
    assert_eq!(eval("NaN != NaN;"), HostValue::Bool(true));
    assert_eq!(eval("null == undefined;"), HostValue::Bool(true));
    assert_eq!(eval("null === undefined;"), HostValue::Bool(false));
    assert_eq!(eval("+0 === -0;"), HostValue::Bool(true));
    assert_eq!(eval("1 == '1';"), HostValue::Bool(true));
    assert_eq!(eval("1 === '1';"), HostValue::Bool(false));
    assert_eq!(eval("10n == 10;"), HostValue::Bool(true));
    assert_eq!(eval("10n === 10;"), HostValue::Bool(false));
}

#[test]
fn logical_operators_return_the_deciding_operand() {
    assert_eq!(eval("0 || 'fallback';"), s("fallback"));
    assert_eq!(eval("'first' && 'second';"), s("second"));
    assert_eq!(eval("let v; v ?? 'default';"), s("default"));
    assert_eq!(eval("0 ?? 'default';"), num(0.0));
}

#[test]
fn typeof_results() {
    assert_eq!(eval("typeof null;"), s("object"));
    assert_eq!(eval("typeof undefined;"), s("undefined"));
    assert_eq!(eval("typeof (() => 1);"), s("function"));
    assert_eq!(eval("typeof 10n;"), s("bigint"));
    assert_eq!(eval("typeof 'x';"), s("string"));
    // A never-declared identifier answers without raising.
    assert_eq!(eval("typeof neverDeclared;"), s("undefined"));
}

#[test]
fn optional_chaining_short_circuits() {
    assert_eq!(eval("let o = null; o?.a;"), HostValue::Undefined);
    assert_eq!(eval("let o = null; o?.a.b.c;"), HostValue::Undefined);
    assert_eq!(eval("let o = { a: { b: 5 } }; o?.a?.b;"), num(5.0));
    assert_eq!(eval("let o = {}; o.f?.();"), HostValue::Undefined);
    // The non-chained outer part still evaluates.
    assert_eq!(eval("let o = null; (o?.a) === undefined ? 'short' : 'no';"), s("short"));
}

#[test]
fn member_access_on_nullish_raises() {
    let message = eval_err("let o = null; o.x;");
    assert!(message.contains("Cannot read properties of null"), "{message}");
}

#[test]
fn update_and_compound_assignment() {
    assert_eq!(eval("let i = 1; i++; i;"), num(2.0));
    assert_eq!(eval("let i = 1; i++;"), num(1.0));
    assert_eq!(eval("let i = 1; ++i;"), num(2.0));
    assert_eq!(eval("let i = 10; i -= 4; i *= 2; i;"), num(12.0));
    assert_eq!(eval("let s = 'a'; s += 'b'; s;"), s("ab"));
    assert_eq!(eval("let o = { n: 1 }; o.n += 5; o.n;"), num(6.0));
    assert_eq!(eval("let x = null; x ??= 3; x;"), num(3.0));
    assert_eq!(eval("let x = 1; x ||= 9; x;"), num(1.0));
}

// === Statements and control flow ===

#[test]
fn scenario_array_push() {
    assert_eq!(eval("let a=[], i, l=5, v; a.push(l); a[0];"), num(5.0));
}

#[test]
fn labeled_break_exits_the_labeled_loop() {
    let source = "var result=''; outer: for (var i=0;i<3;i++){ for (var j=0;j<3;j++){ \
                  result += i+''+j+','; if (i===1 && j===1) break outer; }} result;";
    assert_eq!(eval(source), s("00,01,02,10,11,"));
}

#[test]
fn labeled_continue_restarts_the_labeled_loop() {
    let source = "let out=''; outer: for (let i=0;i<3;i++){ for (let j=0;j<3;j++){ \
                  if (j===1) continue outer; out += i+''+j; }} out;";
    assert_eq!(eval(source), s("001020"));
}

#[test]
fn switch_falls_through_until_break() {
    let source = "let out=''; switch (2) { case 1: out+='1'; case 2: out+='2'; case 3: out+='3'; break; \
                  default: out+='d'; } out;";
    assert_eq!(eval(source), s("23"));
}

#[test]
fn break_in_switch_inside_loop_exits_only_the_switch() {
    let source = "let out=''; for (let i=0;i<3;i++){ switch(i){ case 1: break; default: out+=i; } } out;";
    assert_eq!(eval(source), s("02"));
}

#[test]
fn try_catch_finally_paths() {
    assert_eq!(
        eval("let out=''; try { throw new Error('x'); } catch (e) { out+='c'; } finally { out+='f'; } out;"),
        s("cf")
    );
    // A return from finally replaces the prior completion.
    assert_eq!(eval("function f(){ try { return 1; } finally { return 2; } } f();"), num(2.0));
    assert_eq!(
        eval("function f(){ try { throw new Error('x'); } finally { return 3; } } f();"),
        num(3.0)
    );
    assert_eq!(eval("let e2; try { throw 42; } catch (e) { e2 = e; } e2;"), num(42.0));
}

#[test]
fn temporal_dead_zone_and_const() {
    let message = eval_err("useIt(); function useIt(){ return x; } let x = 1;");
    assert!(message.contains("before initialization"), "{message}");
    let message = eval_err("const k = 1; k = 2;");
    assert!(message.contains("constant"), "{message}");
}

#[test]
fn var_hoisting_reads_undefined() {
    assert_eq!(eval("let seen = typeof v; var v = 1; seen;"), s("undefined"));
    assert_eq!(eval("function f(){ if (true) { var inner = 4; } return inner; } f();"), num(4.0));
}

#[test]
fn do_while_and_for_of() {
    assert_eq!(eval("let n=0; do { n++; } while (n < 3); n;"), num(3.0));
    assert_eq!(eval("let total=0; for (const v of [1,2,3]) total += v; total;"), num(6.0));
    assert_eq!(eval("let out=''; for (const c of 'abc') out += c + '-'; out;"), s("a-b-c-"));
}

#[test]
fn for_in_enumerates_string_keys_in_insertion_order() {
    assert_eq!(eval("let o={b:1,a:2}; let ks=''; for (let k in o) ks+=k; ks;"), s("ba"));
    // Symbol-keyed properties are skipped.
    assert_eq!(
        eval("let o={a:1}; o[Symbol('hidden')]=2; let ks=''; for (let k in o) ks+=k; ks;"),
        s("a")
    );
}

// === Objects, prototypes, classes ===

#[test]
fn object_literals_with_accessors_and_computed_keys() {
    assert_eq!(eval("let k='dyn'; let o={ [k]: 7 }; o.dyn;"), num(7.0));
    assert_eq!(eval("let o={ get v(){ return 41+1; } }; o.v;"), num(42.0));
    assert_eq!(
        eval("let store; let o={ set v(x){ store = x*2; } }; o.v = 21; store;"),
        num(42.0)
    );
    assert_eq!(eval("let a=1; let o={ a }; o.a;"), num(1.0));
    assert_eq!(eval("let o={ m(){ return this.x; }, x: 9 }; o.m();"), num(9.0));
}

#[test]
fn prototype_lookup_walks_the_chain() {
    let source = "function A(){} A.prototype.greet = function(){ return 'hi ' + this.name; }; \
                  let a = new A(); a.name = 'bob'; a.greet();";
    assert_eq!(eval(source), s("hi bob"));
    // Assignment creates on the receiver, never the prototype.
    let source = "function A(){} A.prototype.v = 1; let x = new A(); let y = new A(); \
                  x.v = 2; y.v;";
    assert_eq!(eval(source), num(1.0));
}

#[test]
fn classes_with_inheritance_and_super() {
    let source = "
        class Animal {
            constructor(name) { this.name = name; }
            speak() { return this.name + ' makes a sound'; }
        }
        class Dog extends Animal {
            constructor(name) { super(name); }
            speak() { return super.speak() + ': woof'; }
        }
        new Dog('rex').speak();
    ";
    assert_eq!(eval(source), s("rex makes a sound: woof"));
}

#[test]
fn class_static_members_and_getters() {
    let source = "
        class Counter {
            constructor() { this.n = 0; }
            get doubled() { return this.n * 2; }
            static origin() { return new Counter(); }
        }
        let c = Counter.origin(); c.n = 21; c.doubled;
    ";
    assert_eq!(eval(source), num(42.0));
}

#[test]
fn instanceof_and_in_operators() {
    assert_eq!(eval("class A {} new A() instanceof A;"), HostValue::Bool(true));
    assert_eq!(eval("class A {} class B extends A {} new B() instanceof A;"), HostValue::Bool(true));
    assert_eq!(eval("[] instanceof Array;"), HostValue::Bool(true));
    assert_eq!(eval("'x' in { x: 1 };"), HostValue::Bool(true));
    assert_eq!(eval("'y' in { x: 1 };"), HostValue::Bool(false));
    assert_eq!(eval("0 in [7];"), HostValue::Bool(true));
}

#[test]
fn new_returning_an_object_replaces_the_receiver() {
    assert_eq!(eval("function F(){ return { v: 1 }; } new F().v;"), num(1.0));
    assert_eq!(eval("function F(){ this.v = 2; return 5; } new F().v;"), num(2.0));
}

#[test]
fn closures_capture_the_frame_not_a_snapshot() {
    let source = "function counter(){ let n = 0; return () => { n += 1; return n; }; } \
                  let c = counter(); c(); c(); c();";
    assert_eq!(eval(source), num(3.0));
}

#[test]
fn this_binding_rules() {
    // Method call binds the receiver; arrows inherit the lexical this.
    assert_eq!(eval("let o = { v: 1, m(){ return this.v; } }; o.m();"), num(1.0));
    assert_eq!(
        eval("let o = { v: 2, m(){ let f = () => this.v; return f(); } }; o.m();"),
        num(2.0)
    );
    assert_eq!(eval("let o = { v: 3, m(){ return this.v; } }; let f = o['m']; o.m();"), num(3.0));
}

// === Arrays ===

#[test]
fn array_length_and_sparse_growth() {
    assert_eq!(eval("let a = []; a[5] = 1; a.length;"), num(6.0));
    assert_eq!(eval("let a = [1,2,3]; a.length;"), num(3.0));
    // Negative string-coerced indices are regular properties.
    assert_eq!(eval("let a = []; a[-1] = 7; a.length;"), num(0.0));
    assert_eq!(eval("let a = []; a[-1] = 7; a[-1];"), num(7.0));
    assert_eq!(eval("let a = [1,2,3]; a.length = 1; a.length;"), num(1.0));
}

#[test]
fn array_methods() {
    assert_eq!(eval("[1,2,3].map(x => x * 2).join(',');"), s("2,4,6"));
    assert_eq!(eval("[1,2,3,4].filter(x => x % 2 === 0).length;"), num(2.0));
    assert_eq!(eval("[1,2,3].indexOf(2);"), num(1.0));
    assert_eq!(eval("[1,2,3].includes(3);"), HostValue::Bool(true));
    assert_eq!(eval("[[1],[2]].concat([[3]]).length;"), num(3.0));
    assert_eq!(eval("let a=[1,2]; a.reverse(); a[0];"), num(2.0));
    assert_eq!(eval("let a=[1,2,3]; a.slice(1).join('');"), s("23"));
    assert_eq!(eval("let a=[3]; a.unshift(1,2); a.join('');"), s("123"));
    assert_eq!(eval("let a=[1,2]; a.pop() + a.length;"), num(3.0));
    assert_eq!(eval("let s=0; [1,2,3].forEach(v => s += v); s;"), num(6.0));
    assert_eq!(eval("Array.isArray([]);"), HostValue::Bool(true));
    assert_eq!(eval("Array.from('ab').join('-');"), s("a-b"));
    assert_eq!(eval("Array.of(1,2).length;"), num(2.0));
}

#[test]
fn spread_in_calls_and_literals() {
    assert_eq!(eval("function add3(a,b,c){ return a+b+c; } add3(...[1,2,3]);"), num(6.0));
    assert_eq!(eval("let a=[2,3]; [1, ...a, 4].join('');"), s("1234"));
    assert_eq!(eval("function f(...rest){ return rest.length; } f(1,2,3,4);"), num(4.0));
}

// === Maps and weak maps ===

#[test]
fn scenario_map_chaining_and_size() {
    assert_eq!(eval("let m = new Map(); m.set('a',1).set('b',2); m.size;"), num(2.0));
}

#[test]
fn weak_map_rejects_primitive_keys() {
    let message = eval_err("let wm = new WeakMap(); wm.set('x', 1);");
    assert!(message.contains("Invalid value used as weak map key"), "{message}");
}

#[test]
fn map_keys_use_same_value_zero() {
    assert_eq!(eval("let m=new Map(); m.set(NaN,'n'); m.get(NaN);"), s("n"));
    assert_eq!(eval("let m=new Map(); m.set(-0,'z'); m.get(0);"), s("z"));
    assert_eq!(eval("let m=new Map(); let k={}; m.set(k,1); m.get(k);"), num(1.0));
    assert_eq!(eval("let m=new Map(); m.set({},1); m.get({});"), HostValue::Undefined);
    assert_eq!(eval("let wm=new WeakMap(); let k={}; wm.set(k,5); wm.get(k);"), num(5.0));
}

// === BigInt ===

#[test]
fn scenario_bigint_arithmetic() {
    assert_eq!(
        eval("let x = 10n; let y = 20n; x + y * 2n;"),
        HostValue::BigInt(BigInt::from(50))
    );
}

#[test]
fn bigint_mixing_raises() {
    let message = eval_err("10n + 5;");
    assert!(message.contains("Cannot mix BigInt"), "{message}");
}

#[test]
fn bigint_division_truncates_and_guards() {
    assert_eq!(eval("7n / 2n;"), HostValue::BigInt(BigInt::from(3)));
    assert_eq!(eval("-7n / 2n;"), HostValue::BigInt(BigInt::from(-3)));
    assert!(eval_err("1n / 0n;").contains("Division by zero"));
    assert!(eval_err("1n % 0n;").contains("Division by zero"));
    assert!(eval_err("2n ** -1n;").contains("Exponent"));
    assert_eq!(eval("5n > 4;"), HostValue::Bool(true));
    assert_eq!(eval("5n < 6;"), HostValue::Bool(true));
}

// === Strings, templates, regex ===

#[test]
fn string_methods_and_templates() {
    assert_eq!(eval("'hello'.toUpperCase();"), s("HELLO"));
    assert_eq!(eval("'a,b,c'.split(',').length;"), num(3.0));
    assert_eq!(eval("'  pad  '.trim();"), s("pad"));
    assert_eq!(eval("'abc'.slice(1);"), s("bc"));
    assert_eq!(eval("'abc'.charCodeAt(0);"), num(97.0));
    assert_eq!(eval("'5'.padStart(3, '0');"), s("005"));
    assert_eq!(eval("'abcdef'.includes('cd');"), HostValue::Bool(true));
    assert_eq!(eval("'x'.repeat(3);"), s("xxx"));
    assert_eq!(eval("let name='world'; `hello ${name}${'!'}`;"), s("hello world!"));
    assert_eq!(eval("`sum=${1+2}`;"), s("sum=3"));
    assert_eq!(eval("'abc'.length;"), num(3.0));
    assert_eq!(eval("'abc'[1];"), s("b"));
}

#[test]
fn regex_literals_test_and_exec() {
    assert_eq!(eval("/ab+c/.test('xabbc');"), HostValue::Bool(true));
    assert_eq!(eval("/ab+c/.test('xyz');"), HostValue::Bool(false));
    assert_eq!(eval("/(a)(b)/.exec('ab')[2];"), s("b"));
    assert_eq!(eval("/x/i.test('X');"), HostValue::Bool(true));
    assert_eq!(eval("/a/.source;"), s("a"));
}

// === JSON ===

#[test]
fn json_round_trip() {
    let source = "let v = { a: 1, b: 'two', c: [true, null, 3.5], d: { nested: 'yes' } }; \
                  JSON.stringify(JSON.parse(JSON.stringify(v))) === JSON.stringify(v);";
    assert_eq!(eval(source), HostValue::Bool(true));
    assert_eq!(eval("JSON.stringify([1,'a',null]);"), s("[1,\"a\",null]"));
    assert_eq!(eval("JSON.parse('{\"k\":5}').k;"), num(5.0));
}

#[test]
fn json_rejects_cycles() {
    let message = eval_err("let o = {}; o.self = o; JSON.stringify(o);");
    assert!(message.contains("circular"), "{message}");
}

// === Math, Number, Date globals ===

#[test]
fn math_and_number_surfaces() {
    assert_eq!(eval("Math.floor(2.7);"), num(2.0));
    assert_eq!(eval("Math.max(1, 9, 4);"), num(9.0));
    assert_eq!(eval("Math.min(3, -2);"), num(-2.0));
    assert_eq!(eval("Math.abs(-5);"), num(5.0));
    assert_eq!(eval("Math.pow(2, 8);"), num(256.0));
    assert_eq!(eval("Math.sqrt(81);"), num(9.0));
    assert_eq!(eval("Number.isInteger(4);"), HostValue::Bool(true));
    assert_eq!(eval("Number.isInteger(4.5);"), HostValue::Bool(false));
    assert_eq!(eval("parseInt('42px');"), num(42.0));
    assert_eq!(eval("parseFloat('3.5rest');"), num(3.5));
    assert_eq!(eval("isNaN('not a number');"), HostValue::Bool(true));
    assert_eq!(eval("Number('12');"), num(12.0));
    assert_eq!(eval("String(12);"), s("12"));
    assert_eq!(eval("Boolean('');"), HostValue::Bool(false));
    assert_eq!(eval("BigInt(7) + 1n;"), HostValue::BigInt(BigInt::from(8)));
}

#[test]
fn date_is_utc_based() {
    assert_eq!(eval("new Date(0).getUTCFullYear();"), num(1970.0));
    assert_eq!(eval("new Date(0).toISOString();"), s("1970-01-01T00:00:00.000Z"));
    assert_eq!(eval("new Date(86400000).getUTCDate();"), num(2.0));
    assert_eq!(eval("typeof Date.now();"), s("number"));
}

// === Object statics ===

#[test]
fn object_statics() {
    assert_eq!(eval("Object.keys({a:1,b:2}).join(',');"), s("a,b"));
    assert_eq!(eval("Object.values({a:1,b:2})[1];"), num(2.0));
    assert_eq!(eval("Object.entries({a:1})[0][0];"), s("a"));
    assert_eq!(eval("let t={}; Object.assign(t, {x:1}, {y:2}); t.x + t.y;"), num(3.0));
    assert_eq!(eval("let f=Object.freeze({a:1}); f.b = 2; f.b;"), HostValue::Undefined);
    assert_eq!(eval("let p={x:9}; Object.create(p).x;"), num(9.0));
    assert_eq!(eval("({a:1}).hasOwnProperty('a');"), HostValue::Bool(true));
}

// === Errors as values ===

#[test]
fn thrown_errors_carry_name_and_message() {
    let mut engine = Engine::new();
    let err = engine.run("throw new TypeError('bad thing');").unwrap_err();
    let EngineError::Script(e) = err else {
        panic!("expected script error");
    };
    assert_eq!(e.name, "TypeError");
    assert_eq!(e.message, "bad thing");
    assert!(matches!(e.value, HostValue::Error { .. }));
}

#[test]
fn parse_errors_carry_position() {
    let mut engine = Engine::new();
    let err = engine.run("let = ;").unwrap_err();
    let EngineError::Parse(e) = err else {
        panic!("expected parse error");
    };
    assert_eq!(e.line, 1);
    assert!(e.column > 0);
}
