//! Native functions backing the script-visible globals.
//!
//! A [`Builtin`] is an immediate value handle; the receiver arrives at the
//! call site, so method extraction (`let f = arr.push`) costs nothing. The
//! per-area implementations live in the submodules; this module owns the
//! enum, the dispatch, the member tables consulted by property lookup, and
//! global installation.

pub(crate) mod arrays;
pub(crate) mod collections;
pub(crate) mod date;
pub(crate) mod json;
pub(crate) mod math;
pub(crate) mod objects;
pub(crate) mod promises;
pub(crate) mod regex;
pub(crate) mod strings;

use strum::IntoStaticStr;

use crate::{
    eval::Interp,
    exception::{ExcKind, RunError, RunResult},
    heap::{Heap, HeapData, PropKey},
    intern::{Interner, StaticSym},
    iterator,
    scope::{Scopes, GLOBAL_SCOPE},
    value::Value,
};

/// Every native callable. Grouped by the global or prototype it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub(crate) enum Builtin {
    // Global functions
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,

    // Callable constructors / converters
    StringCtor,
    NumberCtor,
    BooleanCtor,
    BigIntCtor,
    SymbolCtor,
    ArrayCtor,
    ObjectCtor,
    PromiseCtor,
    MapCtor,
    WeakMapCtor,
    DateCtor,
    RegExpCtor,
    /// Error constructors, one per error classification.
    Error(ExcKind),

    // console
    ConsoleLog,

    // Math
    MathFloor,
    MathCeil,
    MathRound,
    MathTrunc,
    MathAbs,
    MathSign,
    MathMin,
    MathMax,
    MathPow,
    MathSqrt,
    MathRandom,
    MathLog,
    MathExp,
    MathSin,
    MathCos,
    MathTan,
    MathAtan2,
    MathHypot,

    // JSON
    JsonStringify,
    JsonParse,

    // Object statics
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    ObjectFreeze,
    ObjectGetPrototypeOf,
    ObjectCreate,

    // Array statics
    ArrayIsArray,
    ArrayFrom,
    ArrayOf,

    // Number statics
    NumberIsInteger,
    NumberIsFinite,
    NumberIsNaN,

    // Promise statics
    PromiseResolve,
    PromiseReject,
    PromiseAll,
    PromiseRace,

    // Date statics and methods
    DateNow,
    DateGetTime,
    DateToIsoString,
    DateGetUtcFullYear,
    DateGetUtcMonth,
    DateGetUtcDate,
    DateGetUtcHours,
    DateGetUtcMinutes,
    DateGetUtcSeconds,
    DateGetUtcMilliseconds,
    DateGetUtcDay,

    // CPS runtime helpers
    AwaitHelper,
    GetAsyncIterator,
    IteratorNext,

    // String prototype
    StrCharAt,
    StrCharCodeAt,
    StrSlice,
    StrSubstring,
    StrIndexOf,
    StrIncludes,
    StrSplit,
    StrTrim,
    StrToUpperCase,
    StrToLowerCase,
    StrStartsWith,
    StrEndsWith,
    StrRepeat,
    StrReplace,
    StrPadStart,
    StrPadEnd,
    StrConcat,

    // Array prototype
    ArrPush,
    ArrPop,
    ArrShift,
    ArrUnshift,
    ArrSlice,
    ArrIndexOf,
    ArrJoin,
    ArrMap,
    ArrFilter,
    ArrForEach,
    ArrIncludes,
    ArrConcat,
    ArrReverse,

    // Map prototype
    MapGet,
    MapSet,
    MapHas,
    MapDelete,
    MapClear,
    MapKeys,
    MapValues,
    MapEntries,
    MapForEach,

    // WeakMap prototype
    WeakMapGet,
    WeakMapSet,
    WeakMapHas,
    WeakMapDelete,

    // Promise prototype
    PromiseThen,
    PromiseCatch,
    PromiseFinally,

    // Generator prototype
    GenNext,
    GenReturn,
    GenThrow,

    // Plain iterator objects
    IterNext,
    /// `[Symbol.iterator]` of built-in containers: returns the native
    /// iterator for the receiver.
    MakeIter,

    // RegExp prototype
    RegexTest,
    RegexExec,

    // Shared object prototype
    ObjHasOwnProperty,
    ObjToString,

    // Function prototype
    FnCall,
    FnApply,
}

impl Builtin {
    /// The script-visible name (used by `Function.prototype.toString`-style
    /// rendering and error messages).
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Dispatches a builtin call.
pub(crate) fn call_builtin(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    match b {
        ParseInt | ParseFloat | IsNaN | IsFinite | StringCtor | NumberCtor | BooleanCtor | BigIntCtor | SymbolCtor
        | NumberIsInteger | NumberIsFinite | NumberIsNaN => objects::call_global(interp, b, args),
        ArrayCtor | ObjectCtor | MapCtor | WeakMapCtor | DateCtor | RegExpCtor | Error(_) | PromiseCtor => {
            // Calling these as plain functions behaves like construction,
            // except Promise which requires `new`.
            if b == PromiseCtor {
                return Err(RunError::type_error("Promise constructor requires 'new'"));
            }
            construct_builtin(interp, b, args)
        }
        ConsoleLog => objects::console_log(interp, args),
        MathFloor | MathCeil | MathRound | MathTrunc | MathAbs | MathSign | MathMin | MathMax | MathPow | MathSqrt
        | MathRandom | MathLog | MathExp | MathSin | MathCos | MathTan | MathAtan2 | MathHypot => {
            math::call(interp, b, args)
        }
        JsonStringify | JsonParse => json::call(interp, b, args),
        ObjectKeys | ObjectValues | ObjectEntries | ObjectAssign | ObjectFreeze | ObjectGetPrototypeOf
        | ObjectCreate | ObjHasOwnProperty | ObjToString => objects::call(interp, b, this, args),
        ArrayIsArray | ArrayFrom | ArrayOf => arrays::call_static(interp, b, args),
        PromiseResolve | PromiseReject | PromiseAll | PromiseRace | PromiseThen | PromiseCatch | PromiseFinally
        | AwaitHelper | GetAsyncIterator | IteratorNext => promises::call(interp, b, this, args),
        DateNow | DateGetTime | DateToIsoString | DateGetUtcFullYear | DateGetUtcMonth | DateGetUtcDate
        | DateGetUtcHours | DateGetUtcMinutes | DateGetUtcSeconds | DateGetUtcMilliseconds | DateGetUtcDay => {
            date::call(interp, b, this, args)
        }
        StrCharAt | StrCharCodeAt | StrSlice | StrSubstring | StrIndexOf | StrIncludes | StrSplit | StrTrim
        | StrToUpperCase | StrToLowerCase | StrStartsWith | StrEndsWith | StrRepeat | StrReplace | StrPadStart
        | StrPadEnd | StrConcat => strings::call(interp, b, this, args),
        ArrPush | ArrPop | ArrShift | ArrUnshift | ArrSlice | ArrIndexOf | ArrJoin | ArrMap | ArrFilter
        | ArrForEach | ArrIncludes | ArrConcat | ArrReverse => arrays::call(interp, b, this, args),
        MapGet | MapSet | MapHas | MapDelete | MapClear | MapKeys | MapValues | MapEntries | MapForEach
        | WeakMapGet | WeakMapSet | WeakMapHas | WeakMapDelete => collections::call(interp, b, this, args),
        GenNext | GenReturn | GenThrow | IterNext => collections::call_iter(interp, b, this, args),
        MakeIter => iterator::get_iterator(interp, this),
        RegexTest | RegexExec => regex::call(interp, b, this, args),
        FnCall => {
            let func = this.clone();
            let call_this = args.first().cloned().unwrap_or(Value::Undefined);
            interp.call_value(&func, call_this, args.get(1..).unwrap_or_default())
        }
        FnApply => {
            let func = this.clone();
            let call_this = args.first().cloned().unwrap_or(Value::Undefined);
            let call_args = match args.get(1) {
                Some(Value::Ref(id)) => match interp.heap.get(*id) {
                    HeapData::Array(arr) => arr.iter_values().collect(),
                    _ => vec![],
                },
                _ => vec![],
            };
            interp.call_value(&func, call_this, &call_args)
        }
    }
}

/// `new` applied to a builtin constructor.
pub(crate) fn construct_builtin(interp: &mut Interp, b: Builtin, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    match b {
        ObjectCtor => Ok(Value::Ref(interp.heap.alloc_object(None))),
        ArrayCtor => arrays::construct(interp, args),
        MapCtor | WeakMapCtor => collections::construct(interp, b, args),
        PromiseCtor => promises::construct(interp, args),
        DateCtor => date::construct(interp, args),
        RegExpCtor => regex::construct(interp, args),
        Error(kind) => {
            let message = match args.first() {
                Some(v) => v.to_display(interp.heap, interp.interner),
                None => String::new(),
            };
            Ok(interp.error_value(&crate::exception::SimpleError::new(kind, message)))
        }
        StringCtor | NumberCtor | BooleanCtor | BigIntCtor => objects::call_global(interp, b, args),
        _ => Err(RunError::type_error(format!("{} is not a constructor", b.name()))),
    }
}

/// Static members reachable on builtin constructor values (`Promise.all`,
/// `Symbol.iterator`, `Number.MAX_SAFE_INTEGER`, ..).
pub(crate) fn builtin_member(b: Builtin, key: &PropKey) -> Value {
    use Builtin::*;
    let Some(name) = key.as_str() else {
        return Value::Undefined;
    };
    match (b, name) {
        (SymbolCtor, "iterator") => Value::Symbol(StaticSym::Iterator.into()),
        (SymbolCtor, "asyncIterator") => Value::Symbol(StaticSym::AsyncIterator.into()),
        (PromiseCtor, "resolve") => Value::Builtin(PromiseResolve),
        (PromiseCtor, "reject") => Value::Builtin(PromiseReject),
        (PromiseCtor, "all") => Value::Builtin(PromiseAll),
        (PromiseCtor, "race") => Value::Builtin(PromiseRace),
        (ObjectCtor, "keys") => Value::Builtin(ObjectKeys),
        (ObjectCtor, "values") => Value::Builtin(ObjectValues),
        (ObjectCtor, "entries") => Value::Builtin(ObjectEntries),
        (ObjectCtor, "assign") => Value::Builtin(ObjectAssign),
        (ObjectCtor, "freeze") => Value::Builtin(ObjectFreeze),
        (ObjectCtor, "getPrototypeOf") => Value::Builtin(ObjectGetPrototypeOf),
        (ObjectCtor, "create") => Value::Builtin(ObjectCreate),
        (ArrayCtor, "isArray") => Value::Builtin(ArrayIsArray),
        (ArrayCtor, "from") => Value::Builtin(ArrayFrom),
        (ArrayCtor, "of") => Value::Builtin(ArrayOf),
        (NumberCtor, "isInteger") => Value::Builtin(NumberIsInteger),
        (NumberCtor, "isFinite") => Value::Builtin(NumberIsFinite),
        (NumberCtor, "isNaN") => Value::Builtin(NumberIsNaN),
        (NumberCtor, "parseInt") => Value::Builtin(ParseInt),
        (NumberCtor, "parseFloat") => Value::Builtin(ParseFloat),
        (NumberCtor, "MAX_SAFE_INTEGER") => Value::Num(9_007_199_254_740_991.0),
        (NumberCtor, "MIN_SAFE_INTEGER") => Value::Num(-9_007_199_254_740_991.0),
        (NumberCtor, "EPSILON") => Value::Num(f64::EPSILON),
        (NumberCtor, "NaN") => Value::Num(f64::NAN),
        (NumberCtor, "POSITIVE_INFINITY") => Value::Num(f64::INFINITY),
        (NumberCtor, "NEGATIVE_INFINITY") => Value::Num(f64::NEG_INFINITY),
        (DateCtor, "now") => Value::Builtin(DateNow),
        _ => Value::Undefined,
    }
}

/// `instanceof` against a builtin constructor checks the heap variant.
pub(crate) fn builtin_instance_of(heap: &Heap, value: &Value, b: Builtin) -> bool {
    use Builtin::*;
    let Value::Ref(id) = value else { return false };
    match (b, heap.get(*id)) {
        (ArrayCtor, HeapData::Array(_))
        | (MapCtor, HeapData::Map(_))
        | (WeakMapCtor, HeapData::WeakMap(_))
        | (PromiseCtor, HeapData::Promise(_))
        | (DateCtor, HeapData::Date(_))
        | (RegExpCtor, HeapData::Regex(_))
        | (ObjectCtor, HeapData::Object(_)) => true,
        (Error(kind), HeapData::Object(obj)) => match obj.get_plain(&PropKey::Str("name".into())) {
            Some(Value::Str(name)) => {
                // Error matches every error object; specific kinds match by
                // name.
                kind == ExcKind::Error || &**name == kind.to_string()
            }
            _ => false,
        },
        _ => false,
    }
}

/// Method lookup by receiver heap kind, consulted after own properties miss.
pub(crate) fn heap_method(heap: &Heap, id: crate::heap::HeapId, key: &PropKey) -> Value {
    use Builtin::*;
    // Built-in containers answer `[Symbol.iterator]` with their native
    // iterator factory.
    if let PropKey::Sym(sym) = key {
        if sym.is(StaticSym::Iterator)
            && matches!(
                heap.get(id),
                HeapData::Array(_) | HeapData::Map(_) | HeapData::Generator(_) | HeapData::NativeIter(_)
            )
        {
            return Value::Builtin(MakeIter);
        }
        return Value::Undefined;
    }
    let Some(name) = key.as_str() else {
        return Value::Undefined;
    };
    let b = match heap.get(id) {
        HeapData::Array(_) => arrays::method(name),
        HeapData::Map(_) => collections::map_method(name),
        HeapData::WeakMap(_) => collections::weak_map_method(name),
        HeapData::Promise(_) => match name {
            "then" => Some(PromiseThen),
            "catch" => Some(PromiseCatch),
            "finally" => Some(PromiseFinally),
            _ => None,
        },
        HeapData::Generator(_) => match name {
            "next" => Some(GenNext),
            "return" => Some(GenReturn),
            "throw" => Some(GenThrow),
            _ => None,
        },
        HeapData::NativeIter(_) => match name {
            "next" => Some(IterNext),
            _ => None,
        },
        HeapData::Date(_) => date::method(name),
        HeapData::Regex(_) => match name {
            "test" => Some(RegexTest),
            "exec" => Some(RegexExec),
            _ => None,
        },
        HeapData::Object(_) => objects::method(name),
        HeapData::Closure(_) | HeapData::HostFunc(_) | HeapData::Resolver(_) => match name {
            "call" => Some(FnCall),
            "apply" => Some(FnApply),
            _ => None,
        },
    };
    match b {
        Some(b) => Value::Builtin(b),
        None => match heap.get(id) {
            // Plain objects also answer the shared object protocol.
            HeapData::Array(_) => match objects::method(name) {
                Some(b) => Value::Builtin(b),
                None => Value::Undefined,
            },
            _ => Value::Undefined,
        },
    }
}

/// Member access on string primitives.
pub(crate) fn string_member(s: &str, key: &PropKey) -> Value {
    if let PropKey::Sym(sym) = key {
        if sym.is(StaticSym::Iterator) {
            return Value::Builtin(Builtin::MakeIter);
        }
        return Value::Undefined;
    }
    let Some(name) = key.as_str() else {
        return Value::Undefined;
    };
    if name == "length" {
        return Value::Num(s.chars().count() as f64);
    }
    if let Some(index) = iterator::array_index(name) {
        return match s.chars().nth(index as usize) {
            Some(c) => Value::str(c.to_string()),
            None => Value::Undefined,
        };
    }
    match strings::method(name) {
        Some(b) => Value::Builtin(b),
        None => Value::Undefined,
    }
}

/// Member access on number/boolean/bigint/symbol primitives.
pub(crate) fn primitive_member(key: &PropKey) -> Value {
    match key.as_str() {
        Some("toString") => Value::Builtin(Builtin::ObjToString),
        _ => Value::Undefined,
    }
}

/// Installs the script-visible globals into the global scope.
pub(crate) fn install_globals(heap: &mut Heap, scopes: &mut Scopes, interner: &mut Interner) {
    use Builtin::*;

    let bind = |interner: &mut Interner, name: &str, value: Value, scopes: &mut Scopes| {
        let sym = interner.intern(name);
        scopes.declare_function(GLOBAL_SCOPE, sym, value);
    };

    // Namespace objects.
    let math = math::make_namespace(heap);
    bind(interner, "Math", math, scopes);
    let json = json::make_namespace(heap);
    bind(interner, "JSON", json, scopes);
    let console = objects::make_console(heap);
    bind(interner, "console", console, scopes);

    // Value globals.
    bind(interner, "NaN", Value::Num(f64::NAN), scopes);
    bind(interner, "Infinity", Value::Num(f64::INFINITY), scopes);
    bind(interner, "undefined", Value::Undefined, scopes);

    // Global functions.
    bind(interner, "parseInt", Value::Builtin(ParseInt), scopes);
    bind(interner, "parseFloat", Value::Builtin(ParseFloat), scopes);
    bind(interner, "isNaN", Value::Builtin(IsNaN), scopes);
    bind(interner, "isFinite", Value::Builtin(IsFinite), scopes);

    // Constructors.
    bind(interner, "String", Value::Builtin(StringCtor), scopes);
    bind(interner, "Number", Value::Builtin(NumberCtor), scopes);
    bind(interner, "Boolean", Value::Builtin(BooleanCtor), scopes);
    bind(interner, "BigInt", Value::Builtin(BigIntCtor), scopes);
    bind(interner, "Symbol", Value::Builtin(SymbolCtor), scopes);
    bind(interner, "Array", Value::Builtin(ArrayCtor), scopes);
    bind(interner, "Object", Value::Builtin(ObjectCtor), scopes);
    bind(interner, "Promise", Value::Builtin(PromiseCtor), scopes);
    bind(interner, "Map", Value::Builtin(MapCtor), scopes);
    bind(interner, "WeakMap", Value::Builtin(WeakMapCtor), scopes);
    bind(interner, "Date", Value::Builtin(DateCtor), scopes);
    bind(interner, "RegExp", Value::Builtin(RegExpCtor), scopes);
    bind(interner, "Error", Value::Builtin(Error(ExcKind::Error)), scopes);
    bind(interner, "TypeError", Value::Builtin(Error(ExcKind::TypeError)), scopes);
    bind(interner, "RangeError", Value::Builtin(Error(ExcKind::RangeError)), scopes);
    bind(interner, "ReferenceError", Value::Builtin(Error(ExcKind::ReferenceError)), scopes);
    bind(interner, "SyntaxError", Value::Builtin(Error(ExcKind::SyntaxError)), scopes);
    bind(interner, "EvalError", Value::Builtin(Error(ExcKind::EvalError)), scopes);

    // CPS runtime helpers; user code must not shadow these.
    bind(interner, "__awaitHelper", Value::Builtin(AwaitHelper), scopes);
    bind(interner, "__getAsyncIterator", Value::Builtin(GetAsyncIterator), scopes);
    bind(interner, "__iteratorNext", Value::Builtin(IteratorNext), scopes);
}
