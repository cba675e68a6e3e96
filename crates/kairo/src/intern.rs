//! Symbol interning for identifiers and the reserved head symbols of the
//! symbolic list form.
//!
//! The interner stores unique names in a vector and returns [`Symbol`] handles
//! for storage and comparison, so equality of names is identity comparison on
//! a `u32`. Reserved symbols (tree heads, operator tokens, well-known property
//! names, the CPS runtime helpers) are static: they map to fixed indices below
//! [`STATIC_SYM_LIMIT`] and never hit the dynamic table.
//!
//! Symbols are laid out as follows:
//! * 0 to count(StaticSym) - the pre-interned static symbols
//! * 1000+ - names interned per engine

use std::str::FromStr;

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into the interner's storage.
///
/// Uses `u32` to save space. Two symbols with the same name are always equal,
/// so `==` on `Symbol` is name equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// Dynamic symbols start here; everything below is a [`StaticSym`] index.
const STATIC_SYM_LIMIT: u32 = 1000;

impl Symbol {
    /// Returns the static symbol this handle refers to, if it is one.
    #[inline]
    pub(crate) fn as_static(self) -> Option<StaticSym> {
        if self.0 < STATIC_SYM_LIMIT {
            StaticSym::from_repr(self.0 as u16)
        } else {
            None
        }
    }

    /// Whether this symbol is the given static symbol.
    #[inline]
    pub(crate) fn is(self, s: StaticSym) -> bool {
        self.0 == s as u32
    }
}

impl From<StaticSym> for Symbol {
    fn from(s: StaticSym) -> Self {
        Self(s as u32)
    }
}

/// Pre-interned symbols known at compile time.
///
/// Covers the reserved heads of the symbolic list form, operator token
/// symbols, well-known property and global names, and the reserved names of
/// the CPS runtime. The strum `serialize` attributes define the source-level
/// spelling; variants without one use the variant name verbatim.
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromRepr, EnumString, IntoStaticStr, PartialEq, Eq, Hash)]
pub(crate) enum StaticSym {
    // ==========================
    // Tree heads (statement forms)
    Program,
    Block,
    Let,
    Const,
    Var,
    If,
    While,
    DoWhile,
    For,
    ForIn,
    ForOf,
    ForAwaitOf,
    Function,
    Lambda,
    Return,
    Throw,
    Break,
    Continue,
    Label,
    Try,
    Catch,
    Switch,
    Case,
    Default,
    Class,
    Extends,
    Empty,

    // ==========================
    // Tree heads (expression forms)
    Call,
    CallOpt,
    New,
    GetProperty,
    GetPropertyOpt,
    SetProperty,
    GetIndex,
    GetIndexOpt,
    SetIndex,
    Computed,
    ArrayLiteral,
    ObjectLiteral,
    Property,
    Method,
    Getter,
    Setter,
    Static,
    Spread,
    Rest,
    This,
    Super,
    Uninitialized,
    Assign,
    OpAssign,
    Conditional,
    Sequence,
    Template,
    Yield,
    YieldStar,
    Await,
    #[strum(serialize = "async", serialize = "Async")]
    Async,
    Generator,
    OptionalChain,
    Regex,
    Hole,

    // ==========================
    // Unary heads
    TypeOf,
    Void,
    Delete,
    Not,
    Neg,
    Pos,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,

    // ==========================
    // Operator token symbols
    #[strum(serialize = "+")]
    OpAdd,
    #[strum(serialize = "-")]
    OpSub,
    #[strum(serialize = "*")]
    OpMul,
    #[strum(serialize = "/")]
    OpDiv,
    #[strum(serialize = "%")]
    OpMod,
    #[strum(serialize = "**")]
    OpPow,
    #[strum(serialize = "==")]
    OpEq,
    #[strum(serialize = "!=")]
    OpNe,
    #[strum(serialize = "===")]
    OpStrictEq,
    #[strum(serialize = "!==")]
    OpStrictNe,
    #[strum(serialize = "<")]
    OpLt,
    #[strum(serialize = "<=")]
    OpLe,
    #[strum(serialize = ">")]
    OpGt,
    #[strum(serialize = ">=")]
    OpGe,
    #[strum(serialize = "&&")]
    OpAnd,
    #[strum(serialize = "||")]
    OpOr,
    #[strum(serialize = "??")]
    OpNullish,
    #[strum(serialize = "&")]
    OpBitAnd,
    #[strum(serialize = "|")]
    OpBitOr,
    #[strum(serialize = "^")]
    OpBitXor,
    #[strum(serialize = "<<")]
    OpShl,
    #[strum(serialize = ">>")]
    OpShr,
    #[strum(serialize = ">>>")]
    OpUShr,
    #[strum(serialize = "in")]
    OpIn,
    #[strum(serialize = "instanceof")]
    OpInstanceOf,

    // ==========================
    // Well-known property names
    #[strum(serialize = "length")]
    Length,
    #[strum(serialize = "prototype")]
    Prototype,
    #[strum(serialize = "constructor")]
    Constructor,
    #[strum(serialize = "name")]
    Name,
    #[strum(serialize = "message")]
    Message,
    #[strum(serialize = "value")]
    Value,
    #[strum(serialize = "done")]
    Done,
    #[strum(serialize = "next")]
    Next,
    #[strum(serialize = "then")]
    Then,
    #[strum(serialize = "catch")]
    CatchProp,
    #[strum(serialize = "finally")]
    FinallyProp,
    #[strum(serialize = "return")]
    ReturnProp,
    #[strum(serialize = "throw")]
    ThrowProp,
    #[strum(serialize = "iterator")]
    Iterator,
    #[strum(serialize = "asyncIterator")]
    AsyncIterator,
    #[strum(serialize = "size")]
    Size,
    #[strum(serialize = "undefined")]
    Undefined,
    #[strum(serialize = "of")]
    Of,
    #[strum(serialize = "get")]
    Get,
    #[strum(serialize = "set")]
    Set,
    #[strum(serialize = "keys")]
    Keys,

    // ==========================
    // Global names
    Symbol,
    Promise,
    Math,
    #[strum(serialize = "JSON")]
    Json,
    Date,
    Map,
    WeakMap,
    Object,
    Array,
    String,
    Number,
    Boolean,
    BigInt,
    #[strum(serialize = "console")]
    Console,
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    EvalError,
    RegExp,
    #[strum(serialize = "globalThis")]
    GlobalThis,
    NaN,
    Infinity,
    #[strum(serialize = "parseInt")]
    ParseInt,
    #[strum(serialize = "parseFloat")]
    ParseFloat,
    #[strum(serialize = "isNaN")]
    IsNaN,
    #[strum(serialize = "isFinite")]
    IsFinite,

    // ==========================
    // Reserved names of the CPS runtime. User code must not shadow these
    // at global scope.
    #[strum(serialize = "__awaitHelper")]
    AwaitHelper,
    #[strum(serialize = "__getAsyncIterator")]
    GetAsyncIterator,
    #[strum(serialize = "__iteratorNext")]
    IteratorNext,
    #[strum(serialize = "__resolve")]
    Resolve,
    #[strum(serialize = "__reject")]
    Reject,
    #[strum(serialize = "__err")]
    Err,
}

impl StaticSym {
    /// The source spelling of this symbol.
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Per-engine symbol interner.
///
/// `intern` returns the same handle for the same name across all calls.
/// Static symbols are resolved without touching the dynamic table.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    names: Vec<Box<str>>,
    map: AHashMap<Box<str>, Symbol>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a name, returning its unique symbol handle.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Ok(s) = StaticSym::from_str(name) {
            return s.into();
        }
        if let Some(&sym) = self.map.get(name) {
            return sym;
        }
        let sym = Symbol(STATIC_SYM_LIMIT + u32::try_from(self.names.len()).expect("interner overflow"));
        self.names.push(name.into());
        self.map.insert(name.into(), sym);
        sym
    }

    /// Resolves a symbol back to its name.
    ///
    /// # Panics
    /// Panics if the symbol was not produced by this interner.
    pub fn resolve(&self, sym: Symbol) -> &str {
        if let Some(s) = sym.as_static() {
            s.as_str()
        } else {
            &self.names[(sym.0 - STATIC_SYM_LIMIT) as usize]
        }
    }

    /// Number of dynamically interned names (excludes the static set).
    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_symbol() {
        let mut interner = Interner::new();
        let a = interner.intern("counter");
        let b = interner.intern("counter");
        let c = interner.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "counter");
    }

    #[test]
    fn static_symbols_resolve_without_interning() {
        let mut interner = Interner::new();
        let plus = interner.intern("+");
        assert!(plus.is(StaticSym::OpAdd));
        assert_eq!(interner.resolve(plus), "+");
        assert_eq!(interner.len(), 0);

        let proto = interner.intern("prototype");
        assert!(proto.is(StaticSym::Prototype));
        assert_eq!(interner.len(), 0);
    }

    #[test]
    fn reserved_helper_names_are_static() {
        let mut interner = Interner::new();
        assert!(interner.intern("__awaitHelper").is(StaticSym::AwaitHelper));
        assert!(interner.intern("__resolve").is(StaticSym::Resolve));
    }
}
