//! The typed AST consumed by the transformation passes and the evaluator.
//!
//! Built from the symbolic list form by [`crate::prepare`]. Every node carries
//! its source span, and the lowering passes preserve spans when they rewrite
//! subtrees. Function bodies live behind `Rc` so closures can share them
//! without cloning; the transformation passes are pure rewrites that build
//! new definitions instead of mutating shared ones.

use std::rc::Rc;

use num_bigint::BigInt;

use crate::{
    intern::{Interner, StaticSym, Symbol},
    lexer::CodeRange,
};

/// Declaration kinds for variable statements and loop bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Let,
    Const,
    Var,
}

/// The calling convention of a function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FuncKind {
    Plain,
    /// No `this` of its own; inherits the enclosing lexical `this`.
    Arrow,
    Generator,
    /// Rewritten to a promise-returning plain function by the CPS pass;
    /// never reaches the evaluator.
    Async,
    /// Installed on a prototype; carries a home object for `super`.
    Method,
    /// A class constructor.
    Ctor,
}

#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub name: Symbol,
    pub rest: bool,
}

/// A function definition shared between its AST site and the closures
/// created from it.
#[derive(Debug, Clone)]
pub(crate) struct FuncDef {
    pub name: Option<Symbol>,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub kind: FuncKind,
    pub span: CodeRange,
}

#[derive(Debug, Clone)]
pub(crate) struct VarDeclarator {
    pub name: Symbol,
    /// `None` leaves the binding uninitialized (`let x;` reads as undefined
    /// after initialization-on-entry; `const` requires an initializer).
    pub init: Option<ExprLoc>,
}

#[derive(Debug, Clone)]
pub(crate) struct VarDecl {
    pub kind: DeclKind,
    pub decls: Vec<VarDeclarator>,
    pub span: CodeRange,
}

#[derive(Debug, Clone)]
pub(crate) struct SwitchCase {
    /// `None` for the `default` clause.
    pub test: Option<ExprLoc>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub(crate) struct CatchClause {
    pub param: Option<Symbol>,
    pub body: Vec<Stmt>,
}

/// A property key in object literals and class bodies.
#[derive(Debug, Clone)]
pub(crate) enum PropKeyAst {
    Ident(Symbol),
    Str(Rc<str>),
    Num(f64),
    Computed(Box<ExprLoc>),
}

#[derive(Debug, Clone)]
pub(crate) enum PropValue {
    Value(ExprLoc),
    Getter(Rc<FuncDef>),
    Setter(Rc<FuncDef>),
    Method(Rc<FuncDef>),
}

#[derive(Debug, Clone)]
pub(crate) struct PropInit {
    pub key: PropKeyAst,
    pub value: PropValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassMemberKind {
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Clone)]
pub(crate) struct ClassMember {
    pub key: PropKeyAst,
    pub kind: ClassMemberKind,
    pub is_static: bool,
    pub func: Rc<FuncDef>,
}

#[derive(Debug, Clone)]
pub(crate) struct ClassDef {
    pub name: Option<Symbol>,
    pub parent: Option<ExprLoc>,
    /// The constructor, when the body declares one.
    pub ctor: Option<Rc<FuncDef>>,
    pub members: Vec<ClassMember>,
    pub span: CodeRange,
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Expr(ExprLoc),
    VarDecl(VarDecl),
    FuncDecl(Rc<FuncDef>),
    ClassDecl(Box<ClassDef>),
    Return {
        value: Option<ExprLoc>,
        span: CodeRange,
    },
    If {
        test: ExprLoc,
        cons: Box<Stmt>,
        alt: Option<Box<Stmt>>,
    },
    While {
        test: ExprLoc,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: ExprLoc,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<ExprLoc>,
        update: Option<ExprLoc>,
        body: Box<Stmt>,
    },
    ForIn {
        decl: Option<DeclKind>,
        target: Symbol,
        object: ExprLoc,
        body: Box<Stmt>,
    },
    ForOf {
        decl: Option<DeclKind>,
        target: Symbol,
        iterable: ExprLoc,
        body: Box<Stmt>,
        /// `for await (.. of ..)`; removed by the CPS pass.
        is_await: bool,
    },
    Switch {
        disc: ExprLoc,
        cases: Vec<SwitchCase>,
        span: CodeRange,
    },
    Break {
        label: Option<Symbol>,
        span: CodeRange,
    },
    Continue {
        label: Option<Symbol>,
        span: CodeRange,
    },
    Labeled {
        label: Symbol,
        body: Box<Stmt>,
    },
    Throw {
        value: ExprLoc,
        span: CodeRange,
    },
    Try {
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
        span: CodeRange,
    },
    Block(Vec<Stmt>, CodeRange),
    Empty,
}

/// Literal values that survive from source to runtime unchanged.
#[derive(Debug, Clone)]
pub(crate) enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    BigInt(Rc<BigInt>),
}

#[derive(Debug, Clone)]
pub(crate) enum MemberProp {
    Ident(Symbol),
    Computed(Box<ExprLoc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

/// Defined separately since these operators always return a bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Pos,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Literal),
    Ident(Symbol),
    This,
    Super,
    /// Array literal; `None` entries are holes.
    Array(Vec<Option<ExprLoc>>),
    Object(Vec<PropInit>),
    Function(Rc<FuncDef>),
    Class(Box<ClassDef>),
    Regex {
        pattern: Rc<str>,
        flags: Rc<str>,
    },
    Template {
        /// Literal chunks; always one more than `exprs`.
        chunks: Vec<Rc<str>>,
        exprs: Vec<ExprLoc>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<ExprLoc>,
    },
    Binary {
        op: BinOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Cmp {
        op: CmpOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Logical {
        op: LogicalOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Conditional {
        test: Box<ExprLoc>,
        cons: Box<ExprLoc>,
        alt: Box<ExprLoc>,
    },
    /// Assignment to an identifier or member target. `op` is `Some` for
    /// compound assignments (`+=` and friends); logical compound assignments
    /// are desugared by the prepare pass.
    Assign {
        op: Option<BinOp>,
        target: Box<ExprLoc>,
        value: Box<ExprLoc>,
    },
    /// Logical compound assignment (`&&=`, `||=`, `??=`), which only assigns
    /// when the logical operator selects the right-hand side.
    LogicalAssign {
        op: LogicalOp,
        target: Box<ExprLoc>,
        value: Box<ExprLoc>,
    },
    Call {
        callee: Box<ExprLoc>,
        args: Vec<ExprLoc>,
        optional: bool,
    },
    New {
        callee: Box<ExprLoc>,
        args: Vec<ExprLoc>,
    },
    Member {
        object: Box<ExprLoc>,
        prop: MemberProp,
        optional: bool,
    },
    /// Marks the root of a member/call chain containing at least one `?.`
    /// link. A nullish base at an optional link short-circuits the whole
    /// chain to `undefined` without affecting the surrounding expression.
    OptionalChain(Box<ExprLoc>),
    Sequence(Vec<ExprLoc>),
    Spread(Box<ExprLoc>),
    Yield {
        value: Option<Box<ExprLoc>>,
        delegated: bool,
    },
    Await(Box<ExprLoc>),
}

/// An expression with its source location.
#[derive(Debug, Clone)]
pub(crate) struct ExprLoc {
    pub span: CodeRange,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(span: CodeRange, expr: Expr) -> Self {
        Self { span, expr }
    }
}

// ==========================
// Construction helpers for the transformation passes.
//
// The lowering and CPS passes synthesize code; these keep those passes
// readable. All synthesized nodes reuse the span of the construct they
// replace so errors still point at user code.

impl ExprLoc {
    pub fn ident(sym: Symbol, span: CodeRange) -> Self {
        Self::new(span, Expr::Ident(sym))
    }

    pub fn undefined(span: CodeRange) -> Self {
        Self::new(span, Expr::Literal(Literal::Undefined))
    }

    pub fn call(callee: Self, args: Vec<Self>, span: CodeRange) -> Self {
        Self::new(
            span,
            Expr::Call {
                callee: Box::new(callee),
                args,
                optional: false,
            },
        )
    }

    /// `object.name` with a static property name.
    pub fn member(object: Self, name: StaticSym, span: CodeRange) -> Self {
        Self::new(
            span,
            Expr::Member {
                object: Box::new(object),
                prop: MemberProp::Ident(name.into()),
                optional: false,
            },
        )
    }

    /// `target = value` with an identifier target.
    pub fn assign(target: Symbol, value: Self, span: CodeRange) -> Self {
        Self::new(
            span,
            Expr::Assign {
                op: None,
                target: Box::new(Self::ident(target, span)),
                value: Box::new(value),
            },
        )
    }

    /// An arrow function expression wrapping the given body. Arrows keep the
    /// lexical `this`, which is what the synthesized continuations need.
    pub fn arrow(params: Vec<Symbol>, body: Vec<Stmt>, span: CodeRange) -> Self {
        let def = FuncDef {
            name: None,
            params: params.into_iter().map(|name| Param { name, rest: false }).collect(),
            body,
            kind: FuncKind::Arrow,
            span,
        };
        Self::new(span, Expr::Function(Rc::new(def)))
    }
}

impl Stmt {
    pub fn expr(expr: ExprLoc) -> Self {
        Self::Expr(expr)
    }

    /// `let name = init;`
    pub fn let_decl(name: Symbol, init: Option<ExprLoc>, span: CodeRange) -> Self {
        Self::VarDecl(VarDecl {
            kind: DeclKind::Let,
            decls: vec![VarDeclarator { name, init }],
            span,
        })
    }

    pub fn span(&self) -> CodeRange {
        match self {
            Self::Expr(e) => e.span,
            Self::VarDecl(d) => d.span,
            Self::FuncDecl(f) => f.span,
            Self::ClassDecl(c) => c.span,
            Self::Return { span, .. }
            | Self::Switch { span, .. }
            | Self::Break { span, .. }
            | Self::Continue { span, .. }
            | Self::Throw { span, .. }
            | Self::Try { span, .. }
            | Self::Block(_, span) => *span,
            Self::If { test, .. } => test.span,
            Self::While { test, .. } => test.span,
            Self::DoWhile { test, .. } => test.span,
            Self::For { body, .. } => body.span(),
            Self::ForIn { object, .. } => object.span,
            Self::ForOf { iterable, .. } => iterable.span,
            Self::Labeled { body, .. } => body.span(),
            Self::Empty => CodeRange::default(),
        }
    }
}

// ==========================
// Function-definition rewriting walk, shared by the transformation passes.
//
// Walks the whole tree rebuilding it, calling `f` on every function
// definition innermost-first (a definition's body is walked before `f` sees
// it). The passes use this to find generator/async functions wherever they
// appear without duplicating the traversal.

pub(crate) type FuncRewrite<'f> = &'f mut dyn FnMut(FuncDef) -> Result<Rc<FuncDef>, crate::exception::ParseError>;
type WalkResult<T> = Result<T, crate::exception::ParseError>;

pub(crate) fn map_functions(stmts: Vec<Stmt>, f: FuncRewrite) -> WalkResult<Vec<Stmt>> {
    stmts.into_iter().map(|s| map_stmt(s, f)).collect()
}

fn map_func(def: &Rc<FuncDef>, f: FuncRewrite) -> WalkResult<Rc<FuncDef>> {
    let body = map_functions(def.body.clone(), f)?;
    f(FuncDef {
        name: def.name,
        params: def.params.clone(),
        body,
        kind: def.kind,
        span: def.span,
    })
}

fn map_class(class: ClassDef, f: FuncRewrite) -> WalkResult<ClassDef> {
    Ok(ClassDef {
        name: class.name,
        parent: match class.parent {
            Some(p) => Some(map_expr(p, f)?),
            None => None,
        },
        ctor: match class.ctor {
            Some(c) => Some(map_func(&c, f)?),
            None => None,
        },
        members: class
            .members
            .into_iter()
            .map(|m| {
                Ok(ClassMember {
                    func: map_func(&m.func, f)?,
                    ..m
                })
            })
            .collect::<WalkResult<_>>()?,
        span: class.span,
    })
}

fn map_stmt(stmt: Stmt, f: FuncRewrite) -> WalkResult<Stmt> {
    Ok(match stmt {
        Stmt::Expr(e) => Stmt::Expr(map_expr(e, f)?),
        Stmt::VarDecl(mut d) => {
            for decl in &mut d.decls {
                if let Some(init) = decl.init.take() {
                    decl.init = Some(map_expr(init, f)?);
                }
            }
            Stmt::VarDecl(d)
        }
        Stmt::FuncDecl(def) => Stmt::FuncDecl(map_func(&def, f)?),
        Stmt::ClassDecl(c) => Stmt::ClassDecl(Box::new(map_class(*c, f)?)),
        Stmt::Return { value, span } => Stmt::Return {
            value: match value {
                Some(v) => Some(map_expr(v, f)?),
                None => None,
            },
            span,
        },
        Stmt::If { test, cons, alt } => Stmt::If {
            test: map_expr(test, f)?,
            cons: Box::new(map_stmt(*cons, f)?),
            alt: match alt {
                Some(a) => Some(Box::new(map_stmt(*a, f)?)),
                None => None,
            },
        },
        Stmt::While { test, body } => Stmt::While {
            test: map_expr(test, f)?,
            body: Box::new(map_stmt(*body, f)?),
        },
        Stmt::DoWhile { body, test } => Stmt::DoWhile {
            body: Box::new(map_stmt(*body, f)?),
            test: map_expr(test, f)?,
        },
        Stmt::For {
            init,
            test,
            update,
            body,
        } => Stmt::For {
            init: match init {
                Some(i) => Some(Box::new(map_stmt(*i, f)?)),
                None => None,
            },
            test: match test {
                Some(t) => Some(map_expr(t, f)?),
                None => None,
            },
            update: match update {
                Some(u) => Some(map_expr(u, f)?),
                None => None,
            },
            body: Box::new(map_stmt(*body, f)?),
        },
        Stmt::ForIn {
            decl,
            target,
            object,
            body,
        } => Stmt::ForIn {
            decl,
            target,
            object: map_expr(object, f)?,
            body: Box::new(map_stmt(*body, f)?),
        },
        Stmt::ForOf {
            decl,
            target,
            iterable,
            body,
            is_await,
        } => Stmt::ForOf {
            decl,
            target,
            iterable: map_expr(iterable, f)?,
            body: Box::new(map_stmt(*body, f)?),
            is_await,
        },
        Stmt::Switch { disc, cases, span } => Stmt::Switch {
            disc: map_expr(disc, f)?,
            cases: cases
                .into_iter()
                .map(|c| {
                    Ok(SwitchCase {
                        test: match c.test {
                            Some(t) => Some(map_expr(t, f)?),
                            None => None,
                        },
                        body: map_functions(c.body, f)?,
                    })
                })
                .collect::<WalkResult<_>>()?,
            span,
        },
        Stmt::Labeled { label, body } => Stmt::Labeled {
            label,
            body: Box::new(map_stmt(*body, f)?),
        },
        Stmt::Throw { value, span } => Stmt::Throw {
            value: map_expr(value, f)?,
            span,
        },
        Stmt::Try {
            block,
            catch,
            finally,
            span,
        } => Stmt::Try {
            block: map_functions(block, f)?,
            catch: match catch {
                Some(c) => Some(CatchClause {
                    param: c.param,
                    body: map_functions(c.body, f)?,
                }),
                None => None,
            },
            finally: match finally {
                Some(fin) => Some(map_functions(fin, f)?),
                None => None,
            },
            span,
        },
        Stmt::Block(stmts, span) => Stmt::Block(map_functions(stmts, f)?, span),
        s @ (Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty) => s,
    })
}

fn map_expr(expr: ExprLoc, f: FuncRewrite) -> WalkResult<ExprLoc> {
    let span = expr.span;
    let inner = match expr.expr {
        Expr::Function(def) => Expr::Function(map_func(&def, f)?),
        Expr::Class(c) => Expr::Class(Box::new(map_class(*c, f)?)),
        Expr::Array(items) => Expr::Array(
            items
                .into_iter()
                .map(|i| match i {
                    Some(e) => Ok(Some(map_expr(e, f)?)),
                    None => Ok(None),
                })
                .collect::<WalkResult<_>>()?,
        ),
        Expr::Object(props) => Expr::Object(
            props
                .into_iter()
                .map(|p| {
                    Ok(PropInit {
                        key: match p.key {
                            PropKeyAst::Computed(e) => PropKeyAst::Computed(Box::new(map_expr(*e, f)?)),
                            k => k,
                        },
                        value: match p.value {
                            PropValue::Value(e) => PropValue::Value(map_expr(e, f)?),
                            PropValue::Getter(g) => PropValue::Getter(map_func(&g, f)?),
                            PropValue::Setter(s) => PropValue::Setter(map_func(&s, f)?),
                            PropValue::Method(m) => PropValue::Method(map_func(&m, f)?),
                        },
                    })
                })
                .collect::<WalkResult<_>>()?,
        ),
        Expr::Template { chunks, exprs } => Expr::Template {
            chunks,
            exprs: exprs.into_iter().map(|e| map_expr(e, f)).collect::<WalkResult<_>>()?,
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: Box::new(map_expr(*operand, f)?),
        },
        Expr::Update { op, prefix, target } => Expr::Update {
            op,
            prefix,
            target: Box::new(map_expr(*target, f)?),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(map_expr(*left, f)?),
            right: Box::new(map_expr(*right, f)?),
        },
        Expr::Cmp { op, left, right } => Expr::Cmp {
            op,
            left: Box::new(map_expr(*left, f)?),
            right: Box::new(map_expr(*right, f)?),
        },
        Expr::Logical { op, left, right } => Expr::Logical {
            op,
            left: Box::new(map_expr(*left, f)?),
            right: Box::new(map_expr(*right, f)?),
        },
        Expr::Conditional { test, cons, alt } => Expr::Conditional {
            test: Box::new(map_expr(*test, f)?),
            cons: Box::new(map_expr(*cons, f)?),
            alt: Box::new(map_expr(*alt, f)?),
        },
        Expr::Assign { op, target, value } => Expr::Assign {
            op,
            target: Box::new(map_expr(*target, f)?),
            value: Box::new(map_expr(*value, f)?),
        },
        Expr::LogicalAssign { op, target, value } => Expr::LogicalAssign {
            op,
            target: Box::new(map_expr(*target, f)?),
            value: Box::new(map_expr(*value, f)?),
        },
        Expr::Call { callee, args, optional } => Expr::Call {
            callee: Box::new(map_expr(*callee, f)?),
            args: args.into_iter().map(|a| map_expr(a, f)).collect::<WalkResult<_>>()?,
            optional,
        },
        Expr::New { callee, args } => Expr::New {
            callee: Box::new(map_expr(*callee, f)?),
            args: args.into_iter().map(|a| map_expr(a, f)).collect::<WalkResult<_>>()?,
        },
        Expr::Member { object, prop, optional } => Expr::Member {
            object: Box::new(map_expr(*object, f)?),
            prop: match prop {
                MemberProp::Computed(e) => MemberProp::Computed(Box::new(map_expr(*e, f)?)),
                p => p,
            },
            optional,
        },
        Expr::OptionalChain(inner) => Expr::OptionalChain(Box::new(map_expr(*inner, f)?)),
        Expr::Sequence(items) => Expr::Sequence(items.into_iter().map(|e| map_expr(e, f)).collect::<WalkResult<_>>()?),
        Expr::Spread(inner) => Expr::Spread(Box::new(map_expr(*inner, f)?)),
        Expr::Yield { value, delegated } => Expr::Yield {
            value: match value {
                Some(v) => Some(Box::new(map_expr(*v, f)?)),
                None => None,
            },
            delegated,
        },
        Expr::Await(inner) => Expr::Await(Box::new(map_expr(*inner, f)?)),
        e @ (Expr::Literal(_) | Expr::Ident(_) | Expr::This | Expr::Super | Expr::Regex { .. }) => e,
    };
    Ok(ExprLoc::new(span, inner))
}

// ==========================
// Snapshot rendering for transformation tests.

impl Stmt {
    /// Renders a stable, span-free textual form of the statement tree.
    pub fn snapshot(&self, interner: &Interner) -> String {
        let mut out = String::new();
        self.write(interner, &mut out);
        out
    }

    fn write(&self, interner: &Interner, out: &mut String) {
        match self {
            Self::Expr(e) => {
                out.push_str("(expr ");
                e.write(interner, out);
                out.push(')');
            }
            Self::VarDecl(d) => {
                out.push('(');
                out.push_str(match d.kind {
                    DeclKind::Let => "let",
                    DeclKind::Const => "const",
                    DeclKind::Var => "var",
                });
                for decl in &d.decls {
                    out.push(' ');
                    out.push('(');
                    out.push_str(interner.resolve(decl.name));
                    if let Some(init) = &decl.init {
                        out.push(' ');
                        init.write(interner, out);
                    }
                    out.push(')');
                }
                out.push(')');
            }
            Self::FuncDecl(f) => write_func(f, interner, out),
            Self::ClassDecl(c) => {
                out.push_str("(class");
                if let Some(name) = c.name {
                    out.push(' ');
                    out.push_str(interner.resolve(name));
                }
                out.push(')');
            }
            Self::Return { value, .. } => {
                out.push_str("(return");
                if let Some(v) = value {
                    out.push(' ');
                    v.write(interner, out);
                }
                out.push(')');
            }
            Self::If { test, cons, alt } => {
                out.push_str("(if ");
                test.write(interner, out);
                out.push(' ');
                cons.write(interner, out);
                if let Some(alt) = alt {
                    out.push(' ');
                    alt.write(interner, out);
                }
                out.push(')');
            }
            Self::While { test, body } => {
                out.push_str("(while ");
                test.write(interner, out);
                out.push(' ');
                body.write(interner, out);
                out.push(')');
            }
            Self::DoWhile { body, test } => {
                out.push_str("(do-while ");
                body.write(interner, out);
                out.push(' ');
                test.write(interner, out);
                out.push(')');
            }
            Self::For { init, test, update, body } => {
                out.push_str("(for ");
                match init {
                    Some(s) => s.write(interner, out),
                    None => out.push('_'),
                }
                out.push(' ');
                match test {
                    Some(e) => e.write(interner, out),
                    None => out.push('_'),
                }
                out.push(' ');
                match update {
                    Some(e) => e.write(interner, out),
                    None => out.push('_'),
                }
                out.push(' ');
                body.write(interner, out);
                out.push(')');
            }
            Self::ForIn { target, object, body, .. } => {
                out.push_str("(for-in ");
                out.push_str(interner.resolve(*target));
                out.push(' ');
                object.write(interner, out);
                out.push(' ');
                body.write(interner, out);
                out.push(')');
            }
            Self::ForOf {
                target,
                iterable,
                body,
                is_await,
                ..
            } => {
                out.push_str(if *is_await { "(for-await-of " } else { "(for-of " });
                out.push_str(interner.resolve(*target));
                out.push(' ');
                iterable.write(interner, out);
                out.push(' ');
                body.write(interner, out);
                out.push(')');
            }
            Self::Switch { disc, cases, .. } => {
                out.push_str("(switch ");
                disc.write(interner, out);
                for case in cases {
                    out.push_str(" (case");
                    if let Some(test) = &case.test {
                        out.push(' ');
                        test.write(interner, out);
                    }
                    for stmt in &case.body {
                        out.push(' ');
                        stmt.write(interner, out);
                    }
                    out.push(')');
                }
                out.push(')');
            }
            Self::Break { label, .. } => {
                out.push_str("(break");
                if let Some(label) = label {
                    out.push(' ');
                    out.push_str(interner.resolve(*label));
                }
                out.push(')');
            }
            Self::Continue { label, .. } => {
                out.push_str("(continue");
                if let Some(label) = label {
                    out.push(' ');
                    out.push_str(interner.resolve(*label));
                }
                out.push(')');
            }
            Self::Labeled { label, body } => {
                out.push_str("(label ");
                out.push_str(interner.resolve(*label));
                out.push(' ');
                body.write(interner, out);
                out.push(')');
            }
            Self::Throw { value, .. } => {
                out.push_str("(throw ");
                value.write(interner, out);
                out.push(')');
            }
            Self::Try { block, catch, finally, .. } => {
                out.push_str("(try (");
                write_stmts(block, interner, out);
                out.push(')');
                if let Some(catch) = catch {
                    out.push_str(" (catch");
                    if let Some(param) = catch.param {
                        out.push(' ');
                        out.push_str(interner.resolve(param));
                    }
                    out.push_str(" (");
                    write_stmts(&catch.body, interner, out);
                    out.push_str("))");
                }
                if let Some(finally) = finally {
                    out.push_str(" (finally (");
                    write_stmts(finally, interner, out);
                    out.push_str("))");
                }
                out.push(')');
            }
            Self::Block(stmts, _) => {
                out.push_str("(block ");
                write_stmts(stmts, interner, out);
                out.push(')');
            }
            Self::Empty => out.push_str("(empty)"),
        }
    }
}

fn write_stmts(stmts: &[Stmt], interner: &Interner, out: &mut String) {
    for (i, stmt) in stmts.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        stmt.write(interner, out);
    }
}

fn write_func(f: &FuncDef, interner: &Interner, out: &mut String) {
    out.push_str(match f.kind {
        FuncKind::Plain | FuncKind::Method | FuncKind::Ctor => "(function",
        FuncKind::Arrow => "(arrow",
        FuncKind::Generator => "(generator",
        FuncKind::Async => "(async",
    });
    if let Some(name) = f.name {
        out.push(' ');
        out.push_str(interner.resolve(name));
    }
    out.push_str(" (");
    for (i, p) in f.params.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if p.rest {
            out.push_str("...");
        }
        out.push_str(interner.resolve(p.name));
    }
    out.push_str(") (");
    write_stmts(&f.body, interner, out);
    out.push_str("))");
}

impl ExprLoc {
    pub fn snapshot(&self, interner: &Interner) -> String {
        let mut out = String::new();
        self.write(interner, &mut out);
        out
    }

    fn write(&self, interner: &Interner, out: &mut String) {
        self.expr.write(interner, out);
    }
}

impl Expr {
    fn write(&self, interner: &Interner, out: &mut String) {
        match self {
            Self::Literal(lit) => match lit {
                Literal::Undefined => out.push_str("undefined"),
                Literal::Null => out.push_str("null"),
                Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                Literal::Num(n) => {
                    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                        out.push_str(&format!("{}", *n as i64));
                    } else {
                        out.push_str(ryu::Buffer::new().format(*n));
                    }
                }
                Literal::Str(s) => {
                    out.push('"');
                    out.push_str(s);
                    out.push('"');
                }
                Literal::BigInt(b) => {
                    out.push_str(&b.to_string());
                    out.push('n');
                }
            },
            Self::Ident(sym) => out.push_str(interner.resolve(*sym)),
            Self::This => out.push_str("this"),
            Self::Super => out.push_str("super"),
            Self::Array(items) => {
                out.push_str("(array");
                for item in items {
                    out.push(' ');
                    match item {
                        Some(e) => e.write(interner, out),
                        None => out.push('_'),
                    }
                }
                out.push(')');
            }
            Self::Object(props) => {
                out.push_str("(object");
                for prop in props {
                    out.push(' ');
                    out.push('(');
                    match &prop.key {
                        PropKeyAst::Ident(sym) => out.push_str(interner.resolve(*sym)),
                        PropKeyAst::Str(s) => {
                            out.push('"');
                            out.push_str(s);
                            out.push('"');
                        }
                        PropKeyAst::Num(n) => out.push_str(&format!("{n}")),
                        PropKeyAst::Computed(e) => {
                            out.push('[');
                            e.write(interner, out);
                            out.push(']');
                        }
                    }
                    out.push(' ');
                    match &prop.value {
                        PropValue::Value(e) => e.write(interner, out),
                        PropValue::Getter(f) => write_func(f, interner, out),
                        PropValue::Setter(f) => write_func(f, interner, out),
                        PropValue::Method(f) => write_func(f, interner, out),
                    }
                    out.push(')');
                }
                out.push(')');
            }
            Self::Function(f) => write_func(f, interner, out),
            Self::Class(c) => {
                out.push_str("(class-expr");
                if let Some(name) = c.name {
                    out.push(' ');
                    out.push_str(interner.resolve(name));
                }
                out.push(')');
            }
            Self::Regex { pattern, flags } => {
                out.push('/');
                out.push_str(pattern);
                out.push('/');
                out.push_str(flags);
            }
            Self::Template { chunks, exprs } => {
                out.push_str("(template");
                for (i, chunk) in chunks.iter().enumerate() {
                    out.push_str(" \"");
                    out.push_str(chunk);
                    out.push('"');
                    if let Some(e) = exprs.get(i) {
                        out.push(' ');
                        e.write(interner, out);
                    }
                }
                out.push(')');
            }
            Self::Unary { op, operand } => {
                out.push('(');
                out.push_str(match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "neg",
                    UnaryOp::Pos => "pos",
                    UnaryOp::BitNot => "~",
                    UnaryOp::TypeOf => "typeof",
                    UnaryOp::Void => "void",
                    UnaryOp::Delete => "delete",
                });
                out.push(' ');
                operand.write(interner, out);
                out.push(')');
            }
            Self::Update { op, prefix, target } => {
                out.push('(');
                out.push_str(match (op, prefix) {
                    (UpdateOp::Inc, true) => "pre++",
                    (UpdateOp::Inc, false) => "post++",
                    (UpdateOp::Dec, true) => "pre--",
                    (UpdateOp::Dec, false) => "post--",
                });
                out.push(' ');
                target.write(interner, out);
                out.push(')');
            }
            Self::Binary { op, left, right } => {
                out.push('(');
                out.push_str(bin_op_str(*op));
                out.push(' ');
                left.write(interner, out);
                out.push(' ');
                right.write(interner, out);
                out.push(')');
            }
            Self::Cmp { op, left, right } => {
                out.push('(');
                out.push_str(match op {
                    CmpOp::Eq => "==",
                    CmpOp::Ne => "!=",
                    CmpOp::StrictEq => "===",
                    CmpOp::StrictNe => "!==",
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                    CmpOp::In => "in",
                    CmpOp::InstanceOf => "instanceof",
                });
                out.push(' ');
                left.write(interner, out);
                out.push(' ');
                right.write(interner, out);
                out.push(')');
            }
            Self::Logical { op, left, right } => {
                out.push('(');
                out.push_str(logical_op_str(*op));
                out.push(' ');
                left.write(interner, out);
                out.push(' ');
                right.write(interner, out);
                out.push(')');
            }
            Self::Conditional { test, cons, alt } => {
                out.push_str("(?: ");
                test.write(interner, out);
                out.push(' ');
                cons.write(interner, out);
                out.push(' ');
                alt.write(interner, out);
                out.push(')');
            }
            Self::Assign { op, target, value } => {
                out.push('(');
                match op {
                    Some(op) => {
                        out.push_str(bin_op_str(*op));
                        out.push('=');
                    }
                    None => out.push('='),
                }
                out.push(' ');
                target.write(interner, out);
                out.push(' ');
                value.write(interner, out);
                out.push(')');
            }
            Self::LogicalAssign { op, target, value } => {
                out.push('(');
                out.push_str(logical_op_str(*op));
                out.push('=');
                out.push(' ');
                target.write(interner, out);
                out.push(' ');
                value.write(interner, out);
                out.push(')');
            }
            Self::Call { callee, args, optional } => {
                out.push_str(if *optional { "(call? " } else { "(call " });
                callee.write(interner, out);
                for arg in args {
                    out.push(' ');
                    arg.write(interner, out);
                }
                out.push(')');
            }
            Self::New { callee, args } => {
                out.push_str("(new ");
                callee.write(interner, out);
                for arg in args {
                    out.push(' ');
                    arg.write(interner, out);
                }
                out.push(')');
            }
            Self::Member { object, prop, optional } => {
                out.push_str(if *optional { "(get? " } else { "(get " });
                object.write(interner, out);
                out.push(' ');
                match prop {
                    MemberProp::Ident(sym) => out.push_str(interner.resolve(*sym)),
                    MemberProp::Computed(e) => {
                        out.push('[');
                        e.write(interner, out);
                        out.push(']');
                    }
                }
                out.push(')');
            }
            Self::OptionalChain(inner) => {
                out.push_str("(chain ");
                inner.write(interner, out);
                out.push(')');
            }
            Self::Sequence(items) => {
                out.push_str("(seq");
                for item in items {
                    out.push(' ');
                    item.write(interner, out);
                }
                out.push(')');
            }
            Self::Spread(inner) => {
                out.push_str("(spread ");
                inner.write(interner, out);
                out.push(')');
            }
            Self::Yield { value, delegated } => {
                out.push_str(if *delegated { "(yield*" } else { "(yield" });
                if let Some(v) = value {
                    out.push(' ');
                    v.write(interner, out);
                }
                out.push(')');
            }
            Self::Await(inner) => {
                out.push_str("(await ");
                inner.write(interner, out);
                out.push(')');
            }
        }
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::UShr => ">>>",
    }
}

fn logical_op_str(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
        LogicalOp::Nullish => "??",
    }
}

/// Renders a whole program body for snapshot tests.
pub(crate) fn snapshot_program(stmts: &[Stmt], interner: &Interner) -> String {
    let mut out = String::new();
    write_stmts(stmts, interner, &mut out);
    out
}
