//! Generator-yield lowering.
//!
//! Rewrites generator bodies so every `yield` appears at the top level of an
//! expression statement, a temp assignment, or a return expression. The
//! evaluator's generator stepper can then suspend on statement boundaries
//! only. The same normalization machinery runs over async bodies for `await`
//! before the CPS pass (the temp names share the `__yield_lower_resume`
//! prefix, which is reserved against user code).
//!
//! The algorithm follows a few fixed rewrites:
//! - `let x = yield e`        -> `let __t; __t = yield e; let x = __t;`
//! - `if (yield e) ..`        -> `let __t; __t = yield e; if (__t) ..`
//! - loop conditions/updates with yields are pulled into the loop body as an
//!   assignment followed by a conditional break.
//!
//! Delegated yields (`yield*`) are accepted only in single-operand positions
//! (statement expression, declarator initializer, simple assignment, return).
//! Anywhere else the lowering refuses the construct with a syntax error, the
//! documented-refusal resolution of the open design point. Suspends nested in
//! the short-circuit arm of `&&`/`||`/`??`/`?:` are refused for the same
//! reason: hoisting them would run them unconditionally.
//!
//! Nested function expressions are not traversed: each generator function is
//! lowered in isolation by the program walk at the bottom of this module.

use std::rc::Rc;

use crate::{
    ast::{
        CatchClause, Expr, ExprLoc, FuncDef, FuncKind, Literal, MemberProp, PropInit, PropValue, Stmt, SwitchCase,
        UnaryOp, VarDecl, VarDeclarator,
    },
    exception::ParseError,
    intern::{Interner, Symbol},
    lexer::CodeRange,
};

/// Which suspension construct a normalization pass extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuspendKind {
    Yield,
    Await,
}

/// Reserved prefix for lowering temporaries.
const TEMP_PREFIX: &str = "__yield_lower_resume";

pub(crate) struct Normalizer<'a> {
    interner: &'a mut Interner,
    kind: SuspendKind,
    counter: u32,
}

type LowerResult<T> = Result<T, ParseError>;

impl<'a> Normalizer<'a> {
    pub fn new(interner: &'a mut Interner, kind: SuspendKind) -> Self {
        Self {
            interner,
            kind,
            counter: 0,
        }
    }

    fn fresh_temp(&mut self) -> Symbol {
        let name = format!("{TEMP_PREFIX}{}", self.counter);
        self.counter += 1;
        self.interner.intern(&name)
    }

    fn err(&self, span: CodeRange, message: &str) -> ParseError {
        ParseError::new(message.to_owned(), span.start)
    }

    /// Whether this expression is the suspend form this pass extracts.
    fn is_suspend(&self, expr: &Expr) -> bool {
        match self.kind {
            SuspendKind::Yield => matches!(expr, Expr::Yield { .. }),
            SuspendKind::Await => matches!(expr, Expr::Await(_)),
        }
    }

    fn is_delegated(expr: &Expr) -> bool {
        matches!(expr, Expr::Yield { delegated: true, .. })
    }

    /// A suspend expression whose operand carries no further suspends, i.e.
    /// one the stepper can evaluate atomically before suspending.
    fn is_simple_suspend(&self, expr: &Expr) -> bool {
        if !self.is_suspend(expr) {
            return false;
        }
        match expr {
            Expr::Yield { value, .. } => value
                .as_ref()
                .is_none_or(|v| !contains_suspend_expr(v, self.kind)),
            Expr::Await(inner) => !contains_suspend_expr(inner, self.kind),
            _ => false,
        }
    }

    // ==========================
    // Body normalization

    pub fn normalize_body(&mut self, stmts: Vec<Stmt>) -> LowerResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.normalize_stmt(stmt, None, &mut out)?;
        }
        Ok(out)
    }

    fn normalize_boxed(&mut self, stmt: Box<Stmt>) -> LowerResult<Box<Stmt>> {
        let span = stmt.span();
        let mut out = Vec::new();
        self.normalize_stmt(*stmt, None, &mut out)?;
        Ok(Box::new(if out.len() == 1 {
            out.pop().expect("single statement")
        } else {
            Stmt::Block(out, span)
        }))
    }

    #[expect(clippy::too_many_lines, reason = "one arm per statement kind")]
    fn normalize_stmt(&mut self, stmt: Stmt, label: Option<Symbol>, out: &mut Vec<Stmt>) -> LowerResult<()> {
        match stmt {
            // Already-canonical suspend shapes stay put.
            Stmt::Expr(e) if self.is_simple_suspend(&e.expr) => out.push(Stmt::Expr(e)),
            Stmt::Expr(ExprLoc {
                span,
                expr:
                    Expr::Assign {
                        op: None,
                        target,
                        value,
                    },
            }) if matches!(target.expr, Expr::Ident(_)) && self.is_simple_suspend(&value.expr) => {
                out.push(Stmt::Expr(ExprLoc::new(
                    span,
                    Expr::Assign {
                        op: None,
                        target,
                        value,
                    },
                )));
            }
            Stmt::Return { value: Some(v), span } if self.is_simple_suspend(&v.expr) => {
                out.push(Stmt::Return { value: Some(v), span });
            }

            Stmt::Expr(e) => {
                let e = self.extract(e, out)?;
                out.push(Stmt::Expr(e));
            }
            Stmt::VarDecl(decl) => self.normalize_var_decl(decl, out)?,
            Stmt::Return { value, span } => {
                let value = match value {
                    Some(v) => Some(self.extract(v, out)?),
                    None => None,
                };
                out.push(Stmt::Return { value, span });
            }
            Stmt::Throw { value, span } => {
                let value = self.extract(value, out)?;
                out.push(Stmt::Throw { value, span });
            }
            Stmt::If { test, cons, alt } => {
                let test = self.extract(test, out)?;
                let cons = self.normalize_boxed(cons)?;
                let alt = match alt {
                    Some(alt) => Some(self.normalize_boxed(alt)?),
                    None => None,
                };
                out.push(Stmt::If { test, cons, alt });
            }
            Stmt::While { test, body } => self.normalize_while(test, body, label, out)?,
            Stmt::DoWhile { body, test } => self.normalize_do_while(body, test, label, out)?,
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.normalize_for(init, test, update, body, label, out)?,
            Stmt::ForIn {
                decl,
                target,
                object,
                body,
            } => {
                let object = self.extract(object, out)?;
                let body = self.normalize_boxed(body)?;
                let stmt = Stmt::ForIn {
                    decl,
                    target,
                    object,
                    body,
                };
                out.push(attach_label(label, stmt));
            }
            Stmt::ForOf {
                decl,
                target,
                iterable,
                body,
                is_await,
            } => {
                let iterable = self.extract(iterable, out)?;
                let body = self.normalize_boxed(body)?;
                let stmt = Stmt::ForOf {
                    decl,
                    target,
                    iterable,
                    body,
                    is_await,
                };
                out.push(attach_label(label, stmt));
            }
            Stmt::Switch { disc, cases, span } => {
                for case in &cases {
                    if let Some(test) = &case.test
                        && contains_suspend_expr(test, self.kind)
                    {
                        return Err(self.err(test.span, "yield in a switch case test is not supported"));
                    }
                }
                let disc = self.extract(disc, out)?;
                let cases = cases
                    .into_iter()
                    .map(|case| {
                        Ok(SwitchCase {
                            test: case.test,
                            body: self.normalize_body(case.body)?,
                        })
                    })
                    .collect::<LowerResult<_>>()?;
                out.push(Stmt::Switch { disc, cases, span });
            }
            Stmt::Try {
                block,
                catch,
                finally,
                span,
            } => {
                let block = self.normalize_body(block)?;
                let catch = match catch {
                    Some(c) => Some(CatchClause {
                        param: c.param,
                        body: self.normalize_body(c.body)?,
                    }),
                    None => None,
                };
                let finally = match finally {
                    Some(f) => Some(self.normalize_body(f)?),
                    None => None,
                };
                out.push(Stmt::Try {
                    block,
                    catch,
                    finally,
                    span,
                });
            }
            Stmt::Block(stmts, span) => out.push(Stmt::Block(self.normalize_body(stmts)?, span)),
            Stmt::Labeled { label: l, body } => {
                // Loops consume the label themselves so rewrites keep
                // `continue label` working.
                self.normalize_stmt(*body, Some(l), out)?;
            }
            other @ (Stmt::FuncDecl(_)
            | Stmt::ClassDecl(_)
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Empty) => out.push(other),
        }
        Ok(())
    }

    fn normalize_var_decl(&mut self, decl: VarDecl, out: &mut Vec<Stmt>) -> LowerResult<()> {
        let any_suspend = decl
            .decls
            .iter()
            .any(|d| d.init.as_ref().is_some_and(|i| contains_suspend_expr(i, self.kind)));
        if !any_suspend {
            out.push(Stmt::VarDecl(decl));
            return Ok(());
        }
        // Split so each suspended initializer can grow its own prelude.
        for declarator in decl.decls {
            match declarator.init {
                Some(init) if self.is_simple_suspend(&init.expr) => {
                    // `let x = yield e` -> `let __t; __t = yield e; let x = __t;`
                    let span = init.span;
                    let temp = self.fresh_temp();
                    out.push(Stmt::let_decl(temp, None, span));
                    out.push(Stmt::Expr(ExprLoc::assign(temp, init, span)));
                    out.push(Stmt::VarDecl(VarDecl {
                        kind: decl.kind,
                        decls: vec![VarDeclarator {
                            name: declarator.name,
                            init: Some(ExprLoc::ident(temp, span)),
                        }],
                        span,
                    }));
                }
                Some(init) => {
                    let init = self.extract(init, out)?;
                    out.push(Stmt::VarDecl(VarDecl {
                        kind: decl.kind,
                        decls: vec![VarDeclarator {
                            name: declarator.name,
                            init: Some(init),
                        }],
                        span: decl.span,
                    }));
                }
                None => out.push(Stmt::VarDecl(VarDecl {
                    kind: decl.kind,
                    decls: vec![VarDeclarator {
                        name: declarator.name,
                        init: None,
                    }],
                    span: decl.span,
                })),
            }
        }
        Ok(())
    }

    fn normalize_while(
        &mut self,
        test: ExprLoc,
        body: Box<Stmt>,
        label: Option<Symbol>,
        out: &mut Vec<Stmt>,
    ) -> LowerResult<()> {
        let body = self.normalize_boxed(body)?;
        if !contains_suspend_expr(&test, self.kind) {
            out.push(attach_label(label, Stmt::While { test, body }));
            return Ok(());
        }
        // `while (yield e) body` -> `while (true) { __t = yield e; if (!__t) break; body }`
        let span = test.span;
        let mut loop_body = Vec::new();
        let test = self.extract(test, &mut loop_body)?;
        loop_body.push(break_unless(test, span));
        loop_body.push(*body);
        let stmt = Stmt::While {
            test: ExprLoc::new(span, Expr::Literal(Literal::Bool(true))),
            body: Box::new(Stmt::Block(loop_body, span)),
        };
        out.push(attach_label(label, stmt));
        Ok(())
    }

    fn normalize_do_while(
        &mut self,
        body: Box<Stmt>,
        test: ExprLoc,
        label: Option<Symbol>,
        out: &mut Vec<Stmt>,
    ) -> LowerResult<()> {
        let body = self.normalize_boxed(body)?;
        if !contains_suspend_expr(&test, self.kind) {
            out.push(attach_label(label, Stmt::DoWhile { body, test }));
            return Ok(());
        }
        let span = test.span;
        if contains_loop_continue(&body) {
            // `continue` must re-run the suspended condition, which the
            // rewrite below cannot express.
            return Err(self.err(span, "yield in a do..while condition with continue is not supported"));
        }
        // `do body while (yield e)` -> `while (true) { body; __t = yield e; if (!__t) break; }`
        let mut loop_body = vec![*body];
        let test = self.extract(test, &mut loop_body)?;
        loop_body.push(break_unless(test, span));
        let stmt = Stmt::While {
            test: ExprLoc::new(span, Expr::Literal(Literal::Bool(true))),
            body: Box::new(Stmt::Block(loop_body, span)),
        };
        out.push(attach_label(label, stmt));
        Ok(())
    }

    fn normalize_for(
        &mut self,
        init: Option<Box<Stmt>>,
        test: Option<ExprLoc>,
        update: Option<ExprLoc>,
        body: Box<Stmt>,
        label: Option<Symbol>,
        out: &mut Vec<Stmt>,
    ) -> LowerResult<()> {
        // The initializer runs once; its suspends become a prelude.
        let init = match init {
            Some(init) => {
                let mut init_out = Vec::new();
                self.normalize_stmt(*init, None, &mut init_out)?;
                Some(init_out)
            }
            None => None,
        };

        let test_suspends = test.as_ref().is_some_and(|t| contains_suspend_expr(t, self.kind));
        let update_suspends = update.as_ref().is_some_and(|u| contains_suspend_expr(u, self.kind));
        let body = self.normalize_boxed(body)?;

        if !test_suspends && !update_suspends {
            let init = match init {
                Some(mut stmts) if stmts.len() == 1 => Some(Box::new(stmts.pop().expect("single init"))),
                Some(stmts) => {
                    // Multi-statement prelude: hoist it before the loop.
                    out.extend(stmts);
                    out.push(attach_label(
                        label,
                        Stmt::For {
                            init: None,
                            test,
                            update,
                            body,
                        },
                    ));
                    return Ok(());
                }
                None => None,
            };
            out.push(attach_label(label, Stmt::For { init, test, update, body }));
            return Ok(());
        }

        // Suspends in the condition or increment: pull both into the body of
        // a `while (true)` guarded by a first-iteration flag so `continue`
        // still reaches the increment.
        let span = body.span();
        let first = self.fresh_temp();
        let mut block = Vec::new();
        if let Some(init_stmts) = init {
            block.extend(init_stmts);
        }
        block.push(Stmt::let_decl(
            first,
            Some(ExprLoc::new(span, Expr::Literal(Literal::Bool(true)))),
            span,
        ));

        let mut loop_body = Vec::new();
        if let Some(update) = update {
            let mut update_stmts = Vec::new();
            let update = self.extract(update, &mut update_stmts)?;
            update_stmts.push(Stmt::Expr(update));
            loop_body.push(Stmt::If {
                test: ExprLoc::new(
                    span,
                    Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(ExprLoc::ident(first, span)),
                    },
                ),
                cons: Box::new(Stmt::Block(update_stmts, span)),
                alt: None,
            });
        }
        loop_body.push(Stmt::Expr(ExprLoc::assign(
            first,
            ExprLoc::new(span, Expr::Literal(Literal::Bool(false))),
            span,
        )));
        if let Some(test) = test {
            let test = self.extract(test, &mut loop_body)?;
            loop_body.push(break_unless(test, span));
        }
        loop_body.push(*body);

        block.push(attach_label(
            label,
            Stmt::While {
                test: ExprLoc::new(span, Expr::Literal(Literal::Bool(true))),
                body: Box::new(Stmt::Block(loop_body, span)),
            },
        ));
        out.push(Stmt::Block(block, span));
        Ok(())
    }

    // ==========================
    // Expression extraction

    /// Replaces each suspend subexpression with a fresh temp, emitting
    /// `let __t; __t = <suspend>;` pairs into the prelude in evaluation
    /// order. The returned expression is suspend-free.
    fn extract(&mut self, expr: ExprLoc, prelude: &mut Vec<Stmt>) -> LowerResult<ExprLoc> {
        if !contains_suspend_expr(&expr, self.kind) {
            return Ok(expr);
        }
        self.extract_expr(expr, prelude)
    }

    fn extract_boxed(&mut self, expr: Box<ExprLoc>, prelude: &mut Vec<Stmt>) -> LowerResult<Box<ExprLoc>> {
        Ok(Box::new(self.extract_expr(*expr, prelude)?))
    }

    #[expect(clippy::too_many_lines, reason = "one arm per expression kind")]
    fn extract_expr(&mut self, expr: ExprLoc, prelude: &mut Vec<Stmt>) -> LowerResult<ExprLoc> {
        let span = expr.span;
        if self.is_suspend(&expr.expr) {
            if Self::is_delegated(&expr.expr) {
                return Err(self.err(span, "yield* is not supported in this position"));
            }
            // The suspend operand itself may contain further suspends.
            let inner = match expr.expr {
                Expr::Yield { value, delegated } => {
                    let value = match value {
                        Some(v) => Some(self.extract_boxed(v, prelude)?),
                        None => None,
                    };
                    Expr::Yield { value, delegated }
                }
                Expr::Await(v) => Expr::Await(self.extract_boxed(v, prelude)?),
                _ => unreachable!("is_suspend covers yield/await only"),
            };
            let temp = self.fresh_temp();
            if self.kind == SuspendKind::Yield {
                prelude.push(Stmt::let_decl(temp, None, span));
            }
            prelude.push(Stmt::Expr(ExprLoc::assign(temp, ExprLoc::new(span, inner), span)));
            return Ok(ExprLoc::ident(temp, span));
        }

        let expr_inner = match expr.expr {
            e @ (Expr::Literal(_)
            | Expr::Ident(_)
            | Expr::This
            | Expr::Super
            | Expr::Regex { .. }
            | Expr::Function(_)
            | Expr::Class(_)) => e,
            Expr::Array(items) => Expr::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Some(e) => Ok(Some(self.extract_expr(e, prelude)?)),
                        None => Ok(None),
                    })
                    .collect::<LowerResult<_>>()?,
            ),
            Expr::Object(props) => Expr::Object(
                props
                    .into_iter()
                    .map(|prop| {
                        Ok(PropInit {
                            key: prop.key,
                            value: match prop.value {
                                PropValue::Value(e) => PropValue::Value(self.extract_expr(e, prelude)?),
                                accessor => accessor,
                            },
                        })
                    })
                    .collect::<LowerResult<_>>()?,
            ),
            Expr::Template { chunks, exprs } => Expr::Template {
                chunks,
                exprs: exprs
                    .into_iter()
                    .map(|e| self.extract_expr(e, prelude))
                    .collect::<LowerResult<_>>()?,
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: self.extract_boxed(operand, prelude)?,
            },
            Expr::Update { op, prefix, target } => Expr::Update {
                op,
                prefix,
                target: self.extract_boxed(target, prelude)?,
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: self.extract_boxed(left, prelude)?,
                right: self.extract_boxed(right, prelude)?,
            },
            Expr::Cmp { op, left, right } => Expr::Cmp {
                op,
                left: self.extract_boxed(left, prelude)?,
                right: self.extract_boxed(right, prelude)?,
            },
            Expr::Logical { op, left, right } => {
                // The right operand is conditionally evaluated; hoisting a
                // suspend out of it would run it unconditionally.
                if contains_suspend_expr(&right, self.kind) {
                    return Err(self.err(right.span, "yield in the short-circuit arm of a logical expression is not supported"));
                }
                Expr::Logical {
                    op,
                    left: self.extract_boxed(left, prelude)?,
                    right,
                }
            }
            Expr::Conditional { test, cons, alt } => {
                if contains_suspend_expr(&cons, self.kind) || contains_suspend_expr(&alt, self.kind) {
                    return Err(self.err(span, "yield in a conditional branch is not supported"));
                }
                Expr::Conditional {
                    test: self.extract_boxed(test, prelude)?,
                    cons,
                    alt,
                }
            }
            Expr::Assign { op, target, value } => Expr::Assign {
                op,
                target,
                value: self.extract_boxed(value, prelude)?,
            },
            Expr::LogicalAssign { op, target, value } => {
                if contains_suspend_expr(&value, self.kind) {
                    return Err(self.err(value.span, "yield in the short-circuit arm of a logical assignment is not supported"));
                }
                Expr::LogicalAssign { op, target, value }
            }
            Expr::Call { callee, args, optional } => Expr::Call {
                callee: self.extract_boxed(callee, prelude)?,
                args: args
                    .into_iter()
                    .map(|a| self.extract_expr(a, prelude))
                    .collect::<LowerResult<_>>()?,
                optional,
            },
            Expr::New { callee, args } => Expr::New {
                callee: self.extract_boxed(callee, prelude)?,
                args: args
                    .into_iter()
                    .map(|a| self.extract_expr(a, prelude))
                    .collect::<LowerResult<_>>()?,
            },
            Expr::Member { object, prop, optional } => Expr::Member {
                object: self.extract_boxed(object, prelude)?,
                prop: match prop {
                    MemberProp::Computed(e) => MemberProp::Computed(self.extract_boxed(e, prelude)?),
                    ident => ident,
                },
                optional,
            },
            Expr::OptionalChain(inner) => {
                if contains_suspend_expr(&inner, self.kind) {
                    return Err(self.err(span, "yield inside an optional chain is not supported"));
                }
                Expr::OptionalChain(inner)
            }
            Expr::Sequence(items) => Expr::Sequence(
                items
                    .into_iter()
                    .map(|e| self.extract_expr(e, prelude))
                    .collect::<LowerResult<_>>()?,
            ),
            Expr::Spread(inner) => Expr::Spread(self.extract_boxed(inner, prelude)?),
            e @ (Expr::Yield { .. } | Expr::Await(_)) => {
                // The other suspend kind passes through untouched (an await
                // inside a generator body nested in an async fn, say).
                e
            }
        };
        Ok(ExprLoc::new(span, expr_inner))
    }
}

/// `if (!cond) break;`
fn break_unless(cond: ExprLoc, span: CodeRange) -> Stmt {
    Stmt::If {
        test: ExprLoc::new(
            span,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(cond),
            },
        ),
        cons: Box::new(Stmt::Break { label: None, span }),
        alt: None,
    }
}

fn attach_label(label: Option<Symbol>, stmt: Stmt) -> Stmt {
    match label {
        Some(label) => Stmt::Labeled {
            label,
            body: Box::new(stmt),
        },
        None => stmt,
    }
}

// ==========================
// Suspend search (does not descend into nested functions)

pub(crate) fn contains_suspend_expr(expr: &ExprLoc, kind: SuspendKind) -> bool {
    let mut found = false;
    walk_expr(expr, kind, &mut found);
    found
}

pub(crate) fn contains_suspend_stmt(stmt: &Stmt, kind: SuspendKind) -> bool {
    let mut found = false;
    walk_stmt(stmt, kind, &mut found);
    found
}

pub(crate) fn contains_suspend_stmts(stmts: &[Stmt], kind: SuspendKind) -> bool {
    stmts.iter().any(|s| contains_suspend_stmt(s, kind))
}

fn walk_expr(expr: &ExprLoc, kind: SuspendKind, found: &mut bool) {
    if *found {
        return;
    }
    match &expr.expr {
        Expr::Yield { value, .. } => {
            if kind == SuspendKind::Yield {
                *found = true;
            } else if let Some(v) = value {
                walk_expr(v, kind, found);
            }
        }
        Expr::Await(inner) => {
            if kind == SuspendKind::Await {
                *found = true;
            } else {
                walk_expr(inner, kind, found);
            }
        }
        Expr::Literal(_) | Expr::Ident(_) | Expr::This | Expr::Super | Expr::Regex { .. } | Expr::Function(_) | Expr::Class(_) => {}
        Expr::Array(items) => {
            for item in items.iter().flatten() {
                walk_expr(item, kind, found);
            }
        }
        Expr::Object(props) => {
            for prop in props {
                if let PropValue::Value(v) = &prop.value {
                    walk_expr(v, kind, found);
                }
                if let crate::ast::PropKeyAst::Computed(k) = &prop.key {
                    walk_expr(k, kind, found);
                }
            }
        }
        Expr::Template { exprs, .. } => {
            for e in exprs {
                walk_expr(e, kind, found);
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, kind, found),
        Expr::Update { target, .. } => walk_expr(target, kind, found),
        Expr::Binary { left, right, .. }
        | Expr::Cmp { left, right, .. }
        | Expr::Logical { left, right, .. } => {
            walk_expr(left, kind, found);
            walk_expr(right, kind, found);
        }
        Expr::Conditional { test, cons, alt } => {
            walk_expr(test, kind, found);
            walk_expr(cons, kind, found);
            walk_expr(alt, kind, found);
        }
        Expr::Assign { target, value, .. } | Expr::LogicalAssign { target, value, .. } => {
            walk_expr(target, kind, found);
            walk_expr(value, kind, found);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, kind, found);
            for a in args {
                walk_expr(a, kind, found);
            }
        }
        Expr::New { callee, args } => {
            walk_expr(callee, kind, found);
            for a in args {
                walk_expr(a, kind, found);
            }
        }
        Expr::Member { object, prop, .. } => {
            walk_expr(object, kind, found);
            if let MemberProp::Computed(e) = prop {
                walk_expr(e, kind, found);
            }
        }
        Expr::OptionalChain(inner) | Expr::Spread(inner) => walk_expr(inner, kind, found),
        Expr::Sequence(items) => {
            for e in items {
                walk_expr(e, kind, found);
            }
        }
    }
}

fn walk_stmt(stmt: &Stmt, kind: SuspendKind, found: &mut bool) {
    if *found {
        return;
    }
    match stmt {
        Stmt::Expr(e) | Stmt::Throw { value: e, .. } => walk_expr(e, kind, found),
        Stmt::VarDecl(d) => {
            for decl in &d.decls {
                if let Some(init) = &decl.init {
                    walk_expr(init, kind, found);
                }
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(v) = value {
                walk_expr(v, kind, found);
            }
        }
        Stmt::If { test, cons, alt } => {
            walk_expr(test, kind, found);
            walk_stmt(cons, kind, found);
            if let Some(alt) = alt {
                walk_stmt(alt, kind, found);
            }
        }
        Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
            walk_expr(test, kind, found);
            walk_stmt(body, kind, found);
        }
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                walk_stmt(init, kind, found);
            }
            if let Some(test) = test {
                walk_expr(test, kind, found);
            }
            if let Some(update) = update {
                walk_expr(update, kind, found);
            }
            walk_stmt(body, kind, found);
        }
        Stmt::ForIn { object: e, body, .. } => {
            walk_expr(e, kind, found);
            walk_stmt(body, kind, found);
        }
        Stmt::ForOf {
            iterable,
            body,
            is_await,
            ..
        } => {
            // `for await` is itself a suspension point for the await pass.
            if *is_await && kind == SuspendKind::Await {
                *found = true;
                return;
            }
            walk_expr(iterable, kind, found);
            walk_stmt(body, kind, found);
        }
        Stmt::Switch { disc, cases, .. } => {
            walk_expr(disc, kind, found);
            for case in cases {
                if let Some(test) = &case.test {
                    walk_expr(test, kind, found);
                }
                for s in &case.body {
                    walk_stmt(s, kind, found);
                }
            }
        }
        Stmt::Labeled { body, .. } => walk_stmt(body, kind, found),
        Stmt::Try { block, catch, finally, .. } => {
            for s in block {
                walk_stmt(s, kind, found);
            }
            if let Some(c) = catch {
                for s in &c.body {
                    walk_stmt(s, kind, found);
                }
            }
            if let Some(f) = finally {
                for s in f {
                    walk_stmt(s, kind, found);
                }
            }
        }
        Stmt::Block(stmts, _) => {
            for s in stmts {
                walk_stmt(s, kind, found);
            }
        }
        Stmt::FuncDecl(_) | Stmt::ClassDecl(_) | Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty => {}
    }
}

/// Whether an unlabeled `continue` at this loop's nesting level exists.
/// Nested loops capture their own continues, so the walk stops at them.
fn contains_loop_continue(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Continue { label: None, .. } => true,
        Stmt::If { cons, alt, .. } => {
            contains_loop_continue(cons) || alt.as_ref().is_some_and(|a| contains_loop_continue(a))
        }
        Stmt::Block(stmts, _) => stmts.iter().any(contains_loop_continue),
        Stmt::Try { block, catch, finally, .. } => {
            block.iter().any(contains_loop_continue)
                || catch.as_ref().is_some_and(|c| c.body.iter().any(contains_loop_continue))
                || finally.as_ref().is_some_and(|f| f.iter().any(contains_loop_continue))
        }
        Stmt::Labeled { body, .. } => contains_loop_continue(body),
        _ => false,
    }
}

// ==========================
// Program walk: lower every generator body, innermost first.

/// Lowers all generator function bodies in the program.
pub(crate) fn lower_program(stmts: Vec<Stmt>, interner: &mut Interner) -> Result<Vec<Stmt>, ParseError> {
    crate::ast::map_functions(stmts, &mut |def: FuncDef| {
        let body = if def.kind == FuncKind::Generator {
            Normalizer::new(interner, SuspendKind::Yield).normalize_body(def.body)?
        } else {
            def.body
        };
        Ok(Rc::new(FuncDef { body, ..def }))
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::snapshot_program, parse::parse, prepare::prepare};

    fn lowered(source: &str) -> String {
        let mut interner = Interner::new();
        let tree = parse(source, &mut interner).unwrap();
        let stmts = prepare(&tree).unwrap();
        let stmts = lower_program(stmts, &mut interner).unwrap();
        snapshot_program(&stmts, &interner)
    }

    #[test]
    fn declaration_yield_becomes_temp_assignment() {
        let out = lowered("function* g() { let x = yield 1; }");
        assert_eq!(
            out,
            "(generator g () ((let (__yield_lower_resume0)) \
             (expr (= __yield_lower_resume0 (yield 1))) \
             (let (x __yield_lower_resume0))))"
        );
    }

    #[test]
    fn condition_yield_is_extracted() {
        let out = lowered("function* g() { if (yield a) { f(); } }");
        assert!(out.contains("(expr (= __yield_lower_resume0 (yield a)))"));
        assert!(out.contains("(if __yield_lower_resume0"));
    }

    #[test]
    fn while_condition_yield_moves_into_body() {
        let out = lowered("function* g() { while (yield x) { f(); } }");
        assert!(out.contains("(while true"));
        assert!(out.contains("(if (! __yield_lower_resume0) (break))"));
    }

    #[test]
    fn statement_level_yields_are_untouched() {
        let out = lowered("function* g() { yield 1; let a = yield 2; return yield 3; }");
        assert!(out.contains("(expr (yield 1))"));
        assert!(out.contains("(return (yield 3))"));
    }

    #[test]
    fn delegated_yield_in_compound_position_is_refused() {
        let mut interner = Interner::new();
        let tree = parse("function* g() { f(1 + (yield* other)); }", &mut interner).unwrap();
        let stmts = prepare(&tree).unwrap();
        let err = lower_program(stmts, &mut interner).unwrap_err();
        assert!(err.message.contains("yield*"));
    }

    #[test]
    fn simple_delegated_yield_is_kept() {
        let out = lowered("function* g() { let v = yield* other; yield* other2; }");
        assert!(out.contains("(= __yield_lower_resume0 (yield* other))"));
        assert!(out.contains("(expr (yield* other2))"));
    }

    #[test]
    fn nested_functions_are_not_traversed() {
        let out = lowered("function* g() { let f = function() { return 1; }; yield f; }");
        assert!(out.contains("(function () ((return 1)))"));
    }
}
