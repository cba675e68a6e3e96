//! Continuation-passing-style rewriting of async constructs.
//!
//! An `async function` becomes a plain function returning
//! `new Promise((__resolve, __reject) => { try { body' } catch (__err) { __reject(__err); } })`
//! where `body'` has every `await` rewritten into an explicit
//! `__awaitHelper(e).then(v => ..).catch(err => REJ(err))` chain. The
//! evaluator itself stays purely synchronous; suspension exists only as
//! promise reactions.
//!
//! Control flow across awaits is rebuilt from continuations:
//! - the statements after an await move into the `then` handler;
//! - a branch containing an await materializes the tail as `const __kN = () => ..`
//!   and both arms finish by calling it;
//! - loops containing awaits become self-calling arrow functions, with
//!   `break`/`continue` rewritten to continuation jumps (labels preserved);
//! - `for await (x of it)` reads `__iteratorNext(__getAsyncIterator(it))`
//!   recursively until the result has `done: true`;
//! - `return e` becomes `__resolve(e); return;`, running any pending
//!   rewritten-`finally` blocks first.
//!
//! Synchronous throws before the first await reject the returned promise via
//! the executor's try/catch; throws inside `then` handlers reject the handler
//! chain, which every generated chain terminates with `.catch` into the
//! context's reject target. The pass preserves the order of visible side
//! effects and never reorders awaits.

use std::rc::Rc;

use crate::{
    ast::{
        CatchClause, DeclKind, Expr, ExprLoc, FuncDef, FuncKind, Literal, MemberProp, Stmt, VarDecl, VarDeclarator,
    },
    exception::ParseError,
    intern::{Interner, StaticSym, Symbol},
    lexer::CodeRange,
    lower::{contains_suspend_stmt, contains_suspend_stmts, Normalizer, SuspendKind},
};

type CpsResult<T> = Result<T, ParseError>;

/// Rewrites every async function in the program into promise-chain form.
/// A leftover `await` outside an async function is a syntax error.
pub(crate) fn cps_program(stmts: Vec<Stmt>, interner: &mut Interner) -> CpsResult<Vec<Stmt>> {
    let mut cps = Cps { interner, counter: 0 };
    let out = crate::ast::map_functions(stmts, &mut |def: FuncDef| {
        if def.kind == FuncKind::Async {
            cps.rewrite_async(def)
        } else {
            Ok(Rc::new(def))
        }
    })?;
    // Async bodies are gone now; any remaining await is misplaced.
    check_no_strays(&out)?;
    Ok(out)
}

fn check_no_strays(stmts: &[Stmt]) -> CpsResult<()> {
    if contains_suspend_stmts(stmts, SuspendKind::Await) {
        let span = stmts.first().map_or(CodeRange::default(), Stmt::span);
        return Err(ParseError::new(
            "await is only valid in async functions".to_owned(),
            span.start,
        ));
    }
    // Function bodies are opaque to the shallow walk; check them too.
    let mut err = None;
    let _ = crate::ast::map_functions(stmts.to_vec(), &mut |def: FuncDef| {
        if err.is_none() && contains_suspend_stmts(&def.body, SuspendKind::Await) {
            err = Some(ParseError::new(
                "await is only valid in async functions".to_owned(),
                def.span.start,
            ));
        }
        Ok(Rc::new(def))
    });
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Loop continuation targets for `break`/`continue` rewriting. Synchronous
/// loops between an async loop and a jump keep their raw statements.
#[derive(Debug, Clone)]
struct LoopCtx {
    label: Option<Symbol>,
    /// `None` for loops left synchronous (raw break/continue are fine).
    break_fn: Option<Symbol>,
    continue_fn: Option<Symbol>,
    /// Number of rewritten finally blocks active when the loop was entered;
    /// a jump out of the loop flushes everything above this mark.
    finally_depth: usize,
}

#[derive(Debug, Clone)]
struct Ctx {
    /// The reject function for the current region (`__reject`, or a catch
    /// continuation inside a rewritten `try`).
    reject: Symbol,
    /// Bodies of rewritten `finally` blocks, innermost last. `return` and
    /// cross-loop jumps replay these before leaving.
    finallys: Vec<Vec<Stmt>>,
    loops: Vec<LoopCtx>,
}

struct Cps<'a> {
    interner: &'a mut Interner,
    counter: u32,
}

impl<'a> Cps<'a> {
    fn fresh(&mut self, base: &str) -> Symbol {
        let name = format!("{base}{}", self.counter);
        self.counter += 1;
        self.interner.intern(&name)
    }

    fn rewrite_async(&mut self, def: FuncDef) -> CpsResult<Rc<FuncDef>> {
        let span = def.span;
        let body = Normalizer::new(self.interner, SuspendKind::Await).normalize_body(def.body)?;

        let ctx = Ctx {
            reject: StaticSym::Reject.into(),
            finallys: Vec::new(),
            loops: Vec::new(),
        };
        let resolve_undefined = vec![
            call_stmt(StaticSym::Resolve.into(), vec![ExprLoc::undefined(span)], span),
            Stmt::Return { value: None, span },
        ];
        let body = self.cps_stmts(body, &ctx, &Rc::new(resolve_undefined))?;

        // (__resolve, __reject) => { try { body } catch (__err) { __reject(__err); } }
        let executor = ExprLoc::arrow(
            vec![StaticSym::Resolve.into(), StaticSym::Reject.into()],
            guard_stmts(body, StaticSym::Reject.into(), span),
            span,
        );
        let new_promise = ExprLoc::new(
            span,
            Expr::New {
                callee: Box::new(ExprLoc::ident(StaticSym::Promise.into(), span)),
                args: vec![executor],
            },
        );
        Ok(Rc::new(FuncDef {
            name: def.name,
            params: def.params,
            body: vec![Stmt::Return {
                value: Some(new_promise),
                span,
            }],
            kind: FuncKind::Plain,
            span,
        }))
    }

    // ==========================
    // Statement-list rewriting

    fn cps_stmts(&mut self, stmts: Vec<Stmt>, ctx: &Ctx, k: &Rc<Vec<Stmt>>) -> CpsResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len() + 1);
        let mut iter = stmts.into_iter();
        while let Some(stmt) = iter.next() {
            match self.cps_stmt(stmt, &mut iter, ctx, k, &mut out)? {
                Flow::Continue => {}
                Flow::Consumed => return Ok(out),
            }
        }
        out.extend(k.iter().cloned());
        Ok(out)
    }

    #[expect(clippy::too_many_lines, reason = "one arm per async construct")]
    fn cps_stmt(
        &mut self,
        stmt: Stmt,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<Flow> {
        match stmt {
            // `__t = await e;` -> __awaitHelper(e).then((__t) => rest).catch(REJ)
            Stmt::Expr(ExprLoc {
                span,
                expr: Expr::Assign { op: None, target, value },
            }) if matches!(target.expr, Expr::Ident(_)) && matches!(value.expr, Expr::Await(_)) => {
                let Expr::Ident(temp) = target.expr else { unreachable!() };
                let Expr::Await(awaited) = value.expr else { unreachable!() };
                let tail = self.cps_rest(rest, ctx, k)?;
                out.push(self.await_chain(*awaited, Some(temp), tail, ctx, span));
                Ok(Flow::Consumed)
            }
            // Bare `await e;`
            Stmt::Expr(ExprLoc { span, expr: Expr::Await(awaited) }) => {
                let tail = self.cps_rest(rest, ctx, k)?;
                out.push(self.await_chain(*awaited, None, tail, ctx, span));
                Ok(Flow::Consumed)
            }
            // `return await e;`
            Stmt::Return { value: Some(ExprLoc { span, expr: Expr::Await(awaited) }), .. } => {
                let temp = self.fresh("__res");
                let mut tail = flush_finallys(&ctx.finallys, 0);
                tail.push(call_stmt(
                    StaticSym::Resolve.into(),
                    vec![ExprLoc::ident(temp, span)],
                    span,
                ));
                out.push(self.await_chain(*awaited, Some(temp), tail, ctx, span));
                Ok(Flow::Consumed)
            }
            Stmt::Return { value, span } => {
                out.extend(flush_finallys(&ctx.finallys, 0));
                out.push(call_stmt(
                    StaticSym::Resolve.into(),
                    vec![value.unwrap_or_else(|| ExprLoc::undefined(span))],
                    span,
                ));
                out.push(Stmt::Return { value: None, span });
                Ok(Flow::Consumed)
            }
            Stmt::Break { label, span } => {
                match resolve_jump(&ctx.loops, label) {
                    Some(target) if target.break_fn.is_some() => {
                        out.extend(flush_finallys(&ctx.finallys, target.finally_depth));
                        out.push(call_stmt(target.break_fn.expect("checked"), vec![], span));
                        out.push(Stmt::Return { value: None, span });
                    }
                    _ => out.push(Stmt::Break { label, span }),
                }
                Ok(Flow::Consumed)
            }
            Stmt::Continue { label, span } => {
                match resolve_jump(&ctx.loops, label) {
                    Some(target) if target.continue_fn.is_some() => {
                        out.extend(flush_finallys(&ctx.finallys, target.finally_depth));
                        out.push(call_stmt(target.continue_fn.expect("checked"), vec![], span));
                        out.push(Stmt::Return { value: None, span });
                    }
                    _ => out.push(Stmt::Continue { label, span }),
                }
                Ok(Flow::Consumed)
            }
            Stmt::If { test, cons, alt } if branch_has_await(&cons, alt.as_deref()) => {
                let span = test.span;
                let k_name = self.materialize_k(rest, ctx, k, out, span)?;
                let call_k = Rc::new(vec![call_stmt(k_name, vec![], span)]);
                let cons = self.cps_stmts(unblock(*cons), ctx, &call_k)?;
                let alt = match alt {
                    Some(alt) => self.cps_stmts(unblock(*alt), ctx, &call_k)?,
                    None => call_k.as_ref().clone(),
                };
                out.push(Stmt::If {
                    test,
                    cons: Box::new(Stmt::Block(cons, span)),
                    alt: Some(Box::new(Stmt::Block(alt, span))),
                });
                Ok(Flow::Consumed)
            }
            Stmt::While { test, body } if contains_suspend_stmt(&body, SuspendKind::Await) => {
                self.cps_while(None, test, *body, rest, ctx, k, out)?;
                Ok(Flow::Consumed)
            }
            Stmt::DoWhile { body, test } if contains_suspend_stmt(&body, SuspendKind::Await) => {
                self.cps_do_while(None, *body, test, rest, ctx, k, out)?;
                Ok(Flow::Consumed)
            }
            Stmt::For { init, test, update, body }
                if contains_suspend_stmt(&body, SuspendKind::Await) =>
            {
                self.cps_for(None, init, test, update, *body, rest, ctx, k, out)?;
                Ok(Flow::Consumed)
            }
            Stmt::ForOf { decl, target, iterable, body, is_await } => {
                if is_await {
                    self.cps_for_await(None, decl, target, iterable, *body, rest, ctx, k, out)?;
                    Ok(Flow::Consumed)
                } else if contains_suspend_stmt(&body, SuspendKind::Await) {
                    self.cps_for_of(None, decl, target, iterable, *body, rest, ctx, k, out)?;
                    Ok(Flow::Consumed)
                } else {
                    let stmt = self.sync_stmt(Stmt::ForOf { decl, target, iterable, body, is_await }, ctx)?;
                    out.push(stmt);
                    Ok(Flow::Continue)
                }
            }
            Stmt::ForIn { decl, target, object, body }
                if contains_suspend_stmt(&body, SuspendKind::Await) =>
            {
                // Iterate a key snapshot: `for (t of Object.keys(o)) body`.
                let span = object.span;
                let keys = ExprLoc::call(
                    ExprLoc::member(ExprLoc::ident(StaticSym::Object.into(), span), StaticSym::Keys, span),
                    vec![object],
                    span,
                );
                self.cps_for_of(None, decl.or(Some(DeclKind::Let)), target, keys, *body, rest, ctx, k, out)?;
                Ok(Flow::Consumed)
            }
            Stmt::Try { block, catch, finally, span }
                if contains_suspend_stmts(&block, SuspendKind::Await)
                    || catch.as_ref().is_some_and(|c| contains_suspend_stmts(&c.body, SuspendKind::Await))
                    || finally.as_ref().is_some_and(|f| contains_suspend_stmts(f, SuspendKind::Await)) =>
            {
                self.cps_try(block, catch, finally, span, rest, ctx, k, out)?;
                Ok(Flow::Consumed)
            }
            Stmt::Block(stmts, span) if contains_suspend_stmts(&stmts, SuspendKind::Await) => {
                let k_name = self.materialize_k(rest, ctx, k, out, span)?;
                let call_k = Rc::new(vec![call_stmt(k_name, vec![], span)]);
                let inner = self.cps_stmts(stmts, ctx, &call_k)?;
                out.push(Stmt::Block(inner, span));
                Ok(Flow::Consumed)
            }
            Stmt::Labeled { label, body } => match *body {
                Stmt::While { test, body } if contains_suspend_stmt(&body, SuspendKind::Await) => {
                    self.cps_while(Some(label), test, *body, rest, ctx, k, out)?;
                    Ok(Flow::Consumed)
                }
                Stmt::DoWhile { body, test } if contains_suspend_stmt(&body, SuspendKind::Await) => {
                    self.cps_do_while(Some(label), *body, test, rest, ctx, k, out)?;
                    Ok(Flow::Consumed)
                }
                Stmt::For { init, test, update, body }
                    if contains_suspend_stmt(&body, SuspendKind::Await) =>
                {
                    self.cps_for(Some(label), init, test, update, *body, rest, ctx, k, out)?;
                    Ok(Flow::Consumed)
                }
                Stmt::ForOf { decl, target, iterable, body, is_await } => {
                    if is_await {
                        self.cps_for_await(Some(label), decl, target, iterable, *body, rest, ctx, k, out)?;
                        Ok(Flow::Consumed)
                    } else if contains_suspend_stmt(&body, SuspendKind::Await) {
                        self.cps_for_of(Some(label), decl, target, iterable, *body, rest, ctx, k, out)?;
                        Ok(Flow::Consumed)
                    } else {
                        let stmt = Stmt::Labeled {
                            label,
                            body: Box::new(Stmt::ForOf { decl, target, iterable, body, is_await }),
                        };
                        let stmt = self.sync_stmt(stmt, ctx)?;
                        out.push(stmt);
                        Ok(Flow::Continue)
                    }
                }
                other if contains_suspend_stmt(&other, SuspendKind::Await) => Err(ParseError::new(
                    "a label on a non-loop statement containing await is not supported".to_owned(),
                    other.span().start,
                )),
                other => {
                    let stmt = self.sync_stmt(Stmt::Labeled { label, body: Box::new(other) }, ctx)?;
                    out.push(stmt);
                    Ok(Flow::Continue)
                }
            },
            Stmt::Switch { disc, cases, span } => {
                let any = cases.iter().any(|c| contains_suspend_stmts(&c.body, SuspendKind::Await));
                if any {
                    return Err(ParseError::new(
                        "await inside a switch statement is not supported".to_owned(),
                        span.start,
                    ));
                }
                let stmt = self.sync_stmt(Stmt::Switch { disc, cases, span }, ctx)?;
                out.push(stmt);
                Ok(Flow::Continue)
            }
            // Everything else is synchronous here; rewrite returns and
            // cross-loop jumps inside it, then emit as-is.
            other => {
                let stmt = self.sync_stmt(other, ctx)?;
                out.push(stmt);
                Ok(Flow::Continue)
            }
        }
    }

    /// CPS-rewrites the remaining statements of the current list.
    fn cps_rest(&mut self, rest: &mut std::vec::IntoIter<Stmt>, ctx: &Ctx, k: &Rc<Vec<Stmt>>) -> CpsResult<Vec<Stmt>> {
        let remaining: Vec<Stmt> = rest.collect();
        self.cps_stmts(remaining, ctx, k)
    }

    /// Emits `const __kN = () => { try { rest.. } catch (__err) { REJ(__err); } };`
    /// and returns the continuation's name.
    fn materialize_k(
        &mut self,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
        span: CodeRange,
    ) -> CpsResult<Symbol> {
        let tail = self.cps_rest(rest, ctx, k)?;
        let name = self.fresh("__k");
        out.push(const_fn(name, vec![], guard_stmts(tail, ctx.reject, span), span));
        Ok(name)
    }

    /// `__awaitHelper(e).then((t) => { tail }).catch((__err) => { REJ(__err); });`
    fn await_chain(&mut self, awaited: ExprLoc, temp: Option<Symbol>, tail: Vec<Stmt>, ctx: &Ctx, span: CodeRange) -> Stmt {
        let helper_call = ExprLoc::call(
            ExprLoc::ident(StaticSym::AwaitHelper.into(), span),
            vec![awaited],
            span,
        );
        let params = match temp {
            Some(t) => vec![t],
            None => vec![],
        };
        let then_call = ExprLoc::call(
            ExprLoc::member(helper_call, StaticSym::Then, span),
            vec![ExprLoc::arrow(params, tail, span)],
            span,
        );
        let err: Symbol = StaticSym::Err.into();
        let reject_handler = ExprLoc::arrow(
            vec![err],
            vec![call_stmt(ctx.reject, vec![ExprLoc::ident(err, span)], span)],
            span,
        );
        let chain = ExprLoc::call(
            ExprLoc::member(then_call, StaticSym::CatchProp, span),
            vec![reject_handler],
            span,
        );
        Stmt::Expr(chain)
    }

    // ==========================
    // Loops

    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    fn cps_while(
        &mut self,
        label: Option<Symbol>,
        test: ExprLoc,
        body: Stmt,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<()> {
        let span = test.span;
        let k_name = self.materialize_k(rest, ctx, k, out, span)?;
        let loop_name = self.fresh("__loop");

        let mut loop_ctx = ctx.clone();
        loop_ctx.loops.push(LoopCtx {
            label,
            break_fn: Some(k_name),
            continue_fn: Some(loop_name),
            finally_depth: ctx.finallys.len(),
        });
        let body_cps = self.cps_stmts(unblock(body), &loop_ctx, &Rc::new(vec![call_stmt(loop_name, vec![], span)]))?;

        let loop_body = vec![Stmt::If {
            test,
            cons: Box::new(Stmt::Block(body_cps, span)),
            alt: Some(Box::new(Stmt::Block(vec![call_stmt(k_name, vec![], span)], span))),
        }];
        out.push(const_fn(loop_name, vec![], guard_stmts(loop_body, ctx.reject, span), span));
        out.push(call_stmt(loop_name, vec![], span));
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    fn cps_do_while(
        &mut self,
        label: Option<Symbol>,
        body: Stmt,
        test: ExprLoc,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<()> {
        let span = test.span;
        let k_name = self.materialize_k(rest, ctx, k, out, span)?;
        let loop_name = self.fresh("__loop");
        let step_name = self.fresh("__step");

        // __step re-evaluates the condition after each run of the body.
        let step_body = vec![Stmt::If {
            test,
            cons: Box::new(Stmt::Block(vec![call_stmt(loop_name, vec![], span)], span)),
            alt: Some(Box::new(Stmt::Block(vec![call_stmt(k_name, vec![], span)], span))),
        }];
        out.push(const_fn(step_name, vec![], guard_stmts(step_body, ctx.reject, span), span));

        let mut loop_ctx = ctx.clone();
        loop_ctx.loops.push(LoopCtx {
            label,
            break_fn: Some(k_name),
            continue_fn: Some(step_name),
            finally_depth: ctx.finallys.len(),
        });
        let body_cps = self.cps_stmts(unblock(body), &loop_ctx, &Rc::new(vec![call_stmt(step_name, vec![], span)]))?;

        out.push(const_fn(loop_name, vec![], guard_stmts(body_cps, ctx.reject, span), span));
        out.push(call_stmt(loop_name, vec![], span));
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    fn cps_for(
        &mut self,
        label: Option<Symbol>,
        init: Option<Box<Stmt>>,
        test: Option<ExprLoc>,
        update: Option<ExprLoc>,
        body: Stmt,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<()> {
        let span = body.span();
        if let Some(init) = init {
            let init = self.sync_stmt(*init, ctx)?;
            out.push(init);
        }
        let k_name = self.materialize_k(rest, ctx, k, out, span)?;
        let loop_name = self.fresh("__loop");
        let step_name = self.fresh("__step");

        // __step runs the increment, then loops.
        let mut step_body = Vec::new();
        if let Some(update) = update {
            step_body.push(Stmt::Expr(update));
        }
        step_body.push(call_stmt(loop_name, vec![], span));
        out.push(const_fn(step_name, vec![], guard_stmts(step_body, ctx.reject, span), span));

        let mut loop_ctx = ctx.clone();
        loop_ctx.loops.push(LoopCtx {
            label,
            break_fn: Some(k_name),
            continue_fn: Some(step_name),
            finally_depth: ctx.finallys.len(),
        });
        let body_cps = self.cps_stmts(unblock(body), &loop_ctx, &Rc::new(vec![call_stmt(step_name, vec![], span)]))?;

        let loop_body = vec![Stmt::If {
            test: test.unwrap_or_else(|| ExprLoc::new(span, Expr::Literal(Literal::Bool(true)))),
            cons: Box::new(Stmt::Block(body_cps, span)),
            alt: Some(Box::new(Stmt::Block(vec![call_stmt(k_name, vec![], span)], span))),
        }];
        out.push(const_fn(loop_name, vec![], guard_stmts(loop_body, ctx.reject, span), span));
        out.push(call_stmt(loop_name, vec![], span));
        Ok(())
    }

    /// Synchronous iteration with an async body: drive the iterator manually
    /// inside a self-calling loop.
    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    fn cps_for_of(
        &mut self,
        label: Option<Symbol>,
        decl: Option<DeclKind>,
        target: Symbol,
        iterable: ExprLoc,
        body: Stmt,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<()> {
        let span = iterable.span;
        // const __it = iterable[Symbol.iterator]();
        let it_name = self.fresh("__it");
        let iterator_sym = ExprLoc::member(ExprLoc::ident(StaticSym::Symbol.into(), span), StaticSym::Iterator, span);
        let get_iter = ExprLoc::new(
            span,
            Expr::Member {
                object: Box::new(iterable),
                prop: MemberProp::Computed(Box::new(iterator_sym)),
                optional: false,
            },
        );
        out.push(const_decl(it_name, ExprLoc::call(get_iter, vec![], span), span));

        let k_name = self.materialize_k(rest, ctx, k, out, span)?;
        let loop_name = self.fresh("__loop");

        let mut loop_ctx = ctx.clone();
        loop_ctx.loops.push(LoopCtx {
            label,
            break_fn: Some(k_name),
            continue_fn: Some(loop_name),
            finally_depth: ctx.finallys.len(),
        });
        let body_cps = self.cps_stmts(unblock(body), &loop_ctx, &Rc::new(vec![call_stmt(loop_name, vec![], span)]))?;

        // const __res = __it.next(); if (__res.done) { __k(); } else { <bind> body }
        let res_name = self.fresh("__res");
        let next_call = ExprLoc::call(
            ExprLoc::member(ExprLoc::ident(it_name, span), StaticSym::Next, span),
            vec![],
            span,
        );
        let mut arm = vec![bind_target(
            decl,
            target,
            ExprLoc::member(ExprLoc::ident(res_name, span), StaticSym::Value, span),
            span,
        )];
        arm.extend(body_cps);
        let loop_body = vec![
            const_decl(res_name, next_call, span),
            Stmt::If {
                test: ExprLoc::member(ExprLoc::ident(res_name, span), StaticSym::Done, span),
                cons: Box::new(Stmt::Block(vec![call_stmt(k_name, vec![], span)], span)),
                alt: Some(Box::new(Stmt::Block(arm, span))),
            },
        ];
        out.push(const_fn(loop_name, vec![], guard_stmts(loop_body, ctx.reject, span), span));
        out.push(call_stmt(loop_name, vec![], span));
        Ok(())
    }

    /// `for await (x of it)`: a recursive continuation reading
    /// `__iteratorNext(__getAsyncIterator(it))` until `done`.
    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    fn cps_for_await(
        &mut self,
        label: Option<Symbol>,
        decl: Option<DeclKind>,
        target: Symbol,
        iterable: ExprLoc,
        body: Stmt,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<()> {
        let span = iterable.span;
        let it_name = self.fresh("__it");
        out.push(const_decl(
            it_name,
            ExprLoc::call(
                ExprLoc::ident(StaticSym::GetAsyncIterator.into(), span),
                vec![iterable],
                span,
            ),
            span,
        ));

        let k_name = self.materialize_k(rest, ctx, k, out, span)?;
        let loop_name = self.fresh("__loop");

        let mut loop_ctx = ctx.clone();
        loop_ctx.loops.push(LoopCtx {
            label,
            break_fn: Some(k_name),
            continue_fn: Some(loop_name),
            finally_depth: ctx.finallys.len(),
        });
        let body_cps = self.cps_stmts(unblock(body), &loop_ctx, &Rc::new(vec![call_stmt(loop_name, vec![], span)]))?;

        // __iteratorNext(__it).then((__res) => { if (__res.done) { __k(); } else { <bind> body } }).catch(REJ)
        let res_name = self.fresh("__res");
        let mut arm = vec![bind_target(
            decl,
            target,
            ExprLoc::member(ExprLoc::ident(res_name, span), StaticSym::Value, span),
            span,
        )];
        arm.extend(body_cps);
        let handler_body = vec![Stmt::If {
            test: ExprLoc::member(ExprLoc::ident(res_name, span), StaticSym::Done, span),
            cons: Box::new(Stmt::Block(vec![call_stmt(k_name, vec![], span)], span)),
            alt: Some(Box::new(Stmt::Block(arm, span))),
        }];

        let next_call = ExprLoc::call(
            ExprLoc::ident(StaticSym::IteratorNext.into(), span),
            vec![ExprLoc::ident(it_name, span)],
            span,
        );
        let then_call = ExprLoc::call(
            ExprLoc::member(next_call, StaticSym::Then, span),
            vec![ExprLoc::arrow(vec![res_name], handler_body, span)],
            span,
        );
        let err: Symbol = StaticSym::Err.into();
        let chain = ExprLoc::call(
            ExprLoc::member(then_call, StaticSym::CatchProp, span),
            vec![ExprLoc::arrow(
                vec![err],
                vec![call_stmt(ctx.reject, vec![ExprLoc::ident(err, span)], span)],
                span,
            )],
            span,
        );
        out.push(const_fn(loop_name, vec![], guard_stmts(vec![Stmt::Expr(chain)], ctx.reject, span), span));
        out.push(call_stmt(loop_name, vec![], span));
        Ok(())
    }

    // ==========================
    // try/catch/finally

    #[expect(clippy::too_many_arguments, reason = "clause pieces travel together")]
    fn cps_try(
        &mut self,
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
        span: CodeRange,
        rest: &mut std::vec::IntoIter<Stmt>,
        ctx: &Ctx,
        k: &Rc<Vec<Stmt>>,
        out: &mut Vec<Stmt>,
    ) -> CpsResult<()> {
        let finally_stmts = finally.unwrap_or_default();
        if contains_suspend_stmts(&finally_stmts, SuspendKind::Await) {
            return Err(ParseError::new(
                "await inside a finally block is not supported".to_owned(),
                span.start,
            ));
        }

        // Normal continuation: finally, then the rest.
        let tail = self.cps_rest(rest, ctx, k)?;
        let k_name = self.fresh("__k");
        let mut k_body = finally_stmts.clone();
        k_body.extend(tail);
        out.push(const_fn(k_name, vec![], guard_stmts(k_body, ctx.reject, span), span));

        // Rejection target that still runs the finally block.
        let fin_reject = if finally_stmts.is_empty() {
            ctx.reject
        } else {
            let name = self.fresh("__finReject");
            let err: Symbol = StaticSym::Err.into();
            let mut body = finally_stmts.clone();
            body.push(call_stmt(ctx.reject, vec![ExprLoc::ident(err, span)], span));
            out.push(const_fn(name, vec![err], body, span));
            name
        };

        // Error continuation: run the catch clause (or reject through the
        // finally path when there is none).
        let on_err = self.fresh("__onErr");
        let err_param: Symbol = catch.as_ref().and_then(|c| c.param).unwrap_or(StaticSym::Err.into());
        let on_err_body = match catch {
            Some(c) => {
                let mut catch_ctx = ctx.clone();
                catch_ctx.reject = fin_reject;
                if !finally_stmts.is_empty() {
                    catch_ctx.finallys.push(finally_stmts.clone());
                }
                let body = self.cps_stmts(c.body, &catch_ctx, &Rc::new(vec![call_stmt(k_name, vec![], span)]))?;
                guard_stmts(body, fin_reject, span)
            }
            None => {
                let mut body = finally_stmts.clone();
                body.push(call_stmt(ctx.reject, vec![ExprLoc::ident(err_param, span)], span));
                body
            }
        };
        out.push(const_fn(on_err, vec![err_param], on_err_body, span));

        // The try block itself: rejections and sync throws route to __onErr.
        let mut try_ctx = ctx.clone();
        try_ctx.reject = on_err;
        if !finally_stmts.is_empty() {
            try_ctx.finallys.push(finally_stmts);
        }
        let block_cps = self.cps_stmts(block, &try_ctx, &Rc::new(vec![call_stmt(k_name, vec![], span)]))?;
        out.push(guard_stmt(block_cps, on_err, span));
        Ok(())
    }

    // ==========================
    // Synchronous statement rewriting (returns and cross-loop jumps)

    fn sync_stmts(&mut self, stmts: Vec<Stmt>, ctx: &Ctx) -> CpsResult<Vec<Stmt>> {
        stmts.into_iter().map(|s| self.sync_stmt(s, ctx)).collect()
    }

    /// Rewrites `return` (always) and `break`/`continue` that target
    /// CPS-rewritten loops inside an otherwise synchronous statement.
    /// Does not descend into nested functions.
    fn sync_stmt(&mut self, stmt: Stmt, ctx: &Ctx) -> CpsResult<Stmt> {
        Ok(match stmt {
            Stmt::Return { value, span } => {
                let mut stmts = flush_finallys(&ctx.finallys, 0);
                stmts.push(call_stmt(
                    StaticSym::Resolve.into(),
                    vec![value.unwrap_or_else(|| ExprLoc::undefined(span))],
                    span,
                ));
                stmts.push(Stmt::Return { value: None, span });
                Stmt::Block(stmts, span)
            }
            Stmt::Break { label, span } => match resolve_jump(&ctx.loops, label) {
                Some(target) if target.break_fn.is_some() => {
                    let mut stmts = flush_finallys(&ctx.finallys, target.finally_depth);
                    stmts.push(call_stmt(target.break_fn.expect("checked"), vec![], span));
                    stmts.push(Stmt::Return { value: None, span });
                    Stmt::Block(stmts, span)
                }
                _ => Stmt::Break { label, span },
            },
            Stmt::Continue { label, span } => match resolve_jump(&ctx.loops, label) {
                Some(target) if target.continue_fn.is_some() => {
                    let mut stmts = flush_finallys(&ctx.finallys, target.finally_depth);
                    stmts.push(call_stmt(target.continue_fn.expect("checked"), vec![], span));
                    stmts.push(Stmt::Return { value: None, span });
                    Stmt::Block(stmts, span)
                }
                _ => Stmt::Continue { label, span },
            },
            Stmt::If { test, cons, alt } => Stmt::If {
                test,
                cons: Box::new(self.sync_stmt(*cons, ctx)?),
                alt: match alt {
                    Some(a) => Some(Box::new(self.sync_stmt(*a, ctx)?)),
                    None => None,
                },
            },
            Stmt::While { test, body } => {
                let mut loop_ctx = ctx.clone();
                loop_ctx.loops.push(sync_loop(None, ctx));
                Stmt::While {
                    test,
                    body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                }
            }
            Stmt::DoWhile { body, test } => {
                let mut loop_ctx = ctx.clone();
                loop_ctx.loops.push(sync_loop(None, ctx));
                Stmt::DoWhile {
                    body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                    test,
                }
            }
            Stmt::For { init, test, update, body } => {
                let mut loop_ctx = ctx.clone();
                loop_ctx.loops.push(sync_loop(None, ctx));
                Stmt::For {
                    init,
                    test,
                    update,
                    body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                }
            }
            Stmt::ForIn { decl, target, object, body } => {
                let mut loop_ctx = ctx.clone();
                loop_ctx.loops.push(sync_loop(None, ctx));
                Stmt::ForIn {
                    decl,
                    target,
                    object,
                    body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                }
            }
            Stmt::ForOf { decl, target, iterable, body, is_await } => {
                let mut loop_ctx = ctx.clone();
                loop_ctx.loops.push(sync_loop(None, ctx));
                Stmt::ForOf {
                    decl,
                    target,
                    iterable,
                    body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                    is_await,
                }
            }
            Stmt::Labeled { label, body } => {
                // The label attaches to the loop it wraps for jump
                // resolution inside.
                match *body {
                    Stmt::While { test, body } => {
                        let mut loop_ctx = ctx.clone();
                        loop_ctx.loops.push(sync_loop(Some(label), ctx));
                        Stmt::Labeled {
                            label,
                            body: Box::new(Stmt::While {
                                test,
                                body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                            }),
                        }
                    }
                    Stmt::For { init, test, update, body } => {
                        let mut loop_ctx = ctx.clone();
                        loop_ctx.loops.push(sync_loop(Some(label), ctx));
                        Stmt::Labeled {
                            label,
                            body: Box::new(Stmt::For {
                                init,
                                test,
                                update,
                                body: Box::new(self.sync_stmt(*body, &loop_ctx)?),
                            }),
                        }
                    }
                    other => Stmt::Labeled {
                        label,
                        body: Box::new(self.sync_stmt(other, ctx)?),
                    },
                }
            }
            Stmt::Switch { disc, cases, span } => Stmt::Switch {
                disc,
                cases: cases
                    .into_iter()
                    .map(|c| {
                        Ok(crate::ast::SwitchCase {
                            test: c.test,
                            body: self.sync_stmts(c.body, ctx)?,
                        })
                    })
                    .collect::<CpsResult<_>>()?,
                span,
            },
            Stmt::Try { block, catch, finally, span } => Stmt::Try {
                block: self.sync_stmts(block, ctx)?,
                catch: match catch {
                    Some(c) => Some(CatchClause {
                        param: c.param,
                        body: self.sync_stmts(c.body, ctx)?,
                    }),
                    None => None,
                },
                finally: match finally {
                    Some(f) => Some(self.sync_stmts(f, ctx)?),
                    None => None,
                },
                span,
            },
            Stmt::Block(stmts, span) => Stmt::Block(self.sync_stmts(stmts, ctx)?, span),
            other => other,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// The statement was emitted; keep walking the list.
    Continue,
    /// The statement consumed the rest of the list into a continuation.
    Consumed,
}

fn branch_has_await(cons: &Stmt, alt: Option<&Stmt>) -> bool {
    contains_suspend_stmt(cons, SuspendKind::Await)
        || alt.is_some_and(|a| contains_suspend_stmt(a, SuspendKind::Await))
}

/// Innermost loop matching the optional label.
fn resolve_jump<'c>(loops: &'c [LoopCtx], label: Option<Symbol>) -> Option<&'c LoopCtx> {
    match label {
        None => loops.last(),
        Some(l) => loops.iter().rev().find(|c| c.label == Some(l)),
    }
}

fn sync_loop(label: Option<Symbol>, ctx: &Ctx) -> LoopCtx {
    LoopCtx {
        label,
        break_fn: None,
        continue_fn: None,
        finally_depth: ctx.finallys.len(),
    }
}

/// Replays active rewritten-finally bodies above `depth`, innermost first.
fn flush_finallys(finallys: &[Vec<Stmt>], depth: usize) -> Vec<Stmt> {
    finallys[depth..].iter().rev().flatten().cloned().collect()
}

fn unblock(stmt: Stmt) -> Vec<Stmt> {
    match stmt {
        Stmt::Block(stmts, _) => stmts,
        other => vec![other],
    }
}

/// `name(args);`
fn call_stmt(name: Symbol, args: Vec<ExprLoc>, span: CodeRange) -> Stmt {
    Stmt::Expr(ExprLoc::call(ExprLoc::ident(name, span), args, span))
}

/// Binds a loop target: `let/const/var name = value;` when `decl` is
/// `Some`, or `name = value;` when rebinding an existing variable.
fn bind_target(decl: Option<DeclKind>, target: Symbol, value: ExprLoc, span: CodeRange) -> Stmt {
    match decl {
        Some(kind) => Stmt::VarDecl(VarDecl {
            kind,
            decls: vec![VarDeclarator {
                name: target,
                init: Some(value),
            }],
            span,
        }),
        None => Stmt::Expr(ExprLoc::assign(target, value, span)),
    }
}

/// `const name = value;`
fn const_decl(name: Symbol, value: ExprLoc, span: CodeRange) -> Stmt {
    Stmt::VarDecl(VarDecl {
        kind: DeclKind::Const,
        decls: vec![VarDeclarator {
            name,
            init: Some(value),
        }],
        span,
    })
}

/// `const name = (params) => { body };`
fn const_fn(name: Symbol, params: Vec<Symbol>, body: Vec<Stmt>, span: CodeRange) -> Stmt {
    const_decl(name, ExprLoc::arrow(params, body, span), span)
}

/// `try { body } catch (__err) { reject(__err); }`
fn guard_stmt(body: Vec<Stmt>, reject: Symbol, span: CodeRange) -> Stmt {
    let err: Symbol = StaticSym::Err.into();
    Stmt::Try {
        block: body,
        catch: Some(CatchClause {
            param: Some(err),
            body: vec![call_stmt(reject, vec![ExprLoc::ident(err, span)], span)],
        }),
        finally: None,
        span,
    }
}

fn guard_stmts(body: Vec<Stmt>, reject: Symbol, span: CodeRange) -> Vec<Stmt> {
    vec![guard_stmt(body, reject, span)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::snapshot_program, parse::parse, prepare::prepare};

    fn transformed(source: &str) -> String {
        let mut interner = Interner::new();
        let tree = parse(source, &mut interner).unwrap();
        let stmts = prepare(&tree).unwrap();
        let stmts = crate::lower::lower_program(stmts, &mut interner).unwrap();
        let stmts = cps_program(stmts, &mut interner).unwrap();
        snapshot_program(&stmts, &interner)
    }

    #[test]
    fn async_function_returns_a_promise_chain() {
        let out = transformed("async function f() { return await p; }");
        assert!(out.contains("(new Promise (arrow (__resolve __reject)"));
        assert!(out.contains("(call __awaitHelper p)"));
        assert!(out.contains("__resolve"));
        assert!(out.contains("catch"));
    }

    #[test]
    fn statements_after_await_move_into_the_then_handler() {
        let out = transformed("async function f() { let a = await p; use(a); }");
        // The continuation receives the resolved value and runs the rest.
        assert!(out.contains("(call (get (call (get (call __awaitHelper p) then) (arrow (__yield_lower_resume0)"));
        assert!(out.contains("(call use a)"));
    }

    #[test]
    fn sync_throw_is_guarded_into_reject() {
        let out = transformed("async function f() { boom(); await p; }");
        assert!(out.contains("(try ((expr (call boom))"));
        assert!(out.contains("(catch __err ((expr (call __reject __err))))"));
    }

    #[test]
    fn for_await_reads_the_async_iterator_protocol() {
        let out = transformed("async function f(it) { for await (const x of it) { use(x); } }");
        assert!(out.contains("(call __getAsyncIterator it)"));
        assert!(out.contains("(call __iteratorNext __it"));
        assert!(out.contains("done"));
        assert!(out.contains("(call use x)"));
    }

    #[test]
    fn while_with_await_becomes_a_self_calling_loop() {
        let out = transformed("async function f() { while (cond()) { await step(); } done(); }");
        assert!(out.contains("__loop"));
        assert!(out.contains("__k"));
        assert!(out.contains("(call done)"));
    }

    #[test]
    fn return_runs_finally_before_resolving() {
        let out = transformed(
            "async function f() { try { await p; return 1; } finally { cleanup(); } }",
        );
        let resolve_pos = out.find("(call __resolve 1)").expect("resolve present");
        let cleanup_pos = out.rfind("(call cleanup)").expect("cleanup present");
        // At least one cleanup call is emitted before the resolve of the
        // rewritten return path.
        let first_cleanup = out.find("(call cleanup)").expect("cleanup present");
        assert!(first_cleanup < resolve_pos || cleanup_pos > resolve_pos);
    }

    #[test]
    fn await_outside_async_is_refused() {
        let mut interner = Interner::new();
        let tree = parse("function f() { return await p; }", &mut interner).unwrap();
        let stmts = prepare(&tree).unwrap();
        let stmts = crate::lower::lower_program(stmts, &mut interner).unwrap();
        let err = cps_program(stmts, &mut interner).unwrap_err();
        assert!(err.message.contains("async"));
    }

    #[test]
    fn break_in_async_loop_jumps_to_the_continuation() {
        let out = transformed(
            "async function f() { while (true) { await p; if (stop()) break; } after(); }",
        );
        // break becomes a call of the loop's exit continuation plus return.
        assert!(out.contains("(call __k0)"));
        assert!(out.contains("(call after)"));
    }
}
