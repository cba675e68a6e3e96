//! Generator objects and their suspend/resume machinery.
//!
//! A generator function call captures its bound scope and body; the body then
//! runs on an explicit frame stack owned by the generator object, not on the
//! Rust call stack. The yield lowering guarantees every `yield` sits at a
//! statement boundary, so each frame is a statement cursor: suspension stores
//! the cursor stack and a note of where the resumed value goes (a lowering
//! temp, a discarded expression statement, or a `return yield` result).
//!
//! Statements that contain no yields execute atomically through the ordinary
//! evaluator. Structured statements containing yields push dedicated frames;
//! `break`/`continue`/`return` and exceptions unwind the frame stack with the
//! same completion discipline the evaluator uses, including `finally` blocks.

use std::rc::Rc;

use crate::{
    ast::{CatchClause, DeclKind, Expr, ExprLoc, FuncDef, Stmt},
    eval::{Completion, Interp},
    exception::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::Symbol,
    lower::{contains_suspend_stmt, SuspendKind},
    scope::{FrameKind, ScopeId},
    value::{JsStr, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenStatus {
    /// Created or parked at a yield.
    Suspended,
    /// Currently executing; re-entrant resumption is an error.
    Running,
    Done,
}

/// Where the value passed to `next()` lands on resume.
#[derive(Debug, Clone)]
pub(crate) enum ResumeSink {
    /// `__t = yield e;` - assign the sent value to the temp.
    Assign(Symbol, ScopeId),
    /// `yield e;` - the sent value is discarded.
    Discard,
    /// `return yield e;` - the sent value becomes the return value.
    ReturnSent,
    /// Parked inside a `yield*` delegation; the top frame is the delegate.
    Delegating,
}

/// What the driver passed in to resume the generator.
#[derive(Debug, Clone)]
pub(crate) enum GenResume {
    Next(Value),
    Throw(Value),
    Return(Value),
}

/// One step's outcome.
#[derive(Debug, Clone)]
pub(crate) enum GenStep {
    Yield(Value),
    Done(Value),
}

#[derive(Debug, Clone)]
pub(crate) enum TryState {
    Main,
    Handler,
    /// Running the finally block; the pending outcome resumes after it.
    Finalizer(Option<Unwind>),
}

/// A non-normal outcome travelling down the frame stack.
#[derive(Debug, Clone)]
pub(crate) enum Unwind {
    Exception(Value),
    Complete(Completion),
}

#[derive(Debug, Clone)]
pub(crate) enum GenFrame {
    /// A statement cursor over a list. `switch_break` absorbs unlabeled
    /// breaks (the flattened body of a switch); `label` absorbs labeled
    /// breaks of a labeled block.
    Seq {
        stmts: Vec<Stmt>,
        idx: usize,
        scope: ScopeId,
        switch_break: bool,
        label: Option<Symbol>,
    },
    While {
        test: ExprLoc,
        body: Stmt,
        label: Option<Symbol>,
        scope: ScopeId,
    },
    DoWhile {
        test: ExprLoc,
        body: Stmt,
        label: Option<Symbol>,
        scope: ScopeId,
        first: bool,
    },
    For {
        test: Option<ExprLoc>,
        update: Option<ExprLoc>,
        body: Stmt,
        label: Option<Symbol>,
        scope: ScopeId,
        ran_once: bool,
    },
    ForOf {
        iter: Value,
        decl: Option<DeclKind>,
        target: Symbol,
        body: Stmt,
        label: Option<Symbol>,
        scope: ScopeId,
    },
    ForIn {
        keys: Vec<JsStr>,
        idx: usize,
        decl: Option<DeclKind>,
        target: Symbol,
        body: Stmt,
        label: Option<Symbol>,
        scope: ScopeId,
    },
    Try {
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
        scope: ScopeId,
        state: TryState,
    },
    /// An in-progress `yield*`. `send` carries the resumed driver input to
    /// feed into the delegated iterator.
    Delegate {
        iter: Value,
        sink: Box<ResumeSink>,
        scope: ScopeId,
        send: Option<GenResume>,
    },
}

/// The suspended state of one generator object.
#[derive(Debug, Clone)]
pub(crate) struct GenState {
    pub def: Rc<FuncDef>,
    /// The generator's function scope (params bound, vars hoisted).
    pub scope: ScopeId,
    pub frames: Vec<GenFrame>,
    pub status: GenStatus,
    pub started: bool,
    pub sink: Option<ResumeSink>,
}

impl GenState {
    pub fn new(def: Rc<FuncDef>, scope: ScopeId) -> Self {
        Self {
            def,
            scope,
            frames: Vec::new(),
            status: GenStatus::Suspended,
            started: false,
            sink: None,
        }
    }

    fn placeholder(def: Rc<FuncDef>, scope: ScopeId) -> Self {
        Self {
            def,
            scope,
            frames: Vec::new(),
            status: GenStatus::Running,
            started: true,
            sink: None,
        }
    }
}

/// Advances the generator with a driver input, returning either the next
/// yielded value or the completion value.
pub(crate) fn step(interp: &mut Interp, gen_id: HeapId, resume: GenResume) -> RunResult<GenStep> {
    // Move the state out so the evaluator can run against the heap freely.
    let mut state = {
        let HeapData::Generator(state) = interp.heap.get_mut(gen_id) else {
            return Err(RunError::type_error("not a generator"));
        };
        match state.status {
            GenStatus::Running => {
                return Err(RunError::type_error("Generator is already running"));
            }
            GenStatus::Done => {
                return Ok(match resume {
                    GenResume::Next(_) => GenStep::Done(Value::Undefined),
                    GenResume::Return(v) => GenStep::Done(v),
                    GenResume::Throw(e) => return Err(RunError::throw(e)),
                });
            }
            GenStatus::Suspended => {}
        }
        let placeholder = GenState::placeholder(state.def.clone(), state.scope);
        std::mem::replace(state, placeholder)
    };
    state.status = GenStatus::Running;

    let result = drive(interp, &mut state, resume);

    match &result {
        Ok(GenStep::Yield(_)) => state.status = GenStatus::Suspended,
        Ok(GenStep::Done(_)) | Err(_) => {
            state.status = GenStatus::Done;
            state.frames.clear();
        }
    }
    *interp.heap.get_mut(gen_id) = HeapData::Generator(state);
    result
}

fn drive(interp: &mut Interp, state: &mut GenState, resume: GenResume) -> RunResult<GenStep> {
    let mut pending_unwind: Option<Unwind> = None;

    if !state.started {
        state.started = true;
        match resume {
            GenResume::Next(_) => {
                // The first next()'s argument is discarded.
                let body = state.def.body.clone();
                interp.hoist(&body, state.scope)?;
                state.frames.push(GenFrame::Seq {
                    stmts: body,
                    idx: 0,
                    scope: state.scope,
                    switch_break: false,
                    label: None,
                });
            }
            GenResume::Throw(e) => return Err(RunError::throw(e)),
            GenResume::Return(v) => return Ok(GenStep::Done(v)),
        }
    } else {
        let sink = state.sink.take().expect("suspended generator without a sink");
        match sink {
            ResumeSink::Delegating => {
                let Some(GenFrame::Delegate { send, .. }) = state.frames.last_mut() else {
                    panic!("delegating sink without a delegate frame");
                };
                *send = Some(resume);
            }
            ResumeSink::Assign(temp, scope) => match resume {
                GenResume::Next(v) => interp.scopes.set(scope, temp, v, interp.interner)?,
                GenResume::Throw(e) => pending_unwind = Some(Unwind::Exception(e)),
                GenResume::Return(v) => pending_unwind = Some(Unwind::Complete(Completion::Return(v))),
            },
            ResumeSink::Discard => match resume {
                GenResume::Next(_) => {}
                GenResume::Throw(e) => pending_unwind = Some(Unwind::Exception(e)),
                GenResume::Return(v) => pending_unwind = Some(Unwind::Complete(Completion::Return(v))),
            },
            ResumeSink::ReturnSent => match resume {
                GenResume::Next(v) | GenResume::Return(v) => {
                    pending_unwind = Some(Unwind::Complete(Completion::Return(v)));
                }
                GenResume::Throw(e) => pending_unwind = Some(Unwind::Exception(e)),
            },
        }
    }

    run_frames(interp, state, pending_unwind)
}

/// The frame-stack trampoline.
fn run_frames(interp: &mut Interp, state: &mut GenState, mut unwinding: Option<Unwind>) -> RunResult<GenStep> {
    loop {
        if let Some(u) = unwinding.take() {
            match apply_unwind(interp, state, u)? {
                UnwindOutcome::Resumed => {}
                UnwindOutcome::Finished(step) => return Ok(step),
                UnwindOutcome::Propagate(u) => unwinding = Some(u),
            }
            if unwinding.is_some() {
                continue;
            }
        }

        let Some(frame) = state.frames.last_mut() else {
            return Ok(GenStep::Done(Value::Undefined));
        };

        match frame {
            GenFrame::Seq { stmts, idx, scope, .. } => {
                if *idx >= stmts.len() {
                    state.frames.pop();
                    continue;
                }
                let stmt = stmts[*idx].clone();
                let scope = *scope;
                *idx += 1;
                match exec_gen_stmt(interp, state, stmt, scope)? {
                    StepOutcome::Normal => {}
                    StepOutcome::Suspend(v) => return Ok(GenStep::Yield(v)),
                    StepOutcome::Unwind(u) => unwinding = Some(u),
                }
            }
            GenFrame::While { test, body, scope, .. } => {
                let test = test.clone();
                let body = body.clone();
                let scope = *scope;
                if interp.eval_expr(&test, scope)?.truthy() {
                    push_body(interp, state, body, scope)?;
                } else {
                    state.frames.pop();
                }
            }
            GenFrame::DoWhile {
                test, body, scope, first, ..
            } => {
                let run_body = if *first {
                    *first = false;
                    true
                } else {
                    let test = test.clone();
                    let scope = *scope;
                    interp.eval_expr(&test, scope)?.truthy()
                };
                let body = body.clone();
                let scope = *scope;
                if run_body {
                    push_body(interp, state, body, scope)?;
                } else {
                    state.frames.pop();
                }
            }
            GenFrame::For {
                test,
                update,
                body,
                scope,
                ran_once,
                ..
            } => {
                let scope = *scope;
                let update = update.clone();
                let test = test.clone();
                let body = body.clone();
                if *ran_once {
                    if let Some(update) = update {
                        interp.eval_expr(&update, scope)?;
                    }
                } else {
                    *ran_once = true;
                }
                let proceed = match test {
                    Some(test) => interp.eval_expr(&test, scope)?.truthy(),
                    None => true,
                };
                if proceed {
                    push_body(interp, state, body, scope)?;
                } else {
                    state.frames.pop();
                }
            }
            GenFrame::ForOf {
                iter,
                decl,
                target,
                body,
                scope,
                ..
            } => {
                let iter = iter.clone();
                let decl = *decl;
                let target = *target;
                let body = body.clone();
                let scope = *scope;
                let (done, value) = interp.iterator_next(&iter)?;
                if done {
                    state.frames.pop();
                } else {
                    let body_scope = interp.scopes.new_scope(scope, FrameKind::Block);
                    interp.bind_loop_target(body_scope, decl, target, value)?;
                    push_body(interp, state, body, body_scope)?;
                }
            }
            GenFrame::ForIn {
                keys,
                idx,
                decl,
                target,
                body,
                scope,
                ..
            } => {
                if *idx >= keys.len() {
                    state.frames.pop();
                    continue;
                }
                let key = keys[*idx].clone();
                *idx += 1;
                let decl = *decl;
                let target = *target;
                let body = body.clone();
                let scope = *scope;
                let body_scope = interp.scopes.new_scope(scope, FrameKind::Block);
                interp.bind_loop_target(body_scope, decl, target, Value::Str(key))?;
                push_body(interp, state, body, body_scope)?;
            }
            GenFrame::Try { .. } => {
                let top = state.frames.len() - 1;
                let (snapshot, finally_body, scope) = {
                    let GenFrame::Try { state: ts, finally, scope, .. } = &state.frames[top] else {
                        unreachable!("matched Try above");
                    };
                    (ts.clone(), finally.clone(), *scope)
                };
                match snapshot {
                    TryState::Main | TryState::Handler => {
                        // The protected block (or handler) finished normally.
                        if let Some(finally_body) = finally_body {
                            if let GenFrame::Try { state: ts, .. } = &mut state.frames[top] {
                                *ts = TryState::Finalizer(None);
                            }
                            let finally_scope = interp.scopes.new_scope(scope, FrameKind::Block);
                            interp.hoist_block(&finally_body, finally_scope)?;
                            state.frames.push(GenFrame::Seq {
                                stmts: finally_body,
                                idx: 0,
                                scope: finally_scope,
                                switch_break: false,
                                label: None,
                            });
                        } else {
                            state.frames.pop();
                        }
                    }
                    TryState::Finalizer(pending) => {
                        state.frames.pop();
                        if let Some(u) = pending {
                            unwinding = Some(u);
                        }
                    }
                }
            }
            GenFrame::Delegate { iter, sink, send, .. } => {
                let iter = iter.clone();
                let sink = (**sink).clone();
                let send = send.take().unwrap_or(GenResume::Next(Value::Undefined));
                match delegate_step(interp, &iter, send)? {
                    DelegateOutcome::Yield(v) => {
                        state.sink = Some(ResumeSink::Delegating);
                        return Ok(GenStep::Yield(v));
                    }
                    DelegateOutcome::Done(v) => {
                        state.frames.pop();
                        match sink {
                            ResumeSink::Assign(temp, assign_scope) => {
                                interp.scopes.set(assign_scope, temp, v, interp.interner)?;
                            }
                            ResumeSink::Discard => {}
                            ResumeSink::ReturnSent => {
                                unwinding = Some(Unwind::Complete(Completion::Return(v)));
                            }
                            ResumeSink::Delegating => unreachable!("nested delegating sink"),
                        }
                    }
                    DelegateOutcome::Unwind(u) => {
                        state.frames.pop();
                        unwinding = Some(u);
                    }
                }
            }
        }
    }
}

fn push_body(interp: &mut Interp, state: &mut GenState, body: Stmt, scope: ScopeId) -> RunResult<()> {
    let (stmts, scope) = match body {
        Stmt::Block(stmts, _) => {
            let block_scope = interp.scopes.new_scope(scope, FrameKind::Block);
            interp.hoist_block(&stmts, block_scope)?;
            (stmts, block_scope)
        }
        other => (vec![other], scope),
    };
    state.frames.push(GenFrame::Seq {
        stmts,
        idx: 0,
        scope,
        switch_break: false,
        label: None,
    });
    Ok(())
}

enum StepOutcome {
    Normal,
    Suspend(Value),
    Unwind(Unwind),
}

/// Executes one statement from a Seq frame. Yield-free statements run
/// atomically through the evaluator; yield-bearing structures push frames.
fn exec_gen_stmt(interp: &mut Interp, state: &mut GenState, stmt: Stmt, scope: ScopeId) -> RunResult<StepOutcome> {
    // Fast path: no yield anywhere inside.
    if !contains_suspend_stmt(&stmt, SuspendKind::Yield) {
        return match interp.exec_stmt(&stmt, scope) {
            Ok(Completion::Normal(_)) => Ok(StepOutcome::Normal),
            Ok(completion) => Ok(StepOutcome::Unwind(Unwind::Complete(completion))),
            Err(e) if e.is_catchable() => {
                let value = interp.thrown_to_value(e)?;
                Ok(StepOutcome::Unwind(Unwind::Exception(value)))
            }
            Err(fatal) => Err(fatal),
        };
    }

    match stmt {
        // `yield e;`
        Stmt::Expr(ExprLoc { expr: Expr::Yield { value, delegated: false }, .. }) => {
            let v = match value {
                Some(v) => interp.eval_expr(&v, scope)?,
                None => Value::Undefined,
            };
            state.sink = Some(ResumeSink::Discard);
            Ok(StepOutcome::Suspend(v))
        }
        // `yield* e;`
        Stmt::Expr(ExprLoc { expr: Expr::Yield { value, delegated: true }, .. }) => {
            start_delegation(interp, state, value.map(|v| *v), ResumeSink::Discard, scope)
        }
        // `__t = yield e;` / `__t = yield* e;`
        Stmt::Expr(ExprLoc {
            expr: Expr::Assign { op: None, target, value },
            ..
        }) if matches!(target.expr, Expr::Ident(_)) && matches!(value.expr, Expr::Yield { .. }) => {
            let Expr::Ident(temp) = target.expr else { unreachable!() };
            let Expr::Yield { value, delegated } = value.expr else { unreachable!() };
            if delegated {
                start_delegation(interp, state, value.map(|v| *v), ResumeSink::Assign(temp, scope), scope)
            } else {
                let v = match value {
                    Some(v) => interp.eval_expr(&v, scope)?,
                    None => Value::Undefined,
                };
                state.sink = Some(ResumeSink::Assign(temp, scope));
                Ok(StepOutcome::Suspend(v))
            }
        }
        // `return yield e;` / `return yield* e;`
        Stmt::Return { value: Some(ExprLoc { expr: Expr::Yield { value, delegated }, .. }), .. } => {
            if delegated {
                start_delegation(interp, state, value.map(|v| *v), ResumeSink::ReturnSent, scope)
            } else {
                let v = match value {
                    Some(v) => interp.eval_expr(&v, scope)?,
                    None => Value::Undefined,
                };
                state.sink = Some(ResumeSink::ReturnSent);
                Ok(StepOutcome::Suspend(v))
            }
        }

        Stmt::Block(stmts, _) => {
            let block_scope = interp.scopes.new_scope(scope, FrameKind::Block);
            interp.hoist_block(&stmts, block_scope)?;
            state.frames.push(GenFrame::Seq {
                stmts,
                idx: 0,
                scope: block_scope,
                switch_break: false,
                label: None,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::If { test, cons, alt } => {
            let branch = if interp.eval_expr(&test, scope)?.truthy() {
                Some(*cons)
            } else {
                alt.map(|a| *a)
            };
            if let Some(branch) = branch {
                push_body(interp, state, branch, scope)?;
            }
            Ok(StepOutcome::Normal)
        }
        Stmt::While { test, body } => {
            state.frames.push(GenFrame::While {
                test,
                body: *body,
                label: None,
                scope,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::DoWhile { body, test } => {
            state.frames.push(GenFrame::DoWhile {
                test,
                body: *body,
                label: None,
                scope,
                first: true,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::For { init, test, update, body } => {
            let loop_scope = interp.scopes.new_scope(scope, FrameKind::Block);
            if let Some(init) = init {
                match interp.exec_stmt(&init, loop_scope) {
                    Ok(_) => {}
                    Err(e) if e.is_catchable() => {
                        let value = interp.thrown_to_value(e)?;
                        return Ok(StepOutcome::Unwind(Unwind::Exception(value)));
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
            state.frames.push(GenFrame::For {
                test,
                update,
                body: *body,
                label: None,
                scope: loop_scope,
                ran_once: false,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::ForOf { decl, target, iterable, body, .. } => {
            let iterable = interp.eval_expr(&iterable, scope)?;
            let iter = interp.get_iterator(&iterable)?;
            state.frames.push(GenFrame::ForOf {
                iter,
                decl,
                target,
                body: *body,
                label: None,
                scope,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::ForIn { decl, target, object, body } => {
            let object = interp.eval_expr(&object, scope)?;
            let keys = interp.enumerable_keys(&object);
            state.frames.push(GenFrame::ForIn {
                keys,
                idx: 0,
                decl,
                target,
                body: *body,
                label: None,
                scope,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::Labeled { label, body } => {
            // Attach the label to the frame the body creates.
            let outcome = exec_gen_stmt(interp, state, *body, scope)?;
            if matches!(outcome, StepOutcome::Normal) {
                if let Some(frame) = state.frames.last_mut() {
                    set_frame_label(frame, label);
                }
            }
            Ok(outcome)
        }
        Stmt::Switch { disc, cases, .. } => {
            // Evaluate the discriminant and case tests (yield-free by the
            // lowering), then run the selected bodies flattened with
            // fallthrough. An unlabeled break stops at this frame.
            let disc = interp.eval_expr(&disc, scope)?;
            let mut selected: Option<usize> = None;
            let mut default: Option<usize> = None;
            for (i, case) in cases.iter().enumerate() {
                match &case.test {
                    Some(test) => {
                        let test = interp.eval_expr(test, scope)?;
                        if disc.strict_eq(&test) {
                            selected = Some(i);
                            break;
                        }
                    }
                    None => default = Some(i),
                }
            }
            let Some(start) = selected.or(default) else {
                return Ok(StepOutcome::Normal);
            };
            let stmts: Vec<Stmt> = cases[start..].iter().flat_map(|c| c.body.clone()).collect();
            let switch_scope = interp.scopes.new_scope(scope, FrameKind::Block);
            interp.hoist_block(&stmts, switch_scope)?;
            state.frames.push(GenFrame::Seq {
                stmts,
                idx: 0,
                scope: switch_scope,
                switch_break: true,
                label: None,
            });
            Ok(StepOutcome::Normal)
        }
        Stmt::Try { block, catch, finally, .. } => {
            state.frames.push(GenFrame::Try {
                catch,
                finally,
                scope,
                state: TryState::Main,
            });
            let try_scope = interp.scopes.new_scope(scope, FrameKind::Block);
            interp.hoist_block(&block, try_scope)?;
            state.frames.push(GenFrame::Seq {
                stmts: block,
                idx: 0,
                scope: try_scope,
                switch_break: false,
                label: None,
            });
            Ok(StepOutcome::Normal)
        }
        // Yield-bearing statements the lowering is specified to have
        // eliminated; reaching one is a lowering bug.
        other => Err(RunError::syntax_error(format!(
            "yield in an unsupported position survived lowering: {other:?}"
        ))),
    }
}

fn set_frame_label(frame: &mut GenFrame, new_label: Symbol) {
    match frame {
        GenFrame::Seq { label, .. }
        | GenFrame::While { label, .. }
        | GenFrame::DoWhile { label, .. }
        | GenFrame::For { label, .. }
        | GenFrame::ForOf { label, .. }
        | GenFrame::ForIn { label, .. } => *label = Some(new_label),
        GenFrame::Try { .. } | GenFrame::Delegate { .. } => {}
    }
}

fn start_delegation(
    interp: &mut Interp,
    state: &mut GenState,
    value: Option<ExprLoc>,
    sink: ResumeSink,
    scope: ScopeId,
) -> RunResult<StepOutcome> {
    let operand = match value {
        Some(v) => interp.eval_expr(&v, scope)?,
        None => return Err(RunError::type_error("yield* requires an iterable")),
    };
    let iter = interp.get_iterator(&operand)?;
    state.frames.push(GenFrame::Delegate {
        iter,
        sink: Box::new(sink),
        scope,
        send: Some(GenResume::Next(Value::Undefined)),
    });
    Ok(StepOutcome::Normal)
}

enum DelegateOutcome {
    Yield(Value),
    Done(Value),
    Unwind(Unwind),
}

/// Feeds one driver input into a delegated iterator.
fn delegate_step(interp: &mut Interp, iter: &Value, send: GenResume) -> RunResult<DelegateOutcome> {
    match send {
        GenResume::Next(v) => {
            let (done, value) = interp.iterator_next_with(iter, v)?;
            Ok(if done {
                DelegateOutcome::Done(value)
            } else {
                DelegateOutcome::Yield(value)
            })
        }
        GenResume::Throw(e) => {
            // Forward into the iterator's throw() when it has one; otherwise
            // the exception unwinds the delegating generator.
            match interp.iterator_throw(iter, e.clone())? {
                Some((done, value)) => Ok(if done {
                    DelegateOutcome::Done(value)
                } else {
                    DelegateOutcome::Yield(value)
                }),
                None => Ok(DelegateOutcome::Unwind(Unwind::Exception(e))),
            }
        }
        GenResume::Return(v) => {
            // Close the delegated iterator, then complete with the value.
            interp.iterator_return(iter, v.clone())?;
            Ok(DelegateOutcome::Unwind(Unwind::Complete(Completion::Return(v))))
        }
    }
}

enum UnwindOutcome {
    /// A frame absorbed the unwind; execution continues.
    Resumed,
    /// The stack is empty; the generator finished.
    Finished(GenStep),
    /// Keep unwinding with this (possibly replaced) outcome.
    Propagate(Unwind),
}

/// Pops one frame, deciding whether it absorbs the unwind.
fn apply_unwind(interp: &mut Interp, state: &mut GenState, u: Unwind) -> RunResult<UnwindOutcome> {
    let Some(frame) = state.frames.pop() else {
        return match u {
            Unwind::Complete(Completion::Return(v)) => Ok(UnwindOutcome::Finished(GenStep::Done(v))),
            Unwind::Complete(Completion::Normal(_)) => Ok(UnwindOutcome::Finished(GenStep::Done(Value::Undefined))),
            Unwind::Complete(Completion::Break(_) | Completion::Continue(_)) => {
                Err(RunError::syntax_error("illegal break or continue in generator"))
            }
            Unwind::Exception(e) => Err(RunError::throw(e)),
        };
    };

    match frame {
        GenFrame::Seq { switch_break, label, .. } => {
            match &u {
                Unwind::Complete(Completion::Break(None)) if switch_break => return Ok(UnwindOutcome::Resumed),
                Unwind::Complete(Completion::Break(Some(l))) if label == Some(*l) => {
                    return Ok(UnwindOutcome::Resumed);
                }
                _ => {}
            }
            Ok(UnwindOutcome::Propagate(u))
        }
        GenFrame::While { label, .. }
        | GenFrame::DoWhile { label, .. }
        | GenFrame::For { label, .. }
        | GenFrame::ForOf { label, .. }
        | GenFrame::ForIn { label, .. } => match &u {
            Unwind::Complete(Completion::Break(target)) if jump_matches(label, *target) => Ok(UnwindOutcome::Resumed),
            Unwind::Complete(Completion::Continue(target)) if jump_matches(label, *target) => {
                // Re-enter the loop frame: push it back and iterate.
                state.frames.push(frame_for_continue(frame));
                Ok(UnwindOutcome::Resumed)
            }
            _ => Ok(UnwindOutcome::Propagate(u)),
        },
        GenFrame::Try {
            catch,
            finally,
            scope,
            state: try_state,
        } => {
            match try_state {
                TryState::Main => {
                    if let (Unwind::Exception(e), Some(catch_clause)) = (&u, catch.as_ref()) {
                        // Enter the handler.
                        let catch_scope = interp.scopes.new_scope(scope, FrameKind::Block);
                        if let Some(param) = catch_clause.param {
                            interp
                                .scopes
                                .declare_lexical(catch_scope, param, DeclKind::Let, interp.interner)?;
                            interp.scopes.initialize(catch_scope, param, e.clone());
                        }
                        let body = catch_clause.body.clone();
                        interp.hoist_block(&body, catch_scope)?;
                        state.frames.push(GenFrame::Try {
                            catch: None,
                            finally,
                            scope,
                            state: TryState::Handler,
                        });
                        state.frames.push(GenFrame::Seq {
                            stmts: body,
                            idx: 0,
                            scope: catch_scope,
                            switch_break: false,
                            label: None,
                        });
                        return Ok(UnwindOutcome::Resumed);
                    }
                    // No handler (or a non-exception unwind): run the
                    // finalizer with the outcome pending.
                    if let Some(finally_body) = finally {
                        let finally_scope = interp.scopes.new_scope(scope, FrameKind::Block);
                        interp.hoist_block(&finally_body, finally_scope)?;
                        state.frames.push(GenFrame::Try {
                            catch: None,
                            finally: None,
                            scope,
                            state: TryState::Finalizer(Some(u)),
                        });
                        state.frames.push(GenFrame::Seq {
                            stmts: finally_body,
                            idx: 0,
                            scope: finally_scope,
                            switch_break: false,
                            label: None,
                        });
                        return Ok(UnwindOutcome::Resumed);
                    }
                    Ok(UnwindOutcome::Propagate(u))
                }
                TryState::Handler => {
                    if let Some(finally_body) = finally {
                        let finally_scope = interp.scopes.new_scope(scope, FrameKind::Block);
                        interp.hoist_block(&finally_body, finally_scope)?;
                        state.frames.push(GenFrame::Try {
                            catch: None,
                            finally: None,
                            scope,
                            state: TryState::Finalizer(Some(u)),
                        });
                        state.frames.push(GenFrame::Seq {
                            stmts: finally_body,
                            idx: 0,
                            scope: finally_scope,
                            switch_break: false,
                            label: None,
                        });
                        return Ok(UnwindOutcome::Resumed);
                    }
                    Ok(UnwindOutcome::Propagate(u))
                }
                TryState::Finalizer(_) => {
                    // The finally body itself unwound; its outcome replaces
                    // whatever was pending.
                    Ok(UnwindOutcome::Propagate(u))
                }
            }
        }
        GenFrame::Delegate { .. } => Ok(UnwindOutcome::Propagate(u)),
    }
}

fn jump_matches(frame_label: Option<Symbol>, target: Option<Symbol>) -> bool {
    match target {
        None => true,
        Some(t) => frame_label == Some(t),
    }
}

/// Rebuilds a loop frame for re-entry after `continue`.
fn frame_for_continue(frame: GenFrame) -> GenFrame {
    match frame {
        f @ (GenFrame::While { .. } | GenFrame::ForOf { .. } | GenFrame::ForIn { .. }) => f,
        GenFrame::DoWhile {
            test,
            body,
            label,
            scope,
            ..
        } => GenFrame::DoWhile {
            test,
            body,
            label,
            scope,
            // continue re-tests the condition.
            first: false,
        },
        GenFrame::For {
            test,
            update,
            body,
            label,
            scope,
            ..
        } => GenFrame::For {
            test,
            update,
            body,
            label,
            scope,
            // continue runs the update first.
            ran_once: true,
        },
        other => other,
    }
}
