//! The tree-walking evaluator.
//!
//! Statements produce [`Completion`] values so `break`/`continue`/`return`
//! travel as data rather than unwinding the Rust stack; thrown script values
//! travel as `RunError::Throw` and are intercepted by `try` statements.
//! Expression evaluation is ordinary recursive descent over the typed AST.
//!
//! By the time code reaches this module the transformation passes have
//! removed `async`/`await` entirely and pinned every `yield` to a statement
//! boundary, so the evaluator is purely synchronous; generators run on their
//! own frame stack in [`crate::generator`].

use std::{rc::Rc, time::Instant};

use smallvec::SmallVec;

use crate::{
    ast::{
        BinOp, ClassDef, ClassMember, ClassMemberKind, CmpOp, DeclKind, Expr, ExprLoc, FuncDef, FuncKind, Literal,
        LogicalOp, MemberProp, PropInit, PropKeyAst, PropValue, Stmt, SwitchCase, UnaryOp, UpdateOp, VarDecl,
    },
    builtins,
    exception::{ExcKind, RunError, RunResult, SimpleError, Thrown},
    generator::GenState,
    heap::{Closure, Heap, HeapData, HeapId, JsArray, JsObject, PropKey, Property, ResolverKind},
    intern::{Interner, StaticSym, Symbol},
    iterator,
    promise::{self, Microtask, MicrotaskQueue, ReactionKind},
    scope::{FrameKind, ScopeId, Scopes},
    value::{bigint_div, bigint_pow, bigint_rem, number_to_string, JsStr, Value},
};

/// Result of executing one statement.
#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Normal(Value),
    Return(Value),
    Break(Option<Symbol>),
    Continue(Option<Symbol>),
}

/// How often the deadline is polled, in executed statements.
const DEADLINE_POLL_MASK: u32 = 0x3ff;

/// The evaluator, borrowing all engine state for the duration of one
/// synchronous frame.
pub(crate) struct Interp<'a> {
    pub heap: &'a mut Heap,
    pub scopes: &'a mut Scopes,
    pub interner: &'a mut Interner,
    pub queue: &'a mut MicrotaskQueue,
    pub host: &'a mut crate::host::HostRegistry,
    pub debug: &'a mut Vec<crate::host::DebugMessage>,
    pub deadline: Option<Instant>,
    pub depth: usize,
    pub max_depth: usize,
    steps: u32,
}

impl<'a> Interp<'a> {
    #[expect(clippy::too_many_arguments, reason = "borrows every engine part once")]
    pub fn new(
        heap: &'a mut Heap,
        scopes: &'a mut Scopes,
        interner: &'a mut Interner,
        queue: &'a mut MicrotaskQueue,
        host: &'a mut crate::host::HostRegistry,
        debug: &'a mut Vec<crate::host::DebugMessage>,
        deadline: Option<Instant>,
        max_depth: usize,
    ) -> Self {
        Self {
            heap,
            scopes,
            interner,
            queue,
            host,
            debug,
            deadline,
            depth: 0,
            max_depth,
            steps: 0,
        }
    }

    fn check_deadline(&mut self) -> RunResult<()> {
        self.steps = self.steps.wrapping_add(1);
        if self.steps & DEADLINE_POLL_MASK == 0
            && let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(RunError::Timeout);
        }
        Ok(())
    }

    // ==========================
    // Program and statement execution

    /// Runs a program body, returning the completion value: the value of the
    /// last expression statement, or undefined.
    pub fn exec_program(&mut self, stmts: &[Stmt], scope: ScopeId) -> RunResult<Value> {
        self.hoist(stmts, scope)?;
        let mut completion = Value::Undefined;
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Completion::Normal(v) => {
                    if matches!(stmt, Stmt::Expr(_)) {
                        completion = v;
                    }
                }
                Completion::Return(v) => return Ok(v),
                Completion::Break(_) | Completion::Continue(_) => {
                    return Err(RunError::syntax_error("Illegal break or continue"));
                }
            }
        }
        Ok(completion)
    }

    /// Hoists for function entry: `var` declarations from the whole body
    /// (reading as undefined), then the top statement list's function and
    /// lexical declarations.
    pub fn hoist(&mut self, stmts: &[Stmt], scope: ScopeId) -> RunResult<()> {
        self.hoist_vars(stmts, scope);
        self.hoist_block(stmts, scope)
    }

    fn hoist_vars(&mut self, stmts: &[Stmt], scope: ScopeId) {
        for stmt in stmts {
            self.hoist_vars_stmt(stmt, scope);
        }
    }

    fn hoist_vars_stmt(&mut self, stmt: &Stmt, scope: ScopeId) {
        match stmt {
            Stmt::VarDecl(d) if d.kind == DeclKind::Var => {
                for decl in &d.decls {
                    self.scopes.declare_var(scope, decl.name, None);
                }
            }
            Stmt::If { cons, alt, .. } => {
                self.hoist_vars_stmt(cons, scope);
                if let Some(alt) = alt {
                    self.hoist_vars_stmt(alt, scope);
                }
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
                self.hoist_vars_stmt(body, scope);
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    self.hoist_vars_stmt(init, scope);
                }
                self.hoist_vars_stmt(body, scope);
            }
            Stmt::ForIn { body, .. } | Stmt::ForOf { body, .. } => self.hoist_vars_stmt(body, scope),
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    self.hoist_vars(&case.body, scope);
                }
            }
            Stmt::Try { block, catch, finally, .. } => {
                self.hoist_vars(block, scope);
                if let Some(catch) = catch {
                    self.hoist_vars(&catch.body, scope);
                }
                if let Some(finally) = finally {
                    self.hoist_vars(finally, scope);
                }
            }
            Stmt::Block(stmts, _) => self.hoist_vars(stmts, scope),
            _ => {}
        }
    }

    /// Declares the block's own function and lexical bindings: functions
    /// hoist with their value, `let`/`const`/`class` enter uninitialized
    /// (the temporal dead zone).
    pub fn hoist_block(&mut self, stmts: &[Stmt], scope: ScopeId) -> RunResult<()> {
        for stmt in stmts {
            match stmt {
                Stmt::FuncDecl(def) => {
                    let value = self.create_closure(def, scope, None, None);
                    let name = def.name.expect("function declaration has a name");
                    self.scopes.declare_function(scope, name, value);
                }
                Stmt::VarDecl(d) if d.kind != DeclKind::Var => {
                    for decl in &d.decls {
                        self.scopes.declare_lexical(scope, decl.name, d.kind, self.interner)?;
                    }
                }
                Stmt::ClassDecl(c) => {
                    if let Some(name) = c.name {
                        self.scopes.declare_lexical(scope, name, DeclKind::Let, self.interner)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt, scope: ScopeId) -> RunResult<Completion> {
        self.check_deadline()?;
        match stmt {
            Stmt::Expr(e) => Ok(Completion::Normal(self.eval_expr(e, scope)?)),
            Stmt::VarDecl(d) => self.exec_var_decl(d, scope),
            Stmt::FuncDecl(_) | Stmt::Empty => Ok(Completion::Normal(Value::Undefined)),
            Stmt::ClassDecl(c) => {
                let value = self.eval_class(c, scope)?;
                if let Some(name) = c.name {
                    self.scopes.initialize(scope, name, value);
                }
                Ok(Completion::Normal(Value::Undefined))
            }
            Stmt::Return { value, .. } => {
                let v = match value {
                    Some(v) => self.eval_expr(v, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(v))
            }
            Stmt::Throw { value, .. } => {
                let v = self.eval_expr(value, scope)?;
                Err(RunError::throw(v))
            }
            Stmt::If { test, cons, alt } => {
                if self.eval_expr(test, scope)?.truthy() {
                    self.exec_stmt(cons, scope)
                } else if let Some(alt) = alt {
                    self.exec_stmt(alt, scope)
                } else {
                    Ok(Completion::Normal(Value::Undefined))
                }
            }
            Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::For { .. }
            | Stmt::ForIn { .. }
            | Stmt::ForOf { .. } => self.exec_loop(stmt, scope, None),
            Stmt::Labeled { label, body } => match body.as_ref() {
                loop_stmt @ (Stmt::While { .. }
                | Stmt::DoWhile { .. }
                | Stmt::For { .. }
                | Stmt::ForIn { .. }
                | Stmt::ForOf { .. }) => self.exec_loop(loop_stmt, scope, Some(*label)),
                other => match self.exec_stmt(other, scope)? {
                    Completion::Break(Some(l)) if l == *label => Ok(Completion::Normal(Value::Undefined)),
                    completion => Ok(completion),
                },
            },
            Stmt::Break { label, .. } => Ok(Completion::Break(*label)),
            Stmt::Continue { label, .. } => Ok(Completion::Continue(*label)),
            Stmt::Switch { disc, cases, .. } => self.exec_switch(disc, cases, scope),
            Stmt::Try {
                block,
                catch,
                finally,
                ..
            } => self.exec_try(block, catch.as_ref(), finally.as_deref(), scope),
            Stmt::Block(stmts, _) => {
                let block_scope = self.scopes.new_scope(scope, FrameKind::Block);
                self.exec_block(stmts, block_scope)
            }
        }
    }

    /// Runs a statement list in an already-created scope, hoisting its own
    /// declarations first.
    pub fn exec_block(&mut self, stmts: &[Stmt], scope: ScopeId) -> RunResult<Completion> {
        self.hoist_block(stmts, scope)?;
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Completion::Normal(_) => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn exec_var_decl(&mut self, d: &VarDecl, scope: ScopeId) -> RunResult<Completion> {
        for decl in &d.decls {
            let value = match &decl.init {
                Some(init) => self.eval_expr(init, scope)?,
                None => Value::Undefined,
            };
            match d.kind {
                DeclKind::Var => self.scopes.declare_var(scope, decl.name, Some(value)),
                DeclKind::Let | DeclKind::Const => self.scopes.initialize(scope, decl.name, value),
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    /// Shared loop driver handling labels uniformly.
    fn exec_loop(&mut self, stmt: &Stmt, scope: ScopeId, label: Option<Symbol>) -> RunResult<Completion> {
        macro_rules! run_body {
            ($body:expr, $body_scope:expr) => {
                match self.exec_stmt($body, $body_scope)? {
                    Completion::Normal(_) => {}
                    Completion::Break(None) => break,
                    Completion::Break(Some(l)) if Some(l) == label => break,
                    Completion::Continue(None) => continue,
                    Completion::Continue(Some(l)) if Some(l) == label => continue,
                    other => return Ok(other),
                }
            };
        }

        match stmt {
            Stmt::While { test, body } => loop {
                self.check_deadline()?;
                if !self.eval_expr(test, scope)?.truthy() {
                    break;
                }
                run_body!(body, scope);
            },
            Stmt::DoWhile { body, test } => loop {
                self.check_deadline()?;
                run_body!(body, scope);
                if !self.eval_expr(test, scope)?.truthy() {
                    break;
                }
            },
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_scope = self.scopes.new_scope(scope, FrameKind::Block);
                if let Some(init) = init {
                    if let Stmt::VarDecl(d) = init.as_ref()
                        && d.kind != DeclKind::Var
                    {
                        for decl in &d.decls {
                            self.scopes.declare_lexical(loop_scope, decl.name, d.kind, self.interner)?;
                        }
                    }
                    self.exec_stmt(init, loop_scope)?;
                }
                loop {
                    self.check_deadline()?;
                    if let Some(test) = test
                        && !self.eval_expr(test, loop_scope)?.truthy()
                    {
                        break;
                    }
                    match self.exec_stmt(body, loop_scope)? {
                        Completion::Normal(_) | Completion::Continue(None) => {}
                        Completion::Continue(Some(l)) if Some(l) == label => {}
                        Completion::Break(None) => break,
                        Completion::Break(Some(l)) if Some(l) == label => break,
                        other => return Ok(other),
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, loop_scope)?;
                    }
                }
            }
            Stmt::ForIn {
                decl,
                target,
                object,
                body,
            } => {
                let object = self.eval_expr(object, scope)?;
                let keys = self.enumerable_keys(&object);
                for key in keys {
                    self.check_deadline()?;
                    let body_scope = self.scopes.new_scope(scope, FrameKind::Block);
                    self.bind_loop_target(body_scope, *decl, *target, Value::Str(key))?;
                    run_body!(body, body_scope);
                }
            }
            Stmt::ForOf {
                decl,
                target,
                iterable,
                body,
                is_await,
            } => {
                if *is_await {
                    return Err(RunError::syntax_error("for await is only valid in async functions"));
                }
                let iterable = self.eval_expr(iterable, scope)?;
                let iter = self.get_iterator(&iterable)?;
                loop {
                    self.check_deadline()?;
                    let (done, value) = self.iterator_next(&iter)?;
                    if done {
                        break;
                    }
                    let body_scope = self.scopes.new_scope(scope, FrameKind::Block);
                    self.bind_loop_target(body_scope, *decl, *target, value)?;
                    run_body!(body, body_scope);
                }
            }
            _ => unreachable!("exec_loop called with a non-loop"),
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    /// Binds a loop variable in a per-iteration scope.
    pub fn bind_loop_target(
        &mut self,
        scope: ScopeId,
        decl: Option<DeclKind>,
        target: Symbol,
        value: Value,
    ) -> RunResult<()> {
        match decl {
            Some(DeclKind::Var) => {
                self.scopes.declare_var(scope, target, Some(value));
                Ok(())
            }
            Some(kind) => {
                self.scopes.declare_lexical(scope, target, kind, self.interner)?;
                self.scopes.initialize(scope, target, value);
                Ok(())
            }
            None => self.scopes.set(scope, target, value, self.interner),
        }
    }

    fn exec_switch(&mut self, disc: &ExprLoc, cases: &[SwitchCase], scope: ScopeId) -> RunResult<Completion> {
        let disc = self.eval_expr(disc, scope)?;
        let switch_scope = self.scopes.new_scope(scope, FrameKind::Block);
        for case in cases {
            self.hoist_block(&case.body, switch_scope)?;
        }

        let mut selected = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test = self.eval_expr(test, switch_scope)?;
                if disc.strict_eq(&test) {
                    selected = Some(i);
                    break;
                }
            }
        }
        let start = match selected.or_else(|| cases.iter().position(|c| c.test.is_none())) {
            Some(i) => i,
            None => return Ok(Completion::Normal(Value::Undefined)),
        };

        // Fall through across case bodies until a break.
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.exec_stmt(stmt, switch_scope)? {
                    Completion::Normal(_) => {}
                    Completion::Break(None) => return Ok(Completion::Normal(Value::Undefined)),
                    other => return Ok(other),
                }
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        catch: Option<&crate::ast::CatchClause>,
        finally: Option<&[Stmt]>,
        scope: ScopeId,
    ) -> RunResult<Completion> {
        let try_scope = self.scopes.new_scope(scope, FrameKind::Block);
        let mut outcome = self.exec_block(block, try_scope);

        if let Err(err) = &outcome
            && err.is_catchable()
            && let Some(catch) = catch
        {
            let error = self.thrown_to_value(outcome.unwrap_err())?;
            let catch_scope = self.scopes.new_scope(scope, FrameKind::Block);
            if let Some(param) = catch.param {
                self.scopes.declare_lexical(catch_scope, param, DeclKind::Let, self.interner)?;
                self.scopes.initialize(catch_scope, param, error);
            }
            outcome = self.exec_block(&catch.body, catch_scope);
        }

        if let Some(finally) = finally {
            let finally_scope = self.scopes.new_scope(scope, FrameKind::Block);
            match self.exec_block(finally, finally_scope)? {
                // A return/throw/break from finally replaces the prior
                // completion.
                Completion::Normal(_) => {}
                completion => return Ok(completion),
            }
        }
        outcome
    }

    // ==========================
    // Expressions

    #[expect(clippy::too_many_lines, reason = "one arm per expression kind")]
    pub fn eval_expr(&mut self, expr: &ExprLoc, scope: ScopeId) -> RunResult<Value> {
        match &expr.expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Num(n) => Value::Num(*n),
                Literal::Str(s) => Value::Str(s.clone()),
                Literal::BigInt(b) => Value::BigInt(b.clone()),
            }),
            Expr::Ident(sym) => self.scopes.get(scope, *sym, self.interner),
            Expr::This => Ok(self.scopes.this_value(scope)),
            Expr::Super => Err(RunError::syntax_error("'super' is only valid inside methods")),
            Expr::Array(items) => self.eval_array_literal(items, scope),
            Expr::Object(props) => self.eval_object_literal(props, scope),
            Expr::Function(def) => Ok(self.create_closure(def, scope, None, None)),
            Expr::Class(def) => self.eval_class(def, scope),
            Expr::Regex { pattern, flags } => Ok(builtins::regex::alloc_regex(self.heap, pattern.clone(), flags.clone())),
            Expr::Template { chunks, exprs } => {
                let mut out = String::new();
                for (i, chunk) in chunks.iter().enumerate() {
                    out.push_str(chunk);
                    if let Some(e) = exprs.get(i) {
                        let v = self.eval_expr(e, scope)?;
                        out.push_str(&v.to_display(self.heap, self.interner));
                    }
                }
                Ok(Value::str(out))
            }
            Expr::Unary { op, operand } => self.eval_unary(*op, operand, scope),
            Expr::Update { op, prefix, target } => self.eval_update(*op, *prefix, target, scope),
            Expr::Binary { op, left, right } => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                self.binary_op(*op, &left, &right)
            }
            Expr::Cmp { op, left, right } => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                self.cmp_op(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval_expr(left, scope)?;
                let pick_right = match op {
                    LogicalOp::And => left.truthy(),
                    LogicalOp::Or => !left.truthy(),
                    LogicalOp::Nullish => left.is_nullish(),
                };
                if pick_right {
                    self.eval_expr(right, scope)
                } else {
                    Ok(left)
                }
            }
            Expr::Conditional { test, cons, alt } => {
                if self.eval_expr(test, scope)?.truthy() {
                    self.eval_expr(cons, scope)
                } else {
                    self.eval_expr(alt, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::LogicalAssign { op, target, value } => {
                let current = self.read_target(target, scope)?;
                let assign = match op {
                    LogicalOp::And => current.truthy(),
                    LogicalOp::Or => !current.truthy(),
                    LogicalOp::Nullish => current.is_nullish(),
                };
                if assign {
                    let v = self.eval_expr(value, scope)?;
                    self.write_target(target, v.clone(), scope)?;
                    Ok(v)
                } else {
                    Ok(current)
                }
            }
            Expr::Call { callee, args, .. } => self.eval_call(callee, args, scope),
            Expr::New { callee, args } => {
                let callee = self.eval_expr(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                self.construct(&callee, &args)
            }
            Expr::Member { object, prop, .. } => {
                let object = self.eval_expr(object, scope)?;
                let key = self.member_key(prop, scope)?;
                if object.is_nullish() {
                    return Err(self.member_on_nullish(&object, &key));
                }
                self.get_member(&object, &key)
            }
            Expr::OptionalChain(inner) => Ok(self
                .eval_chain(inner, scope)?
                .map_or(Value::Undefined, |cv| cv.value)),
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval_expr(item, scope)?;
                }
                Ok(last)
            }
            Expr::Spread(_) => Err(RunError::syntax_error("spread is only valid in calls and array literals")),
            Expr::Yield { .. } => Err(RunError::syntax_error("yield is only valid inside generator functions")),
            Expr::Await(_) => Err(RunError::syntax_error("await is only valid in async functions")),
        }
    }

    fn member_on_nullish(&self, object: &Value, key: &PropKey) -> RunError {
        let key = match key {
            PropKey::Str(s) => s.to_string(),
            PropKey::Sym(sym) => format!("Symbol({})", self.interner.resolve(*sym)),
        };
        RunError::type_error(format!(
            "Cannot read properties of {} (reading '{key}')",
            if matches!(object, Value::Null) { "null" } else { "undefined" },
        ))
    }

    fn eval_array_literal(&mut self, items: &[Option<ExprLoc>], scope: ScopeId) -> RunResult<Value> {
        let mut arr = JsArray::new();
        let mut idx: u32 = 0;
        for item in items {
            match item {
                None => idx += 1,
                Some(ExprLoc { expr: Expr::Spread(inner), .. }) => {
                    let iterable = self.eval_expr(inner, scope)?;
                    let iter = self.get_iterator(&iterable)?;
                    loop {
                        let (done, value) = self.iterator_next(&iter)?;
                        if done {
                            break;
                        }
                        arr.set_index(idx, value);
                        idx += 1;
                    }
                }
                Some(e) => {
                    let value = self.eval_expr(e, scope)?;
                    arr.set_index(idx, value);
                    idx += 1;
                }
            }
        }
        if idx > arr.length() {
            arr.set_length(idx);
        }
        Ok(Value::Ref(self.heap.alloc(HeapData::Array(arr))))
    }

    fn eval_object_literal(&mut self, props: &[PropInit], scope: ScopeId) -> RunResult<Value> {
        let id = self.heap.alloc_object(None);
        for prop in props {
            let key = self.prop_key(&prop.key, scope)?;
            match &prop.value {
                PropValue::Value(e) => {
                    let value = self.eval_expr(e, scope)?;
                    self.heap.expect_object_mut(id).props.insert(key, Property::Value(value));
                }
                PropValue::Method(def) => {
                    let value = self.create_closure(def, scope, Some(id), None);
                    self.heap.expect_object_mut(id).props.insert(key, Property::Value(value));
                }
                PropValue::Getter(def) => {
                    let getter = self.create_closure(def, scope, Some(id), None);
                    merge_accessor(self.heap.expect_object_mut(id), key, Some(getter), None);
                }
                PropValue::Setter(def) => {
                    let setter = self.create_closure(def, scope, Some(id), None);
                    merge_accessor(self.heap.expect_object_mut(id), key, None, Some(setter));
                }
            }
        }
        Ok(Value::Ref(id))
    }

    fn prop_key(&mut self, key: &PropKeyAst, scope: ScopeId) -> RunResult<PropKey> {
        Ok(match key {
            PropKeyAst::Ident(sym) => PropKey::Str(self.interner.resolve(*sym).into()),
            PropKeyAst::Str(s) => PropKey::Str(s.clone()),
            PropKeyAst::Num(n) => PropKey::Str(number_to_string(*n).into()),
            PropKeyAst::Computed(e) => {
                let v = self.eval_expr(e, scope)?;
                v.to_property_key(self.heap, self.interner)
            }
        })
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &ExprLoc, scope: ScopeId) -> RunResult<Value> {
        // `typeof undeclared` answers without raising.
        if op == UnaryOp::TypeOf
            && let Expr::Ident(sym) = &operand.expr
            && !self.scopes.is_declared(scope, *sym)
        {
            return Ok(Value::str("undefined"));
        }
        if op == UnaryOp::Delete {
            return self.eval_delete(operand, scope);
        }
        let v = self.eval_expr(operand, scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!v.truthy()),
            UnaryOp::Neg => match v {
                Value::BigInt(b) => Value::BigInt(Rc::new(-&*b)),
                other => Value::Num(-other.to_number(self.heap)?),
            },
            UnaryOp::Pos => Value::Num(v.to_number(self.heap)?),
            UnaryOp::BitNot => match v {
                Value::BigInt(b) => Value::BigInt(Rc::new(!&*b)),
                other => Value::Num(f64::from(!crate::fold::to_int32(other.to_number(self.heap)?))),
            },
            UnaryOp::TypeOf => Value::str(v.type_of(self.heap)),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => unreachable!("handled above"),
        })
    }

    fn eval_delete(&mut self, operand: &ExprLoc, scope: ScopeId) -> RunResult<Value> {
        let Expr::Member { object, prop, .. } = &operand.expr else {
            // `delete x` on a binding is false; anything else is true.
            return Ok(Value::Bool(!matches!(operand.expr, Expr::Ident(_))));
        };
        let object = self.eval_expr(object, scope)?;
        let key = self.member_key(prop, scope)?;
        if let Value::Ref(id) = &object {
            match self.heap.get_mut(*id) {
                HeapData::Object(obj) => {
                    obj.props.shift_remove(&key);
                }
                HeapData::Array(arr) => {
                    if let Some(index) = key.as_str().and_then(iterator::array_index) {
                        arr.delete_index(index);
                    } else {
                        arr.extra.shift_remove(&key);
                    }
                }
                _ => {}
            }
        }
        Ok(Value::Bool(true))
    }

    fn eval_update(&mut self, op: UpdateOp, prefix: bool, target: &ExprLoc, scope: ScopeId) -> RunResult<Value> {
        let old = self.read_target(target, scope)?;
        let (old, new) = match old {
            Value::BigInt(b) => {
                let delta = num_bigint::BigInt::from(if op == UpdateOp::Inc { 1 } else { -1 });
                let new = Value::BigInt(Rc::new(&*b + delta));
                (Value::BigInt(b), new)
            }
            other => {
                let n = other.to_number(self.heap)?;
                let new = if op == UpdateOp::Inc { n + 1.0 } else { n - 1.0 };
                (Value::Num(n), Value::Num(new))
            }
        };
        self.write_target(target, new.clone(), scope)?;
        Ok(if prefix { new } else { old })
    }

    /// Reads an assignment target (identifier or member expression).
    fn read_target(&mut self, target: &ExprLoc, scope: ScopeId) -> RunResult<Value> {
        match &target.expr {
            Expr::Ident(sym) => self.scopes.get(scope, *sym, self.interner),
            Expr::Member { object, prop, .. } => {
                let object = self.eval_expr(object, scope)?;
                let key = self.member_key(prop, scope)?;
                if object.is_nullish() {
                    return Err(self.member_on_nullish(&object, &key));
                }
                self.get_member(&object, &key)
            }
            _ => Err(RunError::syntax_error("invalid assignment target")),
        }
    }

    fn write_target(&mut self, target: &ExprLoc, value: Value, scope: ScopeId) -> RunResult<()> {
        match &target.expr {
            Expr::Ident(sym) => self.scopes.set(scope, *sym, value, self.interner),
            Expr::Member { object, prop, .. } => {
                let object = self.eval_expr(object, scope)?;
                let key = self.member_key(prop, scope)?;
                if object.is_nullish() {
                    return Err(self.member_on_nullish(&object, &key));
                }
                self.set_member(&object, key, value)
            }
            _ => Err(RunError::syntax_error("invalid assignment target")),
        }
    }

    fn eval_assign(
        &mut self,
        op: Option<BinOp>,
        target: &ExprLoc,
        value: &ExprLoc,
        scope: ScopeId,
    ) -> RunResult<Value> {
        match op {
            None => match &target.expr {
                Expr::Ident(sym) => {
                    let v = self.eval_expr(value, scope)?;
                    self.scopes.set(scope, *sym, v.clone(), self.interner)?;
                    Ok(v)
                }
                Expr::Member { object, prop, .. } => {
                    let object = self.eval_expr(object, scope)?;
                    let key = self.member_key(prop, scope)?;
                    if object.is_nullish() {
                        return Err(self.member_on_nullish(&object, &key));
                    }
                    let v = self.eval_expr(value, scope)?;
                    self.set_member(&object, key, v.clone())?;
                    Ok(v)
                }
                _ => Err(RunError::syntax_error("invalid assignment target")),
            },
            Some(op) => {
                let current = self.read_target(target, scope)?;
                let rhs = self.eval_expr(value, scope)?;
                let v = self.binary_op(op, &current, &rhs)?;
                self.write_target(target, v.clone(), scope)?;
                Ok(v)
            }
        }
    }

    fn member_key(&mut self, prop: &MemberProp, scope: ScopeId) -> RunResult<PropKey> {
        Ok(match prop {
            MemberProp::Ident(sym) => PropKey::Str(self.interner.resolve(*sym).into()),
            MemberProp::Computed(e) => {
                let v = self.eval_expr(e, scope)?;
                v.to_property_key(self.heap, self.interner)
            }
        })
    }

    // ==========================
    // Operators

    pub fn binary_op(&mut self, op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
        use BinOp::*;
        // BigInt arithmetic: both sides must be bigints.
        let bigints = match (left, right) {
            (Value::BigInt(a), Value::BigInt(b)) => Some((a.clone(), b.clone())),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => {
                if op == Add && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_))) {
                    None
                } else {
                    return Err(RunError::type_error("Cannot mix BigInt and other types"));
                }
            }
            _ => None,
        };
        if let Some((a, b)) = bigints {
            let v = match op {
                Add => &*a + &*b,
                Sub => &*a - &*b,
                Mul => &*a * &*b,
                Div => bigint_div(&a, &b)?,
                Mod => bigint_rem(&a, &b)?,
                Pow => bigint_pow(&a, &b)?,
                BitAnd => &*a & &*b,
                BitOr => &*a | &*b,
                BitXor => &*a ^ &*b,
                Shl | Shr | UShr => {
                    use num_traits::ToPrimitive;
                    let shift = b.to_u32().ok_or_else(|| RunError::range_error("BigInt shift out of range"))?;
                    match op {
                        Shl => &*a << shift,
                        _ => &*a >> shift,
                    }
                }
            };
            return Ok(Value::BigInt(Rc::new(v)));
        }

        match op {
            Add => {
                let stringy = matches!(left, Value::Str(_) | Value::Ref(_)) || matches!(right, Value::Str(_) | Value::Ref(_));
                if stringy {
                    let a = left.to_display(self.heap, self.interner);
                    let b = right.to_display(self.heap, self.interner);
                    Ok(Value::str(format!("{a}{b}")))
                } else {
                    Ok(Value::Num(left.to_number(self.heap)? + right.to_number(self.heap)?))
                }
            }
            Sub => Ok(Value::Num(left.to_number(self.heap)? - right.to_number(self.heap)?)),
            Mul => Ok(Value::Num(left.to_number(self.heap)? * right.to_number(self.heap)?)),
            Div => Ok(Value::Num(left.to_number(self.heap)? / right.to_number(self.heap)?)),
            Mod => Ok(Value::Num(left.to_number(self.heap)? % right.to_number(self.heap)?)),
            Pow => Ok(Value::Num(left.to_number(self.heap)?.powf(right.to_number(self.heap)?))),
            BitAnd | BitOr | BitXor | Shl | Shr | UShr => {
                let a = crate::fold::to_int32(left.to_number(self.heap)?);
                let b = crate::fold::to_int32(right.to_number(self.heap)?);
                let v = match op {
                    BitAnd => f64::from(a & b),
                    BitOr => f64::from(a | b),
                    BitXor => f64::from(a ^ b),
                    Shl => f64::from(a.wrapping_shl(b as u32 & 31)),
                    Shr => f64::from(a.wrapping_shr(b as u32 & 31)),
                    UShr => f64::from((a as u32).wrapping_shr(b as u32 & 31)),
                    _ => unreachable!(),
                };
                Ok(Value::Num(v))
            }
        }
    }

    fn cmp_op(&mut self, op: CmpOp, left: &Value, right: &Value) -> RunResult<Value> {
        use std::cmp::Ordering;
        Ok(match op {
            CmpOp::StrictEq => Value::Bool(left.strict_eq(right)),
            CmpOp::StrictNe => Value::Bool(!left.strict_eq(right)),
            CmpOp::Eq => Value::Bool(left.loose_eq(right, self.heap)),
            CmpOp::Ne => Value::Bool(!left.loose_eq(right, self.heap)),
            CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
                let ord = left.compare_numeric(right, self.heap)?;
                Value::Bool(match (op, ord) {
                    (_, None) => false,
                    (CmpOp::Lt, Some(o)) => o == Ordering::Less,
                    (CmpOp::Le, Some(o)) => o != Ordering::Greater,
                    (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
                    (CmpOp::Ge, Some(o)) => o != Ordering::Less,
                    _ => unreachable!(),
                })
            }
            CmpOp::In => {
                let key = left.to_property_key(self.heap, self.interner);
                Value::Bool(self.has_property(right, &key)?)
            }
            CmpOp::InstanceOf => Value::Bool(self.instance_of(left, right)?),
        })
    }

    fn has_property(&mut self, object: &Value, key: &PropKey) -> RunResult<bool> {
        let Value::Ref(id) = object else {
            return Err(RunError::type_error("Cannot use 'in' operator on a non-object"));
        };
        match self.heap.get(*id) {
            HeapData::Object(_) => {
                let mut current = Some(*id);
                while let Some(cur) = current {
                    let HeapData::Object(obj) = self.heap.get(cur) else { break };
                    if obj.props.contains_key(key) {
                        return Ok(true);
                    }
                    current = obj.proto;
                }
                Ok(false)
            }
            HeapData::Array(arr) => {
                if let Some(index) = key.as_str().and_then(iterator::array_index) {
                    Ok(arr.get_index(index).is_some())
                } else if key.as_str() == Some("length") {
                    Ok(true)
                } else {
                    Ok(arr.extra.contains_key(key))
                }
            }
            _ => Ok(false),
        }
    }

    fn instance_of(&mut self, value: &Value, ctor: &Value) -> RunResult<bool> {
        match ctor {
            Value::Builtin(b) => Ok(builtins::builtin_instance_of(self.heap, value, *b)),
            Value::Ref(ctor_id) => {
                let HeapData::Closure(c) = self.heap.get(*ctor_id) else {
                    return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
                };
                let target = match c.props.get(&PropKey::Str("prototype".into())) {
                    Some(Property::Value(Value::Ref(p))) => *p,
                    _ => return Ok(false),
                };
                let Value::Ref(mut current) = value.clone() else {
                    return Ok(false);
                };
                loop {
                    let proto = match self.heap.get(current) {
                        HeapData::Object(obj) => obj.proto,
                        _ => None,
                    };
                    match proto {
                        Some(p) if p == target => return Ok(true),
                        Some(p) => current = p,
                        None => return Ok(false),
                    }
                }
            }
            _ => Err(RunError::type_error("Right-hand side of 'instanceof' is not callable")),
        }
    }

    // ==========================
    // Member access

    pub fn get_member(&mut self, value: &Value, key: &PropKey) -> RunResult<Value> {
        match value {
            Value::Str(s) => Ok(builtins::string_member(s, key)),
            Value::Builtin(b) => Ok(builtins::builtin_member(*b, key)),
            Value::Ref(id) => self.get_member_ref(*id, value, key),
            Value::Num(_) | Value::Bool(_) | Value::BigInt(_) | Value::Symbol(_) => {
                Ok(builtins::primitive_member(key))
            }
            Value::Undefined | Value::Null => Err(self.member_on_nullish(value, key)),
        }
    }

    fn get_member_ref(&mut self, id: HeapId, receiver: &Value, key: &PropKey) -> RunResult<Value> {
        enum Found {
            Value(Value),
            Getter(Value),
            Missing,
        }
        let found = match self.heap.get(id) {
            HeapData::Object(_) => {
                let mut current = Some(id);
                let mut found = Found::Missing;
                while let Some(cur) = current {
                    let HeapData::Object(obj) = self.heap.get(cur) else { break };
                    match obj.props.get(key) {
                        Some(Property::Value(v)) => {
                            found = Found::Value(v.clone());
                            break;
                        }
                        Some(Property::Accessor { get, .. }) => {
                            found = match get {
                                Some(g) => Found::Getter(g.clone()),
                                None => Found::Value(Value::Undefined),
                            };
                            break;
                        }
                        None => current = obj.proto,
                    }
                }
                found
            }
            HeapData::Array(arr) => {
                if let Some(index) = key.as_str().and_then(iterator::array_index) {
                    Found::Value(arr.get_index(index).cloned().unwrap_or(Value::Undefined))
                } else if key.as_str() == Some("length") {
                    Found::Value(Value::Num(f64::from(arr.length())))
                } else if let Some(Property::Value(v)) = arr.extra.get(key) {
                    Found::Value(v.clone())
                } else {
                    Found::Missing
                }
            }
            HeapData::Closure(c) => {
                if let Some(Property::Value(v)) = c.props.get(key) {
                    Found::Value(v.clone())
                } else if key.as_str() == Some("name") {
                    let name = c.def.name.map_or(String::new(), |n| self.interner.resolve(n).to_owned());
                    Found::Value(Value::str(name))
                } else if key.as_str() == Some("length") {
                    Found::Value(Value::Num(c.def.params.len() as f64))
                } else {
                    Found::Missing
                }
            }
            HeapData::HostFunc(f) => {
                if key.as_str() == Some("name") {
                    Found::Value(Value::Str(f.name.clone()))
                } else {
                    Found::Missing
                }
            }
            HeapData::Map(m) => {
                if key.as_str() == Some("size") {
                    Found::Value(Value::Num(m.entries.len() as f64))
                } else {
                    Found::Missing
                }
            }
            HeapData::Regex(r) => match key.as_str() {
                Some("source") => Found::Value(Value::Str(r.source.clone())),
                Some("flags") => Found::Value(Value::Str(r.flags.clone())),
                Some("lastIndex") => Found::Value(Value::Num(f64::from(r.last_index))),
                _ => Found::Missing,
            },
            _ => Found::Missing,
        };

        match found {
            Found::Value(v) => Ok(v),
            Found::Getter(g) => self.call_value(&g, receiver.clone(), &[]),
            Found::Missing => Ok(builtins::heap_method(self.heap, id, key)),
        }
    }

    pub fn set_member(&mut self, target: &Value, key: PropKey, value: Value) -> RunResult<()> {
        let Value::Ref(id) = target else {
            // Property writes on primitives are silently dropped.
            return Ok(());
        };
        // Find a setter anywhere on the chain first.
        if let HeapData::Object(_) = self.heap.get(*id) {
            let mut current = Some(*id);
            while let Some(cur) = current {
                let HeapData::Object(obj) = self.heap.get(cur) else { break };
                match obj.props.get(&key) {
                    Some(Property::Accessor { set, .. }) => {
                        let setter = set.clone();
                        return match setter {
                            Some(s) => {
                                self.call_value(&s, target.clone(), &[value])?;
                                Ok(())
                            }
                            None => Ok(()),
                        };
                    }
                    Some(Property::Value(_)) if cur == *id => break,
                    _ => current = obj.proto,
                }
            }
        }
        // Array length writes need a coercion against the heap before the
        // mutable borrow below.
        let array_length = if matches!(self.heap.get(*id), HeapData::Array(_)) && key.as_str() == Some("length") {
            let n = value.to_number(self.heap)?;
            if n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
                return Err(RunError::range_error("Invalid array length"));
            }
            Some(n as u32)
        } else {
            None
        };

        match self.heap.get_mut(*id) {
            HeapData::Object(obj) => {
                if obj.extensible || obj.props.contains_key(&key) {
                    obj.props.insert(key, Property::Value(value));
                }
                Ok(())
            }
            HeapData::Array(arr) => {
                if let Some(new_length) = array_length {
                    arr.set_length(new_length);
                } else if let Some(index) = key.as_str().and_then(iterator::array_index) {
                    arr.set_index(index, value);
                } else {
                    arr.extra.insert(key, Property::Value(value));
                }
                Ok(())
            }
            HeapData::Closure(c) => {
                c.props.insert(key, Property::Value(value));
                Ok(())
            }
            // Writes onto other built-in carriers are accepted and dropped.
            _ => Ok(()),
        }
    }

    // ==========================
    // Calls

    fn eval_call(&mut self, callee: &ExprLoc, args: &[ExprLoc], scope: ScopeId) -> RunResult<Value> {
        // super(..): invoke the base constructor with the current receiver.
        if matches!(callee.expr, Expr::Super) {
            let Some(parent) = self.scopes.parent_ctor(scope) else {
                return Err(RunError::syntax_error("'super' call outside a derived constructor"));
            };
            let this = self.scopes.this_value(scope);
            let args = self.eval_args(args, scope)?;
            self.call_closure(parent, this, &args)?;
            return Ok(Value::Undefined);
        }

        // Method call: capture the receiver.
        if let Expr::Member { object, prop, .. } = &callee.expr {
            // super.m(..): start resolution at the home object's prototype,
            // preserving the current receiver.
            if matches!(object.expr, Expr::Super) {
                let Some(home) = self.scopes.home_object(scope) else {
                    return Err(RunError::syntax_error("'super' is only valid inside methods"));
                };
                let key = self.member_key(prop, scope)?;
                let proto = match self.heap.get(home) {
                    HeapData::Object(obj) => obj.proto,
                    _ => None,
                };
                let method = match proto {
                    Some(p) => self.get_member(&Value::Ref(p), &key)?,
                    None => Value::Undefined,
                };
                let this = self.scopes.this_value(scope);
                let args = self.eval_args(args, scope)?;
                return self.call_value(&method, this, &args);
            }

            let receiver = self.eval_expr(object, scope)?;
            let key = self.member_key(prop, scope)?;
            if receiver.is_nullish() {
                return Err(self.member_on_nullish(&receiver, &key));
            }
            let func = self.get_member(&receiver, &key)?;
            let args = self.eval_args(args, scope)?;
            return self.call_value(&func, receiver, &args);
        }

        let func = self.eval_expr(callee, scope)?;
        let args = self.eval_args(args, scope)?;
        self.call_value(&func, Value::Undefined, &args)
    }

    pub fn eval_args(&mut self, args: &[ExprLoc], scope: ScopeId) -> RunResult<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if let Expr::Spread(inner) = &arg.expr {
                let iterable = self.eval_expr(inner, scope)?;
                let iter = self.get_iterator(&iterable)?;
                loop {
                    let (done, value) = self.iterator_next(&iter)?;
                    if done {
                        break;
                    }
                    out.push(value);
                }
            } else {
                out.push(self.eval_expr(arg, scope)?);
            }
        }
        Ok(out)
    }

    pub fn call_value(&mut self, func: &Value, this: Value, args: &[Value]) -> RunResult<Value> {
        self.check_deadline()?;
        match func {
            Value::Builtin(b) => builtins::call_builtin(self, *b, &this, args),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Closure(_) => self.call_closure(*id, this, args),
                HeapData::HostFunc(_) => self.call_host(*id, &this, args),
                HeapData::Resolver(_) => self.call_resolver(*id, args),
                _ => Err(self.not_a_function(func)),
            },
            _ => Err(self.not_a_function(func)),
        }
    }

    fn not_a_function(&self, value: &Value) -> RunError {
        RunError::type_error(format!(
            "{} is not a function",
            value.to_display(self.heap, self.interner)
        ))
    }

    pub fn call_closure(&mut self, id: HeapId, this: Value, args: &[Value]) -> RunResult<Value> {
        let HeapData::Closure(c) = self.heap.get(id) else {
            return Err(RunError::type_error("not a function"));
        };
        let def = c.def.clone();
        let env = c.env;
        let home = c.home_object;
        let parent_ctor = c.parent_ctor;

        if self.depth >= self.max_depth {
            return Err(RunError::range_error("Maximum call stack size exceeded"));
        }

        // A generator call builds the suspended object instead of running.
        if def.kind == FuncKind::Generator {
            let scope = self.scopes.new_scope(env, FrameKind::Function { this, home, parent_ctor });
            self.bind_params(&def, args, scope);
            let state = GenState::new(def, scope);
            return Ok(Value::Ref(self.heap.alloc(HeapData::Generator(state))));
        }

        let frame = if def.kind == FuncKind::Arrow {
            FrameKind::Block
        } else {
            FrameKind::Function { this, home, parent_ctor }
        };
        let scope = self.scopes.new_scope(env, frame);
        self.bind_params(&def, args, scope);
        self.hoist(&def.body, scope)?;

        self.depth += 1;
        let result = (|| {
            for stmt in &def.body {
                match self.exec_stmt(stmt, scope)? {
                    Completion::Normal(_) => {}
                    Completion::Return(v) => return Ok(v),
                    Completion::Break(_) | Completion::Continue(_) => {
                        return Err(RunError::syntax_error("Illegal break or continue"));
                    }
                }
            }
            Ok(Value::Undefined)
        })();
        self.depth -= 1;
        result
    }

    fn bind_params(&mut self, def: &FuncDef, args: &[Value], scope: ScopeId) {
        let mut arg_idx = 0usize;
        for param in &def.params {
            if param.rest {
                let rest: Vec<Value> = args.get(arg_idx..).unwrap_or_default().to_vec();
                let rest = Value::Ref(self.heap.alloc_array(rest));
                self.scopes.declare_function(scope, param.name, rest);
                break;
            }
            let value = args.get(arg_idx).cloned().unwrap_or(Value::Undefined);
            self.scopes.declare_function(scope, param.name, value);
            arg_idx += 1;
        }
    }

    fn call_host(&mut self, id: HeapId, this: &Value, args: &[Value]) -> RunResult<Value> {
        let HeapData::HostFunc(data) = self.heap.get(id) else {
            return Err(RunError::type_error("not a host function"));
        };
        let index = data.index;
        let host_this = crate::host::value_to_host(self.heap, self.interner, this);
        let host_args: Vec<crate::host::HostValue> = args
            .iter()
            .map(|a| crate::host::value_to_host(self.heap, self.interner, a))
            .collect();
        let result = self.host.call(index, &host_this, &host_args);
        match result {
            Ok(v) => Ok(crate::host::host_to_value(self.heap, &v)),
            // Host exceptions propagate as script errors with the host's
            // message.
            Err(message) => Err(RunError::simple(ExcKind::Error, message)),
        }
    }

    fn call_resolver(&mut self, id: HeapId, args: &[Value]) -> RunResult<Value> {
        let HeapData::Resolver(resolver) = self.heap.get(id) else {
            return Err(RunError::type_error("not a resolver"));
        };
        let target = resolver.target;
        let kind = resolver.kind.clone();
        let arg = args.first().cloned().unwrap_or(Value::Undefined);
        match kind {
            ResolverKind::Resolve => promise::resolve(self.heap, self.queue, target, arg),
            ResolverKind::Reject => promise::reject(self.heap, self.queue, target, arg),
            ResolverKind::AllElement { index, state } => {
                if let Some(results) = promise::all_element_settled(self.heap, state, index, arg) {
                    promise::resolve(self.heap, self.queue, target, results);
                }
            }
        }
        Ok(Value::Undefined)
    }

    // ==========================
    // Construction and classes

    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> RunResult<Value> {
        match callee {
            Value::Builtin(b) => builtins::construct_builtin(self, *b, args),
            Value::Ref(id) => {
                let HeapData::Closure(c) = self.heap.get(*id) else {
                    return Err(self.not_a_function(callee));
                };
                if matches!(c.def.kind, FuncKind::Arrow | FuncKind::Generator) {
                    return Err(RunError::type_error(format!(
                        "{} is not a constructor",
                        callee.to_display(self.heap, self.interner)
                    )));
                }
                let proto = match c.props.get(&PropKey::Str("prototype".into())) {
                    Some(Property::Value(Value::Ref(p))) => Some(*p),
                    _ => None,
                };
                let obj = self.heap.alloc_object(proto);
                let result = self.call_closure(*id, Value::Ref(obj), args)?;
                // An object result replaces the allocated receiver.
                if result.is_object_like(self.heap) {
                    Ok(result)
                } else {
                    Ok(Value::Ref(obj))
                }
            }
            _ => Err(self.not_a_function(callee)),
        }
    }

    pub fn eval_class(&mut self, def: &ClassDef, scope: ScopeId) -> RunResult<Value> {
        // Resolve the parent first: its prototype seeds the chain.
        let parent = match &def.parent {
            Some(parent_expr) => {
                let parent = self.eval_expr(parent_expr, scope)?;
                let Value::Ref(parent_id) = parent else {
                    return Err(RunError::type_error("Class extends value is not a constructor"));
                };
                let HeapData::Closure(pc) = self.heap.get(parent_id) else {
                    return Err(RunError::type_error("Class extends value is not a constructor"));
                };
                let parent_proto = match pc.props.get(&PropKey::Str("prototype".into())) {
                    Some(Property::Value(Value::Ref(p))) => Some(*p),
                    _ => None,
                };
                Some((parent_id, parent_proto))
            }
            None => None,
        };

        let proto_id = self.heap.alloc_object(parent.and_then(|(_, p)| p));

        let ctor_def = match &def.ctor {
            Some(c) => c.clone(),
            None => Rc::new(synthesize_default_ctor(self.interner, def, parent.is_some())),
        };
        let ctor_value = self.create_closure_raw(
            &ctor_def,
            scope,
            Some(proto_id),
            parent.map(|(id, _)| id),
            Some(proto_id),
        );
        let Value::Ref(ctor_id) = ctor_value else {
            unreachable!("closures are heap values");
        };
        self.heap
            .expect_object_mut(proto_id)
            .insert(PropKey::Str("constructor".into()), Value::Ref(ctor_id));

        for member in &def.members {
            let key = self.prop_key(&member.key, scope)?;
            self.install_class_member(member, key, ctor_id, proto_id, scope)?;
        }
        Ok(Value::Ref(ctor_id))
    }

    fn install_class_member(
        &mut self,
        member: &ClassMember,
        key: PropKey,
        ctor_id: HeapId,
        proto_id: HeapId,
        scope: ScopeId,
    ) -> RunResult<()> {
        let home = if member.is_static { ctor_id } else { proto_id };
        let func = self.create_closure(&member.func, scope, Some(home), None);
        if member.is_static {
            let HeapData::Closure(c) = self.heap.get_mut(ctor_id) else {
                unreachable!("constructor is a closure");
            };
            match member.kind {
                ClassMemberKind::Method => {
                    c.props.insert(key, Property::Value(func));
                }
                ClassMemberKind::Getter => merge_accessor_map(&mut c.props, key, Some(func), None),
                ClassMemberKind::Setter => merge_accessor_map(&mut c.props, key, None, Some(func)),
            }
        } else {
            let obj = self.heap.expect_object_mut(proto_id);
            match member.kind {
                ClassMemberKind::Method => obj.insert(key, func),
                ClassMemberKind::Getter => merge_accessor(obj, key, Some(func), None),
                ClassMemberKind::Setter => merge_accessor(obj, key, None, Some(func)),
            }
        }
        Ok(())
    }

    /// Creates a function value. Non-arrow, non-method functions get an
    /// eagerly created `prototype` object carrying `constructor`.
    pub fn create_closure(
        &mut self,
        def: &Rc<FuncDef>,
        scope: ScopeId,
        home: Option<HeapId>,
        parent_ctor: Option<HeapId>,
    ) -> Value {
        self.create_closure_raw(def, scope, home, parent_ctor, None)
    }

    fn create_closure_raw(
        &mut self,
        def: &Rc<FuncDef>,
        scope: ScopeId,
        home: Option<HeapId>,
        parent_ctor: Option<HeapId>,
        prototype: Option<HeapId>,
    ) -> Value {
        let closure = Closure {
            def: def.clone(),
            env: scope,
            home_object: home,
            parent_ctor,
            props: Default::default(),
        };
        let id = self.heap.alloc(HeapData::Closure(closure));

        let needs_prototype = matches!(def.kind, FuncKind::Plain | FuncKind::Ctor | FuncKind::Generator);
        let proto = match prototype {
            Some(p) => Some(p),
            None if needs_prototype => {
                let p = self.heap.alloc_object(None);
                self.heap
                    .expect_object_mut(p)
                    .insert(PropKey::Str("constructor".into()), Value::Ref(id));
                Some(p)
            }
            None => None,
        };
        if let Some(p) = proto
            && let HeapData::Closure(c) = self.heap.get_mut(id)
        {
            c.props.insert(PropKey::Str("prototype".into()), Property::Value(Value::Ref(p)));
        }
        Value::Ref(id)
    }

    // ==========================
    // Optional chains

    fn eval_chain(&mut self, expr: &ExprLoc, scope: ScopeId) -> RunResult<Option<ChainVal>> {
        match &expr.expr {
            Expr::Member { object, prop, optional } => {
                let Some(base) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if base.value.is_nullish() {
                    if *optional {
                        return Ok(None);
                    }
                    let key = self.member_key(prop, scope)?;
                    return Err(self.member_on_nullish(&base.value, &key));
                }
                let key = self.member_key(prop, scope)?;
                let value = self.get_member(&base.value, &key)?;
                Ok(Some(ChainVal {
                    receiver: base.value,
                    value,
                }))
            }
            Expr::Call { callee, args, optional } => {
                let Some(target) = self.eval_chain(callee, scope)? else {
                    return Ok(None);
                };
                if target.value.is_nullish() {
                    if *optional {
                        return Ok(None);
                    }
                    return Err(self.not_a_function(&target.value));
                }
                let args = self.eval_args(args, scope)?;
                let value = self.call_value(&target.value, target.receiver, &args)?;
                Ok(Some(ChainVal {
                    receiver: Value::Undefined,
                    value,
                }))
            }
            _ => {
                let value = self.eval_expr(expr, scope)?;
                Ok(Some(ChainVal {
                    receiver: Value::Undefined,
                    value,
                }))
            }
        }
    }

    // ==========================
    // Iteration plumbing (delegates to the iterator module)

    pub fn get_iterator(&mut self, value: &Value) -> RunResult<Value> {
        iterator::get_iterator(self, value)
    }

    pub fn iterator_next(&mut self, iter: &Value) -> RunResult<(bool, Value)> {
        iterator::iterator_next(self, iter)
    }

    pub fn iterator_next_with(&mut self, iter: &Value, arg: Value) -> RunResult<(bool, Value)> {
        iterator::iterator_next_with(self, iter, arg)
    }

    pub fn iterator_throw(&mut self, iter: &Value, error: Value) -> RunResult<Option<(bool, Value)>> {
        iterator::iterator_throw(self, iter, error)
    }

    pub fn iterator_return(&mut self, iter: &Value, value: Value) -> RunResult<()> {
        iterator::iterator_return(self, iter, value)
    }

    /// String keys visible to `for..in`: own keys plus the prototype chain,
    /// in insertion order, symbols excluded.
    pub fn enumerable_keys(&self, value: &Value) -> Vec<JsStr> {
        let mut keys: Vec<JsStr> = Vec::new();
        let mut seen: SmallVec<[JsStr; 8]> = SmallVec::new();
        let Value::Ref(id) = value else {
            return keys;
        };
        match self.heap.get(*id) {
            HeapData::Array(arr) => {
                for index in arr.indices() {
                    keys.push(number_to_string(f64::from(index)).into());
                }
                for key in arr.extra.keys() {
                    if let PropKey::Str(s) = key {
                        keys.push(s.clone());
                    }
                }
            }
            HeapData::Object(_) => {
                let mut current = Some(*id);
                while let Some(cur) = current {
                    let HeapData::Object(obj) = self.heap.get(cur) else { break };
                    for key in obj.props.keys() {
                        if let PropKey::Str(s) = key
                            && !seen.iter().any(|k| k == s)
                        {
                            seen.push(s.clone());
                            keys.push(s.clone());
                        }
                    }
                    current = obj.proto;
                }
            }
            _ => {}
        }
        keys
    }

    // ==========================
    // Error materialization

    /// Converts a catchable error into the script value a `catch` binds.
    pub fn thrown_to_value(&mut self, err: RunError) -> RunResult<Value> {
        match err {
            RunError::Throw(Thrown::Value(v)) => Ok(v),
            RunError::Throw(Thrown::Simple(simple)) => Ok(self.error_value(&simple)),
            fatal => Err(fatal),
        }
    }

    /// Allocates an error object with `name` and `message` properties.
    pub fn error_value(&mut self, simple: &SimpleError) -> Value {
        let id = self.heap.alloc_object(None);
        let obj = self.heap.expect_object_mut(id);
        obj.insert(PropKey::Str("name".into()), Value::str(simple.kind.to_string()));
        obj.insert(PropKey::Str("message".into()), Value::str(simple.message.clone()));
        Value::Ref(id)
    }

    // ==========================
    // Microtasks

    /// Runs one queued promise callback.
    pub fn run_microtask(&mut self, task: Microtask) -> RunResult<()> {
        match task {
            Microtask::Reaction {
                kind,
                handler,
                arg,
                derived,
            } => match handler {
                Some(handler) => {
                    let outcome = self.call_value(&handler, Value::Undefined, &[arg]);
                    match outcome {
                        Ok(v) => {
                            if let Some(derived) = derived {
                                promise::resolve(self.heap, self.queue, derived, v);
                            }
                            Ok(())
                        }
                        Err(err) if err.is_catchable() => {
                            let value = self.thrown_to_value(err)?;
                            if let Some(derived) = derived {
                                promise::reject(self.heap, self.queue, derived, value);
                            }
                            Ok(())
                        }
                        Err(fatal) => Err(fatal),
                    }
                }
                None => {
                    if let Some(derived) = derived {
                        match kind {
                            ReactionKind::Fulfill => promise::resolve(self.heap, self.queue, derived, arg),
                            ReactionKind::Reject => promise::reject(self.heap, self.queue, derived, arg),
                        }
                    }
                    Ok(())
                }
            },
            Microtask::AdoptThenable {
                thenable,
                then_fn,
                target,
            } => {
                let resolve = Value::Ref(self.heap.alloc(HeapData::Resolver(crate::heap::Resolver {
                    target,
                    kind: ResolverKind::Resolve,
                })));
                let reject = Value::Ref(self.heap.alloc(HeapData::Resolver(crate::heap::Resolver {
                    target,
                    kind: ResolverKind::Reject,
                })));
                match self.call_value(&then_fn, thenable, &[resolve, reject]) {
                    Ok(_) => Ok(()),
                    Err(err) if err.is_catchable() => {
                        let value = self.thrown_to_value(err)?;
                        promise::reject(self.heap, self.queue, target, value);
                        Ok(())
                    }
                    Err(fatal) => Err(fatal),
                }
            }
        }
    }

    /// Publishes a best-effort variables snapshot of the global frame onto
    /// the debug stream.
    pub fn publish_debug_snapshot(&mut self, scope: ScopeId) {
        let bindings = self.scopes.own_bindings(scope);
        let variables = bindings
            .into_iter()
            .map(|(sym, value)| {
                (
                    self.interner.resolve(sym).to_owned(),
                    crate::host::value_to_host(self.heap, self.interner, &value),
                )
            })
            .collect();
        self.debug.push(crate::host::DebugMessage { variables });
    }
}

struct ChainVal {
    receiver: Value,
    value: Value,
}

fn merge_accessor(obj: &mut JsObject, key: PropKey, get: Option<Value>, set: Option<Value>) {
    merge_accessor_map(&mut obj.props, key, get, set);
}

fn merge_accessor_map(
    props: &mut indexmap::IndexMap<PropKey, Property, ahash::RandomState>,
    key: PropKey,
    get: Option<Value>,
    set: Option<Value>,
) {
    match props.get_mut(&key) {
        Some(Property::Accessor { get: g, set: s }) => {
            if get.is_some() {
                *g = get;
            }
            if set.is_some() {
                *s = set;
            }
        }
        _ => {
            props.insert(key, Property::Accessor { get, set });
        }
    }
}

/// Builds the constructor used when a class body declares none: a derived
/// class forwards its arguments to the base constructor.
fn synthesize_default_ctor(interner: &mut Interner, def: &ClassDef, derived: bool) -> FuncDef {
    let span = def.span;
    let body = if derived {
        let args = interner.intern("__ctorArgs");
        let super_call = ExprLoc::new(
            span,
            Expr::Call {
                callee: Box::new(ExprLoc::new(span, Expr::Super)),
                args: vec![ExprLoc::new(
                    span,
                    Expr::Spread(Box::new(ExprLoc::ident(args, span))),
                )],
                optional: false,
            },
        );
        vec![Stmt::Expr(super_call)]
    } else {
        Vec::new()
    };
    let params = if derived {
        vec![crate::ast::Param {
            name: interner.intern("__ctorArgs"),
            rest: true,
        }]
    } else {
        Vec::new()
    };
    FuncDef {
        name: def.name,
        params,
        body,
        kind: FuncKind::Ctor,
        span,
    }
}
