//! Public interface for embedding the interpreter.
//!
//! An [`Engine`] owns the interner, heap, scope arena, and both scheduler
//! queues. `evaluate` parses, transforms, and executes source synchronously;
//! `run` additionally drains the event loop to idle. Host functions, host
//! tasks, and the exception/debug streams make up the rest of the embedding
//! surface.
//!
//! # Example
//! ```
//! use kairo::{Engine, HostValue};
//!
//! let mut engine = Engine::new();
//! let result = engine.run("1 + 2").unwrap();
//! assert_eq!(result, HostValue::Number(3.0));
//! ```

use std::time::{Duration, Instant};

use crate::{
    builtins,
    cps::cps_program,
    eval::Interp,
    exception::{EngineError, Exception, RunError, Thrown},
    fold::fold,
    heap::{Heap, HeapData, HeapStats, HostFuncData, PropKey},
    host::{DebugMessage, ExceptionEvent, HostRegistry, HostValue},
    intern::Interner,
    lower::lower_program,
    parse,
    prepare::prepare,
    promise::MicrotaskQueue,
    scheduler::TaskQueue,
    scope::{Scopes, GLOBAL_SCOPE},
    value::Value,
};

/// Resource limits for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Total execution timeout covering one `evaluate`/`run` call, including
    /// the drain phase. `None` runs without a deadline.
    pub timeout: Option<Duration>,
    /// Maximum script call depth before a RangeError is raised.
    pub max_stack_depth: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            timeout: None,
            max_stack_depth: 256,
        }
    }
}

/// An embeddable interpreter instance.
///
/// Engines are independent: each owns its symbol table, heap, and global
/// scope, and nothing is shared between instances. An engine is not safe
/// for concurrent use from multiple threads.
pub struct Engine {
    interner: Interner,
    heap: Heap,
    scopes: Scopes,
    queue: MicrotaskQueue,
    tasks: TaskQueue,
    host: HostRegistry,
    debug: Vec<DebugMessage>,
    exceptions: Vec<ExceptionEvent>,
    limits: EngineLimits,
    disposed: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_limits(EngineLimits::default())
    }

    pub fn with_limits(limits: EngineLimits) -> Self {
        let mut interner = Interner::new();
        let mut heap = Heap::new();
        let mut scopes = Scopes::new();
        builtins::install_globals(&mut heap, &mut scopes, &mut interner);
        Self {
            interner,
            heap,
            scopes,
            queue: MicrotaskQueue::default(),
            tasks: TaskQueue::default(),
            host: HostRegistry::default(),
            debug: Vec::new(),
            exceptions: Vec::new(),
            limits,
            disposed: false,
        }
    }

    fn check_disposed(&self) -> Result<(), EngineError> {
        if self.disposed {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.limits.timeout.map(|t| Instant::now() + t)
    }

    /// Parses and transforms source into the evaluator-ready AST.
    fn compile(&mut self, source: &str) -> Result<Vec<crate::ast::Stmt>, EngineError> {
        let tree = parse::parse(source, &mut self.interner)?;
        let tree = fold(tree);
        let stmts = prepare(&tree)?;
        let stmts = lower_program(stmts, &mut self.interner)?;
        let stmts = cps_program(stmts, &mut self.interner)?;
        Ok(stmts)
    }

    /// Parses, transforms, and evaluates to completion; returns the value of
    /// the last expression statement (or undefined). Does not drain the
    /// event loop.
    pub fn evaluate(&mut self, source: &str) -> Result<HostValue, EngineError> {
        self.check_disposed()?;
        let deadline = self.deadline();
        self.evaluate_with_deadline(source, deadline)
    }

    fn evaluate_with_deadline(&mut self, source: &str, deadline: Option<Instant>) -> Result<HostValue, EngineError> {
        let stmts = self.compile(source)?;
        let max_depth = self.limits.max_stack_depth;
        let mut interp = Interp::new(
            &mut self.heap,
            &mut self.scopes,
            &mut self.interner,
            &mut self.queue,
            &mut self.host,
            &mut self.debug,
            deadline,
            max_depth,
        );
        match interp.exec_program(&stmts, GLOBAL_SCOPE) {
            Ok(value) => {
                // Best-effort variables snapshot for debugging tools.
                interp.publish_debug_snapshot(GLOBAL_SCOPE);
                Ok(crate::host::value_to_host(&self.heap, &self.interner, &value))
            }
            Err(err) => Err(self.engine_error(err)),
        }
    }

    /// `evaluate` followed by an exhaustive event-loop drain. After a normal
    /// return both queues are empty.
    pub fn run(&mut self, source: &str) -> Result<HostValue, EngineError> {
        self.check_disposed()?;
        let deadline = self.deadline();
        let completion = self.evaluate_with_deadline(source, deadline)?;
        self.drain(deadline)?;
        Ok(completion)
    }

    /// Drives pending microtasks and host tasks until both queues are idle.
    /// The microtask queue always drains fully before the next host task.
    fn drain(&mut self, deadline: Option<Instant>) -> Result<(), EngineError> {
        loop {
            self.drain_microtasks(deadline)?;

            // The deadline is honored between tasks: the task in flight
            // finishes, further tasks are abandoned.
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(EngineError::Timeout);
            }

            let Some(task) = self.tasks.pop() else { break };
            if self.disposed {
                // Cancellation: remaining tasks are discarded silently.
                self.tasks.clear();
                break;
            }
            task(self);
        }

        // Idle: rejected promises that never acquired a handler surface on
        // the exception stream.
        for (_, value) in self.queue.take_unhandled(&self.heap) {
            let host_value = crate::host::value_to_host(&self.heap, &self.interner, &value);
            self.exceptions.push(ExceptionEvent {
                message: host_value.to_string(),
                value: host_value,
                context: "unhandled promise rejection".to_owned(),
            });
        }
        Ok(())
    }

    fn drain_microtasks(&mut self, deadline: Option<Instant>) -> Result<(), EngineError> {
        loop {
            let Some(task) = self.queue.pop() else { return Ok(()) };
            let max_depth = self.limits.max_stack_depth;
            let mut interp = Interp::new(
                &mut self.heap,
                &mut self.scopes,
                &mut self.interner,
                &mut self.queue,
                &mut self.host,
                &mut self.debug,
                deadline,
                max_depth,
            );
            match interp.run_microtask(task) {
                Ok(()) => {}
                Err(RunError::Timeout) => return Err(EngineError::Timeout),
                Err(RunError::Disposed) => return Err(EngineError::Disposed),
                Err(err) => {
                    // A throw escaping a microtask terminates that task and
                    // surfaces on the exception stream.
                    let exception = self.exception_from(err);
                    self.exceptions.push(ExceptionEvent {
                        message: exception.to_string(),
                        value: exception.value,
                        context: "microtask".to_owned(),
                    });
                }
            }
        }
    }

    /// Installs a host callable as a global function.
    pub fn set_global_function(
        &mut self,
        name: &str,
        callable: impl Fn(&HostValue, &[HostValue]) -> Result<HostValue, String> + 'static,
    ) -> Result<(), EngineError> {
        self.check_disposed()?;
        let index = self.host.register(Box::new(callable));
        let func = self.heap.alloc(HeapData::HostFunc(HostFuncData {
            index,
            name: name.into(),
        }));
        let sym = self.interner.intern(name);
        self.scopes.declare_function(GLOBAL_SCOPE, sym, Value::Ref(func));
        Ok(())
    }

    /// Enqueues a host task. Tasks run in FIFO order during `run`'s drain;
    /// tasks scheduled while one runs join the tail of the same drain.
    pub fn schedule_task(&mut self, task: impl FnOnce(&mut Engine) + 'static) -> Result<(), EngineError> {
        self.check_disposed()?;
        self.tasks.push(Box::new(task));
        Ok(())
    }

    /// Drains the unhandled exception/rejection stream.
    pub fn exceptions(&mut self) -> Vec<ExceptionEvent> {
        std::mem::take(&mut self.exceptions)
    }

    /// Drains the best-effort debug snapshot stream.
    pub fn debug_messages(&mut self) -> Vec<DebugMessage> {
        std::mem::take(&mut self.debug)
    }

    /// Cancels the scheduler and marks the engine unusable. Pending tasks
    /// are discarded without running. Idempotent.
    pub fn dispose(&mut self) {
        self.tasks.clear();
        self.disposed = true;
    }

    /// Whether both scheduler queues are empty.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.tasks.is_empty()
    }

    /// Snapshot of heap occupancy, for embedder diagnostics.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Converts an internal error into the embedder-visible form.
    fn engine_error(&mut self, err: RunError) -> EngineError {
        match err {
            RunError::Timeout => EngineError::Timeout,
            RunError::Disposed => EngineError::Disposed,
            throw => EngineError::Script(self.exception_from(throw)),
        }
    }

    /// Builds the public exception from a thrown error, extracting `name`
    /// and `message` from error objects.
    fn exception_from(&mut self, err: RunError) -> Exception {
        let value = match err {
            RunError::Throw(Thrown::Value(v)) => v,
            RunError::Throw(Thrown::Simple(simple)) => {
                return Exception {
                    name: simple.kind.to_string(),
                    message: simple.message.clone(),
                    value: HostValue::Error {
                        name: simple.kind.to_string(),
                        message: simple.message,
                    },
                };
            }
            RunError::Timeout | RunError::Disposed => {
                return Exception {
                    name: "Error".to_owned(),
                    message: "execution interrupted".to_owned(),
                    value: HostValue::Undefined,
                };
            }
        };

        let (name, message) = match &value {
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Object(obj) => {
                    let name = obj
                        .get_plain(&PropKey::Str("name".into()))
                        .map(|v| v.to_display(&self.heap, &self.interner));
                    let message = obj
                        .get_plain(&PropKey::Str("message".into()))
                        .map(|v| v.to_display(&self.heap, &self.interner));
                    match (name, message) {
                        (Some(name), Some(message)) => (name, message),
                        _ => ("Error".to_owned(), value.to_display(&self.heap, &self.interner)),
                    }
                }
                _ => ("Error".to_owned(), value.to_display(&self.heap, &self.interner)),
            },
            other => ("Error".to_owned(), other.to_display(&self.heap, &self.interner)),
        };
        Exception {
            name,
            message,
            value: crate::host::value_to_host(&self.heap, &self.interner, &value),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("disposed", &self.disposed)
            .field("pending_exceptions", &self.exceptions.len())
            .field("heap", &self.heap.stats().total_slots)
            .finish()
    }
}
