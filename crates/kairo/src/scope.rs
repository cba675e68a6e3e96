//! Lexical environments: block, function, and global frames.
//!
//! Frames live in a central arena and reference each other by index, the
//! same layout the evaluator uses for heap values. Closures capture the
//! frame index, not a snapshot, so assignments through a closure are visible
//! everywhere the frame is reachable. Frames are never freed individually;
//! the arena drops with the engine.

use ahash::AHashMap;

use crate::{
    ast::DeclKind,
    exception::{RunError, RunResult},
    intern::{Interner, Symbol},
    value::Value,
};

/// Index of a frame in the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(u32);

/// The global frame is always index 0.
pub(crate) const GLOBAL_SCOPE: ScopeId = ScopeId(0);

#[derive(Debug, Clone)]
pub(crate) enum FrameKind {
    Global,
    /// A function activation; carries the `this` binding for the call plus
    /// the method's home object and the base constructor used by `super`.
    /// Arrow functions do not create one of these for `this` purposes: they
    /// create a `Block`-kind frame so `this` lookup keeps walking outward.
    Function {
        this: Value,
        home: Option<crate::heap::HeapId>,
        parent_ctor: Option<crate::heap::HeapId>,
    },
    Block,
}

impl FrameKind {
    /// A plain function activation with no `super` context.
    pub fn function(this: Value) -> Self {
        Self::Function {
            this,
            home: None,
            parent_ctor: None,
        }
    }
}

/// A single binding cell.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub kind: DeclKind,
    /// `let`/`const` cells start uninitialized; reading one raises a
    /// temporal-dead-zone error until the declaration executes.
    pub initialized: bool,
    pub value: Value,
}

#[derive(Debug)]
struct Frame {
    parent: Option<ScopeId>,
    kind: FrameKind,
    bindings: AHashMap<Symbol, Binding>,
}

/// Storage for all frames during execution.
#[derive(Debug)]
pub(crate) struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    /// Creates the arena with the global frame at index 0.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                parent: None,
                kind: FrameKind::Global,
                bindings: AHashMap::new(),
            }],
        }
    }

    pub fn new_scope(&mut self, parent: ScopeId, kind: FrameKind) -> ScopeId {
        let id = ScopeId(u32::try_from(self.frames.len()).expect("scope overflow"));
        self.frames.push(Frame {
            parent: Some(parent),
            kind,
            bindings: AHashMap::new(),
        });
        id
    }

    fn frame(&self, id: ScopeId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    fn frame_mut(&mut self, id: ScopeId) -> &mut Frame {
        &mut self.frames[id.0 as usize]
    }

    /// Declares a `let`/`const` binding in the given frame. The cell starts
    /// uninitialized (temporal dead zone) unless a value is supplied.
    pub fn declare_lexical(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        kind: DeclKind,
        interner: &Interner,
    ) -> RunResult<()> {
        let frame = self.frame_mut(scope);
        if frame.bindings.contains_key(&name) {
            return Err(RunError::syntax_error(format!(
                "Identifier '{}' has already been declared",
                interner.resolve(name)
            )));
        }
        frame.bindings.insert(
            name,
            Binding {
                kind,
                initialized: false,
                value: Value::Undefined,
            },
        );
        Ok(())
    }

    /// Initializes a previously declared lexical binding. An undeclared name
    /// is declared on the spot (the generator stepper enters some blocks
    /// without a separate hoisting pass).
    pub fn initialize(&mut self, scope: ScopeId, name: Symbol, value: Value) {
        let frame = self.frame_mut(scope);
        match frame.bindings.get_mut(&name) {
            Some(binding) => {
                binding.value = value;
                binding.initialized = true;
            }
            None => {
                frame.bindings.insert(
                    name,
                    Binding {
                        kind: DeclKind::Let,
                        initialized: true,
                        value,
                    },
                );
            }
        }
    }

    /// Declares (or re-uses) a `var` binding, hoisted to the nearest function
    /// or global frame. Hoisted cells read as undefined before assignment.
    pub fn declare_var(&mut self, scope: ScopeId, name: Symbol, value: Option<Value>) {
        let target = self.hoist_target(scope);
        let frame = self.frame_mut(target);
        match frame.bindings.get_mut(&name) {
            Some(binding) => {
                if let Some(value) = value {
                    binding.value = value;
                    binding.initialized = true;
                }
            }
            None => {
                frame.bindings.insert(
                    name,
                    Binding {
                        kind: DeclKind::Var,
                        initialized: true,
                        value: value.unwrap_or(Value::Undefined),
                    },
                );
            }
        }
    }

    /// The nearest enclosing function or global frame, where `var` and
    /// function declarations land.
    pub fn hoist_target(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        loop {
            let frame = self.frame(current);
            match frame.kind {
                FrameKind::Global | FrameKind::Function { .. } => return current,
                FrameKind::Block => current = frame.parent.expect("block frame without parent"),
            }
        }
    }

    /// Reads an identifier, walking the chain from innermost to global.
    pub fn get(&self, scope: ScopeId, name: Symbol, interner: &Interner) -> RunResult<Value> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let Some(binding) = frame.bindings.get(&name) {
                if !binding.initialized {
                    return Err(RunError::reference_error(format!(
                        "Cannot access '{}' before initialization",
                        interner.resolve(name)
                    )));
                }
                return Ok(binding.value.clone());
            }
            current = frame.parent;
        }
        Err(RunError::reference_error(format!(
            "{} is not defined",
            interner.resolve(name)
        )))
    }

    /// Whether the identifier resolves anywhere on the chain. `typeof` uses
    /// this to avoid raising on never-declared names.
    pub fn is_declared(&self, scope: ScopeId, name: Symbol) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.frame(id);
            if frame.bindings.contains_key(&name) {
                return true;
            }
            current = frame.parent;
        }
        false
    }

    /// Writes an identifier. Walks to the owning frame; writing to an
    /// undeclared identifier creates a global binding (non-strict semantics).
    pub fn set(&mut self, scope: ScopeId, name: Symbol, value: Value, interner: &Interner) -> RunResult<()> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.frame_mut(id);
            if let Some(binding) = frame.bindings.get_mut(&name) {
                if binding.kind == DeclKind::Const && binding.initialized {
                    return Err(RunError::type_error("Assignment to constant variable."));
                }
                if !binding.initialized && binding.kind != DeclKind::Var {
                    return Err(RunError::reference_error(format!(
                        "Cannot access '{}' before initialization",
                        interner.resolve(name)
                    )));
                }
                binding.value = value;
                return Ok(());
            }
            current = self.frame(id).parent;
        }
        // Implicit global.
        self.frame_mut(GLOBAL_SCOPE).bindings.insert(
            name,
            Binding {
                kind: DeclKind::Var,
                initialized: true,
                value,
            },
        );
        Ok(())
    }

    /// The `this` value for code running in `scope`: the nearest function
    /// frame's binding, or undefined at global scope. Arrow-function frames
    /// are `Block`-kind, so they transparently inherit the outer `this`.
    pub fn this_value(&self, scope: ScopeId) -> Value {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let FrameKind::Function { this, .. } = &frame.kind {
                return this.clone();
            }
            current = frame.parent;
        }
        Value::Undefined
    }

    /// The home object of the nearest enclosing method, for `super.m` lookup.
    pub fn home_object(&self, scope: ScopeId) -> Option<crate::heap::HeapId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let FrameKind::Function { home, .. } = &frame.kind {
                return *home;
            }
            current = frame.parent;
        }
        None
    }

    /// The base-class constructor of the nearest enclosing constructor, for
    /// `super(..)` calls.
    pub fn parent_ctor(&self, scope: ScopeId) -> Option<crate::heap::HeapId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let FrameKind::Function { parent_ctor, .. } = &frame.kind {
                return *parent_ctor;
            }
            current = frame.parent;
        }
        None
    }

    /// Installs a function declaration binding into the given frame,
    /// overwriting any previous declaration of the same name.
    pub fn declare_function(&mut self, scope: ScopeId, name: Symbol, value: Value) {
        self.frame_mut(scope).bindings.insert(
            name,
            Binding {
                kind: DeclKind::Var,
                initialized: true,
                value,
            },
        );
    }

    /// Snapshot of the bindings visible in a frame (own bindings only),
    /// used by the debug message stream.
    pub fn own_bindings(&self, scope: ScopeId) -> Vec<(Symbol, Value)> {
        self.frame(scope)
            .bindings
            .iter()
            .filter(|(_, b)| b.initialized)
            .map(|(sym, b)| (*sym, b.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tdz_read_raises() {
        let mut scopes = Scopes::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        scopes.declare_lexical(GLOBAL_SCOPE, x, DeclKind::Let, &interner).unwrap();
        assert!(scopes.get(GLOBAL_SCOPE, x, &interner).is_err());
        scopes.initialize(GLOBAL_SCOPE, x, Value::Num(1.0));
        assert!(matches!(scopes.get(GLOBAL_SCOPE, x, &interner).unwrap(), Value::Num(n) if n == 1.0));
    }

    #[test]
    fn const_rejects_reassignment() {
        let mut scopes = Scopes::new();
        let mut interner = Interner::new();
        let k = interner.intern("k");
        scopes.declare_lexical(GLOBAL_SCOPE, k, DeclKind::Const, &interner).unwrap();
        scopes.initialize(GLOBAL_SCOPE, k, Value::Num(1.0));
        assert!(scopes.set(GLOBAL_SCOPE, k, Value::Num(2.0), &interner).is_err());
    }

    #[test]
    fn var_hoists_past_block_frames() {
        let mut scopes = Scopes::new();
        let mut interner = Interner::new();
        let v = interner.intern("v");
        let block = scopes.new_scope(GLOBAL_SCOPE, FrameKind::Block);
        scopes.declare_var(block, v, Some(Value::Num(3.0)));
        // Visible from the global frame since the block is not a function.
        assert!(matches!(scopes.get(GLOBAL_SCOPE, v, &interner).unwrap(), Value::Num(n) if n == 3.0));
    }

    #[test]
    fn undeclared_write_creates_global() {
        let mut scopes = Scopes::new();
        let mut interner = Interner::new();
        let g = interner.intern("g");
        let func = scopes.new_scope(GLOBAL_SCOPE, FrameKind::function(Value::Undefined));
        scopes.set(func, g, Value::Num(7.0), &interner).unwrap();
        assert!(matches!(scopes.get(GLOBAL_SCOPE, g, &interner).unwrap(), Value::Num(n) if n == 7.0));
    }
}
