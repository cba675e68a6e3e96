//! Arena storage for compound runtime values.
//!
//! All objects, arrays, closures, promises, maps, and generator states live
//! in one arena owned by the engine. References between them are plain
//! [`HeapId`] indices with no ownership, so cyclic structures (closure <->
//! captured frame, prototype cycles) need no special handling. Slots are
//! never freed individually; the arena is dropped wholesale with the engine.

use std::collections::BTreeMap;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::FuncDef,
    generator::GenState,
    intern::Symbol,
    promise::JsPromise,
    scope::ScopeId,
    value::{JsStr, MapKey, Value},
};

/// Index of a value in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(u32);

impl HeapId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Property key: strings (numeric keys in canonical string form) or symbols.
/// Symbol-keyed properties are invisible to `for..in`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum PropKey {
    Str(JsStr),
    Sym(Symbol),
}

impl PropKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Sym(_) => None,
        }
    }
}

/// A property slot: a plain value or an accessor pair.
#[derive(Debug, Clone)]
pub(crate) enum Property {
    Value(Value),
    Accessor { get: Option<Value>, set: Option<Value> },
}

type PropMap = IndexMap<PropKey, Property, ahash::RandomState>;

/// A plain object: insertion-ordered property map plus a prototype link.
#[derive(Debug, Clone, Default)]
pub(crate) struct JsObject {
    pub props: PropMap,
    pub proto: Option<HeapId>,
    pub extensible: bool,
}

impl JsObject {
    pub fn new(proto: Option<HeapId>) -> Self {
        Self {
            props: PropMap::default(),
            proto,
            extensible: true,
        }
    }

    pub fn insert(&mut self, key: PropKey, value: Value) {
        self.props.insert(key, Property::Value(value));
    }
}

/// Dense-plus-sparse array storage.
///
/// Writes at or just past the dense tail stay dense; writes far past the end
/// go to the sparse index map. `length` is always one past the highest
/// defined index. `None` entries in the dense part are holes.
#[derive(Debug, Clone, Default)]
pub(crate) struct JsArray {
    dense: Vec<Option<Value>>,
    sparse: BTreeMap<u32, Value>,
    length: u32,
    /// Non-index properties (e.g. negative string-coerced keys). These do
    /// not participate in `length`.
    pub extra: PropMap,
}

/// Writes more than this far past the dense tail switch to sparse storage.
const SPARSE_JUMP: u32 = 1024;

impl JsArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        let length = values.len() as u32;
        Self {
            dense: values.into_iter().map(Some).collect(),
            sparse: BTreeMap::new(),
            length,
            extra: PropMap::default(),
        }
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn get_index(&self, index: u32) -> Option<&Value> {
        if (index as usize) < self.dense.len() {
            self.dense[index as usize].as_ref()
        } else {
            self.sparse.get(&index)
        }
    }

    pub fn set_index(&mut self, index: u32, value: Value) {
        let dense_len = self.dense.len() as u32;
        if index < dense_len {
            self.dense[index as usize] = Some(value);
        } else if index <= dense_len.saturating_add(SPARSE_JUMP) {
            while (self.dense.len() as u32) < index {
                self.dense.push(None);
            }
            self.dense.push(Some(value));
        } else {
            self.sparse.insert(index, value);
        }
        if index >= self.length {
            self.length = index + 1;
        }
    }

    pub fn push(&mut self, value: Value) {
        self.set_index(self.length, value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        if self.length == 0 {
            return None;
        }
        let index = self.length - 1;
        let value = if (index as usize) < self.dense.len() {
            self.dense[index as usize].take()
        } else {
            self.sparse.remove(&index)
        };
        self.length = index;
        self.dense.truncate(self.length as usize);
        value
    }

    pub fn delete_index(&mut self, index: u32) {
        if (index as usize) < self.dense.len() {
            self.dense[index as usize] = None;
        } else {
            self.sparse.remove(&index);
        }
    }

    /// Overwrites `length`, truncating storage when shrinking.
    pub fn set_length(&mut self, new_length: u32) {
        if new_length < self.length {
            self.dense.truncate(new_length as usize);
            self.sparse.retain(|k, _| *k < new_length);
        }
        self.length = new_length;
    }

    /// Defined indices in ascending order (holes skipped).
    pub fn indices(&self) -> Vec<u32> {
        let mut out: Vec<u32> = (0..self.dense.len() as u32)
            .filter(|&i| self.dense[i as usize].is_some())
            .collect();
        out.extend(self.sparse.keys().copied());
        out
    }

    pub fn iter_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.indices().into_iter().map(|i| self.get_index(i).cloned().unwrap_or(Value::Undefined)).collect::<Vec<_>>().into_iter()
    }
}

/// A script function value: shared definition plus the captured environment.
#[derive(Debug, Clone)]
pub(crate) struct Closure {
    pub def: std::rc::Rc<FuncDef>,
    /// The defining scope; closures capture the frame reference, not a
    /// snapshot.
    pub env: ScopeId,
    /// Prototype object of methods' `super` lookups.
    pub home_object: Option<HeapId>,
    /// Base-class constructor for derived class constructors.
    pub parent_ctor: Option<HeapId>,
    /// `prototype`, statics, and any user-set properties.
    pub props: PropMap,
}

/// A host callable registered through the embedding surface. The index
/// points into the engine's registry.
#[derive(Debug, Clone)]
pub(crate) struct HostFuncData {
    pub index: usize,
    pub name: JsStr,
}

/// A native capability bound to a promise. Calling it settles the promise;
/// repeat calls are ignored.
#[derive(Debug, Clone)]
pub(crate) struct Resolver {
    pub target: HeapId,
    pub kind: ResolverKind,
}

#[derive(Debug, Clone)]
pub(crate) enum ResolverKind {
    Resolve,
    Reject,
    /// One element slot of a `Promise.all` combinator. `state` is the shared
    /// bookkeeping object carrying the results array and remaining count.
    AllElement { index: u32, state: HeapId },
}

/// Insertion-ordered map with `SameValueZero` key semantics.
#[derive(Debug, Clone, Default)]
pub(crate) struct JsMap {
    pub entries: IndexMap<MapKey, Value, ahash::RandomState>,
}

/// Identity-keyed weak map. Keys must be heap references; no collection of
/// entries is performed (the arena outlives all references anyway).
#[derive(Debug, Clone, Default)]
pub(crate) struct JsWeakMap {
    pub entries: AHashMap<HeapId, Value>,
}

/// A compiled-or-deferred regex literal. Compilation happens on first use so
/// invalid patterns only fail when exercised.
#[derive(Debug, Clone)]
pub(crate) struct JsRegex {
    pub source: JsStr,
    pub flags: JsStr,
    pub compiled: Option<std::rc::Rc<regex::Regex>>,
    /// `lastIndex` for sticky/global matching (stored but only `g` consulted).
    pub last_index: u32,
}

/// Built-in iterator states for the iteration protocol over native
/// containers.
#[derive(Debug, Clone)]
pub(crate) enum NativeIter {
    Array { arr: HeapId, idx: u32 },
    Str { s: JsStr, idx: usize },
    MapEntries { map: HeapId, idx: usize },
    /// Snapshot iterator over property keys, used by `for..in`.
    Keys { keys: Vec<JsStr>, idx: usize },
    /// Adapts a sync iterator to the promise-returning shape used by
    /// `for await`.
    AsyncWrap { inner: Value },
}

#[derive(Debug, Clone)]
pub(crate) enum HeapData {
    Object(JsObject),
    Array(JsArray),
    Closure(Closure),
    HostFunc(HostFuncData),
    Resolver(Resolver),
    Promise(JsPromise),
    Map(JsMap),
    WeakMap(JsWeakMap),
    Generator(GenState),
    NativeIter(NativeIter),
    Date(f64),
    Regex(JsRegex),
}

impl HeapData {
    /// Static name of the variant, used by heap statistics.
    fn type_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "Object",
            Self::Array(_) => "Array",
            Self::Closure(_) => "Function",
            Self::HostFunc(_) => "HostFunction",
            Self::Resolver(_) => "Resolver",
            Self::Promise(_) => "Promise",
            Self::Map(_) => "Map",
            Self::WeakMap(_) => "WeakMap",
            Self::Generator(_) => "Generator",
            Self::NativeIter(_) => "Iterator",
            Self::Date(_) => "Date",
            Self::Regex(_) => "RegExp",
        }
    }
}

/// Snapshot of heap state at a point in time: object counts by type.
/// Useful for monitoring heap growth in embedder diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of allocated slots.
    pub total_slots: usize,
    /// Breakdown of slots by variant name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

/// The arena. Allocation only; slots live until the engine is dropped.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    slots: Vec<HeapData>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.slots.len()).expect("heap overflow"));
        self.slots.push(data);
        id
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.index()]
    }

    /// Allocates a plain object with the given prototype.
    pub fn alloc_object(&mut self, proto: Option<HeapId>) -> HeapId {
        self.alloc(HeapData::Object(JsObject::new(proto)))
    }

    pub fn alloc_array(&mut self, values: Vec<Value>) -> HeapId {
        self.alloc(HeapData::Array(JsArray::from_values(values)))
    }

    /// Borrow helpers with the expected variant; a mismatch is an internal
    /// bug, not a script error.
    pub fn expect_object(&self, id: HeapId) -> &JsObject {
        match self.get(id) {
            HeapData::Object(o) => o,
            other => panic!("expected Object slot, found {}", other.type_name()),
        }
    }

    pub fn expect_object_mut(&mut self, id: HeapId) -> &mut JsObject {
        match self.get_mut(id) {
            HeapData::Object(o) => o,
            other => panic!("expected Object slot, found {}", other.type_name()),
        }
    }

    pub fn expect_promise_mut(&mut self, id: HeapId) -> &mut JsPromise {
        match self.get_mut(id) {
            HeapData::Promise(p) => p,
            other => panic!("expected Promise slot, found {}", other.type_name()),
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        for slot in &self.slots {
            *objects_by_type.entry(slot.type_name()).or_insert(0) += 1;
        }
        HeapStats {
            total_slots: self.slots.len(),
            objects_by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_growth_updates_length() {
        let mut arr = JsArray::new();
        arr.push(Value::Num(1.0));
        assert_eq!(arr.length(), 1);
        arr.set_index(5, Value::Num(2.0));
        assert_eq!(arr.length(), 6);
        assert!(arr.get_index(3).is_none());
        assert_eq!(arr.indices(), vec![0, 5]);
    }

    #[test]
    fn array_far_writes_go_sparse() {
        let mut arr = JsArray::new();
        arr.set_index(1_000_000, Value::Num(1.0));
        assert_eq!(arr.length(), 1_000_001);
        assert!(arr.get_index(1_000_000).is_some());
        assert!(arr.get_index(999_999).is_none());
    }

    #[test]
    fn heap_stats_count_by_type() {
        let mut heap = Heap::new();
        heap.alloc_object(None);
        heap.alloc_array(vec![]);
        heap.alloc_array(vec![]);
        let stats = heap.stats();
        assert_eq!(stats.total_slots, 3);
        assert_eq!(stats.objects_by_type.get("Array"), Some(&2));
        assert_eq!(stats.objects_by_type.get("Object"), Some(&1));
    }
}
