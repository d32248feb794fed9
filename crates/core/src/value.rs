//! The `Value` type: what every Glyph runtime talks about.
//!
//! Every runtime value carries an immutable type tag (its enum
//! discriminant, refined further by [`crate::types::Type`]) and a
//! mutability state in `{mutable, immutable, shared}` (spec §3). Scalars
//! (`Int`, `Float`, `Bool`, `Atom`) are always effectively immutable, so
//! mutability only matters for the heap-backed compound kinds, which carry
//! an explicit [`Mutability`] cell.
//!
//! `Function`, `Continuation` and `CompiledCode` are opaque payloads here:
//! `glyph-bytecode` and `glyph-l2` own their concrete shapes and wrap them
//! in `Value::Function`/`Value::Continuation`/`Value::CompiledCode` via
//! `Arc<dyn Any + Send + Sync>`, so this crate never needs to depend on
//! theirs. This is the idiomatic-Rust form of spec §9's "tagged union of
//! concrete kinds plus a per-kind operation vtable": the enum discriminant
//! is the tag, and `match`/`downcast_ref` is the dispatch.

use crate::arena::ValueRef;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// The three-state mutability lattice from spec §3. Transitions only ever
/// move forward (`Mutable → Immutable → Shared`); attempting to re-apply a
/// transition that has already happened, or one the value has already
/// passed, is a no-op rather than an error, since both endpoints describe
/// the same safety guarantee the value already provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Mutability {
    Mutable = 0,
    Immutable = 1,
    Shared = 2,
}

/// An atomic cell holding a [`Mutability`], shared by every heap-backed
/// compound value.
pub struct MutabilityCell(AtomicU8);

impl MutabilityCell {
    pub fn new() -> Self {
        MutabilityCell(AtomicU8::new(Mutability::Mutable as u8))
    }

    pub fn get(&self) -> Mutability {
        match self.0.load(Ordering::Acquire) {
            0 => Mutability::Mutable,
            1 => Mutability::Immutable,
            _ => Mutability::Shared,
        }
    }

    fn advance_to(&self, target: Mutability) {
        let target = target as u8;
        let mut current = self.0.load(Ordering::Acquire);
        while current < target {
            match self.0.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn make_immutable(&self) {
        self.advance_to(Mutability::Immutable);
    }

    pub fn make_shared(&self) {
        self.advance_to(Mutability::Shared);
    }
}

impl Default for MutabilityCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MutabilityCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

/// A mutable string: bytes behind an `RwLock` so an owning fiber can
/// append/slice in place while `Mutable`, plus the shared `Mutability`
/// state.
#[derive(Debug)]
pub struct GlyphString {
    pub mutability: MutabilityCell,
    bytes: RwLock<String>,
}

impl GlyphString {
    pub fn new(s: impl Into<String>) -> Arc<Self> {
        Arc::new(GlyphString {
            mutability: MutabilityCell::new(),
            bytes: RwLock::new(s.into()),
        })
    }

    pub fn as_string(&self) -> String {
        self.bytes.read().expect("GlyphString lock poisoned").clone()
    }
}

/// A mutable tuple of values.
#[derive(Debug)]
pub struct GlyphTuple {
    pub mutability: MutabilityCell,
    elements: RwLock<Vec<Value>>,
}

impl GlyphTuple {
    pub fn new(elements: Vec<Value>) -> Arc<Self> {
        Arc::new(GlyphTuple {
            mutability: MutabilityCell::new(),
            elements: RwLock::new(elements),
        })
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.elements.read().expect("GlyphTuple lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.elements.read().expect("GlyphTuple lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mutable ordered map, keyed by the total order in [`OrdKey`].
#[derive(Debug)]
pub struct GlyphMap {
    pub mutability: MutabilityCell,
    entries: RwLock<BTreeMap<OrdKey, Value>>,
}

impl GlyphMap {
    pub fn new(entries: BTreeMap<OrdKey, Value>) -> Arc<Self> {
        Arc::new(GlyphMap {
            mutability: MutabilityCell::new(),
            entries: RwLock::new(entries),
        })
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .read()
            .expect("GlyphMap lock poisoned")
            .get(&OrdKey(key.clone()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("GlyphMap lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of the entries, used by the type lattice to check that
    /// every key/value matches a `Set`/`Map` element type.
    pub fn entries_vec(&self) -> Vec<(Value, Value)> {
        self.entries
            .read()
            .expect("GlyphMap lock poisoned")
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }
}

/// A total order over `Value` used as the key type for `GlyphMap`/sets.
///
/// Scalars order by discriminant then content (floats by bit pattern, so
/// NaNs compare equal to themselves and order after all other floats,
/// which is all a total order needs — it is not IEEE-754 ordering).
/// Opaque VM objects (`Function`/`Continuation`/`CompiledCode`) order by
/// their `Arc` allocation address: this is process-local and has no
/// semantic meaning, but it is a legitimate total order, which is all
/// `BTreeMap` requires of a key type.
#[derive(Debug, Clone)]
pub struct OrdKey(pub Value);

impl OrdKey {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Bool(_) => 2,
            Value::Atom(_) => 3,
            Value::Heap(Heap::Str(_)) => 4,
            Value::Heap(Heap::Tuple(_)) => 5,
            Value::Heap(Heap::Map(_)) => 6,
            Value::Function(_) => 7,
            Value::Continuation(_) => 8,
            Value::CompiledCode(_) => 9,
            Value::Channel(_) => 10,
            Value::FileHandle(_) => 11,
        }
    }

    fn object_addr(v: &Value) -> usize {
        match v {
            Value::Function(a) | Value::Continuation(a) | Value::CompiledCode(a) => {
                Arc::as_ptr(a) as *const () as usize
            }
            _ => 0,
        }
    }
}

impl PartialEq for OrdKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for OrdKey {}

impl PartialOrd for OrdKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        let (a, b) = (&self.0, &other.0);
        match Self::rank(a).cmp(&Self::rank(b)) {
            Equal => {}
            non_eq => return non_eq,
        }
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Float(x), Value::Float(y)) => x.to_bits().cmp(&y.to_bits()),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Atom(x), Value::Atom(y)) => x.as_ref().cmp(y.as_ref()),
            (Value::Heap(Heap::Str(x)), Value::Heap(Heap::Str(y))) => {
                x.as_string().cmp(&y.as_string())
            }
            (Value::Heap(Heap::Tuple(x)), Value::Heap(Heap::Tuple(y))) => {
                let (xv, yv) = (x.to_vec(), y.to_vec());
                xv.len().cmp(&yv.len()).then_with(|| {
                    for (xe, ye) in xv.iter().zip(yv.iter()) {
                        let c = OrdKey(xe.clone()).cmp(&OrdKey(ye.clone()));
                        if c != Equal {
                            return c;
                        }
                    }
                    Equal
                })
            }
            (Value::Heap(Heap::Map(x)), Value::Heap(Heap::Map(y))) => {
                Arc::as_ptr(x).cast::<()>().cmp(&Arc::as_ptr(y).cast::<()>())
            }
            (Value::Channel(x), Value::Channel(y)) => x.cmp(y),
            (Value::FileHandle(x), Value::FileHandle(y)) => x.cmp(y),
            _ => Self::object_addr(a).cmp(&Self::object_addr(b)),
        }
    }
}

/// The heap-backed compound kinds: strings, tuples, and maps. Sets are
/// represented as maps to `Bool(true)`, matching the common "set is a map
/// to unit" encoding and avoiding a fourth near-duplicate container.
#[derive(Debug, Clone)]
pub enum Heap {
    Str(Arc<GlyphString>),
    Tuple(Arc<GlyphTuple>),
    Map(Arc<GlyphMap>),
}

/// A uniformly-typed runtime value (spec §3).
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// An interned atom: a symbolic constant with identity equality.
    Atom(Arc<str>),
    Heap(Heap),
    /// An opaque `glyph-bytecode::Function`.
    Function(Arc<dyn Any + Send + Sync>),
    /// An opaque `glyph-bytecode::Continuation`.
    Continuation(Arc<dyn Any + Send + Sync>),
    /// An opaque `glyph-bytecode::CompiledCode`.
    CompiledCode(Arc<dyn Any + Send + Sync>),
    /// A handle into `glyph-runtime`'s channel registry.
    Channel(u64),
    /// A handle into `glyph-runtime`'s open-file table.
    FileHandle(u64),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Heap(Heap::Str(GlyphString::new(s)))
    }

    pub fn tuple(elements: Vec<Value>) -> Self {
        Value::Heap(Heap::Tuple(GlyphTuple::new(elements)))
    }

    pub fn map(entries: BTreeMap<OrdKey, Value>) -> Self {
        Value::Heap(Heap::Map(GlyphMap::new(entries)))
    }

    /// The `ValueRef` this value was allocated through, if it is a value
    /// that lives in an [`crate::arena::Arena`] rather than being inlined
    /// (reserved for continuation/function graphs that need the
    /// generation-checked indirection; most values are plain Rust `Arc`s).
    pub fn arena_ref(&self) -> Option<ValueRef> {
        None
    }

    /// Structural equality (spec §4.A `equals`). Scalars compare by value;
    /// heap objects compare by structural content, except maps, which
    /// compare by identity (two distinct maps with equal contents are not
    /// `equals` — this mirrors the "map is a mutable reference type"
    /// convention used for the indirection optimization below).
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Heap(Heap::Str(a)), Value::Heap(Heap::Str(b))) => {
                Arc::ptr_eq(a, b) || a.as_string() == b.as_string()
            }
            (Value::Heap(Heap::Tuple(a)), Value::Heap(Heap::Tuple(b))) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (av, bv) = (a.to_vec(), b.to_vec());
                av.len() == bv.len() && av.iter().zip(bv.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Heap(Heap::Map(a)), Value::Heap(Heap::Map(b))) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b))
            | (Value::Continuation(a), Value::Continuation(b))
            | (Value::CompiledCode(a), Value::CompiledCode(b)) => Arc::ptr_eq(a, b),
            (Value::Channel(a), Value::Channel(b)) => a == b,
            (Value::FileHandle(a), Value::FileHandle(b)) => a == b,
            _ => false,
        }
    }

    /// Transition this value (if heap-backed) towards `immutable`. Scalars
    /// are already immutable and ignore the call.
    pub fn make_immutable(&self) {
        match self {
            Value::Heap(Heap::Str(s)) => s.mutability.make_immutable(),
            Value::Heap(Heap::Tuple(t)) => t.mutability.make_immutable(),
            Value::Heap(Heap::Map(m)) => m.mutability.make_immutable(),
            _ => {}
        }
    }

    /// Transition this value (if heap-backed) towards `shared`, the state
    /// that is safe for concurrent read from any fiber.
    pub fn make_shared(&self) {
        match self {
            Value::Heap(Heap::Str(s)) => s.mutability.make_shared(),
            Value::Heap(Heap::Tuple(t)) => t.mutability.make_shared(),
            Value::Heap(Heap::Map(m)) => m.mutability.make_shared(),
            _ => {}
        }
    }

    pub fn mutability(&self) -> Mutability {
        match self {
            Value::Heap(Heap::Str(s)) => s.mutability.get(),
            Value::Heap(Heap::Tuple(t)) => t.mutability.get(),
            Value::Heap(Heap::Map(m)) => m.mutability.get(),
            _ => Mutability::Shared,
        }
    }
}

/// Equality-driven unification: when two tuples are found structurally
/// equal, the less-shared one is replaced in `slot` by the more-shared one
/// so later comparisons degrade to the `Arc::ptr_eq` fast path (spec §4.A:
/// "may install an indirection from the less-shared operand to the more-
/// shared one when both represent the same canonical value").
pub fn unify_equal_tuples(slot: &mut Value, canonical: &Value) {
    if let (Value::Heap(Heap::Tuple(a)), Value::Heap(Heap::Tuple(b))) = (&*slot, canonical) {
        if !Arc::ptr_eq(a, b) && a.to_vec().len() == b.to_vec().len() {
            let equal = a
                .to_vec()
                .iter()
                .zip(b.to_vec().iter())
                .all(|(x, y)| x.equals(y));
            if equal {
                let winner = if b.mutability.get() >= a.mutability.get() {
                    canonical.clone()
                } else {
                    slot.clone()
                };
                *slot = winner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutability_transitions_are_monotonic() {
        let s = GlyphString::new("hi");
        assert_eq!(s.mutability.get(), Mutability::Mutable);
        s.mutability.make_shared();
        assert_eq!(s.mutability.get(), Mutability::Shared);
        // Attempting to go "back" to immutable is a no-op, not an error.
        s.mutability.make_immutable();
        assert_eq!(s.mutability.get(), Mutability::Shared);
    }

    #[test]
    fn scalar_equality() {
        assert!(Value::Int(5).equals(&Value::Int(5)));
        assert!(!Value::Int(5).equals(&Value::Int(6)));
        assert!(Value::Float(1.5).equals(&Value::Float(1.5)));
    }

    #[test]
    fn tuple_structural_equality() {
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        assert!(a.equals(&b));
        let c = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert!(!a.equals(&c));
    }

    #[test]
    fn map_identity_equality_only() {
        let mut m1 = BTreeMap::new();
        m1.insert(OrdKey(Value::Int(1)), Value::Bool(true));
        let a = Value::map(m1.clone());
        let b = Value::map(m1);
        // Distinct map allocations with equal contents are NOT `equals`.
        assert!(!a.equals(&b));
        assert!(a.equals(&a.clone()));
    }

    #[test]
    fn hash_invariant_under_mutability_transition() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        fn hash_of(v: &Value) -> u64 {
            let mut hasher = DefaultHasher::new();
            match v {
                Value::Int(i) => i.hash(&mut hasher),
                _ => unreachable!(),
            }
            hasher.finish()
        }
        let v = Value::Int(42);
        let before = hash_of(&v);
        v.make_immutable();
        v.make_shared();
        let after = hash_of(&v);
        assert_eq!(before, after);
    }

    #[test]
    fn unify_equal_tuples_prefers_more_shared() {
        let a = Value::tuple(vec![Value::Int(1)]);
        let b = Value::tuple(vec![Value::Int(1)]);
        b.make_shared();
        let mut slot = a.clone();
        unify_equal_tuples(&mut slot, &b);
        assert!(matches!(slot.mutability(), Mutability::Shared));
    }

    #[test]
    fn ord_key_total_order_is_consistent() {
        let mut keys = vec![
            OrdKey(Value::Int(3)),
            OrdKey(Value::Int(1)),
            OrdKey(Value::Bool(true)),
            OrdKey(Value::Atom(Arc::from("x"))),
        ];
        keys.sort();
        assert_eq!(keys[0].0.equals(&Value::Int(1)), true);
    }
}
