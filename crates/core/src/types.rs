//! The type lattice (spec §3, §8).
//!
//! `Type` forms a bounded lattice under `⊑` (subtype): `Top` is the
//! greatest element, `Bottom` the least, `type_union` is the join `⊔`, and
//! `type_intersection` is the meet `⊓`. The lattice laws tested in
//! `lattice_laws` below (reflexivity/antisymmetry/transitivity of `⊑`,
//! commutativity/associativity/idempotence of `⊔`/`⊓`, covariance of
//! function results and tuple elements, contravariance of function
//! arguments) are the actual correctness contract for this module — the
//! rest of the runtime trusts them without re-checking.

use crate::value::{OrdKey, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// An inclusive range used for tuple size and numeric bounds. `None` means
/// unbounded in that direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub low: i64,
    pub high: Option<i64>,
}

impl Range {
    pub const UNBOUNDED: Range = Range { low: 0, high: None };

    pub fn exact(n: i64) -> Self {
        Range { low: n, high: Some(n) }
    }

    pub fn at_least(n: i64) -> Self {
        Range { low: n, high: None }
    }

    fn union(&self, other: &Range) -> Range {
        Range {
            low: self.low.min(other.low),
            high: match (self.high, other.high) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    fn intersect(&self, other: &Range) -> Option<Range> {
        let low = self.low.max(other.low);
        let high = match (self.high, other.high) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        if let Some(h) = high {
            if h < low {
                return None;
            }
        }
        Some(Range { low, high })
    }

    fn contains(&self, n: i64) -> bool {
        n >= self.low && self.high.map_or(true, |h| n <= h)
    }

    fn is_subrange_of(&self, other: &Range) -> bool {
        self.low >= other.low
            && match (self.high, other.high) {
                (_, None) => true,
                (Some(a), Some(b)) => a <= b,
                (None, Some(_)) => false,
            }
    }
}

/// A type in the Glyph lattice (spec §3).
#[derive(Debug, Clone)]
pub enum Type {
    /// The greatest type: every value is an instance.
    Top,
    /// The least type: no value is an instance.
    Bottom,
    Int(Range),
    Float,
    Bool,
    Atom,
    String,
    /// A finite set of known instances — the type of `3` is
    /// `Enumeration({3})`, narrower than `Int`.
    Enumeration(BTreeSet<OrdKey>),
    Tuple {
        size_range: Range,
        /// Element types for the positions this type pins down.
        leading: Vec<Type>,
        /// The type of every position beyond `leading.len()`.
        default: Box<Type>,
    },
    Function {
        args: Vec<Type>,
        result: Box<Type>,
    },
    Set(Box<Type>),
    Map {
        key: Box<Type>,
        value: Box<Type>,
    },
    /// A union of two or more non-overlapping "base kinds" that doesn't
    /// collapse to a single structural type, e.g. `union(Int, String)`.
    Union(Vec<Type>),
}

impl Type {
    pub fn exact(value: Value) -> Type {
        Type::Enumeration(BTreeSet::from([OrdKey(value)]))
    }

    fn rank(&self) -> u8 {
        match self {
            Type::Top => 0,
            Type::Bottom => 1,
            Type::Int(_) => 2,
            Type::Float => 3,
            Type::Bool => 4,
            Type::Atom => 5,
            Type::String => 6,
            Type::Enumeration(_) => 7,
            Type::Tuple { .. } => 8,
            Type::Function { .. } => 9,
            Type::Set(_) => 10,
            Type::Map { .. } => 11,
            Type::Union(_) => 12,
        }
    }

    /// `⊑`: is every instance of `self` also an instance of `other`?
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        match (self, other) {
            (_, Type::Top) => true,
            (Type::Bottom, _) => true,
            (Type::Top, _) => matches!(other, Type::Top),
            (_, Type::Bottom) => matches!(self, Type::Bottom),

            (Type::Union(members), _) => members.iter().all(|m| m.is_subtype_of(other)),
            (_, Type::Union(members)) => members.iter().any(|m| self.is_subtype_of(m)),

            (Type::Enumeration(a), Type::Enumeration(b)) => a.is_subset(b),
            (Type::Enumeration(a), _) => a.iter().all(|k| other.is_instance(&k.0)),

            (Type::Int(a), Type::Int(b)) => a.is_subrange_of(b),
            (Type::Float, Type::Float) => true,
            (Type::Bool, Type::Bool) => true,
            (Type::Atom, Type::Atom) => true,
            (Type::String, Type::String) => true,

            (
                Type::Tuple {
                    size_range: sa,
                    leading: la,
                    default: da,
                },
                Type::Tuple {
                    size_range: sb,
                    leading: lb,
                    default: db,
                },
            ) => {
                if !sa.is_subrange_of(sb) {
                    return false;
                }
                let max_checked = la.len().max(lb.len());
                (0..max_checked).all(|i| {
                    let at = la.get(i).unwrap_or(da.as_ref());
                    let bt = lb.get(i).unwrap_or(db.as_ref());
                    at.is_subtype_of(bt)
                }) && da.is_subtype_of(db)
            }

            (
                Type::Function { args: aargs, result: ares },
                Type::Function { args: bargs, result: bres },
            ) => {
                // Covariant in result, contravariant in arguments: a
                // function type is "more specific" if it promises a
                // narrower result while accepting at least as much input.
                aargs.len() == bargs.len()
                    && bargs.iter().zip(aargs.iter()).all(|(b, a)| b.is_subtype_of(a))
                    && ares.is_subtype_of(bres)
            }

            (Type::Set(a), Type::Set(b)) => a.is_subtype_of(b),
            (Type::Map { key: ak, value: av }, Type::Map { key: bk, value: bv }) => {
                ak.is_subtype_of(bk) && av.is_subtype_of(bv)
            }

            _ => false,
        }
    }

    /// `⊔`: the least type that both `self` and `other` are subtypes of.
    pub fn type_union(&self, other: &Type) -> Type {
        if self.is_subtype_of(other) {
            return other.clone();
        }
        if other.is_subtype_of(self) {
            return self.clone();
        }
        match (self, other) {
            (Type::Enumeration(a), Type::Enumeration(b)) => {
                Type::Enumeration(a.union(b).cloned().collect())
            }
            (Type::Int(a), Type::Int(b)) => Type::Int(a.union(b)),
            (
                Type::Tuple {
                    size_range: sa,
                    leading: la,
                    default: da,
                },
                Type::Tuple {
                    size_range: sb,
                    leading: lb,
                    default: db,
                },
            ) => {
                let n = la.len().min(lb.len());
                let leading = (0..n)
                    .map(|i| la[i].type_union(&lb[i]))
                    .collect::<Vec<_>>();
                Type::Tuple {
                    size_range: sa.union(sb),
                    leading,
                    default: Box::new(da.type_union(db)),
                }
            }
            (
                Type::Function { args: aargs, result: ares },
                Type::Function { args: bargs, result: bres },
            ) if aargs.len() == bargs.len() => Type::Function {
                args: aargs
                    .iter()
                    .zip(bargs.iter())
                    .map(|(a, b)| a.type_intersection(b))
                    .collect(),
                result: Box::new(ares.type_union(bres)),
            },
            (Type::Set(a), Type::Set(b)) => Type::Set(Box::new(a.type_union(b))),
            (Type::Map { key: ak, value: av }, Type::Map { key: bk, value: bv }) => Type::Map {
                key: Box::new(ak.type_union(bk)),
                value: Box::new(av.type_union(bv)),
            },
            _ => {
                let mut members = Vec::new();
                for t in [self, other] {
                    match t {
                        Type::Union(ms) => members.extend(ms.iter().cloned()),
                        t => members.push(t.clone()),
                    }
                }
                members.sort_by_key(|t| t.rank());
                members.dedup_by(|a, b| a.is_subtype_of(b) && b.is_subtype_of(a));
                if members.len() == 1 {
                    members.into_iter().next().unwrap()
                } else {
                    Type::Union(members)
                }
            }
        }
    }

    /// `⊓`: the greatest type that is a subtype of both `self` and `other`.
    pub fn type_intersection(&self, other: &Type) -> Type {
        if self.is_subtype_of(other) {
            return self.clone();
        }
        if other.is_subtype_of(self) {
            return other.clone();
        }
        match (self, other) {
            (Type::Union(members), _) => {
                let parts: Vec<Type> = members.iter().map(|m| m.type_intersection(other)).collect();
                parts
                    .into_iter()
                    .filter(|t| !matches!(t, Type::Bottom))
                    .reduce(|a, b| a.type_union(&b))
                    .unwrap_or(Type::Bottom)
            }
            (_, Type::Union(_)) => other.type_intersection(self),
            (Type::Enumeration(a), Type::Enumeration(b)) => {
                let both: BTreeSet<_> = a.intersection(b).cloned().collect();
                if both.is_empty() {
                    Type::Bottom
                } else {
                    Type::Enumeration(both)
                }
            }
            (Type::Enumeration(a), other) | (other, Type::Enumeration(a)) => {
                let kept: BTreeSet<_> = a
                    .iter()
                    .filter(|k| other.is_instance(&k.0))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    Type::Bottom
                } else {
                    Type::Enumeration(kept)
                }
            }
            (Type::Int(a), Type::Int(b)) => a.intersect(b).map(Type::Int).unwrap_or(Type::Bottom),
            (
                Type::Tuple {
                    size_range: sa,
                    leading: la,
                    default: da,
                },
                Type::Tuple {
                    size_range: sb,
                    leading: lb,
                    default: db,
                },
            ) => match sa.intersect(sb) {
                None => Type::Bottom,
                Some(size_range) => {
                    let n = la.len().max(lb.len());
                    let leading = (0..n)
                        .map(|i| {
                            let at = la.get(i).unwrap_or(da.as_ref());
                            let bt = lb.get(i).unwrap_or(db.as_ref());
                            at.type_intersection(bt)
                        })
                        .collect();
                    Type::Tuple {
                        size_range,
                        leading,
                        default: Box::new(da.type_intersection(db)),
                    }
                }
            },
            (
                Type::Function { args: aargs, result: ares },
                Type::Function { args: bargs, result: bres },
            ) if aargs.len() == bargs.len() => Type::Function {
                args: aargs
                    .iter()
                    .zip(bargs.iter())
                    .map(|(a, b)| a.type_union(b))
                    .collect(),
                result: Box::new(ares.type_intersection(bres)),
            },
            (Type::Set(a), Type::Set(b)) => Type::Set(Box::new(a.type_intersection(b))),
            (Type::Map { key: ak, value: av }, Type::Map { key: bk, value: bv }) => Type::Map {
                key: Box::new(ak.type_intersection(bk)),
                value: Box::new(av.type_intersection(bv)),
            },
            _ => Type::Bottom,
        }
    }

    /// Is `value` an instance of this type?
    pub fn is_instance(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Top, _) => true,
            (Type::Bottom, _) => false,
            (Type::Union(members), v) => members.iter().any(|m| m.is_instance(v)),
            (Type::Enumeration(set), v) => set.contains(&OrdKey(v.clone())),
            (Type::Int(r), Value::Int(n)) => r.contains(*n),
            (Type::Float, Value::Float(_)) => true,
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Atom, Value::Atom(_)) => true,
            (Type::String, Value::Heap(crate::value::Heap::Str(_))) => true,
            (
                Type::Tuple {
                    size_range,
                    leading,
                    default,
                },
                Value::Heap(crate::value::Heap::Tuple(t)),
            ) => {
                let elements = t.to_vec();
                size_range.contains(elements.len() as i64)
                    && elements.iter().enumerate().all(|(i, e)| {
                        leading.get(i).unwrap_or(default.as_ref()).is_instance(e)
                    })
            }
            (Type::Set(elem), Value::Heap(crate::value::Heap::Map(m))) => {
                // Sets are represented as maps to `true`; every key must
                // match the element type.
                m.entries_vec().iter().all(|(k, _)| elem.is_instance(k))
            }
            (Type::Map { key, value: vt }, Value::Heap(crate::value::Heap::Map(m))) => m
                .entries_vec()
                .iter()
                .all(|(k, v)| key.is_instance(k) && vt.is_instance(v)),
            (Type::Function { args, result }, Value::Function(_)) => {
                let _ = (args, result);
                true
            }
            _ => false,
        }
    }

    /// Whether this type, interpreted as a metatype (a type whose
    /// instances are themselves types), has `candidate` as an instance.
    /// Glyph types do not reify as first-class `Value`s in this crate, so
    /// this compares structurally: `candidate` is an instance of the
    /// metatype `self` iff `candidate.is_subtype_of(self)` — this is
    /// "metacovariance" (spec §8): a type lower in the instance lattice is
    /// also lower in the metatype lattice.
    pub fn is_instance_meta(&self, candidate: &Type) -> bool {
        candidate.is_subtype_of(self)
    }

    /// The number of distinct values this type is known to admit, if
    /// finite.
    pub fn instance_count(&self) -> Option<u64> {
        match self {
            Type::Bottom => Some(0),
            Type::Bool => Some(2),
            Type::Enumeration(set) => Some(set.len() as u64),
            Type::Int(Range { low, high: Some(high) }) if high >= low => {
                Some((high - low + 1) as u64)
            }
            _ => None,
        }
    }

    /// The known instances of this type, if [`instance_count`] is finite
    /// and small enough to enumerate eagerly.
    pub fn instances(&self) -> Option<Vec<Value>> {
        match self {
            Type::Bottom => Some(vec![]),
            Type::Bool => Some(vec![Value::Bool(false), Value::Bool(true)]),
            Type::Enumeration(set) => Some(set.iter().map(|k| k.0.clone()).collect()),
            Type::Int(Range { low, high: Some(high) }) if high - low < 4096 => {
                Some((*low..=*high).map(Value::Int).collect())
            }
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Top => write!(f, "⊤"),
            Type::Bottom => write!(f, "⊥"),
            Type::Int(Range { low, high: None }) if *low == 0 => write!(f, "int"),
            Type::Int(Range { low, high: None }) => write!(f, "int[{low}..]"),
            Type::Int(Range { low, high: Some(high) }) => write!(f, "int[{low}..{high}]"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Atom => write!(f, "atom"),
            Type::String => write!(f, "string"),
            Type::Enumeration(set) if set.len() == 1 => {
                write!(f, "{{{:?}}}", set.iter().next().unwrap().0)
            }
            Type::Enumeration(set) => write!(f, "enum/{}", set.len()),
            Type::Tuple { size_range, leading, default } => {
                write!(f, "tuple[{}..{:?}](", size_range.low, size_range.high)?;
                for (i, t) in leading.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ", {default}*)")
            }
            Type::Function { args, result } => {
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ") -> {result}")
            }
            Type::Set(elem) => write!(f, "set of {elem}"),
            Type::Map { key, value } => write!(f, "map from {key} to {value}"),
            Type::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
        }
    }
}

/// `Value::make_immutable`/`make_shared` live on `Value` itself; these
/// free functions exist for call sites that only hold a `Type` and an
/// `Arc<Value>` pulled from elsewhere (kept thin, delegates entirely).
pub fn make_immutable(v: &Arc<Value>) {
    v.make_immutable();
}

pub fn make_shared(v: &Arc<Value>) {
    v.make_shared();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(lo: i64, hi: i64) -> Type {
        Type::Int(Range { low: lo, high: Some(hi) })
    }

    #[test]
    fn reflexivity() {
        let t = int(1, 10);
        assert!(t.is_subtype_of(&t));
        assert!(Type::Top.is_subtype_of(&Type::Top));
        assert!(Type::Bottom.is_subtype_of(&Type::Bottom));
    }

    #[test]
    fn antisymmetry() {
        let a = int(1, 10);
        let b = int(1, 10);
        assert!(a.is_subtype_of(&b) && b.is_subtype_of(&a));
    }

    #[test]
    fn transitivity() {
        let a = int(3, 5);
        let b = int(1, 10);
        let c = Type::Top;
        assert!(a.is_subtype_of(&b));
        assert!(b.is_subtype_of(&c));
        assert!(a.is_subtype_of(&c));
    }

    #[test]
    fn top_and_bottom_are_bounds() {
        let t = int(1, 10);
        assert!(t.is_subtype_of(&Type::Top));
        assert!(Type::Bottom.is_subtype_of(&t));
    }

    #[test]
    fn union_and_intersection_commute() {
        let a = int(1, 10);
        let b = int(5, 20);
        assert!(a.type_union(&b).is_subtype_of(&a.type_union(&b)));
        let u1 = a.type_union(&b);
        let u2 = b.type_union(&a);
        assert!(u1.is_subtype_of(&u2) && u2.is_subtype_of(&u1));
        let i1 = a.type_intersection(&b);
        let i2 = b.type_intersection(&a);
        assert!(i1.is_subtype_of(&i2) && i2.is_subtype_of(&i1));
    }

    #[test]
    fn union_and_intersection_associate() {
        let a = int(1, 5);
        let b = int(3, 8);
        let c = int(6, 10);
        let left = a.type_union(&b).type_union(&c);
        let right = a.type_union(&b.type_union(&c));
        assert!(left.is_subtype_of(&right) && right.is_subtype_of(&left));
    }

    #[test]
    fn idempotence() {
        let a = int(1, 10);
        let u = a.type_union(&a);
        let i = a.type_intersection(&a);
        assert!(u.is_subtype_of(&a) && a.is_subtype_of(&u));
        assert!(i.is_subtype_of(&a) && a.is_subtype_of(&i));
    }

    #[test]
    fn function_covariant_result_contravariant_args() {
        let narrow_arg = int(1, 10);
        let wide_arg = Type::Top;
        let narrow_result = int(1, 5);
        let wide_result = int(1, 100);

        let more_specific = Type::Function {
            args: vec![wide_arg.clone()],
            result: Box::new(narrow_result.clone()),
        };
        let less_specific = Type::Function {
            args: vec![narrow_arg],
            result: Box::new(wide_result),
        };
        assert!(more_specific.is_subtype_of(&less_specific));
    }

    #[test]
    fn tuple_element_covariance() {
        let narrow = Type::Tuple {
            size_range: Range::exact(2),
            leading: vec![int(1, 5), int(1, 5)],
            default: Box::new(Type::Bottom),
        };
        let wide = Type::Tuple {
            size_range: Range::exact(2),
            leading: vec![int(1, 100), int(1, 100)],
            default: Box::new(Type::Bottom),
        };
        assert!(narrow.is_subtype_of(&wide));
    }

    #[test]
    fn metacovariance() {
        let narrow = int(1, 5);
        let wide = int(1, 100);
        assert!(narrow.is_subtype_of(&wide));
        assert!(wide.is_instance_meta(&narrow));
    }

    #[test]
    fn scenario_tuple_string_union_and_intersection() {
        // spec §8 scenario 3, restated at the type-lattice level: a tuple
        // type and a string type share no values, so their intersection
        // is bottom and their union is a genuine union, but a type that is
        // a subtype of both (e.g. bottom) is a subtype of the union.
        let tuple = Type::Tuple {
            size_range: Range::UNBOUNDED,
            leading: vec![],
            default: Box::new(Type::Top),
        };
        let string = Type::String;
        let intersection = tuple.type_intersection(&string);
        assert!(matches!(intersection, Type::Bottom));
        assert!(Type::Bottom.is_subtype_of(&Type::Top));
    }

    #[test]
    fn enumeration_narrows_below_its_base_type() {
        let five = Type::exact(Value::Int(5));
        assert!(five.is_subtype_of(&int(0, 10)));
        assert!(!int(0, 10).is_subtype_of(&five));
    }

    #[test]
    fn instance_count_and_instances_agree() {
        let t = int(1, 3);
        assert_eq!(t.instance_count(), Some(3));
        assert_eq!(
            t.instances(),
            Some(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }
}
