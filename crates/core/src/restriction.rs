//! `TypeRestriction`: a type bound paired with an optional known exact
//! value (spec §3, §8). The L2 translator narrows a register's
//! restriction along each outgoing control-flow edge of a branch — e.g.
//! after `if x = 5 then ... else ...`, the then-edge sees `x` restricted
//! to the constant `5` and the else-edge sees `x` restricted away from it.
//! This is the register-allocation-friendly "phi narrowing" named in
//! spec §4.D.

use crate::types::Type;
use crate::value::Value;
use std::fmt;

/// A type restriction. The invariant `constant.is_none() ||
/// type_.is_instance(constant)` always holds: [`TypeRestriction::new`] and
/// every narrowing method re-normalize to preserve it.
#[derive(Debug, Clone)]
pub struct TypeRestriction {
    type_: Type,
    constant: Option<Value>,
}

impl TypeRestriction {
    pub fn new(type_: Type, constant: Option<Value>) -> Self {
        let mut r = TypeRestriction { type_, constant };
        r.normalize();
        r
    }

    pub fn unrestricted(type_: Type) -> Self {
        TypeRestriction::new(type_, None)
    }

    pub fn exact(value: Value) -> Self {
        let t = Type::exact(value.clone());
        TypeRestriction::new(t, Some(value))
    }

    /// The restriction that admits no values — the result of narrowing a
    /// register's known type against an impossible branch condition.
    pub fn impossible() -> Self {
        TypeRestriction {
            type_: Type::Bottom,
            constant: None,
        }
    }

    pub fn is_impossible(&self) -> bool {
        matches!(self.type_, Type::Bottom)
    }

    pub fn type_(&self) -> &Type {
        &self.type_
    }

    pub fn constant(&self) -> Option<&Value> {
        self.constant.as_ref()
    }

    fn normalize(&mut self) {
        if let Some(c) = self.constant.clone() {
            if !self.type_.is_instance(&c) {
                // A constant incompatible with the declared type describes
                // an impossible edge.
                self.type_ = Type::Bottom;
                self.constant = None;
            } else {
                self.type_ = self.type_.type_intersection(&Type::exact(c));
            }
            return;
        }
        // If the type has exactly one instance, that instance is known
        // even though no constant was supplied. Glyph types never reify as
        // first-class values in this crate, so an enumeration here is
        // never a metatype — the "and is not a metatype" exclusion always
        // holds.
        if let Type::Enumeration(set) = &self.type_ {
            if set.len() == 1 {
                self.constant = set.iter().next().map(|k| k.0.clone());
            }
        }
    }

    /// Narrow to the intersection with `t` (e.g. after a type-check
    /// branch succeeds).
    pub fn restricted_to(&self, t: &Type) -> TypeRestriction {
        TypeRestriction::new(self.type_.type_intersection(t), self.constant.clone())
    }

    /// Narrow to exactly `value` (e.g. after an equality-to-constant
    /// branch succeeds). Produces [`impossible`] if `value` is not
    /// already admitted by this restriction.
    pub fn restricted_to_value(&self, value: &Value) -> TypeRestriction {
        if !self.type_.is_instance(value) {
            return TypeRestriction::impossible();
        }
        TypeRestriction::exact(value.clone())
    }

    /// Narrow away from exactly `value` (the negative edge of an
    /// equality-to-constant branch). Only representable precisely when
    /// the current type is a finite enumeration; otherwise the type is
    /// left unchanged (still sound, just not maximally narrow) unless the
    /// known constant *is* `value`, which makes the edge unreachable.
    pub fn restricted_without_value(&self, value: &Value) -> TypeRestriction {
        if let Some(c) = &self.constant {
            if c.equals(value) {
                return TypeRestriction::impossible();
            }
            return self.clone();
        }
        if let Type::Enumeration(set) = &self.type_ {
            let remaining: std::collections::BTreeSet<_> = set
                .iter()
                .filter(|k| !k.0.equals(value))
                .cloned()
                .collect();
            if remaining.is_empty() {
                return TypeRestriction::impossible();
            }
            return TypeRestriction::new(Type::Enumeration(remaining), None);
        }
        self.clone()
    }

    /// Narrow away from type `t` (the negative edge of a type-check
    /// branch). Exact only when `self`'s type is already a subtype of
    /// `t` (making the edge unreachable); otherwise conservative
    /// (unchanged).
    pub fn restricted_without_type(&self, t: &Type) -> TypeRestriction {
        if self.type_.is_subtype_of(t) {
            return TypeRestriction::impossible();
        }
        self.clone()
    }

    /// The restriction that is valid on either of two converging edges
    /// (e.g. after an `if`/`else` with no early return merges back).
    pub fn union(&self, other: &TypeRestriction) -> TypeRestriction {
        if self.is_impossible() {
            return other.clone();
        }
        if other.is_impossible() {
            return self.clone();
        }
        let constant = match (&self.constant, &other.constant) {
            (Some(a), Some(b)) if a.equals(b) => Some(a.clone()),
            _ => None,
        };
        TypeRestriction::new(self.type_.type_union(&other.type_), constant)
    }

    /// The restriction implied by both holding simultaneously.
    pub fn intersection(&self, other: &TypeRestriction) -> TypeRestriction {
        let constant = match (&self.constant, &other.constant) {
            (Some(a), Some(b)) if !a.equals(b) => return TypeRestriction::impossible(),
            (Some(a), _) | (_, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        TypeRestriction::new(self.type_.type_intersection(&other.type_), constant)
    }
}

impl fmt::Display for TypeRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constant {
            Some(c) => write!(f, "{} (= {:?})", self.type_, c),
            None => write!(f, "{}", self.type_),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Range;

    fn int(lo: i64, hi: i64) -> Type {
        Type::Int(Range { low: lo, high: Some(hi) })
    }

    #[test]
    fn constant_incompatible_with_type_is_impossible() {
        let r = TypeRestriction::new(Type::Bool, Some(Value::Int(5)));
        assert!(r.is_impossible());
    }

    #[test]
    fn restricted_to_value_then_away_from_it_is_impossible() {
        let r = TypeRestriction::unrestricted(int(0, 10));
        let then_edge = r.restricted_to_value(&Value::Int(5));
        assert_eq!(then_edge.constant(), Some(&Value::Int(5)));

        let else_edge = r.restricted_without_value(&Value::Int(5));
        let reconverge_then_then = then_edge.restricted_without_value(&Value::Int(5));
        assert!(reconverge_then_then.is_impossible());
        assert!(!else_edge.is_impossible());
    }

    #[test]
    fn restricted_without_type_subtype_is_impossible() {
        let r = TypeRestriction::unrestricted(int(0, 5));
        let narrowed = r.restricted_without_type(&int(-10, 10));
        assert!(narrowed.is_impossible());
    }

    #[test]
    fn single_instance_enumeration_fills_in_its_constant_without_exact() {
        let singleton = Type::Enumeration(std::collections::BTreeSet::from([crate::value::OrdKey(
            Value::Int(7),
        )]));
        let r = TypeRestriction::unrestricted(singleton);
        assert_eq!(r.constant(), Some(&Value::Int(7)));
    }

    #[test]
    fn union_drops_mismatched_constants() {
        let a = TypeRestriction::exact(Value::Int(1));
        let b = TypeRestriction::exact(Value::Int(2));
        let merged = a.union(&b);
        assert!(merged.constant().is_none());
        assert!(merged.type_().is_instance(&Value::Int(1)));
        assert!(merged.type_().is_instance(&Value::Int(2)));
    }

    #[test]
    fn intersection_of_conflicting_constants_is_impossible() {
        let a = TypeRestriction::exact(Value::Int(1));
        let b = TypeRestriction::exact(Value::Int(2));
        assert!(a.intersection(&b).is_impossible());
    }

    #[test]
    fn intersection_keeps_agreeing_constant() {
        let a = TypeRestriction::exact(Value::Int(1));
        let b = TypeRestriction::unrestricted(int(0, 10));
        let merged = a.intersection(&b);
        assert_eq!(merged.constant(), Some(&Value::Int(1)));
    }
}
