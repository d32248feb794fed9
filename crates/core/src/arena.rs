//! Generational value arena
//!
//! Continuations can reach functions whose code holds literals that are
//! themselves continuations, so the value graph can be cyclic. Spec §9
//! resolves this with "an arena-and-index representation: values live in a
//! generational arena; references are `(generation, index)`." This module
//! is that arena. The equality-driven "indirection" described in spec §4.A
//! is `Arena::redirect`, which installs a lazily-followed `redirect_to` on
//! the less-shared of two structurally-equal slots.

use std::fmt;

/// A reference into an `Arena<T>`: a slot index plus the generation the
/// slot held when the reference was taken. Stale references (slot reused
/// after a generation bump) are never followed silently — `Arena::get`
/// returns `None` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef {
    index: u32,
    generation: u32,
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    occupied: bool,
    value: Option<T>,
    /// Lazily-walked redirect installed when two slots are found to hold
    /// structurally-equal values during equality (spec §4.A, §9).
    redirect_to: Option<ValueRef>,
}

/// A generational arena of values. Reused slots bump their generation, so a
/// `ValueRef` taken before a reuse cannot alias the new occupant.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning its reference.
    pub fn insert(&mut self, value: T) -> ValueRef {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.occupied = true;
            slot.value = Some(value);
            slot.redirect_to = None;
            ValueRef {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                occupied: true,
                value: Some(value),
                redirect_to: None,
            });
            ValueRef {
                index,
                generation: 0,
            }
        }
    }

    /// Remove the value at `r`, bumping the slot's generation so prior
    /// references become stale.
    pub fn remove(&mut self, r: ValueRef) -> Option<T> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if !slot.occupied || slot.generation != r.generation {
            return None;
        }
        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index);
        slot.value.take()
    }

    fn raw_get(&self, r: ValueRef) -> Option<&Slot<T>> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.occupied && slot.generation == r.generation {
            Some(slot)
        } else {
            None
        }
    }

    /// Resolve `r` through any chain of redirects, returning the final
    /// live reference. Returns `r` itself if there is no redirect.
    pub fn resolve(&self, r: ValueRef) -> ValueRef {
        let mut current = r;
        let mut hops = 0usize;
        while let Some(slot) = self.raw_get(current) {
            match slot.redirect_to {
                Some(next) if hops < self.slots.len() => {
                    current = next;
                    hops += 1;
                }
                _ => break,
            }
        }
        current
    }

    pub fn get(&self, r: ValueRef) -> Option<&T> {
        let resolved = self.resolve(r);
        self.raw_get(resolved).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, r: ValueRef) -> Option<&mut T> {
        let resolved = self.resolve(r);
        let slot = self.slots.get_mut(resolved.index as usize)?;
        if slot.occupied && slot.generation == resolved.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Install a redirect from `from` to `to`. Subsequent `get`/`get_mut`
    /// calls against `from` transparently return `to`'s value. Used by
    /// equality-driven unification to make the less-shared operand an
    /// alias of the more-shared one (spec §4.A).
    pub fn redirect(&mut self, from: ValueRef, to: ValueRef) {
        if from == to {
            return;
        }
        if let Some(slot) = self.slots.get_mut(from.index as usize) {
            if slot.occupied && slot.generation == from.generation {
                slot.redirect_to = Some(to);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_round_trip() {
        let mut arena: Arena<i32> = Arena::new();
        let r = arena.insert(42);
        assert_eq!(arena.get(r), Some(&42));
        assert_eq!(arena.remove(r), Some(42));
        assert_eq!(arena.get(r), None);
    }

    #[test]
    fn stale_reference_after_slot_reuse_is_rejected() {
        let mut arena: Arena<i32> = Arena::new();
        let r1 = arena.insert(1);
        arena.remove(r1);
        let r2 = arena.insert(2);
        assert_eq!(r1.index, r2.index);
        assert_ne!(r1.generation, r2.generation);
        assert_eq!(arena.get(r1), None);
        assert_eq!(arena.get(r2), Some(&2));
    }

    #[test]
    fn redirect_is_followed_lazily() {
        let mut arena: Arena<&'static str> = Arena::new();
        let a = arena.insert("shared value");
        let b = arena.insert("shared value");
        arena.redirect(b, a);
        assert_eq!(arena.get(b), Some(&"shared value"));
        assert_eq!(arena.resolve(b), a);
    }

    #[test]
    fn cyclic_value_graph_via_mutation_after_insert() {
        // Two values that reference each other: insert placeholders, then
        // mutate them to point at one another, modelling a continuation
        // whose captured function's code literal is another continuation.
        let mut arena: Arena<Option<ValueRef>> = Arena::new();
        let a = arena.insert(None);
        let b = arena.insert(None);
        *arena.get_mut(a).unwrap() = Some(b);
        *arena.get_mut(b).unwrap() = Some(a);
        assert_eq!(arena.get(a).unwrap(), &Some(b));
        assert_eq!(arena.get(b).unwrap(), &Some(a));
    }
}
