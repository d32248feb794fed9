//! Typed virtual registers and the coloring pass that assigns them real
//! frame slots.

use glyph_core::{Type, TypeRestriction};
use std::collections::HashMap;

/// The three register banks L2 distinguishes — unboxed `Int`/`Float`
/// registers skip the tag dispatch a generic `Object` register would
/// need, which is the entire point of having an L2 at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Object,
    Int,
    Float,
}

/// A virtual register: an id, a kind, and (once colored) the physical
/// slot index in its kind's bank.
#[derive(Debug)]
pub struct Register {
    pub id: u32,
    pub kind: RegisterKind,
    pub restriction: TypeRestriction,
    colored_index: Option<u32>,
}

impl Register {
    pub fn new(id: u32, kind: RegisterKind, restriction: TypeRestriction) -> Self {
        Register {
            id,
            kind,
            restriction,
            colored_index: None,
        }
    }

    pub fn colored_index(&self) -> Option<u32> {
        self.colored_index
    }
}

/// A live range: the instruction-index span `[start, end]` (inclusive)
/// during which a register's value is needed.
#[derive(Debug, Clone, Copy)]
pub struct LiveRange {
    pub register: u32,
    pub start: u32,
    pub end: u32,
}

/// The full set of registers for one L2 translation unit, plus the phi-
/// style edge-narrowing operations used while building it.
#[derive(Debug, Default)]
pub struct RegisterSet {
    registers: HashMap<u32, Register>,
    next_id: u32,
}

impl RegisterSet {
    pub fn new() -> Self {
        RegisterSet::default()
    }

    pub fn allocate(&mut self, kind: RegisterKind, restriction: TypeRestriction) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.registers.insert(id, Register::new(id, kind, restriction));
        id
    }

    pub fn get(&self, id: u32) -> Option<&Register> {
        self.registers.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Register> {
        self.registers.get_mut(&id)
    }

    /// Narrow `id`'s restriction along a taken-branch edge.
    pub fn restrict_to(&mut self, id: u32, t: &Type) {
        if let Some(r) = self.registers.get_mut(&id) {
            r.restriction = r.restriction.restricted_to(t);
        }
    }

    /// Narrow `id`'s restriction along a not-taken-branch edge.
    pub fn restrict_without(&mut self, id: u32, t: &Type) {
        if let Some(r) = self.registers.get_mut(&id) {
            r.restriction = r.restriction.restricted_without_type(t);
        }
    }

    /// Merge restrictions for `id` coming from two converging control-flow
    /// edges (e.g. the join point after an `if`/`else`).
    pub fn merge_edges(&mut self, id: u32, from_a: &TypeRestriction, from_b: &TypeRestriction) {
        if let Some(r) = self.registers.get_mut(&id) {
            r.restriction = from_a.union(from_b);
        }
    }

    /// Assign each register a physical index within its kind's bank,
    /// reusing an index already retired by a non-overlapping live range
    /// (linear-scan register coloring). Returns the number of physical
    /// slots needed per bank.
    pub fn color(&mut self, live_ranges: &[LiveRange]) -> HashMap<RegisterKind, u32> {
        let mut by_kind: HashMap<RegisterKind, Vec<&LiveRange>> = HashMap::new();
        for lr in live_ranges {
            if let Some(reg) = self.registers.get(&lr.register) {
                by_kind.entry(reg.kind).or_default().push(lr);
            }
        }

        let mut bank_sizes = HashMap::new();
        for (kind, mut ranges) in by_kind {
            ranges.sort_by_key(|r| r.start);
            let mut active: Vec<(LiveRange, u32)> = Vec::new();
            let mut free_slots: Vec<u32> = Vec::new();
            let mut next_slot = 0u32;
            for lr in ranges {
                active.retain(|(active_lr, slot)| {
                    if active_lr.end < lr.start {
                        free_slots.push(*slot);
                        false
                    } else {
                        true
                    }
                });
                let slot = free_slots.pop().unwrap_or_else(|| {
                    let s = next_slot;
                    next_slot += 1;
                    s
                });
                active.push((*lr, slot));
                if let Some(reg) = self.registers.get_mut(&lr.register) {
                    reg.colored_index = Some(slot);
                }
            }
            bank_sizes.insert(kind, next_slot);
        }
        bank_sizes
    }

    /// Build a fresh `RegisterSet` restricted to the subset reachable
    /// after coloring (copies coloring results; used when splitting a
    /// translation unit after the main coloring pass, e.g. for an inlined
    /// callee with its own frame).
    pub fn copy_after_coloring(&self) -> RegisterSet {
        RegisterSet {
            registers: self.registers.clone(),
            next_id: self.next_id,
        }
    }
}

impl Clone for Register {
    fn clone(&self) -> Self {
        Register {
            id: self.id,
            kind: self.kind,
            restriction: self.restriction.clone(),
            colored_index: self.colored_index,
        }
    }
}
