//! Variable-usage optimization.
//!
//! While emitting a code body, the compiler tracks the last instruction
//! that reads each local/outer slot. That last read can clear the slot on
//! its way out (`can_clear`), letting the interpreter drop the reference
//! eagerly instead of holding it until the whole frame dies — material
//! for avoiding needless reference-count churn on large structures held
//! in short-lived locals.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessNote {
    pub last_access_instruction: usize,
    pub is_last_access: bool,
    pub can_clear: bool,
}

/// Tracks, per local slot, the instruction index of its most recent read
/// seen so far and whether that read may clear the slot.
#[derive(Debug, Default)]
pub struct UsageOptimizer {
    /// slot index -> (last instruction that read it, whether it was ever
    /// written again afterwards within the scan so far)
    last_read: HashMap<u32, usize>,
    notes: HashMap<(u32, usize), AccessNote>,
}

impl UsageOptimizer {
    pub fn new() -> Self {
        UsageOptimizer::default()
    }

    /// Record a read of `slot` at `instruction`. A slot can be cleared on
    /// this access only if no later read of the same slot has already
    /// been recorded (this optimizer is meant to be fed in a single
    /// forward pass, then [`Self::finalize`] fixes up `is_last_access`
    /// using the truly-last write seen per slot).
    pub fn record_read(&mut self, slot: u32, instruction: usize) {
        self.last_read.insert(slot, instruction);
        self.notes.insert(
            (slot, instruction),
            AccessNote {
                last_access_instruction: instruction,
                is_last_access: true, // provisional; corrected in finalize
                can_clear: true,
            },
        );
    }

    /// After a full forward pass, mark every read that isn't truly the
    /// slot's last as `is_last_access = false`.
    pub fn finalize(mut self) -> HashMap<(u32, usize), AccessNote> {
        for ((slot, instruction), note) in self.notes.iter_mut() {
            let last = self.last_read.get(slot).copied().unwrap_or(*instruction);
            note.is_last_access = *instruction == last;
            note.can_clear = note.is_last_access;
        }
        self.notes
    }

    pub fn note_at(&self, slot: u32, instruction: usize) -> Option<&AccessNote> {
        self.notes.get(&(slot, instruction))
    }
}
