//! Computes the maximum stack depth a `CompiledCode` body reaches, so the
//! interpreter can preallocate a stack of exactly the right size instead
//! of growing it (or over-allocating) at run time.

use crate::opcodes::{Opcode, StackEffect};

/// Walks a sequence of (opcode, call-argument-count-if-variable) pairs,
/// tracking current and maximum stack depth.
#[derive(Debug, Default)]
pub struct StackTracker {
    current: i32,
    max: i32,
}

impl StackTracker {
    pub fn new() -> Self {
        StackTracker::default()
    }

    /// Record one instruction. `variable_arg` is the argument count for
    /// opcodes whose effect depends on an operand (`Call`: pops N args
    /// and a function, pushes one result; `MakeTuple`: pops N elements,
    /// pushes one tuple).
    pub fn record(&mut self, op: Opcode, variable_arg: Option<u32>) {
        let delta = match op.stack_effect() {
            StackEffect::Net(d) => d,
            StackEffect::Variable => match op {
                Opcode::Call | Opcode::CallWithPrimitive => {
                    -(variable_arg.unwrap_or(0) as i32) - 1 + 1
                }
                Opcode::MakeTuple | Opcode::CreateFunction => {
                    -(variable_arg.unwrap_or(0) as i32) + 1
                }
                Opcode::PermuteTuple => 0,
                _ => 0,
            },
        };
        self.current += delta;
        self.max = self.max.max(self.current);
        debug_assert!(self.current >= 0, "stack underflow tracking {op:?}");
    }

    pub fn max_depth(&self) -> u32 {
        self.max.max(0) as u32
    }

    pub fn current_depth(&self) -> i32 {
        self.current
    }
}
