//! L1: nybble-packed variable-width bytecode.
//!
//! Operands are packed four bits at a time into bands chosen by
//! magnitude, and instructions carry a parallel line-number delta stream
//! so a fault can be attributed to a source line without storing a full
//! line number per instruction. `CompiledCode` is the unit that ties a
//! nybble stream, its operand bands, and its line deltas together with
//! the metadata (argument/local/outer counts, max stack depth) the
//! interpreter needs to run it.

pub mod code;
pub mod lines;
pub mod opcodes;
pub mod stack_tracker;
pub mod usage;
pub mod varint;

pub use code::CompiledCode;
pub use lines::LineNumberMap;
pub use opcodes::Opcode;
pub use stack_tracker::StackTracker;
pub use usage::{AccessNote, UsageOptimizer};
pub use varint::{decode_operand, encode_operand};
