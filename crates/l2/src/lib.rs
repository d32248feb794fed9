//! L2: a typed-register intermediate representation, lowered to a
//! directly-callable "chunk" rather than to a separate JIT backend.
//!
//! L1 (`glyph-bytecode`) is a stack machine; L2 assigns each stack slot a
//! register with a [`RegisterKind`] and a [`glyph_core::TypeRestriction`],
//! so the translator can skip runtime type dispatch whenever the
//! restriction already proves which branch applies (e.g.
//! `L2_ADD_INT_TO_INT_CONSTANT` never needs to check that both operands
//! are integers if the registers' restrictions already guarantee it).
//!
//! [`Translator::lower`] produces a [`Chunk`]: a boxed closure over an
//! interpreter frame. This is the idiomatic-Rust form of "lower to a
//! host-executable unit" — it satisfies the same contract an LLVM/
//! Cranelift JIT would (a callable that runs the translated code and
//! returns a `PrimitiveResult`) without requiring a JIT backend dependency
//! this workspace does not otherwise carry.

pub mod instruction;
pub mod register;
pub mod translate;

pub use instruction::{L2Instruction, OperandPurpose};
pub use register::{Register, RegisterKind, RegisterSet};
pub use translate::{Chunk, PrimitiveResult, Translator};
