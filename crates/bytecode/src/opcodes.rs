//! The L1 opcode table.
//!
//! The first 16 opcodes (`0..16`) are single-nybble and cover the common
//! case: pushing literals and locals, calling, and returning. Opcodes at
//! or beyond 16 are "extensions": the instruction stream spends one
//! nybble (`15`, matching the band-5 varint prefix so a decoder can tell
//! opcodes and operands apart using the same band logic) signalling an
//! extension follows, then an operand nybble sequence carrying
//! `opcode - 16`. This keeps the 16 hottest opcodes at their cheapest
//! possible encoding while leaving the table open-ended.

use std::fmt;

pub const EXTENSION_ESCAPE: u8 = 15;
pub const EXTENSION_BASE: u16 = 16;

/// Each opcode's effect on stack depth, used by [`crate::StackTracker`].
/// `Variable` opcodes (calls) report their net effect via the operand
/// (argument count), so the tracker special-cases them rather than
/// reading this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    Net(i32),
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    PushLiteral = 0,
    PushLocal = 1,
    PushLastLocal = 2,
    PushOuter = 3,
    PushLastOuter = 4,
    PopIntoLocal = 5,
    PopIntoOuter = 6,
    Pop = 7,
    Call = 8,
    CallWithPrimitive = 9,
    Label = 10,
    Jump = 11,
    JumpIfFalse = 12,
    Return = 13,
    GetType = 14,
    Duplicate = 15,

    MakeTuple = 16,
    PermuteTuple = 17,
    Concatenate = 18,
    CreateFunction = 19,
    GetLiteralCompiledCode = 20,
}

impl Opcode {
    pub const ALL: &'static [Opcode] = &[
        Opcode::PushLiteral,
        Opcode::PushLocal,
        Opcode::PushLastLocal,
        Opcode::PushOuter,
        Opcode::PushLastOuter,
        Opcode::PopIntoLocal,
        Opcode::PopIntoOuter,
        Opcode::Pop,
        Opcode::Call,
        Opcode::CallWithPrimitive,
        Opcode::Label,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::Return,
        Opcode::GetType,
        Opcode::Duplicate,
        Opcode::MakeTuple,
        Opcode::PermuteTuple,
        Opcode::Concatenate,
        Opcode::CreateFunction,
        Opcode::GetLiteralCompiledCode,
    ];

    pub fn from_u16(raw: u16) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| *op as u16 == raw)
    }

    pub fn is_extension(self) -> bool {
        (self as u16) >= EXTENSION_BASE
    }

    /// The number of operand nybble-groups this opcode reads.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Label | Opcode::Return | Opcode::Pop | Opcode::Duplicate | Opcode::GetType => {
                0
            }
            Opcode::Call | Opcode::CallWithPrimitive | Opcode::MakeTuple | Opcode::Concatenate => {
                1
            }
            Opcode::CreateFunction => 2,
            _ => 1,
        }
    }

    pub fn stack_effect(self) -> StackEffect {
        use Opcode::*;
        use StackEffect::*;
        match self {
            PushLiteral | PushLocal | PushLastLocal | PushOuter | PushLastOuter
            | GetLiteralCompiledCode => Net(1),
            PopIntoLocal | PopIntoOuter | Pop | JumpIfFalse => Net(-1),
            Label | Jump | Return => Net(0),
            GetType => Net(0),
            Duplicate => Net(1),
            Call | CallWithPrimitive => Variable,
            MakeTuple | PermuteTuple => Variable,
            Concatenate => Net(-1),
            CreateFunction => Variable,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u16() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u16(*op as u16), Some(*op));
        }
    }

    #[test]
    fn extension_opcodes_are_marked() {
        assert!(!Opcode::Call.is_extension());
        assert!(Opcode::MakeTuple.is_extension());
    }
}
