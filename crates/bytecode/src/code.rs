//! `CompiledCode`: the unit of compiled L1 bytecode.

use crate::lines::LineNumberMap;
use crate::opcodes::{Opcode, EXTENSION_BASE, EXTENSION_ESCAPE};
use crate::varint::{decode_operand, encode_operand};
use glyph_core::Value;
use serde::{Deserialize, Serialize};

/// The serializable subset of `Value` usable as a code-object literal.
/// Opaque runtime objects (`Function`, `Continuation`, channel/file
/// handles) never appear in the literal pool of the *wire format* — a
/// freshly-loaded code object reconstructs those lazily as its closures
/// are built, the same way the teacher's loader rebuilds non-serializable
/// runtime state after deserializing a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Atom(String),
    Str(String),
    Tuple(Vec<Literal>),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Atom(s) => Value::Atom(std::sync::Arc::from(s.as_str())),
            Literal::Str(s) => Value::string(s.clone()),
            Literal::Tuple(elements) => {
                Value::tuple(elements.iter().map(Literal::to_value).collect())
            }
        }
    }
}

/// Pack a sequence of nybbles (each `0..16`) into bytes, two per byte,
/// high nybble first. An odd-length stream pads the final low nybble
/// with zero.
pub fn pack_nybbles(nybbles: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nybbles.len().div_ceil(2));
    let mut iter = nybbles.chunks(2);
    for pair in &mut iter {
        let hi = pair[0];
        let lo = *pair.get(1).unwrap_or(&0);
        out.push((hi << 4) | lo);
    }
    out
}

/// Inverse of [`pack_nybbles`]; `nybble_count` disambiguates a
/// byte-padded stream from one with an even nybble count.
pub fn unpack_nybbles(bytes: &[u8], nybble_count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(nybble_count);
    for &byte in bytes {
        out.push(byte >> 4);
        out.push(byte & 0xF);
    }
    out.truncate(nybble_count);
    out
}

/// An L1 instruction as emitted by the assembler, before nybble packing.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<u64>,
    pub source_line: i32,
}

/// A unit of compiled bytecode: its instruction stream, literal pool, and
/// frame shape.
#[derive(Debug, Clone)]
pub struct CompiledCode {
    pub num_args: u16,
    pub num_locals: u16,
    pub num_outers: u16,
    pub max_stack_depth: u32,
    pub start_line: i32,
    pub literals: Vec<Literal>,
    instructions: Vec<Instruction>,
}

/// The serializable wire form of a `CompiledCode`, produced by
/// [`CompiledCode::to_wire`]/[`CompiledCode::from_wire`]. This is what
/// `glyph-modules`'s repository actually persists with `bincode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledCodeWire {
    pub num_args: u16,
    pub num_locals: u16,
    pub num_outers: u16,
    pub max_stack_depth: u32,
    pub start_line: i32,
    pub literals: Vec<Literal>,
    pub nybble_count: usize,
    pub packed_instructions: Vec<u8>,
    pub line_delta_count: usize,
    pub packed_line_deltas: Vec<u8>,
}

impl CompiledCode {
    pub fn new(
        num_args: u16,
        num_locals: u16,
        num_outers: u16,
        start_line: i32,
        literals: Vec<Literal>,
        instructions: Vec<Instruction>,
    ) -> Self {
        let mut tracker = crate::stack_tracker::StackTracker::new();
        for ins in &instructions {
            let variable_arg = match ins.opcode {
                Opcode::Call | Opcode::CallWithPrimitive | Opcode::MakeTuple => {
                    ins.operands.first().map(|&n| n as u32)
                }
                _ => None,
            };
            tracker.record(ins.opcode, variable_arg);
        }
        CompiledCode {
            num_args,
            num_locals,
            num_outers,
            max_stack_depth: tracker.max_depth(),
            start_line,
            literals,
            instructions,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Line number of instruction `index`, reconstructed by replaying the
    /// line-delta stream.
    pub fn line_at(&self, index: usize) -> i32 {
        let mut line = self.start_line;
        for ins in self.instructions.iter().take(index + 1) {
            line = ins.source_line;
        }
        line
    }

    fn nybble_stream(&self) -> (Vec<u8>, LineNumberMap) {
        let mut nybbles = Vec::new();
        let mut lines = LineNumberMap::new();
        let mut prev_line = self.start_line;
        for ins in &self.instructions {
            let raw = ins.opcode as u16;
            if raw < EXTENSION_BASE {
                nybbles.push(raw as u8);
            } else {
                nybbles.push(EXTENSION_ESCAPE);
                nybbles.extend(encode_operand((raw - EXTENSION_BASE) as u64));
            }
            for &operand in &ins.operands {
                nybbles.extend(encode_operand(operand));
            }
            lines.push_line(prev_line, ins.source_line);
            prev_line = ins.source_line;
        }
        (nybbles, lines)
    }

    pub fn to_wire(&self) -> CompiledCodeWire {
        let (nybbles, lines) = self.nybble_stream();
        let line_nybbles = lines.encode();
        CompiledCodeWire {
            num_args: self.num_args,
            num_locals: self.num_locals,
            num_outers: self.num_outers,
            max_stack_depth: self.max_stack_depth,
            start_line: self.start_line,
            literals: self.literals.clone(),
            nybble_count: nybbles.len(),
            packed_instructions: pack_nybbles(&nybbles),
            line_delta_count: self.instructions.len(),
            packed_line_deltas: pack_nybbles(&line_nybbles),
        }
    }

    pub fn from_wire(wire: &CompiledCodeWire) -> Self {
        let nybbles = unpack_nybbles(&wire.packed_instructions, wire.nybble_count);
        let mut pos = 0;
        let mut instructions = Vec::new();
        let line_deltas_nybbles =
            unpack_nybbles(&wire.packed_line_deltas, wire.packed_line_deltas.len() * 2);
        let line_map = LineNumberMap::decode(&line_deltas_nybbles, wire.line_delta_count);
        let mut line_index = 0;
        while pos < nybbles.len() {
            let first = nybbles[pos];
            pos += 1;
            let raw: u16 = if first == EXTENSION_ESCAPE {
                let ext = decode_operand(&nybbles, &mut pos);
                EXTENSION_BASE + ext as u16
            } else {
                first as u16
            };
            let opcode = Opcode::from_u16(raw).expect("valid opcode in wire stream");
            let operand_count = opcode.operand_count();
            let mut operands = Vec::with_capacity(operand_count);
            for _ in 0..operand_count {
                operands.push(decode_operand(&nybbles, &mut pos));
            }
            let line = line_map.line_at(wire.start_line, line_index);
            instructions.push(Instruction {
                opcode,
                operands,
                source_line: line,
            });
            line_index += 1;
        }
        CompiledCode {
            num_args: wire.num_args,
            num_locals: wire.num_locals,
            num_outers: wire.num_outers,
            max_stack_depth: wire.max_stack_depth,
            start_line: wire.start_line,
            literals: wire.literals.clone(),
            instructions,
        }
    }

    pub fn to_bincode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.to_wire())
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        let wire: CompiledCodeWire = bincode::deserialize(bytes)?;
        Ok(CompiledCode::from_wire(&wire))
    }
}
