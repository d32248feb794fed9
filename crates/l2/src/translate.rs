//! Lowers a sequence of [`L2Instruction`]s into a directly-callable
//! [`Chunk`].

use crate::instruction::{L2Instruction, OperandPurpose};
use crate::register::Register;
use glyph_core::{ErrorKind, RuntimeError, Value};
use std::sync::Arc;

/// The register file a chunk executes against. Three separate banks
/// (object/int/float) are the whole point of L2: an `Int` register never
/// pays for a tag check.
#[derive(Debug, Default)]
pub struct Frame {
    pub int_regs: Vec<i64>,
    pub float_regs: Vec<f64>,
    pub object_regs: Vec<Value>,
}

impl Frame {
    pub fn new(int_slots: usize, float_slots: usize, object_slots: usize) -> Self {
        Frame {
            int_regs: vec![0; int_slots],
            float_regs: vec![0.0; float_slots],
            object_regs: vec![Value::Bool(false); object_slots],
        }
    }
}

#[derive(Debug, Clone)]
pub enum PrimitiveResult {
    Returned(Value),
    Failed(RuntimeError),
}

/// A call to a Glyph-level function from within a chunk. Chunks don't
/// know how to invoke arbitrary functions themselves — that requires the
/// fiber scheduler and method dispatch that live in `glyph-runtime` — so
/// `lower` takes a callback that does the actual invocation and simply
/// wires its result back into the chunk's control flow.
pub type CallHook = Arc<dyn Fn(&Value, &[Value]) -> PrimitiveResult + Send + Sync>;

/// A translated, directly-callable unit of L2 code. This is the "host-
/// executable result" an L2 lowering produces: a closure that runs
/// against a [`Frame`] and returns a [`PrimitiveResult`], with no
/// intermediate textual or object-file representation.
pub type Chunk = Box<dyn Fn(&mut Frame, &CallHook) -> PrimitiveResult + Send + Sync>;

pub struct Translator;

impl Translator {
    /// Lower `instructions` (indexed by position; `PcOperand::target` is
    /// an index into this same slice) into a [`Chunk`].
    pub fn lower(instructions: Vec<L2Instruction>) -> Chunk {
        let instructions = Arc::new(instructions);
        Box::new(move |frame, call_hook| {
            let mut pc = 0usize;
            loop {
                if pc >= instructions.len() {
                    return PrimitiveResult::Failed(RuntimeError::new(
                        ErrorKind::OperationNotSupported,
                        "chunk fell off the end of its instruction stream",
                    ));
                }
                match &instructions[pc] {
                    L2Instruction::MoveInt { from, to } => {
                        frame.int_regs[*to as usize] = frame.int_regs[*from as usize];
                        pc += 1;
                    }
                    L2Instruction::MoveObject { from, to } => {
                        frame.object_regs[*to as usize] = frame.object_regs[*from as usize].clone();
                        pc += 1;
                    }
                    L2Instruction::BoxInt { int, out } => {
                        frame.object_regs[*out as usize] = Value::Int(frame.int_regs[*int as usize]);
                        pc += 1;
                    }
                    L2Instruction::UnboxInt { object, out, on_failure } => {
                        match &frame.object_regs[*object as usize] {
                            Value::Int(n) => {
                                frame.int_regs[*out as usize] = *n;
                                pc += 1;
                            }
                            _ => pc = jump_target(on_failure, OperandPurpose::Failure),
                        }
                    }
                    L2Instruction::AddIntToIntConstant {
                        addend,
                        constant,
                        out,
                        on_success,
                        on_failure,
                    } => match frame.int_regs[*addend as usize].checked_add(*constant) {
                        Some(sum) => {
                            frame.int_regs[*out as usize] = sum;
                            pc = jump_target(on_success, OperandPurpose::Success);
                        }
                        None => pc = jump_target(on_failure, OperandPurpose::Failure),
                    },
                    L2Instruction::JumpIfIntLess { a, b, on_true, on_false } => {
                        pc = if frame.int_regs[*a as usize] < frame.int_regs[*b as usize] {
                            on_true.target as usize
                        } else {
                            on_false.target as usize
                        };
                    }
                    L2Instruction::Jump(target) => pc = *target as usize,
                    L2Instruction::ReturnObject(reg) => {
                        return PrimitiveResult::Returned(frame.object_regs[*reg as usize].clone());
                    }
                    L2Instruction::Call { function, args, out } => {
                        let function_value = frame.object_regs[*function as usize].clone();
                        let arg_values: Vec<Value> = args
                            .iter()
                            .map(|r: &Register| match r.kind {
                                crate::register::RegisterKind::Int => {
                                    Value::Int(frame.int_regs[r.id as usize])
                                }
                                crate::register::RegisterKind::Float => {
                                    Value::Float(frame.float_regs[r.id as usize])
                                }
                                crate::register::RegisterKind::Object => {
                                    frame.object_regs[r.id as usize].clone()
                                }
                            })
                            .collect();
                        match call_hook(&function_value, &arg_values) {
                            PrimitiveResult::Returned(v) => {
                                frame.object_regs[*out as usize] = v;
                                pc += 1;
                            }
                            failed @ PrimitiveResult::Failed(_) => return failed,
                        }
                    }
                }
            }
        })
    }
}

fn jump_target(operand: &crate::instruction::PcOperand, expected: OperandPurpose) -> usize {
    debug_assert_eq!(operand.purpose, expected);
    operand.target as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::PcOperand;

    fn no_op_call_hook() -> CallHook {
        Arc::new(|_f, _args| {
            PrimitiveResult::Failed(RuntimeError::new(ErrorKind::NoMethod, "no calls in this test"))
        })
    }

    #[test]
    fn saturating_add_takes_success_edge_on_no_overflow() {
        let instructions = vec![
            L2Instruction::AddIntToIntConstant {
                addend: 0,
                constant: 1,
                out: 0,
                on_success: PcOperand { target: 2, purpose: OperandPurpose::Success },
                on_failure: PcOperand { target: 3, purpose: OperandPurpose::Failure },
            },
            L2Instruction::Jump(99), // never reached
            L2Instruction::BoxInt { int: 0, out: 0 },
            L2Instruction::ReturnObject(0),
        ];
        let chunk = Translator::lower(vec![
            instructions[0].clone(),
            instructions[1].clone(),
            instructions[2].clone(),
            L2Instruction::ReturnObject(0),
        ]);
        let mut frame = Frame::new(1, 0, 1);
        frame.int_regs[0] = 41;
        let hook = no_op_call_hook();
        match chunk(&mut frame, &hook) {
            PrimitiveResult::Returned(Value::Int(n)) => assert_eq!(n, 42),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn saturating_add_takes_failure_edge_on_overflow() {
        let chunk = Translator::lower(vec![
            L2Instruction::AddIntToIntConstant {
                addend: 0,
                constant: 1,
                out: 0,
                on_success: PcOperand { target: 5, purpose: OperandPurpose::Success },
                on_failure: PcOperand { target: 1, purpose: OperandPurpose::Failure },
            },
            L2Instruction::ReturnObject(1),
        ]);
        let mut frame = Frame::new(1, 0, 2);
        frame.int_regs[0] = i64::MAX;
        frame.object_regs[1] = Value::Atom(std::sync::Arc::from("overflow"));
        let hook = no_op_call_hook();
        match chunk(&mut frame, &hook) {
            PrimitiveResult::Returned(Value::Atom(a)) => assert_eq!(a.as_ref(), "overflow"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unbox_failure_edge_on_non_int() {
        let chunk = Translator::lower(vec![
            L2Instruction::UnboxInt {
                object: 0,
                out: 0,
                on_failure: PcOperand { target: 1, purpose: OperandPurpose::Failure },
            },
            L2Instruction::ReturnObject(0),
        ]);
        let mut frame = Frame::new(1, 0, 1);
        frame.object_regs[0] = Value::Bool(true);
        let hook = no_op_call_hook();
        match chunk(&mut frame, &hook) {
            PrimitiveResult::Returned(Value::Bool(true)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
