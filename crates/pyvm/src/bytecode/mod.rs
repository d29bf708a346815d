//! Bytecode representation and virtual machine.
//!
//! # Module Structure
//!
//! - `op` - Opcode table, operand decoding and the comparison table
//! - `code` - Code object containing bytecode and metadata
//! - `builder` - CodeBuilder for assembling code objects by hand
//! - `vm` - Interpreter executing code objects frame by frame

mod builder;
mod code;
mod op;
mod vm;

pub use builder::{CodeBuilder, Label};
pub use code::{Code, Constant, CO_GENERATOR, CO_VARARGS, CO_VARKEYWORDS};
pub use op::{
    decode_at, instructions, CompareOp, DecodeError, Instruction, InvalidOpcodeError, JumpKind, Opcode, Operand,
    HAVE_ARGUMENT,
};
pub use vm::Interpreter;
