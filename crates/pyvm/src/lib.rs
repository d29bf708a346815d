#![doc = include_str!("../../../README.md")]
mod args;
mod builtins;
mod bytecode;
mod cell;
mod config;
mod exception;
mod for_iterator;
mod frame;
mod function;
mod io;
mod loader;
pub mod marshal;
mod namespace;
mod operators;
mod session;
mod types;
mod value;

pub use crate::{
    builtins::{Builtins, BuiltinsFunctions},
    bytecode::{
        decode_at, instructions, Code, CodeBuilder, CompareOp, Constant, DecodeError, Instruction, Interpreter,
        InvalidOpcodeError, JumpKind, Label, Opcode, Operand, CO_GENERATOR, CO_VARARGS, CO_VARKEYWORDS, HAVE_ARGUMENT,
    },
    cell::Cell,
    config::{OperandEncoding, VmConfig},
    exception::{ExcType, RunError, RunResult, SimpleException},
    for_iterator::ForIterator,
    frame::Frame,
    function::Function,
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    loader::{load_file, load_pyc, looks_like_pyc, LoadError, LoaderConfig, Program, PYC_HEADER_LEN},
    namespace::{builtin_globals, Globals, Namespace},
    operators::{BinaryOp, UnaryOp},
    session::{Outcome, Session},
    types::{Dict, Range, Set, Type},
    value::{HashKey, Value},
};
