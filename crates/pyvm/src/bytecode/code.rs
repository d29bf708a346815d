//! Code objects: the immutable compiled unit the interpreter executes.

use std::{fmt::Write, rc::Rc};

use crate::{
    bytecode::op::{instructions, CompareOp, Instruction, JumpKind, Opcode},
    config::OperandEncoding,
    exception::RunResult,
    loader::LoadError,
    types::Set,
    value::Value,
};

/// Function takes `*args`.
pub const CO_VARARGS: u32 = 0x04;
/// Function takes `**kwargs`.
pub const CO_VARKEYWORDS: u32 = 0x08;
/// Function body is a generator.
pub const CO_GENERATOR: u32 = 0x20;

/// A literal from a code object's constant pool.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<Constant>),
    FrozenSet(Vec<Constant>),
    Code(Rc<Code>),
}

impl Constant {
    /// Materializes the constant as a runtime value.
    ///
    /// Fails only for a frozenset constant holding an unhashable member.
    pub fn to_value(&self) -> RunResult<Value> {
        Ok(match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::Str(s.clone()),
            Self::Bytes(b) => Value::Bytes(b.clone()),
            Self::Tuple(items) => Value::new_tuple(items.iter().map(Self::to_value).collect::<RunResult<_>>()?),
            Self::FrozenSet(items) => {
                let values = items.iter().map(Self::to_value).collect::<RunResult<Vec<_>>>()?;
                Value::new_set(Set::from_values(values)?)
            }
            Self::Code(code) => Value::Code(code.clone()),
        })
    }

    fn nested_code(&self) -> Vec<&Code> {
        match self {
            Self::Code(code) => vec![&**code],
            Self::Tuple(items) | Self::FrozenSet(items) => items.iter().flat_map(Self::nested_code).collect(),
            _ => Vec::new(),
        }
    }

    fn short_repr(&self) -> String {
        match self {
            Self::Code(code) => format!("<code object {}>", code.name),
            other => other.to_value().map_or_else(|_| "frozenset(...)".to_owned(), |v| v.py_repr()),
        }
    }
}

impl From<i64> for Constant {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Constant {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Constant {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Constant {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<Code> for Constant {
    fn from(code: Code) -> Self {
        Self::Code(Rc::new(code))
    }
}

/// An immutable compiled unit: constant pool, name tables and raw instruction bytes.
///
/// Produced by the `.pyc` loader, by `Code::load` from a snapshot, or by
/// [`CodeBuilder`](crate::CodeBuilder). Shared read-only by every function created from it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Code {
    /// Number of positional parameters; they are the first entries of `varnames`.
    pub arg_count: u32,
    /// Must be zero for the code to be callable.
    pub kwonly_arg_count: u32,
    pub nlocals: u32,
    pub stack_size: u32,
    pub flags: u32,
    pub code: Vec<u8>,
    pub consts: Vec<Constant>,
    /// Global and attribute names, addressed by the `*_NAME`/`*_GLOBAL` opcodes.
    pub names: Vec<String>,
    /// Local slot names, addressed by the `*_FAST` opcodes.
    pub varnames: Vec<String>,
    /// Names captured from enclosing functions.
    pub freevars: Vec<String>,
    /// Locals captured by nested functions.
    pub cellvars: Vec<String>,
    pub filename: String,
    pub name: String,
    pub first_line: u32,
    pub lnotab: Vec<u8>,
}

impl Code {
    /// An empty module-level code object, the starting point for builders.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            arg_count: 0,
            kwonly_arg_count: 0,
            nlocals: 0,
            stack_size: 0,
            flags: 0,
            code: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
            filename: "<builder>".to_owned(),
            name: name.into(),
            first_line: 1,
            lnotab: Vec::new(),
        }
    }

    /// Checks that the instruction stream only uses supported opcodes and that the
    /// parameter count fits the local table, recursing into nested code constants.
    pub fn validate(&self) -> Result<(), LoadError> {
        for decoded in instructions(&self.code) {
            decoded.map_err(|source| LoadError::Bytecode {
                name: self.name.clone(),
                source,
            })?;
        }
        let params = self.arg_count as usize + self.kwonly_arg_count as usize;
        if params > self.varnames.len() {
            return Err(LoadError::InvalidCode {
                name: self.name.clone(),
                reason: format!("{params} parameters but {} local names", self.varnames.len()),
            });
        }
        self.consts
            .iter()
            .flat_map(Constant::nested_code)
            .try_for_each(Self::validate)
    }

    /// Name of a deref slot: cell variables first, then free variables.
    #[must_use]
    pub fn deref_name(&self, index: usize) -> Option<&str> {
        match index.checked_sub(self.cellvars.len()) {
            None => self.cellvars.get(index),
            Some(free_index) => self.freevars.get(free_index),
        }
        .map(String::as_str)
    }

    /// Serializes the code object to a compact binary snapshot.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes and validates a snapshot written by `dump()`.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        let code: Self = postcard::from_bytes(bytes)?;
        code.validate()?;
        Ok(code)
    }

    /// Human-readable listing, one instruction per line, followed by nested code objects.
    #[must_use]
    pub fn disassemble(&self, encoding: OperandEncoding) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out, encoding);
        out
    }

    fn disassemble_into(&self, out: &mut String, encoding: OperandEncoding) {
        // writing to a String cannot fail
        let _ = writeln!(out, "Disassembly of <code object {}, file \"{}\">:", self.name, self.filename);
        for decoded in instructions(&self.code) {
            match decoded {
                Ok(instr) => {
                    let _ = writeln!(out, "{}", self.format_instruction(&instr, encoding));
                }
                Err(err) => {
                    let _ = writeln!(out, "  !! {err}");
                }
            }
        }
        for nested in self.consts.iter().flat_map(Constant::nested_code) {
            out.push('\n');
            nested.disassemble_into(out, encoding);
        }
    }

    /// Formats a single instruction, resolving its operand against the code's tables.
    #[must_use]
    pub fn format_instruction(&self, instr: &Instruction, encoding: OperandEncoding) -> String {
        let name = instr.opcode.name();
        let Some(operand) = instr.operand else {
            return format!("{:>6} {name}", instr.offset);
        };
        let arg = operand.arg(encoding);
        let index = usize::from(arg);
        let detail = match instr.opcode {
            Opcode::LoadConst => self.consts.get(index).map(Constant::short_repr),
            Opcode::LoadName
            | Opcode::StoreName
            | Opcode::DeleteName
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal => self.names.get(index).cloned(),
            Opcode::LoadFast | Opcode::StoreFast | Opcode::DeleteFast => self.varnames.get(index).cloned(),
            Opcode::LoadDeref | Opcode::StoreDeref | Opcode::LoadClosure => self.deref_name(index).map(str::to_owned),
            Opcode::CompareOp => CompareOp::from_repr(operand.lo).map(|op| op.symbol().to_owned()),
            Opcode::CallFunction | Opcode::MakeFunction | Opcode::MakeClosure => {
                let (lo, hi) = operand.split();
                Some(format!("{lo} positional, {hi} keyword"))
            }
            op => match op.jump_kind() {
                Some(JumpKind::Absolute) => Some(format!("to {arg}")),
                Some(JumpKind::Relative) => Some(format!("to {}", instr.next_offset() + index)),
                None => None,
            },
        };
        match detail {
            Some(detail) => format!("{:>6} {name:<22}{arg:>5} ({detail})", instr.offset),
            None => format!("{:>6} {name:<22}{arg:>5}", instr.offset),
        }
    }
}
