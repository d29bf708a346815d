//! CodeBuilder for assembling code objects by hand.
//!
//! Tests and embedders use this in place of an external compiler. Jumps are emitted
//! against labels and patched when the code object is built, so forward references need
//! no manual offset arithmetic.

use crate::{
    bytecode::{
        code::{Code, Constant},
        op::{JumpKind, Opcode, Operand},
    },
    loader::LoadError,
};

/// A jump target, bound to a byte offset with [`CodeBuilder::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct JumpFixup {
    /// Offset of the jump instruction itself.
    at: usize,
    label: Label,
    kind: JumpKind,
}

/// Incrementally assembles a [`Code`] object.
///
/// ```
/// use pyvm::{CodeBuilder, Opcode};
///
/// let mut b = CodeBuilder::new("<module>");
/// b.load_const(2i64).load_const(3i64).emit(Opcode::BinaryAdd).emit(Opcode::ReturnValue);
/// let code = b.build().unwrap();
/// assert_eq!(code.code.len(), 8);
/// ```
#[derive(Debug)]
pub struct CodeBuilder {
    code: Code,
    labels: Vec<Option<usize>>,
    fixups: Vec<JumpFixup>,
}

impl CodeBuilder {
    /// Starts a module-level code object.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            code: Code::empty(name),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Starts a function body whose positional parameters are the first local names.
    #[must_use]
    pub fn function(name: impl Into<String>, params: &[&str]) -> Self {
        let mut builder = Self::new(name);
        builder.code.arg_count = u32::try_from(params.len()).unwrap_or(u32::MAX);
        builder.code.varnames = params.iter().map(|p| (*p).to_owned()).collect();
        builder
    }

    /// Sets the code flags (e.g. `CO_VARARGS`).
    pub fn flags(&mut self, flags: u32) -> &mut Self {
        self.code.flags = flags;
        self
    }

    pub fn kwonly_arg_count(&mut self, count: u32) -> &mut Self {
        self.code.kwonly_arg_count = count;
        self
    }

    /// Current end of the instruction stream.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.code.code.len()
    }

    /// Adds a constant (reusing an equal one) and returns its index.
    pub fn add_const(&mut self, constant: impl Into<Constant>) -> u16 {
        let constant = constant.into();
        let existing = match constant {
            Constant::Code(_) => None,
            _ => self.code.consts.iter().position(|c| *c == constant),
        };
        index_u16(existing.unwrap_or_else(|| {
            self.code.consts.push(constant);
            self.code.consts.len() - 1
        }))
    }

    pub fn add_name(&mut self, name: &str) -> u16 {
        intern(&mut self.code.names, name)
    }

    pub fn add_varname(&mut self, name: &str) -> u16 {
        intern(&mut self.code.varnames, name)
    }

    /// Declares a cell variable. Declare all cell variables before any free variable,
    /// since free-variable deref indices start after the last cell variable.
    pub fn add_cellvar(&mut self, name: &str) -> u16 {
        intern(&mut self.code.cellvars, name)
    }

    /// Declares a free variable and returns its deref index.
    pub fn add_freevar(&mut self, name: &str) -> u16 {
        let index = intern(&mut self.code.freevars, name);
        index_u16(self.code.cellvars.len() + usize::from(index))
    }

    /// Emits an opcode without an operand.
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.code.code.push(opcode as u8);
        self
    }

    /// Emits an opcode with a 16-bit operand.
    pub fn emit_arg(&mut self, opcode: Opcode, arg: u16) -> &mut Self {
        let Operand { lo, hi } = Operand::from(arg);
        self.emit_args(opcode, lo, hi)
    }

    /// Emits an opcode with explicit low and high operand bytes.
    pub fn emit_args(&mut self, opcode: Opcode, lo: u8, hi: u8) -> &mut Self {
        self.code.code.extend_from_slice(&[opcode as u8, lo, hi]);
        self
    }

    /// Appends raw bytes, bypassing the opcode table.
    pub fn emit_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.code.extend_from_slice(bytes);
        self
    }

    #[must_use]
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let offset = self.offset();
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(offset);
        }
        self
    }

    /// Emits a jump opcode targeting `label`; the operand is patched at build time.
    pub fn emit_jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        let kind = opcode.jump_kind().unwrap_or(JumpKind::Absolute);
        self.fixups.push(JumpFixup {
            at: self.offset(),
            label,
            kind,
        });
        self.emit_args(opcode, 0, 0)
    }

    pub fn load_const(&mut self, constant: impl Into<Constant>) -> &mut Self {
        let index = self.add_const(constant);
        self.emit_arg(Opcode::LoadConst, index)
    }

    pub fn load_name(&mut self, name: &str) -> &mut Self {
        let index = self.add_name(name);
        self.emit_arg(Opcode::LoadName, index)
    }

    pub fn store_name(&mut self, name: &str) -> &mut Self {
        let index = self.add_name(name);
        self.emit_arg(Opcode::StoreName, index)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let index = self.add_name(name);
        self.emit_arg(Opcode::LoadGlobal, index)
    }

    pub fn store_global(&mut self, name: &str) -> &mut Self {
        let index = self.add_name(name);
        self.emit_arg(Opcode::StoreGlobal, index)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let index = self.add_varname(name);
        self.emit_arg(Opcode::LoadFast, index)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let index = self.add_varname(name);
        self.emit_arg(Opcode::StoreFast, index)
    }

    /// `CALL_FUNCTION` with `argc` positional arguments and no keywords.
    pub fn call(&mut self, argc: u8) -> &mut Self {
        self.emit_args(Opcode::CallFunction, argc, 0)
    }

    /// Emits `LOAD_CONST code; LOAD_CONST qualname; MAKE_FUNCTION ndefaults`.
    pub fn make_function(&mut self, code: Code, ndefaults: u8) -> &mut Self {
        let name = code.name.clone();
        self.load_const(code).load_const(name.as_str());
        self.emit_args(Opcode::MakeFunction, ndefaults, 0)
    }

    pub fn return_value(&mut self) -> &mut Self {
        self.emit(Opcode::ReturnValue)
    }

    /// Patches jumps and validates the result.
    pub fn build(self) -> Result<Code, LoadError> {
        let code = self.finish()?;
        code.validate()?;
        Ok(code)
    }

    /// Patches jumps without validating, for producing deliberately malformed code.
    pub fn build_unchecked(self) -> Result<Code, LoadError> {
        self.finish()
    }

    fn finish(mut self) -> Result<Code, LoadError> {
        for fixup in &self.fixups {
            let target = self
                .labels
                .get(fixup.label.0)
                .copied()
                .flatten()
                .ok_or_else(|| self.invalid(format!("jump at offset {} targets an unbound label", fixup.at)))?;
            let value = match fixup.kind {
                JumpKind::Absolute => target,
                JumpKind::Relative => target
                    .checked_sub(fixup.at + 3)
                    .ok_or_else(|| self.invalid(format!("relative jump at offset {} goes backwards", fixup.at)))?,
            };
            let value = u16::try_from(value).map_err(|_| self.invalid(format!("jump at offset {} too far", fixup.at)))?;
            let [lo, hi] = value.to_le_bytes();
            self.code.code[fixup.at + 1] = lo;
            self.code.code[fixup.at + 2] = hi;
        }
        self.code.nlocals = u32::try_from(self.code.varnames.len()).unwrap_or(u32::MAX);
        Ok(self.code)
    }

    fn invalid(&self, reason: String) -> LoadError {
        LoadError::InvalidCode {
            name: self.code.name.clone(),
            reason,
        }
    }
}

fn intern(table: &mut Vec<String>, name: &str) -> u16 {
    index_u16(table.iter().position(|n| n == name).unwrap_or_else(|| {
        table.push(name.to_owned());
        table.len() - 1
    }))
}

/// Operand indices are 16 bits wide; larger tables cannot be addressed.
fn index_u16(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}
