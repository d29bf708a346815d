//! Bytecode virtual machine for executing code objects.
//!
//! The VM uses a stack-based execution model with one operand stack shared by every
//! active frame and a call stack of [`Frame`]s. Calls recurse into [`Interpreter::run_frame`]
//! on the host stack, so a raised exception unwinds by returning `Err` through each
//! nested activation until the host boundary.

mod binary;
mod call;
mod collections;
mod compare;
mod exceptions;

use std::rc::Rc;

use tracing::debug;

use crate::{
    bytecode::{
        code::Code,
        op::{decode_at, CompareOp, DecodeError, Instruction, Opcode},
    },
    cell::Cell,
    config::VmConfig,
    exception::{ExcType, RunError, RunResult, SimpleException},
    for_iterator::ForIterator,
    frame::Frame,
    io::PrintWriter,
    namespace::{builtin_globals, Globals, Namespace},
    operators::UnaryOp,
    value::Value,
};

/// What the dispatch loop does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Fall through to the following instruction.
    Next,
    /// Continue at the given byte offset.
    JumpTo(usize),
    /// Continue `delta` bytes past the following instruction.
    Relative(usize),
    /// Leave the frame; its return slot holds the result.
    Return,
}

/// The interpreter: call stack, operand stack, configuration and output sink.
///
/// Both stacks start empty and are shared across frames. A completed call always leaves
/// the operand stack exactly one value deeper than it was before the callable was
/// pushed; a raised exception leaves the stacks as they were at the failing instruction
/// (see [`Interpreter::reset`]).
#[derive(Debug)]
pub struct Interpreter<P: PrintWriter> {
    frames: Vec<Frame>,
    stack: Vec<Value>,
    config: VmConfig,
    writer: P,
}

impl<P: PrintWriter> Interpreter<P> {
    #[must_use]
    pub fn new(config: VmConfig, writer: P) -> Self {
        Self {
            frames: Vec::new(),
            stack: Vec::new(),
            config,
            writer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Runs `code` in a fresh root frame with a fresh global mapping.
    ///
    /// With `locals` set to `None`, name stores in `code` bind globals, which is how
    /// module-level code runs.
    pub fn exec_code(&mut self, code: Rc<Code>, locals: Option<Namespace>) -> RunResult<Value> {
        let frame = self.make_root_frame(code, locals);
        self.run_frame(frame)
    }

    /// A frame with a fresh global mapping seeded with the builtins.
    #[must_use]
    pub fn make_root_frame(&self, code: Rc<Code>, locals: Option<Namespace>) -> Frame {
        self.make_frame(code, builtin_globals(), locals)
    }

    /// A frame sharing `globals`, whose caller is the innermost active frame, if any.
    #[must_use]
    pub fn make_frame(&self, code: Rc<Code>, globals: Globals, locals: Option<Namespace>) -> Frame {
        Frame::new(code, globals, locals, self.frames.len().checked_sub(1))
    }

    /// Executes `frame` until it returns, yielding its return value.
    ///
    /// The frame is on the call stack for the duration of the loop and is popped on both
    /// return and unwind. Values the frame left on the operand stack above its entry depth
    /// are discarded on return.
    pub fn run_frame(&mut self, frame: Frame) -> RunResult<Value> {
        let base = self.stack.len();
        if self.config.trace_enabled() {
            debug!(
                depth = self.frames.len(),
                "entering frame\n{}",
                frame.code().disassemble(self.config.operand_encoding())
            );
        }
        self.frames.push(frame);
        let result = self.dispatch();
        let frame = self.frames.pop();
        let mut frame = frame.ok_or_else(|| RunError::internal("call stack underflow"))?;
        if self.config.trace_enabled() {
            debug!(
                depth = self.frames.len(),
                ok = result.is_ok(),
                "leaving frame\n{}",
                frame.code().disassemble(self.config.operand_encoding())
            );
        }
        result?;
        self.stack.truncate(base);
        Ok(frame.take_return_value())
    }

    /// The fetch-decode-execute loop over the innermost frame.
    fn dispatch(&mut self) -> RunResult<()> {
        loop {
            let frame = self.frame()?;
            let code = Rc::clone(frame.code());
            let ip = frame.ip();
            let instr = decode_at(&code.code, ip).map_err(|err| match err {
                DecodeError::Unsupported { .. } => RunError::unsupported(format!("{err} in {}", code.name)),
                DecodeError::Truncated { .. } | DecodeError::OutOfBounds { .. } => {
                    RunError::internal(format!("{err} in {}", code.name))
                }
            })?;
            if self.config.trace_enabled() {
                debug!(
                    ip,
                    opcode = instr.opcode.name(),
                    operand = instr.operand.map(|o| o.arg(self.config.operand_encoding())),
                    stack = self.stack.len(),
                    "exec"
                );
            }
            let next_ip = match self.execute(&code, instr)? {
                Flow::Next => instr.next_offset(),
                Flow::JumpTo(target) => target,
                Flow::Relative(delta) => instr.next_offset() + delta,
                Flow::Return => return Ok(()),
            };
            self.frame_mut()?.ip = next_ip;
        }
    }

    /// Runs one instruction of the innermost frame.
    fn execute(&mut self, code: &Code, instr: Instruction) -> RunResult<Flow> {
        // decoding guarantees an operand for every opcode at or above HAVE_ARGUMENT
        let operand = instr.operand.unwrap_or_default();
        let arg = usize::from(operand.arg(self.config.operand_encoding()));
        match instr.opcode {
            // === Stack Operations ===
            Opcode::PopTop => {
                self.pop()?;
            }
            Opcode::RotTwo => {
                let top = self.pop()?;
                let second = self.pop()?;
                self.push(top);
                self.push(second);
            }
            Opcode::RotThree => {
                let top = self.pop()?;
                let second = self.pop()?;
                let third = self.pop()?;
                self.push(top);
                self.push(third);
                self.push(second);
            }
            Opcode::DupTop => {
                let top = self.peek()?.clone();
                self.push(top);
            }
            Opcode::DupTopTwo => {
                let pair = self.peek_n(2)?.to_vec();
                self.stack.extend(pair);
            }
            Opcode::Nop
            | Opcode::PopBlock
            | Opcode::PopExcept
            | Opcode::SetupLoop
            | Opcode::SetupExcept
            | Opcode::SetupFinally => {}

            // === Operators ===
            Opcode::UnaryPositive => self.unary_op(UnaryOp::Positive)?,
            Opcode::UnaryNegative => self.unary_op(UnaryOp::Negative)?,
            Opcode::UnaryNot => self.unary_op(UnaryOp::Not)?,
            Opcode::UnaryInvert => self.unary_op(UnaryOp::Invert)?,
            Opcode::CompareOp => {
                let op = CompareOp::from_repr(u8::try_from(arg).unwrap_or(u8::MAX))
                    .ok_or_else(|| RunError::unsupported(format!("comparison index {arg}")))?;
                self.compare_op(op)?;
            }

            // === Subscripts and Iteration ===
            Opcode::BinarySubscr => self.binary_subscr()?,
            Opcode::StoreSubscr => self.store_subscr()?,
            Opcode::DeleteSubscr => self.delete_subscr()?,
            Opcode::GetIter => {
                let value = self.pop()?;
                self.push(ForIterator::iter_value(value)?);
            }
            Opcode::ForIter => return self.for_iter(arg),
            Opcode::UnpackSequence => self.unpack_sequence(arg)?,

            // === Containers ===
            Opcode::BuildTuple => self.build_tuple(arg)?,
            Opcode::BuildList => self.build_list(arg)?,
            Opcode::BuildSet => self.build_set(arg)?,
            Opcode::BuildMap => self.build_map(),
            Opcode::StoreMap => self.store_map()?,
            Opcode::ListAppend => self.list_append(arg)?,
            Opcode::SetAdd => self.set_add(arg)?,
            Opcode::MapAdd => self.map_add(arg)?,

            // === Variables ===
            Opcode::LoadConst => {
                let constant = code
                    .consts
                    .get(arg)
                    .ok_or_else(|| bad_index("constant", arg, code))?;
                self.push(constant.to_value()?);
            }
            Opcode::LoadName => {
                let name = name_at(&code.names, arg, code)?;
                let value = self.load_name(name)?;
                self.push(value);
            }
            Opcode::StoreName => {
                let name = name_at(&code.names, arg, code)?;
                let value = self.pop()?;
                let frame = self.frame_mut()?;
                match frame.locals_mut() {
                    Some(locals) => {
                        locals.insert(name.to_owned(), value);
                    }
                    None => {
                        frame.globals().borrow_mut().insert(name.to_owned(), value);
                    }
                }
            }
            Opcode::DeleteName => {
                let name = name_at(&code.names, arg, code)?;
                let frame = self.frame_mut()?;
                let removed = match frame.locals_mut() {
                    Some(locals) => locals.remove(name),
                    None => frame.globals().borrow_mut().remove(name),
                };
                if removed.is_none() {
                    return Err(ExcType::name_error(name));
                }
            }
            Opcode::LoadGlobal => {
                let name = name_at(&code.names, arg, code)?;
                let value = self.frame()?.globals().borrow().get(name).cloned();
                self.push(value.ok_or_else(|| ExcType::name_error(name))?);
            }
            Opcode::StoreGlobal => {
                let name = name_at(&code.names, arg, code)?;
                let value = self.pop()?;
                self.frame()?.globals().borrow_mut().insert(name.to_owned(), value);
            }
            Opcode::LoadFast => {
                let name = name_at(&code.varnames, arg, code)?;
                let value = self.frame()?.locals().and_then(|locals| locals.get(name)).cloned();
                self.push(value.ok_or_else(|| unbound_local(name))?);
            }
            Opcode::StoreFast => {
                let name = name_at(&code.varnames, arg, code)?;
                let value = self.pop()?;
                let locals = self
                    .frame_mut()?
                    .locals_mut()
                    .ok_or_else(|| RunError::internal(format!("STORE_FAST to '{name}' in a frame without locals")))?;
                locals.insert(name.to_owned(), value);
            }
            Opcode::DeleteFast => {
                let name = name_at(&code.varnames, arg, code)?;
                let removed = self.frame_mut()?.locals_mut().and_then(|locals| locals.remove(name));
                if removed.is_none() {
                    return Err(unbound_local(name));
                }
            }

            // === Cells ===
            Opcode::LoadClosure => {
                let name = deref_name(code, arg)?;
                let cell = match self.find_cell(name) {
                    Some(cell) => cell,
                    None => {
                        let cell = Cell::default();
                        self.frame_mut()?.set_cell(name, cell.clone());
                        cell
                    }
                };
                self.push(Value::Cell(cell));
            }
            Opcode::LoadDeref => {
                let name = deref_name(code, arg)?;
                let value = self.find_cell(name).and_then(|cell| cell.get()).unwrap_or(Value::None);
                self.push(value);
            }
            Opcode::StoreDeref => {
                let name = deref_name(code, arg)?;
                let value = self.pop()?;
                match self.find_cell(name) {
                    Some(cell) => cell.set(value),
                    None => self.frame_mut()?.set_cell(name, Cell::new(Some(value))),
                }
            }

            // === Control Flow ===
            Opcode::JumpForward => return Ok(Flow::Relative(arg)),
            Opcode::JumpAbsolute => return Ok(Flow::JumpTo(arg)),
            Opcode::PopJumpIfFalse => {
                if !self.pop()?.py_bool() {
                    return Ok(Flow::JumpTo(arg));
                }
            }
            Opcode::PopJumpIfTrue => {
                if self.pop()?.py_bool() {
                    return Ok(Flow::JumpTo(arg));
                }
            }
            Opcode::JumpIfFalseOrPop => {
                if !self.peek()?.py_bool() {
                    return Ok(Flow::JumpTo(arg));
                }
                self.pop()?;
            }
            Opcode::JumpIfTrueOrPop => {
                if self.peek()?.py_bool() {
                    return Ok(Flow::JumpTo(arg));
                }
                self.pop()?;
            }
            Opcode::ReturnValue => {
                let value = self.pop()?;
                self.frame_mut()?.set_return_value(value);
                return Ok(Flow::Return);
            }

            // === Functions ===
            Opcode::CallFunction => self.call_function(operand)?,
            Opcode::MakeFunction => self.make_function(operand, false)?,
            Opcode::MakeClosure => self.make_function(operand, true)?,

            // === Exceptions and Output ===
            Opcode::RaiseVarargs => return Err(self.raise_varargs(arg)),
            Opcode::EndFinally => {
                let marker = self.pop()?;
                if !matches!(marker, Value::None) {
                    return Err(RunError::unsupported(format!(
                        "END_FINALLY with pending {} (no exception handler stack)",
                        marker.py_type()
                    )));
                }
            }
            Opcode::PrintExpr => {
                let value = self.pop()?;
                if !matches!(value, Value::None) {
                    self.writer.stdout_write(value.py_repr().into());
                    self.writer.stdout_push('\n');
                }
            }

            // every remaining opcode is a BINARY_* or INPLACE_* operator
            op => {
                let (binary, inplace) =
                    binary::binary_op(op).ok_or_else(|| RunError::internal(format!("no handler for {op}")))?;
                if inplace {
                    self.inplace_op(binary)?;
                } else {
                    self.binary_op(binary)?;
                }
            }
        }
        Ok(Flow::Next)
    }

    fn unary_op(&mut self, op: UnaryOp) -> RunResult<()> {
        let operand = self.pop()?;
        self.push(op.apply(&operand)?);
        Ok(())
    }

    /// `LOAD_NAME`: the frame's locals, then the globals.
    fn load_name(&self, name: &str) -> RunResult<Value> {
        let frame = self.frame()?;
        if let Some(value) = frame.locals().and_then(|locals| locals.get(name)) {
            return Ok(value.clone());
        }
        let globals = frame.globals().borrow();
        globals.get(name).cloned().ok_or_else(|| ExcType::name_error(name))
    }

    /// `FOR_ITER`: pushes the next element above the iterator, or pops the exhausted
    /// iterator and jumps past the loop body.
    fn for_iter(&mut self, delta: usize) -> RunResult<Flow> {
        let next = match self.peek()? {
            Value::Iterator(iter) => iter.borrow_mut().for_next(),
            other => {
                return Err(ExcType::type_error(format!(
                    "'{}' object is not an iterator",
                    other.py_type()
                )))
            }
        };
        match next {
            Some(value) => {
                self.push(value);
                Ok(Flow::Next)
            }
            None => {
                self.pop()?;
                Ok(Flow::Relative(delta))
            }
        }
    }

    /// Resolves a cell by name in the innermost frame, then along the `prev_frame` chain.
    fn find_cell(&self, name: &str) -> Option<Cell> {
        let mut index = self.frames.len().checked_sub(1);
        while let Some(i) = index {
            let frame = self.frames.get(i)?;
            if let Some(cell) = frame.cell(name) {
                return Some(cell.clone());
            }
            index = frame.prev_frame();
        }
        None
    }

    // ========================================================================
    // Stack Operations
    // ========================================================================

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> RunResult<Value> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    pub fn peek(&self) -> RunResult<&Value> {
        self.stack.last().ok_or_else(stack_underflow)
    }

    /// The top `n` values, deepest first.
    fn peek_n(&self, n: usize) -> RunResult<&[Value]> {
        let start = self.stack.len().checked_sub(n).ok_or_else(stack_underflow)?;
        Ok(&self.stack[start..])
    }

    /// Pops `n` values, returned in push order (first pushed first).
    pub fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let start = self.stack.len().checked_sub(n).ok_or_else(stack_underflow)?;
        Ok(self.stack.drain(start..).collect())
    }

    /// The value `n` slots from the top after the handler's own pops (`n = 1` is the top).
    fn stack_slot(&self, n: usize) -> RunResult<&Value> {
        self.stack
            .len()
            .checked_sub(n)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(stack_underflow)
    }

    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Restores both stacks to the given depths, discarding anything above them.
    pub fn truncate(&mut self, stack_depth: usize, call_depth: usize) {
        self.stack.truncate(stack_depth);
        self.frames.truncate(call_depth);
    }

    /// Empties both stacks, as after a fault reaches the host boundary.
    pub fn reset(&mut self) {
        self.truncate(0, 0);
    }

    // ========================================================================
    // Frames and Output
    // ========================================================================

    fn frame(&self) -> RunResult<&Frame> {
        self.frames.last().ok_or_else(no_frame)
    }

    fn frame_mut(&mut self) -> RunResult<&mut Frame> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    #[must_use]
    pub fn writer(&self) -> &P {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut P {
        &mut self.writer
    }

    #[must_use]
    pub fn into_writer(self) -> P {
        self.writer
    }
}

fn stack_underflow() -> RunError {
    RunError::internal("operand stack underflow")
}

fn no_frame() -> RunError {
    RunError::internal("no active frame")
}

fn bad_index(table: &str, index: usize, code: &Code) -> RunError {
    RunError::internal(format!("{table} index {index} out of range in {}", code.name))
}

fn name_at<'c>(table: &'c [String], index: usize, code: &Code) -> RunResult<&'c str> {
    table
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| bad_index("name", index, code))
}

fn deref_name(code: &Code, index: usize) -> RunResult<&str> {
    code.deref_name(index).ok_or_else(|| bad_index("cell", index, code))
}

fn unbound_local(name: &str) -> RunError {
    SimpleException::new_msg(
        ExcType::UnboundLocalError,
        format!("local variable '{name}' referenced before assignment"),
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{CodeBuilder, Constant},
        io::CollectStringPrint,
    };

    fn interpreter() -> Interpreter<CollectStringPrint> {
        Interpreter::new(VmConfig::new(), CollectStringPrint::new())
    }

    fn run(builder: CodeBuilder) -> (RunResult<Value>, Interpreter<CollectStringPrint>) {
        let code = Rc::new(builder.build().unwrap());
        let mut vm = interpreter();
        let result = vm.exec_code(code, None);
        (result, vm)
    }

    #[test]
    fn module_stores_bind_globals() {
        let mut b = CodeBuilder::new("<module>");
        b.load_const(Constant::Int(3));
        b.store_name("x");
        b.load_name("x");
        b.return_value();
        let code = Rc::new(b.build().unwrap());
        let mut vm = interpreter();
        let frame = vm.make_root_frame(code, None);
        let globals = Rc::clone(frame.globals());
        assert_eq!(vm.run_frame(frame).unwrap(), Value::Int(3));
        assert_eq!(globals.borrow().get("x"), Some(&Value::Int(3)));
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn stack_rotations() {
        let mut b = CodeBuilder::new("<module>");
        for i in 1..=3 {
            b.load_const(Constant::Int(i));
        }
        b.emit(Opcode::RotThree);
        b.emit_arg(Opcode::BuildTuple, 3);
        b.return_value();
        let (result, _) = run(b);
        assert_eq!(
            result.unwrap(),
            Value::new_tuple(vec![Value::Int(3), Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn print_expr_echoes_repr_and_skips_none() {
        let mut b = CodeBuilder::new("<module>");
        b.load_const(Constant::from("hi"));
        b.emit(Opcode::PrintExpr);
        b.load_const(Constant::None);
        b.emit(Opcode::PrintExpr);
        b.load_const(Constant::None);
        b.return_value();
        let (result, vm) = run(b);
        assert_eq!(result.unwrap(), Value::None);
        assert_eq!(vm.writer().output(), "'hi'\n");
    }

    #[test]
    fn unbound_fast_local() {
        let mut b = CodeBuilder::new("<module>");
        b.add_varname("x");
        b.load_fast("x");
        b.return_value();
        let (result, _) = run(b);
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "UnboundLocalError: local variable 'x' referenced before assignment"
        );
    }

    #[test]
    fn missing_cell_reads_none() {
        let mut b = CodeBuilder::new("<module>");
        let slot = b.add_cellvar("c");
        b.emit_arg(Opcode::LoadDeref, slot);
        b.return_value();
        let code = Rc::new(b.build().unwrap());
        let mut vm = interpreter();
        assert_eq!(vm.exec_code(code, None).unwrap(), Value::None);
    }

    #[test]
    fn end_finally_rejects_pending_values() {
        let mut b = CodeBuilder::new("<module>");
        b.load_const(Constant::Int(1));
        b.emit(Opcode::EndFinally);
        b.load_const(Constant::None);
        b.return_value();
        let (result, _) = run(b);
        assert!(matches!(result, Err(RunError::Unsupported(_))));
    }

    #[test]
    fn running_off_the_end_is_internal() {
        let mut b = CodeBuilder::new("<module>");
        b.emit(Opcode::Nop);
        let (result, vm) = run(b);
        assert!(matches!(result, Err(RunError::Internal(_))));
        assert_eq!(vm.call_depth(), 0);
    }

    /// Collects everything the fmt subscriber writes.
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn trace_lists_the_code_on_frame_entry_and_exit() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let mut b = CodeBuilder::new("<module>");
        b.load_const(Constant::Int(7)).return_value();
        let code = Rc::new(b.build().unwrap());
        let listing = code.disassemble(VmConfig::new().operand_encoding());
        tracing::subscriber::with_default(subscriber, || {
            let mut vm = Interpreter::new(VmConfig::new().trace(true), CollectStringPrint::new());
            assert_eq!(vm.exec_code(code, None).unwrap(), Value::Int(7));
        });
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("entering frame"), "{output}");
        assert!(output.contains("leaving frame"), "{output}");
        assert_eq!(output.matches(listing.as_str()).count(), 2, "{output}");
    }
}
