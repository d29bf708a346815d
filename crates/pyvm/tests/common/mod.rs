//! Hand-assembled programs shared by the integration tests, written the way the 3.5
//! compiler lays them out.
#![allow(dead_code)]

use std::rc::Rc;

use pyvm::{Code, CodeBuilder, CollectStringPrint, CompareOp, Constant, Interpreter, Opcode, RunResult, Value, VmConfig};

/// Runs `code` as a module and returns its result and everything it printed.
pub fn run(code: Code) -> (RunResult<Value>, String) {
    let mut vm = Interpreter::new(VmConfig::new(), CollectStringPrint::new());
    let result = vm.exec_code(Rc::new(code), None);
    (result, vm.into_writer().into_output())
}

/// Assembles a module with `build` and runs it.
pub fn run_module(build: impl FnOnce(&mut CodeBuilder)) -> (RunResult<Value>, String) {
    let mut b = CodeBuilder::new("<module>");
    build(&mut b);
    run(b.build().unwrap())
}

pub fn compare(b: &mut CodeBuilder, op: CompareOp) -> &mut CodeBuilder {
    b.emit_arg(Opcode::CompareOp, op as u16)
}

/// ```python
/// def fibo(n):
///     if n < 2:
///         return n
///     return fibo(n - 1) + fibo(n - 2)
/// ```
pub fn fibo_code() -> Code {
    let mut f = CodeBuilder::function("fibo", &["n"]);
    let recurse = f.new_label();
    f.load_fast("n").load_const(2i64);
    compare(&mut f, CompareOp::Lt);
    f.emit_jump(Opcode::PopJumpIfFalse, recurse);
    f.load_fast("n").return_value();
    f.bind(recurse);
    for k in [1i64, 2] {
        f.load_global("fibo").load_fast("n").load_const(k);
        f.emit(Opcode::BinarySubtract).call(1);
    }
    f.emit(Opcode::BinaryAdd).return_value();
    f.build().unwrap()
}

/// Defines `fibo` at module level and returns `fibo(n)`.
pub fn fibo_module(n: i64) -> Code {
    let mut b = CodeBuilder::new("<module>");
    b.make_function(fibo_code(), 0).store_name("fibo");
    b.load_name("fibo").load_const(n).call(1).return_value();
    b.build().unwrap()
}

/// `assert lhs == rhs[, message]`, followed by `return None`.
pub fn assert_equal_module(lhs: Constant, rhs: Constant, message: Option<&str>) -> Code {
    let mut b = CodeBuilder::new("<module>");
    let done = b.new_label();
    b.load_const(lhs).load_const(rhs);
    compare(&mut b, CompareOp::Eq);
    b.emit_jump(Opcode::PopJumpIfTrue, done);
    b.load_global("AssertionError");
    if let Some(message) = message {
        b.load_const(message).call(1);
    }
    b.emit_arg(Opcode::RaiseVarargs, 1);
    b.bind(done);
    b.load_const(Constant::None).return_value();
    b.build().unwrap()
}

/// Emits `LOAD_CLOSURE` for each name, packs them and creates a closure over `code`.
pub fn make_closure(b: &mut CodeBuilder, code: Code, captured: &[&str]) {
    for name in captured {
        let index = b.add_cellvar(name);
        b.emit_arg(Opcode::LoadClosure, index);
    }
    b.emit_arg(Opcode::BuildTuple, u16::try_from(captured.len()).unwrap());
    let name = code.name.clone();
    b.load_const(code).load_const(name.as_str());
    b.emit_args(Opcode::MakeClosure, 0, 0);
}

/// A function of no arguments whose body reads free variable `x`, adds `delta` and
/// stores it back, returning the new value.
pub fn bump_code(name: &str, delta: i64) -> Code {
    let mut f = CodeBuilder::function(name, &[]);
    let x = f.add_freevar("x");
    f.emit_arg(Opcode::LoadDeref, x).load_const(delta).emit(Opcode::BinaryAdd);
    f.emit(Opcode::DupTop).emit_arg(Opcode::StoreDeref, x);
    f.return_value();
    f.build().unwrap()
}

/// A function of no arguments returning free variable `x`.
pub fn read_code(name: &str) -> Code {
    let mut f = CodeBuilder::function(name, &[]);
    let x = f.add_freevar("x");
    f.emit_arg(Opcode::LoadDeref, x).return_value();
    f.build().unwrap()
}
