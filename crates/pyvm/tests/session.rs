mod common;

use std::rc::Rc;

use common::fibo_code;
use pretty_assertions::assert_eq;
use pyvm::{Code, CodeBuilder, CollectStringPrint, Constant, ExcType, Opcode, Outcome, RunError, Session, Value, VmConfig};

fn input(build: impl FnOnce(&mut CodeBuilder)) -> Rc<Code> {
    let mut b = CodeBuilder::new("<stdin>");
    build(&mut b);
    Rc::new(b.build().unwrap())
}

fn session() -> Session<CollectStringPrint> {
    Session::new(VmConfig::new(), CollectStringPrint::new())
}

#[test]
fn functions_defined_in_one_input_are_callable_from_the_next() {
    let mut s = session();
    let define = input(|b| {
        b.make_function(fibo_code(), 0).store_name("fibo");
        b.load_const(Constant::None).return_value();
    });
    let call = input(|b| {
        b.load_name("fibo").load_const(12i64).call(1);
        b.emit(Opcode::PrintExpr);
        b.load_const(Constant::None).return_value();
    });
    assert!(matches!(s.eval(define).unwrap(), Outcome::Value(Value::None)));
    assert!(matches!(s.eval(call).unwrap(), Outcome::Value(Value::None)));
    assert_eq!(s.writer().output(), "144\n");
}

#[test]
fn session_survives_faults() {
    let mut s = session();
    let divide = input(|b| {
        b.load_const(1i64).load_const(0i64).emit(Opcode::BinaryTrueDivide).return_value();
    });
    let Outcome::Fault(exc) = s.eval(divide).unwrap() else {
        panic!("division by zero should fault");
    };
    assert_eq!(exc.exc_type(), ExcType::ZeroDivisionError);

    let raise = input(|b| {
        b.load_global("ValueError").load_const("bad").call(1);
        b.emit_arg(Opcode::RaiseVarargs, 1);
    });
    let Outcome::Fault(exc) = s.eval(raise).unwrap() else {
        panic!("raise should fault");
    };
    assert_eq!(exc.exc_type(), ExcType::ValueError);
    assert_eq!(exc.to_string(), "ValueError: bad");

    let fine = input(|b| {
        b.load_const(3i64).store_name("x");
        b.load_name("x").return_value();
    });
    assert!(matches!(s.eval(fine).unwrap(), Outcome::Value(Value::Int(3))));
    assert_eq!(s.get("x"), Some(Value::Int(3)));
    assert_eq!(s.interpreter().stack_depth(), 0);
    assert_eq!(s.interpreter().call_depth(), 0);
}

/// A fault raised several calls deep still leaves the session at depth zero.
#[test]
fn nested_fault_unwinds_every_frame() {
    let mut inner = CodeBuilder::function("inner", &[]);
    inner.load_const(1i64).load_global("missing").return_value();
    let inner = inner.build().unwrap();
    let mut outer = CodeBuilder::function("outer", &[]);
    outer.load_const(2i64).load_global("inner").call(0).return_value();
    let outer = outer.build().unwrap();

    let mut s = session();
    let program = input(|b| {
        b.make_function(inner, 0).store_name("inner");
        b.make_function(outer, 0).store_name("outer");
        b.load_const(3i64).load_name("outer").call(0).return_value();
    });
    let outcome = s.eval(program).unwrap();
    let Outcome::Fault(exc) = outcome else {
        panic!("expected NameError, got {outcome:?}");
    };
    assert_eq!(exc.to_string(), "NameError: name 'missing' is not defined");
    assert_eq!(s.interpreter().stack_depth(), 0);
    assert_eq!(s.interpreter().call_depth(), 0);
}

#[test]
fn fatal_errors_are_returned_not_caught() {
    let mut s = session();
    let kwargs = input(|b| {
        b.load_name("print").load_const("end").load_const("").emit_args(Opcode::CallFunction, 0, 1);
        b.return_value();
    });
    assert!(matches!(s.eval(kwargs), Err(RunError::Unsupported(_))));
    assert_eq!(s.interpreter().stack_depth(), 0);

    let after = input(|b| {
        b.load_const("still alive").return_value();
    });
    assert!(matches!(s.eval(after).unwrap(), Outcome::Value(Value::Str(_))));
}
