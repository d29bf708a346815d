mod common;

use common::{assert_equal_module, run, run_module};
use pretty_assertions::assert_eq;
use pyvm::{CodeBuilder, Constant, ExcType, Opcode, RunError, Value};

#[test]
fn failed_assertion_without_message() {
    let (result, _) = run(assert_equal_module(Constant::Int(4), Constant::Int(5), None));
    let err = result.unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.exc_type(), ExcType::AssertionError);
    assert!(exc.args().is_empty());
    assert_eq!(err.to_string(), "AssertionError");
}

#[test]
fn failed_assertion_with_message() {
    let (result, _) = run(assert_equal_module(
        Constant::Int(1),
        Constant::Int(2),
        Some("one is not two"),
    ));
    let err = result.unwrap_err();
    assert_eq!(err.exception().unwrap().message(), Some("one is not two"));
    assert_eq!(err.to_string(), "AssertionError: one is not two");
}

/// ```python
/// def inner():
///     raise ValueError("my msg")
/// def outer():
///     inner()
/// outer()
/// ```
#[test]
fn raised_exception_crosses_frames_unchanged() {
    let mut inner = CodeBuilder::function("inner", &[]);
    inner.load_global("ValueError").load_const("my msg").call(1);
    inner.emit_arg(Opcode::RaiseVarargs, 1);
    inner.load_const(Constant::None).return_value();
    let inner = inner.build().unwrap();

    let mut outer = CodeBuilder::function("outer", &[]);
    outer.load_global("inner").call(0).emit(Opcode::PopTop);
    outer.load_const(Constant::None).return_value();
    let outer = outer.build().unwrap();

    let (result, output) = run_module(|b| {
        b.make_function(inner, 0).store_name("inner");
        b.make_function(outer, 0).store_name("outer");
        b.load_name("print").load_const("before").call(1).emit(Opcode::PopTop);
        b.load_name("outer").call(0).emit(Opcode::PopTop);
        b.load_name("print").load_const("after").call(1).return_value();
    });
    let err = result.unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.exc_type(), ExcType::ValueError);
    assert_eq!(exc.args(), &[Value::from("my msg")]);
    assert_eq!(output, "before\n");
}

#[test]
fn native_faults_are_program_level() {
    let (result, _) = run_module(|b| {
        b.load_const(1i64).load_const(0i64).emit(Opcode::BinaryModulo).return_value();
    });
    let err = result.unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(err.exception().unwrap().exc_type(), ExcType::ZeroDivisionError);

    let (result, _) = run_module(|b| {
        b.load_const(Constant::Tuple(vec![Constant::Int(1)]));
        b.load_const(3i64).emit(Opcode::BinarySubscr).return_value();
    });
    assert_eq!(result.unwrap_err().to_string(), "IndexError: tuple index out of range");

    let (result, _) = run_module(|b| {
        b.emit_arg(Opcode::BuildMap, 0).load_const("k").emit(Opcode::BinarySubscr);
        b.return_value();
    });
    let err = result.unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.exc_type(), ExcType::KeyError);
    assert_eq!(exc.args(), &[Value::from("k")]);
}

#[test]
fn undefined_names() {
    let (result, _) = run_module(|b| {
        b.load_name("nope").return_value();
    });
    assert_eq!(result.unwrap_err().to_string(), "NameError: name 'nope' is not defined");

    let (result, _) = run_module(|b| {
        b.load_global("nope").return_value();
    });
    assert_eq!(result.unwrap_err().exception().unwrap().exc_type(), ExcType::NameError);
}

#[test]
fn unsupported_instructions_are_fatal() {
    let mut b = CodeBuilder::new("<module>");
    // BREAK_LOOP
    b.emit_raw(&[80]);
    let code = b.build_unchecked().unwrap();
    let (result, _) = run(code);
    let err = result.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, RunError::Unsupported(_)));
    assert!(err.to_string().contains("unsupported opcode byte 80"));
}
