mod common;

use common::{assert_equal_module, compare, fibo_module, run, run_module};
use pretty_assertions::assert_eq;
use pyvm::{CompareOp, Constant, Opcode, Value};

#[test]
fn fibonacci() {
    for (n, expected) in [(0, 0), (1, 1), (3, 2), (10, 55)] {
        let (result, _) = run(fibo_module(n));
        assert_eq!(result.unwrap(), Value::Int(expected), "fibo({n})");
    }
}

#[test]
fn two_plus_two_is_four() {
    let (result, output) = run(assert_equal_module(Constant::Int(4), Constant::Int(4), None));
    assert_eq!(result.unwrap(), Value::None);
    assert_eq!(output, "");
}

#[test]
fn print_builtin() {
    let (result, output) = run_module(|b| {
        b.load_name("print").load_const("count:").load_const(42i64).load_const(true).call(3);
        b.emit(Opcode::PopTop);
        b.load_name("print").call(0).return_value();
    });
    assert_eq!(result.unwrap(), Value::None);
    assert_eq!(output, "count: 42 True\n\n");
}

#[test]
fn arithmetic_and_unary() {
    // -(7 // 2) ** 2 % 5, computed as ((7 // 2) ** 2) then negated, then % 5
    let (result, _) = run_module(|b| {
        b.load_const(7i64).load_const(2i64).emit(Opcode::BinaryFloorDivide);
        b.load_const(2i64).emit(Opcode::BinaryPower);
        b.emit(Opcode::UnaryNegative);
        b.load_const(5i64).emit(Opcode::BinaryModulo);
        b.return_value();
    });
    assert_eq!(result.unwrap(), Value::Int(1));

    let (result, _) = run_module(|b| {
        b.load_const(1i64).load_const(4i64).emit(Opcode::BinaryTrueDivide);
        b.load_const(0.25).emit(Opcode::InplaceAdd).return_value();
    });
    assert_eq!(result.unwrap(), Value::Float(0.5));

    let (result, _) = run_module(|b| {
        b.load_const(6i64).load_const(3i64).emit(Opcode::BinaryAnd);
        b.load_const(1i64).emit(Opcode::BinaryLshift);
        b.emit(Opcode::UnaryInvert).return_value();
    });
    assert_eq!(result.unwrap(), Value::Int(-5));
}

#[test]
fn comparisons_push_bools() {
    let (result, _) = run_module(|b| {
        b.load_const(1i64).load_const(2i64);
        compare(b, CompareOp::Le);
        b.load_const("a").load_const("abc");
        compare(b, CompareOp::In);
        b.load_const(Constant::None).load_const(Constant::None);
        compare(b, CompareOp::IsNot);
        b.emit_arg(Opcode::BuildTuple, 3).return_value();
    });
    assert_eq!(result.unwrap().py_repr(), "(True, True, False)");
}

#[test]
fn module_globals_visible_to_functions() {
    let mut f = pyvm::CodeBuilder::function("get", &[]);
    f.load_global("counter").return_value();
    let get = f.build().unwrap();
    let (result, _) = run_module(|b| {
        b.load_const(9i64).store_name("counter");
        b.make_function(get, 0).store_name("get");
        b.load_name("get").call(0).return_value();
    });
    assert_eq!(result.unwrap(), Value::Int(9));
}

#[test]
fn builtin_constructors() {
    let (result, output) = run_module(|b| {
        b.load_name("print");
        b.load_name("list").load_name("range").load_const(3i64).call(1).call(1);
        b.load_name("len").load_const("héllo").call(1);
        b.load_name("sorted").load_const(Constant::Tuple(vec![Constant::Int(3), Constant::Int(1)])).call(1);
        b.call(3).return_value();
    });
    assert_eq!(result.unwrap(), Value::None);
    assert_eq!(output, "[0, 1, 2] 5 [1, 3]\n");
}
