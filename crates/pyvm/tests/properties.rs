mod common;

use std::rc::Rc;

use common::{fibo_module, run};
use proptest::prelude::*;
use pyvm::{CodeBuilder, Interpreter, NoPrint, Opcode, RunError, Value, VmConfig};

fn fibo(n: i64) -> i64 {
    let (mut a, mut b) = (0, 1);
    for _ in 0..n {
        (a, b) = (b, a + b);
    }
    a
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Values pushed before a failing name lookup stay on the stack, and nothing else does.
    #[test]
    fn undefined_name_leaves_the_stack_unchanged(values in prop::collection::vec(-1000i64..1000, 0..8)) {
        let mut b = CodeBuilder::new("<module>");
        for v in &values {
            b.load_const(*v);
        }
        b.load_name("no_such_name").return_value();
        let mut vm = Interpreter::new(VmConfig::new(), NoPrint);
        let result = vm.exec_code(Rc::new(b.build().unwrap()), None);
        prop_assert!(matches!(result, Err(RunError::Exc(_))));
        prop_assert_eq!(vm.stack_depth(), values.len());
        let expected: Vec<Value> = values.iter().copied().map(Value::Int).collect();
        prop_assert_eq!(vm.stack(), expected.as_slice());
    }

    /// A completed module leaves both stacks empty, however much it pushed.
    #[test]
    fn completed_runs_leave_no_residue(values in prop::collection::vec(-1000i64..1000, 1..8)) {
        let mut b = CodeBuilder::new("<module>");
        for v in &values {
            b.load_const(*v);
        }
        for _ in 1..values.len() {
            b.emit(Opcode::BinaryAdd);
        }
        b.return_value();
        let mut vm = Interpreter::new(VmConfig::new(), NoPrint);
        let result = vm.exec_code(Rc::new(b.build().unwrap()), None).unwrap();
        prop_assert_eq!(result, Value::Int(values.iter().sum()));
        prop_assert_eq!(vm.stack_depth(), 0);
        prop_assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn recursive_fibonacci_matches_iteration(n in 0i64..16) {
        let (result, _) = run(fibo_module(n));
        prop_assert_eq!(result.unwrap(), Value::Int(fibo(n)));
    }

    #[test]
    fn comparisons_agree_with_rust(a in any::<i32>(), b in any::<i32>()) {
        let (result, _) = common::run_module(|code| {
            code.load_const(i64::from(a)).load_const(i64::from(b));
            common::compare(code, pyvm::CompareOp::Lt);
            code.return_value();
        });
        prop_assert_eq!(result.unwrap(), Value::Bool(a < b));
    }
}
