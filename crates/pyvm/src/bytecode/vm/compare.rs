//! `COMPARE_OP` evaluation.

use std::cmp::Ordering;

use super::Interpreter;
use crate::{
    builtins::{ordering_error, Builtins},
    bytecode::op::CompareOp,
    exception::{ExcType, RunResult},
    io::PrintWriter,
    value::Value,
};

impl<P: PrintWriter> Interpreter<P> {
    /// Pops the right-hand side, then the left, and pushes the comparison result.
    pub(super) fn compare_op(&mut self, op: CompareOp) -> RunResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.push(Value::Bool(compare(op, &lhs, &rhs)?));
        Ok(())
    }
}

pub(crate) fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> RunResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| match lhs.py_cmp_checked(rhs)? {
        Some(ordering) => Ok(accept(ordering)),
        None => Err(ordering_error(op.symbol(), lhs, rhs)),
    };
    match op {
        CompareOp::Lt => ordered(Ordering::is_lt),
        CompareOp::Le => ordered(Ordering::is_le),
        CompareOp::Gt => ordered(Ordering::is_gt),
        CompareOp::Ge => ordered(Ordering::is_ge),
        CompareOp::Eq => lhs.py_eq_checked(rhs),
        CompareOp::Ne => lhs.py_eq_checked(rhs).map(|equal| !equal),
        CompareOp::In => rhs.py_contains(lhs),
        CompareOp::NotIn => rhs.py_contains(lhs).map(|found| !found),
        CompareOp::Is => Ok(lhs.py_is(rhs)),
        CompareOp::IsNot => Ok(!lhs.py_is(rhs)),
        CompareOp::ExceptionMatch => exception_match(lhs, rhs),
    }
}

/// True when `lhs` is an `Exception` subclass and a subclass of `rhs`, or of any class
/// in an `rhs` tuple. An exception instance on the left stands for its class.
fn exception_match(lhs: &Value, rhs: &Value) -> RunResult<bool> {
    let exc_type = match lhs {
        Value::Exc(exc) => Some(exc.exc_type()),
        Value::Builtin(Builtins::ExcType(exc_type)) => Some(*exc_type),
        _ => None,
    };
    let handlers = match rhs {
        Value::Tuple(items) => items.iter().map(handler_type).collect::<RunResult<Vec<_>>>()?,
        other => vec![handler_type(other)?],
    };
    Ok(exc_type.is_some_and(|exc_type| {
        exc_type.is_subclass_of(ExcType::Exception) && handlers.iter().any(|h| exc_type.is_subclass_of(*h))
    }))
}

fn handler_type(value: &Value) -> RunResult<ExcType> {
    match value {
        Value::Builtin(Builtins::ExcType(exc_type)) => Ok(*exc_type),
        _ => Err(ExcType::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}
