//! Implementation of the abs() builtin function.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    value::Value,
};

/// Returns the absolute value of a number; `bool` is treated as `int`.
pub fn builtin_abs(args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("abs")?;
    match value {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(ExcType::overflow),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        other => Err(ExcType::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.py_type()
        ))),
    }
}
