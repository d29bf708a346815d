//! Implementation of the sorted() builtin function.

use std::cmp::Ordering;

use crate::{
    args::ArgValues,
    exception::{ExcType, RunError, RunResult},
    for_iterator::ForIterator,
    value::Value,
};

/// Returns a new sorted list; the sort is stable.
pub fn builtin_sorted(args: ArgValues) -> RunResult<Value> {
    let mut items = ForIterator::new(args.get_one_arg("sorted")?)?.collect()?;
    let mut error = None;
    items.sort_by(|a, b| {
        a.py_cmp(b).unwrap_or_else(|| {
            error.get_or_insert_with(|| ordering_error("<", a, b));
            Ordering::Equal
        })
    });
    match error {
        Some(err) => Err(err),
        None => Ok(Value::new_list(items)),
    }
}

/// `TypeError: '<' not supported between instances of 'int' and 'str'`
pub(crate) fn ordering_error(op: &str, lhs: &Value, rhs: &Value) -> RunError {
    ExcType::type_error(format!(
        "'{op}' not supported between instances of '{}' and '{}'",
        lhs.py_type(),
        rhs.py_type()
    ))
}
