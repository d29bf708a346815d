//! Implementation of the sum() builtin function.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    for_iterator::ForIterator,
    operators::BinaryOp,
    value::Value,
};

/// `sum(iterable, start=0)`; strings are rejected as a start value.
pub fn builtin_sum(args: ArgValues) -> RunResult<Value> {
    let (iterable, start) = args.get_one_two_args("sum")?;
    let mut total = start.unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(ExcType::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
    }
    let mut iter = ForIterator::new(iterable)?;
    while let Some(item) = iter.for_next() {
        total = BinaryOp::Add.apply(&total, &item)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_with_start() {
        let range = Value::Range(crate::types::Range::init(&[Value::Int(5)]).unwrap());
        assert_eq!(builtin_sum(ArgValues::One(range)).unwrap(), Value::Int(10));
        let list = Value::new_list(vec![Value::Float(0.5), Value::Int(1)]);
        assert_eq!(
            builtin_sum(ArgValues::Two(list, Value::Int(1))).unwrap(),
            Value::Float(2.5)
        );
    }
}
