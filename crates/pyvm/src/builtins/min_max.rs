//! Implementation of the min() and max() builtin functions.

use std::cmp::Ordering;

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    for_iterator::ForIterator,
    value::Value,
};

/// `max(iterable)` / `max(a, b, ...)`, and the same for `min`.
///
/// Ties keep the first maximal (or minimal) item.
pub fn builtin_min_max(args: ArgValues, is_max: bool) -> RunResult<Value> {
    let name = if is_max { "max" } else { "min" };
    let items = match args {
        ArgValues::Zero => {
            return Err(ExcType::type_error(format!("{name} expected 1 arguments, got 0")));
        }
        ArgValues::One(iterable) => ForIterator::new(iterable)?.collect()?,
        other => other.into_vec(),
    };
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Err(ExcType::value_error(format!("{name}() arg is an empty sequence")));
    };
    let wanted = if is_max { Ordering::Greater } else { Ordering::Less };
    for item in items {
        let ordering = item
            .py_cmp(&best)
            .ok_or_else(|| super::sorted::ordering_error(if is_max { ">" } else { "<" }, &item, &best))?;
        if ordering == wanted {
            best = item;
        }
    }
    Ok(best)
}
