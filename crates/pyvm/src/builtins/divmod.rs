//! Implementation of the divmod() builtin function.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    operators::{floor_div_float, floor_div_int, mod_float, mod_int},
    value::Value,
};

/// Returns the tuple `(a // b, a % b)`.
pub fn builtin_divmod(args: ArgValues) -> RunResult<Value> {
    let (a, b) = args.get_two_args("divmod")?;
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        let quot = floor_div_int(x, y)?;
        let rem = mod_int(x, y)?;
        return Ok(Value::new_tuple(vec![Value::Int(quot), Value::Int(rem)]));
    }
    match (&a, &b) {
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_)) => {
            let (x, y) = (a.as_float().unwrap_or_default(), b.as_float().unwrap_or_default());
            if y == 0.0 {
                return Err(ExcType::zero_division("float divmod()"));
            }
            let quot = floor_div_float(x, y)?;
            let rem = mod_float(x, y)?;
            Ok(Value::new_tuple(vec![Value::Float(quot), Value::Float(rem)]))
        }
        _ => Err(ExcType::binary_type_error("divmod()", a.py_type(), b.py_type())),
    }
}
