//! Implementation of the isinstance() builtin function.

use super::Builtins;
use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    types::Type,
    value::Value,
};

/// Checks if an object is an instance of a class or a tuple of classes.
pub fn builtin_isinstance(args: ArgValues) -> RunResult<Value> {
    let (obj, classinfo) = args.get_two_args("isinstance")?;
    isinstance_check(obj.py_type(), &classinfo)
        .map(Value::Bool)
        .ok_or_else(|| ExcType::type_error("isinstance() arg 2 must be a type or tuple of types"))
}

/// Recursively checks `obj_type` against `classinfo`.
///
/// Returns `None` if classinfo is not a type or a (possibly nested) tuple of types.
pub(crate) fn isinstance_check(obj_type: Type, classinfo: &Value) -> Option<bool> {
    match classinfo {
        Value::Builtin(Builtins::Type(t)) => Some(obj_type.is_instance_of(*t)),
        Value::Builtin(Builtins::ExcType(handler_type)) => {
            Some(matches!(obj_type, Type::Exception(exc_type) if exc_type.is_subclass_of(*handler_type)))
        }
        Value::Tuple(items) => {
            let mut found = false;
            for item in items.iter() {
                found |= isinstance_check(obj_type, item)?;
            }
            Some(found)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_and_tuples() {
        let key_error = ExcType::KeyError.call(vec![]);
        let lookup = Value::Builtin(Builtins::ExcType(ExcType::LookupError));
        assert_eq!(isinstance_check(key_error.py_type(), &lookup), Some(true));
        let int = Value::Builtin(Builtins::Type(Type::Int));
        let str_ = Value::Builtin(Builtins::Type(Type::Str));
        assert_eq!(isinstance_check(Type::Bool, &int), Some(true));
        assert_eq!(
            isinstance_check(Type::Str, &Value::new_tuple(vec![int, str_])),
            Some(true)
        );
        assert_eq!(isinstance_check(Type::Str, &Value::Int(1)), None);
    }
}
