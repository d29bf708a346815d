//! Built-in functions, constructor types and exception classes.
//!
//! Every fresh global mapping is seeded with one entry per variant of
//! [`BuiltinsFunctions`], per [`Type::CONSTRUCTORS`] entry and per [`ExcType`].

mod abs;
mod divmod;
mod isinstance;
mod min_max;
mod sorted;
mod sum;

pub(crate) use sorted::ordering_error;

use std::{fmt::Write, str::FromStr};

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    for_iterator::ForIterator,
    io::PrintWriter,
    types::Type,
    value::Value,
};

/// Anything callable that is implemented natively rather than in bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtins {
    Function(BuiltinsFunctions),
    /// A constructor type such as `int` or `list`.
    Type(Type),
    /// An exception class like `ValueError`; calling it creates an instance.
    ExcType(ExcType),
}

impl Builtins {
    /// Calls this builtin with positional arguments.
    pub fn call(self, args: Vec<Value>, writer: &mut impl PrintWriter) -> RunResult<Value> {
        match self {
            Self::Function(b) => b.call(ArgValues::from(args), writer),
            Self::Type(t) => t.call(args),
            Self::ExcType(exc) => Ok(exc.call(args)),
        }
    }

    /// The name this builtin is bound to in a fresh global mapping.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Function(b) => b.to_string(),
            Self::Type(t) => t.to_string(),
            Self::ExcType(e) => e.to_string(),
        }
    }

    /// Every builtin bound in a fresh global mapping.
    pub fn all() -> impl Iterator<Item = Self> {
        BuiltinsFunctions::iter()
            .map(Self::Function)
            .chain(Type::CONSTRUCTORS.into_iter().map(Self::Type))
            .chain(ExcType::iter().map(Self::ExcType))
    }

    /// Writes the repr() string for this callable to a formatter.
    pub fn py_repr_fmt<W: Write>(self, f: &mut W) -> std::fmt::Result {
        match self {
            Self::Function(b) => write!(f, "<built-in function {b}>"),
            Self::Type(t) => write!(f, "<class '{t}'>"),
            Self::ExcType(e) => write!(f, "<class '{e}'>"),
        }
    }

    #[must_use]
    pub fn py_type(self) -> Type {
        match self {
            Self::Function(_) => Type::BuiltinFunction,
            Self::Type(_) | Self::ExcType(_) => Type::Type,
        }
    }
}

impl FromStr for Builtins {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(b) = BuiltinsFunctions::from_str(s) {
            Ok(Self::Function(b))
        } else if let Ok(t) = Type::from_str(s) {
            if Type::CONSTRUCTORS.contains(&t) {
                Ok(Self::Type(t))
            } else {
                Err(())
            }
        } else if let Ok(exc) = ExcType::from_str(s) {
            Ok(Self::ExcType(exc))
        } else {
            Err(())
        }
    }
}

/// Enumerates every native builtin function like `print`, `len`, etc.
///
/// All variants serialize to lowercase (e.g., `Print` -> "print").
#[derive(Debug, Clone, Copy, Display, EnumString, EnumIter, IntoStaticStr, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinsFunctions {
    Abs,
    Callable,
    Chr,
    Divmod,
    Isinstance,
    Iter,
    Len,
    Max,
    Min,
    Next,
    Ord,
    Print,
    Repr,
    Sorted,
    Sum,
}

impl BuiltinsFunctions {
    fn call(self, args: ArgValues, writer: &mut impl PrintWriter) -> RunResult<Value> {
        match self {
            Self::Abs => abs::builtin_abs(args),
            Self::Divmod => divmod::builtin_divmod(args),
            Self::Isinstance => isinstance::builtin_isinstance(args),
            Self::Max => min_max::builtin_min_max(args, true),
            Self::Min => min_max::builtin_min_max(args, false),
            Self::Sorted => sorted::builtin_sorted(args),
            Self::Sum => sum::builtin_sum(args),
            Self::Print => {
                for (i, value) in args.into_vec().iter().enumerate() {
                    if i > 0 {
                        writer.stdout_push(' ');
                    }
                    writer.stdout_write(value.py_str());
                }
                writer.stdout_push('\n');
                Ok(Value::None)
            }
            Self::Len => {
                let value = args.get_one_arg("len")?;
                match value.py_len() {
                    Some(len) => Ok(Value::Int(i64::try_from(len).map_err(|_| ExcType::overflow())?)),
                    None => Err(ExcType::type_error(format!(
                        "object of type '{}' has no len()",
                        value.py_type()
                    ))),
                }
            }
            Self::Repr => {
                let value = args.get_one_arg("repr")?;
                Ok(Value::from(value.py_repr()))
            }
            Self::Callable => {
                let value = args.get_one_arg("callable")?;
                Ok(Value::Bool(matches!(value, Value::Function(_) | Value::Builtin(_))))
            }
            Self::Chr => {
                let value = args.get_one_arg("chr")?;
                let Some(code) = value.as_int() else {
                    return Err(ExcType::type_error(format!(
                        "an integer is required (got type {})",
                        value.py_type()
                    )));
                };
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| Value::from(c.to_string()))
                    .ok_or_else(|| ExcType::value_error("chr() arg not in range(0x110000)"))
            }
            Self::Ord => {
                let value = args.get_one_arg("ord")?;
                match &value {
                    Value::Str(s) => {
                        let mut chars = s.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                            _ => Err(ExcType::type_error(format!(
                                "ord() expected a character, but string of length {} found",
                                s.chars().count()
                            ))),
                        }
                    }
                    Value::Bytes(b) if b.len() == 1 => Ok(Value::Int(i64::from(b[0]))),
                    Value::Bytes(b) => Err(ExcType::type_error(format!(
                        "ord() expected a character, but string of length {} found",
                        b.len()
                    ))),
                    other => Err(ExcType::type_error(format!(
                        "ord() expected string of length 1, but {} found",
                        other.py_type()
                    ))),
                }
            }
            Self::Iter => ForIterator::iter_value(args.get_one_arg("iter")?),
            Self::Next => {
                let (iterator, default) = args.get_one_two_args("next")?;
                let Value::Iterator(it) = &iterator else {
                    return Err(ExcType::type_error(format!(
                        "'{}' object is not an iterator",
                        iterator.py_type()
                    )));
                };
                let next = it.borrow_mut().for_next();
                match (next, default) {
                    (Some(value), _) | (None, Some(value)) => Ok(value),
                    (None, None) => Err(ExcType::stop_iteration()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectStringPrint;

    fn call(name: &str, args: Vec<Value>) -> RunResult<Value> {
        let builtin = Builtins::from_str(name).unwrap();
        builtin.call(args, &mut CollectStringPrint::new())
    }

    #[test]
    fn names_resolve() {
        assert_eq!(
            Builtins::from_str("len"),
            Ok(Builtins::Function(BuiltinsFunctions::Len))
        );
        assert_eq!(Builtins::from_str("list"), Ok(Builtins::Type(Type::List)));
        assert_eq!(Builtins::from_str("KeyError"), Ok(Builtins::ExcType(ExcType::KeyError)));
        assert_eq!(Builtins::from_str("code"), Err(()));
        assert!(Builtins::all().any(|b| b.name() == "range"));
    }

    #[test]
    fn print_joins_with_spaces() {
        let mut out = CollectStringPrint::new();
        Builtins::Function(BuiltinsFunctions::Print)
            .call(vec![Value::from("a"), Value::Int(1), Value::None], &mut out)
            .unwrap();
        assert_eq!(out.output(), "a 1 None\n");
    }

    #[test]
    fn simple_builtins() {
        assert_eq!(call("len", vec![Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(call("chr", vec![Value::Int(97)]).unwrap(), Value::from("a"));
        assert_eq!(call("ord", vec![Value::from("a")]).unwrap(), Value::Int(97));
        assert_eq!(call("repr", vec![Value::from("a")]).unwrap(), Value::from("'a'"));
        assert_eq!(call("callable", vec![Value::Int(1)]).unwrap(), Value::Bool(false));
        let err = call("len", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: object of type 'int' has no len()");
    }

    #[test]
    fn iter_and_next() {
        let it = call("iter", vec![Value::new_list(vec![Value::Int(1)])]).unwrap();
        assert_eq!(call("next", vec![it.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("next", vec![it.clone(), Value::None]).unwrap(), Value::None);
        let err = call("next", vec![it]).unwrap_err();
        assert_eq!(err.exception().map(|e| e.exc_type()), Some(ExcType::StopIteration));
    }
}
