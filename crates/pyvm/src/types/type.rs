use std::{cell::RefCell, fmt, rc::Rc};

use strum::EnumString;

use crate::{
    exception::{ExcType, RunResult, SimpleException},
    for_iterator::ForIterator,
    types::{Dict, Range, Set},
    value::Value,
};

/// Represents the class of a value.
///
/// This enum is used both for type checking and as a callable constructor.
/// When parsed from a string (e.g., "list", "dict"), it can be used to create
/// new instances of that type.
#[derive(Debug, Clone, Copy, EnumString, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
#[allow(clippy::enum_variant_names)]
pub enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tuple,
    List,
    Set,
    Dict,
    Range,
    Function,
    #[strum(serialize = "builtin_function_or_method")]
    BuiltinFunction,
    Type,
    Code,
    Cell,
    Iterator,
    #[strum(disabled)]
    Exception(ExcType),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoneType => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Set => "set",
            Self::Dict => "dict",
            Self::Range => "range",
            Self::Function => "function",
            Self::BuiltinFunction => "builtin_function_or_method",
            Self::Type => "type",
            Self::Code => "code",
            Self::Cell => "cell",
            Self::Iterator => "iterator",
            Self::Exception(exc_type) => return write!(f, "{exc_type}"),
        };
        f.write_str(name)
    }
}

impl Type {
    /// Types that are bound as constructor builtins in a fresh global mapping.
    pub const CONSTRUCTORS: [Self; 9] = [
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::Str,
        Self::Tuple,
        Self::List,
        Self::Set,
        Self::Dict,
        Self::Range,
    ];

    /// Checks if a value of type `self` is an instance of `other`.
    ///
    /// `bool` is a subtype of `int`, and exception classes follow `ExcType::is_subclass_of`.
    #[must_use]
    pub fn is_instance_of(self, other: Self) -> bool {
        match (self, other) {
            (Self::Bool, Self::Int) => true,
            (Self::Exception(exc), Self::Exception(handler)) => exc.is_subclass_of(handler),
            _ => self == other,
        }
    }

    /// Calls this type as a constructor (e.g., `list(x)`, `int(x)`).
    pub fn call(self, args: Vec<Value>) -> RunResult<Value> {
        if self == Self::Range {
            return Range::init(&args).map(Value::Range);
        }
        if !Self::CONSTRUCTORS.contains(&self) {
            return Err(ExcType::type_error(format!("cannot create '{self}' instances")));
        }
        if args.len() > 1 {
            return Err(ExcType::type_error(format!(
                "{self}() takes at most 1 argument ({} given)",
                args.len()
            )));
        }
        let Some(arg) = args.into_iter().next() else {
            return Ok(self.default_value());
        };
        match self {
            Self::Bool => Ok(Value::Bool(arg.py_bool())),
            Self::Int => int_from(&arg),
            Self::Float => float_from(&arg),
            Self::Str => Ok(Value::from(arg.py_str().into_owned())),
            Self::Tuple => Ok(Value::Tuple(ForIterator::new(arg)?.collect()?.into())),
            Self::List => Ok(Value::List(Rc::new(RefCell::new(ForIterator::new(arg)?.collect()?)))),
            Self::Set => {
                let items = ForIterator::new(arg)?.collect()?;
                Ok(Value::Set(Rc::new(RefCell::new(Set::from_values(items)?))))
            }
            Self::Dict => match arg {
                Value::Dict(dict) => Ok(Value::Dict(Rc::new(RefCell::new(dict.borrow().clone())))),
                other => Err(ExcType::type_error(format!(
                    "cannot convert '{}' object to dict",
                    other.py_type()
                ))),
            },
            _ => Err(ExcType::type_error_not_callable(self)),
        }
    }

    fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Str => Value::from(""),
            Self::Tuple => Value::Tuple(Rc::from(Vec::new())),
            Self::List => Value::List(Rc::default()),
            Self::Set => Value::Set(Rc::default()),
            Self::Dict => Value::Dict(Rc::new(RefCell::new(Dict::new()))),
            _ => Value::None,
        }
    }
}

fn int_from(arg: &Value) -> RunResult<Value> {
    match arg {
        Value::Int(_) | Value::Bool(_) => Ok(Value::Int(arg.as_int().unwrap_or_default())),
        Value::Float(f) => {
            if f.is_nan() {
                Err(ExcType::value_error("cannot convert float NaN to integer"))
            } else if f.is_infinite() {
                Err(SimpleException::new_msg(ExcType::OverflowError, "cannot convert float infinity to integer").into())
            } else if f.trunc() < -9.223_372_036_854_776e18 || f.trunc() >= 9.223_372_036_854_776e18 {
                Err(ExcType::overflow())
            } else {
                #[allow(clippy::cast_possible_truncation)]
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ExcType::value_error(format!("invalid literal for int() with base 10: {}", arg.py_repr()))),
        other => Err(ExcType::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.py_type()
        ))),
    }
}

fn float_from(arg: &Value) -> RunResult<Value> {
    match arg {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(_) | Value::Bool(_) => Ok(Value::Float(arg.as_float().unwrap_or_default())),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ExcType::value_error(format!("could not convert string to float: {}", arg.py_repr()))),
        other => Err(ExcType::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.py_type()
        ))),
    }
}
