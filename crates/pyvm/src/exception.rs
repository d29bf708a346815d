use std::{borrow::Cow, fmt, rc::Rc};

use ahash::AHashSet;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{types::Type, value::Value};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception classes known to the interpreter.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `ValueError` -> "ValueError").
/// Every variant is also bound in a fresh global mapping as a callable class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter)]
pub enum ExcType {
    /// Root of the hierarchy.
    BaseException,
    /// primary exception class - matches any exception in `except Exception` checks.
    Exception,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    NotImplementedError,
    /// Raised when comparing or printing containers nested past the interpreter's limit.
    RecursionError,

    // --- NameError hierarchy ---
    NameError,
    /// Subclass of NameError - for accessing local variable before assignment.
    UnboundLocalError,

    // --- Standalone exception types ---
    AssertionError,
    AttributeError,
    StopIteration,
    TypeError,
    ValueError,
}

impl ExcType {
    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Returns true if `self` would be caught by `except handler_type:`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            Self::BaseException => true,
            Self::Exception => self != Self::BaseException,
            Self::ArithmeticError => matches!(self, Self::ZeroDivisionError | Self::OverflowError),
            Self::LookupError => matches!(self, Self::KeyError | Self::IndexError),
            Self::RuntimeError => matches!(self, Self::NotImplementedError | Self::RecursionError),
            Self::NameError => matches!(self, Self::UnboundLocalError),
            _ => false,
        }
    }

    /// Instantiates this class with the given constructor arguments, e.g. `ValueError('message')`.
    #[must_use]
    pub fn call(self, args: Vec<Value>) -> Value {
        Value::Exc(Rc::new(SimpleException::new(self, args)))
    }

    #[must_use]
    pub(crate) fn name_error(name: &str) -> RunError {
        SimpleException::new_msg(Self::NameError, format!("name '{name}' is not defined")).into()
    }

    #[must_use]
    pub(crate) fn type_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    #[must_use]
    pub(crate) fn value_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    #[must_use]
    pub(crate) fn index_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::IndexError, msg).into()
    }

    #[must_use]
    pub(crate) fn zero_division(msg: &str) -> RunError {
        SimpleException::new_msg(Self::ZeroDivisionError, msg).into()
    }

    #[must_use]
    pub(crate) fn overflow() -> RunError {
        SimpleException::new_msg(Self::OverflowError, "integer overflow").into()
    }

    #[must_use]
    pub(crate) fn overflow_msg(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::OverflowError, msg).into()
    }

    #[must_use]
    pub(crate) fn recursion_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::RecursionError, msg).into()
    }

    /// KeyError carries the missing key itself as its single argument.
    #[must_use]
    pub(crate) fn key_error(key: &Value) -> RunError {
        SimpleException::new(Self::KeyError, vec![key.clone()]).into()
    }

    #[must_use]
    pub(crate) fn stop_iteration() -> RunError {
        SimpleException::new(Self::StopIteration, Vec::new()).into()
    }

    #[must_use]
    pub(crate) fn binary_type_error(op: &str, lhs: Type, rhs: Type) -> RunError {
        Self::type_error(format!("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'"))
    }

    #[must_use]
    pub(crate) fn unary_type_error(op: &str, operand: Type) -> RunError {
        Self::type_error(format!("bad operand type for unary {op}: '{operand}'"))
    }

    #[must_use]
    pub(crate) fn type_error_not_callable(type_: Type) -> RunError {
        Self::type_error(format!("'{type_}' object is not callable"))
    }

    #[must_use]
    pub(crate) fn type_error_not_iterable(type_: Type) -> RunError {
        Self::type_error(format!("'{type_}' object is not iterable"))
    }

    #[must_use]
    pub(crate) fn type_error_unhashable(type_: Type) -> RunError {
        Self::type_error(format!("unhashable type: '{type_}'"))
    }

    #[must_use]
    pub(crate) fn type_error_not_subscriptable(type_: Type) -> RunError {
        Self::type_error(format!("'{type_}' object is not subscriptable"))
    }

    /// Matches the wording used for builtins: `len() takes exactly one argument (2 given)`.
    #[must_use]
    pub(crate) fn type_error_arg_count(name: &str, expected: usize, actual: usize) -> RunError {
        if expected == 1 {
            Self::type_error(format!("{name}() takes exactly one argument ({actual} given)"))
        } else {
            Self::type_error(format!("{name}() takes exactly {expected} arguments ({actual} given)"))
        }
    }

    #[must_use]
    pub(crate) fn type_error_too_many_positional(name: &str, max: usize, actual: usize) -> RunError {
        let noun = if max == 1 { "argument" } else { "arguments" };
        let verb = if actual == 1 { "was" } else { "were" };
        Self::type_error(format!("{name}() takes {max} positional {noun} but {actual} {verb} given"))
    }

    /// `f() missing 2 required positional arguments: 'a' and 'b'`
    #[must_use]
    pub(crate) fn type_error_missing_positional(name: &str, missing: &[&str]) -> RunError {
        let quoted: Vec<String> = missing.iter().map(|m| format!("'{m}'")).collect();
        let names = match quoted.as_slice() {
            [] => String::new(),
            [one] => one.clone(),
            [init @ .., last] => format!("{} and {last}", init.join(", ")),
        };
        let noun = if missing.len() == 1 { "argument" } else { "arguments" };
        Self::type_error(format!(
            "{name}() missing {} required positional {noun}: {names}",
            missing.len()
        ))
    }
}

/// An exception instance: its class, the constructor argument tuple and an
/// optional traceback-like value attached by a three-operand raise.
#[derive(Debug, Clone)]
pub struct SimpleException {
    exc_type: ExcType,
    args: Vec<Value>,
    traceback: Option<Value>,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType, args: Vec<Value>) -> Self {
        Self {
            exc_type,
            args,
            traceback: None,
        }
    }

    /// Creates an exception with a single string argument.
    #[must_use]
    pub fn new_msg(exc_type: ExcType, msg: impl Into<String>) -> Self {
        Self::new(exc_type, vec![Value::from(msg.into())])
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// The constructor arguments, as recorded at the raise site.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    #[must_use]
    pub fn traceback(&self) -> Option<&Value> {
        self.traceback.as_ref()
    }

    /// Returns the message if the exception was constructed with exactly one string.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self.args.as_slice() {
            [Value::Str(s)] => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn with_traceback(mut self, traceback: Value) -> Self {
        self.traceback = Some(traceback);
        self
    }

    /// `str(exc)`: empty for no args, `str(arg)` for one, the args tuple repr otherwise.
    #[must_use]
    pub fn py_str(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [arg] => arg.py_str().into_owned(),
            args => Value::Tuple(args.into()).py_repr(),
        }
    }

    /// `repr(exc)`, e.g. `ValueError('bad value')`.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut s = String::new();
        // writing to a String cannot fail
        let _ = self.repr_fmt(&mut s, &mut AHashSet::new());
        s
    }

    pub(crate) fn repr_fmt(&self, f: &mut impl fmt::Write, seen: &mut AHashSet<usize>) -> fmt::Result {
        write!(f, "{}(", self.exc_type)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            arg.repr_fmt(f, seen)?;
        }
        f.write_char(')')
    }
}

/// Formats like the last line of a traceback: `ValueError: bad value`.
impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = self.py_str();
        if msg.is_empty() {
            write!(f, "{}", self.exc_type)
        } else {
            write!(f, "{}: {msg}", self.exc_type)
        }
    }
}

/// Errors raised while executing bytecode.
///
/// `Exc` is a program-level fault that unwinds every frame up to the host boundary.
/// `Unsupported` and `Internal` are fatal: the former marks a compatibility gap in the
/// instruction stream, the latter an interpreter bug.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    Exc(Rc<SimpleException>),
    #[error("unsupported: {0}")]
    Unsupported(Cow<'static, str>),
    #[error("internal error: {0}")]
    Internal(Cow<'static, str>),
}

impl RunError {
    #[must_use]
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    #[must_use]
    pub fn unsupported(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// True for errors no program-level handler may observe.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Exc(_))
    }

    /// The raised exception object, for program-level faults.
    #[must_use]
    pub fn exception(&self) -> Option<&SimpleException> {
        match self {
            Self::Exc(exc) => Some(exc),
            _ => None,
        }
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Rc::new(exc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subclass_relation() {
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::Exception.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::BaseException.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::ValueError));
        assert!(ExcType::RecursionError.is_subclass_of(ExcType::RuntimeError));
    }

    #[test]
    fn display_matches_traceback_tail() {
        let exc = SimpleException::new_msg(ExcType::ValueError, "bad value");
        assert_eq!(exc.to_string(), "ValueError: bad value");
        assert_eq!(exc.py_repr(), "ValueError('bad value')");
        let bare = SimpleException::new(ExcType::AssertionError, Vec::new());
        assert_eq!(bare.to_string(), "AssertionError");
    }

    #[test]
    fn missing_positional_message() {
        let err = ExcType::type_error_missing_positional("f", &["a", "b"]);
        assert_eq!(
            err.to_string(),
            "TypeError: f() missing 2 required positional arguments: 'a' and 'b'"
        );
    }
}
