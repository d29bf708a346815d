//! `RAISE_VARARGS`.
//!
//! There is no handler stack: a raised exception ends every active dispatch loop and
//! surfaces at the host boundary as `RunError::Exc`.

use super::Interpreter;
use crate::{
    builtins::Builtins,
    exception::{ExcType, RunError, RunResult, SimpleException},
    io::PrintWriter,
    value::Value,
};

impl<P: PrintWriter> Interpreter<P> {
    /// Builds the error raised by `RAISE_VARARGS argc`.
    ///
    /// Operands in push order: exception, cause (argc 2 and 3), traceback (argc 3).
    /// A bare re-raise and a non-`None` cause are unsupported.
    pub(super) fn raise_varargs(&mut self, argc: usize) -> RunError {
        if argc == 0 {
            return RunError::unsupported("re-raise without an active exception");
        }
        if argc > 3 {
            return RunError::internal(format!("RAISE_VARARGS with {argc} operands"));
        }
        let mut operands = match self.pop_n(argc) {
            Ok(operands) => operands.into_iter(),
            Err(err) => return err,
        };
        let (Some(exc), cause, traceback) = (operands.next(), operands.next(), operands.next()) else {
            return super::stack_underflow();
        };
        if cause.is_some_and(|cause| !matches!(cause, Value::None)) {
            return RunError::unsupported("exception chaining with 'raise ... from'");
        }
        match (make_exception(exc), traceback) {
            (Ok(exc), Some(traceback)) => exc.with_traceback(traceback).into(),
            (Ok(exc), None) => exc.into(),
            (Err(err), _) => err,
        }
    }
}

/// An exception instance is raised as is; an exception class is instantiated with no
/// arguments.
fn make_exception(value: Value) -> RunResult<SimpleException> {
    match value {
        Value::Exc(exc) => Ok((*exc).clone()),
        Value::Builtin(Builtins::ExcType(exc_type)) => Ok(SimpleException::new(exc_type, Vec::new())),
        _ => Err(ExcType::type_error("exceptions must derive from BaseException")),
    }
}
