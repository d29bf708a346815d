//! Interactive sessions: many code objects evaluated against one global mapping.

use std::rc::Rc;

use tracing::{debug, info};

use crate::{
    bytecode::{Code, Interpreter},
    config::VmConfig,
    exception::{RunError, RunResult, SimpleException},
    io::PrintWriter,
    namespace::{builtin_globals, Globals},
    value::Value,
};

/// Result of evaluating one input in a session.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The input ran to completion with this return value.
    Value(Value),
    /// A program-level exception reached the session boundary.
    Fault(Rc<SimpleException>),
}

impl Outcome {
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// A long-lived interpreter whose root frames all share one global mapping, so names
/// bound by one input are visible to the next.
#[derive(Debug)]
pub struct Session<P: PrintWriter> {
    interpreter: Interpreter<P>,
    globals: Globals,
}

impl<P: PrintWriter> Session<P> {
    #[must_use]
    pub fn new(config: VmConfig, writer: P) -> Self {
        Self {
            interpreter: Interpreter::new(config, writer),
            globals: builtin_globals(),
        }
    }

    /// Runs `code` as module-level code against the session globals.
    ///
    /// A raised exception is returned as [`Outcome::Fault`] after both stacks are
    /// restored to their depths before the call, and the session stays usable.
    /// Unsupported and internal errors are returned as `Err`.
    pub fn eval(&mut self, code: Rc<Code>) -> RunResult<Outcome> {
        let stack_depth = self.interpreter.stack_depth();
        let call_depth = self.interpreter.call_depth();
        let frame = self.interpreter.make_frame(code, Rc::clone(&self.globals), None);
        match self.interpreter.run_frame(frame) {
            Ok(value) => Ok(Outcome::Value(value)),
            Err(RunError::Exc(exc)) => {
                info!(exception = %exc, "fault reached the session boundary");
                self.interpreter.truncate(stack_depth, call_depth);
                Ok(Outcome::Fault(exc))
            }
            Err(err) => {
                debug!(error = %err, "fatal error, resetting session stacks");
                self.interpreter.truncate(stack_depth, call_depth);
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The current global binding of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn interpreter(&self) -> &Interpreter<P> {
        &self.interpreter
    }

    #[must_use]
    pub fn writer(&self) -> &P {
        self.interpreter.writer()
    }

    pub fn writer_mut(&mut self) -> &mut P {
        self.interpreter.writer_mut()
    }

    #[must_use]
    pub fn into_writer(self) -> P {
        self.interpreter.into_writer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{CodeBuilder, Constant},
        exception::ExcType,
        io::CollectStringPrint,
    };

    fn code(build: impl FnOnce(&mut CodeBuilder)) -> Rc<Code> {
        let mut b = CodeBuilder::new("<input>");
        build(&mut b);
        Rc::new(b.build().unwrap())
    }

    #[test]
    fn bindings_persist_across_inputs() {
        let mut session = Session::new(VmConfig::new(), CollectStringPrint::new());
        let first = code(|b| {
            b.load_const(Constant::Int(2)).store_name("x");
            b.load_const(Constant::None).return_value();
        });
        let second = code(|b| {
            b.load_name("print").load_name("x").call(1).return_value();
        });
        assert!(!session.eval(first).unwrap().is_fault());
        assert!(!session.eval(second).unwrap().is_fault());
        assert_eq!(session.get("x"), Some(Value::Int(2)));
        assert_eq!(session.writer().output(), "2\n");
    }

    #[test]
    fn faults_are_caught_and_stacks_restored() {
        let mut session = Session::new(VmConfig::new(), CollectStringPrint::new());
        let failing = code(|b| {
            b.load_const(Constant::Int(1)).load_name("undefined").return_value();
        });
        let Outcome::Fault(exc) = session.eval(failing).unwrap() else {
            panic!("expected a fault");
        };
        assert_eq!(exc.exc_type(), ExcType::NameError);
        assert_eq!(session.interpreter().stack_depth(), 0);
        assert_eq!(session.interpreter().call_depth(), 0);

        let ok = code(|b| {
            b.load_const(Constant::Int(5)).return_value();
        });
        assert!(matches!(session.eval(ok).unwrap(), Outcome::Value(Value::Int(5))));
    }
}
