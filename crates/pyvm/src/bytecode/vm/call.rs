//! Function calls and function creation.

use std::rc::Rc;

use super::Interpreter;
use crate::{
    bytecode::op::Operand,
    cell::Cell,
    exception::{ExcType, RunError, RunResult},
    function::Function,
    io::PrintWriter,
    value::Value,
};

impl<P: PrintWriter> Interpreter<P> {
    /// `CALL_FUNCTION`: low operand byte is the positional count, high byte the keyword
    /// count, which must be zero.
    ///
    /// Afterwards the stack must hold exactly the result in place of the callable and its
    /// arguments; anything else is an interpreter fault.
    pub(super) fn call_function(&mut self, operand: Operand) -> RunResult<()> {
        let (positional, keyword) = operand.split();
        if keyword != 0 {
            return Err(RunError::unsupported(format!(
                "keyword arguments ({keyword} passed to CALL_FUNCTION)"
            )));
        }
        let positional = usize::from(positional);
        let expected_depth = self
            .stack
            .len()
            .checked_sub(positional)
            .ok_or_else(super::stack_underflow)?;
        let args = self.pop_n(positional)?;
        let callable = self.pop()?;
        let result = self.call_value(callable, args)?;
        self.push(result);
        if self.stack.len() != expected_depth {
            return Err(RunError::internal(format!(
                "operand stack depth {} after call, expected {expected_depth}",
                self.stack.len()
            )));
        }
        Ok(())
    }

    /// Calls `callable` with positional arguments in left-to-right order.
    pub fn call_value(&mut self, callable: Value, args: Vec<Value>) -> RunResult<Value> {
        match callable {
            Value::Builtin(builtin) => builtin.call(args, &mut self.writer),
            Value::Function(function) => self.call_user_function(&function, args),
            other => Err(ExcType::type_error_not_callable(other.py_type())),
        }
    }

    /// Runs a bytecode function in a new frame sharing the caller's globals, with the
    /// caller as `prev_frame` and the function's captured cells installed.
    fn call_user_function(&mut self, function: &Function, args: Vec<Value>) -> RunResult<Value> {
        let locals = function.bind_arguments(args)?;
        let globals = Rc::clone(self.frame()?.globals());
        let mut frame = self.make_frame(Rc::clone(function.code()), globals, Some(locals));
        frame.install_closure(function.closure());
        self.run_frame(frame)
    }

    /// `MAKE_FUNCTION` / `MAKE_CLOSURE`.
    ///
    /// Stack, top first: qualified name, code object, then for closures a tuple of cells,
    /// then the default values (last default on top). The low operand byte counts
    /// positional defaults; keyword-only defaults (high byte) are unsupported.
    pub(super) fn make_function(&mut self, operand: Operand, closure: bool) -> RunResult<()> {
        let (defaults, kw_defaults) = operand.split();
        if kw_defaults != 0 {
            return Err(RunError::unsupported("keyword-only parameter defaults"));
        }
        let name = match self.pop()? {
            Value::Str(name) => name.to_string(),
            other => return Err(RunError::internal(format!("function name is a {}", other.py_type()))),
        };
        let code = match self.pop()? {
            Value::Code(code) => code,
            other => return Err(RunError::internal(format!("function body is a {}", other.py_type()))),
        };
        let cells = if closure { self.pop_cells()? } else { Vec::new() };
        if closure && cells.len() != code.freevars.len() {
            return Err(RunError::internal(format!(
                "{name} captures {} cells for {} free variables",
                cells.len(),
                code.freevars.len()
            )));
        }
        let defaults = self.pop_n(usize::from(defaults))?;
        let function = Function::new(name, code, defaults, cells);
        self.push(Value::Function(Rc::new(function)));
        Ok(())
    }

    /// Pops the cell tuple built by `LOAD_CLOSURE` + `BUILD_TUPLE`.
    fn pop_cells(&mut self) -> RunResult<Vec<Cell>> {
        let Value::Tuple(items) = self.pop()? else {
            return Err(RunError::internal("MAKE_CLOSURE expects a tuple of cells"));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Cell(cell) => Ok(cell.clone()),
                other => Err(RunError::internal(format!("closure item is a {}", other.py_type()))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{CodeBuilder, Constant, Opcode},
        config::VmConfig,
        io::CollectStringPrint,
    };

    fn run(b: CodeBuilder) -> (RunResult<Value>, Interpreter<CollectStringPrint>) {
        let code = Rc::new(b.build().unwrap());
        let mut vm = Interpreter::new(VmConfig::new(), CollectStringPrint::new());
        let result = vm.exec_code(code, None);
        (result, vm)
    }

    /// `def add(a, b=10): return a + b`
    fn add_function() -> crate::bytecode::Code {
        let mut f = CodeBuilder::function("add", &["a", "b"]);
        f.load_fast("a").load_fast("b").emit(Opcode::BinaryAdd).return_value();
        f.build().unwrap()
    }

    #[test]
    fn defaults_fill_trailing_parameters() {
        let mut b = CodeBuilder::new("<module>");
        b.load_const(Constant::Int(10));
        b.make_function(add_function(), 1).store_name("add");
        b.load_name("add").load_const(Constant::Int(1)).call(1);
        b.load_name("add").load_const(Constant::Int(1)).load_const(Constant::Int(2)).call(2);
        b.emit_arg(Opcode::BuildTuple, 2).return_value();
        let (result, vm) = run(b);
        assert_eq!(result.unwrap().py_repr(), "(11, 3)");
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn builtins_write_to_the_interpreter_output() {
        let mut b = CodeBuilder::new("<module>");
        b.load_name("print").load_const(Constant::from("hello")).load_const(Constant::Int(2)).call(2);
        b.return_value();
        let (result, vm) = run(b);
        assert_eq!(result.unwrap(), Value::None);
        assert_eq!(vm.writer().output(), "hello 2\n");
    }

    #[test]
    fn keyword_arguments_are_unsupported() {
        let mut b = CodeBuilder::new("<module>");
        b.load_name("print").load_const(Constant::from("end")).load_const(Constant::from(""));
        b.emit_args(Opcode::CallFunction, 0, 1);
        b.return_value();
        let (result, _) = run(b);
        assert!(matches!(result, Err(RunError::Unsupported(_))));
    }

    #[test]
    fn calling_a_non_callable() {
        let mut b = CodeBuilder::new("<module>");
        b.load_const(Constant::Int(1)).call(0).return_value();
        let (result, _) = run(b);
        assert_eq!(result.unwrap_err().to_string(), "TypeError: 'int' object is not callable");
    }

    #[test]
    fn arity_errors() {
        let mut b = CodeBuilder::new("<module>");
        b.make_function(add_function(), 0).store_name("add");
        b.load_name("add").load_const(Constant::Int(1)).call(1).return_value();
        let (result, _) = run(b);
        assert_eq!(
            result.unwrap_err().to_string(),
            "TypeError: add() missing 1 required positional argument: 'b'"
        );
    }
}
