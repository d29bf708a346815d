use std::rc::Rc;

use crate::{
    bytecode::{Code, CO_GENERATOR, CO_VARARGS, CO_VARKEYWORDS},
    cell::Cell,
    exception::{ExcType, RunError, RunResult},
    namespace::Namespace,
    value::Value,
};

/// A function created by `MAKE_FUNCTION` or `MAKE_CLOSURE`.
///
/// The code object is shared read-only with every other function made from it. Defaults
/// are stored in declaration order and cover the trailing `defaults.len()` parameters.
/// `closure` holds the cells captured at definition time, one per free variable of `code`.
#[derive(Debug)]
pub struct Function {
    name: String,
    code: Rc<Code>,
    defaults: Vec<Value>,
    closure: Vec<Cell>,
}

impl Function {
    #[must_use]
    pub fn new(name: String, code: Rc<Code>, defaults: Vec<Value>, closure: Vec<Cell>) -> Self {
        Self {
            name,
            code,
            defaults,
            closure,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    #[must_use]
    pub fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    #[must_use]
    pub fn closure(&self) -> &[Cell] {
        &self.closure
    }

    /// Builds the callee's local mapping from positional arguments and defaults.
    ///
    /// Parameter `i` binds `args[i]` when supplied, otherwise
    /// `defaults[i - (arg_count - defaults.len())]`. Too many arguments, or a missing
    /// parameter without a default, raise `TypeError`. Keyword-only parameters and
    /// variadic or generator code are unsupported.
    pub fn bind_arguments(&self, args: Vec<Value>) -> RunResult<Namespace> {
        let code = &self.code;
        if code.kwonly_arg_count != 0 {
            return Err(RunError::unsupported(format!(
                "keyword-only parameters in {}()",
                self.name
            )));
        }
        if code.flags & (CO_VARARGS | CO_VARKEYWORDS) != 0 {
            return Err(RunError::unsupported(format!(
                "variadic parameters in {}()",
                self.name
            )));
        }
        if code.flags & CO_GENERATOR != 0 {
            return Err(RunError::unsupported(format!("generator function {}()", self.name)));
        }
        let arg_count = code.arg_count as usize;
        let params = code
            .varnames
            .get(..arg_count)
            .ok_or_else(|| RunError::internal(format!("{}() declares more parameters than locals", self.name)))?;
        if args.len() > arg_count {
            return Err(ExcType::type_error_too_many_positional(&self.name, arg_count, args.len()));
        }
        let first_default = arg_count.checked_sub(self.defaults.len()).ok_or_else(|| {
            RunError::internal(format!("{}() has more defaults than parameters", self.name))
        })?;

        let supplied = args.len();
        let mut locals = Namespace::with_capacity(code.varnames.len());
        for (name, value) in params.iter().zip(args) {
            locals.insert(name.clone(), value);
        }
        let mut missing = Vec::new();
        for (i, name) in params.iter().enumerate().skip(supplied) {
            if i >= first_default {
                locals.insert(name.clone(), self.defaults[i - first_default].clone());
            } else {
                missing.push(name.as_str());
            }
        }
        if !missing.is_empty() {
            return Err(ExcType::type_error_missing_positional(&self.name, &missing));
        }
        Ok(locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CodeBuilder;

    fn function(params: &[&str], defaults: Vec<Value>) -> Function {
        let mut b = CodeBuilder::function("f", params);
        b.load_const(crate::bytecode::Constant::None).return_value();
        Function::new("f".to_owned(), Rc::new(b.build().unwrap()), defaults, Vec::new())
    }

    #[test]
    fn defaults_fill_trailing_parameters() {
        let f = function(&["a", "b", "c"], vec![Value::Int(20), Value::Int(30)]);
        let locals = f.bind_arguments(vec![Value::Int(1)]).unwrap();
        assert_eq!(locals["a"], Value::Int(1));
        assert_eq!(locals["b"], Value::Int(20));
        assert_eq!(locals["c"], Value::Int(30));
        let locals = f.bind_arguments(vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(locals["b"], Value::Int(2));
        assert_eq!(locals["c"], Value::Int(30));
    }

    #[test]
    fn arity_errors() {
        let f = function(&["a", "b"], Vec::new());
        let err = f.bind_arguments(vec![]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: f() missing 2 required positional arguments: 'a' and 'b'"
        );
        let err = f.bind_arguments(vec![Value::None; 3]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: f() takes 2 positional arguments but 3 were given");
    }

    #[test]
    fn variadic_code_is_unsupported() {
        let mut b = CodeBuilder::function("g", &[]);
        b.flags(CO_VARARGS);
        b.load_const(crate::bytecode::Constant::None).return_value();
        let f = Function::new("g".to_owned(), Rc::new(b.build().unwrap()), Vec::new(), Vec::new());
        assert!(f.bind_arguments(Vec::new()).unwrap_err().is_fatal());
    }
}
