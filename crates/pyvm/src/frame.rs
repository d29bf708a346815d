use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    bytecode::Code,
    cell::Cell,
    namespace::{Globals, Namespace},
    value::Value,
};

/// One activation record.
///
/// `locals` is `None` for a frame whose name stores go straight to the globals, which is
/// how module-level code binds global names. `prev_frame` is the index of the calling
/// frame on the interpreter's call stack; it is followed when resolving cells that the
/// frame does not own.
#[derive(Debug)]
pub struct Frame {
    code: Rc<Code>,
    pub(crate) ip: usize,
    locals: Option<Namespace>,
    globals: Globals,
    prev_frame: Option<usize>,
    cells: AHashMap<String, Cell>,
    return_value: Value,
}

impl Frame {
    /// Creates a frame positioned at the first instruction.
    ///
    /// A fresh cell is made for each of the code's cell variables, seeded with the name's
    /// current binding in `locals`, then `globals`, and left empty otherwise.
    #[must_use]
    pub fn new(code: Rc<Code>, globals: Globals, locals: Option<Namespace>, prev_frame: Option<usize>) -> Self {
        let cells = code
            .cellvars
            .iter()
            .map(|name| {
                let seed = locals
                    .as_ref()
                    .and_then(|l| l.get(name))
                    .cloned()
                    .or_else(|| globals.borrow().get(name).cloned());
                (name.clone(), Cell::new(seed))
            })
            .collect();
        Self {
            code,
            ip: 0,
            locals,
            globals,
            prev_frame,
            cells,
            return_value: Value::None,
        }
    }

    #[must_use]
    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    #[must_use]
    pub fn ip(&self) -> usize {
        self.ip
    }

    #[must_use]
    pub fn locals(&self) -> Option<&Namespace> {
        self.locals.as_ref()
    }

    pub(crate) fn locals_mut(&mut self) -> Option<&mut Namespace> {
        self.locals.as_mut()
    }

    #[must_use]
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    #[must_use]
    pub fn prev_frame(&self) -> Option<usize> {
        self.prev_frame
    }

    #[must_use]
    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    /// Installs `cell` under `name`, replacing any cell the frame made itself.
    pub fn set_cell(&mut self, name: impl Into<String>, cell: Cell) {
        self.cells.insert(name.into(), cell);
    }

    /// Makes a function's captured cells visible under its code's free-variable names.
    pub(crate) fn install_closure(&mut self, closure: &[Cell]) {
        let code = Rc::clone(&self.code);
        for (name, cell) in code.freevars.iter().zip(closure) {
            self.set_cell(name.as_str(), cell.clone());
        }
    }

    #[must_use]
    pub fn return_value(&self) -> &Value {
        &self.return_value
    }

    pub(crate) fn set_return_value(&mut self, value: Value) {
        self.return_value = value;
    }

    pub(crate) fn take_return_value(&mut self) -> Value {
        std::mem::replace(&mut self.return_value, Value::None)
    }
}
