use std::{cell::RefCell, fmt, rc::Rc};

use crate::value::Value;

/// A shared single-slot box implementing a captured variable.
///
/// Cloning a `Cell` clones the handle, not the slot: every clone observes writes made
/// through any other. The slot outlives the frame that created it as long as a
/// function closure still holds a handle.
#[derive(Clone, Default)]
pub struct Cell(Rc<RefCell<Option<Value>>>);

impl Cell {
    #[must_use]
    pub fn new(value: Option<Value>) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Current contents, `None` if the cell was never bound.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = Some(value);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_none()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared slot, used for identity hashing.
    #[must_use]
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

// Contents are not printed: a cell may (indirectly) contain a function holding itself.
impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Cell(<empty>)")
        } else {
            f.write_str("Cell(<bound>)")
        }
    }
}
