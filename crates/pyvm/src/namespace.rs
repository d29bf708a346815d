use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{builtins::Builtins, value::Value};

/// A name-to-value mapping: a frame's locals or a session's globals.
pub type Namespace = AHashMap<String, Value>;

/// The global mapping, shared by reference between every frame of one call tree.
pub type Globals = Rc<RefCell<Namespace>>;

/// A fresh global mapping seeded with every builtin function, type and exception class.
#[must_use]
pub fn builtin_globals() -> Globals {
    let namespace: Namespace = Builtins::all()
        .map(|builtin| (builtin.name(), Value::Builtin(builtin)))
        .collect();
    Rc::new(RefCell::new(namespace))
}
