//! Container construction, comprehension appends, subscripts and unpacking.

use super::Interpreter;
use crate::{
    exception::{ExcType, RunError, RunResult},
    for_iterator::ForIterator,
    io::PrintWriter,
    types::{Dict, Set},
    value::Value,
};

impl<P: PrintWriter> Interpreter<P> {
    pub(super) fn build_tuple(&mut self, count: usize) -> RunResult<()> {
        let items = self.pop_n(count)?;
        self.push(Value::new_tuple(items));
        Ok(())
    }

    pub(super) fn build_list(&mut self, count: usize) -> RunResult<()> {
        let items = self.pop_n(count)?;
        self.push(Value::new_list(items));
        Ok(())
    }

    pub(super) fn build_set(&mut self, count: usize) -> RunResult<()> {
        let items = self.pop_n(count)?;
        self.push(Value::new_set(Set::from_values(items)?));
        Ok(())
    }

    /// `BUILD_MAP` always pushes an empty dict; entries follow through `STORE_MAP`.
    pub(super) fn build_map(&mut self) {
        self.push(Value::new_dict(Dict::new()));
    }

    /// `STORE_MAP`: `[dict, value, key]` -> `[dict]`.
    pub(super) fn store_map(&mut self) -> RunResult<()> {
        let key = self.pop()?;
        let value = self.pop()?;
        self.peek()?.py_setitem(key, value)
    }

    /// `LIST_APPEND i`: appends the popped value to the list `i` slots down.
    pub(super) fn list_append(&mut self, depth: usize) -> RunResult<()> {
        let value = self.pop()?;
        match self.stack_slot(depth)? {
            Value::List(list) => {
                list.borrow_mut().push(value);
                Ok(())
            }
            other => Err(wrong_target("LIST_APPEND", other)),
        }
    }

    pub(super) fn set_add(&mut self, depth: usize) -> RunResult<()> {
        let value = self.pop()?;
        match self.stack_slot(depth)? {
            Value::Set(set) => set.borrow_mut().add(value),
            other => Err(wrong_target("SET_ADD", other)),
        }
    }

    /// `MAP_ADD i`: key on top, value below it.
    pub(super) fn map_add(&mut self, depth: usize) -> RunResult<()> {
        let key = self.pop()?;
        let value = self.pop()?;
        match self.stack_slot(depth)? {
            Value::Dict(dict) => dict.borrow_mut().insert(key, value),
            other => Err(wrong_target("MAP_ADD", other)),
        }
    }

    pub(super) fn binary_subscr(&mut self) -> RunResult<()> {
        let key = self.pop()?;
        let container = self.pop()?;
        self.push(container.py_getitem(&key)?);
        Ok(())
    }

    /// `STORE_SUBSCR`: `[value, container, key]` -> `[]`.
    pub(super) fn store_subscr(&mut self) -> RunResult<()> {
        let key = self.pop()?;
        let container = self.pop()?;
        let value = self.pop()?;
        container.py_setitem(key, value)
    }

    pub(super) fn delete_subscr(&mut self) -> RunResult<()> {
        let key = self.pop()?;
        let container = self.pop()?;
        container.py_delitem(&key)
    }

    /// `UNPACK_SEQUENCE n`: pushes the items in reverse so the first ends up on top.
    pub(super) fn unpack_sequence(&mut self, count: usize) -> RunResult<()> {
        let sequence = self.pop()?;
        let items = ForIterator::new(sequence)?.collect()?;
        if items.len() < count {
            return Err(ExcType::value_error(format!(
                "not enough values to unpack (expected {count}, got {})",
                items.len()
            )));
        }
        if items.len() > count {
            return Err(ExcType::value_error(format!(
                "too many values to unpack (expected {count})"
            )));
        }
        self.stack.extend(items.into_iter().rev());
        Ok(())
    }
}

fn wrong_target(opcode: &str, value: &Value) -> RunError {
    RunError::internal(format!("{opcode} target is a {}", value.py_type()))
}
