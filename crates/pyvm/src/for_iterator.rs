//! Iterator support for `for` loops, `iter()`/`next()` and the collection constructors.
//!
//! `ForIterator` stores an index plus a handle to its source rather than a Rust iterator,
//! so it can live inside a `Value::Iterator` on the operand stack across many
//! `FOR_ITER` dispatches. For constructors like `list()` and `tuple()`, use
//! `ForIterator::new()` followed by `collect()` to materialize all items.

use std::{cell::RefCell, rc::Rc};

use crate::{
    exception::{ExcType, RunResult},
    types::Range,
    value::Value,
};

/// Iterator state: the current index and the type-specific source.
#[derive(Debug)]
pub struct ForIterator {
    index: usize,
    source: IterSource,
}

#[derive(Debug)]
enum IterSource {
    /// Yields `Value::Int`.
    Range(Range),
    /// The current list length is re-read on every step, so appends made by the
    /// loop body are visited.
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    /// Yields one-character strings; `offset` is the byte position of the next char.
    Str { string: Rc<str>, offset: usize },
    /// Yields `Value::Int` for each byte.
    Bytes(Rc<[u8]>),
    /// Snapshot of dict keys or set members taken when the iterator was created.
    Keys(Vec<Value>),
    /// Delegates to another iterator, so `iter(it)` shares `it`'s position.
    Shared(Rc<RefCell<ForIterator>>),
}

impl ForIterator {
    /// Creates an iterator over `value`, failing with `TypeError` if it is not iterable.
    pub fn new(value: Value) -> RunResult<Self> {
        let source = match value {
            Value::Range(range) => IterSource::Range(range),
            Value::List(list) => IterSource::List(list),
            Value::Tuple(tuple) => IterSource::Tuple(tuple),
            Value::Str(string) => IterSource::Str { string, offset: 0 },
            Value::Bytes(bytes) => IterSource::Bytes(bytes),
            Value::Dict(dict) => IterSource::Keys(dict.borrow().keys().cloned().collect()),
            Value::Set(set) => IterSource::Keys(set.borrow().iter().cloned().collect()),
            Value::Iterator(inner) => IterSource::Shared(inner),
            other => return Err(ExcType::type_error_not_iterable(other.py_type())),
        };
        Ok(Self { index: 0, source })
    }

    /// Wraps `value` as an iterator value; an existing iterator is returned unchanged.
    pub fn iter_value(value: Value) -> RunResult<Value> {
        match value {
            Value::Iterator(_) => Ok(value),
            other => Ok(Value::Iterator(Rc::new(RefCell::new(Self::new(other)?)))),
        }
    }

    /// Returns the next item, or `None` once the source is exhausted.
    pub fn for_next(&mut self) -> Option<Value> {
        let item = match &mut self.source {
            IterSource::Range(range) => range.get(self.index).map(Value::Int),
            IterSource::List(list) => list.borrow().get(self.index).cloned(),
            IterSource::Tuple(tuple) => tuple.get(self.index).cloned(),
            IterSource::Str { string, offset } => {
                let ch = string[*offset..].chars().next()?;
                *offset += ch.len_utf8();
                Some(Value::from(ch.to_string()))
            }
            IterSource::Bytes(bytes) => bytes.get(self.index).map(|b| Value::Int(i64::from(*b))),
            IterSource::Keys(keys) => keys.get(self.index).cloned(),
            IterSource::Shared(inner) => return inner.borrow_mut().for_next(),
        };
        if item.is_some() {
            self.index += 1;
        }
        item
    }

    /// Drains the remaining items into a vector.
    pub fn collect(mut self) -> RunResult<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(item) = self.for_next() {
            items.push(item);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_iteration_yields_chars() {
        let items = ForIterator::new(Value::from("hé!")).unwrap().collect().unwrap();
        assert_eq!(items, vec![Value::from("h"), Value::from("é"), Value::from("!")]);
    }

    #[test]
    fn list_growth_is_observed() {
        let list = Rc::new(RefCell::new(vec![Value::Int(1)]));
        let mut it = ForIterator::new(Value::List(list.clone())).unwrap();
        assert_eq!(it.for_next(), Some(Value::Int(1)));
        list.borrow_mut().push(Value::Int(2));
        assert_eq!(it.for_next(), Some(Value::Int(2)));
        assert_eq!(it.for_next(), None);
    }

    #[test]
    fn not_iterable() {
        let err = ForIterator::new(Value::Int(3)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: 'int' object is not iterable");
    }
}
