//! Lazy integer range backing `range()`.

use std::fmt::{self, Write};

use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// An immutable arithmetic sequence of integers, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// The starting value (inclusive).
    pub start: i64,
    /// The ending value (exclusive).
    pub stop: i64,
    /// Never zero.
    pub step: i64,
}

impl Range {
    /// Builds a range from the one to three integer arguments of `range()`.
    pub fn init(args: &[Value]) -> RunResult<Self> {
        let ints = args
            .iter()
            .map(|arg| {
                arg.as_int().ok_or_else(|| {
                    ExcType::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        arg.py_type()
                    ))
                })
            })
            .collect::<RunResult<Vec<i64>>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            [] => return Err(ExcType::type_error("range expected 1 argument, got 0")),
            _ => {
                return Err(ExcType::type_error(format!(
                    "range expected at most 3 arguments, got {}",
                    args.len()
                )))
            }
        };
        if step == 0 {
            return Err(ExcType::value_error("range() arg 3 must not be zero"));
        }
        Ok(Self { start, stop, step })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let (start, stop, step) = (i128::from(self.start), i128::from(self.stop), i128::from(self.step));
        let len = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / -step + 1
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `index`th element, if in bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let offset = i64::try_from(index).ok()?.checked_mul(self.step)?;
        self.start.checked_add(offset)
    }

    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= value && value < self.stop
        } else {
            self.stop < value && value <= self.start
        };
        in_bounds && (i128::from(value) - i128::from(self.start)) % i128::from(self.step) == 0
    }

    pub fn py_repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        if self.step == 1 {
            write!(f, "range({}, {})", self.start, self.stop)
        } else {
            write!(f, "range({}, {}, {})", self.start, self.stop, self.step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths() {
        let r = Range::init(&[Value::Int(10)]).unwrap();
        assert_eq!(r.len(), 10);
        let r = Range::init(&[Value::Int(10), Value::Int(0), Value::Int(-3)]).unwrap();
        assert_eq!(r.len(), 4);
        assert_eq!(r.get(3), Some(1));
        assert!(r.contains(4));
        assert!(!r.contains(5));
        let r = Range::init(&[Value::Int(5), Value::Int(1)]).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn zero_step_rejected() {
        let err = Range::init(&[Value::Int(0), Value::Int(3), Value::Int(0)]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: range() arg 3 must not be zero");
    }
}
