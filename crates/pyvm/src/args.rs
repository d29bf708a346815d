use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// Positional arguments popped off the operand stack for a call.
///
/// The small-arity variants avoid slicing for the common one- and two-argument builtins.
#[derive(Debug, Clone)]
pub enum ArgValues {
    Zero,
    One(Value),
    Two(Value, Value),
    Many(Vec<Value>),
}

impl From<Vec<Value>> for ArgValues {
    fn from(mut values: Vec<Value>) -> Self {
        match values.len() {
            0 => Self::Zero,
            1 => values.pop().map_or(Self::Zero, Self::One),
            2 => {
                let b = values.pop();
                let a = values.pop();
                match (a, b) {
                    (Some(a), Some(b)) => Self::Two(a, b),
                    _ => Self::Zero,
                }
            }
            _ => Self::Many(values),
        }
    }
}

impl ArgValues {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
            Self::Many(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that exactly one argument was passed and returns it.
    pub fn get_one_arg(self, name: &str) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            other => Err(ExcType::type_error_arg_count(name, 1, other.len())),
        }
    }

    /// Checks that exactly two arguments were passed and returns them.
    pub fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a, b) => Ok((a, b)),
            other => Err(ExcType::type_error_arg_count(name, 2, other.len())),
        }
    }

    /// Checks that one or two arguments were passed.
    pub fn get_one_two_args(self, name: &str) -> RunResult<(Value, Option<Value>)> {
        match self {
            Self::One(a) => Ok((a, None)),
            Self::Two(a, b) => Ok((a, Some(b))),
            other => Err(ExcType::type_error(format!(
                "{name} expected at most 2 arguments, got {}",
                other.len()
            ))),
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::Zero => Vec::new(),
            Self::One(a) => vec![a],
            Self::Two(a, b) => vec![a, b],
            Self::Many(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_checks() {
        let args = ArgValues::from(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(args, ArgValues::Two(..)));
        let err = args.get_one_arg("len").unwrap_err();
        assert_eq!(err.to_string(), "TypeError: len() takes exactly one argument (2 given)");
        let (a, b) = ArgValues::from(vec![Value::Int(1)]).get_one_two_args("next").unwrap();
        assert_eq!(a, Value::Int(1));
        assert!(b.is_none());
        assert_eq!(ArgValues::from(vec![Value::None; 3]).into_vec().len(), 3);
    }
}
