//! Arithmetic, bitwise and set operators shared by the VM and the builtins.

use strum::Display;

use crate::{
    exception::{ExcType, RunResult, SimpleException},
    for_iterator::ForIterator,
    types::Set,
    value::Value,
};

/// Longest sequence a repetition may produce, in items (bytes for `str`).
const MAX_REPEAT_LEN: usize = 1 << 28;

/// Binary operators, shared by the `BINARY_*` and `INPLACE_*` opcodes.
///
/// Uses strum `Display` derive with per-variant serialization for operator symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mult,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "** or pow()")]
    Pow,
    #[strum(serialize = "<<")]
    LShift,
    #[strum(serialize = ">>")]
    RShift,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum UnaryOp {
    #[strum(serialize = "+")]
    Positive,
    #[strum(serialize = "-")]
    Negative,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "~")]
    Invert,
}

/// Numeric operand pair after bool-to-int normalization.
enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(lhs: &Value, rhs: &Value) -> Option<Numbers> {
    match (lhs.as_int(), rhs.as_int()) {
        (Some(a), Some(b)) => Some(Numbers::Ints(a, b)),
        _ => Some(Numbers::Floats(float_operand(lhs)?, float_operand(rhs)?)),
    }
}

fn float_operand(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => value.as_float(),
        _ => None,
    }
}

impl BinaryOp {
    /// Applies the operator, raising `TypeError` for unsupported operand types.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> RunResult<Value> {
        let result = match self {
            Self::Add => add(lhs, rhs)?,
            Self::Sub => sub(lhs, rhs)?,
            Self::Mult => mult(lhs, rhs)?,
            Self::Div => match numbers(lhs, rhs) {
                Some(Numbers::Ints(a, b)) => Some(true_div(as_f64(a), as_f64(b))?),
                Some(Numbers::Floats(a, b)) => Some(true_div(a, b)?),
                None => None,
            },
            Self::FloorDiv => match numbers(lhs, rhs) {
                Some(Numbers::Ints(a, b)) => Some(Value::Int(floor_div_int(a, b)?)),
                Some(Numbers::Floats(a, b)) => Some(Value::Float(floor_div_float(a, b)?)),
                None => None,
            },
            Self::Mod => match numbers(lhs, rhs) {
                Some(Numbers::Ints(a, b)) => Some(Value::Int(mod_int(a, b)?)),
                Some(Numbers::Floats(a, b)) => Some(Value::Float(mod_float(a, b)?)),
                None => None,
            },
            Self::Pow => match numbers(lhs, rhs) {
                Some(Numbers::Ints(a, b)) => Some(pow_int(a, b)?),
                Some(Numbers::Floats(a, b)) => Some(Value::Float(pow_float(a, b)?)),
                None => None,
            },
            Self::LShift | Self::RShift => match (int_operand(lhs), int_operand(rhs)) {
                (Some(a), Some(b)) => Some(Value::Int(shift(self, a, b)?)),
                _ => None,
            },
            Self::BitAnd | Self::BitOr | Self::BitXor => bitwise(self, lhs, rhs),
        };
        result.ok_or_else(|| ExcType::binary_type_error(&self.to_string(), lhs.py_type(), rhs.py_type()))
    }

    /// Applies the augmented-assignment form of the operator.
    ///
    /// A list under `+=` or `*=`, and a set under `|=`, `&=`, `^=` or `-=` with a set
    /// operand, is updated in place and returned as the same object. Every other
    /// combination falls back to [`Self::apply`].
    pub fn apply_inplace(self, lhs: &Value, rhs: &Value) -> RunResult<Value> {
        match (self, lhs, rhs) {
            (Self::Add, Value::List(list), _) => {
                // collected first so `a += a` does not borrow the list twice
                let items = ForIterator::new(rhs.clone())?.collect()?;
                list.borrow_mut().extend(items);
            }
            (Self::Mult, Value::List(list), _) => {
                let Some(n) = repeat_count(rhs)? else {
                    return self.apply(lhs, rhs);
                };
                let mut items = list.borrow_mut();
                let total = repeated_len(items.len(), n)?;
                let repeated: Vec<Value> = items.iter().cycle().take(total).cloned().collect();
                *items = repeated;
            }
            (Self::BitOr | Self::BitAnd | Self::BitXor | Self::Sub, Value::Set(set), Value::Set(other)) => {
                let updated = {
                    let (a, b) = (set.borrow(), other.borrow());
                    match self {
                        Self::Sub => a.difference(&b),
                        _ => set_op(self, &a, &b),
                    }
                };
                *set.borrow_mut() = updated;
            }
            _ => return self.apply(lhs, rhs),
        }
        Ok(lhs.clone())
    }
}

impl UnaryOp {
    pub fn apply(self, operand: &Value) -> RunResult<Value> {
        let result = match (self, operand) {
            (Self::Not, v) => Some(Value::Bool(!v.py_bool())),
            (Self::Positive, Value::Float(f)) => Some(Value::Float(*f)),
            (Self::Negative, Value::Float(f)) => Some(Value::Float(-f)),
            (Self::Positive, v) => int_operand(v).map(Value::Int),
            (Self::Negative, v) => match int_operand(v) {
                Some(i) => Some(Value::Int(i.checked_neg().ok_or_else(ExcType::overflow)?)),
                None => None,
            },
            (Self::Invert, v) => int_operand(v).map(|i| Value::Int(!i)),
        };
        result.ok_or_else(|| ExcType::unary_type_error(&self.to_string(), operand.py_type()))
    }
}

fn int_operand(value: &Value) -> Option<i64> {
    value.as_int()
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(i: i64) -> f64 {
    i as f64
}

fn add(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    Ok(match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(Value::from(format!("{a}{b}"))),
        (Value::Bytes(a), Value::Bytes(b)) => Some(Value::from([&a[..], &b[..]].concat())),
        (Value::Tuple(a), Value::Tuple(b)) => Some(Value::Tuple(a.iter().chain(b.iter()).cloned().collect())),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Some(Value::new_list(items))
        }
        _ => match numbers(lhs, rhs) {
            Some(Numbers::Ints(a, b)) => Some(Value::Int(a.checked_add(b).ok_or_else(ExcType::overflow)?)),
            Some(Numbers::Floats(a, b)) => Some(Value::Float(a + b)),
            None => None,
        },
    })
}

fn sub(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    Ok(match (lhs, rhs) {
        (Value::Set(a), Value::Set(b)) => Some(Value::new_set(a.borrow().difference(&b.borrow()))),
        _ => match numbers(lhs, rhs) {
            Some(Numbers::Ints(a, b)) => Some(Value::Int(a.checked_sub(b).ok_or_else(ExcType::overflow)?)),
            Some(Numbers::Floats(a, b)) => Some(Value::Float(a - b)),
            None => None,
        },
    })
}

fn mult(lhs: &Value, rhs: &Value) -> RunResult<Option<Value>> {
    if let Some(result) = repeat(lhs, rhs)?.or(repeat(rhs, lhs)?) {
        return Ok(Some(result));
    }
    Ok(match numbers(lhs, rhs) {
        Some(Numbers::Ints(a, b)) => Some(Value::Int(a.checked_mul(b).ok_or_else(ExcType::overflow)?)),
        Some(Numbers::Floats(a, b)) => Some(Value::Float(a * b)),
        None => None,
    })
}

/// Sequence repetition (`seq * n`); a non-positive count yields an empty sequence.
fn repeat(seq: &Value, count: &Value) -> RunResult<Option<Value>> {
    if !matches!(seq, Value::Str(_) | Value::Bytes(_) | Value::Tuple(_) | Value::List(_)) {
        return Ok(None);
    }
    let Some(n) = repeat_count(count)? else {
        return Ok(None);
    };
    Ok(match seq {
        Value::Str(s) => {
            repeated_len(s.len(), n)?;
            Some(Value::from(s.repeat(n)))
        }
        Value::Bytes(b) => {
            repeated_len(b.len(), n)?;
            Some(Value::from(b.repeat(n)))
        }
        Value::Tuple(t) => {
            let total = repeated_len(t.len(), n)?;
            Some(Value::Tuple(t.iter().cycle().take(total).cloned().collect()))
        }
        Value::List(l) => {
            let l = l.borrow();
            let total = repeated_len(l.len(), n)?;
            Some(Value::new_list(l.iter().cycle().take(total).cloned().collect()))
        }
        _ => None,
    })
}

/// The repeat count of `count`, clamped at zero; `None` if it is not an integer.
fn repeat_count(count: &Value) -> RunResult<Option<usize>> {
    let Some(n) = int_operand(count) else {
        return Ok(None);
    };
    usize::try_from(n.max(0)).map(Some).map_err(|_| ExcType::overflow())
}

fn repeated_len(len: usize, n: usize) -> RunResult<usize> {
    len.checked_mul(n)
        .filter(|total| *total <= MAX_REPEAT_LEN)
        .ok_or_else(|| ExcType::overflow_msg("repeated sequence is too long"))
}

fn true_div(a: f64, b: f64) -> RunResult<Value> {
    if b == 0.0 {
        Err(ExcType::zero_division("division by zero"))
    } else {
        Ok(Value::Float(a / b))
    }
}

/// Floor division rounding toward negative infinity.
pub(crate) fn floor_div_int(a: i64, b: i64) -> RunResult<i64> {
    if b == 0 {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    let q = a.checked_div(b).ok_or_else(ExcType::overflow)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Modulo whose result takes the sign of the divisor.
pub(crate) fn mod_int(a: i64, b: i64) -> RunResult<i64> {
    if b == 0 {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub(crate) fn floor_div_float(a: f64, b: f64) -> RunResult<f64> {
    if b == 0.0 {
        return Err(ExcType::zero_division("float floor division by zero"));
    }
    Ok((a / b).floor())
}

pub(crate) fn mod_float(a: f64, b: f64) -> RunResult<f64> {
    if b == 0.0 {
        return Err(ExcType::zero_division("float modulo"));
    }
    let r = a % b;
    if r == 0.0 {
        Ok(0.0_f64.copysign(b))
    } else if (r < 0.0) != (b < 0.0) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn pow_int(base: i64, exp: i64) -> RunResult<Value> {
    if exp < 0 {
        return pow_float(as_f64(base), as_f64(exp)).map(Value::Float);
    }
    let result = match base {
        0 | 1 => Some(if exp == 0 { 1 } else { base }),
        -1 => Some(if exp % 2 == 0 { 1 } else { -1 }),
        _ => u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)),
    };
    result.map(Value::Int).ok_or_else(ExcType::overflow)
}

fn pow_float(base: f64, exp: f64) -> RunResult<f64> {
    if base == 0.0 && exp < 0.0 {
        return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
    }
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(ExcType::value_error("math domain error"));
    }
    let result = base.powf(exp);
    if result.is_infinite() && base.is_finite() && exp.is_finite() {
        return Err(SimpleException::new_msg(ExcType::OverflowError, "(34, 'Numerical result out of range')").into());
    }
    Ok(result)
}

fn shift(op: BinaryOp, value: i64, count: i64) -> RunResult<i64> {
    if count < 0 {
        return Err(ExcType::value_error("negative shift count"));
    }
    if op == BinaryOp::RShift {
        return Ok(if count >= 64 {
            if value < 0 {
                -1
            } else {
                0
            }
        } else {
            value >> count
        });
    }
    if value == 0 {
        return Ok(0);
    }
    let count = u32::try_from(count).map_err(|_| ExcType::overflow())?;
    match value.checked_shl(count) {
        Some(shifted) if shifted >> count == value => Ok(shifted),
        _ => Err(ExcType::overflow()),
    }
}

fn bitwise(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(match op {
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            _ => a ^ b,
        })),
        (Value::Set(a), Value::Set(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            Some(Value::new_set(set_op(op, &a, &b)))
        }
        _ => {
            let (a, b) = (int_operand(lhs)?, int_operand(rhs)?);
            Some(Value::Int(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                _ => a ^ b,
            }))
        }
    }
}

fn set_op(op: BinaryOp, a: &Set, b: &Set) -> Set {
    match op {
        BinaryOp::BitAnd => a.intersection(b),
        BinaryOp::BitOr => a.union(b),
        _ => a.symmetric_difference(b),
    }
}
