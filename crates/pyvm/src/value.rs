//! Runtime value model.
//!
//! `Value` is the tagged union every opcode handler consumes and produces. Immutable
//! payloads (strings, bytes, tuples, code) are shared through `Rc`; mutable containers
//! (list, set, dict) and iterators sit behind `Rc<RefCell<_>>` so aliases observe
//! in-place mutation the way the scripting language expects.

use std::{
    borrow::Cow,
    cell::RefCell,
    cmp::Ordering,
    fmt::{self, Write},
    rc::Rc,
};

use ahash::AHashSet;

use crate::{
    builtins::Builtins,
    bytecode::Code,
    cell::Cell,
    exception::{ExcType, RunError, RunResult, SimpleException},
    for_iterator::ForIterator,
    function::Function,
    types::{
        repr::{bytes_repr_fmt, float_repr_fmt, string_repr_fmt},
        Dict, Range, Set, Type,
    },
};

/// Primary value type representing objects at runtime.
///
/// `Clone` is cheap: it copies immediates and bumps reference counts for everything else.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Set(Rc<RefCell<Set>>),
    Dict(Rc<RefCell<Dict>>),
    Range(Range),
    /// A function defined by bytecode, possibly carrying captured cells.
    Function(Rc<Function>),
    /// A builtin function, constructor type or exception class.
    Builtin(Builtins),
    /// A nested code object constant, consumed by `MAKE_FUNCTION`.
    Code(Rc<Code>),
    /// A cell reference, pushed by `LOAD_CLOSURE`.
    Cell(Cell),
    /// Exception instance (e.g., result of `ValueError('msg')`).
    Exc(Rc<SimpleException>),
    Iterator(Rc<RefCell<ForIterator>>),
}

/// Hashable projection of a `Value`, used as the key of dicts and sets.
///
/// Numbers that compare equal hash equal: `True`, `1` and `1.0` all map to `Int(1)`.
/// Callables, code objects, cells and exceptions hash by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<HashKey>),
    Range { start: i64, len: usize, step: i64 },
    Builtin(Builtins),
    Identity(usize),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Rc::from(v))
    }
}

impl Value {
    #[must_use]
    pub fn new_tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::from(items))
    }

    #[must_use]
    pub fn new_list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn new_set(set: Set) -> Self {
        Self::Set(Rc::new(RefCell::new(set)))
    }

    #[must_use]
    pub fn new_dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    #[must_use]
    pub fn py_type(&self) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Str(_) => Type::Str,
            Self::Bytes(_) => Type::Bytes,
            Self::Tuple(_) => Type::Tuple,
            Self::List(_) => Type::List,
            Self::Set(_) => Type::Set,
            Self::Dict(_) => Type::Dict,
            Self::Range(_) => Type::Range,
            Self::Function(_) => Type::Function,
            Self::Builtin(b) => b.py_type(),
            Self::Code(_) => Type::Code,
            Self::Cell(_) => Type::Cell,
            Self::Exc(e) => Type::Exception(e.exc_type()),
            Self::Iterator(_) => Type::Iterator,
        }
    }

    /// Integer view of `int` and `bool` values.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float view of any real number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Truthiness, as tested by the conditional jump opcodes.
    #[must_use]
    pub fn py_bool(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Set(s) => !s.borrow().is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Range(r) => !r.is_empty(),
            _ => true,
        }
    }

    /// `len(value)`, `None` for values without a length.
    #[must_use]
    pub fn py_len(&self) -> Option<usize> {
        match self {
            Self::Str(s) => Some(s.chars().count()),
            Self::Bytes(b) => Some(b.len()),
            Self::Tuple(t) => Some(t.len()),
            Self::List(l) => Some(l.borrow().len()),
            Self::Set(s) => Some(s.borrow().len()),
            Self::Dict(d) => Some(d.borrow().len()),
            Self::Range(r) => Some(r.len()),
            _ => None,
        }
    }

    /// Value equality (`==`).
    ///
    /// Containers nested past the comparison limit compare unequal here;
    /// [`Value::py_eq_checked`] raises `RecursionError` for them instead.
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        self.eq_at(other, 0).unwrap_or(false)
    }

    /// `==` as evaluated by `COMPARE_OP`.
    pub fn py_eq_checked(&self, other: &Self) -> RunResult<bool> {
        Ok(self.eq_at(other, 0)?)
    }

    #[allow(clippy::float_cmp)]
    pub(crate) fn eq_at(&self, other: &Self, depth: usize) -> Result<bool, TooDeep> {
        Ok(match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Float(_), _) | (_, Self::Float(_)) => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Self::Int(_) | Self::Bool(_), Self::Int(_) | Self::Bool(_)) => self.as_int() == other.as_int(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b) || seq_eq(a, b, nested(depth)?)?,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow(), nested(depth)?)?,
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b) || a.borrow().py_eq(&b.borrow()),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b) || a.borrow().eq_at(&b.borrow(), nested(depth)?)?,
            (Self::Range(a), Self::Range(b)) => range_key(a) == range_key(b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            _ => self.py_is(other),
        })
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`, `sorted`, `min` and `max`.
    ///
    /// Returns `None` when the two values are not orderable against each other, or are
    /// nested past the comparison limit.
    #[must_use]
    pub fn py_cmp(&self, other: &Self) -> Option<Ordering> {
        self.cmp_at(other, 0).ok().flatten()
    }

    /// Ordering as evaluated by `COMPARE_OP`, raising `RecursionError` on runaway nesting.
    pub fn py_cmp_checked(&self, other: &Self) -> RunResult<Option<Ordering>> {
        Ok(self.cmp_at(other, 0)?)
    }

    fn cmp_at(&self, other: &Self, depth: usize) -> Result<Option<Ordering>, TooDeep> {
        Ok(match (self, other) {
            (Self::Int(_) | Self::Bool(_), Self::Int(_) | Self::Bool(_)) => {
                self.as_int().zip(other.as_int()).map(|(a, b)| a.cmp(&b))
            }
            (Self::Int(_) | Self::Bool(_) | Self::Float(_), Self::Int(_) | Self::Bool(_) | Self::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                }
            }
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Tuple(a), Self::Tuple(b)) => seq_cmp(a, b, nested(depth)?)?,
            (Self::List(a), Self::List(b)) => seq_cmp(&a.borrow(), &b.borrow(), nested(depth)?)?,
            _ => None,
        })
    }

    /// Identity comparison (`is`).
    #[must_use]
    pub fn py_is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b),
            (Self::Bytes(a), Self::Bytes(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Code(a), Self::Code(b)) => Rc::ptr_eq(a, b),
            (Self::Cell(a), Self::Cell(b)) => a.ptr_eq(b),
            (Self::Exc(a), Self::Exc(b)) => Rc::ptr_eq(a, b),
            (Self::Iterator(a), Self::Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Membership test (`item in self`).
    pub fn py_contains(&self, item: &Self) -> RunResult<bool> {
        match self {
            Self::Str(s) => match item {
                Self::Str(needle) => Ok(s.contains(&**needle)),
                other => Err(ExcType::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.py_type()
                ))),
            },
            Self::Bytes(b) => match item {
                Self::Bytes(needle) => Ok(needle.is_empty() || b.windows(needle.len()).any(|w| w == &needle[..])),
                other => match other.as_int() {
                    Some(byte) => Ok(b.iter().any(|&x| i64::from(x) == byte)),
                    None => Err(ExcType::type_error(format!(
                        "a bytes-like object is required, not '{}'",
                        other.py_type()
                    ))),
                },
            },
            Self::Tuple(t) => any_equal(t.iter(), item),
            Self::List(l) => any_equal(l.borrow().iter(), item),
            Self::Set(s) => s.borrow().contains(item),
            Self::Dict(d) => d.borrow().contains_key(item),
            Self::Range(r) => Ok(match item {
                Self::Float(f) => Self::float_to_int(*f).is_some_and(|i| r.contains(i)),
                other => other.as_int().is_some_and(|i| r.contains(i)),
            }),
            Self::Iterator(it) => {
                let mut it = it.borrow_mut();
                while let Some(v) = it.for_next() {
                    if v.eq_at(item, 0)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(ExcType::type_error(format!(
                "argument of type '{}' is not iterable",
                other.py_type()
            ))),
        }
    }

    /// Subscript read (`self[key]`).
    pub fn py_getitem(&self, key: &Self) -> RunResult<Self> {
        match self {
            Self::List(l) => {
                let l = l.borrow();
                let index = normalize_index(key, l.len(), Type::List)?;
                Ok(l[index].clone())
            }
            Self::Tuple(t) => {
                let index = normalize_index(key, t.len(), Type::Tuple)?;
                Ok(t[index].clone())
            }
            Self::Str(s) => {
                let index = normalize_index(key, s.chars().count(), Type::Str)?;
                let ch = s.chars().nth(index).ok_or_else(|| index_out_of_range(Type::Str))?;
                Ok(Self::from(ch.to_string()))
            }
            Self::Bytes(b) => {
                let index = normalize_index(key, b.len(), Type::Bytes)?;
                Ok(Self::Int(i64::from(b[index])))
            }
            Self::Range(r) => {
                let index = normalize_index(key, r.len(), Type::Range)?;
                r.get(index).map(Self::Int).ok_or_else(|| index_out_of_range(Type::Range))
            }
            Self::Dict(d) => match d.borrow().get(key)? {
                Some(v) => Ok(v.clone()),
                None => Err(ExcType::key_error(key)),
            },
            other => Err(ExcType::type_error_not_subscriptable(other.py_type())),
        }
    }

    /// Subscript write (`self[key] = value`).
    pub fn py_setitem(&self, key: Self, value: Self) -> RunResult<()> {
        match self {
            Self::List(l) => {
                let mut l = l.borrow_mut();
                let index = normalize_index(&key, l.len(), Type::List)?;
                l[index] = value;
                Ok(())
            }
            Self::Dict(d) => d.borrow_mut().insert(key, value),
            other => Err(ExcType::type_error(format!(
                "'{}' object does not support item assignment",
                other.py_type()
            ))),
        }
    }

    /// Subscript deletion (`del self[key]`).
    pub fn py_delitem(&self, key: &Self) -> RunResult<()> {
        match self {
            Self::List(l) => {
                let mut l = l.borrow_mut();
                let index = normalize_index(key, l.len(), Type::List)?;
                l.remove(index);
                Ok(())
            }
            Self::Dict(d) => match d.borrow_mut().remove(key)? {
                Some(_) => Ok(()),
                None => Err(ExcType::key_error(key)),
            },
            other => Err(ExcType::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.py_type()
            ))),
        }
    }

    /// Projects the value onto a dict/set key, failing for mutable containers.
    pub fn hash_key(&self) -> RunResult<HashKey> {
        Ok(match self {
            Self::None => HashKey::None,
            Self::Bool(b) => HashKey::Int(i64::from(*b)),
            Self::Int(i) => HashKey::Int(*i),
            Self::Float(f) => match Self::float_to_int(*f) {
                Some(i) => HashKey::Int(i),
                None => HashKey::Float(f.to_bits()),
            },
            Self::Str(s) => HashKey::Str(s.clone()),
            Self::Bytes(b) => HashKey::Bytes(b.clone()),
            Self::Tuple(t) => HashKey::Tuple(t.iter().map(Self::hash_key).collect::<RunResult<_>>()?),
            Self::Range(r) => {
                let (start, len, step) = range_key(r);
                HashKey::Range { start, len, step }
            }
            Self::Builtin(b) => HashKey::Builtin(*b),
            Self::Function(f) => HashKey::Identity(Rc::as_ptr(f).cast::<()>() as usize),
            Self::Code(c) => HashKey::Identity(Rc::as_ptr(c).cast::<()>() as usize),
            Self::Exc(e) => HashKey::Identity(Rc::as_ptr(e).cast::<()>() as usize),
            Self::Iterator(i) => HashKey::Identity(Rc::as_ptr(i).cast::<()>() as usize),
            Self::Cell(c) => HashKey::Identity(c.identity()),
            Self::List(_) | Self::Set(_) | Self::Dict(_) => {
                return Err(ExcType::type_error_unhashable(self.py_type()))
            }
        })
    }

    /// Exact integer value of an integral float within i64 range.
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn float_to_int(f: f64) -> Option<i64> {
        if f.fract() == 0.0 && f >= -9.223_372_036_854_776e18 && f < 9.223_372_036_854_776e18 {
            Some(f as i64)
        } else {
            None
        }
    }

    pub fn py_repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        self.repr_fmt(f, &mut AHashSet::new())
    }

    /// Writes the repr, tracking the identities of the containers currently being
    /// written in `seen`. A container met again inside itself, or nested past the repr
    /// limit, is written as `[...]`, `(...)` or `{...}`.
    pub(crate) fn repr_fmt(&self, f: &mut impl Write, seen: &mut AHashSet<usize>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => float_repr_fmt(*v, f),
            Self::Str(s) => string_repr_fmt(s, f),
            Self::Bytes(b) => bytes_repr_fmt(b, f),
            Self::Tuple(t) => enter(f, seen, Rc::as_ptr(t).cast::<()>() as usize, "(...)", |f, seen| {
                f.write_char('(')?;
                seq_repr_fmt(t, f, seen)?;
                if t.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }),
            Self::List(l) => enter(f, seen, Rc::as_ptr(l).cast::<()>() as usize, "[...]", |f, seen| {
                f.write_char('[')?;
                seq_repr_fmt(&l.borrow(), f, seen)?;
                f.write_char(']')
            }),
            Self::Set(s) => s.borrow().py_repr_fmt(f),
            Self::Dict(d) => enter(f, seen, Rc::as_ptr(d).cast::<()>() as usize, "{...}", |f, seen| {
                d.borrow().repr_fmt(f, seen)
            }),
            Self::Range(r) => r.py_repr_fmt(f),
            Self::Function(func) => write!(f, "<function {}>", func.name()),
            Self::Builtin(b) => b.py_repr_fmt(f),
            Self::Code(code) => write!(f, "<code object {}, file \"{}\">", code.name, code.filename),
            Self::Cell(cell) => {
                if cell.is_empty() {
                    f.write_str("<cell: empty>")
                } else {
                    f.write_str("<cell>")
                }
            }
            Self::Exc(e) => e.repr_fmt(f, seen),
            Self::Iterator(_) => f.write_str("<iterator>"),
        }
    }

    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut s = String::new();
        // writing to a String cannot fail
        let _ = self.py_repr_fmt(&mut s);
        s
    }

    /// `str(value)`: strings are returned unquoted, exceptions as their message.
    #[must_use]
    pub fn py_str(&self) -> Cow<'_, str> {
        match self {
            Self::Str(s) => Cow::Borrowed(s),
            Self::Exc(e) => Cow::Owned(e.py_str()),
            other => Cow::Owned(other.py_repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.py_str())
    }
}

/// Container nesting at which comparison gives up.
const MAX_COMPARE_DEPTH: usize = 200;

/// Container nesting at which repr stops descending.
const MAX_REPR_DEPTH: usize = 200;

/// A comparison recursed past [`MAX_COMPARE_DEPTH`], as with self-containing lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TooDeep;

impl From<TooDeep> for RunError {
    fn from(_: TooDeep) -> Self {
        ExcType::recursion_error("maximum recursion depth exceeded in comparison")
    }
}

fn nested(depth: usize) -> Result<usize, TooDeep> {
    if depth >= MAX_COMPARE_DEPTH {
        Err(TooDeep)
    } else {
        Ok(depth + 1)
    }
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> Result<bool, TooDeep> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Lexicographic ordering: the first unequal pair decides, then length.
fn seq_cmp(a: &[Value], b: &[Value], depth: usize) -> Result<Option<Ordering>, TooDeep> {
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth)? {
            return x.cmp_at(y, depth);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

fn any_equal<'a>(items: impl Iterator<Item = &'a Value>, item: &Value) -> RunResult<bool> {
    for v in items {
        if v.eq_at(item, 0)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Runs `write` for the container `id` unless it is already being written.
fn enter<W: Write>(
    f: &mut W,
    seen: &mut AHashSet<usize>,
    id: usize,
    placeholder: &str,
    write: impl FnOnce(&mut W, &mut AHashSet<usize>) -> fmt::Result,
) -> fmt::Result {
    if seen.len() >= MAX_REPR_DEPTH || !seen.insert(id) {
        return f.write_str(placeholder);
    }
    let result = write(f, seen);
    seen.remove(&id);
    result
}

fn seq_repr_fmt(items: &[Value], f: &mut impl Write, seen: &mut AHashSet<usize>) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.repr_fmt(f, seen)?;
    }
    Ok(())
}

/// Ranges compare by the sequence they produce, not by their arguments.
fn range_key(r: &Range) -> (i64, usize, i64) {
    match r.len() {
        0 => (0, 0, 0),
        1 => (r.start, 1, 0),
        len => (r.start, len, r.step),
    }
}

fn index_out_of_range(type_: Type) -> RunError {
    match type_ {
        Type::Str => ExcType::index_error("string index out of range"),
        Type::Range => ExcType::index_error("range object index out of range"),
        Type::Bytes => ExcType::index_error("index out of range"),
        other => ExcType::index_error(format!("{other} index out of range")),
    }
}

/// Resolves a possibly negative integer index against a sequence of length `len`.
fn normalize_index(key: &Value, len: usize, type_: Type) -> RunResult<usize> {
    let Some(index) = key.as_int() else {
        return Err(ExcType::type_error(format!(
            "{type_} indices must be integers or slices, not {}",
            key.py_type()
        )));
    };
    let len_i = i64::try_from(len).map_err(|_| ExcType::overflow())?;
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| index_out_of_range(type_))
    } else {
        Err(index_out_of_range(type_))
    }
}
