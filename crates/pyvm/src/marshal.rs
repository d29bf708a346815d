//! Decoder for the marshal serialization format (version 4) used inside `.pyc` files.
//!
//! Only the object kinds a compiler places in code objects are supported. Objects
//! flagged with `FLAG_REF` are recorded in a reference table so later `r` entries can
//! point back at them; a slot is reserved before the object's children are read and
//! filled once it is complete.

use std::rc::Rc;

use crate::{
    bytecode::{Code, Constant},
    loader::LoadError,
};

const FLAG_REF: u8 = 0x80;

/// Deepest container nesting accepted before decoding gives up.
const MAX_DEPTH: usize = 2000;

/// A decoded marshal object, before conversion into code-object fields.
#[derive(Debug, Clone, PartialEq)]
enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<Object>),
    List(Vec<Object>),
    Set(Vec<Object>),
    FrozenSet(Vec<Object>),
    Code(Rc<Code>),
    /// `StopIteration`, `Ellipsis` and complex numbers: valid marshal data that no
    /// supported value can represent.
    Unsupported(&'static str),
}

/// Decodes a marshal stream whose top-level object is a code object, then validates it.
pub fn loads_code(data: &[u8]) -> Result<Code, LoadError> {
    let mut reader = Reader::new(data);
    match reader.read_object()? {
        Object::Code(code) => {
            code.validate()?;
            Ok(Rc::try_unwrap(code).unwrap_or_else(|shared| (*shared).clone()))
        }
        other => Err(LoadError::UnsupportedConstant {
            kind: kind_name(&other),
        }),
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    refs: Vec<Option<Object>>,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            refs: Vec::new(),
            depth: 0,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        let (data, start) = (self.data, self.pos);
        let bytes = start
            .checked_add(n)
            .and_then(|end| data.get(start..end))
            .ok_or(LoadError::UnexpectedEof { offset: self.pos })?;
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, LoadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, LoadError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_len(&mut self) -> Result<usize, LoadError> {
        let offset = self.pos;
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| LoadError::UnexpectedEof { offset })
    }

    fn read_str(&mut self, len: usize) -> Result<Rc<str>, LoadError> {
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(Rc::from)
            .map_err(|source| LoadError::Utf8 { offset, source })
    }

    fn read_items(&mut self, count: usize) -> Result<Vec<Object>, LoadError> {
        // each item takes at least one byte, which bounds allocation for corrupt counts
        let mut items = Vec::with_capacity(count.min(self.data.len() - self.pos.min(self.data.len())));
        for _ in 0..count {
            items.push(self.read_object()?);
        }
        Ok(items)
    }

    fn read_object(&mut self) -> Result<Object, LoadError> {
        if self.depth >= MAX_DEPTH {
            return Err(LoadError::TooDeep { offset: self.pos });
        }
        self.depth += 1;
        let object = self.read_object_body();
        self.depth -= 1;
        object
    }

    fn read_object_body(&mut self) -> Result<Object, LoadError> {
        let offset = self.pos;
        let byte = self.read_u8()?;
        let flagged = byte & FLAG_REF != 0;
        let code = byte & !FLAG_REF;
        if code == b'r' {
            return self.read_ref();
        }
        let slot = flagged.then(|| {
            self.refs.push(None);
            self.refs.len() - 1
        });
        let object = match code {
            b'N' => Object::None,
            b'F' => Object::Bool(false),
            b'T' => Object::Bool(true),
            b'S' => Object::Unsupported("StopIteration"),
            b'.' => Object::Unsupported("Ellipsis"),
            b'i' => Object::Int(i64::from(self.read_i32()?)),
            b'l' => Object::Int(self.read_long()?),
            b'g' => {
                let b = self.take(8)?;
                Object::Float(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            }
            b'f' => {
                let len = usize::from(self.read_u8()?);
                let text_offset = self.pos;
                let text = self.read_str(len)?;
                Object::Float(
                    text.parse()
                        .map_err(|_| LoadError::UnknownType { code, offset: text_offset })?,
                )
            }
            b'y' => {
                self.take(16)?;
                Object::Unsupported("complex")
            }
            b'x' => {
                for _ in 0..2 {
                    let len = usize::from(self.read_u8()?);
                    self.take(len)?;
                }
                Object::Unsupported("complex")
            }
            b's' => {
                let len = self.read_len()?;
                Object::Bytes(Rc::from(self.take(len)?))
            }
            b't' | b'u' | b'a' | b'A' => {
                let len = self.read_len()?;
                Object::Str(self.read_str(len)?)
            }
            b'z' | b'Z' => {
                let len = usize::from(self.read_u8()?);
                Object::Str(self.read_str(len)?)
            }
            b'(' => {
                let len = self.read_len()?;
                Object::Tuple(self.read_items(len)?)
            }
            b')' => {
                let len = usize::from(self.read_u8()?);
                Object::Tuple(self.read_items(len)?)
            }
            b'[' => {
                let len = self.read_len()?;
                Object::List(self.read_items(len)?)
            }
            b'<' => {
                let len = self.read_len()?;
                Object::Set(self.read_items(len)?)
            }
            b'>' => {
                let len = self.read_len()?;
                Object::FrozenSet(self.read_items(len)?)
            }
            b'c' => Object::Code(Rc::new(self.read_code()?)),
            _ => return Err(LoadError::UnknownType { code: byte, offset }),
        };
        if let Some(slot) = slot {
            self.refs[slot] = Some(object.clone());
        }
        Ok(object)
    }

    fn read_ref(&mut self) -> Result<Object, LoadError> {
        let index = self.read_u32()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.refs.get(i))
            .and_then(Clone::clone)
            .ok_or(LoadError::BadReference { index })
    }

    /// Arbitrary-precision integer: signed digit count, then 15-bit digits, least
    /// significant first. Values outside `i64` are rejected.
    fn read_long(&mut self) -> Result<i64, LoadError> {
        let offset = self.pos;
        let n = self.read_i32()?;
        let overflow = LoadError::LongOverflow { offset };
        let mut magnitude: i128 = 0;
        for i in 0..n.unsigned_abs() {
            let b = self.take(2)?;
            let digit = u16::from_le_bytes([b[0], b[1]]);
            if digit > 0x7fff || (i >= 5 && digit != 0) {
                return Err(overflow);
            }
            magnitude |= i128::from(digit) << (15 * i.min(5));
        }
        let value = if n < 0 { -magnitude } else { magnitude };
        i64::try_from(value).map_err(|_| overflow)
    }

    fn read_code(&mut self) -> Result<Code, LoadError> {
        let arg_count = self.read_u32()?;
        let kwonly_arg_count = self.read_u32()?;
        let nlocals = self.read_u32()?;
        let stack_size = self.read_u32()?;
        let flags = self.read_u32()?;
        let code = self.read_bytes_field("co_code")?;
        let consts = match self.read_object()? {
            Object::Tuple(items) => items.iter().map(to_constant).collect::<Result<_, _>>()?,
            other => return Err(field_type("co_consts", &other)),
        };
        let names = self.read_names("co_names")?;
        let varnames = self.read_names("co_varnames")?;
        let freevars = self.read_names("co_freevars")?;
        let cellvars = self.read_names("co_cellvars")?;
        let filename = self.read_string_field("co_filename")?;
        let name = self.read_string_field("co_name")?;
        let first_line = self.read_u32()?;
        let lnotab = self.read_bytes_field("co_lnotab")?;
        Ok(Code {
            arg_count,
            kwonly_arg_count,
            nlocals,
            stack_size,
            flags,
            code: code.to_vec(),
            consts,
            names,
            varnames,
            freevars,
            cellvars,
            filename,
            name,
            first_line,
            lnotab: lnotab.to_vec(),
        })
    }

    fn read_bytes_field(&mut self, field: &'static str) -> Result<Rc<[u8]>, LoadError> {
        match self.read_object()? {
            Object::Bytes(bytes) => Ok(bytes),
            other => Err(field_type(field, &other)),
        }
    }

    fn read_string_field(&mut self, field: &'static str) -> Result<String, LoadError> {
        match self.read_object()? {
            Object::Str(s) => Ok(s.to_string()),
            other => Err(field_type(field, &other)),
        }
    }

    fn read_names(&mut self, field: &'static str) -> Result<Vec<String>, LoadError> {
        match self.read_object()? {
            Object::Tuple(items) => items
                .into_iter()
                .map(|item| match item {
                    Object::Str(s) => Ok(s.to_string()),
                    other => Err(field_type(field, &other)),
                })
                .collect(),
            other => Err(field_type(field, &other)),
        }
    }
}

fn to_constant(object: &Object) -> Result<Constant, LoadError> {
    Ok(match object {
        Object::None => Constant::None,
        Object::Bool(b) => Constant::Bool(*b),
        Object::Int(i) => Constant::Int(*i),
        Object::Float(f) => Constant::Float(*f),
        Object::Str(s) => Constant::Str(Rc::clone(s)),
        Object::Bytes(b) => Constant::Bytes(Rc::clone(b)),
        Object::Tuple(items) => Constant::Tuple(items.iter().map(to_constant).collect::<Result<_, _>>()?),
        Object::FrozenSet(items) => Constant::FrozenSet(items.iter().map(to_constant).collect::<Result<_, _>>()?),
        Object::Code(code) => Constant::Code(Rc::clone(code)),
        other => {
            return Err(LoadError::UnsupportedConstant {
                kind: kind_name(other),
            })
        }
    })
}

fn kind_name(object: &Object) -> &'static str {
    match object {
        Object::None => "None",
        Object::Bool(_) => "bool",
        Object::Int(_) => "int",
        Object::Float(_) => "float",
        Object::Str(_) => "str",
        Object::Bytes(_) => "bytes",
        Object::Tuple(_) => "tuple",
        Object::List(_) => "list",
        Object::Set(_) => "set",
        Object::FrozenSet(_) => "frozenset",
        Object::Code(_) => "code",
        Object::Unsupported(kind) => kind,
    }
}

fn field_type(field: &'static str, found: &Object) -> LoadError {
    LoadError::InvalidCode {
        name: "<marshal>".to_owned(),
        reason: format!("{field} is a {}", kind_name(found)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn u32le(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn short_str(out: &mut Vec<u8>, s: &str) {
        out.push(b'z');
        out.push(u8::try_from(s.len()).unwrap());
        out.extend_from_slice(s.as_bytes());
    }

    fn name_tuple(out: &mut Vec<u8>, names: &[&str]) {
        out.push(b')');
        out.push(u8::try_from(names.len()).unwrap());
        for name in names {
            short_str(out, name);
        }
    }

    /// Marshalled `<module>` code for `LOAD_CONST 0; RETURN_VALUE` with `consts = (42,)`.
    pub(crate) fn module_returning_42() -> Vec<u8> {
        let mut out = vec![b'c' | FLAG_REF];
        for field in [0, 0, 0, 1, 0x40] {
            u32le(&mut out, field);
        }
        out.push(b's');
        u32le(&mut out, 4);
        out.extend_from_slice(&[100, 0, 0, 83]);
        out.extend_from_slice(&[b')', 1, b'i']);
        u32le(&mut out, 42);
        for _ in 0..4 {
            name_tuple(&mut out, &[]);
        }
        short_str(&mut out, "m.py");
        out.push(b'Z' | FLAG_REF);
        out.push(8);
        out.extend_from_slice(b"<module>");
        u32le(&mut out, 1);
        out.push(b's');
        u32le(&mut out, 0);
        out
    }

    fn object(bytes: &[u8]) -> Result<Object, LoadError> {
        Reader::new(bytes).read_object()
    }

    #[test]
    fn decodes_module_code() {
        let code = loads_code(&module_returning_42()).unwrap();
        assert_eq!(code.name, "<module>");
        assert_eq!(code.filename, "m.py");
        assert_eq!(code.consts, vec![Constant::Int(42)]);
        assert_eq!(code.code, vec![100, 0, 0, 83]);
        assert_eq!(code.stack_size, 1);
    }

    #[test]
    fn scalars() {
        assert_eq!(object(b"N").unwrap(), Object::None);
        assert_eq!(object(b"T").unwrap(), Object::Bool(true));
        assert_eq!(object(b"i\xff\xff\xff\xff").unwrap(), Object::Int(-1));
        // 2**15 + 1 as two 15-bit digits
        assert_eq!(object(b"l\x02\x00\x00\x00\x01\x00\x01\x00").unwrap(), Object::Int(32769));
        assert_eq!(object(b"l\xfe\xff\xff\xff\x01\x00\x01\x00").unwrap(), Object::Int(-32769));
        assert_eq!(object(b"f\x031.5").unwrap(), Object::Float(1.5));
        let mut g = vec![b'g'];
        g.extend_from_slice(&2.25f64.to_le_bytes());
        assert_eq!(object(&g).unwrap(), Object::Float(2.25));
        assert_eq!(object(b"s\x02\x00\x00\x00ab").unwrap(), Object::Bytes(Rc::from(&b"ab"[..])));
        assert_eq!(object(b"u\x02\x00\x00\x00\xc3\xa9").unwrap(), Object::Str(Rc::from("é")));
    }

    #[test]
    fn long_overflow() {
        let mut data = b"l\x06\x00\x00\x00".to_vec();
        for _ in 0..6 {
            data.extend_from_slice(&[0xff, 0x7f]);
        }
        assert!(matches!(object(&data), Err(LoadError::LongOverflow { offset: 1 })));
    }

    #[test]
    fn back_references() {
        // (x, x) where the second element refers back to the first
        let data = b")\x02\xda\x01xr\x00\x00\x00\x00";
        let expected = Object::Tuple(vec![Object::Str(Rc::from("x")), Object::Str(Rc::from("x"))]);
        assert_eq!(object(data).unwrap(), expected);
        assert!(matches!(object(b"r\x03\x00\x00\x00"), Err(LoadError::BadReference { index: 3 })));
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(object(b"s\x05\x00\x00\x00ab"), Err(LoadError::UnexpectedEof { .. })));
        assert!(matches!(object(b"?"), Err(LoadError::UnknownType { code: b'?', offset: 0 })));
        assert!(matches!(object(b"z\x01\xff"), Err(LoadError::Utf8 { offset: 2, .. })));
        assert!(matches!(
            loads_code(b"N"),
            Err(LoadError::UnsupportedConstant { kind: "None" })
        ));
    }

    /// `depth` single-item tuples wrapped around `None`.
    fn nested_tuples(depth: usize) -> Vec<u8> {
        let mut data = b")\x01".repeat(depth);
        data.push(b'N');
        data
    }

    #[test]
    fn nesting_is_capped() {
        // debug builds use large frames; give the recursion room up to the cap
        let outcome = std::thread::Builder::new()
            .stack_size(64 << 20)
            .spawn(|| {
                assert!(object(&nested_tuples(MAX_DEPTH - 1)).is_ok());
                assert!(matches!(
                    object(&nested_tuples(MAX_DEPTH)),
                    Err(LoadError::TooDeep { offset }) if offset == 2 * MAX_DEPTH
                ));
                assert!(matches!(
                    loads_code(&nested_tuples(200_000)),
                    Err(LoadError::TooDeep { offset: 4000 })
                ));
            })
            .unwrap()
            .join();
        assert!(outcome.is_ok());
    }

    #[test]
    fn unsupported_constants() {
        assert!(matches!(
            to_constant(&Object::List(vec![])),
            Err(LoadError::UnsupportedConstant { kind: "list" })
        ));
        assert_eq!(
            to_constant(&Object::FrozenSet(vec![Object::Int(1)])).unwrap(),
            Constant::FrozenSet(vec![Constant::Int(1)])
        );
    }
}
