//! Program loading: `.pyc` containers and packed code snapshots.
//!
//! A `.pyc` file is a 12-byte header (two magic bytes plus `\r\n`, then the source
//! modification time and source size, little endian) followed by a marshal stream whose
//! single top-level object is the module's code object.

use std::{path::Path, rc::Rc};

use tracing::debug;

use crate::{
    bytecode::{Code, DecodeError},
    marshal,
};

/// Length of the `.pyc` header.
pub const PYC_HEADER_LEN: usize = 12;

/// Failures while reading a program, all reported before execution starts.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("file too short for a .pyc header ({len} bytes)")]
    TruncatedHeader { len: usize },
    #[error("bad magic number {magic} (accepted: {accepted:?})")]
    BadMagic { magic: u16, accepted: Vec<u16> },
    #[error("unexpected end of marshal data at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("unknown marshal type code {code:#04x} at offset {offset}")]
    UnknownType { code: u8, offset: usize },
    #[error("marshal back-reference {index} is unknown or still being read")]
    BadReference { index: u32 },
    #[error("invalid UTF-8 in string at offset {offset}")]
    Utf8 {
        offset: usize,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("marshal data nested too deeply at offset {offset}")]
    TooDeep { offset: usize },
    #[error("integer constant at offset {offset} does not fit in 64 bits")]
    LongOverflow { offset: usize },
    #[error("unsupported constant kind: {kind}")]
    UnsupportedConstant { kind: &'static str },
    #[error("invalid bytecode in {name}: {source}")]
    Bytecode {
        name: String,
        #[source]
        source: DecodeError,
    },
    #[error("invalid code object {name}: {reason}")]
    InvalidCode { name: String, reason: String },
    #[error("invalid code snapshot: {0}")]
    Snapshot(#[from] postcard::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which container versions the loader accepts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoaderConfig {
    magics: Vec<u16>,
}

impl Default for LoaderConfig {
    /// The 3.4 and 3.5 markers: 3310, 3350 and 3351.
    fn default() -> Self {
        Self {
            magics: vec![3310, 3350, 3351],
        }
    }
}

impl LoaderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept `magic`.
    #[must_use]
    pub fn with_magic(mut self, magic: u16) -> Self {
        if !self.magics.contains(&magic) {
            self.magics.push(magic);
        }
        self
    }

    #[must_use]
    pub fn accepts(&self, magic: u16) -> bool {
        self.magics.contains(&magic)
    }
}

/// A decoded `.pyc` file.
#[derive(Debug, Clone)]
pub struct Program {
    pub magic: u16,
    /// Source modification time, seconds since the epoch.
    pub mtime: u32,
    pub source_size: u32,
    pub code: Rc<Code>,
}

/// Decodes a `.pyc` image.
pub fn load_pyc(bytes: &[u8], config: &LoaderConfig) -> Result<Program, LoadError> {
    let header = bytes
        .get(..PYC_HEADER_LEN)
        .ok_or(LoadError::TruncatedHeader { len: bytes.len() })?;
    let word = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
    let magic = u16::from_le_bytes([header[0], header[1]]);
    if &header[2..4] != b"\r\n" || !config.accepts(magic) {
        return Err(LoadError::BadMagic {
            magic,
            accepted: config.magics.clone(),
        });
    }
    let mtime = word(4);
    let source_size = word(8);
    debug!(magic, mtime, source_size, "loading .pyc");
    let code = marshal::loads_code(&bytes[PYC_HEADER_LEN..])?;
    Ok(Program {
        magic,
        mtime,
        source_size,
        code: Rc::new(code),
    })
}

/// True if `bytes` starts like a `.pyc` file (any magic, followed by `\r\n`).
#[must_use]
pub fn looks_like_pyc(bytes: &[u8]) -> bool {
    bytes.get(2..4) == Some(b"\r\n".as_slice())
}

/// Reads a program from disk, either a `.pyc` file or a snapshot written by
/// [`Code::dump`].
pub fn load_file(path: impl AsRef<Path>, config: &LoaderConfig) -> Result<Rc<Code>, LoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    debug!(path = %path.display(), len = bytes.len(), "read program");
    if looks_like_pyc(&bytes) {
        Ok(load_pyc(&bytes, config)?.code)
    } else {
        Ok(Rc::new(Code::load(&bytes)?))
    }
}
