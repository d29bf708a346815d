//! Interpreter configuration, passed explicitly to `Interpreter::new`.

/// How the two operand bytes of an instruction are handed to its handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OperandEncoding {
    /// One 16-bit operand, `lo | hi << 8`.
    #[default]
    Wide,
    /// Two independent byte fields; single-argument opcodes read the low byte only.
    SplitBytes,
}

/// Runtime options for one interpreter instance.
///
/// ```
/// use pyvm::{OperandEncoding, VmConfig};
///
/// let config = VmConfig::new().trace(true).encoding(OperandEncoding::SplitBytes);
/// assert!(config.trace_enabled());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VmConfig {
    trace: bool,
    encoding: OperandEncoding,
}

impl VmConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a `debug!` event per instruction and a disassembly on frame entry and exit.
    #[must_use]
    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: OperandEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    #[must_use]
    pub fn operand_encoding(&self) -> OperandEncoding {
        self.encoding
    }
}
