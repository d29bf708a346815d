//! Opcode definitions for the bytecode VM.
//!
//! Opcode bytes follow the 3.5-generation numbering of the compiler that produces the
//! code objects we run. The `Opcode` enum is a pure discriminant with no data; operands
//! are decoded separately from the byte stream.
//!
//! # Operand Encoding
//!
//! - Below `HAVE_ARGUMENT` (90): 1 byte, no operand (`BINARY_ADD`, `POP_TOP`)
//! - At or above: 3 bytes, opcode then a low and a high operand byte (`LOAD_CONST`, `CALL_FUNCTION`)

use std::fmt;

use strum::{FromRepr, IntoStaticStr};

use crate::config::OperandEncoding;

/// First opcode value that carries an operand.
pub const HAVE_ARGUMENT: u8 = 90;

/// Opcode discriminant.
///
/// Uses `strum::FromRepr` for byte-to-opcode conversion; any byte without a variant is
/// an unsupported instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // === Stack Operations (no operand) ===
    /// Discard top of stack.
    PopTop = 1,
    /// Swap top two: [a, b] -> [b, a].
    RotTwo = 2,
    /// Rotate top three: [a, b, c] -> [c, a, b].
    RotThree = 3,
    /// Duplicate top of stack.
    DupTop = 4,
    /// Duplicate the top two values: [a, b] -> [a, b, a, b].
    DupTopTwo = 5,
    Nop = 9,

    // === Unary Operations ===
    UnaryPositive = 10,
    UnaryNegative = 11,
    UnaryNot = 12,
    UnaryInvert = 15,

    // === Binary Operations (no operand) ===
    BinaryPower = 19,
    BinaryMultiply = 20,
    BinaryModulo = 22,
    BinaryAdd = 23,
    BinarySubtract = 24,
    /// Subscript: a[b].
    BinarySubscr = 25,
    BinaryFloorDivide = 26,
    BinaryTrueDivide = 27,
    InplaceFloorDivide = 28,
    InplaceTrueDivide = 29,
    /// Older dict display protocol: [dict, value, key] -> [dict].
    StoreMap = 54,
    InplaceAdd = 55,
    InplaceSubtract = 56,
    InplaceMultiply = 57,
    InplaceModulo = 59,
    /// a[b] = c, with stack [c, a, b].
    StoreSubscr = 60,
    DeleteSubscr = 61,
    BinaryLshift = 62,
    BinaryRshift = 63,
    BinaryAnd = 64,
    BinaryXor = 65,
    BinaryOr = 66,
    InplacePower = 67,
    GetIter = 68,
    /// Print the repr of the top of stack unless it is None (interactive echo).
    PrintExpr = 70,
    InplaceLshift = 75,
    InplaceRshift = 76,
    InplaceAnd = 77,
    InplaceXor = 78,
    InplaceOr = 79,
    ReturnValue = 83,
    PopBlock = 87,
    EndFinally = 88,
    PopExcept = 89,

    // === Operand-carrying opcodes ===
    StoreName = 90,
    DeleteName = 91,
    UnpackSequence = 92,
    /// Relative jump taken when the iterator is exhausted.
    ForIter = 93,
    StoreGlobal = 97,
    LoadConst = 100,
    LoadName = 101,
    BuildTuple = 102,
    BuildList = 103,
    BuildSet = 104,
    /// Always builds an empty dict; the count is ignored.
    BuildMap = 105,
    /// Operand indexes the comparison table.
    CompareOp = 107,
    JumpForward = 110,
    JumpIfFalseOrPop = 111,
    JumpIfTrueOrPop = 112,
    JumpAbsolute = 113,
    PopJumpIfFalse = 114,
    PopJumpIfTrue = 115,
    LoadGlobal = 116,
    SetupLoop = 120,
    SetupExcept = 121,
    SetupFinally = 122,
    LoadFast = 124,
    StoreFast = 125,
    DeleteFast = 126,
    RaiseVarargs = 130,
    /// Operand: low byte positional count, high byte keyword count.
    CallFunction = 131,
    /// Operand: low byte default count, high byte keyword-only default count.
    MakeFunction = 132,
    MakeClosure = 134,
    LoadClosure = 135,
    LoadDeref = 136,
    StoreDeref = 137,
    ListAppend = 145,
    SetAdd = 146,
    MapAdd = 147,
}

/// How a jump opcode interprets its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Byte offset from the start of the code.
    Absolute,
    /// Byte delta from the instruction following the jump.
    Relative,
}

impl Opcode {
    #[must_use]
    pub fn has_argument(self) -> bool {
        self as u8 >= HAVE_ARGUMENT
    }

    /// Encoded size in bytes: 1 for bare opcodes, 3 with an operand.
    #[must_use]
    pub fn width(self) -> usize {
        if self.has_argument() {
            3
        } else {
            1
        }
    }

    /// The canonical upper-case mnemonic, e.g. `LOAD_CONST`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    #[must_use]
    pub fn jump_kind(self) -> Option<JumpKind> {
        match self {
            Self::JumpAbsolute
            | Self::PopJumpIfFalse
            | Self::PopJumpIfTrue
            | Self::JumpIfFalseOrPop
            | Self::JumpIfTrueOrPop => Some(JumpKind::Absolute),
            Self::JumpForward | Self::ForIter | Self::SetupLoop | Self::SetupExcept | Self::SetupFinally => {
                Some(JumpKind::Relative)
            }
            _ => None,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(InvalidOpcodeError(byte))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a byte has no opcode in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcodeError(pub u8);

impl fmt::Display for InvalidOpcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported opcode byte {}", self.0)
    }
}

impl std::error::Error for InvalidOpcodeError {}

/// `COMPARE_OP` operand table. The indices are fixed by the instruction encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
    In = 6,
    NotIn = 7,
    Is = 8,
    IsNot = 9,
    /// `issubclass(x, Exception) and issubclass(x, y)`, used by `except` clauses.
    ExceptionMatch = 10,
}

impl CompareOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::ExceptionMatch => "exception match",
        }
    }
}

/// The two raw operand bytes of an instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operand {
    pub lo: u8,
    pub hi: u8,
}

impl Operand {
    #[must_use]
    pub fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    /// Operand as a single index or offset under the given policy.
    ///
    /// `Wide` assembles `lo | hi << 8`; `SplitBytes` treats the bytes as two independent
    /// fields, so single-argument opcodes see only `lo`.
    #[must_use]
    pub fn arg(self, encoding: OperandEncoding) -> u16 {
        match encoding {
            OperandEncoding::Wide => u16::from_le_bytes([self.lo, self.hi]),
            OperandEncoding::SplitBytes => u16::from(self.lo),
        }
    }

    /// The (low, high) pair used by the call and function-creation opcodes.
    #[must_use]
    pub fn split(self) -> (u8, u8) {
        (self.lo, self.hi)
    }
}

impl From<u16> for Operand {
    fn from(value: u16) -> Self {
        let [lo, hi] = value.to_le_bytes();
        Self { lo, hi }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operand: Option<Operand>,
}

impl Instruction {
    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> usize {
        self.offset + self.opcode.width()
    }
}

/// Why a byte stream could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Unsupported { offset: usize, byte: u8 },
    Truncated { offset: usize, opcode: Opcode },
    OutOfBounds { offset: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { offset, byte } => write!(f, "unsupported opcode byte {byte} at offset {offset}"),
            Self::Truncated { offset, opcode } => write!(f, "truncated operand for {opcode} at offset {offset}"),
            Self::OutOfBounds { offset } => write!(f, "instruction pointer {offset} past end of code"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes the instruction starting at `offset`.
pub fn decode_at(code: &[u8], offset: usize) -> Result<Instruction, DecodeError> {
    let byte = *code.get(offset).ok_or(DecodeError::OutOfBounds { offset })?;
    let opcode = Opcode::try_from(byte).map_err(|_| DecodeError::Unsupported { offset, byte })?;
    let operand = if opcode.has_argument() {
        match code.get(offset + 1..offset + 3) {
            Some(&[lo, hi]) => Some(Operand { lo, hi }),
            _ => return Err(DecodeError::Truncated { offset, opcode }),
        }
    } else {
        None
    };
    Ok(Instruction {
        offset,
        opcode,
        operand,
    })
}

/// Iterates the instructions of a byte stream, stopping after the first decode error.
pub fn instructions(code: &[u8]) -> impl Iterator<Item = Result<Instruction, DecodeError>> + '_ {
    let mut offset = 0;
    let mut failed = false;
    std::iter::from_fn(move || {
        if failed || offset >= code.len() {
            return None;
        }
        let decoded = decode_at(code, offset);
        match &decoded {
            Ok(instr) => offset = instr.next_offset(),
            Err(_) => failed = true,
        }
        Some(decoded)
    })
}
