//! Binary and in-place operator opcodes.

use super::Interpreter;
use crate::{bytecode::op::Opcode, exception::RunResult, io::PrintWriter, operators::BinaryOp};

/// Maps a `BINARY_*` or `INPLACE_*` opcode to its operator, flagging the in-place forms.
pub(super) fn binary_op(opcode: Opcode) -> Option<(BinaryOp, bool)> {
    Some(match opcode {
        Opcode::BinaryAdd => (BinaryOp::Add, false),
        Opcode::InplaceAdd => (BinaryOp::Add, true),
        Opcode::BinarySubtract => (BinaryOp::Sub, false),
        Opcode::InplaceSubtract => (BinaryOp::Sub, true),
        Opcode::BinaryMultiply => (BinaryOp::Mult, false),
        Opcode::InplaceMultiply => (BinaryOp::Mult, true),
        Opcode::BinaryTrueDivide => (BinaryOp::Div, false),
        Opcode::InplaceTrueDivide => (BinaryOp::Div, true),
        Opcode::BinaryFloorDivide => (BinaryOp::FloorDiv, false),
        Opcode::InplaceFloorDivide => (BinaryOp::FloorDiv, true),
        Opcode::BinaryModulo => (BinaryOp::Mod, false),
        Opcode::InplaceModulo => (BinaryOp::Mod, true),
        Opcode::BinaryPower => (BinaryOp::Pow, false),
        Opcode::InplacePower => (BinaryOp::Pow, true),
        Opcode::BinaryLshift => (BinaryOp::LShift, false),
        Opcode::InplaceLshift => (BinaryOp::LShift, true),
        Opcode::BinaryRshift => (BinaryOp::RShift, false),
        Opcode::InplaceRshift => (BinaryOp::RShift, true),
        Opcode::BinaryAnd => (BinaryOp::BitAnd, false),
        Opcode::InplaceAnd => (BinaryOp::BitAnd, true),
        Opcode::BinaryOr => (BinaryOp::BitOr, false),
        Opcode::InplaceOr => (BinaryOp::BitOr, true),
        Opcode::BinaryXor => (BinaryOp::BitXor, false),
        Opcode::InplaceXor => (BinaryOp::BitXor, true),
        _ => return None,
    })
}

impl<P: PrintWriter> Interpreter<P> {
    /// Pops the right-hand side, then the left, and pushes `lhs op rhs`.
    pub(super) fn binary_op(&mut self, op: BinaryOp) -> RunResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.push(op.apply(&lhs, &rhs)?);
        Ok(())
    }

    /// Like [`Self::binary_op`], but a mutable left operand is updated and pushed back.
    pub(super) fn inplace_op(&mut self, op: BinaryOp) -> RunResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.push(op.apply_inplace(&lhs, &rhs)?);
        Ok(())
    }
}
