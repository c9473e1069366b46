use crate::Reg;
use core::fmt;

/// Barrel shifter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum ShiftKind {
    /// Logical shift left.
    Lsl,
    /// Logical shift right; an immediate count of 32 encodes as 0.
    Lsr,
    /// Arithmetic shift right; an immediate count of 32 encodes as 0.
    Asr,
    /// Rotate right.
    Ror,
}

impl ShiftKind {
    /// Shift type field, bits 5-6 of the shifted operand.
    pub const fn bits(self) -> u32 {
        match self {
            ShiftKind::Lsl => 0,
            ShiftKind::Lsr => 1,
            ShiftKind::Asr => 2,
            ShiftKind::Ror => 3,
        }
    }
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShiftKind::Lsl => "LSL",
            ShiftKind::Lsr => "LSR",
            ShiftKind::Asr => "ASR",
            ShiftKind::Ror => "ROR",
        };
        f.write_str(s)
    }
}

/// Shift count: a constant 0-32 or a register holding the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftAmount {
    /// Immediate count.  LSR/ASR admit 32, which the encoder maps onto the
    /// zero encoding; the divide built-in depends on `ASR #32` surviving
    /// exactly as written.
    Imm(i32),
    /// Count taken from the bottom byte of a register.
    Reg(Reg),
}

/// A shifted register operand, e.g. `R1, ASR R2` or `R4, LSL #3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shift {
    /// Register being shifted.
    pub reg: Reg,
    /// Shifter operation.
    pub kind: ShiftKind,
    /// Shift count.
    pub amount: ShiftAmount,
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.amount {
            ShiftAmount::Imm(i) => write!(f, "{}, {} #{}", self.reg, self.kind, i),
            ShiftAmount::Reg(r) => write!(f, "{}, {} {}", self.reg, self.kind, r),
        }
    }
}
