use crate::{Reg, Shift};
use core::fmt;

/// Second operand of a data processing instruction, and the offset form of
/// the single data transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op2 {
    /// A constant.  For data processing it must satisfy the 8-bit rotated
    /// encoding; transfers allow 0-4095.  Emitters are responsible for
    /// checking with [`crate::can_encode_imm`] and falling back to a
    /// constant pool load.
    Imm(u32),
    /// Plain register.
    Reg(Reg),
    /// Register passed through the barrel shifter.
    Shifted(Shift),
}

impl Op2 {
    /// The register read by this operand, if any, ignoring any shift-count
    /// register.
    pub fn reg(self) -> Option<Reg> {
        match self {
            Op2::Imm(_) => None,
            Op2::Reg(r) => Some(r),
            Op2::Shifted(s) => Some(s.reg),
        }
    }
}

impl fmt::Display for Op2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op2::Imm(i) => write!(f, "#{i}"),
            Op2::Reg(r) => write!(f, "{r}"),
            Op2::Shifted(s) => write!(f, "{s}"),
        }
    }
}
