//! VFP coprocessor instruction payloads.
//!
//! The VFP variant works in IEEE 754 double precision throughout, with
//! sixteen double registers d0-d15.  Singles appear only in the transfer
//! forms used to move values between the integer pipeline and the FPU.

use crate::{Cond, FReg, Reg};

/// Number of physical VFP double registers.
pub const VFP_PHYS_COUNT: usize = 16;

/// Load/store selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs)]
pub enum VfpStranOp {
    Fldd,
    Fstd,
    Flds,
    Fsts,
}

/// Load/store payload.  Byte offset, multiple of four, within ±1020.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpStranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Transferred register.
    pub dest: FReg,
    /// Base address register.
    pub base: Reg,
    /// Byte offset, multiple of four.
    pub offset: i32,
    /// Pre-indexed addressing.
    pub pre_indexed: bool,
    /// Base register write back.
    pub write_back: bool,
    /// Offset is subtracted from the base.
    pub subtract: bool,
}

/// Register to register copy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs)]
pub enum VfpCopyOp {
    Fcpyd,
    Fnegd,
    Fabsd,
}

/// Copy payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpCopyInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: FReg,
    /// Source register.
    pub src: FReg,
}

/// PC-relative load of a pooled double; becomes `FLDD` against an island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpLdrcInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: FReg,
    /// Section constant id.
    pub constant: usize,
}

/// Conversion selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum VfpTranOp {
    /// Signed int (in a single register view) to double.
    Fsitod,
    /// Double to signed int, round to zero.
    Ftosizd,
    /// Double to signed int, current rounding.
    Ftosid,
}

impl VfpTranOp {
    /// True if the source is the floating point side.
    pub const fn reads_fp(self) -> bool {
        matches!(self, VfpTranOp::Ftosizd | VfpTranOp::Ftosid)
    }
}

/// Conversion payload; one side is interpreted through a single-precision
/// register view as the architecture requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpTranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: FReg,
    /// Source register.
    pub src: FReg,
}

/// Core/FPU single transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum VfpCptranOp {
    /// ARM register to single, `FMSR`.
    Fmsr,
    /// Single to ARM register, `FMRS`.
    Fmrs,
}

/// `FMSR`/`FMRS` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpCptranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Single precision register view.
    pub freg: FReg,
    /// ARM register.
    pub reg: Reg,
}

/// Double precision data processing opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs)]
pub enum VfpDataOp {
    Faddd,
    Fsubd,
    Fmuld,
    Fdivd,
}

/// Data processing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpDataInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: FReg,
    /// First operand.
    pub op1: FReg,
    /// Second operand.
    pub op2: FReg,
}

/// Compare selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum VfpCmpOp {
    /// Compare two registers.
    Fcmpd,
    /// Compare against zero.
    Fcmpzd,
}

/// Compare payload; `op2` is absent for the zero form.  The result lands
/// in the FPSCR and is copied to the ARM flags with `FMSTAT`
/// ([`VfpSysregOp::Fmstat`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpCmpInstr {
    /// Condition.
    pub ccode: Cond,
    /// First operand.
    pub op1: FReg,
    /// Second operand, unless comparing against zero.
    pub op2: Option<FReg>,
}

/// Square root payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpSqrtInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: FReg,
    /// Operand.
    pub op1: FReg,
}

/// VFP system register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs)]
pub enum VfpSysReg {
    Fpsid,
    Fpscr,
    Fpexc,
}

/// System register transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum VfpSysregOp {
    /// System register to ARM register.
    Fmrx,
    /// ARM register to system register.
    Fmxr,
    /// FPSCR flags to ARM flags; `arm_reg` is ignored.
    Fmstat,
}

/// System register transfer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpSysregInstr {
    /// Condition.
    pub ccode: Cond,
    /// System register.
    pub sysreg: VfpSysReg,
    /// ARM register.
    pub arm_reg: Reg,
}
