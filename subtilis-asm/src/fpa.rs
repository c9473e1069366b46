//! FPA coprocessor instruction payloads.
//!
//! The FPA works on an 80-bit internal format; precision is a property of
//! each instruction, and doubles are stored to memory with their words
//! swapped relative to IEEE layout.  Eight registers, f0-f7.

use crate::{Cond, FReg, Reg};

/// Number of physical FPA registers.
pub const FPA_PHYS_COUNT: usize = 8;

/// Operand precision, encoded across two bits of the data processing and
/// transfer forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum FpaPrecision {
    /// IEEE single, 4 bytes.
    Single,
    /// IEEE double, 8 bytes.
    Double,
    /// Extended, 12 bytes.
    Extended,
}

impl FpaPrecision {
    /// Size in bytes.
    pub const fn size(self) -> u32 {
        match self {
            FpaPrecision::Single => 4,
            FpaPrecision::Double => 8,
            FpaPrecision::Extended => 12,
        }
    }
}

/// Rounding mode, bits 5-6 of the data processing forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum FpaRounding {
    /// Round to nearest.
    Nearest,
    /// Round towards plus infinity.
    PlusInfinity,
    /// Round towards minus infinity.
    MinusInfinity,
    /// Round towards zero.
    Zero,
}

impl FpaRounding {
    /// Encoding bits, already in position.
    pub const fn bits(self) -> u32 {
        match self {
            FpaRounding::Nearest => 0,
            FpaRounding::PlusInfinity => 1 << 5,
            FpaRounding::MinusInfinity => 2 << 5,
            FpaRounding::Zero => 3 << 5,
        }
    }
}

/// The small constants the FPA can encode directly in place of a register
/// operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs)]
pub enum FpaImm {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Ten,
    Half,
}

impl FpaImm {
    /// The immediate field value.
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// The constant an immediate stands for, used when deciding whether a
    /// real literal can avoid the constant pool.
    pub const fn value(self) -> f64 {
        match self {
            FpaImm::Zero => 0.0,
            FpaImm::One => 1.0,
            FpaImm::Two => 2.0,
            FpaImm::Three => 3.0,
            FpaImm::Four => 4.0,
            FpaImm::Five => 5.0,
            FpaImm::Ten => 10.0,
            FpaImm::Half => 0.5,
        }
    }

    /// Finds the immediate encoding of `value`, if it has one.
    pub fn from_value(value: f64) -> Option<FpaImm> {
        [
            FpaImm::Zero,
            FpaImm::One,
            FpaImm::Two,
            FpaImm::Three,
            FpaImm::Four,
            FpaImm::Five,
            FpaImm::Ten,
            FpaImm::Half,
        ]
        .into_iter()
        .find(|imm| imm.value() == value)
    }
}

/// Second operand of the FPA data processing and compare forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpaOp2 {
    /// Register operand.
    Reg(FReg),
    /// One of the eight encodable constants.
    Imm(FpaImm),
}

/// Dyadic data processing opcode, bits 20-23.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FpaDyadicOp {
    Adf = 0,
    Muf = 1,
    Suf = 2,
    Rsf = 3,
    Dvf = 4,
    Rdf = 5,
    Pow = 6,
    Rpw = 7,
    Rmf = 8,
    Fml = 9,
    Fdv = 10,
    Frd = 11,
    Pol = 12,
}

/// Monadic data processing opcode, bits 20-23 with bit 15 set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FpaMonadicOp {
    Mvf = 0,
    Mnf = 1,
    Abs = 2,
    Rnd = 3,
    Sqt = 4,
    Log = 5,
    Lgn = 6,
    Exp = 7,
    Sin = 8,
    Cos = 9,
    Tan = 10,
    Asn = 11,
    Acs = 12,
    Atn = 13,
    Urd = 14,
    Nrm = 15,
}

/// Data processing payload shared by the dyadic and monadic forms; the
/// monadic forms ignore `op1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpaDataInstr {
    /// Condition.
    pub ccode: Cond,
    /// Operand precision.
    pub size: FpaPrecision,
    /// Rounding mode.
    pub rounding: FpaRounding,
    /// Destination register.
    pub dest: FReg,
    /// First operand, dyadic forms only.
    pub op1: FReg,
    /// Second operand.
    pub op2: FpaOp2,
}

/// Transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum FpaStranOp {
    /// Load floating register.
    Ldf,
    /// Store floating register.
    Stf,
}

/// `LDF`/`STF` payload.  The offset is in bytes and must be a multiple of
/// four within ±1020.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpaStranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Operand precision.
    pub size: FpaPrecision,
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

/// Integer/float transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum FpaTranOp {
    /// Integer to float, `FLT fp, int`.
    Flt,
    /// Float to integer, `FIX int, fp`.
    Fix,
}

/// `FLT`/`FIX` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpaTranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Operand precision.
    pub size: FpaPrecision,
    /// Rounding mode.
    pub rounding: FpaRounding,
    /// Floating point side of the transfer.
    pub fp_reg: FReg,
    /// Integer side of the transfer.
    pub int_reg: Reg,
}

/// Compare selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum FpaCmpOp {
    /// Compare.
    Cmf,
    /// Compare negated.
    Cnf,
    /// Compare with exception.
    Cmfe,
    /// Compare negated with exception.
    Cnfe,
}

/// Compare payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpaCmpInstr {
    /// Condition.
    pub ccode: Cond,
    /// First operand.
    pub op1: FReg,
    /// Second operand.
    pub op2: FpaOp2,
}

/// PC-relative load of a pooled real constant; the encoder rewrites it to
/// an `LDF` against the nearest island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpaLdrcInstr {
    /// Condition.
    pub ccode: Cond,
    /// Operand precision.
    pub size: FpaPrecision,
    /// Destination register.
    pub dest: FReg,
    /// Section constant id.
    pub constant: usize,
}

/// Status register transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum FpaCptranOp {
    /// Read floating point status into an integer register.
    Rfs,
    /// Write floating point status from an integer register.
    Wfs,
}

/// `RFS`/`WFS` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpaCptranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Integer register transferred.
    pub dest: Reg,
}
