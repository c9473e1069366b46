//! Atomic types of the Subtilis ARM back end.
//!
//! This crate models the subset of the ARM2/ARM250/ARM3 instruction set the
//! compiler emits, together with the FPA and VFP floating point families,
//! and provides bit-exact encodings for all of them.  Instructions live in
//! an op pool owned by an [`ArmSection`]; sections are intrusively linked
//! lists of ops addressed by stable [`OpIdx`] handles, so passes may insert
//! spill code without invalidating any reference held elsewhere.

#![warn(missing_docs)]

mod cond;
mod disasm;
mod encode;
mod fpa;
mod imm;
mod instr;
mod op2;
mod reg;
mod section;
mod shift;
mod vfp;

pub use cond::Cond;
pub use disasm::disassemble;
pub use encode::{encode_instr, EncodeError};
pub use fpa::{
    FpaCmpInstr, FpaCmpOp, FpaCptranInstr, FpaCptranOp, FpaDataInstr, FpaDyadicOp, FpaImm,
    FpaLdrcInstr, FpaMonadicOp, FpaOp2, FpaPrecision, FpaRounding, FpaStranInstr, FpaStranOp,
    FpaTranInstr, FpaTranOp,
};
pub use imm::{can_encode_imm, encode_imm, encode_nearest, split_imm, EncodedImm};
pub use instr::{
    AdrInstr, BrInstr, BrLinkType, BrTarget, CmovInstr, DataInstr, DataOp, Instr, LdrcInstr,
    MtranInstr, MtranMode, MtranOp, MulInstr, MulOp, StranInstr, StranOp, SwiInstr,
};
pub use op2::Op2;
pub use reg::{FReg, Reg, RegSet};
pub use fpa::FPA_PHYS_COUNT;
pub use section::{
    ArmProgram, ArmSection, CallSite, Directive, FpKind, Op, OpIdx, OpKind, SectionConstant,
};
pub use vfp::VFP_PHYS_COUNT;
pub use shift::{Shift, ShiftAmount, ShiftKind};
pub use vfp::{
    VfpCmpInstr, VfpCmpOp, VfpCopyInstr, VfpCopyOp, VfpCptranInstr, VfpCptranOp, VfpDataInstr,
    VfpDataOp, VfpLdrcInstr, VfpSqrtInstr, VfpStranInstr, VfpStranOp, VfpSysReg, VfpSysregInstr,
    VfpSysregOp, VfpTranInstr, VfpTranOp,
};
