//! Bit-exact instruction encoding.
//!
//! Every instruction that can appear in a finished section encodes to one
//! word.  Branch targets and pool loads must already have been resolved to
//! numeric offsets by the program encoder; meeting a symbolic operand here
//! is a compiler bug, not an input error.

use crate::fpa::*;
use crate::vfp::*;
use crate::{
    encode_imm, BrTarget, Cond, DataOp, Instr, MtranMode, MtranOp, MulOp, Op2, Reg, Shift,
    ShiftAmount, ShiftKind, StranOp,
};

/// Encoding failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// A data processing immediate has no 8-bit rotated form.
    #[error("immediate #{0} has no 8-bit rotated encoding")]
    BadImmediate(u32),
    /// A transfer offset exceeds the addressing mode's range.
    #[error("offset #{0} out of range for the addressing mode")]
    BadOffset(i32),
    /// A branch target does not fit the signed 24-bit word offset.
    #[error("branch offset {0} words out of range")]
    BranchOutOfRange(i32),
    /// A label or pooled constant survived to encoding.
    #[error("unresolved {0} reached the encoder")]
    Unresolved(&'static str),
    /// A shift count is outside what the barrel shifter accepts.
    #[error("shift count {0} out of range")]
    BadShift(i32),
    /// The instruction has no hardware encoding and should have been
    /// rewritten by an earlier pass.
    #[error("{0} must be expanded before encoding")]
    NeedsExpansion(&'static str),
}

fn encode_shift(shift: &Shift) -> Result<u32, EncodeError> {
    let base = shift.kind.bits() << 5 | shift.reg.bits();
    match shift.amount {
        ShiftAmount::Imm(n) => {
            let n = match (shift.kind, n) {
                (ShiftKind::Lsr | ShiftKind::Asr, 32) => 0,
                (_, n) if (0..32).contains(&n) => n,
                (_, n) => return Err(EncodeError::BadShift(n)),
            };
            Ok((n as u32) << 7 | base)
        }
        ShiftAmount::Reg(rs) => Ok(rs.bits() << 8 | 1 << 4 | base),
    }
}

fn encode_op2(op2: &Op2) -> Result<(u32, u32), EncodeError> {
    // Returns (I bit, operand bits).
    match op2 {
        Op2::Imm(imm) => {
            let e = encode_imm(*imm).ok_or(EncodeError::BadImmediate(*imm))?;
            Ok((1 << 25, e.bits()))
        }
        Op2::Reg(r) => Ok((0, r.bits())),
        Op2::Shifted(s) => Ok((0, encode_shift(s)?)),
    }
}

fn fpa_prec_cpdo(size: FpaPrecision) -> u32 {
    // Precision spreads across bits 19 and 7.
    match size {
        FpaPrecision::Single => 0,
        FpaPrecision::Double => 1 << 7,
        FpaPrecision::Extended => 1 << 19,
    }
}

fn fpa_op2_bits(op2: &FpaOp2) -> u32 {
    match op2 {
        FpaOp2::Reg(r) => r.bits(),
        FpaOp2::Imm(imm) => 1 << 3 | imm.bits(),
    }
}

fn ldc_offset(offset: i32, subtract: bool) -> Result<u32, EncodeError> {
    if offset < 0 || offset > 1020 || offset % 4 != 0 {
        return Err(EncodeError::BadOffset(offset));
    }
    let u = if subtract { 0 } else { 1 << 23 };
    Ok(u | (offset as u32) / 4)
}

fn vfp_sysreg_bits(reg: VfpSysReg) -> u32 {
    match reg {
        VfpSysReg::Fpsid => 0,
        VfpSysReg::Fpscr => 1,
        VfpSysReg::Fpexc => 8,
    }
}

/// Encodes one instruction to its word.
pub fn encode_instr(instr: &Instr) -> Result<u32, EncodeError> {
    let word = match instr {
        Instr::Data { op, instr } => {
            let (i_bit, op2) = encode_op2(&instr.op2)?;
            let s_bit = if instr.status || op.is_compare() {
                1 << 20
            } else {
                0
            };
            let rn = if op.is_move() { 0 } else { instr.op1.bits() << 16 };
            let rd = if op.is_compare() {
                0
            } else {
                instr.dest.bits() << 12
            };
            instr.ccode.bits() | i_bit | (*op as u32) << 21 | s_bit | rn | rd | op2
        }
        Instr::Mul { op, instr } => {
            let a_bit = if *op == MulOp::Mla { 1 << 21 } else { 0 };
            let s_bit = if instr.status { 1 << 20 } else { 0 };
            let rn = if *op == MulOp::Mla {
                instr.rn.bits() << 12
            } else {
                0
            };
            instr.ccode.bits()
                | a_bit
                | s_bit
                | instr.dest.bits() << 16
                | rn
                | instr.rs.bits() << 8
                | 0x90
                | instr.rm.bits()
        }
        Instr::Stran { op, instr } => {
            let (i_bit, offset) = match &instr.offset {
                Op2::Imm(imm) => {
                    if *imm > 4095 {
                        return Err(EncodeError::BadOffset(*imm as i32));
                    }
                    (0, *imm)
                }
                Op2::Reg(r) => (1 << 25, r.bits()),
                Op2::Shifted(s) => {
                    if matches!(s.amount, ShiftAmount::Reg(_)) {
                        return Err(EncodeError::BadShift(-1));
                    }
                    (1 << 25, encode_shift(s)?)
                }
            };
            let p = if instr.pre_indexed { 1 << 24 } else { 0 };
            let u = if instr.subtract { 0 } else { 1 << 23 };
            let b = if op.is_byte() { 1 << 22 } else { 0 };
            let w = if instr.write_back { 1 << 21 } else { 0 };
            let l = if op.is_load() { 1 << 20 } else { 0 };
            instr.ccode.bits()
                | 1 << 26
                | i_bit
                | p
                | u
                | b
                | w
                | l
                | instr.base.bits() << 16
                | instr.dest.bits() << 12
                | offset
        }
        Instr::Mtran { op, instr } => {
            let load = *op == MtranOp::Ldm;
            let (p, u) = match (instr.mode, load) {
                (MtranMode::Ia, _) => (0, 1),
                (MtranMode::Ib, _) => (1, 1),
                (MtranMode::Da, _) => (0, 0),
                (MtranMode::Db, _) => (1, 0),
                (MtranMode::Fd, true) => (0, 1),
                (MtranMode::Fd, false) => (1, 0),
                (MtranMode::Ed, true) => (1, 1),
                (MtranMode::Ed, false) => (0, 0),
                (MtranMode::Fa, true) => (0, 0),
                (MtranMode::Fa, false) => (1, 1),
                (MtranMode::Ea, true) => (1, 0),
                (MtranMode::Ea, false) => (0, 1),
            };
            let w = if instr.write_back { 1 << 21 } else { 0 };
            let l = if load { 1 << 20 } else { 0 };
            instr.ccode.bits()
                | 1 << 27
                | p << 24
                | u << 23
                | w
                | l
                | instr.op0.bits() << 16
                | instr.reg_list.bits()
        }
        Instr::B(instr) => {
            let offset = match instr.target {
                BrTarget::Offset(words) => words,
                BrTarget::Label(_) => return Err(EncodeError::Unresolved("branch label")),
            };
            if !(-(1 << 23)..1 << 23).contains(&offset) {
                return Err(EncodeError::BranchOutOfRange(offset));
            }
            let l = if instr.link { 1 << 24 } else { 0 };
            instr.ccode.bits() | 5 << 25 | l | (offset as u32 & 0x00ff_ffff)
        }
        Instr::Swi(instr) => instr.ccode.bits() | 0xf << 24 | (instr.code & 0x00ff_ffff),
        Instr::Ldrc(_) => return Err(EncodeError::Unresolved("constant pool load")),
        Instr::Adr(_) => return Err(EncodeError::Unresolved("address computation")),
        Instr::Cmov(_) => return Err(EncodeError::NeedsExpansion("conditional move")),
        Instr::FpaData { op, instr } => {
            let op2 = fpa_op2_bits(&instr.op2);
            instr.ccode.bits()
                | 0xe << 24
                | (*op as u32) << 20
                | fpa_prec_cpdo(instr.size)
                | instr.op1.bits() << 16
                | instr.dest.bits() << 12
                | 1 << 8
                | instr.rounding.bits()
                | op2
        }
        Instr::FpaMonadic { op, instr } => {
            instr.ccode.bits()
                | 0xe << 24
                | (*op as u32) << 20
                | fpa_prec_cpdo(instr.size)
                | 1 << 15
                | instr.dest.bits() << 12
                | 1 << 8
                | instr.rounding.bits()
                | fpa_op2_bits(&instr.op2)
        }
        Instr::FpaStran { op, instr } => {
            let p = if instr.pre_indexed { 1 << 24 } else { 0 };
            let w = if instr.write_back { 1 << 21 } else { 0 };
            let l = if *op == FpaStranOp::Ldf { 1 << 20 } else { 0 };
            let prec = match instr.size {
                FpaPrecision::Single => 0,
                FpaPrecision::Double => 1 << 15,
                FpaPrecision::Extended => 1 << 22,
            };
            instr.ccode.bits()
                | 6 << 25
                | p
                | ldc_offset(instr.offset, instr.subtract)?
                | w
                | l
                | prec
                | instr.base.bits() << 16
                | instr.dest.bits() << 12
                | 1 << 8
        }
        Instr::FpaTran { op, instr } => {
            // FLT takes its destination in CRn; FIX its source in CRm.
            let (l, crn, crm) = match op {
                FpaTranOp::Flt => (0u32, instr.fp_reg.bits(), 0),
                FpaTranOp::Fix => (1 << 20, 0, instr.fp_reg.bits()),
            };
            let prec = match instr.size {
                FpaPrecision::Single => 0,
                FpaPrecision::Double => 1 << 7,
                FpaPrecision::Extended => 1 << 19,
            };
            instr.ccode.bits()
                | 0xe << 24
                | l
                | prec
                | crn << 16
                | instr.int_reg.bits() << 12
                | 1 << 8
                | instr.rounding.bits()
                | 1 << 4
                | crm
        }
        Instr::FpaCmp { op, instr } => {
            let opc = match op {
                FpaCmpOp::Cmf => 4u32,
                FpaCmpOp::Cnf => 5,
                FpaCmpOp::Cmfe => 6,
                FpaCmpOp::Cnfe => 7,
            };
            instr.ccode.bits()
                | 0xe << 24
                | opc << 21
                | 1 << 20
                | instr.op1.bits() << 16
                | 0xf << 12
                | 1 << 8
                | 1 << 4
                | fpa_op2_bits(&instr.op2)
        }
        Instr::FpaLdrc(_) => return Err(EncodeError::Unresolved("fpa constant pool load")),
        Instr::FpaCptran { op, instr } => {
            let l = match op {
                FpaCptranOp::Wfs => 0,
                FpaCptranOp::Rfs => 1 << 20,
            };
            instr.ccode.bits() | 0xe << 24 | 1 << 21 | l | instr.dest.bits() << 12 | 0x110
        }
        Instr::VfpStran { op, instr } => {
            let p = if instr.pre_indexed { 1 << 24 } else { 0 };
            let w = if instr.write_back { 1 << 21 } else { 0 };
            let (l, double) = match op {
                VfpStranOp::Fldd => (1 << 20, true),
                VfpStranOp::Fstd => (0, true),
                VfpStranOp::Flds => (1 << 20, false),
                VfpStranOp::Fsts => (0, false),
            };
            let cp = if double { 0xb } else { 0xa } << 8;
            instr.ccode.bits()
                | 6 << 25
                | p
                | ldc_offset(instr.offset, instr.subtract)?
                | w
                | l
                | instr.base.bits() << 16
                | instr.dest.bits() << 12
                | cp
        }
        Instr::VfpCopy { op, instr } => {
            let base = match op {
                VfpCopyOp::Fcpyd => 0xeeb0_0b40,
                VfpCopyOp::Fnegd => 0xeeb1_0b40,
                VfpCopyOp::Fabsd => 0xeeb0_0bc0,
            };
            (base & 0x0fff_ffff)
                | instr.ccode.bits()
                | instr.dest.bits() << 12
                | instr.src.bits()
        }
        Instr::VfpLdrc(_) => return Err(EncodeError::Unresolved("vfp constant pool load")),
        Instr::VfpTran { op, instr } => match op {
            // The integer side lives in the even single-precision view of
            // the named double register.
            VfpTranOp::Fsitod => {
                let sm = instr.src.bits() * 2;
                instr.ccode.bits()
                    | 0x0eb8_0bc0
                    | instr.dest.bits() << 12
                    | (sm >> 1)
                    | (sm & 1) << 5
            }
            VfpTranOp::Ftosid | VfpTranOp::Ftosizd => {
                let sd = instr.dest.bits() * 2;
                let z = if *op == VfpTranOp::Ftosizd { 1 << 7 } else { 0 };
                instr.ccode.bits()
                    | 0x0ebd_0b40
                    | z
                    | (sd >> 1) << 12
                    | (sd & 1) << 22
                    | instr.src.bits()
            }
        },
        Instr::VfpCptran { op, instr } => {
            let sn = instr.freg.bits() * 2;
            let l = if *op == VfpCptranOp::Fmrs { 1 << 20 } else { 0 };
            instr.ccode.bits()
                | 0x0e00_0a10
                | l
                | (sn >> 1) << 16
                | (sn & 1) << 7
                | instr.reg.bits() << 12
        }
        Instr::VfpData { op, instr } => {
            let base = match op {
                VfpDataOp::Faddd => 0x0e30_0b00,
                VfpDataOp::Fsubd => 0x0e30_0b40,
                VfpDataOp::Fmuld => 0x0e20_0b00,
                VfpDataOp::Fdivd => 0x0e80_0b00,
            };
            instr.ccode.bits()
                | base
                | instr.op1.bits() << 16
                | instr.dest.bits() << 12
                | instr.op2.bits()
        }
        Instr::VfpCmp { op, instr } => match op {
            VfpCmpOp::Fcmpd => {
                let op2 = instr.op2.ok_or(EncodeError::Unresolved("fcmpd operand"))?;
                instr.ccode.bits() | 0x0eb4_0b40 | instr.op1.bits() << 12 | op2.bits()
            }
            VfpCmpOp::Fcmpzd => instr.ccode.bits() | 0x0eb5_0b40 | instr.op1.bits() << 12,
        },
        Instr::VfpSqrt(instr) => {
            instr.ccode.bits() | 0x0eb1_0bc0 | instr.dest.bits() << 12 | instr.op1.bits()
        }
        Instr::VfpSysreg { op, instr } => match op {
            VfpSysregOp::Fmstat => instr.ccode.bits() | 0x0ef1_fa10,
            VfpSysregOp::Fmrx => {
                instr.ccode.bits()
                    | 0x0ef0_0a10
                    | vfp_sysreg_bits(instr.sysreg) << 16
                    | instr.arm_reg.bits() << 12
            }
            VfpSysregOp::Fmxr => {
                instr.ccode.bits()
                    | 0x0ee0_0a10
                    | vfp_sysreg_bits(instr.sysreg) << 16
                    | instr.arm_reg.bits() << 12
            }
        },
    };
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrInstr, BrLinkType, DataInstr, MtranInstr, MulInstr, RegSet, StranInstr, SwiInstr};

    fn data(op: DataOp, ccode: Cond, status: bool, dest: usize, op1: usize, op2: Op2) -> Instr {
        Instr::Data {
            op,
            instr: DataInstr {
                ccode,
                status,
                dest: Reg(dest),
                op1: Reg(op1),
                op2,
            },
        }
    }

    #[test]
    fn moveq_r0_r1() {
        let i = data(DataOp::Mov, Cond::Eq, false, 0, 0, Op2::Reg(Reg(1)));
        assert_eq!(encode_instr(&i).unwrap(), 0x01a0_0001);
    }

    #[test]
    fn mvnsne_r0_r1() {
        let i = data(DataOp::Mvn, Cond::Ne, true, 0, 0, Op2::Reg(Reg(1)));
        assert_eq!(encode_instr(&i).unwrap(), 0x11f0_0001);
    }

    #[test]
    fn cmpgt_r0_r1() {
        let i = data(DataOp::Cmp, Cond::Gt, true, 0, 0, Op2::Reg(Reg(1)));
        assert_eq!(encode_instr(&i).unwrap(), 0xc150_0001);
    }

    #[test]
    fn mov_r0_r1_asr_r2() {
        let i = data(
            DataOp::Mov,
            Cond::Al,
            false,
            0,
            0,
            Op2::Shifted(Shift {
                reg: Reg(1),
                kind: ShiftKind::Asr,
                amount: ShiftAmount::Reg(Reg(2)),
            }),
        );
        assert_eq!(encode_instr(&i).unwrap(), 0xe1a0_0251);
    }

    #[test]
    fn mullt_r0_r2_r1() {
        let i = Instr::Mul {
            op: MulOp::Mul,
            instr: MulInstr {
                ccode: Cond::Lt,
                status: false,
                dest: Reg(0),
                rm: Reg(2),
                rs: Reg(1),
                rn: Reg(0),
            },
        };
        assert_eq!(encode_instr(&i).unwrap(), 0xb000_0192);
    }

    #[test]
    fn ldrcs_r0_r2_16() {
        let i = Instr::Stran {
            op: StranOp::Ldr,
            instr: StranInstr {
                ccode: Cond::Cs,
                dest: Reg(0),
                base: Reg(2),
                offset: Op2::Imm(16),
                pre_indexed: true,
                write_back: false,
                subtract: false,
            },
        };
        assert_eq!(encode_instr(&i).unwrap(), 0x2592_0010);
    }

    #[test]
    fn strcs_post_indexed_shifted() {
        let i = Instr::Stran {
            op: StranOp::Str,
            instr: StranInstr {
                ccode: Cond::Cs,
                dest: Reg(0),
                base: Reg(2),
                offset: Op2::Shifted(Shift {
                    reg: Reg(1),
                    kind: ShiftKind::Lsl,
                    amount: ShiftAmount::Imm(2),
                }),
                pre_indexed: false,
                write_back: false,
                subtract: false,
            },
        };
        assert_eq!(encode_instr(&i).unwrap(), 0x2682_0101);
    }

    #[test]
    fn bmi_back_two_words() {
        let i = Instr::B(BrInstr {
            ccode: Cond::Mi,
            link: false,
            link_type: BrLinkType::Void,
            target: BrTarget::Offset(-2),
        });
        assert_eq!(encode_instr(&i).unwrap(), 0x4aff_fffe);
    }

    #[test]
    fn swics_dc() {
        let i = Instr::Swi(SwiInstr {
            ccode: Cond::Cs,
            code: 0xdc,
            read_mask: RegSet::empty(),
            write_mask: RegSet::empty(),
        });
        assert_eq!(encode_instr(&i).unwrap(), 0x2f00_00dc);
    }

    #[test]
    fn mtran_stack_aliases() {
        let cases = [
            (MtranOp::Ldm, MtranMode::Fa, 7, RegSet::R0, true, 0xe837_0001u32),
            (MtranOp::Stm, MtranMode::Fa, 7, RegSet::R0, true, 0xe9a7_0001),
            (
                MtranOp::Ldm,
                MtranMode::Ed,
                0,
                RegSet::R3 | RegSet::R4 | RegSet::R5 | RegSet::R6 | RegSet::R7 | RegSet::R8,
                true,
                0xe9b0_01f8,
            ),
            (
                MtranOp::Stm,
                MtranMode::Ed,
                0,
                RegSet::R3 | RegSet::R4 | RegSet::R5 | RegSet::R6 | RegSet::R7 | RegSet::R8,
                true,
                0xe820_01f8,
            ),
            (MtranOp::Ldm, MtranMode::Fd, 1, RegSet::PC, true, 0xe8b1_8000),
            (MtranOp::Stm, MtranMode::Fd, 1, RegSet::LR, true, 0xe921_4000),
            (
                MtranOp::Ldm,
                MtranMode::Ea,
                13,
                RegSet::R0 | RegSet::R1 | RegSet::R2 | RegSet::R3,
                false,
                0xe91d_000f,
            ),
            (
                MtranOp::Stm,
                MtranMode::Ea,
                13,
                RegSet::R0 | RegSet::R1 | RegSet::R2 | RegSet::R3,
                false,
                0xe88d_000f,
            ),
        ];
        for (op, mode, base, regs, wb, expect) in cases {
            let i = Instr::Mtran {
                op,
                instr: MtranInstr {
                    ccode: Cond::Al,
                    op0: Reg(base),
                    reg_list: regs,
                    mode,
                    write_back: wb,
                },
            };
            assert_eq!(encode_instr(&i).unwrap(), expect, "{op:?} {mode:?}");
        }
    }

    #[test]
    fn asr_32_uses_the_zero_encoding() {
        let i = data(
            DataOp::Mov,
            Cond::Al,
            false,
            0,
            0,
            Op2::Shifted(Shift {
                reg: Reg(1),
                kind: ShiftKind::Asr,
                amount: ShiftAmount::Imm(32),
            }),
        );
        assert_eq!(encode_instr(&i).unwrap(), 0xe1a0_0041);
    }

    #[test]
    fn fpa_status_transfers() {
        let wfs = Instr::FpaCptran {
            op: FpaCptranOp::Wfs,
            instr: FpaCptranInstr {
                ccode: Cond::Al,
                dest: Reg(0),
            },
        };
        let rfs = Instr::FpaCptran {
            op: FpaCptranOp::Rfs,
            instr: FpaCptranInstr {
                ccode: Cond::Al,
                dest: Reg(0),
            },
        };
        assert_eq!(encode_instr(&wfs).unwrap(), 0xee20_0110);
        assert_eq!(encode_instr(&rfs).unwrap(), 0xee30_0110);
    }

    #[test]
    fn ldfd_with_word_offset() {
        let i = Instr::FpaStran {
            op: FpaStranOp::Ldf,
            instr: FpaStranInstr {
                ccode: Cond::Al,
                size: FpaPrecision::Double,
                dest: crate::FReg(0),
                base: Reg(0),
                offset: 0,
                pre_indexed: true,
                write_back: false,
                subtract: false,
            },
        };
        assert_eq!(encode_instr(&i).unwrap(), 0xed90_8100);
    }

    #[test]
    fn vfp_faddd() {
        let i = Instr::VfpData {
            op: VfpDataOp::Faddd,
            instr: VfpDataInstr {
                ccode: Cond::Al,
                dest: crate::FReg(1),
                op1: crate::FReg(2),
                op2: crate::FReg(3),
            },
        };
        assert_eq!(encode_instr(&i).unwrap(), 0xee32_1b03);
    }

    #[test]
    fn branch_range_is_checked() {
        let i = Instr::B(BrInstr {
            ccode: Cond::Al,
            link: false,
            link_type: BrLinkType::Void,
            target: BrTarget::Offset(1 << 23),
        });
        assert!(matches!(
            encode_instr(&i),
            Err(EncodeError::BranchOutOfRange(_))
        ));
    }
}
