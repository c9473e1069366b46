//! Decoding for the instruction subset the compiler emits.
//!
//! The decoder inverts [`crate::encode_instr`] over exactly that subset;
//! it exists so the encoder can be property tested with
//! `disassemble(encode(i)) == i`.  Information the hardware does not
//! encode (branch link conventions, SWI register contracts) decodes to the
//! neutral values, and block transfers decode to their stack aliases.

use crate::fpa::*;
use crate::vfp::*;
use crate::{
    BrInstr, BrLinkType, BrTarget, Cond, DataInstr, DataOp, FReg, Instr, MtranInstr, MtranMode,
    MtranOp, MulInstr, MulOp, Op2, Reg, RegSet, Shift, ShiftAmount, ShiftKind, StranInstr,
    StranOp, SwiInstr,
};

fn decode_shift_op2(word: u32) -> Option<Op2> {
    let rm = Reg((word & 0xf) as usize);
    let kind = match (word >> 5) & 3 {
        0 => ShiftKind::Lsl,
        1 => ShiftKind::Lsr,
        2 => ShiftKind::Asr,
        _ => ShiftKind::Ror,
    };
    if word & 0x10 == 0 {
        let amount = ((word >> 7) & 0x1f) as i32;
        if amount == 0 && kind == ShiftKind::Lsl {
            return Some(Op2::Reg(rm));
        }
        let amount = match (kind, amount) {
            (ShiftKind::Lsr | ShiftKind::Asr, 0) => 32,
            (_, a) => a,
        };
        Some(Op2::Shifted(Shift {
            reg: rm,
            kind,
            amount: ShiftAmount::Imm(amount),
        }))
    } else {
        if word & 0x80 != 0 {
            return None;
        }
        Some(Op2::Shifted(Shift {
            reg: rm,
            kind,
            amount: ShiftAmount::Reg(Reg(((word >> 8) & 0xf) as usize)),
        }))
    }
}

fn decode_data(word: u32, ccode: Cond) -> Option<Instr> {
    let op = match (word >> 21) & 0xf {
        0 => DataOp::And,
        1 => DataOp::Eor,
        2 => DataOp::Sub,
        3 => DataOp::Rsb,
        4 => DataOp::Add,
        5 => DataOp::Adc,
        6 => DataOp::Sbc,
        7 => DataOp::Rsc,
        8 => DataOp::Tst,
        9 => DataOp::Teq,
        10 => DataOp::Cmp,
        11 => DataOp::Cmn,
        12 => DataOp::Orr,
        13 => DataOp::Mov,
        14 => DataOp::Bic,
        _ => DataOp::Mvn,
    };
    let status = word & 1 << 20 != 0;
    if op.is_compare() && !status {
        return None;
    }
    let op2 = if word & 1 << 25 != 0 {
        let rotate = (word >> 8) & 0xf;
        Op2::Imm((word & 0xff).rotate_right(rotate * 2))
    } else {
        decode_shift_op2(word)?
    };
    let rn = Reg(((word >> 16) & 0xf) as usize);
    let rd = Reg(((word >> 12) & 0xf) as usize);
    // The emit helpers mirror the unused field from the used one; decode
    // the same way so equality round-trips.
    let (dest, op1) = if op.is_compare() {
        (rn, rn)
    } else if op.is_move() {
        (rd, rd)
    } else {
        (rd, rn)
    };
    Some(Instr::Data {
        op,
        instr: DataInstr {
            ccode,
            status,
            dest,
            op1,
            op2,
        },
    })
}

fn decode_mul(word: u32, ccode: Cond) -> Instr {
    let mla = word & 1 << 21 != 0;
    let rn = if mla {
        Reg(((word >> 12) & 0xf) as usize)
    } else {
        Reg(0)
    };
    Instr::Mul {
        op: if mla { MulOp::Mla } else { MulOp::Mul },
        instr: MulInstr {
            ccode,
            status: word & 1 << 20 != 0,
            dest: Reg(((word >> 16) & 0xf) as usize),
            rm: Reg((word & 0xf) as usize),
            rs: Reg(((word >> 8) & 0xf) as usize),
            rn,
        },
    }
}

fn decode_stran(word: u32, ccode: Cond) -> Option<Instr> {
    let load = word & 1 << 20 != 0;
    let byte = word & 1 << 22 != 0;
    let op = match (load, byte) {
        (true, false) => StranOp::Ldr,
        (false, false) => StranOp::Str,
        (true, true) => StranOp::Ldrb,
        (false, true) => StranOp::Strb,
    };
    let offset = if word & 1 << 25 != 0 {
        match decode_shift_op2(word)? {
            Op2::Shifted(s) if matches!(s.amount, ShiftAmount::Reg(_)) => return None,
            other => other,
        }
    } else {
        Op2::Imm(word & 0xfff)
    };
    Some(Instr::Stran {
        op,
        instr: StranInstr {
            ccode,
            dest: Reg(((word >> 12) & 0xf) as usize),
            base: Reg(((word >> 16) & 0xf) as usize),
            offset,
            pre_indexed: word & 1 << 24 != 0,
            write_back: word & 1 << 21 != 0,
            subtract: word & 1 << 23 == 0,
        },
    })
}

fn decode_mtran(word: u32, ccode: Cond) -> Instr {
    let load = word & 1 << 20 != 0;
    let p = word & 1 << 24 != 0;
    let u = word & 1 << 23 != 0;
    let mode = match (load, p, u) {
        (true, false, true) | (false, true, false) => MtranMode::Fd,
        (true, true, true) | (false, false, false) => MtranMode::Ed,
        (true, false, false) | (false, true, true) => MtranMode::Fa,
        (true, true, false) | (false, false, true) => MtranMode::Ea,
    };
    Instr::Mtran {
        op: if load { MtranOp::Ldm } else { MtranOp::Stm },
        instr: MtranInstr {
            ccode,
            op0: Reg(((word >> 16) & 0xf) as usize),
            reg_list: RegSet::from_bits_truncate(word & 0xffff),
            mode,
            write_back: word & 1 << 21 != 0,
        },
    }
}

fn fpa_rounding(word: u32) -> FpaRounding {
    match (word >> 5) & 3 {
        0 => FpaRounding::Nearest,
        1 => FpaRounding::PlusInfinity,
        2 => FpaRounding::MinusInfinity,
        _ => FpaRounding::Zero,
    }
}

fn fpa_imm(bits: u32) -> FpaImm {
    match bits & 7 {
        0 => FpaImm::Zero,
        1 => FpaImm::One,
        2 => FpaImm::Two,
        3 => FpaImm::Three,
        4 => FpaImm::Four,
        5 => FpaImm::Five,
        6 => FpaImm::Ten,
        _ => FpaImm::Half,
    }
}

fn decode_fpa_cpdo(word: u32, ccode: Cond) -> Option<Instr> {
    let size = match (word & 1 << 19 != 0, word & 1 << 7 != 0) {
        (false, false) => FpaPrecision::Single,
        (false, true) => FpaPrecision::Double,
        (true, false) => FpaPrecision::Extended,
        (true, true) => return None,
    };
    let op2 = if word & 1 << 3 != 0 {
        FpaOp2::Imm(fpa_imm(word))
    } else {
        FpaOp2::Reg(FReg((word & 7) as usize))
    };
    let dest = FReg(((word >> 12) & 7) as usize);
    let rounding = fpa_rounding(word);
    let opc = (word >> 20) & 0xf;
    if word & 1 << 15 != 0 {
        let op = match opc {
            0 => FpaMonadicOp::Mvf,
            1 => FpaMonadicOp::Mnf,
            2 => FpaMonadicOp::Abs,
            3 => FpaMonadicOp::Rnd,
            4 => FpaMonadicOp::Sqt,
            5 => FpaMonadicOp::Log,
            6 => FpaMonadicOp::Lgn,
            7 => FpaMonadicOp::Exp,
            8 => FpaMonadicOp::Sin,
            9 => FpaMonadicOp::Cos,
            10 => FpaMonadicOp::Tan,
            11 => FpaMonadicOp::Asn,
            12 => FpaMonadicOp::Acs,
            13 => FpaMonadicOp::Atn,
            14 => FpaMonadicOp::Urd,
            _ => FpaMonadicOp::Nrm,
        };
        Some(Instr::FpaMonadic {
            op,
            instr: FpaDataInstr {
                ccode,
                size,
                rounding,
                dest,
                op1: dest,
                op2,
            },
        })
    } else {
        let op = match opc {
            0 => FpaDyadicOp::Adf,
            1 => FpaDyadicOp::Muf,
            2 => FpaDyadicOp::Suf,
            3 => FpaDyadicOp::Rsf,
            4 => FpaDyadicOp::Dvf,
            5 => FpaDyadicOp::Rdf,
            6 => FpaDyadicOp::Pow,
            7 => FpaDyadicOp::Rpw,
            8 => FpaDyadicOp::Rmf,
            9 => FpaDyadicOp::Fml,
            10 => FpaDyadicOp::Fdv,
            11 => FpaDyadicOp::Frd,
            12 => FpaDyadicOp::Pol,
            _ => return None,
        };
        Some(Instr::FpaData {
            op,
            instr: FpaDataInstr {
                ccode,
                size,
                rounding,
                dest,
                op1: FReg(((word >> 16) & 7) as usize),
                op2,
            },
        })
    }
}

fn decode_fpa_cprt(word: u32, ccode: Cond) -> Option<Instr> {
    let load = word & 1 << 20 != 0;
    let opc = (word >> 21) & 7;
    if opc >= 4 {
        // Compares write the flags directly, Rd is always r15.
        if (word >> 12) & 0xf != 0xf {
            return None;
        }
        let op = match opc {
            4 => FpaCmpOp::Cmf,
            5 => FpaCmpOp::Cnf,
            6 => FpaCmpOp::Cmfe,
            _ => FpaCmpOp::Cnfe,
        };
        let op2 = if word & 1 << 3 != 0 {
            FpaOp2::Imm(fpa_imm(word))
        } else {
            FpaOp2::Reg(FReg((word & 7) as usize))
        };
        return Some(Instr::FpaCmp {
            op,
            instr: FpaCmpInstr {
                ccode,
                op1: FReg(((word >> 16) & 7) as usize),
                op2,
            },
        });
    }
    if opc == 1 {
        return Some(Instr::FpaCptran {
            op: if load {
                FpaCptranOp::Rfs
            } else {
                FpaCptranOp::Wfs
            },
            instr: FpaCptranInstr {
                ccode,
                dest: Reg(((word >> 12) & 0xf) as usize),
            },
        });
    }
    if opc != 0 {
        return None;
    }
    let size = match (word & 1 << 19 != 0, word & 1 << 7 != 0) {
        (false, false) => FpaPrecision::Single,
        (false, true) => FpaPrecision::Double,
        (true, false) => FpaPrecision::Extended,
        (true, true) => return None,
    };
    let int_reg = Reg(((word >> 12) & 0xf) as usize);
    let (op, fp_reg) = if load {
        (FpaTranOp::Fix, FReg((word & 7) as usize))
    } else {
        (FpaTranOp::Flt, FReg(((word >> 16) & 7) as usize))
    };
    Some(Instr::FpaTran {
        op,
        instr: FpaTranInstr {
            ccode,
            size,
            rounding: fpa_rounding(word),
            fp_reg,
            int_reg,
        },
    })
}

fn decode_fpa_stran(word: u32, ccode: Cond) -> Option<Instr> {
    let size = match (word & 1 << 22 != 0, word & 1 << 15 != 0) {
        (false, false) => FpaPrecision::Single,
        (false, true) => FpaPrecision::Double,
        (true, false) => FpaPrecision::Extended,
        (true, true) => return None,
    };
    Some(Instr::FpaStran {
        op: if word & 1 << 20 != 0 {
            FpaStranOp::Ldf
        } else {
            FpaStranOp::Stf
        },
        instr: FpaStranInstr {
            ccode,
            size,
            dest: FReg(((word >> 12) & 7) as usize),
            base: Reg(((word >> 16) & 0xf) as usize),
            offset: ((word & 0xff) * 4) as i32,
            pre_indexed: word & 1 << 24 != 0,
            write_back: word & 1 << 21 != 0,
            subtract: word & 1 << 23 == 0,
        },
    })
}

fn masked(word: u32, mask: u32, base: u32) -> bool {
    word & mask == base
}

fn decode_vfp_cdp(word: u32, ccode: Cond) -> Option<Instr> {
    let dest = FReg(((word >> 12) & 0xf) as usize);
    let dn = FReg(((word >> 16) & 0xf) as usize);
    let dm = FReg((word & 0xf) as usize);
    let body = word & 0x0fff_ffff;

    if masked(body, 0x0fff_ffff, 0x0ef1_fa10) {
        return Some(Instr::VfpSysreg {
            op: VfpSysregOp::Fmstat,
            instr: VfpSysregInstr {
                ccode,
                sysreg: VfpSysReg::Fpscr,
                arm_reg: Reg(((word >> 12) & 0xf) as usize),
            },
        });
    }
    for (op, base) in [(VfpSysregOp::Fmrx, 0x0ef0_0a10), (VfpSysregOp::Fmxr, 0x0ee0_0a10)] {
        if masked(body, 0x0ff0_0fff, base) {
            let sysreg = match (word >> 16) & 0xf {
                0 => VfpSysReg::Fpsid,
                1 => VfpSysReg::Fpscr,
                8 => VfpSysReg::Fpexc,
                _ => return None,
            };
            return Some(Instr::VfpSysreg {
                op,
                instr: VfpSysregInstr {
                    ccode,
                    sysreg,
                    arm_reg: Reg(((word >> 12) & 0xf) as usize),
                },
            });
        }
    }
    if masked(body, 0x0fe0_0f7f, 0x0e00_0a10) {
        let sn = ((word >> 16) & 0xf) << 1 | (word >> 7) & 1;
        if sn % 2 != 0 {
            // Only the even single views of doubles are produced.
            return None;
        }
        return Some(Instr::VfpCptran {
            op: if word & 1 << 20 != 0 {
                VfpCptranOp::Fmrs
            } else {
                VfpCptranOp::Fmsr
            },
            instr: VfpCptranInstr {
                ccode,
                freg: FReg((sn / 2) as usize),
                reg: Reg(((word >> 12) & 0xf) as usize),
            },
        });
    }
    if masked(body, 0x0fff_0ff0, 0x0eb1_0bc0) {
        return Some(Instr::VfpSqrt(VfpSqrtInstr {
            ccode,
            dest,
            op1: dm,
        }));
    }
    for (op, base) in [
        (VfpCopyOp::Fcpyd, 0x0eb0_0b40),
        (VfpCopyOp::Fnegd, 0x0eb1_0b40),
        (VfpCopyOp::Fabsd, 0x0eb0_0bc0),
    ] {
        if masked(body, 0x0fff_0ff0, base) {
            return Some(Instr::VfpCopy {
                op,
                instr: VfpCopyInstr {
                    ccode,
                    dest,
                    src: dm,
                },
            });
        }
    }
    if masked(body, 0x0fff_0fff, 0x0eb5_0b40) {
        return Some(Instr::VfpCmp {
            op: VfpCmpOp::Fcmpzd,
            instr: VfpCmpInstr {
                ccode,
                op1: dest,
                op2: None,
            },
        });
    }
    if masked(body, 0x0fff_0ff0, 0x0eb4_0b40) {
        return Some(Instr::VfpCmp {
            op: VfpCmpOp::Fcmpd,
            instr: VfpCmpInstr {
                ccode,
                op1: dest,
                op2: Some(dm),
            },
        });
    }
    if masked(body, 0x0fff_0fd0, 0x0eb8_0bc0) {
        let sm = (word & 0xf) << 1 | (word >> 5) & 1;
        if sm % 2 != 0 {
            return None;
        }
        return Some(Instr::VfpTran {
            op: VfpTranOp::Fsitod,
            instr: VfpTranInstr {
                ccode,
                dest,
                src: FReg((sm / 2) as usize),
            },
        });
    }
    if masked(body, 0x0fbf_0f70, 0x0ebd_0b40) {
        let sd = ((word >> 12) & 0xf) << 1 | (word >> 22) & 1;
        if sd % 2 != 0 {
            return None;
        }
        let op = if word & 1 << 7 != 0 {
            VfpTranOp::Ftosizd
        } else {
            VfpTranOp::Ftosid
        };
        return Some(Instr::VfpTran {
            op,
            instr: VfpTranInstr {
                ccode,
                dest: FReg((sd / 2) as usize),
                src: dm,
            },
        });
    }
    for (op, base) in [
        (VfpDataOp::Faddd, 0x0e30_0b00),
        (VfpDataOp::Fsubd, 0x0e30_0b40),
        (VfpDataOp::Fmuld, 0x0e20_0b00),
        (VfpDataOp::Fdivd, 0x0e80_0b00),
    ] {
        if masked(body, 0x0ff0_0ff0, base) {
            return Some(Instr::VfpData {
                op,
                instr: VfpDataInstr {
                    ccode,
                    dest,
                    op1: dn,
                    op2: dm,
                },
            });
        }
    }
    None
}

fn decode_vfp_stran(word: u32, ccode: Cond) -> Instr {
    let double = (word >> 8) & 0xf == 0xb;
    let load = word & 1 << 20 != 0;
    let op = match (load, double) {
        (true, true) => VfpStranOp::Fldd,
        (false, true) => VfpStranOp::Fstd,
        (true, false) => VfpStranOp::Flds,
        (false, false) => VfpStranOp::Fsts,
    };
    Instr::VfpStran {
        op,
        instr: VfpStranInstr {
            ccode,
            dest: FReg(((word >> 12) & 0xf) as usize),
            base: Reg(((word >> 16) & 0xf) as usize),
            offset: ((word & 0xff) * 4) as i32,
            pre_indexed: word & 1 << 24 != 0,
            write_back: word & 1 << 21 != 0,
            subtract: word & 1 << 23 == 0,
        },
    }
}

/// Decodes one word.  `None` means the word is outside the subset the
/// compiler produces.
pub fn disassemble(word: u32) -> Option<Instr> {
    let ccode = Cond::from_bits(word >> 28);
    match (word >> 25) & 7 {
        0b101 => {
            let mut offset = (word & 0x00ff_ffff) as i32;
            if offset & 0x0080_0000 != 0 {
                offset |= !0x00ff_ffff;
            }
            Some(Instr::B(BrInstr {
                ccode,
                link: word & 1 << 24 != 0,
                link_type: BrLinkType::Void,
                target: BrTarget::Offset(offset),
            }))
        }
        0b111 => {
            if word & 1 << 24 != 0 {
                return Some(Instr::Swi(SwiInstr {
                    ccode,
                    code: word & 0x00ff_ffff,
                    read_mask: RegSet::empty(),
                    write_mask: RegSet::empty(),
                }));
            }
            match (word >> 8) & 0xf {
                1 => {
                    if word & 1 << 4 == 0 {
                        decode_fpa_cpdo(word, ccode)
                    } else {
                        decode_fpa_cprt(word, ccode)
                    }
                }
                0xa | 0xb => decode_vfp_cdp(word, ccode),
                _ => None,
            }
        }
        0b110 => match (word >> 8) & 0xf {
            1 => decode_fpa_stran(word, ccode),
            0xa | 0xb => Some(decode_vfp_stran(word, ccode)),
            _ => None,
        },
        0b100 => Some(decode_mtran(word, ccode)),
        0b010 | 0b011 => decode_stran(word, ccode),
        _ => {
            if (word >> 22) & 0x3f == 0 && (word >> 4) & 0xf == 9 {
                Some(decode_mul(word, ccode))
            } else {
                decode_data(word, ccode)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_instr;

    #[test]
    fn golden_words_decode_and_reencode() {
        for word in [
            0x01a0_0001u32,
            0x11f0_0001,
            0xc150_0001,
            0xb000_0192,
            0x2592_0010,
            0x2f00_00dc,
            0x4aff_fffe,
            0xe837_0001,
            0xe9a7_0001,
            0xe9b0_01f8,
            0xe820_01f8,
            0xe8b1_8000,
            0xe921_4000,
            0xe91d_000f,
            0xe88d_000f,
            0x2682_0101,
            0xe1a0_0251,
        ] {
            let instr = disassemble(word).expect("subset word must decode");
            assert_eq!(encode_instr(&instr).unwrap(), word, "{instr:?}");
        }
    }
}
