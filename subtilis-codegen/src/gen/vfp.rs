//! VFP handlers for the real-typed rules.
//!
//! The VFP compares into the FPSCR, so every comparison pairs `FCMPD`
//! with `FMSTAT` before the ARM flags can be trusted.  There are no
//! immediate operand forms and no transcendental instructions: constants
//! always come from the pool, and the trigonometric and logarithmic
//! operations are rejected for this unit.

use super::{gen_call_gen, gen_ret, ir_reg, Ctx};
use crate::{Error, Result};
use subtilis_asm::{
    BrLinkType, Cond, FReg, Instr, VfpCmpOp, VfpCopyInstr, VfpCopyOp, VfpCptranInstr, VfpCptranOp,
    VfpDataOp, VfpSqrtInstr, VfpStranOp, VfpSysReg, VfpSysregInstr, VfpSysregOp, VfpTranInstr,
    VfpTranOp,
};
use subtilis_ir::{Operand, Section};

fn freg(ctx: &Ctx, operand: Operand) -> FReg {
    ctx.arm_freg(operand.freg())
}

fn imm_reg(ctx: &mut Ctx, value: f64) -> FReg {
    let tmp = ctx.arm.fresh_freg();
    ctx.arm.vfp_add_mov_imm(Cond::Al, tmp, value);
    tmp
}

fn fmstat(ctx: &mut Ctx) {
    ctx.arm.add_instr(Instr::VfpSysreg {
        op: VfpSysregOp::Fmstat,
        instr: VfpSysregInstr {
            ccode: Cond::Al,
            sysreg: VfpSysReg::Fpscr,
            arm_reg: subtilis_asm::Reg::PC,
        },
    });
}

pub(crate) fn gen_movr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let src = freg(ctx, i.operands[1]);
    ctx.arm.vfp_add_copy(Cond::Al, dest, src);
    Ok(())
}

pub(crate) fn gen_movir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    ctx.arm.vfp_add_mov_imm(Cond::Al, dest, i.operands[1].real());
    Ok(())
}

fn fix(ctx: &mut Ctx, s: &Section, start: usize, op: VfpTranOp) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let src = freg(ctx, i.operands[1]);
    let tmp = ctx.arm.fresh_freg();
    ctx.arm.add_instr(Instr::VfpTran {
        op,
        instr: VfpTranInstr {
            ccode: Cond::Al,
            dest: tmp,
            src,
        },
    });
    ctx.arm.add_instr(Instr::VfpCptran {
        op: VfpCptranOp::Fmrs,
        instr: VfpCptranInstr {
            ccode: Cond::Al,
            freg: tmp,
            reg: dest,
        },
    });
    Ok(())
}

/// Real to integer, truncating.
pub(crate) fn gen_movri32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    fix(ctx, s, start, VfpTranOp::Ftosizd)
}

/// Real to integer, rounding under the current mode.
pub(crate) fn gen_movrrdi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    fix(ctx, s, start, VfpTranOp::Ftosid)
}

pub(crate) fn gen_movi32r(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let src = ir_reg(i.operands[1]);
    let tmp = ctx.arm.fresh_freg();
    ctx.arm.add_instr(Instr::VfpCptran {
        op: VfpCptranOp::Fmsr,
        instr: VfpCptranInstr {
            ccode: Cond::Al,
            freg: tmp,
            reg: src,
        },
    });
    ctx.arm.add_instr(Instr::VfpTran {
        op: VfpTranOp::Fsitod,
        instr: VfpTranInstr {
            ccode: Cond::Al,
            dest,
            src: tmp,
        },
    });
    Ok(())
}

pub(crate) fn gen_callr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    gen_call_gen(ctx, s, start, BrLinkType::Real)?;
    let call = s.ops[start].call();
    let dest = ctx.arm_freg(call.reg);
    ctx.arm.vfp_add_copy(Cond::Al, dest, FReg(0));
    Ok(())
}

pub(crate) fn gen_retr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let src = freg(ctx, i.operands[0]);
    ctx.arm.vfp_add_copy(Cond::Al, FReg(0), src);
    gen_ret(ctx, s, start)
}

pub(crate) fn gen_retir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .vfp_add_mov_imm(Cond::Al, FReg(0), i.operands[0].real());
    gen_ret(ctx, s, start)
}

fn dyadic(ctx: &mut Ctx, s: &Section, start: usize, op: VfpDataOp) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let op1 = freg(ctx, i.operands[1]);
    let op2 = freg(ctx, i.operands[2]);
    ctx.arm.vfp_add_data(op, Cond::Al, dest, op1, op2);
    Ok(())
}

fn dyadic_imm(
    ctx: &mut Ctx,
    s: &Section,
    start: usize,
    op: VfpDataOp,
    reversed: bool,
) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let op1 = freg(ctx, i.operands[1]);
    let imm = imm_reg(ctx, i.operands[2].real());
    if reversed {
        ctx.arm.vfp_add_data(op, Cond::Al, dest, imm, op1);
    } else {
        ctx.arm.vfp_add_data(op, Cond::Al, dest, op1, imm);
    }
    Ok(())
}

pub(crate) fn gen_addr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic(ctx, s, start, VfpDataOp::Faddd)
}

pub(crate) fn gen_subr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic(ctx, s, start, VfpDataOp::Fsubd)
}

pub(crate) fn gen_mulr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic(ctx, s, start, VfpDataOp::Fmuld)
}

pub(crate) fn gen_divr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic(ctx, s, start, VfpDataOp::Fdivd)
}

pub(crate) fn gen_addir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic_imm(ctx, s, start, VfpDataOp::Faddd, false)
}

pub(crate) fn gen_subir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic_imm(ctx, s, start, VfpDataOp::Fsubd, false)
}

pub(crate) fn gen_rsubir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic_imm(ctx, s, start, VfpDataOp::Fsubd, true)
}

pub(crate) fn gen_mulir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic_imm(ctx, s, start, VfpDataOp::Fmuld, false)
}

pub(crate) fn gen_divir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic_imm(ctx, s, start, VfpDataOp::Fdivd, false)
}

pub(crate) fn gen_rdivir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    dyadic_imm(ctx, s, start, VfpDataOp::Fdivd, true)
}

pub(crate) fn gen_sqr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let op1 = freg(ctx, i.operands[1]);
    ctx.arm.add_instr(Instr::VfpSqrt(VfpSqrtInstr {
        ccode: Cond::Al,
        dest,
        op1,
    }));
    Ok(())
}

pub(crate) fn gen_absr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let src = freg(ctx, i.operands[1]);
    ctx.arm.add_instr(Instr::VfpCopy {
        op: VfpCopyOp::Fabsd,
        instr: VfpCopyInstr {
            ccode: Cond::Al,
            dest,
            src,
        },
    });
    Ok(())
}

macro_rules! no_vfp_handlers {
    ($(($name:ident, $what:literal)),* $(,)?) => {
        $(
            pub(crate) fn $name(_ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
                Err(Error::UnsupportedOnVariant($what))
            }
        )*
    };
}

no_vfp_handlers![
    (gen_sin, "SIN"),
    (gen_cos, "COS"),
    (gen_tan, "TAN"),
    (gen_asn, "ASN"),
    (gen_acs, "ACS"),
    (gen_atn, "ATN"),
    (gen_log, "LOG"),
    (gen_ln, "LN"),
    (gen_pow, "raising to a power"),
    (gen_exp, "EXP"),
];

pub(crate) fn gen_storeor(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let src = freg(ctx, i.operands[0]);
    let base = ir_reg(i.operands[1]);
    ctx.arm
        .vfp_add_stran_imm(VfpStranOp::Fstd, Cond::Al, src, base, i.operands[2].integer());
    Ok(())
}

pub(crate) fn gen_loador(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let base = ir_reg(i.operands[1]);
    ctx.arm
        .vfp_add_stran_imm(VfpStranOp::Fldd, Cond::Al, dest, base, i.operands[2].integer());
    Ok(())
}

fn cmp(ctx: &mut Ctx, op1: FReg, op2: Option<FReg>) {
    match op2 {
        Some(op2) => ctx.arm.vfp_add_cmp(VfpCmpOp::Fcmpd, Cond::Al, op1, Some(op2)),
        None => ctx.arm.vfp_add_cmp(VfpCmpOp::Fcmpzd, Cond::Al, op1, None),
    };
    fmstat(ctx);
}

fn cmp_jmp(ctx: &mut Ctx, s: &Section, start: usize, ccode: Cond) -> Result<()> {
    let c = s.ops[start].instr();
    let jmp = s.ops[start + 1].instr();
    let op1 = freg(ctx, c.operands[1]);
    let op2 = freg(ctx, c.operands[2]);
    cmp(ctx, op1, Some(op2));
    ctx.arm.add_branch(ccode, jmp.operands[2].label());
    Ok(())
}

fn cmp_jmp_imm(ctx: &mut Ctx, s: &Section, start: usize, ccode: Cond) -> Result<()> {
    let c = s.ops[start].instr();
    let jmp = s.ops[start + 1].instr();
    let op1 = freg(ctx, c.operands[1]);
    let value = c.operands[2].real();
    if value == 0.0 {
        cmp(ctx, op1, None);
    } else {
        let op2 = imm_reg(ctx, value);
        cmp(ctx, op1, Some(op2));
    }
    ctx.arm.add_branch(ccode, jmp.operands[2].label());
    Ok(())
}

macro_rules! cmp_jmp_handlers {
    ($(($name:ident, $imm_name:ident, $ccode:expr)),* $(,)?) => {
        $(
            pub(crate) fn $name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                cmp_jmp(ctx, s, start, $ccode)
            }
            pub(crate) fn $imm_name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                cmp_jmp_imm(ctx, s, start, $ccode)
            }
        )*
    };
}

cmp_jmp_handlers![
    (gen_if_lt, gen_if_lt_imm, Cond::Ge),
    (gen_if_lte, gen_if_lte_imm, Cond::Gt),
    (gen_if_gt, gen_if_gt_imm, Cond::Le),
    (gen_if_gte, gen_if_gte_imm, Cond::Lt),
    (gen_if_eq, gen_if_eq_imm, Cond::Ne),
    (gen_if_neq, gen_if_neq_imm, Cond::Eq),
];

fn cmp_set(ctx: &mut Ctx, s: &Section, start: usize, ok: Cond) -> Result<()> {
    let c = s.ops[start].instr();
    let op1 = freg(ctx, c.operands[1]);
    let op2 = freg(ctx, c.operands[2]);
    cmp(ctx, op1, Some(op2));
    let dest = ir_reg(c.operands[0]);
    ctx.arm.add_mov_imm(ok, false, dest, -1);
    ctx.arm.add_mov_imm(ok.invert(), false, dest, 0);
    Ok(())
}

fn cmp_set_imm(ctx: &mut Ctx, s: &Section, start: usize, ok: Cond) -> Result<()> {
    let c = s.ops[start].instr();
    let op1 = freg(ctx, c.operands[1]);
    let value = c.operands[2].real();
    if value == 0.0 {
        cmp(ctx, op1, None);
    } else {
        let op2 = imm_reg(ctx, value);
        cmp(ctx, op1, Some(op2));
    }
    let dest = ir_reg(c.operands[0]);
    ctx.arm.add_mov_imm(ok, false, dest, -1);
    ctx.arm.add_mov_imm(ok.invert(), false, dest, 0);
    Ok(())
}

macro_rules! cmp_set_handlers {
    ($(($name:ident, $imm_name:ident, $ccode:expr)),* $(,)?) => {
        $(
            pub(crate) fn $name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                cmp_set(ctx, s, start, $ccode)
            }
            pub(crate) fn $imm_name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                cmp_set_imm(ctx, s, start, $ccode)
            }
        )*
    };
}

cmp_set_handlers![
    (gen_gtr, gen_gtir, Cond::Gt),
    (gen_ltr, gen_ltir, Cond::Lt),
    (gen_gter, gen_gteir, Cond::Ge),
    (gen_lter, gen_lteir, Cond::Le),
    (gen_eqr, gen_eqir, Cond::Eq),
    (gen_neqr, gen_neqir, Cond::Ne),
];
