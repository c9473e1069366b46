//! FPA handlers for the real-typed rules.
//!
//! The FPA's compare instructions hand their result straight to the ARM
//! flags, so the fused compare-and-branch rules invert conditions exactly
//! like their integer counterparts.  Small constants use the immediate
//! operand forms; anything else is materialised through the constant
//! pool.

use super::{gen_call_gen, gen_ret, ir_reg, Ctx};
use crate::Result;
use subtilis_asm::{
    BrLinkType, Cond, FReg, FpaCmpOp, FpaDyadicOp, FpaImm, FpaMonadicOp, FpaOp2, FpaRounding,
    FpaStranOp,
};
use subtilis_ir::{Operand, Section};

const ROUND: FpaRounding = FpaRounding::Nearest;

fn freg(ctx: &Ctx, operand: Operand) -> FReg {
    ctx.arm_freg(operand.freg())
}

// A real immediate as an operand: directly when the FPA encodes it, via a
// fresh register otherwise.
fn imm_op2(ctx: &mut Ctx, value: f64) -> FpaOp2 {
    if let Some(imm) = FpaImm::from_value(value) {
        return FpaOp2::Imm(imm);
    }
    let tmp = ctx.arm.fresh_freg();
    ctx.arm.fpa_add_mov_imm(Cond::Al, ROUND, tmp, value);
    FpaOp2::Reg(tmp)
}

pub(crate) fn gen_movr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let src = freg(ctx, i.operands[1]);
    ctx.arm.fpa_add_mov(Cond::Al, ROUND, dest, src);
    Ok(())
}

pub(crate) fn gen_movir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    ctx.arm
        .fpa_add_mov_imm(Cond::Al, ROUND, dest, i.operands[1].real());
    Ok(())
}

/// Real to integer, truncating.
pub(crate) fn gen_movri32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let src = freg(ctx, i.operands[1]);
    ctx.arm.fpa_add_fix(Cond::Al, FpaRounding::Zero, dest, src);
    Ok(())
}

/// Real to integer, rounding to nearest.
pub(crate) fn gen_movrrdi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let src = freg(ctx, i.operands[1]);
    ctx.arm.fpa_add_fix(Cond::Al, ROUND, dest, src);
    Ok(())
}

pub(crate) fn gen_movi32r(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let src = ir_reg(i.operands[1]);
    ctx.arm.fpa_add_flt(Cond::Al, ROUND, dest, src);
    Ok(())
}

pub(crate) fn gen_callr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    gen_call_gen(ctx, s, start, BrLinkType::Real)?;
    let call = s.ops[start].call();
    let dest = ctx.arm_freg(call.reg);
    ctx.arm.fpa_add_mov(Cond::Al, ROUND, dest, FReg(0));
    Ok(())
}

pub(crate) fn gen_retr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let src = freg(ctx, i.operands[0]);
    ctx.arm.fpa_add_mov(Cond::Al, ROUND, FReg(0), src);
    gen_ret(ctx, s, start)
}

pub(crate) fn gen_retir(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .fpa_add_mov_imm(Cond::Al, ROUND, FReg(0), i.operands[0].real());
    gen_ret(ctx, s, start)
}

fn dyadic(ctx: &mut Ctx, s: &Section, start: usize, op: FpaDyadicOp) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let op1 = freg(ctx, i.operands[1]);
    let op2 = FpaOp2::Reg(freg(ctx, i.operands[2]));
    ctx.arm.fpa_add_dyadic(op, Cond::Al, ROUND, dest, op1, op2);
    Ok(())
}

fn dyadic_imm(ctx: &mut Ctx, s: &Section, start: usize, op: FpaDyadicOp) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let op1 = freg(ctx, i.operands[1]);
    let op2 = imm_op2(ctx, i.operands[2].real());
    ctx.arm.fpa_add_dyadic(op, Cond::Al, ROUND, dest, op1, op2);
    Ok(())
}

macro_rules! dyadic_handlers {
    ($(($name:ident, $op:expr)),* $(,)?) => {
        $(
            pub(crate) fn $name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                dyadic(ctx, s, start, $op)
            }
        )*
    };
}

macro_rules! dyadic_imm_handlers {
    ($(($name:ident, $op:expr)),* $(,)?) => {
        $(
            pub(crate) fn $name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                dyadic_imm(ctx, s, start, $op)
            }
        )*
    };
}

dyadic_handlers![
    (gen_addr, FpaDyadicOp::Adf),
    (gen_subr, FpaDyadicOp::Suf),
    (gen_mulr, FpaDyadicOp::Muf),
    (gen_divr, FpaDyadicOp::Dvf),
    (gen_pow, FpaDyadicOp::Pow),
];

dyadic_imm_handlers![
    (gen_addir, FpaDyadicOp::Adf),
    (gen_subir, FpaDyadicOp::Suf),
    (gen_rsubir, FpaDyadicOp::Rsf),
    (gen_mulir, FpaDyadicOp::Muf),
    (gen_divir, FpaDyadicOp::Dvf),
    (gen_rdivir, FpaDyadicOp::Rdf),
];

fn monadic(ctx: &mut Ctx, s: &Section, start: usize, op: FpaMonadicOp) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let src = FpaOp2::Reg(freg(ctx, i.operands[1]));
    ctx.arm.fpa_add_monadic(op, Cond::Al, ROUND, dest, src);
    Ok(())
}

macro_rules! monadic_handlers {
    ($(($name:ident, $op:expr)),* $(,)?) => {
        $(
            pub(crate) fn $name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                monadic(ctx, s, start, $op)
            }
        )*
    };
}

monadic_handlers![
    (gen_sin, FpaMonadicOp::Sin),
    (gen_cos, FpaMonadicOp::Cos),
    (gen_tan, FpaMonadicOp::Tan),
    (gen_asn, FpaMonadicOp::Asn),
    (gen_acs, FpaMonadicOp::Acs),
    (gen_atn, FpaMonadicOp::Atn),
    (gen_sqr, FpaMonadicOp::Sqt),
    (gen_log, FpaMonadicOp::Log),
    (gen_ln, FpaMonadicOp::Lgn),
    (gen_absr, FpaMonadicOp::Abs),
    (gen_exp, FpaMonadicOp::Exp),
];

pub(crate) fn gen_storeor(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let src = freg(ctx, i.operands[0]);
    let base = ir_reg(i.operands[1]);
    ctx.arm
        .fpa_add_stran_imm(FpaStranOp::Stf, Cond::Al, src, base, i.operands[2].integer());
    Ok(())
}

pub(crate) fn gen_loador(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = freg(ctx, i.operands[0]);
    let base = ir_reg(i.operands[1]);
    ctx.arm
        .fpa_add_stran_imm(FpaStranOp::Ldf, Cond::Al, dest, base, i.operands[2].integer());
    Ok(())
}

fn cmp_jmp(ctx: &mut Ctx, s: &Section, start: usize, ccode: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    let jmp = s.ops[start + 1].instr();
    let op1 = freg(ctx, cmp.operands[1]);
    let op2 = FpaOp2::Reg(freg(ctx, cmp.operands[2]));
    ctx.arm.fpa_add_cmp(FpaCmpOp::Cmf, Cond::Al, op1, op2);
    ctx.arm.add_branch(ccode, jmp.operands[2].label());
    Ok(())
}

fn cmp_jmp_imm(ctx: &mut Ctx, s: &Section, start: usize, ccode: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    let jmp = s.ops[start + 1].instr();
    let op1 = freg(ctx, cmp.operands[1]);
    let op2 = imm_op2(ctx, cmp.operands[2].real());
    ctx.arm.fpa_add_cmp(FpaCmpOp::Cmf, Cond::Al, op1, op2);
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
    let cmp = s.ops[start].instr();
    let op1 = freg(ctx, cmp.operands[1]);
    let op2 = FpaOp2::Reg(freg(ctx, cmp.operands[2]));
    ctx.arm.fpa_add_cmp(FpaCmpOp::Cmf, Cond::Al, op1, op2);
    let dest = ir_reg(cmp.operands[0]);
    ctx.arm.add_mov_imm(ok, false, dest, -1);
    ctx.arm.add_mov_imm(ok.invert(), false, dest, 0);
    Ok(())
}

fn cmp_set_imm(ctx: &mut Ctx, s: &Section, start: usize, ok: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    let op1 = freg(ctx, cmp.operands[1]);
    let op2 = imm_op2(ctx, cmp.operands[2].real());
    ctx.arm.fpa_add_cmp(FpaCmpOp::Cmf, Cond::Al, op1, op2);
    let dest = ir_reg(cmp.operands[0]);
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
