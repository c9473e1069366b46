//! Block memory and string built-ins.
//!
//! Word loops with post-indexed transfers; the counters count down and
//! the carry from `SUBS` is the loop condition.  Arguments follow the
//! normal convention; the scratch registers stay within the caller-saved
//! range so the generic call protocol covers them.

use crate::gen::Ctx;
use crate::Result;
use subtilis_asm::{
    Cond, DataInstr, DataOp, Instr, Op2, Reg, StranInstr, StranOp,
};

fn post_indexed(ctx: &mut Ctx, op: StranOp, dest: Reg, base: Reg, step: u32) {
    ctx.arm.add_instr(Instr::Stran {
        op,
        instr: StranInstr {
            ccode: Cond::Al,
            dest,
            base,
            offset: Op2::Imm(step),
            pre_indexed: false,
            write_back: false,
            subtract: false,
        },
    });
}

fn subs_imm(ctx: &mut Ctx, reg: Reg, imm: u32) {
    ctx.arm.add_instr(Instr::Data {
        op: DataOp::Sub,
        instr: DataInstr {
            ccode: Cond::Al,
            status: true,
            dest: reg,
            op1: reg,
            op2: Op2::Imm(imm),
        },
    });
}

fn ret(ctx: &mut Ctx) {
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);
}

/// `memseti32(ptr r0, bytes r1, value r2)`.
pub(crate) fn add_memseti32(ctx: &mut Ctx) -> Result<()> {
    let looptop = ctx.arm.fresh_label();
    let test = ctx.arm.fresh_label();
    ctx.arm.add_branch(Cond::Al, test);
    ctx.arm.add_label(looptop);
    post_indexed(ctx, StranOp::Str, Reg(2), Reg(0), 4);
    ctx.arm.add_label(test);
    subs_imm(ctx, Reg(1), 4);
    ctx.arm.add_branch(Cond::Cs, looptop);
    ret(ctx);
    Ok(())
}

/// `memseti8(ptr r0, bytes r1, value r2)`.
pub(crate) fn add_memseti8(ctx: &mut Ctx) -> Result<()> {
    let looptop = ctx.arm.fresh_label();
    let test = ctx.arm.fresh_label();
    ctx.arm.add_branch(Cond::Al, test);
    ctx.arm.add_label(looptop);
    post_indexed(ctx, StranOp::Strb, Reg(2), Reg(0), 1);
    ctx.arm.add_label(test);
    subs_imm(ctx, Reg(1), 1);
    ctx.arm.add_branch(Cond::Cs, looptop);
    ret(ctx);
    Ok(())
}

/// `memcpy(dst r0, src r1, bytes r2)`, word aligned.
pub(crate) fn add_memcpy(ctx: &mut Ctx) -> Result<()> {
    let looptop = ctx.arm.fresh_label();
    let test = ctx.arm.fresh_label();
    ctx.arm.add_branch(Cond::Al, test);
    ctx.arm.add_label(looptop);
    post_indexed(ctx, StranOp::Ldr, Reg(3), Reg(1), 4);
    post_indexed(ctx, StranOp::Str, Reg(3), Reg(0), 4);
    ctx.arm.add_label(test);
    subs_imm(ctx, Reg(2), 4);
    ctx.arm.add_branch(Cond::Cs, looptop);
    ret(ctx);
    Ok(())
}

/// `memcmp(a r0, b r1, bytes r2)`, word aligned.  Returns zero in r0
/// when equal, the difference of the first mismatching words otherwise.
pub(crate) fn add_memcmp(ctx: &mut Ctx) -> Result<()> {
    let looptop = ctx.arm.fresh_label();
    let test = ctx.arm.fresh_label();
    let diff = ctx.arm.fresh_label();
    ctx.arm.add_branch(Cond::Al, test);
    ctx.arm.add_label(looptop);
    post_indexed(ctx, StranOp::Ldr, Reg(3), Reg(0), 4);
    post_indexed(ctx, StranOp::Ldr, Reg(4), Reg(1), 4);
    ctx.arm.add_cmp(DataOp::Cmp, Cond::Al, Reg(3), Reg(4));
    ctx.arm.add_branch(Cond::Ne, diff);
    ctx.arm.add_label(test);
    subs_imm(ctx, Reg(2), 4);
    ctx.arm.add_branch(Cond::Cs, looptop);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 0);
    ret(ctx);
    ctx.arm.add_label(diff);
    ctx.arm.add_instr(Instr::Data {
        op: DataOp::Sub,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg(0),
            op1: Reg(3),
            op2: Op2::Reg(Reg(4)),
        },
    });
    ret(ctx);
    Ok(())
}

/// `compare(a r0, alen r1, b r2, blen r3)`: lexicographic byte compare,
/// -1/0/1 in r0.  Shorter strings order before their extensions.
pub(crate) fn add_strcmp(ctx: &mut Ctx) -> Result<()> {
    let looptop = ctx.arm.fresh_label();
    let test = ctx.arm.fresh_label();
    let diff = ctx.arm.fresh_label();

    // r4 = min(alen, blen)
    ctx.arm.add_cmp(DataOp::Cmp, Cond::Al, Reg(1), Reg(3));
    ctx.arm.add_mov_reg(Cond::Lt, false, Reg(4), Reg(1));
    ctx.arm.add_mov_reg(Cond::Ge, false, Reg(4), Reg(3));
    ctx.arm.add_branch(Cond::Al, test);
    ctx.arm.add_label(looptop);
    post_indexed(ctx, StranOp::Ldrb, Reg(5), Reg(0), 1);
    post_indexed(ctx, StranOp::Ldrb, Reg(6), Reg(2), 1);
    ctx.arm.add_cmp(DataOp::Cmp, Cond::Al, Reg(5), Reg(6));
    ctx.arm.add_branch(Cond::Ne, diff);
    ctx.arm.add_label(test);
    subs_imm(ctx, Reg(4), 1);
    ctx.arm.add_branch(Cond::Cs, looptop);

    // Common prefix identical; the lengths decide.
    ctx.arm.add_cmp(DataOp::Cmp, Cond::Al, Reg(1), Reg(3));
    ctx.arm.add_mov_imm(Cond::Eq, false, Reg(0), 0);
    ctx.arm.add_mov_imm(Cond::Lt, false, Reg(0), -1);
    ctx.arm.add_mov_imm(Cond::Gt, false, Reg(0), 1);
    ret(ctx);

    ctx.arm.add_label(diff);
    ctx.arm.add_mov_imm(Cond::Cc, false, Reg(0), -1);
    ctx.arm.add_mov_imm(Cond::Hi, false, Reg(0), 1);
    ret(ctx);
    Ok(())
}
