//! Signed 32-bit division for coprocessor-less ARMs.
//!
//! The classic nonrestoring algorithm: extract and fold the operand signs
//! with an `EOR ... ASR #32`, make both operands positive, then build the
//! quotient eight bits per round of reverse-subtract, conditional
//! subtract and add-with-carry.  Entry: r0 dividend, r1 divisor, r2
//! selects remainder over quotient, r3 holds the error flag offset, and
//! the error code offset sits in the last stack argument slot.  Result in
//! r0.  A zero divisor writes error 18 through the globals base.
//!
//! The `ASR #32` below is load bearing: it shifts the dividend's sign bit
//! out into the carry while the EOR folds it into the accumulated sign.

use crate::gen::Ctx;
use crate::Result;
use subtilis_ir::ERR_DIV_BY_ZERO;
use subtilis_asm::{
    Cond, DataInstr, DataOp, Instr, Op2, Reg, Shift, ShiftAmount, ShiftKind, StranInstr, StranOp,
};

const R: Reg = Reg(0);
const D: Reg = Reg(1);
const MOD: Reg = Reg(2);
const EFLAG: Reg = Reg(3);
const T: Reg = Reg(4);
const Q: Reg = Reg(5);
const SIGN: Reg = Reg(6);
const ERR: Reg = Reg(7);

fn data(
    ctx: &mut Ctx,
    op: DataOp,
    ccode: Cond,
    status: bool,
    dest: Reg,
    op1: Reg,
    op2: Op2,
) {
    ctx.arm.add_instr(Instr::Data {
        op,
        instr: DataInstr {
            ccode,
            status,
            dest,
            op1,
            op2,
        },
    });
}

fn shifted(reg: Reg, kind: ShiftKind, amount: i32) -> Op2 {
    Op2::Shifted(Shift {
        reg,
        kind,
        amount: ShiftAmount::Imm(amount),
    })
}

// RSBS t, d, r LSR #i / SUBCS r, r, d LSL #i / ADC q, q, q
fn rsa_group(ctx: &mut Ctx, i: i32) {
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, i));
    data(ctx, DataOp::Sub, Cond::Cs, false, R, R, shifted(D, ShiftKind::Lsl, i));
    data(ctx, DataOp::Adc, Cond::Al, false, Q, Q, Op2::Reg(Q));
}

fn store_err_code(ctx: &mut Ctx, offset_reg: Reg) {
    ctx.arm.add_instr(Instr::Stran {
        op: StranOp::Str,
        instr: StranInstr {
            ccode: Cond::Al,
            dest: Reg(0),
            base: Reg::GLOBAL,
            offset: Op2::Reg(offset_reg),
            pre_indexed: true,
            write_back: false,
            subtract: false,
        },
    });
}

pub(crate) fn add_idiv(ctx: &mut Ctx) -> Result<()> {
    let labels: Vec<usize> = (0..7).map(|_| ctx.arm.fresh_label()).collect();
    let (l0, l1, l2, l3, l4, l_div0, l_mod) = (
        labels[0], labels[1], labels[2], labels[3], labels[4], labels[5], labels[6],
    );

    // The error code offset arrives in the last stack argument slot.
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, ERR, Reg::SP, -4, false);

    data(ctx, DataOp::And, Cond::Al, true, SIGN, D, Op2::Imm(1 << 31));
    data(ctx, DataOp::Rsb, Cond::Mi, false, D, D, Op2::Imm(0));
    data(ctx, DataOp::Eor, Cond::Al, true, SIGN, SIGN, shifted(R, ShiftKind::Asr, 32));
    data(ctx, DataOp::Rsb, Cond::Cs, false, R, R, Op2::Imm(0));
    ctx.arm.add_mov_imm(Cond::Al, false, Q, 0);

    // Range probes: find roughly how many quotient bits the operands
    // need, skipping whole 8-bit rounds where possible.
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, 3));
    ctx.arm.add_branch(Cond::Cc, l3);
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, 8));
    ctx.arm.add_branch(Cond::Cc, l1);
    data(ctx, DataOp::Mov, Cond::Al, false, D, D, shifted(D, ShiftKind::Lsl, 8));
    ctx.arm.add_data_imm(DataOp::Orr, Cond::Al, false, Q, Q, 0xff000000u32 as i32);
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, 4));
    ctx.arm.add_branch(Cond::Cc, l2);
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, 8));
    ctx.arm.add_branch(Cond::Cc, l1);
    data(ctx, DataOp::Mov, Cond::Al, false, D, D, shifted(D, ShiftKind::Lsl, 8));
    ctx.arm.add_data_imm(DataOp::Orr, Cond::Al, false, Q, Q, 0x00ff0000);
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, 8));
    data(ctx, DataOp::Mov, Cond::Cs, false, D, D, shifted(D, ShiftKind::Lsl, 8));
    ctx.arm.add_data_imm(DataOp::Orr, Cond::Cs, false, Q, Q, 0x0000ff00);
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, shifted(R, ShiftKind::Lsr, 4));
    ctx.arm.add_branch(Cond::Cc, l2);
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, Op2::Imm(0));
    ctx.arm.add_branch(Cond::Cs, l_div0);

    ctx.arm.add_label(l0);
    data(ctx, DataOp::Mov, Cond::Cs, false, D, D, shifted(D, ShiftKind::Lsr, 8));
    ctx.arm.add_label(l1);
    for i in (4..=7).rev() {
        rsa_group(ctx, i);
    }
    ctx.arm.add_label(l2);
    rsa_group(ctx, 3);
    ctx.arm.add_label(l3);
    for i in (1..=2).rev() {
        rsa_group(ctx, i);
    }
    data(ctx, DataOp::Rsb, Cond::Al, true, T, D, Op2::Reg(R));
    data(ctx, DataOp::Sub, Cond::Cs, false, R, R, Op2::Reg(D));
    data(ctx, DataOp::Adc, Cond::Al, true, Q, Q, Op2::Reg(Q));
    ctx.arm.add_label(l4);
    ctx.arm.add_branch(Cond::Cs, l0);

    // Quotient or remainder, with the sign folded back in.  The sign
    // register holds the quotient sign in bit 31 and the remainder sign
    // in the carry after one shift.
    ctx.arm.add_cmp_imm(DataOp::Cmp, Cond::Al, MOD, 0);
    ctx.arm.add_branch(Cond::Ne, l_mod);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg(0), Q);
    data(ctx, DataOp::Mov, Cond::Al, true, SIGN, SIGN, shifted(SIGN, ShiftKind::Lsl, 1));
    data(ctx, DataOp::Rsb, Cond::Cs, false, Reg(0), Reg(0), Op2::Imm(0));
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);

    ctx.arm.add_label(l_mod);
    data(ctx, DataOp::Mov, Cond::Al, true, SIGN, SIGN, shifted(SIGN, ShiftKind::Lsl, 1));
    data(ctx, DataOp::Rsb, Cond::Cs, false, Reg(0), Reg(0), Op2::Imm(0));
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);

    ctx.arm.add_label(l_div0);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), ERR_DIV_BY_ZERO);
    store_err_code(ctx, ERR);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), -1);
    store_err_code(ctx, EFLAG);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::FpaBackend;
    use subtilis_asm::{ArmSection, FpKind, OpKind};
    use subtilis_ir::Settings;

    #[test]
    fn divide_keeps_the_full_width_shift() {
        let mut arm = ArmSection::new(0, 0, 0, 0, 4, 0, FpKind::Fpa);
        let settings = Settings::default();
        let mut ctx = Ctx {
            arm: &mut arm,
            fp: &FpaBackend,
            settings: &settings,
            error_offset: 0,
            eflag_offset: 4,
            no_cleanup_label: 0,
            start_address: 0x8000,
        };
        add_idiv(&mut ctx).unwrap();
        let mut asr32 = 0;
        for idx in arm.indices().collect::<Vec<_>>() {
            if let OpKind::Instr(Instr::Data { instr, .. }) = &arm.op(idx).kind {
                if let Op2::Shifted(s) = instr.op2 {
                    if s.kind == ShiftKind::Asr && s.amount == ShiftAmount::Imm(32) {
                        asr32 += 1;
                    }
                }
            }
        }
        assert_eq!(asr32, 1, "the sign fold must shift by 32, never 31");
    }

    #[test]
    fn divide_only_touches_scratch_registers() {
        let mut arm = ArmSection::new(0, 0, 0, 0, 4, 0, FpKind::Fpa);
        let settings = Settings::default();
        let mut ctx = Ctx {
            arm: &mut arm,
            fp: &FpaBackend,
            settings: &settings,
            error_offset: 0,
            eflag_offset: 4,
            no_cleanup_label: 0,
            start_address: 0x8000,
        };
        add_idiv(&mut ctx).unwrap();
        for idx in arm.indices().collect::<Vec<_>>() {
            if let OpKind::Instr(i) = &arm.op(idx).kind {
                i.visit_int_writes(|r| {
                    assert!(
                        r.0 <= 7 || r == Reg::PC,
                        "divide must stay within r0-r7: {r}"
                    );
                });
            }
        }
    }
}
