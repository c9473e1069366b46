//! The runtime heap.
//!
//! A single free list threaded through the unused blocks.  The word at
//! the heap base points at the first free block; each free block starts
//! with `[next, size]`.  Allocated blocks reuse the same two words as
//! `[refcount, size]`, and the program sees the address eight bytes in.
//! The first block spans the whole heap, which reaches from the end of
//! the code to the bottom of the stack.  There is no coalescing; BASIC
//! programs churn strings of a handful of sizes and first fit with exact
//! reuse behaves well.

use crate::gen::Ctx;
use crate::Result;
use subtilis_ir::ERR_OOM;
use subtilis_asm::{ArmSection, Cond, DataInstr, DataOp, Instr, Op2, Reg, StranOp};

/// Bytes the heap must at least have for the program to start.
pub const HEAP_MIN_SIZE: u32 = 8192;

/// Loads the heap base address from the image's second word.
pub fn load_heap_base(arm: &mut ArmSection, dest: Reg, start_address: u32) {
    arm.add_mov_imm(Cond::Al, false, dest, start_address as i32);
    arm.add_stran_imm(StranOp::Ldr, Cond::Al, dest, dest, 4, false);
}

/// Emits heap initialisation into the preamble.  On entry r1 is the heap
/// base and r3 the total heap size in bytes.
pub fn init(arm: &mut ArmSection) {
    let block = Reg(0);
    let scratch = Reg(2);
    // One free block covering everything after the base word.
    arm.add_add_imm(Cond::Al, false, block, Reg(1), 8);
    arm.add_stran_imm(StranOp::Str, Cond::Al, block, Reg(1), 0, false);
    arm.add_mov_imm(Cond::Al, false, scratch, 0);
    arm.add_stran_imm(StranOp::Str, Cond::Al, scratch, block, 0, false);
    arm.add_sub_imm(Cond::Al, false, scratch, Reg(3), 8);
    arm.add_stran_imm(StranOp::Str, Cond::Al, scratch, block, 4, false);
}

fn data(ctx: &mut Ctx, op: DataOp, ccode: Cond, dest: Reg, op1: Reg, op2: Op2) {
    ctx.arm.add_instr(Instr::Data {
        op,
        instr: DataInstr {
            ccode,
            status: false,
            dest,
            op1,
            op2,
        },
    });
}

fn load(ctx: &mut Ctx, dest: Reg, base: Reg, offset: i32) {
    ctx.arm.add_stran_imm(StranOp::Ldr, Cond::Al, dest, base, offset, false);
}

fn store(ctx: &mut Ctx, src: Reg, base: Reg, offset: i32) {
    ctx.arm.add_stran_imm(StranOp::Str, Cond::Al, src, base, offset, false);
}

// First-fit walk.  In: r0 heap base, r11 bytes wanted.  Out: r0 the
// claimed block, or a branch to `bad`.  Splits when the leftovers are
// big enough to be worth keeping.
fn alloc_walk(ctx: &mut Ctx, good: usize, bad: usize) {
    let base = Reg(0);
    let wanted = Reg::FP;
    let prev_cell = Reg(4);
    let cur = Reg(5);
    let size = Reg(6);
    let split = Reg(7);
    let next = Reg(8);

    let looptop = ctx.arm.fresh_label();
    let found = ctx.arm.fresh_label();
    let take_whole = ctx.arm.fresh_label();
    let claimed = ctx.arm.fresh_label();

    ctx.arm.add_mov_reg(Cond::Al, false, prev_cell, base);
    load(ctx, cur, base, 0);
    ctx.arm.add_label(looptop);
    ctx.arm.add_cmp_imm(DataOp::Cmp, Cond::Al, cur, 0);
    ctx.arm.add_branch(Cond::Eq, bad);
    load(ctx, size, cur, 4);
    ctx.arm.add_cmp(DataOp::Cmp, Cond::Al, size, wanted);
    ctx.arm.add_branch(Cond::Cs, found);
    ctx.arm.add_mov_reg(Cond::Al, false, prev_cell, cur);
    load(ctx, cur, cur, 0);
    ctx.arm.add_branch(Cond::Al, looptop);

    ctx.arm.add_label(found);
    data(ctx, DataOp::Sub, Cond::Al, size, size, Op2::Reg(wanted));
    ctx.arm.add_cmp_imm(DataOp::Cmp, Cond::Al, size, 16);
    ctx.arm.add_branch(Cond::Cc, take_whole);
    data(ctx, DataOp::Add, Cond::Al, split, cur, Op2::Reg(wanted));
    load(ctx, next, cur, 0);
    store(ctx, next, split, 0);
    store(ctx, size, split, 4);
    store(ctx, split, prev_cell, 0);
    // The claimed block keeps only what was asked for.
    store(ctx, wanted, cur, 4);
    ctx.arm.add_branch(Cond::Al, claimed);

    ctx.arm.add_label(take_whole);
    load(ctx, next, cur, 0);
    store(ctx, next, prev_cell, 0);

    ctx.arm.add_label(claimed);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg(0), cur);
    ctx.arm.add_branch(Cond::Al, good);
}

/// The allocation built-in: size wanted in r0, block or zero back in r0.
///
/// Two header words are added to the request: the reference count and
/// the recorded block size, which the block adjust operations read back.
pub(crate) fn add_alloc(ctx: &mut Ctx) -> Result<()> {
    let good = ctx.arm.fresh_label();
    let bad = ctx.arm.fresh_label();

    ctx.arm.add_add_imm(Cond::Al, false, Reg(1), Reg(0), 8);
    ctx.arm.add_add_imm(Cond::Al, false, Reg::FP, Reg(1), 8);
    load_heap_base(ctx.arm, Reg(0), ctx.start_address);
    alloc_walk(ctx, good, bad);

    ctx.arm.add_label(good);
    let scratch = Reg(2);
    ctx.arm.add_mov_imm(Cond::Al, false, scratch, 1);
    store(ctx, scratch, Reg(0), 0);
    store(ctx, Reg::FP, Reg(0), 4);
    ctx.arm.add_add_imm(Cond::Al, false, Reg(0), Reg(0), 8);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);

    ctx.arm.add_label(bad);
    ctx.sete(Cond::Al, ERR_OOM);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 0);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);
    Ok(())
}

/// The release built-in: pointer in r0.  Drops the reference count and
/// returns the block to the free list when it reaches zero.
pub(crate) fn add_deref(ctx: &mut Ctx) -> Result<()> {
    let out = ctx.arm.fresh_label();
    let block = Reg(2);
    let count = Reg(3);

    ctx.arm.add_sub_imm(Cond::Al, false, block, Reg(0), 8);
    load(ctx, count, block, 0);
    ctx.arm.add_instr(Instr::Data {
        op: DataOp::Sub,
        instr: DataInstr {
            ccode: Cond::Al,
            status: true,
            dest: count,
            op1: count,
            op2: Op2::Imm(1),
        },
    });
    store(ctx, count, block, 0);
    ctx.arm.add_branch(Cond::Ne, out);

    // Push the dead block onto the free list.
    load_heap_base(ctx.arm, Reg(0), ctx.start_address);
    load(ctx, count, Reg(0), 0);
    store(ctx, count, block, 0);
    store(ctx, block, Reg(0), 0);

    ctx.arm.add_label(out);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);
    Ok(())
}
