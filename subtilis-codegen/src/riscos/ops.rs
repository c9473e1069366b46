//! Handlers for the OS-facing rules: console and graphics output, escape
//! checkpoints, timers, keyboard, heap queries and the `SYS` statement.
//!
//! Everything here goes through `X`-form SWIs, so a failed call raises V
//! rather than aborting; graphics handlers then either ignore the fault
//! or route it into the error channel, per the settings.

use crate::gen::{ir_reg, Ctx};
use crate::riscos::swi::{self, ERROR_BIT};
use crate::{Error, Result};
use subtilis_asm::{Cond, DataOp, Op2, Reg, StranOp};
use subtilis_ir::{Section, ERR_ESCAPE, ERR_GRAPHICS};

const OS_WRITEC: u32 = 0x00;
const OS_NEWLINE: u32 = 0x03;
const OS_READC: u32 = 0x04;
const OS_BYTE: u32 = 0x06;
const OS_WORD: u32 = 0x07;
const OS_EXIT: u32 = 0x11;
const OS_READPOINT: u32 = 0x32;
const OS_CHANGEENVIRONMENT: u32 = 0x40;
const OS_PLOT: u32 = 0x45;
const OS_WRITEN: u32 = 0x46;
const OS_CONVERTHEX8: u32 = 0xd4;
const OS_CONVERTINTEGER4: u32 = 0xdc;
const VDU: u32 = 256;
const XBIT: u32 = ERROR_BIT as u32;

fn regs(mask: u32) -> subtilis_asm::RegSet {
    swi::mask_regs(mask)
}

/// `PRINT` of a counted string: address and length into r0/r1, then
/// OS_WriteN.
pub(crate) fn gen_printstr(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(0), ir_reg(i.operands[0]));
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(1), ir_reg(i.operands[1]));
    ctx.arm
        .add_swi(Cond::Al, OS_WRITEN + XBIT, regs(0x3), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_printnl(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    ctx.arm
        .add_swi(Cond::Al, OS_NEWLINE + XBIT, regs(0), regs(0));
    Ok(())
}

pub(crate) fn gen_modei32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(0), ir_reg(i.operands[0]));
    ctx.arm.add_swi(Cond::Al, VDU + 22 + XBIT, regs(0), regs(0));
    ctx.handle_graphics_error();
    ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_plot(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(0), ir_reg(i.operands[0]));
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(1), ir_reg(i.operands[1]));
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(2), ir_reg(i.operands[2]));
    ctx.arm
        .add_swi(Cond::Al, OS_PLOT + XBIT, regs(0x7), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

// VDU n followed by operand bytes written with OS_WriteC, each predicated
// on the previous call not having faulted.
fn vdu_with_bytes(ctx: &mut Ctx, code: u32, bytes: &[Reg]) {
    ctx.arm.add_swi(Cond::Al, VDU + code + XBIT, regs(0), regs(0));
    for &reg in bytes {
        ctx.arm.add_mov_reg(Cond::Vc, false, Reg(0), reg);
        ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
    }
}

pub(crate) fn gen_gcol(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let mode = ir_reg(i.operands[0]);
    let col = ir_reg(i.operands[1]);
    vdu_with_bytes(ctx, 18, &[mode, col]);
    ctx.handle_graphics_error();
    Ok(())
}

// TINT settings travel as a VDU 23,17 block: the action byte, the tint
// value, then padding to ten bytes.
fn tint_block(ctx: &mut Ctx, action: u32, value: Reg) {
    ctx.arm.add_swi(Cond::Vc, VDU + 23 + XBIT, regs(0), regs(0));
    ctx.arm.add_swi(Cond::Vc, VDU + 17 + XBIT, regs(0), regs(0));
    ctx.arm
        .add_swi(Cond::Vc, VDU + action + XBIT, regs(0), regs(0));
    ctx.arm.add_mov_reg(Cond::Vc, false, Reg(0), value);
    ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
    for _ in 0..6 {
        ctx.arm.add_swi(Cond::Vc, VDU + XBIT, regs(0), regs(0));
    }
}

pub(crate) fn gen_gcol_tint(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let mode = ir_reg(i.operands[0]);
    let col = ir_reg(i.operands[1]);
    let tint = ir_reg(i.operands[2]);
    vdu_with_bytes(ctx, 18, &[mode, col]);
    tint_block(ctx, 2, tint);
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_tcol(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    vdu_with_bytes(ctx, 17, &[ir_reg(i.operands[0])]);
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_tcol_tint(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    vdu_with_bytes(ctx, 17, &[ir_reg(i.operands[0])]);
    tint_block(ctx, 3, ir_reg(i.operands[1]));
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_palette(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_swi(Cond::Al, VDU + 19 + XBIT, regs(0), regs(0));
    ctx.arm
        .add_mov_reg(Cond::Vc, false, Reg(0), ir_reg(i.operands[0]));
    ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
    ctx.arm.add_swi(Cond::Vc, VDU + 16 + XBIT, regs(0), regs(0));
    for slot in 1..4 {
        ctx.arm
            .add_mov_reg(Cond::Vc, false, Reg(0), ir_reg(i.operands[slot]));
        ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
    }
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_origin(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_swi(Cond::Al, VDU + 29 + XBIT, regs(0), regs(0));
    for slot in 0..2 {
        let coord = ir_reg(i.operands[slot]);
        ctx.arm.add_mov_reg(Cond::Vc, false, Reg(0), coord);
        ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
        ctx.arm.add_instr(subtilis_asm::Instr::Data {
            op: DataOp::Mov,
            instr: subtilis_asm::DataInstr {
                ccode: Cond::Vc,
                status: false,
                dest: Reg(0),
                op1: Reg(0),
                op2: Op2::Shifted(subtilis_asm::Shift {
                    reg: coord,
                    kind: subtilis_asm::ShiftKind::Lsr,
                    amount: subtilis_asm::ShiftAmount::Imm(8),
                }),
            },
        });
        ctx.arm.add_swi(Cond::Vc, OS_WRITEC + XBIT, regs(0x1), regs(0));
    }
    ctx.handle_graphics_error();
    Ok(())
}

/// `TIME`: OS_Word 1 into a scratch block below the stack pointer.
pub(crate) fn gen_gettime(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    ctx.arm.add_sub_imm(Cond::Al, false, Reg(1), Reg::SP, 8);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 1);
    ctx.arm
        .add_swi(Cond::Al, OS_WORD + XBIT, regs(0x3), regs(0));
    ctx.sete(Cond::Vs, ERR_GRAPHICS);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Vc, dest, Reg(1), 0, false);
    Ok(())
}

pub(crate) fn gen_cls(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    ctx.arm.add_swi(Cond::Al, VDU + 12 + XBIT, regs(0), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_clg(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    ctx.arm.add_swi(Cond::Al, VDU + 16 + XBIT, regs(0), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

fn cursor(ctx: &mut Ctx, on: u32) {
    ctx.arm.add_swi(Cond::Al, VDU + 23 + XBIT, regs(0), regs(0));
    ctx.arm.add_swi(Cond::Vc, VDU + 1 + XBIT, regs(0), regs(0));
    ctx.arm.add_swi(Cond::Vc, VDU + on + XBIT, regs(0), regs(0));
    for _ in 0..7 {
        ctx.arm.add_swi(Cond::Vc, VDU + XBIT, regs(0), regs(0));
    }
}

pub(crate) fn gen_on(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    cursor(ctx, 1);
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_off(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    cursor(ctx, 0);
    ctx.handle_graphics_error();
    Ok(())
}

/// `WAIT`: OS_Byte 19, sync to the next vertical blank.
pub(crate) fn gen_wait(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 19);
    ctx.arm
        .add_swi(Cond::Al, OS_BYTE + XBIT, regs(0x1), regs(0x6));
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_get(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_swi(Cond::Al, OS_READC + XBIT, regs(0), regs(0x1));
    ctx.sete(Cond::Vs, subtilis_ir::ERR_BAD_INPUT);
    ctx.arm
        .add_mov_reg(Cond::Vc, false, ir_reg(i.operands[0]), Reg(0));
    Ok(())
}

/// `GET(t)`: a timed read through OS_Byte 129.
pub(crate) fn gen_get_to(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let timeout = ir_reg(i.operands[1]);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 129);
    ctx.arm.add_instr(subtilis_asm::Instr::Data {
        op: DataOp::And,
        instr: subtilis_asm::DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg(1),
            op1: timeout,
            op2: Op2::Imm(0xff),
        },
    });
    ctx.arm.add_instr(subtilis_asm::Instr::Data {
        op: DataOp::Mov,
        instr: subtilis_asm::DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg(2),
            op1: Reg(2),
            op2: Op2::Shifted(subtilis_asm::Shift {
                reg: timeout,
                kind: subtilis_asm::ShiftKind::Lsr,
                amount: subtilis_asm::ShiftAmount::Imm(8),
            }),
        },
    });
    ctx.arm
        .add_swi(Cond::Al, OS_BYTE + XBIT, regs(0x7), regs(0x6));
    ctx.sete(Cond::Vs, subtilis_ir::ERR_BAD_INPUT);
    ctx.arm
        .add_mov_reg(Cond::Vc, false, ir_reg(i.operands[0]), Reg(1));
    Ok(())
}

/// `INKEY(k)` through OS_Byte 129.
pub(crate) fn gen_inkey(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 129);
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(1), ir_reg(i.operands[1]));
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(2), 0xff);
    ctx.arm
        .add_swi(Cond::Al, OS_BYTE + XBIT, regs(0x7), regs(0x6));
    ctx.sete(Cond::Vs, subtilis_ir::ERR_BAD_INPUT);
    ctx.arm
        .add_mov_reg(Cond::Vc, false, ir_reg(i.operands[0]), Reg(1));
    Ok(())
}

/// OS identity byte, OS_Byte 0,1.
pub(crate) fn gen_os_byte_id(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 0);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(1), 1);
    ctx.arm
        .add_swi(Cond::Al, OS_BYTE + XBIT, regs(0x3), regs(0x6));
    ctx.sete(Cond::Vs, subtilis_ir::ERR_BAD_OS_ID);
    ctx.arm
        .add_mov_reg(Cond::Vc, false, ir_reg(i.operands[0]), Reg(1));
    Ok(())
}

pub(crate) fn gen_vdui(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let byte = i.operands[0].integer() as u32 & 0xff;
    ctx.arm.add_swi(Cond::Al, VDU + byte + XBIT, regs(0), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

pub(crate) fn gen_vdu(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(0), ir_reg(i.operands[0]));
    ctx.arm
        .add_swi(Cond::Al, OS_WRITEC + XBIT, regs(0x1), regs(0));
    ctx.handle_graphics_error();
    Ok(())
}

fn read_point(ctx: &mut Ctx, s: &Section, start: usize, result: Reg) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(0), ir_reg(i.operands[1]));
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(1), ir_reg(i.operands[2]));
    ctx.arm
        .add_swi(Cond::Al, OS_READPOINT + XBIT, regs(0x3), regs(0x1c));
    ctx.sete(Cond::Vs, ERR_GRAPHICS);
    ctx.arm
        .add_mov_reg(Cond::Vc, false, ir_reg(i.operands[0]), result);
    Ok(())
}

pub(crate) fn gen_point(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    read_point(ctx, s, start, Reg(2))
}

pub(crate) fn gen_tint(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    read_point(ctx, s, start, Reg(3))
}

pub(crate) fn gen_at(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    vdu_with_bytes(ctx, 31, &[ir_reg(i.operands[0]), ir_reg(i.operands[1])]);
    ctx.handle_graphics_error();
    Ok(())
}

fn text_pos(ctx: &mut Ctx, s: &Section, start: usize, result: Reg) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 134);
    ctx.arm
        .add_swi(Cond::Al, OS_BYTE + XBIT, regs(0x1), regs(0x6));
    ctx.sete(Cond::Vs, ERR_GRAPHICS);
    ctx.arm
        .add_mov_reg(Cond::Vc, false, ir_reg(i.operands[0]), result);
    Ok(())
}

pub(crate) fn gen_pos(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    text_pos(ctx, s, start, Reg(1))
}

pub(crate) fn gen_vpos(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    text_pos(ctx, s, start, Reg(2))
}

/// `END`: tear down the escape handler, then leave through OS_Exit with
/// the "ABEX" magic.  Also the target of the preamble's branch when there
/// is not enough memory to run at all.
pub(crate) fn gen_end(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    if ctx.settings.handle_escapes {
        remove_escape_handler(ctx);
    }
    let no_cleanup = ctx.no_cleanup_label;
    ctx.arm.add_label(no_cleanup);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 0);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(1), 0x58454241u32 as i32);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(2), 0);
    ctx.arm.add_swi(Cond::Al, OS_EXIT, regs(0x7), regs(0));
    Ok(())
}

pub(crate) fn remove_escape_handler(ctx: &mut Ctx) {
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 9);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, Reg(1), Reg::GLOBAL, -8, false);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, Reg(2), Reg::GLOBAL, -12, false);
    ctx.arm
        .add_swi(Cond::Al, OS_CHANGEENVIRONMENT, regs(0x7), regs(0xe));
}

/// An escape checkpoint: if the handler has flagged a pending escape,
/// clear it, acknowledge it with OS_Byte 124 and raise error 17.
pub(crate) fn gen_testesc(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    if !ctx.settings.handle_escapes {
        return Ok(());
    }
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, Reg(0), Reg::GLOBAL, -4, false);
    ctx.arm.add_cmp_imm(DataOp::Teq, Cond::Al, Reg(0), 0);
    let skip = ctx.arm.fresh_label();
    ctx.arm.add_branch(Cond::Eq, skip);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 0);
    ctx.arm
        .add_stran_imm(StranOp::Str, Cond::Al, Reg(0), Reg::GLOBAL, -4, false);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 124);
    ctx.arm
        .add_swi(Cond::Al, OS_BYTE + XBIT, regs(0x1), regs(0x6));
    ctx.sete(Cond::Al, ERR_ESCAPE);
    ctx.arm.add_label(skip);
    Ok(())
}

/// `ref`: bump the block's reference count, kept just below the pointer
/// the program sees.
pub(crate) fn gen_ref(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let block = ir_reg(i.operands[0]);
    let count = ctx.arm.fresh_reg();
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, count, block, -8, false);
    ctx.arm.add_add_imm(Cond::Al, false, count, count, 1);
    ctx.arm
        .add_stran_imm(StranOp::Str, Cond::Al, count, block, -8, false);
    Ok(())
}

pub(crate) fn gen_getref(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let count = ir_reg(i.operands[0]);
    let ptr = ir_reg(i.operands[1]);
    let block = ctx.arm.fresh_reg();
    ctx.arm.add_sub_imm(Cond::Al, false, block, ptr, 8);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, count, block, 0, false);
    Ok(())
}

fn convert(ctx: &mut Ctx, s: &Section, start: usize, call: u32, buf_len: i32) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let val = ir_reg(i.operands[1]);
    let buffer = ir_reg(i.operands[2]);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg(0), val);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg(1), buffer);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(2), buf_len);
    ctx.arm.add_swi(Cond::Al, call, regs(0x7), regs(0x7));
    // r2 counts down as the conversion fills the buffer; the difference
    // is the string length.
    ctx.arm.add_rsub_imm(Cond::Al, false, dest, Reg(2), buf_len);
    Ok(())
}

pub(crate) fn gen_i32_to_dec(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    convert(ctx, s, start, OS_CONVERTINTEGER4, 12)
}

pub(crate) fn gen_i32_to_hex(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    convert(ctx, s, start, OS_CONVERTHEX8, 11)
}

/// Total bytes on the free list.
pub(crate) fn gen_heap_free_space(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let base = ctx.arm.fresh_reg();
    let cur = ctx.arm.fresh_reg();
    let acc = ctx.arm.fresh_reg();
    let size = ctx.arm.fresh_reg();
    crate::builtins::heap::load_heap_base(ctx.arm, base, ctx.start_address);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, cur, base, 0, false);
    ctx.arm.add_mov_imm(Cond::Al, false, acc, 0);
    let loop_label = ctx.arm.fresh_label();
    let done = ctx.arm.fresh_label();
    ctx.arm.add_label(loop_label);
    ctx.arm.add_cmp_imm(DataOp::Cmp, Cond::Al, cur, 0);
    ctx.arm.add_branch(Cond::Eq, done);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, size, cur, 4, false);
    ctx.arm.add_instr(subtilis_asm::Instr::Data {
        op: DataOp::Add,
        instr: subtilis_asm::DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: acc,
            op1: acc,
            op2: Op2::Reg(size),
        },
    });
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, cur, cur, 0, false);
    ctx.arm.add_branch(Cond::Al, loop_label);
    ctx.arm.add_label(done);
    ctx.arm.add_mov_reg(Cond::Al, false, dest, acc);
    Ok(())
}

/// Bytes still usable in one allocated block.
pub(crate) fn gen_block_free_space(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let ptr = ir_reg(i.operands[1]);
    let size = ctx.arm.fresh_reg();
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, size, ptr, -4, false);
    ctx.arm.add_sub_imm(Cond::Al, false, dest, size, 16);
    Ok(())
}

/// Rewrites a block's recorded size after the program shrinks it.
pub(crate) fn gen_block_adjust(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let ptr = ir_reg(i.operands[0]);
    let size = ir_reg(i.operands[1]);
    let actual = ctx.arm.fresh_reg();
    ctx.arm.add_add_imm(Cond::Al, false, actual, size, 16);
    ctx.arm
        .add_stran_imm(StranOp::Str, Cond::Al, actual, ptr, -4, false);
    Ok(())
}

/// The `SYS` statement.
pub(crate) fn gen_syscall(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let sys_call = s.ops[start].sys_call();
    let swi = swi::sys_check(sys_call.call_id).ok_or(Error::UnknownSysCall(sys_call.call_id))?;

    let mut in_mask = 0u32;
    for (slot, operand) in &sys_call.in_regs {
        if *slot > 10 {
            return Err(Error::Assertion("SWI input register out of range"));
        }
        in_mask |= 1 << slot;
        ctx.arm
            .add_mov_reg(Cond::Al, false, Reg(*slot), ir_reg(*operand));
    }

    ctx.arm.add_swi(
        Cond::Al,
        sys_call.call_id as u32,
        regs(in_mask),
        regs(swi.out_mask),
    );

    let mut ccode = Cond::Al;
    if sys_call.call_id & ERROR_BIT != 0 && sys_call.flags_reg.is_none() {
        // The error block address comes back in r0; its first word is
        // the error number.
        ctx.arm
            .add_stran_imm(StranOp::Ldr, Cond::Vs, Reg(0), Reg(0), 0, false);
        ctx.sete_reg(Cond::Vs);
        ccode = Cond::Vc;
    }

    for (slot, ir) in &sys_call.out_regs {
        if *slot > 10 {
            return Err(Error::Assertion("SWI output register out of range"));
        }
        ctx.arm
            .add_mov_reg(ccode, false, Reg::from_ir(*ir), Reg(*slot));
    }

    if let Some(flags_reg) = sys_call.flags_reg {
        let flags = if sys_call.flags_local {
            Reg::from_ir(flags_reg)
        } else {
            ctx.arm.fresh_reg()
        };
        ctx.arm.add_mov_imm(Cond::Al, false, flags, 0xf0000000u32 as i32);
        ctx.arm.add_instr(subtilis_asm::Instr::Data {
            op: DataOp::And,
            instr: subtilis_asm::DataInstr {
                ccode: Cond::Al,
                status: false,
                dest: flags,
                op1: flags,
                op2: Op2::Reg(Reg::PC),
            },
        });
        if !sys_call.flags_local {
            ctx.arm.add_stran_imm(
                StranOp::Str,
                Cond::Al,
                flags,
                Reg::from_ir(flags_reg),
                0,
                false,
            );
        }
    }
    Ok(())
}
