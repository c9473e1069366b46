//! The RISC OS back end driver.
//!
//! Owns the whole pipeline: build the rule table, emit the runtime
//! preamble into the entry section, lower every IR section through the
//! matcher or the built-in generators, then run analysis, allocation,
//! frame patching, call-site fixup and the peephole over each.  The
//! result still needs [`crate::encode_program`] to become an image.

pub mod ops;
pub mod swi;

use crate::builtins::{self, heap};
use crate::fixup;
use crate::fp::FpBackend;
use crate::gen::{self, Ctx};
use crate::peephole::peephole;
use crate::sub_section::SubSections;
use crate::{alloc, Error, Result};
use std::collections::HashMap;
use subtilis_asm::{
    encode_nearest, AdrInstr, ArmProgram, ArmSection, Cond, DataInstr, DataOp, Directive, Instr,
    Op2, OpIdx, OpKind, Reg, StranInstr, StranOp,
};
use subtilis_ir::{Program, Section, SectionKind, Settings};
use tracing::debug;

/// Default load and entry address of a RISC OS application.
pub const DEFAULT_START_ADDRESS: u32 = 0x8000;

/// Stack bytes reserved below the globals area.
const STACK_SIZE: u32 = 8192;

/// Lowers `prog` to an ARM program.  `globals` is the size in bytes of
/// the statically allocated data the globals base points at;
/// `asm_sections` carries any inline assembly bodies keyed by section
/// index, which are adopted untouched.
pub fn generate(
    prog: &Program,
    globals: u32,
    fp: &dyn FpBackend,
    start_address: u32,
    mut asm_sections: HashMap<usize, ArmSection>,
) -> Result<ArmProgram> {
    let rules = gen::rules(fp.kind());
    let mut arm_prog = ArmProgram::new(start_address, fp.kind());
    arm_prog.strings = prog.string_pool.iter().map(<[u8]>::to_vec).collect();
    arm_prog.constant_data = prog.constant_pool.iter().map(<[u8]>::to_vec).collect();

    for (index, section) in prog.sections.iter().enumerate() {
        if section.kind == SectionKind::Asm {
            let body = asm_sections
                .remove(&index)
                .ok_or(Error::Assertion("inline assembly body missing"))?;
            arm_prog.append_section(body);
            continue;
        }

        let mut arm = ArmSection::new(
            section.reg_counter,
            section.freg_counter,
            section.label_counter,
            section.locals,
            section.sig.int_args,
            section.sig.real_args,
            fp.kind(),
        );
        let no_cleanup_label = arm.fresh_label();
        let mut ctx = Ctx {
            arm: &mut arm,
            fp,
            settings: &prog.settings,
            error_offset: section.error_offset,
            eflag_offset: section.eflag_offset,
            no_cleanup_label,
            start_address,
        };

        if index == 0 {
            add_preamble(&mut ctx, globals, &prog.settings)?;
        }
        match &section.kind {
            SectionKind::Builtin(_) => builtins::add_builtin(&mut ctx, section)?,
            SectionKind::User => add_section(&mut ctx, section, &rules, fp)?,
            SectionKind::Asm => unreachable!(),
        }
        arm_prog.append_section(arm);
    }
    Ok(arm_prog)
}

/// Lowers one user section and runs every per-section pass over it.
fn add_section<B: FpBackend + ?Sized>(
    ctx: &mut Ctx,
    section: &Section,
    rules: &[subtilis_ir::Rule<gen::GenFn>],
    fp: &B,
) -> Result<()> {
    // Arguments beyond the register quota wait just below the entry
    // stack pointer; pull them into their virtual registers while sp
    // still points there.  Integer slots sit closest, real slots after
    // them, mirroring the caller's store order.
    let int_stack_args = section.sig.int_args.saturating_sub(crate::fp::INT_ARG_REGS);
    for (k, arg) in (crate::fp::INT_ARG_REGS..section.sig.int_args).rev().enumerate() {
        ctx.arm.add_instr(Instr::Stran {
            op: StranOp::Ldr,
            instr: StranInstr {
                ccode: Cond::Al,
                dest: Reg::from_ir(arg),
                base: Reg::SP,
                offset: Op2::Imm(4 * (k as u32 + 1)),
                pre_indexed: true,
                write_back: false,
                subtract: true,
            },
        });
    }
    for (k, arg) in (crate::fp::REAL_ARG_REGS..section.sig.real_args).rev().enumerate() {
        let offset = 4 * int_stack_args as i32 + 8 * (k as i32 + 1);
        let dest = fp.kind().freg_from_ir(arg);
        fp.load_arg(ctx.arm, dest, offset);
    }

    let frame_sub = ctx.arm.add_instr(Instr::Data {
        op: DataOp::Sub,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg::SP,
            op1: Reg::SP,
            op2: Op2::Imm(0),
        },
    });
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::FP, Reg::SP);
    zero_locals(ctx.arm, section.locals);

    subtilis_ir::match_section(section, rules, |action, pos| action(ctx, section, pos))?;

    run_passes(ctx.arm, fp, frame_sub, section.locals)
}

fn run_passes<B: FpBackend + ?Sized>(
    arm: &mut ArmSection,
    fp: &B,
    frame_sub: OpIdx,
    locals: u32,
) -> Result<()> {
    let sss = SubSections::calculate(arm)?;
    let spill = alloc::allocate(arm, &sss, fp)?;
    let frame = spill + locals;
    let frame = encode_nearest(frame).ok_or(Error::FrameTooBig(frame))?;
    debug!(spill, frame, "section allocated");
    fixup::patch_frames(arm, frame_sub, frame)?;
    fixup::save_regs(arm, fp)?;
    peephole(arm)
}

// Small areas get straight-line stores, larger ones a write-back loop
// walking down from the top of the area.
fn zero_locals(arm: &mut ArmSection, locals: u32) {
    if locals == 0 {
        return;
    }
    let zero = arm.fresh_reg();
    arm.add_mov_imm(Cond::Al, false, zero, 0);
    if locals <= 16 {
        for off in (0..locals).step_by(4) {
            arm.add_stran_imm(StranOp::Str, Cond::Al, zero, Reg::FP, off as i32, false);
        }
        return;
    }
    let ptr = arm.fresh_reg();
    arm.add_add_imm(Cond::Al, false, ptr, Reg::FP, locals as i32);
    let looptop = arm.fresh_label();
    arm.add_label(looptop);
    arm.add_instr(Instr::Stran {
        op: StranOp::Str,
        instr: StranInstr {
            ccode: Cond::Al,
            dest: zero,
            base: ptr,
            offset: Op2::Imm(4),
            pre_indexed: true,
            write_back: true,
            subtract: true,
        },
    });
    arm.add_cmp(DataOp::Cmp, Cond::Al, ptr, Reg::FP);
    arm.add_branch(Cond::Ne, looptop);
}

/// The runtime preamble of the entry section: the heap base word, the
/// memory check, globals and stack setup, the escape handler, heap
/// initialisation and the FP unit setup.  See the memory map: globals at
/// the top under the OS-supplied limit, stack below them, heap growing
/// up from the end of the code.
fn add_preamble(ctx: &mut Ctx, globals: u32, settings: &Settings) -> Result<()> {
    let mut needed = globals + STACK_SIZE + heap::HEAP_MIN_SIZE;
    if settings.handle_escapes {
        needed += 12;
    }

    // The word after the entry point holds the heap base; execution hops
    // over it.
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::PC);
    ctx.arm.append(OpKind::Directive(Directive::Word(0)));

    // OS_GetEnv: r1 is the top of our memory.
    ctx.arm
        .add_swi(Cond::Al, 0x10, swi::mask_regs(0), swi::mask_regs(0x7));

    // r11 holds the heap base, read from the image's second word.
    ctx.arm
        .add_mov_imm(Cond::Al, false, Reg(10), ctx.start_address as i32);
    ctx.arm
        .add_stran_imm(StranOp::Ldr, Cond::Al, Reg(11), Reg(10), 4, false);
    // Everything must fit: code, globals, handler block, stack and a
    // minimum of heap.
    ctx.arm
        .add_add_imm(Cond::Al, false, Reg::GLOBAL, Reg(11), needed as i32);
    ctx.arm.add_cmp(DataOp::Cmp, Cond::Al, Reg::GLOBAL, Reg(1));
    ctx.arm.add_branch(Cond::Gt, ctx.no_cleanup_label);

    ctx.arm
        .add_sub_imm(Cond::Al, false, Reg::GLOBAL, Reg(1), globals as i32);

    if settings.handle_escapes {
        // Three words under the globals: escape flag, old handler, old
        // handler workspace.
        ctx.arm.add_sub_imm(Cond::Al, false, Reg::SP, Reg::GLOBAL, 12);
        ctx.arm.add_mov_imm(Cond::Al, false, Reg(1), 0);
        ctx.arm
            .add_stran_imm(StranOp::Str, Cond::Al, Reg(1), Reg::GLOBAL, -4, false);
        add_escape_handler(ctx);
    } else {
        ctx.arm.add_mov_reg(Cond::Al, false, Reg::SP, Reg::GLOBAL);
    }

    // Heap: from the end of the code to the bottom of the stack.
    ctx.arm.add_mov_reg(Cond::Al, false, Reg(1), Reg(11));
    ctx.arm
        .add_sub_imm(Cond::Al, false, Reg(3), Reg::SP, STACK_SIZE as i32);
    ctx.arm.add_instr(Instr::Data {
        op: DataOp::Sub,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg(3),
            op1: Reg(3),
            op2: Op2::Reg(Reg(1)),
        },
    });
    heap::init(ctx.arm);

    ctx.fp.preamble(ctx.arm);
    Ok(())
}

// Installs the escape handler through OS_ChangeEnvironment and stashes
// the old one for the coda.  The handler itself sits inline, jumped
// over; it runs in IRQ context and may only set the flag.
fn add_escape_handler(ctx: &mut Ctx) {
    let handler = ctx.arm.fresh_label();
    let skip = ctx.arm.fresh_label();

    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 9);
    ctx.arm.add_instr(Instr::Adr(AdrInstr {
        ccode: Cond::Al,
        dest: Reg(1),
        label: handler,
    }));
    ctx.arm.add_mov_reg(Cond::Al, false, Reg(2), Reg::GLOBAL);
    ctx.arm
        .add_swi(Cond::Al, 0x40, swi::mask_regs(0x7), swi::mask_regs(0xe));
    ctx.arm
        .add_stran_imm(StranOp::Str, Cond::Al, Reg(1), Reg::GLOBAL, -8, false);
    ctx.arm
        .add_stran_imm(StranOp::Str, Cond::Al, Reg(2), Reg::GLOBAL, -12, false);
    ctx.arm.add_branch(Cond::Al, skip);

    ctx.arm.add_label(handler);
    ctx.arm
        .add_cmp_imm(DataOp::Tst, Cond::Al, Reg(11), 1 << 6);
    ctx.arm.add_mov_reg(Cond::Eq, false, Reg::PC, Reg::LR);
    ctx.arm.add_mov_imm(Cond::Al, false, Reg(0), 1);
    ctx.arm
        .add_stran_imm(StranOp::Str, Cond::Al, Reg(0), Reg::GLOBAL, -4, false);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);

    ctx.arm.add_label(skip);
}
