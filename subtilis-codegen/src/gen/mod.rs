//! Instruction emitters and the rule table.
//!
//! One handler per rule; handlers append ARM instructions over virtual
//! registers and never look at more IR than their rule consumed.  The
//! table orders compound rules (compare-and-branch, compare-and-move)
//! above the single-op rules they subsume so the matcher can fold
//! comparisons onto the condition codes.

pub mod fpa;
pub mod vfp;

use crate::fp::{FpBackend, INT_ARG_REGS, REAL_ARG_REGS};
use crate::riscos::ops;
use crate::{Error, Result};
use subtilis_ir::{
    ArgPat, CallKind, OpPat, Operand, Rule, Section, Settings,
};
use subtilis_ir::OpCode::*;
use subtilis_asm::{
    ArmSection, BrInstr, BrLinkType, BrTarget, CallSite, CmovInstr, Cond, DataInstr, DataOp,
    FpKind, Instr, MtranMode, MtranOp, Op2, Reg, RegSet, Shift, ShiftAmount, ShiftKind, StranOp,
};

/// Everything a handler may touch.
pub struct Ctx<'a> {
    /// Section under construction.
    pub arm: &'a mut ArmSection,
    /// FP family behaviour.
    pub fp: &'a dyn FpBackend,
    /// Compilation settings.
    pub settings: &'a Settings,
    /// Byte offset of the error code word from the globals base.
    pub error_offset: i32,
    /// Byte offset of the error flag word from the globals base.
    pub eflag_offset: i32,
    /// Target of the preamble's not-enough-memory branch; `END` defines
    /// it in front of the bare exit sequence.
    pub no_cleanup_label: usize,
    /// Load address of the image, for locating the heap base word.
    pub start_address: u32,
}

impl Ctx<'_> {
    /// Writes `code` to the error word and -1 to the error flag, under
    /// `ccode`.
    pub fn sete(&mut self, ccode: Cond, code: i32) {
        let one = self.arm.fresh_reg();
        self.arm.add_mov_imm(ccode, false, one, code);
        self.arm
            .add_stran_imm(StranOp::Str, ccode, one, Reg::GLOBAL, self.error_offset, false);
        self.arm.add_mov_imm(ccode, false, one, -1);
        self.arm
            .add_stran_imm(StranOp::Str, ccode, one, Reg::GLOBAL, self.eflag_offset, false);
    }

    /// Writes the error block pointed to by `r0` and -1 to the error
    /// flag, under `ccode`.  Used after an `X` SWI failed.
    pub fn sete_reg(&mut self, ccode: Cond) {
        let one = self.arm.fresh_reg();
        self.arm
            .add_stran_imm(StranOp::Str, ccode, Reg(0), Reg::GLOBAL, self.error_offset, false);
        self.arm.add_mov_imm(ccode, false, one, -1);
        self.arm
            .add_stran_imm(StranOp::Str, ccode, one, Reg::GLOBAL, self.eflag_offset, false);
    }

    /// The graphics error epilogue shared by most of the VDU handlers.
    pub fn handle_graphics_error(&mut self) {
        if self.settings.ignore_graphics_errors {
            return;
        }
        self.sete(Cond::Vs, subtilis_ir::ERR_GRAPHICS);
    }
}

/// Handler signature.
pub type GenFn = fn(&mut Ctx, &Section, usize) -> Result<()>;

pub(crate) fn ir_reg(operand: Operand) -> Reg {
    Reg::from_ir(operand.reg())
}

fn data_simple(ctx: &mut Ctx, s: &Section, start: usize, op: DataOp) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_instr(Instr::Data {
        op,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: ir_reg(i.operands[0]),
            op1: ir_reg(i.operands[1]),
            op2: Op2::Reg(ir_reg(i.operands[2])),
        },
    });
    Ok(())
}

fn data_imm(ctx: &mut Ctx, s: &Section, start: usize, op: DataOp) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_data_imm(
        op,
        Cond::Al,
        false,
        ir_reg(i.operands[0]),
        ir_reg(i.operands[1]),
        i.operands[2].integer(),
    );
    Ok(())
}

pub(crate) fn gen_mov(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_mov_reg(
        Cond::Al,
        false,
        ir_reg(i.operands[0]),
        ir_reg(i.operands[1]),
    );
    Ok(())
}

pub(crate) fn gen_movii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_imm(Cond::Al, false, ir_reg(i.operands[0]), i.operands[1].integer());
    Ok(())
}

pub(crate) fn gen_mvni32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_mvn_reg(
        Cond::Al,
        false,
        ir_reg(i.operands[0]),
        ir_reg(i.operands[1]),
    );
    Ok(())
}

pub(crate) fn gen_addi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_simple(ctx, s, start, DataOp::Add)
}

pub(crate) fn gen_subi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_simple(ctx, s, start, DataOp::Sub)
}

pub(crate) fn gen_andi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_simple(ctx, s, start, DataOp::And)
}

pub(crate) fn gen_ori32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_simple(ctx, s, start, DataOp::Orr)
}

pub(crate) fn gen_eori32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_simple(ctx, s, start, DataOp::Eor)
}

pub(crate) fn gen_addii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_imm(ctx, s, start, DataOp::Add)
}

pub(crate) fn gen_subii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_imm(ctx, s, start, DataOp::Sub)
}

pub(crate) fn gen_rsubii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_imm(ctx, s, start, DataOp::Rsb)
}

pub(crate) fn gen_andii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_imm(ctx, s, start, DataOp::And)
}

pub(crate) fn gen_orii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_imm(ctx, s, start, DataOp::Orr)
}

pub(crate) fn gen_eorii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    data_imm(ctx, s, start, DataOp::Eor)
}

pub(crate) fn gen_muli32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let mut rm = ir_reg(i.operands[1]);
    let mut rs = ir_reg(i.operands[2]);
    // The ARM2 requires Rd and Rm to differ.
    if rm == dest {
        core::mem::swap(&mut rm, &mut rs);
    }
    if rm == dest {
        let tmp = ctx.arm.fresh_reg();
        ctx.arm.add_mov_reg(Cond::Al, false, tmp, rm);
        rm = tmp;
    }
    ctx.arm.add_mul(Cond::Al, false, dest, rm, rs);
    Ok(())
}

pub(crate) fn gen_mulii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let mut op1 = ir_reg(i.operands[1]);
    if op1 == dest && !(i.operands[2].integer() > 0 && (i.operands[2].integer() as u32).is_power_of_two()) {
        let tmp = ctx.arm.fresh_reg();
        ctx.arm.add_mov_reg(Cond::Al, false, tmp, op1);
        op1 = tmp;
    }
    ctx.arm
        .add_mul_imm(Cond::Al, false, dest, op1, i.operands[2].integer());
    Ok(())
}

fn stran(ctx: &mut Ctx, s: &Section, start: usize, op: StranOp) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_stran_imm(
        op,
        Cond::Al,
        ir_reg(i.operands[0]),
        ir_reg(i.operands[1]),
        i.operands[2].integer(),
        false,
    );
    Ok(())
}

pub(crate) fn gen_storeoi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    stran(ctx, s, start, StranOp::Str)
}

pub(crate) fn gen_loadoi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    stran(ctx, s, start, StranOp::Ldr)
}

pub(crate) fn gen_storeoi8(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    stran(ctx, s, start, StranOp::Strb)
}

pub(crate) fn gen_loadoi8(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    stran(ctx, s, start, StranOp::Ldrb)
}

pub(crate) fn gen_label(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    match s.ops[start] {
        subtilis_ir::Op::Label(label) => {
            ctx.arm.add_label(label);
            Ok(())
        }
        _ => Err(Error::Assertion("label rule on a non-label")),
    }
}

pub(crate) fn gen_jump(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_branch(Cond::Al, i.operands[0].label());
    Ok(())
}

// The compare-and-branch fusions invert the comparison so the branch is
// taken when the guarded body must be skipped.
fn cmp_jmp(ctx: &mut Ctx, s: &Section, start: usize, ccode: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    let jmp = s.ops[start + 1].instr();
    ctx.arm.add_cmp(
        DataOp::Cmp,
        Cond::Al,
        ir_reg(cmp.operands[1]),
        ir_reg(cmp.operands[2]),
    );
    ctx.arm.add_branch(ccode, jmp.operands[2].label());
    Ok(())
}

fn cmp_jmp_imm(ctx: &mut Ctx, s: &Section, start: usize, ccode: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    let jmp = s.ops[start + 1].instr();
    ctx.arm.add_cmp_imm(
        DataOp::Cmp,
        Cond::Al,
        ir_reg(cmp.operands[1]),
        cmp.operands[2].integer(),
    );
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

// The value-producing comparisons write -1 for true, 0 for false.
fn cmp_set(ctx: &mut Ctx, s: &Section, start: usize, ok: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    ctx.arm.add_cmp(
        DataOp::Cmp,
        Cond::Al,
        ir_reg(cmp.operands[1]),
        ir_reg(cmp.operands[2]),
    );
    let dest = ir_reg(cmp.operands[0]);
    ctx.arm.add_mov_imm(ok, false, dest, -1);
    ctx.arm.add_mov_imm(ok.invert(), false, dest, 0);
    Ok(())
}

fn cmp_set_imm(ctx: &mut Ctx, s: &Section, start: usize, ok: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    ctx.arm.add_cmp_imm(
        DataOp::Cmp,
        Cond::Al,
        ir_reg(cmp.operands[1]),
        cmp.operands[2].integer(),
    );
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
    (gen_gti32, gen_gtii32, Cond::Gt),
    (gen_lti32, gen_ltii32, Cond::Lt),
    (gen_gtei32, gen_gteii32, Cond::Ge),
    (gen_ltei32, gen_lteii32, Cond::Le),
    (gen_eqi32, gen_eqii32, Cond::Eq),
    (gen_neqi32, gen_neqii32, Cond::Ne),
];

pub(crate) fn gen_jmpc(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let jmp = s.ops[start].instr();
    ctx.arm
        .add_cmp_imm(DataOp::Cmp, Cond::Al, ir_reg(jmp.operands[0]), 0);
    ctx.arm.add_branch(Cond::Eq, jmp.operands[2].label());
    Ok(())
}

pub(crate) fn gen_jmpc_rev(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let jmp = s.ops[start].instr();
    ctx.arm
        .add_cmp_imm(DataOp::Cmp, Cond::Al, ir_reg(jmp.operands[0]), 0);
    ctx.arm.add_branch(Cond::Ne, jmp.operands[1].label());
    Ok(())
}

pub(crate) fn gen_jmpc_no_label(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let jmp = s.ops[start].instr();
    ctx.arm
        .add_cmp_imm(DataOp::Cmp, Cond::Al, ir_reg(jmp.operands[0]), 0);
    ctx.arm.add_branch(Cond::Ne, jmp.operands[1].label());
    ctx.arm.add_branch(Cond::Eq, jmp.operands[2].label());
    Ok(())
}

pub(crate) fn gen_cmovi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_instr(Instr::Cmov(CmovInstr {
        dest: ir_reg(i.operands[0]),
        op1: ir_reg(i.operands[1]),
        op2: ir_reg(i.operands[2]),
        op3: ir_reg(i.operands[3]),
        fused: false,
        true_cond: Cond::Ne,
    }));
    Ok(())
}

fn cmov_fused(ctx: &mut Ctx, s: &Section, start: usize, true_cond: Cond) -> Result<()> {
    let cmp = s.ops[start].instr();
    let cmov = s.ops[start + 1].instr();
    ctx.arm.add_cmp(
        DataOp::Cmp,
        Cond::Al,
        ir_reg(cmp.operands[1]),
        ir_reg(cmp.operands[2]),
    );
    ctx.arm.add_instr(Instr::Cmov(CmovInstr {
        dest: ir_reg(cmov.operands[0]),
        op1: ir_reg(cmov.operands[1]),
        op2: ir_reg(cmov.operands[2]),
        op3: ir_reg(cmov.operands[3]),
        fused: true,
        true_cond,
    }));
    Ok(())
}

pub(crate) fn gen_cmovi32_gti32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    cmov_fused(ctx, s, start, Cond::Gt)
}

pub(crate) fn gen_cmovi32_lti32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    cmov_fused(ctx, s, start, Cond::Lt)
}

fn shift_reg(ctx: &mut Ctx, s: &Section, start: usize, kind: ShiftKind) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    ctx.arm.add_instr(Instr::Data {
        op: DataOp::Mov,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest,
            op1: dest,
            op2: Op2::Shifted(Shift {
                reg: ir_reg(i.operands[1]),
                kind,
                amount: ShiftAmount::Reg(ir_reg(i.operands[2])),
            }),
        },
    });
    Ok(())
}

fn shift_imm(ctx: &mut Ctx, s: &Section, start: usize, kind: ShiftKind) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    ctx.arm.add_instr(Instr::Data {
        op: DataOp::Mov,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest,
            op1: dest,
            op2: Op2::Shifted(Shift {
                reg: ir_reg(i.operands[1]),
                kind,
                amount: ShiftAmount::Imm(i.operands[2].integer()),
            }),
        },
    });
    Ok(())
}

macro_rules! shift_handlers {
    ($(($name:ident, $imm_name:ident, $kind:expr)),* $(,)?) => {
        $(
            pub(crate) fn $name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                shift_reg(ctx, s, start, $kind)
            }
            pub(crate) fn $imm_name(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
                shift_imm(ctx, s, start, $kind)
            }
        )*
    };
}

shift_handlers![
    (gen_lsli32, gen_lslii32, ShiftKind::Lsl),
    (gen_lsri32, gen_lsrii32, ShiftKind::Lsr),
    (gen_asri32, gen_asrii32, ShiftKind::Asr),
];

pub(crate) fn gen_pushi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_push_reg(Cond::Al, ir_reg(i.operands[0]));
    Ok(())
}

pub(crate) fn gen_popi32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm.add_pop_reg(Cond::Al, ir_reg(i.operands[0]));
    Ok(())
}

pub(crate) fn gen_lca(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    let dest = ir_reg(i.operands[0]);
    let constant = ctx.arm.add_prog_constant(i.operands[1].integer() as usize);
    ctx.arm.add_instr(Instr::Ldrc(subtilis_asm::LdrcInstr {
        ccode: Cond::Al,
        dest,
        constant,
    }));
    Ok(())
}

/// The shared call sequence: stack surplus arguments, push fp and lr,
/// reserve the FP preserve slots, branch and link, restore.  Every op
/// index that call-site fixup will need goes into the call-site record.
pub(crate) fn gen_call_gen(
    ctx: &mut Ctx,
    s: &Section,
    start: usize,
    link_type: BrLinkType,
) -> Result<()> {
    let call = s.ops[start].call();
    let int_args = call
        .args
        .iter()
        .filter(|a| matches!(a, Operand::Reg(_)))
        .count();
    let real_args = call.args.len() - int_args;
    if int_args > 16 || real_args > 16 {
        return Err(Error::TooManyArgs(call.args.len()));
    }

    // Surplus arguments walk down the stack from the last slot; fixup
    // moves the offsets below whatever the saves push.
    let mut int_arg_ops = Vec::new();
    let mut offset = 0;
    let mut int_left = int_args;
    for arg in call.args.iter().rev() {
        if int_left <= INT_ARG_REGS {
            break;
        }
        if let Operand::Reg(r) = arg {
            offset += 4;
            let op = ctx.arm.add_instr(Instr::Stran {
                op: StranOp::Str,
                instr: subtilis_asm::StranInstr {
                    ccode: Cond::Al,
                    dest: Reg::from_ir(*r),
                    base: Reg::SP,
                    offset: Op2::Imm(offset as u32),
                    pre_indexed: true,
                    write_back: false,
                    subtract: true,
                },
            });
            int_arg_ops.push(op);
            int_left -= 1;
        }
    }
    let mut real_arg_ops = Vec::new();
    let mut real_left = real_args;
    for arg in call.args.iter().rev() {
        if real_left <= REAL_ARG_REGS {
            break;
        }
        if let Operand::FReg(r) = arg {
            offset += 8;
            let src = ctx.arm_freg(*r);
            let op = ctx.fp.store_arg(ctx.arm, src, offset);
            real_arg_ops.push(op);
            real_left -= 1;
        }
    }

    // Register arguments, in declaration order.
    let mut int_slot = 0;
    let mut real_slot = 0;
    for arg in &call.args {
        match arg {
            Operand::Reg(r) if int_slot < int_left => {
                ctx.arm
                    .add_mov_reg(Cond::Al, false, Reg(int_slot), Reg::from_ir(*r));
                int_slot += 1;
            }
            Operand::FReg(r) if real_slot < real_left => {
                let src = ctx.arm_freg(*r);
                ctx.fp.mov_reg(ctx.arm, Cond::Al, subtilis_asm::FReg(real_slot), src);
                real_slot += 1;
            }
            _ => {}
        }
    }

    let stm = ctx.arm.add_mtran(
        MtranOp::Stm,
        Cond::Al,
        Reg::SP,
        RegSet::LR | RegSet::FP,
        MtranMode::Fd,
        true,
    );

    let mut stf = None;
    let mut ldf = None;
    let uses_fp = ctx.arm.freg_counter > ctx.fp.phys_count();
    let save_real_start = real_args.min(REAL_ARG_REGS);
    if uses_fp {
        for i in save_real_start..ctx.fp.phys_count() {
            let op = ctx.fp.push_reg(ctx.arm, subtilis_asm::FReg(i));
            stf.get_or_insert(op);
        }
    }

    let br = ctx.arm.add_instr(Instr::B(BrInstr {
        ccode: Cond::Al,
        link: true,
        link_type,
        target: BrTarget::Label(call.section),
    }));

    if uses_fp {
        for i in (save_real_start..ctx.fp.phys_count()).rev() {
            let op = ctx.fp.pop_reg(ctx.arm, subtilis_asm::FReg(i));
            ldf.get_or_insert(op);
        }
    }

    let ldm = ctx.arm.add_mtran(
        MtranOp::Ldm,
        Cond::Al,
        Reg::SP,
        RegSet::LR | RegSet::FP,
        MtranMode::Fd,
        true,
    );

    ctx.arm.add_call_site(CallSite {
        stm,
        ldm,
        stf,
        ldf,
        br,
        int_args,
        real_args,
        int_arg_ops,
        real_arg_ops,
    });
    Ok(())
}

impl Ctx<'_> {
    pub(crate) fn arm_freg(&self, ir: usize) -> subtilis_asm::FReg {
        self.fp.kind().freg_from_ir(ir)
    }
}

pub(crate) fn gen_call(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    gen_call_gen(ctx, s, start, BrLinkType::Void)
}

pub(crate) fn gen_calli32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    gen_call_gen(ctx, s, start, BrLinkType::Int)?;
    let call = s.ops[start].call();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg::from_ir(call.reg), Reg(0));
    Ok(())
}

/// The return epilogue.  The stack restore is patched with the final
/// frame size once allocation has run.
pub(crate) fn gen_ret(ctx: &mut Ctx, _s: &Section, _start: usize) -> Result<()> {
    let restore = ctx.arm.add_instr(Instr::Data {
        op: DataOp::Add,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg::SP,
            op1: Reg::SP,
            op2: Op2::Imm(0),
        },
    });
    ctx.arm.add_ret_site(restore);
    ctx.arm.add_mov_reg(Cond::Al, false, Reg::PC, Reg::LR);
    Ok(())
}

pub(crate) fn gen_reti32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_reg(Cond::Al, false, Reg(0), ir_reg(i.operands[0]));
    gen_ret(ctx, s, start)
}

pub(crate) fn gen_retii32(ctx: &mut Ctx, s: &Section, start: usize) -> Result<()> {
    let i = s.ops[start].instr();
    ctx.arm
        .add_mov_imm(Cond::Al, false, Reg(0), i.operands[0].integer());
    gen_ret(ctx, s, start)
}

const ANY: [ArgPat; 4] = [ArgPat::Any; 4];

fn instr(op: subtilis_ir::OpCode, args: [ArgPat; 4]) -> OpPat {
    OpPat::Instr { op, args }
}

fn solo(op: subtilis_ir::OpCode) -> Vec<OpPat> {
    vec![OpPat::Instr { op, args: ANY }]
}

// <cmp> r_1, *, * / jmpc r_1, label_1, * / label_1
fn fused_cmp(op: subtilis_ir::OpCode) -> Vec<OpPat> {
    vec![
        instr(op, [ArgPat::Bind(0), ArgPat::Any, ArgPat::Any, ArgPat::Any]),
        instr(
            JMPC,
            [ArgPat::Ref(0), ArgPat::Bind(1), ArgPat::Any, ArgPat::Any],
        ),
        OpPat::LabelRef(1),
    ]
}

/// Builds the rule table for one FP family.  Order matters: compound
/// rules come before the rules for their constituent ops.
pub fn rules(fp: FpKind) -> Vec<Rule<GenFn>> {
    let real = |fpa: GenFn, vfp: GenFn| -> GenFn {
        match fp {
            FpKind::Fpa => fpa,
            FpKind::Vfp => vfp,
        }
    };

    let mut table: Vec<Rule<GenFn>> = vec![
        // Compare-and-branch fusions.
        Rule { pattern: fused_cmp(LTII32), action: gen_if_lt_imm },
        Rule { pattern: fused_cmp(GTII32), action: gen_if_gt_imm },
        Rule { pattern: fused_cmp(LTEII32), action: gen_if_lte_imm },
        Rule { pattern: fused_cmp(NEQII32), action: gen_if_neq_imm },
        Rule { pattern: fused_cmp(EQII32), action: gen_if_eq_imm },
        Rule { pattern: fused_cmp(GTEII32), action: gen_if_gte_imm },
        Rule { pattern: fused_cmp(LTI32), action: gen_if_lt },
        Rule { pattern: fused_cmp(GTI32), action: gen_if_gt },
        Rule { pattern: fused_cmp(LTEI32), action: gen_if_lte },
        Rule { pattern: fused_cmp(EQI32), action: gen_if_eq },
        Rule { pattern: fused_cmp(NEQI32), action: gen_if_neq },
        Rule { pattern: fused_cmp(GTEI32), action: gen_if_gte },
        Rule { pattern: fused_cmp(LTIR), action: real(fpa::gen_if_lt_imm, vfp::gen_if_lt_imm) },
        Rule { pattern: fused_cmp(GTIR), action: real(fpa::gen_if_gt_imm, vfp::gen_if_gt_imm) },
        Rule { pattern: fused_cmp(LTEIR), action: real(fpa::gen_if_lte_imm, vfp::gen_if_lte_imm) },
        Rule { pattern: fused_cmp(NEQIR), action: real(fpa::gen_if_neq_imm, vfp::gen_if_neq_imm) },
        Rule { pattern: fused_cmp(EQIR), action: real(fpa::gen_if_eq_imm, vfp::gen_if_eq_imm) },
        Rule { pattern: fused_cmp(GTEIR), action: real(fpa::gen_if_gte_imm, vfp::gen_if_gte_imm) },
        Rule { pattern: fused_cmp(LTR), action: real(fpa::gen_if_lt, vfp::gen_if_lt) },
        Rule { pattern: fused_cmp(GTR), action: real(fpa::gen_if_gt, vfp::gen_if_gt) },
        Rule { pattern: fused_cmp(LTER), action: real(fpa::gen_if_lte, vfp::gen_if_lte) },
        Rule { pattern: fused_cmp(EQR), action: real(fpa::gen_if_eq, vfp::gen_if_eq) },
        Rule { pattern: fused_cmp(NEQR), action: real(fpa::gen_if_neq, vfp::gen_if_neq) },
        Rule { pattern: fused_cmp(GTER), action: real(fpa::gen_if_gte, vfp::gen_if_gte) },
        // Conditional jump forms.
        Rule {
            pattern: vec![
                instr(JMPC, [ArgPat::Any, ArgPat::Bind(1), ArgPat::Any, ArgPat::Any]),
                OpPat::LabelRef(1),
            ],
            action: gen_jmpc,
        },
        Rule {
            pattern: vec![
                instr(JMPC, [ArgPat::Any, ArgPat::Any, ArgPat::Bind(1), ArgPat::Any]),
                OpPat::LabelRef(1),
            ],
            action: gen_jmpc_rev,
        },
        Rule { pattern: solo(JMPC), action: gen_jmpc_no_label },
        Rule { pattern: solo(JMPCNF), action: gen_jmpc_no_label },
        // Compare-and-move fusions.
        Rule {
            pattern: vec![
                instr(GTI32, [ArgPat::Bind(0), ArgPat::Any, ArgPat::Any, ArgPat::Any]),
                instr(CMOVI32, [ArgPat::Any, ArgPat::Ref(0), ArgPat::Any, ArgPat::Any]),
            ],
            action: gen_cmovi32_gti32,
        },
        Rule {
            pattern: vec![
                instr(LTI32, [ArgPat::Bind(0), ArgPat::Any, ArgPat::Any, ArgPat::Any]),
                instr(CMOVI32, [ArgPat::Any, ArgPat::Ref(0), ArgPat::Any, ArgPat::Any]),
            ],
            action: gen_cmovi32_lti32,
        },
        Rule { pattern: solo(CMOVI32), action: gen_cmovi32 },
        // Calls and returns.
        Rule { pattern: vec![OpPat::Call(CallKind::Void)], action: gen_call },
        Rule { pattern: vec![OpPat::Call(CallKind::I32)], action: gen_calli32 },
        Rule { pattern: vec![OpPat::Call(CallKind::Real)], action: real(fpa::gen_callr, vfp::gen_callr) },
        Rule { pattern: solo(RET), action: gen_ret },
        Rule { pattern: solo(RETI32), action: gen_reti32 },
        Rule { pattern: solo(RETII32), action: gen_retii32 },
        Rule { pattern: solo(RETR), action: real(fpa::gen_retr, vfp::gen_retr) },
        Rule { pattern: solo(RETIR), action: real(fpa::gen_retir, vfp::gen_retir) },
    ];

    // Value-producing comparisons.
    let cmp_rules: &[(subtilis_ir::OpCode, GenFn)] = &[
        (GTII32, gen_gtii32),
        (GTIR, real(fpa::gen_gtir, vfp::gen_gtir)),
        (LTII32, gen_ltii32),
        (LTIR, real(fpa::gen_ltir, vfp::gen_ltir)),
        (GTEII32, gen_gteii32),
        (GTEIR, real(fpa::gen_gteir, vfp::gen_gteir)),
        (LTEII32, gen_lteii32),
        (LTEIR, real(fpa::gen_lteir, vfp::gen_lteir)),
        (EQII32, gen_eqii32),
        (EQIR, real(fpa::gen_eqir, vfp::gen_eqir)),
        (NEQII32, gen_neqii32),
        (NEQIR, real(fpa::gen_neqir, vfp::gen_neqir)),
        (GTI32, gen_gti32),
        (GTR, real(fpa::gen_gtr, vfp::gen_gtr)),
        (LTI32, gen_lti32),
        (LTR, real(fpa::gen_ltr, vfp::gen_ltr)),
        (EQI32, gen_eqi32),
        (EQR, real(fpa::gen_eqr, vfp::gen_eqr)),
        (NEQI32, gen_neqi32),
        (NEQR, real(fpa::gen_neqr, vfp::gen_neqr)),
        (GTEI32, gen_gtei32),
        (GTER, real(fpa::gen_gter, vfp::gen_gter)),
        (LTEI32, gen_ltei32),
        (LTER, real(fpa::gen_lter, vfp::gen_lter)),
    ];
    for (op, action) in cmp_rules {
        table.push(Rule { pattern: solo(*op), action: *action });
    }

    let simple: &[(subtilis_ir::OpCode, GenFn)] = &[
        (MOV, gen_mov),
        (MOVII32, gen_movii32),
        (ADDII32, gen_addii32),
        (MULII32, gen_mulii32),
        (MULI32, gen_muli32),
        (SUBII32, gen_subii32),
        (RSUBII32, gen_rsubii32),
        (ADDI32, gen_addi32),
        (SUBI32, gen_subi32),
        (STOREOI8, gen_storeoi8),
        (STOREOI32, gen_storeoi32),
        (LOADOI8, gen_loadoi8),
        (LOADOI32, gen_loadoi32),
        (PRINTSTR, ops::gen_printstr),
        (PRINTNL, ops::gen_printnl),
        (JMP, gen_jump),
        (ANDII32, gen_andii32),
        (ORII32, gen_orii32),
        (EORII32, gen_eorii32),
        (NOTI32, gen_mvni32),
        (ANDI32, gen_andi32),
        (ORI32, gen_ori32),
        (EORI32, gen_eori32),
        (LSLI32, gen_lsli32),
        (LSLII32, gen_lslii32),
        (LSRI32, gen_lsri32),
        (LSRII32, gen_lsrii32),
        (ASRI32, gen_asri32),
        (ASRII32, gen_asrii32),
        (MODEI32, ops::gen_modei32),
        (PLOT, ops::gen_plot),
        (GCOL, ops::gen_gcol),
        (GCOLTINT, ops::gen_gcol_tint),
        (ORIGIN, ops::gen_origin),
        (GETTIME, ops::gen_gettime),
        (CLS, ops::gen_cls),
        (CLG, ops::gen_clg),
        (ON, ops::gen_on),
        (OFF, ops::gen_off),
        (WAIT, ops::gen_wait),
        (GET, ops::gen_get),
        (GETTO, ops::gen_get_to),
        (INKEY, ops::gen_inkey),
        (OSBYTEID, ops::gen_os_byte_id),
        (VDUI, ops::gen_vdui),
        (VDU, ops::gen_vdu),
        (POINT, ops::gen_point),
        (TINT, ops::gen_tint),
        (END, ops::gen_end),
        (TESTESC, ops::gen_testesc),
        (REF, ops::gen_ref),
        (GETREF, ops::gen_getref),
        (PUSHI32, gen_pushi32),
        (POPI32, gen_popi32),
        (LCA, gen_lca),
        (AT, ops::gen_at),
        (POS, ops::gen_pos),
        (VPOS, ops::gen_vpos),
        (TCOL, ops::gen_tcol),
        (TCOLTINT, ops::gen_tcol_tint),
        (PALETTE, ops::gen_palette),
        (I32TODEC, ops::gen_i32_to_dec),
        (I32TOHEX, ops::gen_i32_to_hex),
        (HEAPFREE, ops::gen_heap_free_space),
        (BLOCKFREE, ops::gen_block_free_space),
        (BLOCKADJUST, ops::gen_block_adjust),
    ];
    for (op, action) in simple {
        table.push(Rule { pattern: solo(*op), action: *action });
    }

    let real_simple: &[(subtilis_ir::OpCode, GenFn, GenFn)] = &[
        (MOVFP, fpa::gen_movr, vfp::gen_movr),
        (MOVIR, fpa::gen_movir, vfp::gen_movir),
        (MOVFPI32, fpa::gen_movri32, vfp::gen_movri32),
        (MOVFPRDI32, fpa::gen_movrrdi32, vfp::gen_movrrdi32),
        (MOVI32FP, fpa::gen_movi32r, vfp::gen_movi32r),
        (ADDR, fpa::gen_addr, vfp::gen_addr),
        (ADDIR, fpa::gen_addir, vfp::gen_addir),
        (SUBR, fpa::gen_subr, vfp::gen_subr),
        (SUBIR, fpa::gen_subir, vfp::gen_subir),
        (RSUBIR, fpa::gen_rsubir, vfp::gen_rsubir),
        (MULR, fpa::gen_mulr, vfp::gen_mulr),
        (MULIR, fpa::gen_mulir, vfp::gen_mulir),
        (DIVR, fpa::gen_divr, vfp::gen_divr),
        (DIVIR, fpa::gen_divir, vfp::gen_divir),
        (RDIVIR, fpa::gen_rdivir, vfp::gen_rdivir),
        (STOREOR, fpa::gen_storeor, vfp::gen_storeor),
        (LOADOR, fpa::gen_loador, vfp::gen_loador),
        (SIN, fpa::gen_sin, vfp::gen_sin),
        (COS, fpa::gen_cos, vfp::gen_cos),
        (TAN, fpa::gen_tan, vfp::gen_tan),
        (ASN, fpa::gen_asn, vfp::gen_asn),
        (ACS, fpa::gen_acs, vfp::gen_acs),
        (ATN, fpa::gen_atn, vfp::gen_atn),
        (SQR, fpa::gen_sqr, vfp::gen_sqr),
        (LOG, fpa::gen_log, vfp::gen_log),
        (LN, fpa::gen_ln, vfp::gen_ln),
        (ABSR, fpa::gen_absr, vfp::gen_absr),
        (POWR, fpa::gen_pow, vfp::gen_pow),
        (EXPR, fpa::gen_exp, vfp::gen_exp),
    ];
    for (op, fpa_fn, vfp_fn) in real_simple {
        table.push(Rule { pattern: solo(*op), action: real(*fpa_fn, *vfp_fn) });
    }

    table.push(Rule { pattern: vec![OpPat::Label(0)], action: gen_label });
    table.push(Rule { pattern: vec![OpPat::SysCall], action: ops::gen_syscall });
    table
}
