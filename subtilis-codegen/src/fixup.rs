//! Call-site fixup and frame patching.
//!
//! The call emitter pushes fp and lr unconditionally, reserves `NV`
//! floating point preserve slots, and records everything in the section's
//! call-site list.  Once allocation has fixed every operand, this pass
//! decides per call which registers actually carry values across it:
//! those written before the call and read again after it.  The multi
//! transfer masks grow accordingly, the preserve slots for live FP
//! registers flip from `NV` to `AL`, and the stack offsets of spilled
//! arguments move down by however many bytes the saves push.

use crate::dist::{phys_read_after, phys_written_before};
use crate::fp::{base_save_mask, FpBackend, INT_ARG_REGS, REAL_ARG_REGS};
use crate::{Error, Result};
use subtilis_asm::{ArmSection, Cond, DataOp, Instr, Op2, OpIdx, OpKind, RegSet};

/// Lowest integer register the caller will preserve; r0-r3 belong to the
/// argument/result convention and die at every call.
const INT_SAVE_FIRST: usize = INT_ARG_REGS;
/// Highest allocatable integer register.
const INT_SAVE_LAST: usize = 10;

/// Rewrites every recorded call site.  Must run after allocation and
/// before the peephole pass, which deletes the slots left `NV`.
pub fn save_regs<B: FpBackend + ?Sized>(section: &mut ArmSection, fp: &B) -> Result<()> {
    let sites = section.call_sites.clone();
    for site in &sites {
        let (int_before, real_before) = phys_written_before(section, site.stm);
        let after_start = section.op(site.ldm).next;
        let (int_after, real_after) = phys_read_after(section, after_start);

        let mut save = base_save_mask();
        for reg in INT_SAVE_FIRST..=INT_SAVE_LAST {
            if int_before.isset(reg) && int_after.isset(reg) {
                save |= RegSet::from_bits_truncate(1 << reg);
            }
        }

        patch_mtran(section, site.stm, save)?;
        patch_mtran(section, site.ldm, save)?;

        let mut fp_saved = 0u32;
        for slot in [site.stf, site.ldf].into_iter().flatten() {
            fp_saved = promote_fp_slots(section, fp, slot, &real_before, &real_after)?;
        }

        let pushed = (save.bits().count_ones() * 4 + fp_saved * fp.reg_size()) as i32;
        for &op in &site.int_arg_ops {
            match section.instr_mut(op) {
                Instr::Stran { instr, .. } => match &mut instr.offset {
                    Op2::Imm(v) => *v = (*v as i32 + pushed) as u32,
                    _ => return Err(Error::Assertion("argument store without an offset")),
                },
                _ => return Err(Error::Assertion("argument site is not a store")),
            }
        }
        for &op in &site.real_arg_ops {
            match section.instr_mut(op) {
                Instr::FpaStran { instr, .. } => instr.offset += pushed,
                Instr::VfpStran { instr, .. } => instr.offset += pushed,
                _ => return Err(Error::Assertion("argument site is not a store")),
            }
        }
    }
    Ok(())
}

fn patch_mtran(section: &mut ArmSection, op: OpIdx, mask: RegSet) -> Result<()> {
    match section.instr_mut(op) {
        Instr::Mtran { instr, .. } => {
            instr.reg_list |= mask;
            Ok(())
        }
        _ => Err(Error::Assertion("call site does not point at a block transfer")),
    }
}

// Walks the run of NV transfer slots starting at `first`, promoting to AL
// the ones whose register is live across the call.  Returns how many were
// promoted.
fn promote_fp_slots<B: FpBackend + ?Sized>(
    section: &mut ArmSection,
    fp: &B,
    first: OpIdx,
    before: &crate::BitSet,
    after: &crate::BitSet,
) -> Result<u32> {
    let mut promoted = 0;
    let mut cur = Some(first);
    while let Some(idx) = cur {
        let reg = match &section.op(idx).kind {
            OpKind::Instr(Instr::FpaStran { instr, .. }) if instr.ccode == Cond::Nv => {
                instr.dest.0
            }
            OpKind::Instr(Instr::VfpStran { instr, .. }) if instr.ccode == Cond::Nv => {
                instr.dest.0
            }
            _ => break,
        };
        // Argument registers die at the call like their integer cousins.
        let keep = reg >= REAL_ARG_REGS
            && reg < fp.phys_count()
            && before.isset(reg)
            && after.isset(reg);
        if keep {
            match section.instr_mut(idx) {
                Instr::FpaStran { instr, .. } => instr.ccode = Cond::Al,
                Instr::VfpStran { instr, .. } => instr.ccode = Cond::Al,
                _ => unreachable!(),
            }
            promoted += 1;
        }
        cur = section.op(idx).next;
    }
    Ok(promoted)
}

/// Patches the prologue's frame reservation and every ret site with the
/// final, encodable frame size.
pub fn patch_frames(section: &mut ArmSection, prologue: OpIdx, frame: u32) -> Result<()> {
    patch_stack_adjust(section, prologue, DataOp::Sub, frame)?;
    let sites = section.ret_sites.clone();
    for op in sites {
        patch_stack_adjust(section, op, DataOp::Add, frame)?;
    }
    Ok(())
}

fn patch_stack_adjust(
    section: &mut ArmSection,
    op: OpIdx,
    want: DataOp,
    frame: u32,
) -> Result<()> {
    match section.instr_mut(op) {
        Instr::Data { op, instr } if *op == want => {
            instr.op2 = Op2::Imm(frame);
            Ok(())
        }
        _ => Err(Error::Assertion("frame patch site is not a stack adjust")),
    }
}
