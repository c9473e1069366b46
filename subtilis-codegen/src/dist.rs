//! Register use/def walks over ARM sections.
//!
//! Three flavours serve three passes.  The per-register distance walk
//! feeds the allocator's eviction choice and terminates at the current
//! subsection boundary.  The set-valued virtual register walks feed
//! subsection liveness.  The physical register walks feed call-site
//! fixup, which runs after allocation when every operand is physical.
//! All of them dispatch through the read/write enumeration on
//! [`Instr`], so `NV` predicated preserve slots are invisible here.

use crate::BitSet;
use subtilis_asm::{ArmSection, FReg, Instr, OpIdx, OpKind, Reg};

fn op_instr<'a>(section: &'a ArmSection, idx: OpIdx) -> Option<&'a Instr> {
    match &section.op(idx).kind {
        OpKind::Instr(i) => Some(i),
        _ => None,
    }
}

/// Distance, in ops, from `from` to the next read of `reg`, scanning no
/// further than `limit` (inclusive).  Returns -1 if the register is
/// redefined or never touched before the limit: either way its current
/// value has no further use here.
pub fn next_use_int(section: &ArmSection, reg: Reg, from: Option<OpIdx>, limit: OpIdx) -> i32 {
    let mut dist = 0;
    let mut cur = from;
    while let Some(idx) = cur {
        if let Some(instr) = op_instr(section, idx) {
            let mut read = false;
            instr.visit_int_reads(|r| read |= r == reg);
            if read {
                return dist;
            }
            let mut written = false;
            instr.visit_int_writes(|r| written |= r == reg);
            if written {
                return -1;
            }
        }
        if idx == limit {
            break;
        }
        dist += 1;
        cur = section.op(idx).next;
    }
    -1
}

/// Floating point analogue of [`next_use_int`].
pub fn next_use_real(section: &ArmSection, reg: FReg, from: Option<OpIdx>, limit: OpIdx) -> i32 {
    let mut dist = 0;
    let mut cur = from;
    while let Some(idx) = cur {
        if let Some(instr) = op_instr(section, idx) {
            let mut read = false;
            instr.visit_real_reads(|r| read |= r == reg);
            if read {
                return dist;
            }
            let mut written = false;
            instr.visit_real_writes(|r| written |= r == reg);
            if written {
                return -1;
            }
        }
        if idx == limit {
            break;
        }
        dist += 1;
        cur = section.op(idx).next;
    }
    -1
}

/// Virtual registers read before being written between `from` and `to`
/// inclusive: the live-in sets of a subsection.
pub fn virt_inputs(
    section: &ArmSection,
    from: OpIdx,
    to: OpIdx,
    int_base: usize,
    real_base: usize,
) -> (BitSet, BitSet) {
    let mut int_in = BitSet::new();
    let mut real_in = BitSet::new();
    let mut int_def = BitSet::new();
    let mut real_def = BitSet::new();
    let mut cur = Some(from);
    while let Some(idx) = cur {
        if let Some(instr) = op_instr(section, idx) {
            instr.visit_int_reads(|r| {
                if r.0 >= int_base && !int_def.isset(r.0) {
                    int_in.set(r.0);
                }
            });
            instr.visit_int_writes(|r| {
                if r.0 >= int_base {
                    int_def.set(r.0);
                }
            });
            instr.visit_real_reads(|r| {
                if r.0 >= real_base && !real_def.isset(r.0) {
                    real_in.set(r.0);
                }
            });
            instr.visit_real_writes(|r| {
                if r.0 >= real_base {
                    real_def.set(r.0);
                }
            });
        }
        if idx == to {
            break;
        }
        cur = section.op(idx).next;
    }
    (int_in, real_in)
}

/// Every virtual register mentioned, read or written, between `from` and
/// `to` inclusive: the output sets of a subsection link.
pub fn virt_mentioned(
    section: &ArmSection,
    from: OpIdx,
    to: OpIdx,
    int_base: usize,
    real_base: usize,
) -> (BitSet, BitSet) {
    let mut int_out = BitSet::new();
    let mut real_out = BitSet::new();
    let mut cur = Some(from);
    while let Some(idx) = cur {
        if let Some(instr) = op_instr(section, idx) {
            let mut int_touch = |r: Reg| {
                if r.0 >= int_base {
                    int_out.set(r.0);
                }
            };
            instr.visit_int_reads(&mut int_touch);
            instr.visit_int_writes(&mut int_touch);
            let mut real_touch = |r: FReg| {
                if r.0 >= real_base {
                    real_out.set(r.0);
                }
            };
            instr.visit_real_reads(&mut real_touch);
            instr.visit_real_writes(&mut real_touch);
        }
        if idx == to {
            break;
        }
        cur = section.op(idx).next;
    }
    (int_out, real_out)
}

/// Physical registers written between the section start and `upto`
/// inclusive.  Call-site fixup intersects this with the reads beyond the
/// call to find what must survive it.
pub fn phys_written_before(section: &ArmSection, upto: OpIdx) -> (BitSet, BitSet) {
    let mut int_w = BitSet::new();
    let mut real_w = BitSet::new();
    let mut cur = section.first_op;
    while let Some(idx) = cur {
        if let Some(instr) = op_instr(section, idx) {
            instr.visit_int_writes(|r| {
                if r.is_fixed() {
                    int_w.set(r.0);
                }
            });
            instr.visit_real_writes(|r| real_w.set(r.0));
        }
        if idx == upto {
            break;
        }
        cur = section.op(idx).next;
    }
    (int_w, real_w)
}

/// Physical registers read before being rewritten, from `from` inclusive
/// to the section end.
pub fn phys_read_after(section: &ArmSection, from: Option<OpIdx>) -> (BitSet, BitSet) {
    let mut int_r = BitSet::new();
    let mut real_r = BitSet::new();
    let mut int_killed = BitSet::new();
    let mut real_killed = BitSet::new();
    let mut cur = from;
    while let Some(idx) = cur {
        if let Some(instr) = op_instr(section, idx) {
            instr.visit_int_reads(|r| {
                if r.is_fixed() && !int_killed.isset(r.0) {
                    int_r.set(r.0);
                }
            });
            instr.visit_int_writes(|r| {
                if r.is_fixed() {
                    int_killed.set(r.0);
                }
            });
            instr.visit_real_reads(|r| {
                if !real_killed.isset(r.0) {
                    real_r.set(r.0);
                }
            });
            instr.visit_real_writes(|r| real_killed.set(r.0));
        }
        cur = section.op(idx).next;
    }
    (int_r, real_r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtilis_asm::{Cond, DataOp, FpKind};

    // MUL r0, r1, r8 / CMP r3, r4 / MOV r8, r4 / MVN r4, r10
    fn sample() -> (ArmSection, Vec<OpIdx>) {
        let mut s = ArmSection::new(0, 0, 0, 0, 4, 4, FpKind::Fpa);
        let a = s.add_mul(Cond::Al, false, Reg(0), Reg(1), Reg(8));
        let b = s.add_cmp(DataOp::Cmp, Cond::Al, Reg(3), Reg(4));
        let c = s.add_mov_reg(Cond::Al, false, Reg(8), Reg(4));
        let d = s.add_mvn_reg(Cond::Al, false, Reg(4), Reg(10));
        (s, vec![a, b, c, d])
    }

    #[test]
    fn written_before_matches_reference() {
        let (s, ops) = sample();
        let expected = [0x1usize, 0x1, 0x101, 0x111];
        for (op, want) in ops.iter().zip(expected) {
            let (ints, _) = phys_written_before(&s, *op);
            let mask: usize = ints.iter().map(|b| 1 << b).sum();
            assert_eq!(mask, want, "at {op:?}");
        }
    }

    #[test]
    fn read_after_matches_reference() {
        let (s, ops) = sample();
        // The reference masks for the same walk, starting at each op.
        let expected = [0x51ausize, 0x418, 0x410, 0x400];
        for (op, want) in ops.iter().zip(expected) {
            let (ints, _) = phys_read_after(&s, Some(*op));
            let mask: usize = ints.iter().map(|b| 1 << b).sum();
            assert_eq!(mask, want, "at {op:?}");
        }
    }

    #[test]
    fn next_use_sees_reads_and_kills() {
        let (s, ops) = sample();
        // r4 is read by the CMP one op after the MUL.
        assert_eq!(next_use_int(&s, Reg(4), s.op(ops[0]).next, ops[3]), 0);
        // r8 is rewritten before any read past the MUL.
        assert_eq!(next_use_int(&s, Reg(8), s.op(ops[0]).next, ops[3]), -1);
        // r10 is read two ops past the CMP.
        assert_eq!(next_use_int(&s, Reg(10), s.op(ops[1]).next, ops[3]), 1);
    }
}
