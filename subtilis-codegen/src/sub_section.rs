//! Subsection partitioning and liveness.
//!
//! A subsection is the basic-block analogue of an ARM section: it begins
//! at a label (or the section start) and ends just before the next label,
//! after a branch, or at the section end.  Partitioning inserts a fresh
//! label after any branch not already followed by one, so every control
//! flow edge lands on a subsection boundary.
//!
//! For each subsection the analysis computes the virtual registers it
//! needs on entry, and for each of its (at most two) outgoing links the
//! registers it can pass along and the subset of those that some
//! reachable subsection will read: the link's must-save set.  The
//! allocator stores exactly that subset to spill slots at the boundary.

use crate::dist::{virt_inputs, virt_mentioned};
use crate::{BitSet, Error, Result};
use subtilis_asm::{ArmSection, BrTarget, Cond, Instr, OpIdx, OpKind, Reg};

/// One outgoing control flow edge.
#[derive(Debug)]
pub struct Link {
    /// Target label.
    pub target: usize,
    /// The op the edge leaves from: the branch, or the boundary op for a
    /// fall-through.
    pub op: OpIdx,
    /// Integer virtuals carried out along this edge.
    pub int_outputs: BitSet,
    /// Real virtuals carried out along this edge.
    pub real_outputs: BitSet,
    /// Integer virtuals some reachable subsection reads.
    pub int_save: BitSet,
    /// Real virtuals some reachable subsection reads.
    pub real_save: BitSet,
}

/// One subsection.
#[derive(Debug)]
pub struct SubSection {
    /// First op, a label except for the section head.
    pub start: OpIdx,
    /// Last op.
    pub end: OpIdx,
    /// Op count.
    pub size: usize,
    /// Integer virtuals read before written inside the subsection.
    pub int_inputs: BitSet,
    /// Real virtuals read before written inside the subsection.
    pub real_inputs: BitSet,
    /// Outgoing edges, at most two.
    pub links: Vec<Link>,
}

impl SubSection {
    /// Union of the links' must-save sets: what the allocator has to have
    /// in spill slots when control leaves this subsection.
    pub fn live_out(&self) -> (BitSet, BitSet) {
        let mut int_save = BitSet::new();
        let mut real_save = BitSet::new();
        for link in &self.links {
            int_save.or(&link.int_save);
            real_save.or(&link.real_save);
        }
        (int_save, real_save)
    }
}

/// The partition of one section, in op order.
#[derive(Debug)]
pub struct SubSections {
    /// Subsections in walk order; index 0 starts at the section head.
    pub subs: Vec<SubSection>,
    /// Label id to subsection index.
    label_map: Vec<Option<usize>>,
    /// Union of every link's integer must-save set.
    pub int_save: BitSet,
    /// Union of every link's real must-save set.
    pub real_save: BitSet,
}

impl SubSections {
    /// Partitions `section` and computes liveness.  Inserts synthetic
    /// labels after branches, so the section is mutated.
    pub fn calculate(section: &mut ArmSection) -> Result<SubSections> {
        let mut sss = SubSections {
            subs: Vec::new(),
            label_map: Vec::new(),
            int_save: BitSet::new(),
            real_save: BitSet::new(),
        };
        let first = section
            .first_op
            .ok_or(Error::Assertion("empty section has no subsections"))?;
        let (int_base, real_base) = bases(section);

        let mut start = first;
        let mut count = 0usize;
        let mut pending_links: Vec<(usize, OpIdx)> = Vec::new();
        let mut cur = Some(first);
        while let Some(idx) = cur {
            enum Step {
                Label(usize),
                Branch(BrTarget),
                Other,
            }
            let step = match &section.op(idx).kind {
                OpKind::Label(label) => Step::Label(*label),
                OpKind::Instr(Instr::B(br)) if !br.link && br.ccode != Cond::Nv => {
                    Step::Branch(br.target)
                }
                _ => Step::Other,
            };
            match step {
                Step::Label(label) => {
                    if idx != start {
                        let prev = section.op(idx).prev.unwrap();
                        sss.finalize(section, start, prev, count, &mut pending_links)?;
                        count = 0;
                        start = idx;
                    }
                    if label >= section.label_counter {
                        return Err(Error::Assertion("label out of range"));
                    }
                    sss.map_label(label, sss.subs.len());
                }
                Step::Branch(target) => {
                    let target = match target {
                        BrTarget::Label(l) => l,
                        BrTarget::Offset(_) => {
                            return Err(Error::Assertion("resolved branch before allocation"))
                        }
                    };
                    pending_links.push((target, idx));
                    match section.op(idx).next {
                        Some(next) if matches!(section.op(next).kind, OpKind::Label(_)) => {}
                        Some(next) => {
                            let label = section.fresh_label();
                            section.insert_before(next, OpKind::Label(label));
                        }
                        None => {}
                    }
                }
                Step::Other => {}
            }
            count += 1;
            cur = section.op(idx).next;
        }
        if count > 0 {
            let last = section.last_op.unwrap();
            sss.finalize(section, start, last, count, &mut pending_links)?;
        }

        // The entry subsection receives the parameters; its links carry
        // them even though no instruction in it mentions them.
        let int_args = section.int_args.min(crate::fp::INT_ARG_REGS);
        let real_args = section.real_args.min(crate::fp::REAL_ARG_REGS);
        if let Some(entry) = sss.subs.first_mut() {
            for link in &mut entry.links {
                for i in 0..int_args {
                    link.int_outputs.set(int_base + i);
                }
                for i in 0..real_args {
                    link.real_outputs.set(real_base + i);
                }
            }
        }

        sss.compute_must_save()?;
        Ok(sss)
    }

    /// The subsection beginning at `label`.
    pub fn of_label(&self, label: usize) -> Option<usize> {
        self.label_map.get(label).copied().flatten()
    }

    fn map_label(&mut self, label: usize, sub: usize) {
        if label >= self.label_map.len() {
            self.label_map.resize(label + 1, None);
        }
        self.label_map[label] = Some(sub);
    }

    fn finalize(
        &mut self,
        section: &ArmSection,
        start: OpIdx,
        end: OpIdx,
        count: usize,
        pending_links: &mut Vec<(usize, OpIdx)>,
    ) -> Result<()> {
        let (int_base, real_base) = bases(section);
        let (int_inputs, real_inputs) = virt_inputs(section, start, end, int_base, real_base);
        let mut ss = SubSection {
            start,
            end,
            size: count,
            int_inputs,
            real_inputs,
            links: Vec::new(),
        };

        for (target, op) in pending_links.drain(..) {
            add_link(section, &mut ss, target, op)?;
        }

        // Fall through into a following label, unless the subsection ends
        // with an unconditional branch.
        let last = section.op(end);
        let falls_through = !matches!(
            &last.kind,
            OpKind::Instr(Instr::B(br)) if !br.link && br.ccode == Cond::Al
        );
        if falls_through {
            if let Some(next) = last.next {
                if let OpKind::Label(label) = section.op(next).kind {
                    add_link(section, &mut ss, label, next)?;
                }
            }
        }

        self.subs.push(ss);
        Ok(())
    }

    fn compute_must_save(&mut self) -> Result<()> {
        for sub in 0..self.subs.len() {
            for link in 0..self.subs[sub].links.len() {
                let (int_save, real_save) = self.link_must_save(sub, link)?;
                self.int_save.or(&int_save);
                self.real_save.or(&real_save);
                let l = &mut self.subs[sub].links[link];
                l.int_save = int_save;
                l.real_save = real_save;
            }
        }
        Ok(())
    }

    /// Depth-first over the subsection graph from one link, intersecting
    /// the link's outputs with every reachable subsection's inputs.
    fn link_must_save(&self, sub: usize, link: usize) -> Result<(BitSet, BitSet)> {
        let start = &self.subs[sub].links[link];
        let mut int_save = BitSet::new();
        let mut real_save = BitSet::new();
        let mut visited = BitSet::new();
        let mut stack = vec![start.target];
        visited.set(start.target);
        while let Some(label) = stack.pop() {
            let target = self
                .of_label(label)
                .ok_or(Error::Assertion("link to an unmapped label"))?;
            let next = &self.subs[target];
            let mut int_scratch = start.int_outputs.clone();
            int_scratch.and(&next.int_inputs);
            int_save.or(&int_scratch);
            let mut real_scratch = start.real_outputs.clone();
            real_scratch.and(&next.real_inputs);
            real_save.or(&real_scratch);
            for onward in &next.links {
                if !visited.isset(onward.target) {
                    visited.set(onward.target);
                    stack.push(onward.target);
                }
            }
        }
        Ok((int_save, real_save))
    }
}

fn bases(section: &ArmSection) -> (usize, usize) {
    (Reg::VIRT_BASE, section.fp_kind.virt_base())
}

fn add_link(section: &ArmSection, ss: &mut SubSection, target: usize, op: OpIdx) -> Result<()> {
    if ss.links.len() >= 2 {
        return Err(Error::Assertion("subsection with more than two links"));
    }
    let (int_base, real_base) = bases(section);
    // Both links leave from the same branch point, so the second's
    // outputs equal the first's; computing them once matters, this is
    // one of the most expensive parts of the compilation.
    let (int_outputs, real_outputs) = match ss.links.first() {
        Some(first) => (first.int_outputs.clone(), first.real_outputs.clone()),
        None => virt_mentioned(section, ss.start, op, int_base, real_base),
    };
    ss.links.push(Link {
        target,
        op,
        int_outputs,
        real_outputs,
        int_save: BitSet::new(),
        real_save: BitSet::new(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtilis_asm::{FpKind, Op2};

    // A two-way branch over a middle block:
    //   v0 = v1 + v2 ; CMP v0, #0 ; BEQ l0 ; v3 = v1 ; l0: ; v4 = v3 + v0
    fn diamondish() -> ArmSection {
        let mut s = ArmSection::new(8, 0, 0, 0, 0, 0, FpKind::Fpa);
        let v = |i: usize| Reg::from_ir(i);
        let l0 = s.fresh_label();
        s.add_instr(Instr::Data {
            op: subtilis_asm::DataOp::Add,
            instr: subtilis_asm::DataInstr {
                ccode: Cond::Al,
                status: false,
                dest: v(0),
                op1: v(1),
                op2: Op2::Reg(v(2)),
            },
        });
        s.add_cmp_imm(subtilis_asm::DataOp::Cmp, Cond::Al, v(0), 0);
        s.add_branch(Cond::Eq, l0);
        s.add_mov_reg(Cond::Al, false, v(3), v(1));
        s.add_label(l0);
        s.add_instr(Instr::Data {
            op: subtilis_asm::DataOp::Add,
            instr: subtilis_asm::DataInstr {
                ccode: Cond::Al,
                status: false,
                dest: v(4),
                op1: v(3),
                op2: Op2::Reg(v(0)),
            },
        });
        s
    }

    #[test]
    fn partitions_at_branches_and_labels() {
        let mut s = diamondish();
        let sss = SubSections::calculate(&mut s).unwrap();
        // head (to the BEQ), middle (the MOV), tail (from l0).
        assert_eq!(sss.subs.len(), 3);
        assert_eq!(sss.subs[0].links.len(), 2);
        assert_eq!(sss.subs[1].links.len(), 1);
        assert!(sss.subs[2].links.is_empty());
        // A synthetic label now sits between the BEQ and the MOV.
        assert!(matches!(
            s.op(sss.subs[1].start).kind,
            OpKind::Label(_)
        ));
    }

    #[test]
    fn must_save_follows_reachable_inputs() {
        let mut s = diamondish();
        let sss = SubSections::calculate(&mut s).unwrap();
        let v = |i: usize| Reg::from_ir(i).0;
        // Tail needs v3 and v0 on entry.
        assert!(sss.subs[2].int_inputs.isset(v(3)));
        assert!(sss.subs[2].int_inputs.isset(v(0)));
        // The head's branch edge to l0 must carry v0 but cannot carry v3,
        // which the head never defines.
        let branch_link = &sss.subs[0].links[0];
        assert!(branch_link.int_save.isset(v(0)));
        assert!(!branch_link.int_save.isset(v(3)));
        // The fall-through edge into the middle block also keeps v1 alive
        // for the MOV.
        let fall = &sss.subs[0].links[1];
        assert!(fall.int_save.isset(v(1)));
        // The middle block's edge into the tail carries v3.  v0 passes
        // through untouched: the head's fall-through edge already saved
        // it, and the middle block never loads it, so its slot stays
        // good without another store.
        let mid = &sss.subs[1].links[0];
        assert!(mid.int_save.isset(v(3)));
        assert!(!mid.int_save.isset(v(0)));
    }
}
