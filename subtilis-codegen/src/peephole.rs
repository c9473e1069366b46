//! Local rewrites on the finished instruction list.
//!
//! Runs after call-site fixup, so any transfer still predicated `NV` is a
//! reserve slot nobody claimed and can go.  Also expands the synthetic
//! conditional move into real instructions, drops self-moves, deletes
//! code between an unconditional branch and the next label, and elides a
//! reload that immediately follows the matching spill store.

use crate::Result;
use subtilis_asm::{
    ArmSection, Cond, DataInstr, DataOp, Instr, Op2, OpIdx, OpKind, StranOp,
};

/// Runs every rewrite to a fixed point (two sweeps suffice: expansion can
/// only create self-moves, nothing else creates new work).
pub fn peephole(section: &mut ArmSection) -> Result<()> {
    expand_cmov(section);
    sweep(section);
    sweep(section);
    Ok(())
}

fn expand_cmov(section: &mut ArmSection) {
    let ops: Vec<OpIdx> = section.indices().collect();
    for idx in ops {
        let cmov = match &section.op(idx).kind {
            OpKind::Instr(Instr::Cmov(c)) => *c,
            _ => continue,
        };
        if !cmov.fused {
            section.insert_before(
                idx,
                OpKind::Instr(Instr::Data {
                    op: DataOp::Cmp,
                    instr: DataInstr {
                        ccode: Cond::Al,
                        status: true,
                        dest: cmov.op1,
                        op1: cmov.op1,
                        op2: Op2::Imm(0),
                    },
                }),
            );
        }
        section.insert_before(
            idx,
            OpKind::Instr(Instr::Data {
                op: DataOp::Mov,
                instr: DataInstr {
                    ccode: cmov.true_cond,
                    status: false,
                    dest: cmov.dest,
                    op1: cmov.dest,
                    op2: Op2::Reg(cmov.op2),
                },
            }),
        );
        section.insert_before(
            idx,
            OpKind::Instr(Instr::Data {
                op: DataOp::Mov,
                instr: DataInstr {
                    ccode: cmov.true_cond.invert(),
                    status: false,
                    dest: cmov.dest,
                    op1: cmov.dest,
                    op2: Op2::Reg(cmov.op3),
                },
            }),
        );
        section.remove(idx);
    }
}

fn sweep(section: &mut ArmSection) {
    let ops: Vec<OpIdx> = section.indices().collect();
    let mut dead_until_label = false;
    for idx in ops {
        let instr = match &section.op(idx).kind {
            OpKind::Label(_) => {
                dead_until_label = false;
                continue;
            }
            OpKind::Directive(_) => continue,
            OpKind::Instr(instr) => *instr,
        };

        if dead_until_label {
            section.remove(idx);
            continue;
        }

        // Unclaimed preserve slots.
        if instr.ccode() == Cond::Nv {
            section.remove(idx);
            continue;
        }

        // MOV rd, rd moves nothing.
        if let Instr::Data { op: DataOp::Mov, instr: d } = &instr {
            if !d.status && d.op2 == Op2::Reg(d.dest) {
                section.remove(idx);
                continue;
            }
        }

        // A reload right after the matching spill store.
        if let Instr::Stran { op: StranOp::Ldr, instr: load } = &instr {
            let stored = section.op(idx).prev.and_then(|prev| {
                match &section.op(prev).kind {
                    OpKind::Instr(Instr::Stran {
                        op: StranOp::Str,
                        instr: store,
                    }) => Some(*store),
                    _ => None,
                }
            });
            if let Some(store) = stored {
                if store.ccode == Cond::Al
                    && load.ccode == Cond::Al
                    && store.dest == load.dest
                    && store.base == load.base
                    && store.offset == load.offset
                    && !store.write_back
                    && !load.write_back
                    && store.pre_indexed
                    && load.pre_indexed
                    && store.subtract == load.subtract
                {
                    section.remove(idx);
                    continue;
                }
            }
        }

        if let Instr::B(br) = &instr {
            if !br.link && br.ccode == Cond::Al {
                dead_until_label = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtilis_asm::{CmovInstr, FpKind, Reg};

    fn section() -> ArmSection {
        ArmSection::new(0, 0, 4, 0, 0, 0, FpKind::Fpa)
    }

    fn count_instrs(s: &ArmSection) -> usize {
        s.indices()
            .filter(|i| matches!(s.op(*i).kind, OpKind::Instr(_)))
            .count()
    }

    #[test]
    fn nv_slots_and_self_moves_go() {
        let mut s = section();
        s.fpa_push_reg(Cond::Nv, subtilis_asm::FReg(4));
        s.add_mov_reg(Cond::Al, false, Reg(3), Reg(3));
        s.add_mov_reg(Cond::Al, false, Reg(3), Reg(4));
        peephole(&mut s).unwrap();
        assert_eq!(count_instrs(&s), 1);
    }

    #[test]
    fn unreachable_tail_is_deleted() {
        let mut s = section();
        let l = s.fresh_label();
        s.add_branch(Cond::Al, l);
        s.add_mov_reg(Cond::Al, false, Reg(0), Reg(1));
        s.add_mov_reg(Cond::Al, false, Reg(2), Reg(3));
        s.add_label(l);
        s.add_mov_reg(Cond::Al, false, Reg(4), Reg(5));
        peephole(&mut s).unwrap();
        assert_eq!(count_instrs(&s), 2);
    }

    #[test]
    fn cmov_expands_to_predicated_moves() {
        let mut s = section();
        s.add_instr(Instr::Cmov(CmovInstr {
            dest: Reg(0),
            op1: Reg(1),
            op2: Reg(2),
            op3: Reg(3),
            fused: false,
            true_cond: Cond::Ne,
        }));
        peephole(&mut s).unwrap();
        let kinds: Vec<String> = s
            .indices()
            .map(|i| match &s.op(i).kind {
                OpKind::Instr(Instr::Data { op, instr }) => format!("{op:?}{}", instr.ccode),
                other => panic!("{other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["Cmp", "MovNE", "MovEQ"]);
    }

    #[test]
    fn store_then_reload_drops_the_reload() {
        let mut s = section();
        s.add_stran_imm(StranOp::Str, Cond::Al, Reg(4), Reg::FP, 8, false);
        s.add_stran_imm(StranOp::Ldr, Cond::Al, Reg(4), Reg::FP, 8, false);
        peephole(&mut s).unwrap();
        assert_eq!(count_instrs(&s), 1);
    }
}
