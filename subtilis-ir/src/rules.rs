//! Rule patterns and the greedy matcher.
//!
//! A rule is a short sequence of op patterns paired (by the caller) with a
//! handler.  Matching is longest-match, first-rule-wins at every IR
//! position: the table is scanned top to bottom and the first rule whose
//! whole pattern sequence matches is taken, consuming as many ops as it
//! has patterns.  Compound rules therefore sit above the single-op rules
//! they subsume, which is how compare-and-branch pairs collapse onto the
//! condition codes without a separate IR peephole.

use crate::{CallKind, Op, OpCode, Operand, Section};

/// One operand pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgPat {
    /// Matches anything.
    Any,
    /// Matches anything, binding variable `n` to the operand's value.
    Bind(u8),
    /// Matches only the value previously bound to variable `n`.
    Ref(u8),
    /// Matches the exact integer immediate.
    IntImm(i32),
}

/// One op pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpPat {
    /// An instruction with the opcode and operand shapes.
    Instr {
        /// Required opcode.
        op: OpCode,
        /// Operand patterns; unused slots must be [`ArgPat::Any`].
        args: [ArgPat; 4],
    },
    /// Any label definition, binding its id to variable `n`.
    Label(u8),
    /// A label definition whose id was previously bound to variable `n`.
    LabelRef(u8),
    /// A call of the given kind.
    Call(CallKind),
    /// A system call.
    SysCall,
}

/// A pattern sequence plus its handler tag.  The tag is opaque here; the
/// back end maps it to an emitter.  Tables are built once per run, the
/// way the reference rules are parsed from their source form at start
/// up, so rules own their patterns.
#[derive(Debug, Clone)]
pub struct Rule<A> {
    /// Pattern sequence, matched against consecutive ops.
    pub pattern: Vec<OpPat>,
    /// Handler tag.
    pub action: A,
}

/// Matching failure: no rule matched at `pos`.  This is a compiler bug in
/// the rule table, not a user error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no rule matches IR op {pos}: {found}")]
pub struct MatchError {
    /// Index of the unmatched op.
    pub pos: usize,
    /// Rendering of the op for the bug report.
    pub found: String,
}

const MAX_BINDINGS: usize = 4;

fn operand_value(operand: &Operand) -> Option<usize> {
    match operand {
        Operand::Reg(r) | Operand::FReg(r) => Some(*r),
        Operand::Label(l) => Some(*l),
        Operand::Integer(_) | Operand::Real(_) | Operand::None => None,
    }
}

fn match_arg(
    pat: &ArgPat,
    operand: &Operand,
    bindings: &mut [Option<usize>; MAX_BINDINGS],
) -> bool {
    match pat {
        ArgPat::Any => true,
        ArgPat::Bind(n) => match operand_value(operand) {
            Some(v) => {
                bindings[*n as usize] = Some(v);
                true
            }
            None => false,
        },
        ArgPat::Ref(n) => bindings[*n as usize].is_some()
            && operand_value(operand) == bindings[*n as usize],
        ArgPat::IntImm(want) => matches!(operand, Operand::Integer(i) if i == want),
    }
}

fn match_op(pat: &OpPat, op: &Op, bindings: &mut [Option<usize>; MAX_BINDINGS]) -> bool {
    match (pat, op) {
        (OpPat::Instr { op: want, args }, Op::Instr(inst)) => {
            inst.op == *want
                && args
                    .iter()
                    .zip(inst.operands.iter())
                    .all(|(a, o)| match_arg(a, o, bindings))
        }
        (OpPat::Label(n), Op::Label(l)) => {
            bindings[*n as usize] = Some(*l);
            true
        }
        (OpPat::LabelRef(n), Op::Label(l)) => bindings[*n as usize] == Some(*l),
        (OpPat::Call(kind), Op::Call { kind: found, .. }) => kind == found,
        (OpPat::SysCall, Op::SysCall(_)) => true,
        _ => false,
    }
}

fn match_at<A>(rule: &Rule<A>, section: &Section, pos: usize) -> bool {
    if pos + rule.pattern.len() > section.ops.len() {
        return false;
    }
    let mut bindings = [None; MAX_BINDINGS];
    rule.pattern
        .iter()
        .enumerate()
        .all(|(i, pat)| match_op(pat, &section.ops[pos + i], &mut bindings))
}

/// Walks `section` left to right, calling `apply(action, pos)` for the
/// first rule matching at each position and advancing past the consumed
/// ops.  The callback's error aborts the walk.
pub fn match_section<A: Copy, E: From<MatchError>>(
    section: &Section,
    rules: &[Rule<A>],
    mut apply: impl FnMut(A, usize) -> Result<(), E>,
) -> Result<(), E> {
    let mut pos = 0;
    while pos < section.ops.len() {
        let rule = rules
            .iter()
            .find(|rule| match_at(rule, section, pos))
            .ok_or_else(|| MatchError {
                pos,
                found: format!("{:?}", section.ops[pos]),
            })?;
        apply(rule.action, pos)?;
        pos += rule.pattern.len();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeSig;

    const ANY4: [ArgPat; 4] = [ArgPat::Any; 4];

    fn instr(op: OpCode, args: [ArgPat; 4]) -> OpPat {
        OpPat::Instr { op, args }
    }

    #[test]
    fn compound_rule_wins_over_single() {
        // lti32 r_1, *, * / jmpc r_1, label_1, * / label_1
        let rules = [
            Rule {
                pattern: vec![
                    instr(
                        OpCode::LTI32,
                        [ArgPat::Bind(0), ArgPat::Any, ArgPat::Any, ArgPat::Any],
                    ),
                    instr(
                        OpCode::JMPC,
                        [ArgPat::Ref(0), ArgPat::Bind(1), ArgPat::Any, ArgPat::Any],
                    ),
                    OpPat::LabelRef(1),
                ],
                action: "fused",
            },
            Rule {
                pattern: vec![instr(OpCode::LTI32, ANY4)],
                action: "lti32",
            },
            Rule {
                pattern: vec![instr(OpCode::JMPC, ANY4)],
                action: "jmpc",
            },
            Rule {
                pattern: vec![OpPat::Label(0)],
                action: "label",
            },
        ];

        let mut s = Section::new(TypeSig::PROC, 0);
        let cond = s.new_reg();
        let t = s.new_label();
        let f = s.new_label();
        s.add_instr(
            OpCode::LTI32,
            &[Operand::Reg(cond), Operand::Reg(1), Operand::Reg(2)],
        );
        s.add_instr(
            OpCode::JMPC,
            &[Operand::Reg(cond), Operand::Label(t), Operand::Label(f)],
        );
        s.add_label(t);

        let mut hits = Vec::new();
        match_section::<_, MatchError>(&s, &rules, |a, pos| {
            hits.push((a, pos));
            Ok(())
        })
        .unwrap();
        assert_eq!(hits, vec![("fused", 0)]);
    }

    #[test]
    fn back_reference_mismatch_falls_through() {
        let rules = [
            Rule {
                pattern: vec![
                    instr(
                        OpCode::LTI32,
                        [ArgPat::Bind(0), ArgPat::Any, ArgPat::Any, ArgPat::Any],
                    ),
                    instr(
                        OpCode::JMPC,
                        [ArgPat::Ref(0), ArgPat::Any, ArgPat::Any, ArgPat::Any],
                    ),
                ],
                action: "fused",
            },
            Rule {
                pattern: vec![instr(OpCode::LTI32, ANY4)],
                action: "lti32",
            },
            Rule {
                pattern: vec![instr(OpCode::JMPC, ANY4)],
                action: "jmpc",
            },
        ];

        let mut s = Section::new(TypeSig::PROC, 0);
        s.add_instr(
            OpCode::LTI32,
            &[Operand::Reg(0), Operand::Reg(1), Operand::Reg(2)],
        );
        // Branches on a different register, so the pair must not fuse.
        s.add_instr(
            OpCode::JMPC,
            &[Operand::Reg(9), Operand::Label(0), Operand::Label(0)],
        );

        let mut hits = Vec::new();
        match_section::<_, MatchError>(&s, &rules, |a, pos| {
            hits.push((a, pos));
            Ok(())
        })
        .unwrap();
        assert_eq!(hits, vec![("lti32", 0), ("jmpc", 1)]);
    }

    #[test]
    fn unmatched_op_is_a_bug() {
        let rules: [Rule<&str>; 0] = [];
        let mut s = Section::new(TypeSig::PROC, 0);
        s.add_instr(OpCode::PRINTNL, &[]);
        let err = match_section::<_, MatchError>(&s, &rules, |_, _| Ok(()))
            .expect_err("must not match");
        assert_eq!(err.pos, 0);
    }
}
