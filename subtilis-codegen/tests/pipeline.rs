//! End-to-end: IR programs through the whole back end to words.

use rstest::rstest;
use std::collections::HashMap;
use subtilis_asm::{Instr, MtranOp, OpKind, Reg, RegSet};
use subtilis_codegen::{encode_program, generate, Error, FpBackend, FpaBackend, VfpBackend};
use subtilis_ir::{
    Call, CallKind, OpCode, Operand, Program, RetKind, Section, Settings, TypeSig,
};

const START: u32 = 0x8000;

fn settings() -> Settings {
    Settings {
        handle_escapes: false,
        ignore_graphics_errors: true,
        check_mem_leaks: false,
    }
}

// A procedure that computes through a call and a two-way branch, then
// exits.  Exercises selection, the fused compare rules, the call
// protocol, allocation and the coda.
fn sample_program() -> Program {
    let mut prog = Program::new(settings());

    let mut main = Section::new(TypeSig::PROC, 0);
    let v0 = main.new_reg();
    let v1 = main.new_reg();
    let v2 = main.new_reg();
    let v3 = main.new_reg();
    let v4 = main.new_reg();
    let v5 = main.new_reg();
    let v6 = main.new_reg();
    let lt = main.new_label();
    let lf = main.new_label();
    let lend = main.new_label();

    main.add_instr(OpCode::MOVII32, &[Operand::Reg(v0), Operand::Integer(10)]);
    main.add_instr(OpCode::MOVII32, &[Operand::Reg(v1), Operand::Integer(3)]);
    main.add_instr(
        OpCode::SUBI32,
        &[Operand::Reg(v2), Operand::Reg(v0), Operand::Reg(v1)],
    );
    main.add_call(
        CallKind::I32,
        Call {
            section: 1,
            args: vec![Operand::Reg(v2)],
            reg: v3,
        },
    );
    main.add_instr(
        OpCode::ADDII32,
        &[Operand::Reg(v4), Operand::Reg(v3), Operand::Integer(1)],
    );
    main.add_instr(
        OpCode::GTII32,
        &[Operand::Reg(v5), Operand::Reg(v4), Operand::Integer(5)],
    );
    main.add_instr(
        OpCode::JMPC,
        &[Operand::Reg(v5), Operand::Label(lt), Operand::Label(lf)],
    );
    main.add_label(lt);
    main.add_instr(OpCode::MOVII32, &[Operand::Reg(v6), Operand::Integer(1)]);
    main.add_instr(OpCode::JMP, &[Operand::Label(lend)]);
    main.add_label(lf);
    main.add_instr(OpCode::MOVII32, &[Operand::Reg(v6), Operand::Integer(2)]);
    main.add_label(lend);
    main.add_instr(OpCode::END, &[]);
    prog.add_section(main);

    let mut callee = Section::new(
        TypeSig {
            int_args: 1,
            real_args: 0,
            ret: RetKind::I32,
        },
        0,
    );
    let p0 = 0;
    let t = callee.new_reg();
    callee.add_instr(
        OpCode::ADDII32,
        &[Operand::Reg(t), Operand::Reg(p0), Operand::Integer(2)],
    );
    callee.add_instr(OpCode::RETI32, &[Operand::Reg(t)]);
    prog.add_section(callee);

    prog
}

fn assert_all_physical(section: &subtilis_asm::ArmSection) {
    for idx in section.indices().collect::<Vec<_>>() {
        if let OpKind::Instr(i) = &section.op(idx).kind {
            i.visit_int_reads(|r| assert!(r.is_fixed(), "virtual read {r} survived in {i:?}"));
            i.visit_int_writes(|r| assert!(r.is_fixed(), "virtual write {r} survived in {i:?}"));
        }
    }
}

#[rstest]
#[case::fpa(&FpaBackend)]
#[case::vfp(&VfpBackend)]
fn whole_pipeline_produces_an_image(#[case] fp: &dyn FpBackend) {
    let prog = sample_program();
    let arm = generate_dyn(&prog, fp);
    assert_eq!(arm.sections.len(), 2);
    for section in &arm.sections {
        assert_all_physical(section);
    }

    let words = encode_program(&arm).unwrap();
    // MOV pc, pc skips the heap base word.
    assert_eq!(words[0], 0xe1a0_f00f);
    // The heap begins exactly where the image ends.
    assert_eq!(words[1], START + 4 * words.len() as u32);
}

fn generate_dyn(prog: &Program, fp: &dyn FpBackend) -> subtilis_asm::ArmProgram {
    generate(prog, 16, fp, START, HashMap::new()).unwrap()
}

#[test]
fn call_sites_always_preserve_fp_and_lr() {
    let prog = sample_program();
    let arm = generate(&prog, 16, &FpaBackend, START, HashMap::new()).unwrap();
    let main = &arm.sections[0];
    assert_eq!(main.call_sites.len(), 1);
    let site = &main.call_sites[0];

    let stm_mask = match main.instr(site.stm) {
        Instr::Mtran { op: MtranOp::Stm, instr } => instr.reg_list,
        other => panic!("stm site holds {other:?}"),
    };
    let ldm_mask = match main.instr(site.ldm) {
        Instr::Mtran { op: MtranOp::Ldm, instr } => instr.reg_list,
        other => panic!("ldm site holds {other:?}"),
    };
    assert!(stm_mask.contains(RegSet::FP | RegSet::LR));
    assert_eq!(stm_mask, ldm_mask);
}

#[test]
fn fused_compare_collapses_to_a_conditional_branch() {
    let prog = sample_program();
    let arm = generate(&prog, 16, &FpaBackend, START, HashMap::new()).unwrap();
    let main = &arm.sections[0];

    // The gtii32/jmpc/label triple must not materialise -1/0; a single
    // CMP feeds a BLE straight to the false label.
    let mut saw_cmp_then_ble = false;
    let ops: Vec<_> = main.indices().collect();
    for pair in ops.windows(2) {
        if let (OpKind::Instr(Instr::Data { op, .. }), OpKind::Instr(Instr::B(br))) =
            (&main.op(pair[0]).kind, &main.op(pair[1]).kind)
        {
            if *op == subtilis_asm::DataOp::Cmp && br.ccode == subtilis_asm::Cond::Le {
                saw_cmp_then_ble = true;
            }
        }
    }
    assert!(saw_cmp_then_ble, "compare and branch did not fuse");
}

#[test]
fn real_arithmetic_flows_through_the_fpa() {
    let mut prog = Program::new(settings());
    let mut main = Section::new(TypeSig::PROC, 0);
    let f0 = main.new_freg();
    let f1 = main.new_freg();
    let f2 = main.new_freg();
    let i0 = main.new_reg();
    main.add_instr(OpCode::MOVIR, &[Operand::FReg(f0), Operand::Real(3.5)]);
    main.add_instr(OpCode::MOVIR, &[Operand::FReg(f1), Operand::Real(1.25)]);
    main.add_instr(
        OpCode::ADDR,
        &[Operand::FReg(f2), Operand::FReg(f0), Operand::FReg(f1)],
    );
    main.add_instr(OpCode::MOVFPI32, &[Operand::Reg(i0), Operand::FReg(f2)]);
    main.add_instr(OpCode::END, &[]);
    prog.add_section(main);

    let arm = generate(&prog, 16, &FpaBackend, START, HashMap::new()).unwrap();
    let main = &arm.sections[0];
    let mut saw_adf = false;
    let mut saw_fix = false;
    for idx in main.indices().collect::<Vec<_>>() {
        match &main.op(idx).kind {
            OpKind::Instr(Instr::FpaData { op, instr }) => {
                if *op == subtilis_asm::FpaDyadicOp::Adf {
                    saw_adf = true;
                    assert!(instr.dest.0 < 8, "unallocated FP register");
                }
            }
            OpKind::Instr(Instr::FpaTran { op, .. }) => {
                if *op == subtilis_asm::FpaTranOp::Fix {
                    saw_fix = true;
                }
            }
            _ => {}
        }
    }
    assert!(saw_adf && saw_fix);
    encode_program(&arm).unwrap();
}

#[test]
fn vfp_rejects_the_transcendentals() {
    let mut prog = Program::new(settings());
    let mut main = Section::new(TypeSig::PROC, 0);
    let f0 = main.new_freg();
    let f1 = main.new_freg();
    main.add_instr(OpCode::MOVIR, &[Operand::FReg(f0), Operand::Real(0.5)]);
    main.add_instr(OpCode::SIN, &[Operand::FReg(f1), Operand::FReg(f0)]);
    main.add_instr(OpCode::END, &[]);
    prog.add_section(main);

    let err = generate(&prog, 16, &VfpBackend, START, HashMap::new()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOnVariant(_)));
}

#[test]
fn register_pressure_spills_into_the_frame() {
    let mut prog = Program::new(settings());
    let mut main = Section::new(TypeSig::PROC, 0);
    let regs: Vec<usize> = (0..16).map(|_| main.new_reg()).collect();
    for (i, &r) in regs.iter().enumerate() {
        main.add_instr(
            OpCode::MOVII32,
            &[Operand::Reg(r), Operand::Integer(i as i32)],
        );
    }
    let sink = main.new_reg();
    main.add_instr(OpCode::MOVII32, &[Operand::Reg(sink), Operand::Integer(0)]);
    for &r in &regs {
        main.add_instr(
            OpCode::ADDI32,
            &[Operand::Reg(sink), Operand::Reg(sink), Operand::Reg(r)],
        );
    }
    main.add_instr(OpCode::END, &[]);
    prog.add_section(main);

    let arm = generate(&prog, 16, &FpaBackend, START, HashMap::new()).unwrap();
    assert_all_physical(&arm.sections[0]);
    // The prologue reservation must have grown beyond the locals.
    let frame = arm.sections[0]
        .indices()
        .find_map(|idx| match &arm.sections[0].op(idx).kind {
            OpKind::Instr(Instr::Data {
                op: subtilis_asm::DataOp::Sub,
                instr,
            }) if instr.dest == Reg::SP && instr.op1 == Reg::SP => match instr.op2 {
                subtilis_asm::Op2::Imm(v) => Some(v),
                _ => None,
            },
            _ => None,
        })
        .expect("no frame reservation found");
    assert!(frame > 0, "sixteen live values need spill slots");
    encode_program(&arm).unwrap();
}
