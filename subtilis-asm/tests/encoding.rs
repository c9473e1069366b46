//! Encoder validation: the golden words plus encode/disassemble round
//! trips over the instruction subset the compiler produces.

use proptest::prelude::*;
use rstest::rstest;
use subtilis_asm::*;

#[rstest]
#[case::moveq(
    Instr::Data {
        op: DataOp::Mov,
        instr: DataInstr {
            ccode: Cond::Eq,
            status: false,
            dest: Reg(0),
            op1: Reg(0),
            op2: Op2::Reg(Reg(1)),
        },
    },
    0x01a0_0001
)]
#[case::mvnsne(
    Instr::Data {
        op: DataOp::Mvn,
        instr: DataInstr {
            ccode: Cond::Ne,
            status: true,
            dest: Reg(0),
            op1: Reg(0),
            op2: Op2::Reg(Reg(1)),
        },
    },
    0x11f0_0001
)]
#[case::ldrcs(
    Instr::Stran {
        op: StranOp::Ldr,
        instr: StranInstr {
            ccode: Cond::Cs,
            dest: Reg(0),
            base: Reg(2),
            offset: Op2::Imm(16),
            pre_indexed: true,
            write_back: false,
            subtract: false,
        },
    },
    0x2592_0010
)]
#[case::mullt(
    Instr::Mul {
        op: MulOp::Mul,
        instr: MulInstr {
            ccode: Cond::Lt,
            status: false,
            dest: Reg(0),
            rm: Reg(2),
            rs: Reg(1),
            rn: Reg(0),
        },
    },
    0xb000_0192
)]
#[case::bmi(
    Instr::B(BrInstr {
        ccode: Cond::Mi,
        link: false,
        link_type: BrLinkType::Void,
        target: BrTarget::Offset(-2),
    }),
    0x4aff_fffe
)]
#[case::ldmed(
    Instr::Mtran {
        op: MtranOp::Ldm,
        instr: MtranInstr {
            ccode: Cond::Al,
            op0: Reg(0),
            reg_list: RegSet::R3 | RegSet::R4 | RegSet::R5 | RegSet::R6 | RegSet::R7 | RegSet::R8,
            mode: MtranMode::Ed,
            write_back: true,
        },
    },
    0xe9b0_01f8
)]
#[case::mov_asr_reg(
    Instr::Data {
        op: DataOp::Mov,
        instr: DataInstr {
            ccode: Cond::Al,
            status: false,
            dest: Reg(0),
            op1: Reg(0),
            op2: Op2::Shifted(Shift {
                reg: Reg(1),
                kind: ShiftKind::Asr,
                amount: ShiftAmount::Reg(Reg(2)),
            }),
        },
    },
    0xe1a0_0251
)]
fn golden_encodings(#[case] instr: Instr, #[case] expected: u32) {
    assert_eq!(encode_instr(&instr).unwrap(), expected);
    assert_eq!(disassemble(expected), Some(instr));
}

fn cond_strategy() -> impl Strategy<Value = Cond> {
    prop_oneof![
        Just(Cond::Eq),
        Just(Cond::Ne),
        Just(Cond::Cs),
        Just(Cond::Cc),
        Just(Cond::Mi),
        Just(Cond::Pl),
        Just(Cond::Vs),
        Just(Cond::Vc),
        Just(Cond::Hi),
        Just(Cond::Ls),
        Just(Cond::Ge),
        Just(Cond::Lt),
        Just(Cond::Gt),
        Just(Cond::Le),
        Just(Cond::Al),
    ]
}

fn reg_strategy() -> impl Strategy<Value = Reg> {
    (0usize..16).prop_map(Reg)
}

fn imm_strategy() -> impl Strategy<Value = u32> {
    (0u32..=0xff, 0u32..16).prop_map(|(value, rot)| value.rotate_right(rot * 2))
}

fn shift_strategy() -> impl Strategy<Value = Op2> {
    let kind = prop_oneof![
        Just(ShiftKind::Lsl),
        Just(ShiftKind::Lsr),
        Just(ShiftKind::Asr),
        Just(ShiftKind::Ror),
    ];
    (reg_strategy(), kind, prop_oneof![
        (1i32..32).prop_map(ShiftAmount::Imm),
        reg_strategy().prop_map(ShiftAmount::Reg),
    ])
        .prop_map(|(reg, kind, amount)| Op2::Shifted(Shift { reg, kind, amount }))
}

fn op2_strategy() -> impl Strategy<Value = Op2> {
    prop_oneof![
        imm_strategy().prop_map(Op2::Imm),
        reg_strategy().prop_map(Op2::Reg),
        shift_strategy(),
    ]
}

fn data_strategy() -> impl Strategy<Value = Instr> {
    let op = prop_oneof![
        Just(DataOp::And),
        Just(DataOp::Eor),
        Just(DataOp::Sub),
        Just(DataOp::Rsb),
        Just(DataOp::Add),
        Just(DataOp::Adc),
        Just(DataOp::Sbc),
        Just(DataOp::Rsc),
        Just(DataOp::Tst),
        Just(DataOp::Teq),
        Just(DataOp::Cmp),
        Just(DataOp::Cmn),
        Just(DataOp::Orr),
        Just(DataOp::Mov),
        Just(DataOp::Bic),
        Just(DataOp::Mvn),
    ];
    (op, cond_strategy(), any::<bool>(), reg_strategy(), reg_strategy(), op2_strategy()).prop_map(
        |(op, ccode, status, dest, op1, op2)| {
            // Mirror the emit helper conventions so equality survives the
            // round trip: compares always set flags and alias their
            // operand, moves alias their destination.
            let (status, dest, op1) = if op.is_compare() {
                (true, op1, op1)
            } else if op.is_move() {
                (status, dest, dest)
            } else {
                (status, dest, op1)
            };
            Instr::Data {
                op,
                instr: DataInstr {
                    ccode,
                    status,
                    dest,
                    op1,
                    op2,
                },
            }
        },
    )
}

fn mul_strategy() -> impl Strategy<Value = Instr> {
    (
        any::<bool>(),
        cond_strategy(),
        any::<bool>(),
        reg_strategy(),
        reg_strategy(),
        reg_strategy(),
        reg_strategy(),
    )
        .prop_map(|(mla, ccode, status, dest, rm, rs, rn)| Instr::Mul {
            op: if mla { MulOp::Mla } else { MulOp::Mul },
            instr: MulInstr {
                ccode,
                status,
                dest,
                rm,
                rs,
                rn: if mla { rn } else { Reg(0) },
            },
        })
}

fn stran_strategy() -> impl Strategy<Value = Instr> {
    let op = prop_oneof![
        Just(StranOp::Ldr),
        Just(StranOp::Str),
        Just(StranOp::Ldrb),
        Just(StranOp::Strb),
    ];
    (
        op,
        cond_strategy(),
        reg_strategy(),
        reg_strategy(),
        (0u32..=4095).prop_map(Op2::Imm),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(op, ccode, dest, base, offset, pre_indexed, write_back, subtract)| Instr::Stran {
                op,
                instr: StranInstr {
                    ccode,
                    dest,
                    base,
                    offset,
                    pre_indexed,
                    write_back,
                    subtract,
                },
            },
        )
}

fn mtran_strategy() -> impl Strategy<Value = Instr> {
    let mode = prop_oneof![
        Just(MtranMode::Fd),
        Just(MtranMode::Ed),
        Just(MtranMode::Fa),
        Just(MtranMode::Ea),
    ];
    (
        any::<bool>(),
        cond_strategy(),
        reg_strategy(),
        any::<u32>(),
        mode,
        any::<bool>(),
    )
        .prop_map(|(load, ccode, op0, bits, mode, write_back)| Instr::Mtran {
            op: if load { MtranOp::Ldm } else { MtranOp::Stm },
            instr: MtranInstr {
                ccode,
                op0,
                reg_list: RegSet::from_bits_truncate(bits),
                mode,
                write_back,
            },
        })
}

fn branch_strategy() -> impl Strategy<Value = Instr> {
    (cond_strategy(), any::<bool>(), -(1i32 << 23)..(1 << 23)).prop_map(|(ccode, link, offset)| {
        Instr::B(BrInstr {
            ccode,
            link,
            link_type: BrLinkType::Void,
            target: BrTarget::Offset(offset),
        })
    })
}

fn swi_strategy() -> impl Strategy<Value = Instr> {
    (cond_strategy(), 0u32..0x0100_0000).prop_map(|(ccode, code)| {
        Instr::Swi(SwiInstr {
            ccode,
            code,
            read_mask: RegSet::empty(),
            write_mask: RegSet::empty(),
        })
    })
}

proptest! {
    #[test]
    fn round_trip(instr in prop_oneof![
        data_strategy(),
        mul_strategy(),
        stran_strategy(),
        mtran_strategy(),
        branch_strategy(),
        swi_strategy(),
    ]) {
        let word = encode_instr(&instr).unwrap();
        prop_assert_eq!(disassemble(word), Some(instr));
    }
}
