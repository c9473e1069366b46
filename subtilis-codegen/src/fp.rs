//! The floating point variant interface.
//!
//! A program is generated for exactly one coprocessor family.  Everything
//! the shared passes need to know about the family — how to move and
//! spill registers, how to reserve preserve slots around calls, how to
//! initialise the unit in the preamble — sits behind this trait, with one
//! implementation per family.  The allocator is generic over the backend
//! so its inner loop monomorphises; the emitters take it as a trait
//! object.

use subtilis_asm::{
    ArmSection, Cond, FReg, FpKind, FpaStranInstr, FpaStranOp, Instr, OpIdx, OpKind, Reg, RegSet,
    VfpStranInstr, VfpStranOp, VfpSysReg, VfpSysregInstr, VfpSysregOp,
};

/// Behaviour that differs between the FPA and VFP families.
pub trait FpBackend {
    /// Which family this is.
    fn kind(&self) -> FpKind;

    /// Emits the unit initialisation into the program preamble.
    fn preamble(&self, section: &mut ArmSection);

    /// Appends a register-to-register move.
    fn mov_reg(&self, section: &mut ArmSection, ccode: Cond, dest: FReg, src: FReg);

    /// Appends a reserved preserve slot, predicated `NV` until call-site
    /// fixup decides the register is live across the call.
    fn push_reg(&self, section: &mut ArmSection, reg: FReg) -> OpIdx;

    /// Appends the matching restore slot.
    fn pop_reg(&self, section: &mut ArmSection, reg: FReg) -> OpIdx;

    /// Appends a store of `src` to a stack argument slot `offset` bytes
    /// below the stack pointer.
    fn store_arg(&self, section: &mut ArmSection, src: FReg, offset: i32) -> OpIdx;

    /// Appends a load of a stack argument slot `offset` bytes below the
    /// stack pointer into `dest`; the callee runs this before claiming
    /// its frame.
    fn load_arg(&self, section: &mut ArmSection, dest: FReg, offset: i32) -> OpIdx;

    /// Inserts a spill store in front of `at`.  `offset` is relative to
    /// the frame pointer and may exceed the family's transfer range, in
    /// which case the store goes through `scratch`.
    fn spill_store(
        &self,
        section: &mut ArmSection,
        at: OpIdx,
        phys: FReg,
        offset: i32,
        scratch: Reg,
    );

    /// Inserts a spill reload in front of `at`.
    fn spill_load(
        &self,
        section: &mut ArmSection,
        at: OpIdx,
        phys: FReg,
        offset: i32,
        scratch: Reg,
    );

    /// Number of physical registers.
    fn phys_count(&self) -> usize {
        self.kind().phys_count()
    }

    /// True if `reg` denotes a physical register.
    fn is_fixed(&self, reg: FReg) -> bool {
        reg.is_fixed(self.phys_count())
    }

    /// Bytes one spilled register occupies.
    fn reg_size(&self) -> u32 {
        8
    }

    /// Largest immediate byte offset of the family's transfer form.
    fn max_offset(&self) -> i32 {
        1020
    }
}

/// FPA behaviour.  Doubles everywhere; the unit is set up by clearing the
/// exception enable bits of the status word.
pub struct FpaBackend;

impl FpBackend for FpaBackend {
    fn kind(&self) -> FpKind {
        FpKind::Fpa
    }

    fn preamble(&self, section: &mut ArmSection) {
        use subtilis_asm::{FpaCptranInstr, FpaCptranOp};
        // Mask every FP exception so faults surface as IEEE results
        // rather than aborts; the error channel reports them instead.
        let status = section.fresh_reg();
        section.add_instr(Instr::FpaCptran {
            op: FpaCptranOp::Rfs,
            instr: FpaCptranInstr {
                ccode: Cond::Al,
                dest: status,
            },
        });
        section.add_instr(Instr::Data {
            op: subtilis_asm::DataOp::Bic,
            instr: subtilis_asm::DataInstr {
                ccode: Cond::Al,
                status: false,
                dest: status,
                op1: status,
                op2: subtilis_asm::Op2::Imm(0x1f),
            },
        });
        section.add_instr(Instr::FpaCptran {
            op: FpaCptranOp::Wfs,
            instr: FpaCptranInstr {
                ccode: Cond::Al,
                dest: status,
            },
        });
    }

    fn mov_reg(&self, section: &mut ArmSection, ccode: Cond, dest: FReg, src: FReg) {
        section.fpa_add_mov(ccode, subtilis_asm::FpaRounding::Nearest, dest, src);
    }

    fn push_reg(&self, section: &mut ArmSection, reg: FReg) -> OpIdx {
        section.fpa_push_reg(Cond::Nv, reg)
    }

    fn pop_reg(&self, section: &mut ArmSection, reg: FReg) -> OpIdx {
        section.fpa_pop_reg(Cond::Nv, reg)
    }

    fn store_arg(&self, section: &mut ArmSection, src: FReg, offset: i32) -> OpIdx {
        section.add_instr(Instr::FpaStran {
            op: FpaStranOp::Stf,
            instr: FpaStranInstr {
                ccode: Cond::Al,
                size: subtilis_asm::FpaPrecision::Double,
                dest: src,
                base: Reg::SP,
                offset,
                pre_indexed: true,
                write_back: false,
                subtract: true,
            },
        })
    }

    fn load_arg(&self, section: &mut ArmSection, dest: FReg, offset: i32) -> OpIdx {
        section.add_instr(Instr::FpaStran {
            op: FpaStranOp::Ldf,
            instr: FpaStranInstr {
                ccode: Cond::Al,
                size: subtilis_asm::FpaPrecision::Double,
                dest,
                base: Reg::SP,
                offset,
                pre_indexed: true,
                write_back: false,
                subtract: true,
            },
        })
    }

    fn spill_store(
        &self,
        section: &mut ArmSection,
        at: OpIdx,
        phys: FReg,
        offset: i32,
        scratch: Reg,
    ) {
        fpa_spill(section, at, FpaStranOp::Stf, phys, offset, scratch, self.max_offset());
    }

    fn spill_load(
        &self,
        section: &mut ArmSection,
        at: OpIdx,
        phys: FReg,
        offset: i32,
        scratch: Reg,
    ) {
        fpa_spill(section, at, FpaStranOp::Ldf, phys, offset, scratch, self.max_offset());
    }
}

fn fpa_spill(
    section: &mut ArmSection,
    at: OpIdx,
    op: FpaStranOp,
    phys: FReg,
    offset: i32,
    scratch: Reg,
    max_offset: i32,
) {
    let (base, offset) = spill_base(section, at, offset, scratch, max_offset);
    section.insert_before(
        at,
        OpKind::Instr(Instr::FpaStran {
            op,
            instr: FpaStranInstr {
                ccode: Cond::Al,
                size: subtilis_asm::FpaPrecision::Double,
                dest: phys,
                base,
                offset,
                pre_indexed: true,
                write_back: false,
                subtract: false,
            },
        }),
    );
}

// Spill offsets beyond the transfer range go through an integer scratch
// register the allocator set aside for the purpose.
fn spill_base(
    section: &mut ArmSection,
    at: OpIdx,
    offset: i32,
    scratch: Reg,
    max_offset: i32,
) -> (Reg, i32) {
    if offset <= max_offset {
        return (Reg::FP, offset);
    }
    let (head, rest) = subtilis_asm::split_imm(offset as u32);
    debug_assert!(rest as i32 <= max_offset, "spill offset {offset} unreachable");
    section.insert_before(
        at,
        OpKind::Instr(Instr::Data {
            op: subtilis_asm::DataOp::Add,
            instr: subtilis_asm::DataInstr {
                ccode: Cond::Al,
                status: false,
                dest: scratch,
                op1: Reg::FP,
                op2: subtilis_asm::Op2::Imm(head),
            },
        }),
    );
    (scratch, rest as i32)
}

/// VFP behaviour.
pub struct VfpBackend;

impl FpBackend for VfpBackend {
    fn kind(&self) -> FpKind {
        FpKind::Vfp
    }

    fn preamble(&self, section: &mut ArmSection) {
        // Default FPSCR: round to nearest, exceptions masked.
        let zero = section.fresh_reg();
        section.add_mov_imm(Cond::Al, false, zero, 0);
        section.add_instr(Instr::VfpSysreg {
            op: VfpSysregOp::Fmxr,
            instr: VfpSysregInstr {
                ccode: Cond::Al,
                sysreg: VfpSysReg::Fpscr,
                arm_reg: zero,
            },
        });
    }

    fn mov_reg(&self, section: &mut ArmSection, ccode: Cond, dest: FReg, src: FReg) {
        section.vfp_add_copy(ccode, dest, src);
    }

    fn push_reg(&self, section: &mut ArmSection, reg: FReg) -> OpIdx {
        section.vfp_push_reg(Cond::Nv, reg)
    }

    fn pop_reg(&self, section: &mut ArmSection, reg: FReg) -> OpIdx {
        section.vfp_pop_reg(Cond::Nv, reg)
    }

    fn store_arg(&self, section: &mut ArmSection, src: FReg, offset: i32) -> OpIdx {
        section.add_instr(Instr::VfpStran {
            op: VfpStranOp::Fstd,
            instr: VfpStranInstr {
                ccode: Cond::Al,
                dest: src,
                base: Reg::SP,
                offset,
                pre_indexed: true,
                write_back: false,
                subtract: true,
            },
        })
    }

    fn load_arg(&self, section: &mut ArmSection, dest: FReg, offset: i32) -> OpIdx {
        section.add_instr(Instr::VfpStran {
            op: VfpStranOp::Fldd,
            instr: VfpStranInstr {
                ccode: Cond::Al,
                dest,
                base: Reg::SP,
                offset,
                pre_indexed: true,
                write_back: false,
                subtract: true,
            },
        })
    }

    fn spill_store(
        &self,
        section: &mut ArmSection,
        at: OpIdx,
        phys: FReg,
        offset: i32,
        scratch: Reg,
    ) {
        vfp_spill(section, at, VfpStranOp::Fstd, phys, offset, scratch, self.max_offset());
    }

    fn spill_load(
        &self,
        section: &mut ArmSection,
        at: OpIdx,
        phys: FReg,
        offset: i32,
        scratch: Reg,
    ) {
        vfp_spill(section, at, VfpStranOp::Fldd, phys, offset, scratch, self.max_offset());
    }
}

fn vfp_spill(
    section: &mut ArmSection,
    at: OpIdx,
    op: VfpStranOp,
    phys: FReg,
    offset: i32,
    scratch: Reg,
    max_offset: i32,
) {
    let (base, offset) = spill_base(section, at, offset, scratch, max_offset);
    section.insert_before(
        at,
        OpKind::Instr(Instr::VfpStran {
            op,
            instr: VfpStranInstr {
                ccode: Cond::Al,
                dest: phys,
                base,
                offset,
                pre_indexed: true,
                write_back: false,
                subtract: false,
            },
        }),
    );
}

/// Argument registers of the integer class.
pub const INT_ARG_REGS: usize = 4;
/// Argument registers of the floating point class.
pub const REAL_ARG_REGS: usize = 4;
/// Physical integer registers the allocator may hand out: r0-r10.
pub const INT_ALLOC_REGS: usize = 11;

/// The registers every call pushes regardless of liveness.
pub fn base_save_mask() -> RegSet {
    RegSet::FP | RegSet::LR
}
