use crate::{Cond, FReg, Op2, Reg, RegSet};
use crate::fpa::*;
use crate::vfp::*;

/// Data processing opcode, bits 21-24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum DataOp {
    And = 0,
    Eor = 1,
    Sub = 2,
    Rsb = 3,
    Add = 4,
    Adc = 5,
    Sbc = 6,
    Rsc = 7,
    Tst = 8,
    Teq = 9,
    Cmp = 10,
    Cmn = 11,
    Orr = 12,
    Mov = 13,
    Bic = 14,
    Mvn = 15,
}

impl DataOp {
    /// True for the four comparison forms, which have no destination and
    /// always set flags.
    pub const fn is_compare(self) -> bool {
        matches!(self, DataOp::Tst | DataOp::Teq | DataOp::Cmp | DataOp::Cmn)
    }

    /// True for the two move forms, which have no first operand.
    pub const fn is_move(self) -> bool {
        matches!(self, DataOp::Mov | DataOp::Mvn)
    }
}

/// Payload shared by every data processing instruction.  `dest` is ignored
/// by the compare forms and `op1` by the move forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataInstr {
    /// Condition.
    pub ccode: Cond,
    /// S bit.
    pub status: bool,
    /// Destination register.
    pub dest: Reg,
    /// First operand register.
    pub op1: Reg,
    /// Second operand.
    pub op2: Op2,
}

/// Multiply family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum MulOp {
    /// `MUL dest, rm, rs`.
    Mul,
    /// `MLA dest, rm, rs, rn`.
    Mla,
}

/// Multiply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulInstr {
    /// Condition.
    pub ccode: Cond,
    /// S bit.
    pub status: bool,
    /// Destination register.
    pub dest: Reg,
    /// First factor.
    pub rm: Reg,
    /// Second factor.
    pub rs: Reg,
    /// Accumulator, read only by `MLA`.
    pub rn: Reg,
}

/// Single data transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum StranOp {
    /// Word load.
    Ldr,
    /// Word store.
    Str,
    /// Byte load.
    Ldrb,
    /// Byte store.
    Strb,
}

impl StranOp {
    /// True for the two load forms.
    pub const fn is_load(self) -> bool {
        matches!(self, StranOp::Ldr | StranOp::Ldrb)
    }

    /// True for the two byte forms.
    pub const fn is_byte(self) -> bool {
        matches!(self, StranOp::Ldrb | StranOp::Strb)
    }
}

/// Single data transfer payload.  `offset` is an immediate 0-4095 or a
/// (possibly shifted) register; `subtract` selects the down direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Transferred register.
    pub dest: Reg,
    /// Base address register.
    pub base: Reg,
    /// Offset operand.
    pub offset: Op2,
    /// Pre-indexed addressing when set, post-indexed otherwise.
    pub pre_indexed: bool,
    /// Base register write back.
    pub write_back: bool,
    /// Offset is subtracted from the base.
    pub subtract: bool,
}

/// Block transfer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum MtranOp {
    /// `LDM`.
    Ldm,
    /// `STM`.
    Stm,
}

/// Block transfer addressing mode.  The first four name the transfer
/// direction directly; the stack aliases resolve against the transfer
/// direction at encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum MtranMode {
    /// Increment after.
    Ia,
    /// Increment before.
    Ib,
    /// Decrement after.
    Da,
    /// Decrement before.
    Db,
    /// Full descending stack.
    Fd,
    /// Empty descending stack.
    Ed,
    /// Full ascending stack.
    Fa,
    /// Empty ascending stack.
    Ea,
}

/// Block transfer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MtranInstr {
    /// Condition.
    pub ccode: Cond,
    /// Base address register.
    pub op0: Reg,
    /// Transferred registers.
    pub reg_list: RegSet,
    /// Addressing mode.
    pub mode: MtranMode,
    /// Base register write back.
    pub write_back: bool,
}

/// Return convention of a `BL`, used by liveness to know which registers
/// the callee defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrLinkType {
    /// Procedure, no result.
    Void,
    /// Integer result in r0.
    Int,
    /// Real result in f0/d0.
    Real,
}

/// Branch target: a label id until the encoder runs, a resolved signed word
/// offset relative to PC+8 afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrTarget {
    /// Label within the section, or callee section id when `link` is set.
    Label(usize),
    /// Signed word offset from PC+8.
    Offset(i32),
}

/// Branch payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrInstr {
    /// Condition.
    pub ccode: Cond,
    /// Link bit; the target is then a section id.
    pub link: bool,
    /// Callee return convention.
    pub link_type: BrLinkType,
    /// Target.
    pub target: BrTarget,
}

/// Software interrupt payload.  The register masks are not encoded; they
/// give liveness the kernel call's register contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwiInstr {
    /// Condition.
    pub ccode: Cond,
    /// 24-bit SWI number, including the error-generating `X` bit.
    pub code: u32,
    /// Registers the call reads, r0-r9.
    pub read_mask: RegSet,
    /// Registers the call writes, r0-r9.
    pub write_mask: RegSet,
}

/// PC-relative load of a pooled constant; becomes `LDR dest, [pc, #off]`
/// once the encoder has placed the constant islands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LdrcInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: Reg,
    /// Section constant id.
    pub constant: usize,
}

/// PC-relative address computation of a label, `ADD/SUB dest, pc, #off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdrInstr {
    /// Condition.
    pub ccode: Cond,
    /// Destination register.
    pub dest: Reg,
    /// Label whose address is taken.
    pub label: usize,
}

/// Synthesised conditional move.
///
/// The fused form rides on flags set by the previous instruction and
/// expands to `MOV<cc> dest, op2; MOV<!cc> dest, op3`; the plain form
/// first emits `CMP op1, #0` with `cc = NE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmovInstr {
    /// Destination register.
    pub dest: Reg,
    /// Selector register, read only by the unfused form.
    pub op1: Reg,
    /// Value when the condition holds.
    pub op2: Reg,
    /// Value otherwise.
    pub op3: Reg,
    /// Flags are already set; do not emit the compare.
    pub fused: bool,
    /// Condition selecting `op2`.
    pub true_cond: Cond,
}

/// One ARM, FPA or VFP instruction.
///
/// Exactly the machine instructions this compiler can emit, no more.  Each
/// variant pairs an opcode selector with the payload struct its family
/// shares, mirroring the operand forms of the architecture manuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Instr {
    Data { op: DataOp, instr: DataInstr },
    Mul { op: MulOp, instr: MulInstr },
    Stran { op: StranOp, instr: StranInstr },
    Mtran { op: MtranOp, instr: MtranInstr },
    B(BrInstr),
    Swi(SwiInstr),
    Ldrc(LdrcInstr),
    Adr(AdrInstr),
    Cmov(CmovInstr),
    FpaData { op: FpaDyadicOp, instr: FpaDataInstr },
    FpaMonadic { op: FpaMonadicOp, instr: FpaDataInstr },
    FpaStran { op: FpaStranOp, instr: FpaStranInstr },
    FpaTran { op: FpaTranOp, instr: FpaTranInstr },
    FpaCmp { op: FpaCmpOp, instr: FpaCmpInstr },
    FpaLdrc(FpaLdrcInstr),
    FpaCptran { op: FpaCptranOp, instr: FpaCptranInstr },
    VfpStran { op: VfpStranOp, instr: VfpStranInstr },
    VfpCopy { op: VfpCopyOp, instr: VfpCopyInstr },
    VfpLdrc(VfpLdrcInstr),
    VfpTran { op: VfpTranOp, instr: VfpTranInstr },
    VfpCptran { op: VfpCptranOp, instr: VfpCptranInstr },
    VfpData { op: VfpDataOp, instr: VfpDataInstr },
    VfpCmp { op: VfpCmpOp, instr: VfpCmpInstr },
    VfpSqrt(VfpSqrtInstr),
    VfpSysreg { op: VfpSysregOp, instr: VfpSysregInstr },
}

impl Instr {
    /// The instruction's condition code.
    pub fn ccode(&self) -> Cond {
        match self {
            Instr::Data { instr, .. } => instr.ccode,
            Instr::Mul { instr, .. } => instr.ccode,
            Instr::Stran { instr, .. } => instr.ccode,
            Instr::Mtran { instr, .. } => instr.ccode,
            Instr::B(instr) => instr.ccode,
            Instr::Swi(instr) => instr.ccode,
            Instr::Ldrc(instr) => instr.ccode,
            Instr::Adr(instr) => instr.ccode,
            Instr::Cmov(_) => Cond::Al,
            Instr::FpaData { instr, .. } | Instr::FpaMonadic { instr, .. } => instr.ccode,
            Instr::FpaStran { instr, .. } => instr.ccode,
            Instr::FpaTran { instr, .. } => instr.ccode,
            Instr::FpaCmp { instr, .. } => instr.ccode,
            Instr::FpaLdrc(instr) => instr.ccode,
            Instr::FpaCptran { instr, .. } => instr.ccode,
            Instr::VfpStran { instr, .. } => instr.ccode,
            Instr::VfpCopy { instr, .. } => instr.ccode,
            Instr::VfpLdrc(instr) => instr.ccode,
            Instr::VfpTran { instr, .. } => instr.ccode,
            Instr::VfpCptran { instr, .. } => instr.ccode,
            Instr::VfpData { instr, .. } => instr.ccode,
            Instr::VfpCmp { instr, .. } => instr.ccode,
            Instr::VfpSqrt(instr) => instr.ccode,
            Instr::VfpSysreg { instr, .. } => instr.ccode,
        }
    }

    /// Rewrites every integer register field through `f`, including bases
    /// and shift-count registers.  The register allocator uses this to
    /// substitute physical numbers for virtual ones once it has decided
    /// the assignment for an op.
    pub fn map_int_regs(&mut self, mut f: impl FnMut(Reg) -> Reg) {
        let mut op2 = |op2: &mut Op2, f: &mut dyn FnMut(Reg) -> Reg| match op2 {
            Op2::Imm(_) => {}
            Op2::Reg(r) => *r = f(*r),
            Op2::Shifted(s) => {
                s.reg = f(s.reg);
                if let crate::ShiftAmount::Reg(r) = &mut s.amount {
                    *r = f(*r);
                }
            }
        };
        match self {
            Instr::Data { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.op1 = f(instr.op1);
                op2(&mut instr.op2, &mut f);
            }
            Instr::Mul { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.rm = f(instr.rm);
                instr.rs = f(instr.rs);
                instr.rn = f(instr.rn);
            }
            Instr::Stran { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.base = f(instr.base);
                op2(&mut instr.offset, &mut f);
            }
            Instr::Mtran { instr, .. } => {
                instr.op0 = f(instr.op0);
            }
            Instr::Ldrc(instr) => instr.dest = f(instr.dest),
            Instr::Adr(instr) => instr.dest = f(instr.dest),
            Instr::Cmov(instr) => {
                instr.dest = f(instr.dest);
                instr.op1 = f(instr.op1);
                instr.op2 = f(instr.op2);
                instr.op3 = f(instr.op3);
            }
            Instr::FpaStran { instr, .. } => instr.base = f(instr.base),
            Instr::FpaTran { instr, .. } => instr.int_reg = f(instr.int_reg),
            Instr::FpaCptran { instr, .. } => instr.dest = f(instr.dest),
            Instr::VfpStran { instr, .. } => instr.base = f(instr.base),
            Instr::VfpCptran { instr, .. } => instr.reg = f(instr.reg),
            Instr::VfpSysreg { instr, .. } => instr.arm_reg = f(instr.arm_reg),
            _ => {}
        }
    }

    /// Rewrites every floating point register field through `f`.
    pub fn map_real_regs(&mut self, mut f: impl FnMut(FReg) -> FReg) {
        let mut op2 = |op2: &mut crate::FpaOp2, f: &mut dyn FnMut(FReg) -> FReg| {
            if let crate::FpaOp2::Reg(r) = op2 {
                *r = f(*r);
            }
        };
        match self {
            Instr::FpaData { instr, .. } | Instr::FpaMonadic { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.op1 = f(instr.op1);
                op2(&mut instr.op2, &mut f);
            }
            Instr::FpaStran { instr, .. } => instr.dest = f(instr.dest),
            Instr::FpaTran { instr, .. } => instr.fp_reg = f(instr.fp_reg),
            Instr::FpaCmp { instr, .. } => {
                instr.op1 = f(instr.op1);
                op2(&mut instr.op2, &mut f);
            }
            Instr::FpaLdrc(instr) => instr.dest = f(instr.dest),
            Instr::VfpStran { instr, .. } => instr.dest = f(instr.dest),
            Instr::VfpCopy { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.src = f(instr.src);
            }
            Instr::VfpLdrc(instr) => instr.dest = f(instr.dest),
            Instr::VfpTran { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.src = f(instr.src);
            }
            Instr::VfpCptran { instr, .. } => instr.freg = f(instr.freg),
            Instr::VfpData { instr, .. } => {
                instr.dest = f(instr.dest);
                instr.op1 = f(instr.op1);
                instr.op2 = f(instr.op2);
            }
            Instr::VfpCmp { instr, .. } => {
                instr.op1 = f(instr.op1);
                if let Some(op2) = &mut instr.op2 {
                    *op2 = f(*op2);
                }
            }
            Instr::VfpSqrt(instr) => {
                instr.dest = f(instr.dest);
                instr.op1 = f(instr.op1);
            }
            _ => {}
        }
    }

    /// Enumerates the integer registers this instruction reads.
    ///
    /// `NV` predicated instructions are reserved preserve/restore slots and
    /// report nothing.  Block transfers are deliberately blind: the only
    /// ones the compiler emits are the call prologue pushes whose registers
    /// are fixed, and call-site fixup accounts for them separately.
    pub fn visit_int_reads(&self, mut f: impl FnMut(Reg)) {
        if self.ccode() == Cond::Nv {
            return;
        }
        let mut op2 = |op2: &Op2, f: &mut dyn FnMut(Reg)| match op2 {
            Op2::Imm(_) => {}
            Op2::Reg(r) => f(*r),
            Op2::Shifted(s) => {
                f(s.reg);
                if let crate::ShiftAmount::Reg(r) = s.amount {
                    f(r);
                }
            }
        };
        match self {
            Instr::Data { op, instr } => {
                if !op.is_move() {
                    f(instr.op1);
                }
                op2(&instr.op2, &mut f);
            }
            Instr::Mul { op, instr } => {
                f(instr.rm);
                f(instr.rs);
                if *op == MulOp::Mla {
                    f(instr.rn);
                }
            }
            Instr::Stran { op, instr } => {
                f(instr.base);
                op2(&instr.offset, &mut f);
                if !op.is_load() {
                    f(instr.dest);
                }
            }
            Instr::Mtran { .. } => {}
            Instr::B(instr) => {
                // A call consumes whatever argument registers the
                // preceding moves loaded; report all four so nothing
                // lands on top of them in between.
                if instr.link {
                    for r in 0..4 {
                        f(Reg(r));
                    }
                }
            }
            Instr::Swi(instr) => {
                for r in instr.read_mask.regs() {
                    f(r);
                }
            }
            Instr::Ldrc(_) | Instr::Adr(_) => {}
            Instr::Cmov(instr) => {
                if !instr.fused {
                    f(instr.op1);
                }
                f(instr.op2);
                f(instr.op3);
            }
            Instr::FpaStran { instr, .. } => f(instr.base),
            Instr::FpaTran { op, instr } => {
                if *op == FpaTranOp::Flt {
                    f(instr.int_reg);
                }
            }
            Instr::FpaCptran { op, instr } => {
                if *op == FpaCptranOp::Wfs {
                    f(instr.dest);
                }
            }
            Instr::VfpStran { instr, .. } => f(instr.base),
            Instr::VfpCptran { op, instr } => {
                if *op == VfpCptranOp::Fmsr {
                    f(instr.reg);
                }
            }
            Instr::VfpSysreg { op, instr } => {
                if *op == VfpSysregOp::Fmxr {
                    f(instr.arm_reg);
                }
            }
            _ => {}
        }
    }

    /// Enumerates the integer registers this instruction writes.
    pub fn visit_int_writes(&self, mut f: impl FnMut(Reg)) {
        if self.ccode() == Cond::Nv {
            return;
        }
        match self {
            Instr::Data { op, instr } => {
                if !op.is_compare() {
                    f(instr.dest);
                }
            }
            Instr::Mul { instr, .. } => f(instr.dest),
            Instr::Stran { op, instr } => {
                if op.is_load() {
                    f(instr.dest);
                }
            }
            Instr::B(instr) => {
                if instr.link && instr.link_type == BrLinkType::Int {
                    f(Reg(0));
                }
            }
            Instr::Swi(instr) => {
                for r in instr.write_mask.regs() {
                    f(r);
                }
            }
            Instr::Ldrc(instr) => f(instr.dest),
            Instr::Adr(instr) => f(instr.dest),
            Instr::Cmov(instr) => f(instr.dest),
            Instr::FpaTran { op, instr } => {
                if *op == FpaTranOp::Fix {
                    f(instr.int_reg);
                }
            }
            Instr::FpaCptran { op, instr } => {
                if *op == FpaCptranOp::Rfs {
                    f(instr.dest);
                }
            }
            Instr::VfpCptran { op, instr } => {
                if *op == VfpCptranOp::Fmrs {
                    f(instr.reg);
                }
            }
            Instr::VfpSysreg { op, instr } => {
                if *op == VfpSysregOp::Fmrx {
                    f(instr.arm_reg);
                }
            }
            _ => {}
        }
    }

    /// Enumerates the floating point registers this instruction reads.
    pub fn visit_real_reads(&self, mut f: impl FnMut(FReg)) {
        if self.ccode() == Cond::Nv {
            return;
        }
        match self {
            Instr::B(instr) => {
                if instr.link {
                    for r in 0..4 {
                        f(FReg(r));
                    }
                }
            }
            Instr::FpaData { instr, .. } => {
                f(instr.op1);
                if let FpaOp2::Reg(r) = instr.op2 {
                    f(r);
                }
            }
            Instr::FpaMonadic { instr, .. } => {
                if let FpaOp2::Reg(r) = instr.op2 {
                    f(r);
                }
            }
            Instr::FpaStran { op, instr } => {
                if *op == FpaStranOp::Stf {
                    f(instr.dest);
                }
            }
            Instr::FpaTran { op, instr } => {
                if *op == FpaTranOp::Fix {
                    f(instr.fp_reg);
                }
            }
            Instr::FpaCmp { instr, .. } => {
                f(instr.op1);
                if let FpaOp2::Reg(r) = instr.op2 {
                    f(r);
                }
            }
            Instr::VfpStran { op, instr } => {
                if *op == VfpStranOp::Fstd || *op == VfpStranOp::Fsts {
                    f(instr.dest);
                }
            }
            Instr::VfpCopy { instr, .. } => f(instr.src),
            Instr::VfpTran { op, instr } => {
                if op.reads_fp() {
                    f(instr.src);
                }
            }
            Instr::VfpCptran { op, instr } => {
                if *op == VfpCptranOp::Fmrs {
                    f(instr.freg);
                }
            }
            Instr::VfpData { instr, .. } => {
                f(instr.op1);
                f(instr.op2);
            }
            Instr::VfpCmp { instr, .. } => {
                f(instr.op1);
                if let Some(op2) = instr.op2 {
                    f(op2);
                }
            }
            Instr::VfpSqrt(instr) => f(instr.op1),
            _ => {}
        }
    }

    /// Enumerates the floating point registers this instruction writes.
    pub fn visit_real_writes(&self, mut f: impl FnMut(FReg)) {
        if self.ccode() == Cond::Nv {
            return;
        }
        match self {
            Instr::FpaData { instr, .. } | Instr::FpaMonadic { instr, .. } => f(instr.dest),
            Instr::FpaStran { op, instr } => {
                if *op == FpaStranOp::Ldf {
                    f(instr.dest);
                }
            }
            Instr::FpaTran { op, instr } => {
                if *op == FpaTranOp::Flt {
                    f(instr.fp_reg);
                }
            }
            Instr::FpaLdrc(instr) => f(instr.dest),
            Instr::B(instr) => {
                if instr.link && instr.link_type == BrLinkType::Real {
                    f(FReg(0));
                }
            }
            Instr::VfpStran { op, instr } => {
                if *op == VfpStranOp::Fldd || *op == VfpStranOp::Flds {
                    f(instr.dest);
                }
            }
            Instr::VfpCopy { instr, .. } => f(instr.dest),
            Instr::VfpLdrc(instr) => f(instr.dest),
            Instr::VfpTran { op, instr } => {
                if !op.reads_fp() {
                    f(instr.dest);
                }
            }
            Instr::VfpCptran { op, instr } => {
                if *op == VfpCptranOp::Fmsr {
                    f(instr.freg);
                }
            }
            Instr::VfpData { instr, .. } => f(instr.dest),
            Instr::VfpSqrt(instr) => f(instr.dest),
            _ => {}
        }
    }
}
