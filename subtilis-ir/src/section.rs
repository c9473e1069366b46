use crate::{Call, CallKind, Inst, Op, OpCode, Operand, SysCall};

/// Return type of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetKind {
    /// Procedure.
    Void,
    /// Integer function.
    I32,
    /// Real function.
    Real,
}

/// A section's calling signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSig {
    /// Number of integer parameters.
    pub int_args: usize,
    /// Number of real parameters.
    pub real_args: usize,
    /// Return kind.
    pub ret: RetKind,
}

impl TypeSig {
    /// A parameterless procedure.
    pub const PROC: TypeSig = TypeSig {
        int_args: 0,
        real_args: 0,
        ret: RetKind::Void,
    };
}

/// Back-end built-in routines.  These sections have no IR body; the back
/// end generates them directly, using the normal calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum Builtin {
    /// Signed 32-bit division, quotient and remainder.
    Idiv,
    /// Word fill.
    Memseti32,
    /// Byte fill.
    Memseti8,
    /// Word-aligned copy.
    Memcpy,
    /// Word-aligned compare.
    Memcmp,
    /// Lexicographic string compare.
    Compare,
    /// Heap block allocation.
    Alloc,
    /// Heap block release with reference counting.
    Deref,
}

/// What kind of body a section carries.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionKind {
    /// Ordinary IR produced by the front end.
    User,
    /// A back-end built-in; `ops` is empty.
    Builtin(Builtin),
    /// Pre-assembled machine code from the inline assembler; the back end
    /// adopts it untouched.
    Asm,
}

/// One IR section.
#[derive(Debug, Clone)]
pub struct Section {
    /// Ops in program order.
    pub ops: Vec<Op>,
    /// Signature.
    pub sig: TypeSig,
    /// Body kind.
    pub kind: SectionKind,
    /// Next integer virtual register.
    pub reg_counter: usize,
    /// Next real virtual register.
    pub freg_counter: usize,
    /// Next label id.
    pub label_counter: usize,
    /// Local variable bytes.
    pub locals: u32,
    /// Byte offset of the error code word, relative to the globals base.
    pub error_offset: i32,
    /// Byte offset of the error flag word, relative to the globals base.
    pub eflag_offset: i32,
}

impl Section {
    /// Creates an empty user section.  Register numbering starts beyond
    /// the parameters, which arrive in registers 0..`int_args` and
    /// 0..`real_args` of their respective classes.
    pub fn new(sig: TypeSig, locals: u32) -> Section {
        Section {
            ops: Vec::new(),
            reg_counter: sig.int_args,
            freg_counter: sig.real_args,
            label_counter: 0,
            locals,
            error_offset: 0,
            eflag_offset: 4,
            sig,
            kind: SectionKind::User,
        }
    }

    /// Creates a built-in section of the given signature.
    pub fn new_builtin(builtin: Builtin, sig: TypeSig) -> Section {
        let mut s = Section::new(sig, 0);
        s.kind = SectionKind::Builtin(builtin);
        s
    }

    /// A fresh integer register.
    pub fn new_reg(&mut self) -> usize {
        let r = self.reg_counter;
        self.reg_counter += 1;
        r
    }

    /// A fresh real register.
    pub fn new_freg(&mut self) -> usize {
        let r = self.freg_counter;
        self.freg_counter += 1;
        r
    }

    /// A fresh label id.
    pub fn new_label(&mut self) -> usize {
        let l = self.label_counter;
        self.label_counter += 1;
        l
    }

    /// Appends an instruction with up to four operands.
    pub fn add_instr(&mut self, op: OpCode, operands: &[Operand]) {
        let mut slots = [Operand::None; 4];
        slots[..operands.len()].copy_from_slice(operands);
        self.ops.push(Op::Instr(Inst { op, operands: slots }));
    }

    /// Appends a label definition; the id must come from
    /// [`Section::new_label`].
    pub fn add_label(&mut self, label: usize) {
        debug_assert!(label < self.label_counter);
        self.ops.push(Op::Label(label));
    }

    /// Appends a call.
    pub fn add_call(&mut self, kind: CallKind, call: Call) {
        self.ops.push(Op::Call { kind, call });
    }

    /// Appends a system call.
    pub fn add_sys_call(&mut self, sys_call: SysCall) {
        self.ops.push(Op::SysCall(sys_call));
    }
}
