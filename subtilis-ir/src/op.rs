use core::fmt;

/// One operand of an IR instruction.
///
/// Operand shapes are fixed per opcode; the rule matcher guarantees them
/// before a handler runs, so the typed accessors treat a mismatch as a
/// compiler bug rather than an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Integer virtual register.
    Reg(usize),
    /// Real virtual register.
    FReg(usize),
    /// Integer immediate.
    Integer(i32),
    /// Real immediate.
    Real(f64),
    /// Label id, unique within the section.
    Label(usize),
    /// Unused operand slot.
    None,
}

impl Operand {
    /// The integer register number.
    pub fn reg(self) -> usize {
        match self {
            Operand::Reg(r) => r,
            other => panic!("expected an integer register, found {other:?}"),
        }
    }

    /// The real register number.
    pub fn freg(self) -> usize {
        match self {
            Operand::FReg(r) => r,
            other => panic!("expected a real register, found {other:?}"),
        }
    }

    /// The integer immediate.
    pub fn integer(self) -> i32 {
        match self {
            Operand::Integer(i) => i,
            other => panic!("expected an integer immediate, found {other:?}"),
        }
    }

    /// The real immediate.
    pub fn real(self) -> f64 {
        match self {
            Operand::Real(r) => r,
            other => panic!("expected a real immediate, found {other:?}"),
        }
    }

    /// The label id.
    pub fn label(self) -> usize {
        match self {
            Operand::Label(l) => l,
            other => panic!("expected a label, found {other:?}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "r{r}"),
            Operand::FReg(r) => write!(f, "f{r}"),
            Operand::Integer(i) => write!(f, "#{i}"),
            Operand::Real(r) => write!(f, "#{r}"),
            Operand::Label(l) => write!(f, "label_{l}"),
            Operand::None => f.write_str("_"),
        }
    }
}

/// IR opcodes.
///
/// The `II32`/`IR` suffixed forms take an immediate final operand; the
/// bare forms are register-register.  Comparison opcodes write -1 or 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[allow(missing_docs, clippy::upper_case_acronyms)]
pub enum OpCode {
    // Moves and conversions.
    MOV,
    MOVII32,
    MOVFP,
    MOVIR,
    MOVFPI32,
    MOVFPRDI32,
    MOVI32FP,
    // Integer arithmetic and logic.
    ADDI32,
    ADDII32,
    SUBI32,
    SUBII32,
    RSUBII32,
    MULI32,
    MULII32,
    LSLI32,
    LSLII32,
    LSRI32,
    LSRII32,
    ASRI32,
    ASRII32,
    ANDI32,
    ANDII32,
    ORI32,
    ORII32,
    EORI32,
    EORII32,
    NOTI32,
    // Real arithmetic.
    ADDR,
    ADDIR,
    SUBR,
    SUBIR,
    RSUBIR,
    MULR,
    MULIR,
    DIVR,
    DIVIR,
    RDIVIR,
    SQR,
    SIN,
    COS,
    TAN,
    ASN,
    ACS,
    ATN,
    LOG,
    LN,
    ABSR,
    EXPR,
    POWR,
    // Memory.
    LOADOI8,
    LOADOI32,
    STOREOI8,
    STOREOI32,
    LOADOR,
    STOREOR,
    LCA,
    PUSHI32,
    POPI32,
    // Comparisons.
    GTI32,
    GTII32,
    LTI32,
    LTII32,
    GTEI32,
    GTEII32,
    LTEI32,
    LTEII32,
    EQI32,
    EQII32,
    NEQI32,
    NEQII32,
    GTR,
    GTIR,
    LTR,
    LTIR,
    GTER,
    GTEIR,
    LTER,
    LTEIR,
    EQR,
    EQIR,
    NEQR,
    NEQIR,
    // Control flow.
    JMP,
    JMPC,
    JMPCNF,
    CMOVI32,
    RET,
    RETI32,
    RETII32,
    RETR,
    RETIR,
    // Console and OS.
    PRINTSTR,
    PRINTNL,
    END,
    TESTESC,
    GETTIME,
    GET,
    GETTO,
    INKEY,
    OSBYTEID,
    VDU,
    VDUI,
    I32TODEC,
    I32TOHEX,
    // Heap.
    REF,
    GETREF,
    HEAPFREE,
    BLOCKFREE,
    BLOCKADJUST,
    // Graphics.
    MODEI32,
    PLOT,
    GCOL,
    GCOLTINT,
    ORIGIN,
    CLS,
    CLG,
    ON,
    OFF,
    WAIT,
    AT,
    POS,
    VPOS,
    POINT,
    TINT,
    TCOL,
    TCOLTINT,
    PALETTE,
}

/// An IR instruction: opcode plus up to four operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inst {
    /// Opcode.
    pub op: OpCode,
    /// Operand slots; trailing unused slots hold [`Operand::None`].
    pub operands: [Operand; 4],
}

/// Return convention of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Procedure call.
    Void,
    /// Function returning an integer.
    I32,
    /// Function returning a real.
    Real,
}

/// A call to another section.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Callee section index.
    pub section: usize,
    /// Argument registers in declaration order.
    pub args: Vec<Operand>,
    /// Result register for the non-void kinds.
    pub reg: usize,
}

/// A system call through the OS SWI mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct SysCall {
    /// Resolved 24-bit SWI number, including the error bit when the call
    /// was written with an `X` prefix.
    pub call_id: usize,
    /// Argument registers keyed by SWI input register number.
    pub in_regs: Vec<(usize, Operand)>,
    /// Result registers keyed by SWI output register number.
    pub out_regs: Vec<(usize, usize)>,
    /// Register receiving the error flag, if the caller wants it.
    pub flags_reg: Option<usize>,
    /// Whether `flags_reg` is local to the handler.
    pub flags_local: bool,
}

/// One IR op.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// An instruction.
    Instr(Inst),
    /// A label definition.
    Label(usize),
    /// A call.
    Call {
        /// Return convention.
        kind: CallKind,
        /// The call itself.
        call: Call,
    },
    /// A system call placeholder.
    SysCall(SysCall),
}

impl Op {
    /// Convenience accessor for handlers that know they sit on an
    /// instruction.
    pub fn instr(&self) -> &Inst {
        match self {
            Op::Instr(i) => i,
            other => panic!("expected an instruction, found {other:?}"),
        }
    }

    /// Convenience accessor for call handlers.
    pub fn call(&self) -> &Call {
        match self {
            Op::Call { call, .. } => call,
            other => panic!("expected a call, found {other:?}"),
        }
    }

    /// Convenience accessor for the syscall handler.
    pub fn sys_call(&self) -> &SysCall {
        match self {
            Op::SysCall(s) => s,
            other => panic!("expected a syscall, found {other:?}"),
        }
    }
}
