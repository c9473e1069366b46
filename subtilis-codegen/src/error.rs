use subtilis_asm::EncodeError;
use subtilis_ir::MatchError;

/// Back end failure.
///
/// Everything here is compile time; runtime faults travel through the
/// generated code's error channel instead.  `Assertion` marks a broken
/// structural invariant, which is a bug in the compiler rather than in the
/// program being compiled.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A structural invariant does not hold.
    #[error("internal error: {0}")]
    Assertion(&'static str),
    /// No rule matched an IR op.
    #[error(transparent)]
    Match(#[from] MatchError),
    /// An instruction could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// A stack frame grew beyond any encodable immediate.
    #[error("stack frame of {0} bytes exceeds the encodable range")]
    FrameTooBig(u32),
    /// A constant island ended up outside the load's reach.
    #[error("constant {constant} is {distance} bytes from its load, beyond pc-relative range")]
    ConstantTooFar {
        /// Section constant id.
        constant: usize,
        /// Distance the encoder ended up with.
        distance: i32,
    },
    /// A system call name or id has no table entry.
    #[error("unknown OS call {0:#x}")]
    UnknownSysCall(usize),
    /// More arguments than the calling convention can carry.
    #[error("call with {0} arguments exceeds the convention's limit")]
    TooManyArgs(usize),
    /// The selected coprocessor family cannot express the operation.
    #[error("{0} is not available on the selected floating point unit")]
    UnsupportedOnVariant(&'static str),
}
