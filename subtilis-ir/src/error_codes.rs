//! Runtime error codes.
//!
//! Generated code reports faults by writing one of these to the error word
//! in the globals area and -1 to the error flag beside it; compiled
//! checkpoints and error handlers read them back.

/// Array dimension error.
pub const ERR_BAD_DIM: i32 = 10;
/// Out of heap memory.
pub const ERR_OOM: i32 = 11;
/// Escape pressed.
pub const ERR_ESCAPE: i32 = 17;
/// Division by zero.
pub const ERR_DIV_BY_ZERO: i32 = 18;
/// Number too big for its type.
pub const ERR_NUMBER_TOO_BIG: i32 = 20;
/// Logarithm domain error.
pub const ERR_LOG_RANGE: i32 = 22;
/// Wrong arguments to a callable.
pub const ERR_BAD_ARGS: i32 = 31;
/// Graphics operation failed.
pub const ERR_GRAPHICS: i32 = 128;
/// Bad time value.
pub const ERR_BAD_TIME: i32 = 129;
/// Bad input value.
pub const ERR_BAD_INPUT: i32 = 130;
/// Unknown OS call id.
pub const ERR_BAD_OS_ID: i32 = 131;
/// Failed to open a file.
pub const ERR_OPEN: i32 = 132;
/// Bad file handle.
pub const ERR_BAD_HANDLE: i32 = 133;
/// Read failure.
pub const ERR_READ: i32 = 134;
/// Write failure.
pub const ERR_WRITE: i32 = 135;
/// End of file.
pub const ERR_EOF: i32 = 136;
/// Buffer overflow.
pub const ERR_BUFFER_OVERFLOW: i32 = 484;
