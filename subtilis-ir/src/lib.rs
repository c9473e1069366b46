//! The Subtilis intermediate representation.
//!
//! The front end lowers BASIC into typed, linear sections of IR ops; the
//! back ends consume them read-only through the rule matcher in
//! [`rules`].  Sections are identified by index; section 0 is the program
//! entry.

#![warn(missing_docs)]

mod error_codes;
mod op;
mod pool;
mod prog;
mod rules;
mod section;

pub use error_codes::*;
pub use op::{Call, CallKind, Inst, Op, OpCode, Operand, SysCall};
pub use pool::{ConstantPool, StringPool};
pub use prog::{Program, Settings};
pub use rules::{match_section, ArgPat, MatchError, OpPat, Rule};
pub use section::{Builtin, RetKind, Section, SectionKind, TypeSig};
