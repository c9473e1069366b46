//! The Subtilis ARM back end.
//!
//! Turns a typed IR program into a RISC OS absolute executable in five
//! passes per section: rule-driven instruction selection onto virtual
//! registers, subsection liveness analysis, linear register allocation
//! with spilling, call-site fixup, and a peephole pass; a final program
//! pass lays out sections, resolves branches, plants constant islands and
//! emits the word stream.

mod alloc;
mod bitset;
mod builtins;
mod dist;
mod encode;
mod error;
mod fixup;
mod fp;
mod gen;
mod peephole;
mod riscos;
mod sub_section;

pub use bitset::BitSet;
pub use encode::{encode_program, program_bytes};
pub use error::Error;
pub use fp::{FpBackend, FpaBackend, VfpBackend};
pub use riscos::{generate, swi};
pub use sub_section::{SubSection, SubSections};

/// Result alias for back end passes.
pub type Result<T> = core::result::Result<T, Error>;
