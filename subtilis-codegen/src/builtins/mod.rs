//! Hand-written built-in routines.
//!
//! These are functions the language lowers calls to but that have no
//! native ARM opcode: integer division, block memory operations, string
//! comparison and the heap entry points.  They are emitted directly as
//! physical-register machine code under the normal calling convention and
//! bypass instruction selection and allocation entirely.

pub mod div;
pub mod heap;
pub mod mem;

use crate::gen::Ctx;
use crate::{Error, Result};
use subtilis_ir::{Builtin, Section, SectionKind};

/// Emits the body of one built-in section.
pub fn add_builtin(ctx: &mut Ctx, section: &Section) -> Result<()> {
    let builtin = match &section.kind {
        SectionKind::Builtin(b) => *b,
        _ => return Err(Error::Assertion("builtin body requested for a user section")),
    };
    match builtin {
        Builtin::Idiv => div::add_idiv(ctx),
        Builtin::Memseti32 => mem::add_memseti32(ctx),
        Builtin::Memseti8 => mem::add_memseti8(ctx),
        Builtin::Memcpy => mem::add_memcpy(ctx),
        Builtin::Memcmp => mem::add_memcmp(ctx),
        Builtin::Compare => mem::add_strcmp(ctx),
        Builtin::Alloc => heap::add_alloc(ctx),
        Builtin::Deref => heap::add_deref(ctx),
    }
}
