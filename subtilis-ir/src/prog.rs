use crate::{ConstantPool, Section, StringPool};

/// Per-compilation settings, owned by the driver and threaded by
/// reference.  There is no global state.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Install an escape handler and poll the escape flag at checkpoints.
    pub handle_escapes: bool,
    /// Silently discard errors raised by graphics operations.
    pub ignore_graphics_errors: bool,
    /// Emit the leak check on program exit.
    pub check_mem_leaks: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            handle_escapes: true,
            ignore_graphics_errors: true,
            check_mem_leaks: false,
        }
    }
}

/// A complete IR program.
#[derive(Debug, Clone)]
pub struct Program {
    /// Sections; index 0 is the program entry.
    pub sections: Vec<Section>,
    /// Interned strings.
    pub string_pool: StringPool,
    /// Binary constants.
    pub constant_pool: ConstantPool,
    /// Compilation settings.
    pub settings: Settings,
}

impl Program {
    /// Creates an empty program.
    pub fn new(settings: Settings) -> Program {
        Program {
            sections: Vec::new(),
            string_pool: StringPool::new(),
            constant_pool: ConstantPool::new(),
            settings,
        }
    }

    /// Appends a section, returning its index.
    pub fn add_section(&mut self, section: Section) -> usize {
        self.sections.push(section);
        self.sections.len() - 1
    }
}
