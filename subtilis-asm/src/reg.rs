use core::fmt;

/// An integer register operand.
///
/// Values below [`Reg::VIRT_BASE`] denote physical registers r0-r15 and are
/// never touched by the allocator; everything at or above the base is a
/// virtual register awaiting assignment.  Keeping both in one numeric space
/// lets every instruction field hold either before and after allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub usize);

impl Reg {
    /// First virtual register id.  r0-r15 sit below this.
    pub const VIRT_BASE: usize = 16;
    /// Number of physical integer registers.
    pub const PHYS_COUNT: usize = 16;

    /// Frame pointer.
    pub const FP: Reg = Reg(11);
    /// Globals base, reserved for the lifetime of the program.
    pub const GLOBAL: Reg = Reg(12);
    /// Stack pointer.
    pub const SP: Reg = Reg(13);
    /// Link register.
    pub const LR: Reg = Reg(14);
    /// Program counter.
    pub const PC: Reg = Reg(15);

    /// True if this operand names a physical register that the allocator
    /// must leave alone.
    pub const fn is_fixed(self) -> bool {
        self.0 < Self::VIRT_BASE
    }

    /// Maps a front-end integer register id into the virtual space.
    pub const fn from_ir(ir_reg: usize) -> Reg {
        Reg(ir_reg + Self::VIRT_BASE)
    }

    /// Encoding nibble.  Panics in debug builds on a virtual register; the
    /// allocator must have run first.
    pub fn bits(self) -> u32 {
        debug_assert!(self.is_fixed(), "unallocated register {self}");
        self.0 as u32
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed() {
            write!(f, "R{}", self.0)
        } else {
            write!(f, "V{}", self.0 - Self::VIRT_BASE)
        }
    }
}

/// A floating point register operand, FPA or VFP depending on the section's
/// coprocessor variant.
///
/// The virtual space begins at the variant's physical register count (8 for
/// FPA, 16 for VFP), so fixedness is a property of the variant and is
/// answered by the allocator's FP backend rather than here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FReg(pub usize);

impl FReg {
    /// Maps a front-end real register id into the virtual space of a
    /// variant with `phys_count` physical registers.
    pub const fn from_ir(ir_reg: usize, phys_count: usize) -> FReg {
        FReg(ir_reg + phys_count)
    }

    /// True if this operand is physical under a variant with `phys_count`
    /// registers.
    pub const fn is_fixed(self, phys_count: usize) -> bool {
        self.0 < phys_count
    }

    /// Encoding bits.
    pub fn bits(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for FReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

bitflags::bitflags! {
    /// A set of physical integer registers, as used by the block transfer
    /// instructions and the SWI register contracts.
    pub struct RegSet: u32 {
        /// r0
        const R0 = 1;
        /// r1
        const R1 = 1 << 1;
        /// r2
        const R2 = 1 << 2;
        /// r3
        const R3 = 1 << 3;
        /// r4
        const R4 = 1 << 4;
        /// r5
        const R5 = 1 << 5;
        /// r6
        const R6 = 1 << 6;
        /// r7
        const R7 = 1 << 7;
        /// r8
        const R8 = 1 << 8;
        /// r9
        const R9 = 1 << 9;
        /// r10
        const R10 = 1 << 10;
        /// Frame pointer.
        const FP = 1 << 11;
        /// Globals base.
        const GLOBAL = 1 << 12;
        /// Stack pointer.
        const SP = 1 << 13;
        /// Link register.
        const LR = 1 << 14;
        /// Program counter.
        const PC = 1 << 15;
    }
}

impl RegSet {
    /// The singleton set holding `reg`, which must be physical.
    pub fn of(reg: Reg) -> RegSet {
        debug_assert!(reg.is_fixed());
        RegSet::from_bits_truncate(1 << reg.0)
    }

    /// Membership test for a physical register.
    pub fn holds(self, reg: Reg) -> bool {
        reg.is_fixed() && self.bits() & (1 << reg.0) != 0
    }

    /// Iterates the members from r0 upwards.
    pub fn regs(self) -> impl Iterator<Item = Reg> {
        (0..Reg::PHYS_COUNT).filter_map(move |r| (self.bits() & (1 << r) != 0).then(|| Reg(r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_base_splits_the_space() {
        assert!(Reg(15).is_fixed());
        assert!(!Reg(16).is_fixed());
        assert_eq!(Reg::from_ir(0), Reg(16));
        assert_eq!(Reg::from_ir(3), Reg(19));
    }

    #[test]
    fn reg_set_round_trips_members() {
        let set = RegSet::FP | RegSet::LR | RegSet::R3;
        let members: Vec<_> = set.regs().collect();
        assert_eq!(members, vec![Reg(3), Reg::FP, Reg::LR]);
        assert!(set.holds(Reg::FP));
        assert!(!set.holds(Reg(0)));
        assert!(!set.holds(Reg::from_ir(3)));
    }
}
