use core::fmt;

/// ARM condition code, bits 28-31 of every instruction.
///
/// `Nv` is architecturally "never" on the ARM2 and is used by the call
/// emitter to reserve floating point preserve slots that call-site fixup
/// either promotes to `Al` or leaves for the peephole pass to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Cond {
    /// Equal (Z set).
    Eq = 0,
    /// Not equal.
    Ne = 1,
    /// Carry set / unsigned higher or same.
    Cs = 2,
    /// Carry clear / unsigned lower.
    Cc = 3,
    /// Negative.
    Mi = 4,
    /// Positive or zero.
    Pl = 5,
    /// Overflow set.
    Vs = 6,
    /// Overflow clear.
    Vc = 7,
    /// Unsigned higher.
    Hi = 8,
    /// Unsigned lower or same.
    Ls = 9,
    /// Signed greater than or equal.
    Ge = 10,
    /// Signed less than.
    Lt = 11,
    /// Signed greater than.
    Gt = 12,
    /// Signed less than or equal.
    Le = 13,
    /// Always.
    Al = 14,
    /// Never.
    Nv = 15,
}

impl Cond {
    /// The condition bits, already shifted into place.
    pub const fn bits(self) -> u32 {
        (self as u32) << 28
    }

    /// The logical negation, used when a comparison guards the fall-through
    /// path rather than the branch.
    pub const fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Cs => Cond::Cc,
            Cond::Cc => Cond::Cs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Nv,
            Cond::Nv => Cond::Al,
        }
    }

    /// Decodes the top nibble of an instruction word.
    pub const fn from_bits(bits: u32) -> Cond {
        match bits & 0xf {
            0 => Cond::Eq,
            1 => Cond::Ne,
            2 => Cond::Cs,
            3 => Cond::Cc,
            4 => Cond::Mi,
            5 => Cond::Pl,
            6 => Cond::Vs,
            7 => Cond::Vc,
            8 => Cond::Hi,
            9 => Cond::Ls,
            10 => Cond::Ge,
            11 => Cond::Lt,
            12 => Cond::Gt,
            13 => Cond::Le,
            14 => Cond::Al,
            _ => Cond::Nv,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cond::Eq => "EQ",
            Cond::Ne => "NE",
            Cond::Cs => "CS",
            Cond::Cc => "CC",
            Cond::Mi => "MI",
            Cond::Pl => "PL",
            Cond::Vs => "VS",
            Cond::Vc => "VC",
            Cond::Hi => "HI",
            Cond::Ls => "LS",
            Cond::Ge => "GE",
            Cond::Lt => "LT",
            Cond::Gt => "GT",
            Cond::Le => "LE",
            Cond::Al => "",
            Cond::Nv => "NV",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn inversion_is_an_involution() {
        for ccode in Cond::iter() {
            assert_eq!(ccode.invert().invert(), ccode);
        }
    }

    #[test]
    fn bits_round_trip() {
        for ccode in Cond::iter() {
            assert_eq!(Cond::from_bits(ccode.bits() >> 28), ccode);
        }
    }
}
