use bitflags::bitflags;

bitflags!(
    /// The Flag register (F) occupies the low byte of AF. Only the top
    /// nibble is meaningful; the bottom nibble reads back as zero on every
    /// documented instruction boundary.
    /// Zero Flag (Z) - Set when the result of a math operation is zero, or two values match when using the CP instruction.
    /// Subtract Flag (N) - This bit is set if a subtraction was performed in the last math instruction.
    /// Half Carry Flag (H) - This bit is set if a carry occurred from the lower nibble in the last math operation.
    /// Carry Flag (C) - This bit is set if a carry occurred from the last math operation or if register A is the smaller value when executing the CP instruction.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Flags: u8 {
        const ZERO       = 0b_1000_0000;
        const SUBTRACT   = 0b_0100_0000;
        const HALF_CARRY = 0b_0010_0000;
        const CARRY      = 0b_0001_0000;
    }
);

/// The Gameboy has eight 8-bit registers, and two 16-bit registers.
/// Some 8-bit registers can be combined to be used as 16-bit registers.
pub struct Registers {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: Flags,
    pub h: u8,
    pub l: u8,

    pub sp: u16,
    pub pc: u16,
}

/// Reg8 represents an 8-bit register. `HLInd` is not a storage slot: the
/// decoder switches to a bus read/write whenever this encoding value (6)
/// appears in a register field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    HLInd,
    A,
}

impl Reg8 {
    /// Structural decode of bits 5-3 (dst) or bits 2-0 (src): 0=B,1=C,2=D,
    /// 3=E,4=H,5=L,6=(HL),7=A.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Reg8::B,
            1 => Reg8::C,
            2 => Reg8::D,
            3 => Reg8::E,
            4 => Reg8::H,
            5 => Reg8::L,
            6 => Reg8::HLInd,
            7 => Reg8::A,
            _ => unreachable!(),
        }
    }
}

/// Reg16 represents a 16-bit register pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
}

/// Reg16 pair used by PUSH/POP, which substitutes AF for SP in the same
/// 2-bit encoding slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StackReg16 {
    BC,
    DE,
    HL,
    AF,
}

/// Condition codes, decoded from bits 4-3: 0=NZ,1=Z,2=NC,3=C.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Condition {
    NZ,
    Z,
    NC,
    C,
}

impl Condition {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Condition::NZ,
            1 => Condition::Z,
            2 => Condition::NC,
            3 => Condition::C,
            _ => unreachable!(),
        }
    }
}

impl Registers {
    pub fn new() -> Self {
        Self {
            a: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            f: Flags::empty(),
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
        }
    }

    /// Read an 8-bit register. `HLInd` is never a valid argument here; the
    /// decoder must route it through the bus instead.
    pub fn read8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::HLInd => unreachable!("(HL) is routed through the bus, not a register"),
        }
    }

    pub fn write8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.a = value,
            Reg8::B => self.b = value,
            Reg8::C => self.c = value,
            Reg8::D => self.d = value,
            Reg8::E => self.e = value,
            Reg8::H => self.h = value,
            Reg8::L => self.l = value,
            Reg8::HLInd => unreachable!("(HL) is routed through the bus, not a register"),
        }
    }

    pub fn read16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::BC => ((self.b as u16) << 8) | (self.c as u16),
            Reg16::DE => ((self.d as u16) << 8) | (self.e as u16),
            Reg16::HL => ((self.h as u16) << 8) | (self.l as u16),
            Reg16::SP => self.sp,
        }
    }

    pub fn write16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::BC => {
                self.b = (value >> 8) as u8;
                self.c = value as u8;
            }
            Reg16::DE => {
                self.d = (value >> 8) as u8;
                self.e = value as u8;
            }
            Reg16::HL => {
                self.h = (value >> 8) as u8;
                self.l = value as u8;
            }
            Reg16::SP => self.sp = value,
        }
    }

    pub fn read_stack16(&self, reg: StackReg16) -> u16 {
        match reg {
            StackReg16::BC => self.read16(Reg16::BC),
            StackReg16::DE => self.read16(Reg16::DE),
            StackReg16::HL => self.read16(Reg16::HL),
            StackReg16::AF => ((self.a as u16) << 8) | (self.f.bits() as u16),
        }
    }

    /// Writing AF always forces the low nibble of F back to zero, matching
    /// the invariant that the flag register's low nibble never reads as
    /// nonzero.
    pub fn write_stack16(&mut self, reg: StackReg16, value: u16) {
        match reg {
            StackReg16::BC => self.write16(Reg16::BC, value),
            StackReg16::DE => self.write16(Reg16::DE, value),
            StackReg16::HL => self.write16(Reg16::HL, value),
            StackReg16::AF => {
                self.a = (value >> 8) as u8;
                self.f = Flags::from_bits_truncate((value as u8) & 0xF0);
            }
        }
    }

    pub fn check_condition(&self, cond: Condition) -> bool {
        match cond {
            Condition::NZ => !self.f.contains(Flags::ZERO),
            Condition::Z => self.f.contains(Flags::ZERO),
            Condition::NC => !self.f.contains(Flags::CARRY),
            Condition::C => self.f.contains(Flags::CARRY),
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
