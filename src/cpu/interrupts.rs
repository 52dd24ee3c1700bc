/// FF0F - IF - Interrupt Flag (R/W), FFFF - IE - Interrupt Enable (R/W)
/// Bit 0: V-Blank  Interrupt Request (INT 40h)  (1=Request)
/// Bit 1: LCD STAT Interrupt Request (INT 48h)  (1=Request)
/// Bit 2: Timer    Interrupt Request (INT 50h)  (1=Request)
/// Bit 3: Serial   Interrupt Request (INT 58h)  (1=Request)
/// Bit 4: Joypad   Interrupt Request (INT 60h)  (1=Request)
///
/// IE and IME are not modeled here: IE is a plain register owned by the
/// bus (`Mmu::ie`), and IME is owned by the CPU, since only the CPU's
/// fetch/execute loop ever reads it. `InterruptFlags` is the one piece of
/// state three different components (Mmu, Timer, Ppu) all need to raise
/// requests into, so it is the one shared behind `Rc<RefCell<_>>`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptSource {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl InterruptSource {
    fn bit(self) -> u8 {
        match self {
            InterruptSource::VBlank => 0,
            InterruptSource::LcdStat => 1,
            InterruptSource::Timer => 2,
            InterruptSource::Serial => 3,
            InterruptSource::Joypad => 4,
        }
    }

    /// Service vector for this source, in ascending priority order (VBlank
    /// highest). Used by `Cpu::service_interrupt`.
    pub fn vector(self) -> u16 {
        match self {
            InterruptSource::VBlank => 0x0040,
            InterruptSource::LcdStat => 0x0048,
            InterruptSource::Timer => 0x0050,
            InterruptSource::Serial => 0x0058,
            InterruptSource::Joypad => 0x0060,
        }
    }

    /// Lowest-numbered pending, enabled bit wins. `mask` is `IE & IF`.
    pub fn from_pending_mask(mask: u8) -> Option<Self> {
        const ORDER: [InterruptSource; 5] = [
            InterruptSource::VBlank,
            InterruptSource::LcdStat,
            InterruptSource::Timer,
            InterruptSource::Serial,
            InterruptSource::Joypad,
        ];
        ORDER.into_iter().find(|src| mask & (1 << src.bit()) != 0)
    }
}

#[derive(Default)]
pub struct InterruptFlags {
    /// Interrupt Flag Register (IF). Only the low 5 bits are meaningful;
    /// the upper 3 bits read back as 1 (enforced by `Mmu::read8`, not here).
    if_: u8,
}

impl InterruptFlags {
    pub fn new() -> Self {
        Self { if_: 0 }
    }

    pub fn request(&mut self, source: InterruptSource) {
        self.if_ |= 1 << source.bit();
    }

    pub fn clear(&mut self, source: InterruptSource) {
        self.if_ &= !(1 << source.bit());
    }

    /// Set the raw value of the IF register (low 5 bits only).
    pub fn set_raw(&mut self, if_: u8) {
        self.if_ = if_ & 0x1F;
    }

    /// Get the raw value of the IF register (low 5 bits only).
    pub fn get_raw(&self) -> u8 {
        self.if_ & 0x1F
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_lowest_bit_first() {
        let mask = (1 << InterruptSource::Timer.bit()) | (1 << InterruptSource::VBlank.bit());
        assert_eq!(InterruptSource::from_pending_mask(mask), Some(InterruptSource::VBlank));
    }

    #[test]
    fn request_and_clear_round_trip() {
        let mut flags = InterruptFlags::new();
        flags.request(InterruptSource::Joypad);
        assert_eq!(flags.get_raw(), 0b0001_0000);
        flags.clear(InterruptSource::Joypad);
        assert_eq!(flags.get_raw(), 0);
    }
}
