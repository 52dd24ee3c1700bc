pub mod decode;
pub mod interrupts;
pub mod registers;

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use self::registers::Registers;
use crate::error::{EmuError, Result};
use crate::mmu::memory::Memory;
use crate::mmu::Mmu;

/// Cycles consumed servicing an interrupt: 2 wasted M-cycles, a 2-byte push,
/// and the implicit jump; 5 M-cycles (20 T-states) total.
const INTERRUPT_SERVICE_CYCLES: u32 = 20;

/// The DMG-01 had a Sharp LR35902 CPU (speculated to be a SM83 core), which is a hybrid of the Z80 and the 8080
/// https://gbdev.io/gb-opcodes/optables/errata
pub struct Cpu {
    pub reg: Registers,
    mem: Rc<RefCell<Mmu>>,

    halted: bool,
    ime: bool,
    /// Counts down from 2 after `EI` executes; IME is actually enabled when
    /// this reaches 0, i.e. after the one instruction following `EI` has
    /// fully run, per the documented EI-delay behavior.
    ime_delay: Option<u8>,
}

impl Cpu {
    fn new(mem: Rc<RefCell<Mmu>>) -> Self {
        Self {
            reg: Registers::new(),
            mem,
            halted: false,
            ime: false,
            ime_delay: None,
        }
    }

    /// Boots straight from a boot ROM image at $0000: all registers zero,
    /// PC at $0000, exactly like real hardware coming out of reset.
    pub fn power_on(mem: Rc<RefCell<Mmu>>) -> Self {
        Self::new(mem)
    }

    /// Skips the boot ROM and snaps directly to the documented post-boot
    /// register state, for running a cartridge with no boot ROM image
    /// supplied.
    pub fn power_on_post_boot(mem: Rc<RefCell<Mmu>>) -> Self {
        let mut cpu = Self::new(mem);
        cpu.reg.a = 0x01;
        cpu.reg.f = registers::Flags::ZERO | registers::Flags::HALF_CARRY | registers::Flags::CARRY;
        cpu.reg.write16(registers::Reg16::BC, 0x0013);
        cpu.reg.write16(registers::Reg16::DE, 0x00D8);
        cpu.reg.write16(registers::Reg16::HL, 0x014D);
        cpu.reg.sp = 0xFFFE;
        cpu.reg.pc = 0x0100;
        cpu
    }

    pub fn enable_ime_immediately(&mut self) {
        self.ime = true;
    }

    fn fetch8(&mut self) -> u8 {
        let byte = self.mem.borrow().read8(self.reg.pc);
        self.reg.pc = self.reg.pc.wrapping_add(1);
        byte
    }

    fn fetch16(&mut self) -> u16 {
        let lo = self.fetch8();
        let hi = self.fetch8();
        u16::from_le_bytes([lo, hi])
    }

    fn push16(&mut self, value: u16) {
        self.reg.sp = self.reg.sp.wrapping_sub(2);
        self.mem.borrow_mut().write16(self.reg.sp, value);
    }

    fn pop16(&mut self) -> u16 {
        let value = self.mem.borrow().read16(self.reg.sp);
        self.reg.sp = self.reg.sp.wrapping_add(2);
        value
    }

    /// Runs exactly one step of the fetch/decode/execute/interrupt loop and
    /// returns the number of T-cycles consumed, for `Mmu::tick` to stay in
    /// sync with. `EmuError::DecodeFailure` surfaces an illegal opcode
    /// rather than panicking.
    pub fn step(&mut self) -> Result<u32> {
        self.resolve_ime_delay();

        let ie = self.mem.borrow().ie();
        let if_ = self.mem.borrow().interrupt_flags().borrow().get_raw();
        let pending = ie & if_ & 0x1F;

        if self.halted {
            if pending != 0 {
                self.halted = false;
            } else {
                return Ok(4);
            }
        }

        if self.ime && pending != 0 {
            return Ok(self.service_interrupt(pending));
        }

        let opcode = self.fetch8();
        decode::execute(self, opcode)
    }

    fn resolve_ime_delay(&mut self) {
        if let Some(n) = self.ime_delay {
            if n <= 1 {
                self.ime = true;
                self.ime_delay = None;
            } else {
                self.ime_delay = Some(n - 1);
            }
        }
    }

    /// Called by the `EI` opcode handler.
    pub(crate) fn request_ime_enable(&mut self) {
        self.ime_delay = Some(2);
    }

    pub(crate) fn disable_ime(&mut self) {
        self.ime = false;
        self.ime_delay = None;
    }

    pub(crate) fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    fn service_interrupt(&mut self, pending: u8) -> u32 {
        let source = interrupts::InterruptSource::from_pending_mask(pending)
            .expect("pending mask is nonzero, from_pending_mask always matches");
        trace!("servicing interrupt {:?}", source);
        self.ime = false;
        self.mem.borrow().interrupt_flags().borrow_mut().clear(source);
        self.push16(self.reg.pc);
        self.reg.pc = source.vector();
        INTERRUPT_SERVICE_CYCLES
    }

    pub fn mem_read8(&self, addr: u16) -> u8 {
        self.mem.borrow().read8(addr)
    }

    pub fn mem_write8(&self, addr: u16, val: u8) {
        self.mem.borrow_mut().write8(addr, val);
    }

    pub fn mem_read16(&self, addr: u16) -> u16 {
        self.mem.borrow().read16(addr)
    }

    pub fn mem_write16(&self, addr: u16, val: u16) {
        self.mem.borrow_mut().write16(addr, val);
    }
}

pub(crate) fn illegal_opcode(pc: u16, opcode: u8) -> EmuError {
    EmuError::DecodeFailure { pc, opcode }
}
