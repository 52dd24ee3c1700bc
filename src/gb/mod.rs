use std::cell::RefCell;
use std::rc::Rc;

use log::{info, warn};

use crate::boot::BootRom;
use crate::cartridge::{self, Cartridge};
use crate::cpu::Cpu;
use crate::error::Result;
use crate::mmu::Mmu;
use crate::ppu::{Color, SCREEN_HEIGHT, SCREEN_WIDTH};

/// A fully rasterized background frame, palette-translated to 4 shades of
/// gray. `Frontend` implementations turn this into pixels; headless callers
/// (tests, `--testing`) can inspect it directly.
pub type Frame = [Color; SCREEN_WIDTH * SCREEN_HEIGHT];

/// The presentation layer the core drives once per completed frame. Kept as
/// a trait so the library half of this crate has no window-toolkit
/// dependency; `main.rs` supplies the `minifb` implementation.
pub trait Frontend {
    /// Returns `false` to request emulation stop (e.g. window closed).
    fn poll_events(&mut self) -> bool;
    fn present(&mut self, frame: &Frame);
}

/// A `Frontend` that does nothing, for headless runs (`--testing`, and unit
/// tests that only care about CPU/bus state).
pub struct NullFrontend;

impl Frontend for NullFrontend {
    fn poll_events(&mut self) -> bool {
        true
    }

    fn present(&mut self, _frame: &Frame) {}
}

/// The GameBoy DMG-01 (non-color).
pub struct GameBoy {
    rom_path: String,
    cpu: Cpu,
    mmu: Rc<RefCell<Mmu>>,
}

impl GameBoy {
    /// Loads `rom_path`, and boots either from `boot_rom_path` (if given) or
    /// straight to the documented post-boot register snapshot.
    pub fn power_on(rom_path: &str, boot_rom_path: Option<&str>) -> Result<Self> {
        let (cartridge, header): (Box<dyn Cartridge>, _) = cartridge::load(rom_path)?;
        info!("cartridge title: {:?}", header.title);

        let boot_rom = boot_rom_path.map(BootRom::load).transpose()?;
        let has_boot_rom = boot_rom.is_some();
        let mmu = Rc::new(RefCell::new(Mmu::new(cartridge, boot_rom)));

        let cpu = if has_boot_rom {
            Cpu::power_on(mmu.clone())
        } else {
            mmu.borrow_mut().init_post_boot_io();
            Cpu::power_on_post_boot(mmu.clone())
        };

        Ok(Self {
            rom_path: rom_path.to_string(),
            cpu,
            mmu,
        })
    }

    /// Runs the emulator against a `Frontend` until it requests a stop, or
    /// an illegal opcode is hit. Battery-backed cartridge RAM is saved to
    /// disk on the way out either way.
    pub fn run(&mut self, frontend: &mut impl Frontend) -> Result<()> {
        while frontend.poll_events() {
            let cycles = self.cpu.step()?;
            self.mmu.borrow_mut().tick(cycles);

            if let Some(frame) = self.mmu.borrow_mut().ppu.take_frame() {
                frontend.present(frame);
            }
        }
        self.save()
    }

    /// Steps the CPU/bus exactly once; used by headless tests and
    /// `--testing` runs that drive the loop externally.
    pub fn step(&mut self) -> Result<u32> {
        let cycles = self.cpu.step()?;
        self.mmu.borrow_mut().tick(cycles);
        Ok(cycles)
    }

    pub fn take_frame(&mut self) -> Option<Frame> {
        self.mmu.borrow_mut().ppu.take_frame().copied()
    }

    fn save(&self) -> Result<()> {
        let mmu = self.mmu.borrow();
        cartridge::persist(&self.rom_path, mmu.cartridge())
    }
}

impl Drop for GameBoy {
    fn drop(&mut self) {
        // Best-effort: persist battery-backed RAM even if the run loop
        // exited via an error.
        if let Err(e) = self.save() {
            warn!("failed to persist cartridge ram: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn rom_only_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0134..0x013C].copy_from_slice(b"NOPTEST\0");
        rom[0x0147] = 0x00; // ROM_ONLY
        rom[0x0148] = 0x00; // 2 banks
        rom[0x0149] = 0x00; // no ram
        // Entrypoint at $0100: NOP forever.
        rom[0x0100] = 0x00;
        rom
    }

    #[test]
    fn power_on_without_boot_rom_snaps_to_documented_registers() {
        let path = std::env::temp_dir().join("pebblecore_test_power_on.gb");
        fs::write(&path, rom_only_rom()).unwrap();

        let mut gb = GameBoy::power_on(path.to_str().unwrap(), None).unwrap();
        let cycles = gb.step().unwrap();
        assert_eq!(cycles, 4); // NOP

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn run_stops_cleanly_when_frontend_requests_shutdown() {
        struct OneShot(bool);
        impl Frontend for OneShot {
            fn poll_events(&mut self) -> bool {
                std::mem::replace(&mut self.0, false)
            }
            fn present(&mut self, _frame: &Frame) {}
        }

        let path = std::env::temp_dir().join("pebblecore_test_run_stop.gb");
        fs::write(&path, rom_only_rom()).unwrap();

        let mut gb = GameBoy::power_on(path.to_str().unwrap(), None).unwrap();
        let mut frontend = OneShot(true);
        gb.run(&mut frontend).unwrap();

        let _ = fs::remove_file(&path);
    }
}
