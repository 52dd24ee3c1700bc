pub mod header;
pub mod mbc;

use std::fs;
use std::path::Path;

use log::info;

use crate::error::{EmuError, Result};
use crate::mmu::memory::Memory;

pub use header::{CartridgeHeader, CartridgeType};

/// A loaded cartridge: ROM (and, for some mappers, RAM) behind whatever
/// bank-switching scheme its header's `CartridgeType` names. `Mmu` holds
/// this as `Box<dyn Cartridge>` and forwards all $0000-$7FFF and
/// $A000-$BFFF accesses to it unmodified.
pub trait Cartridge: Memory {
    /// Returns the mapper's battery-backed RAM, if it has any, for
    /// persisting to a `.sav` file. `None` for mappers with no RAM or no
    /// battery.
    fn save_ram(&self) -> Option<&[u8]>;
}

/// Loads a ROM file, parses its header, and constructs the matching mapper.
/// The returned header is kept alongside the cartridge for the title bar /
/// save-path logic in `gb`; the adjacent `.sav` file (if any) is loaded
/// automatically for battery-backed mappers.
pub fn load(path: impl AsRef<Path>) -> Result<(Box<dyn Cartridge>, CartridgeHeader)> {
    let path = path.as_ref();
    let rom = fs::read(path).map_err(|e| EmuError::load(format!("reading rom {path:?}: {e}")))?;
    let header = CartridgeHeader::parse(&rom)?;
    let cartridge_type = header.cartridge_type()?;
    info!(
        "loaded {:?} ({} bytes, type {:?})",
        header.title,
        rom.len(),
        cartridge_type
    );

    let has_battery = cartridge_type.has_battery();
    let save_path = mbc::save_path_for(path);

    let cartridge: Box<dyn Cartridge> = match cartridge_type {
        CartridgeType::RomOnly => Box::new(mbc::RomOnly::new(rom)),
        CartridgeType::Mbc1 | CartridgeType::Mbc1Ram | CartridgeType::Mbc1RamBattery => {
            let ram_len = header.ram_bytes()?;
            let ram = if has_battery {
                mbc::load_ram(&save_path, ram_len)
            } else {
                vec![0u8; ram_len]
            };
            Box::new(mbc::Mbc1::new(rom, ram))
        }
        CartridgeType::Mbc2 | CartridgeType::Mbc2Battery => {
            let ram = if has_battery {
                mbc::load_ram(&save_path, 512)
            } else {
                vec![0u8; 512]
            };
            Box::new(mbc::Mbc2::new(rom, ram))
        }
        other => {
            return Err(EmuError::unsupported_mapper(format!(
                "{other:?}; this core implements RomOnly, Mbc1, and Mbc2"
            )))
        }
    };

    Ok((cartridge, header))
}

/// Writes a cartridge's battery-backed RAM to its `.sav` file, if it has
/// any. Called when the core shuts down.
pub fn persist(rom_path: impl AsRef<Path>, cartridge: &dyn Cartridge) -> Result<()> {
    if let Some(ram) = cartridge.save_ram() {
        let save_path = mbc::save_path_for(rom_path);
        mbc::save_ram(&save_path, ram)
            .map_err(|e| EmuError::load(format!("writing save {save_path:?}: {e}")))?;
        info!("saved cartridge ram to {:?}", save_path);
    }
    Ok(())
}
