use std::fs;
use std::path::Path;

use log::info;

use crate::error::{EmuError, Result};

/// Size of the DMG boot ROM, mapped at $0000-$00FF until the guest writes to
/// $FF50 (see `Mmu::write8`).
pub const BOOT_ROM_SIZE: usize = 256;

/// An authentic boot ROM image, supplied by the caller. The core never ships
/// one itself (it is copyrighted Nintendo firmware); absence is the common
/// case and is handled by snapping straight to the documented post-boot
/// register values instead.
pub struct BootRom {
    bytes: [u8; BOOT_ROM_SIZE],
}

impl BootRom {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BOOT_ROM_SIZE {
            return Err(EmuError::construction(format!(
                "boot rom must be exactly {} bytes, got {}",
                BOOT_ROM_SIZE,
                bytes.len()
            )));
        }
        let mut buf = [0u8; BOOT_ROM_SIZE];
        buf.copy_from_slice(bytes);
        Ok(Self { bytes: buf })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| EmuError::construction(format!("reading boot rom {path:?}: {e}")))?;
        info!("loaded boot rom from {:?}", path);
        Self::from_bytes(&bytes)
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }
}
