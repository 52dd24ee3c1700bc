use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{EmuError, Result};

/*
 The cartridge header contains the following information:
 https://gbdev.io/pandocs/The_Cartridge_Header.html#the-cartridge-header
 Entry Point - $0100—$0103
 Nintendo Logo - $0104—$0133
 Title - $0134—$0143
 CGB Flag - $0143
 New Licensee Code - $0144—$0145
 SGB Flag - $0146
 Cartridge Type - $0147 (MBC)
 ROM Size - $0148
 RAM Size - $0149
 Destination Code - $014A
 Old Licensee Code - $014B
 Mask ROM Version Number - $014C
 Header Checksum - $014D
 Global Checksum - $014E—$014F
*/

const HEADER_END: usize = 0x0150;

/// Cartridge Type
/// Indicates what kind of hardware is used in the cartridge, most importantly the Memory Bank Controller (MBC).
#[derive(Debug, Eq, PartialEq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CartridgeType {
    RomOnly = 0x00,
    Mbc1 = 0x01,
    Mbc1Ram = 0x02,
    Mbc1RamBattery = 0x03,
    Mbc2 = 0x05,
    Mbc2Battery = 0x06,
    RomRam = 0x08,
    RomRamBattery = 0x09,
    Mmm01 = 0x0B,
    Mmm01Ram = 0x0C,
    Mmm01RamBattery = 0x0D,
    Mbc3TimerBattery = 0x0F,
    Mbc3TimerRamBattery = 0x10,
    Mbc3 = 0x11,
    Mbc3Ram = 0x12,
    Mbc3RamBattery = 0x13,
    Mbc5 = 0x19,
    Mbc5Ram = 0x1A,
    Mbc5RamBattery = 0x1B,
    Mbc5Rumble = 0x1C,
    Mbc5RumbleRam = 0x1D,
    Mbc5RumbleRamBattery = 0x1E,
    Mbc6 = 0x20,
    Mbc7SensorRumbleRamBattery = 0x22,
    PocketCamera = 0xFC,
    BandaiTama5 = 0xFD,
    HuC3 = 0xFE,
    HuC1RamBattery = 0xFF,
}

impl CartridgeType {
    pub fn has_ram(self) -> bool {
        matches!(
            self,
            CartridgeType::Mbc1Ram
                | CartridgeType::Mbc1RamBattery
                | CartridgeType::RomRam
                | CartridgeType::RomRamBattery
                | CartridgeType::Mmm01Ram
                | CartridgeType::Mmm01RamBattery
                | CartridgeType::Mbc3TimerRamBattery
                | CartridgeType::Mbc3Ram
                | CartridgeType::Mbc3RamBattery
                | CartridgeType::Mbc5Ram
                | CartridgeType::Mbc5RamBattery
                | CartridgeType::Mbc5RumbleRam
                | CartridgeType::Mbc5RumbleRamBattery
                | CartridgeType::Mbc7SensorRumbleRamBattery
                | CartridgeType::HuC1RamBattery
        )
    }

    pub fn has_battery(self) -> bool {
        matches!(
            self,
            CartridgeType::Mbc1RamBattery
                | CartridgeType::RomRamBattery
                | CartridgeType::Mmm01RamBattery
                | CartridgeType::Mbc2Battery
                | CartridgeType::Mbc3TimerBattery
                | CartridgeType::Mbc3TimerRamBattery
                | CartridgeType::Mbc3RamBattery
                | CartridgeType::Mbc5RamBattery
                | CartridgeType::Mbc5RumbleRamBattery
                | CartridgeType::Mbc7SensorRumbleRamBattery
                | CartridgeType::HuC1RamBattery
        )
    }
}

/// ROM Size ($0148). The number of 16 KiB banks is `2 << value` for the
/// documented range 0x00-0x08; a ROM size code of 0 means 2 banks.
#[derive(Debug, Eq, PartialEq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RomSize {
    Rom32Kb = 0x00,
    Rom64Kb = 0x01,
    Rom128Kb = 0x02,
    Rom256Kb = 0x03,
    Rom512Kb = 0x04,
    Rom1Mb = 0x05,
    Rom2Mb = 0x06,
    Rom4Mb = 0x07,
    Rom8Mb = 0x08,
}

impl RomSize {
    pub fn num_banks(self) -> usize {
        2usize << (self as u8)
    }
}

/// RAM Size ($0149). If the cartridge type does not name RAM, this is zero
/// regardless of the byte's value. MBC2's built-in 512x4-bit RAM is not
/// described by this field at all.
#[derive(Debug, Eq, PartialEq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RamSize {
    None = 0x00,
    Kb2Unused = 0x01,
    Kb8 = 0x02,
    Kb32 = 0x03,
    Kb128 = 0x04,
    Kb64 = 0x05,
}

impl RamSize {
    pub fn num_bytes(self) -> usize {
        match self {
            RamSize::None => 0,
            RamSize::Kb2Unused => 2 * 1024,
            RamSize::Kb8 => 8 * 1024,
            RamSize::Kb32 => 32 * 1024,
            RamSize::Kb128 => 128 * 1024,
            RamSize::Kb64 => 64 * 1024,
        }
    }
}

/// Parsed view over a ROM image's $0100-$014F header. Holds a copy of the
/// title and the handful of bytes the core's mapper selection and save
/// naming depend on; it does not validate the Nintendo logo.
#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub cartridge_type_byte: u8,
    pub rom_size_byte: u8,
    pub ram_size_byte: u8,
    pub destination_code: u8,
    pub old_licensee_code: u8,
    pub header_checksum: u8,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self> {
        if rom.len() < HEADER_END {
            return Err(EmuError::load(format!(
                "rom is {} bytes, shorter than the {} byte header",
                rom.len(),
                HEADER_END
            )));
        }
        let title_bytes = &rom[0x0134..=0x0143];
        let title_end = title_bytes.iter().position(|&b| b == 0).unwrap_or(title_bytes.len());
        let title = String::from_utf8_lossy(&title_bytes[..title_end])
            .trim_end()
            .to_string();

        Ok(Self {
            title,
            cartridge_type_byte: rom[0x0147],
            rom_size_byte: rom[0x0148],
            ram_size_byte: rom[0x0149],
            destination_code: rom[0x014A],
            old_licensee_code: rom[0x014B],
            header_checksum: rom[0x014D],
        })
    }

    pub fn cartridge_type(&self) -> Result<CartridgeType> {
        CartridgeType::try_from(self.cartridge_type_byte).map_err(|_| {
            EmuError::unsupported_mapper(format!(
                "unrecognized cartridge type byte {:#04x}",
                self.cartridge_type_byte
            ))
        })
    }

    pub fn rom_banks(&self) -> Result<usize> {
        RomSize::try_from(self.rom_size_byte)
            .map(RomSize::num_banks)
            .map_err(|_| {
                EmuError::load(format!("unsupported rom size byte {:#04x}", self.rom_size_byte))
            })
    }

    pub fn ram_bytes(&self) -> Result<usize> {
        RamSize::try_from(self.ram_size_byte)
            .map(RamSize::num_bytes)
            .map_err(|_| {
                EmuError::load(format!("unsupported ram size byte {:#04x}", self.ram_size_byte))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_header(cart_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
        let mut rom = vec![0u8; HEADER_END];
        rom[0x0134..0x013F].copy_from_slice(b"TESTGAME\0\0\0");
        rom[0x0147] = cart_type;
        rom[0x0148] = rom_size;
        rom[0x0149] = ram_size;
        rom
    }

    #[test]
    fn parses_title_and_type() {
        let rom = rom_with_header(0x01, 0x00, 0x00);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.title, "TESTGAME");
        assert_eq!(header.cartridge_type().unwrap(), CartridgeType::Mbc1);
        assert_eq!(header.rom_banks().unwrap(), 2);
    }

    #[test]
    fn rejects_truncated_rom() {
        let rom = vec![0u8; 16];
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn rejects_unknown_mapper() {
        let rom = rom_with_header(0x42, 0x00, 0x00);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(header.cartridge_type().is_err());
    }
}
