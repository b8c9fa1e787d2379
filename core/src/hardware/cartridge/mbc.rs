use num_integer::Integer;

use crate::hardware::cartridge::mbc3::Mbc3;
use crate::hardware::mmu::{EXTERNAL_RAM_START, INVALID_READ};

/// 16 KB
pub const ROM_BANK_SIZE: usize = 0x4000;
/// 8 KB
pub const EXTERNAL_RAM_BANK_SIZE: usize = 0x2000;

/// The mapper chip soldered onto the cartridge. Dispatch happens through a
/// plain enum so the hot ROM read path stays a jump table instead of a
/// virtual call.
#[derive(Debug, Clone)]
pub enum Mbc {
    RomOnly,
    Mbc1(Mbc1),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mbc {
    /// Select a mapper implementation from the cartridge type code.
    /// Unknown codes degrade to `RomOnly` rather than refusing the ROM.
    pub fn from_cartridge_type(code: u8) -> Self {
        match code {
            0x00 | 0x08 | 0x09 => Mbc::RomOnly,
            0x01..=0x03 => Mbc::Mbc1(Mbc1::default()),
            0x0F..=0x13 => Mbc::Mbc3(Mbc3::new(matches!(code, 0x0F | 0x10))),
            0x19..=0x1E => Mbc::Mbc5(Mbc5::default()),
            _ => {
                log::warn!(
                    "Unsupported cartridge type 0x{:02X}, falling back to ROM-only",
                    code
                );
                Mbc::RomOnly
            }
        }
    }
}

/// MBC1: 5+2 bit ROM banking with the mode select deciding whether the two
/// upper bits address ROM or RAM.
#[derive(Debug, Default, Clone)]
pub struct Mbc1 {
    pub ram_enabled: bool,
    pub rom_bank_low5: u8,
    pub ram_bank_or_rom_high2: u8,
    pub mode_select: bool,
}

impl Mbc1 {
    pub fn write_register(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = (value & 0x0F) == 0x0A,
            0x2000..=0x3FFF => {
                // Bank 0 can never be selected directly.
                let bank = value & 0x1F;
                self.rom_bank_low5 = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x5FFF => self.ram_bank_or_rom_high2 = value & 0x03,
            0x6000..=0x7FFF => self.mode_select = value & 0x01 != 0,
            _ => {}
        }
    }

    /// The bank mapped into `0x0000..=0x3FFF`.
    pub fn low_bank(&self) -> usize {
        if self.mode_select {
            (self.ram_bank_or_rom_high2 as usize) << 5
        } else {
            0
        }
    }

    /// The bank mapped into `0x4000..=0x7FFF`.
    pub fn high_bank(&self) -> usize {
        ((self.ram_bank_or_rom_high2 as usize) << 5) | self.rom_bank_low5 as usize
    }

    pub fn ram_bank(&self, ram_len: usize) -> usize {
        if self.mode_select && ram_len > EXTERNAL_RAM_BANK_SIZE {
            self.ram_bank_or_rom_high2 as usize
        } else {
            0
        }
    }
}

/// MBC5: a straight 9-bit ROM bank (bank 0 is a legal selection) and a
/// 4-bit RAM bank.
#[derive(Debug, Clone)]
pub struct Mbc5 {
    pub ram_enabled: bool,
    pub rom_bank: u16,
    pub ram_bank: u8,
}

impl Default for Mbc5 {
    fn default() -> Self {
        Mbc5 {
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
        }
    }
}

impl Mbc5 {
    pub fn write_register(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = (value & 0x0F) == 0x0A,
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | value as u16,
            0x3000..=0x3FFF => self.rom_bank = (self.rom_bank & 0xFF) | ((value as u16 & 0x01) << 8),
            0x4000..=0x5FFF => self.ram_bank = value & 0x0F,
            _ => {}
        }
    }
}

/// Read a byte out of a banked region, wrapping the bank to what the image
/// actually contains.
pub fn banked_read(data: &[u8], bank: usize, offset: usize, bank_size: usize) -> u8 {
    if data.is_empty() {
        return INVALID_READ;
    }

    let bank_count = Integer::div_ceil(&data.len(), &bank_size);
    let address = (bank % bank_count) * bank_size + offset;
    data.get(address).copied().unwrap_or(INVALID_READ)
}

pub fn external_ram_offset(address: u16) -> usize {
    (address - EXTERNAL_RAM_START) as usize
}
