use crate::EmulatorError;

pub const HEADER_START: u16 = 0x0100;
pub const HEADER_END: u16 = 0x014F;

/// The parsed contents of the cartridge header at `0x0100..=0x014F`.
#[derive(Debug, Default, Clone)]
pub struct CartridgeHeader {
    /// Upper case ASCII, 16 characters on DMG, zero filled if less than that.
    /// On CGB carts it's 11 to 15 characters instead.
    pub title: String,
    /// On DMG this is still part of the title bytes, on CGB it contains a flag
    /// for determining the relevant mode.
    pub cgb_flag: bool,
    /// Specifies which Memory Bank Controller (if any) is used in the cartridge,
    /// and if further external hardware exists in the cartridge.
    pub cartridge_type: u8,
    /// Specifies the ROM size of the cartridge, typically calculated as "32KB shl N".
    pub rom_size: u8,
    /// Specifies the size of the external RAM in the cartridge (if any).
    pub ram_size: u8,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, EmulatorError> {
        if rom.len() < 0x150 {
            return Err(EmulatorError::HeaderParse(format!(
                "ROM of {} bytes is too short to contain a header",
                rom.len()
            )));
        }

        let cgb_flag = matches!(rom[0x143], 0x80 | 0xC0);
        let header = CartridgeHeader {
            title: read_title(rom, cgb_flag),
            cgb_flag,
            cartridge_type: rom[0x147],
            rom_size: rom[0x148],
            ram_size: rom[0x149],
        };

        if header.rom_byte_size() > rom.len() {
            return Err(EmulatorError::HeaderParse(format!(
                "header declares {} ROM bytes but only {} are present",
                header.rom_byte_size(),
                rom.len()
            )));
        }

        Ok(header)
    }

    /// The declared ROM size in bytes (`32 KiB << code`).
    pub fn rom_byte_size(&self) -> usize {
        0x8000 << self.rom_size.min(8)
    }

    /// The declared external RAM size in bytes.
    pub fn ram_byte_size(&self) -> usize {
        match self.ram_size {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }

    /// Whether the cartridge type code includes battery-backed RAM (or RTC).
    pub fn has_battery(&self) -> bool {
        matches!(
            self.cartridge_type,
            0x03 | 0x06 | 0x09 | 0x0D | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }
}

fn read_title(rom: &[u8], cgb_mode: bool) -> String {
    // CGB titles vary between 11 and 15 characters, we pick the pessimistic option.
    let slice = if cgb_mode {
        &rom[0x134..=0x13E]
    } else {
        &rom[0x134..=0x143]
    };

    slice
        .iter()
        .copied()
        .take_while(|&byte| byte != 0)
        .map(|byte| if byte.is_ascii() { byte as char } else { '?' })
        .collect()
}
