use crate::hardware::ppu::Mode;

use bitflags::*;

bitflags! {
    /// FF40
    /// LCDC is a powerful tool: each bit controls a lot of behaviour,
    /// and can be modified at any time during the frame.
    #[derive(Default)]
    pub struct LcdControl: u8 {
        /// On DMG this toggles the background and window as a whole,
        /// when cleared both render blank. On CGB it only demotes their
        /// priority: sprites always end up on top while cleared.
        const BG_WINDOW_PRIORITY = 0b0000_0001;
        /// Toggles whether sprites are displayed, can be flipped mid-frame.
        const SPRITE_DISPLAY_ENABLE = 0b0000_0010;
        /// Sprite size select (0 = 8x8, 1 = 8x16).
        const SPRITE_SIZE = 0b0000_0100;
        /// Background tilemap select (0 = $9800, 1 = $9C00).
        const BG_TILE_MAP_SELECT = 0b0000_1000;
        /// Tile-data addressing mode for BG and window
        /// (0 = $8800-signed, 1 = $8000-unsigned). Sprites always use $8000.
        const BG_WINDOW_TILE_SELECT = 0b0001_0000;
        /// Window display enable, overridden on DMG by `BG_WINDOW_PRIORITY`.
        const WINDOW_DISPLAY = 0b0010_0000;
        /// Window tilemap select (0 = $9800, 1 = $9C00).
        const WINDOW_MAP_SELECT = 0b0100_0000;
        /// LCD/PPU master enable. Turning this off grants immediate and full
        /// access to VRAM and OAM.
        const LCD_DISPLAY = 0b1000_0000;
    }
}

bitflags! {
    /// FF41
    /// Mode bits in 0-1 and the LYC coincidence flag are read-only,
    /// the interrupt-source enables in bits 3-6 are software controlled.
    #[derive(Default)]
    pub struct LcdStatus: u8 {
        /// Mode flag (0: H-Blank, 1: V-Blank, 2: OAM scan, 3: transfer)
        const MODE_FLAG_0 = 0b0000_0001;
        /// Extension of `MODE_FLAG_0`
        const MODE_FLAG_1 = 0b0000_0010;
        /// (0: LYC != LY, 1: LYC == LY)
        const COINCIDENCE_FLAG = 0b0000_0100;
        /// Mode 0 H-Blank interrupt enable
        const MODE_0_H_INTERRUPT = 0b0000_1000;
        /// Mode 1 V-Blank interrupt enable
        const MODE_1_V_INTERRUPT = 0b0001_0000;
        /// Mode 2 OAM interrupt enable
        const MODE_2_OAM_INTERRUPT = 0b0010_0000;
        /// LYC == LY coincidence interrupt enable
        const COINCIDENCE_INTERRUPT = 0b0100_0000;

        const UNUSED = 0b1000_0000;
    }
}

bitflags! {
    /// The attribute byte of an OAM entry (or, on CGB, of a background tile
    /// in VRAM bank 1).
    #[derive(Default)]
    pub struct AttributeFlags: u8 {
        /// **CGB Mode Only** (OBP0-7 / BGP0-7)
        const PALETTE_NUMBER_CGB = 0b0000_0111;
        /// **CGB Mode Only** (0 = Bank 0, 1 = Bank 1)
        const TILE_VRAM_BANK = 0b0000_1000;
        /// **Non CGB Mode Only** (0 = OBP0, 1 = OBP1)
        const PALETTE_NUMBER = 0b0001_0000;
        /// (0 = Normal, 1 = Horizontally mirrored)
        const X_FLIP = 0b0010_0000;
        /// (0 = Normal, 1 = Vertically mirrored)
        const Y_FLIP = 0b0100_0000;
        /// (0 = OBJ above BG, 1 = OBJ behind BG colours 1-3)
        const OBJ_TO_BG_PRIORITY = 0b1000_0000;
    }
}

impl AttributeFlags {
    pub fn cgb_palette_number(&self) -> usize {
        (self.bits() & 0x07) as usize
    }

    pub fn vram_bank(&self) -> usize {
        self.contains(AttributeFlags::TILE_VRAM_BANK) as usize
    }
}

impl LcdStatus {
    pub fn mode_flag(&self) -> Mode {
        match self.bits() & 0x3 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamSearch,
            _ => Mode::LcdTransfer,
        }
    }

    pub fn set_mode_flag(&mut self, mode: Mode) {
        let mode_bits = match mode {
            Mode::HBlank => 0,
            Mode::VBlank => 1,
            Mode::OamSearch => 2,
            Mode::LcdTransfer => 3,
        };
        *self = LcdStatus::from_bits_truncate((self.bits() & 0xFC) | mode_bits);
    }
}
