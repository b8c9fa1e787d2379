use std::fmt;
use std::fmt::{Debug, Formatter};

use log::*;

use crate::emulator::GameBoyModel;
use crate::hardware::apu::{APU, APU_MEM_END, APU_MEM_START, WAVE_SAMPLE_END, WAVE_SAMPLE_START};
use crate::hardware::cartridge::Cartridge;
use crate::hardware::mmu::dma::{OamDma, OAM_DMA_LENGTH};
use crate::hardware::mmu::hram::Hram;
use crate::hardware::mmu::wram::{Wram, CGB_WRAM_BANK};
use crate::hardware::ppu::cgb_palette::{
    CGB_BACKGROUND_COLOR_INDEX, CGB_BACKGROUND_PALETTE_DATA, CGB_OBJECT_PALETTE_DATA,
    CGB_SPRITE_COLOR_INDEX,
};
use crate::hardware::ppu::*;
use crate::io::bootrom::{BootRom, BOOT_ROM_DISABLE};
use crate::io::interrupts::{Interrupts, INTERRUPTS_ENABLE, INTERRUPTS_FLAG};
use crate::io::joypad::{JoyPad, JOYPAD_REGISTER};
use crate::io::serial::{Serial, SIO_CONT, SIO_DATA};
use crate::io::timer::{
    TimerRegisters, DIVIDER_REGISTER, TIMER_CONTROL, TIMER_COUNTER, TIMER_MODULO,
};

pub mod dma;
pub mod hram;
pub mod wram;

/// 16 KB ROM bank, usually 00. From cartridge, read-only.
pub const ROM_BANK_00_START: u16 = 0x0000;
pub const ROM_BANK_00_END: u16 = 0x3FFF;
/// 16 KB ROM bank 01~NN. From cartridge, switchable via the MBC. Read-only.
pub const ROM_BANK_NN_START: u16 = 0x4000;
pub const ROM_BANK_NN_END: u16 = 0x7FFF;
/// 8 KB of VRAM, only bank 0 in non-CGB mode. Switchable bank 0/1 on CGB.
pub const VRAM_START: u16 = 0x8000;
pub const VRAM_END: u16 = 0x9FFF;
/// 8 KB of external RAM, in-cartridge, switchable bank if any.
pub const EXTERNAL_RAM_START: u16 = 0xA000;
pub const EXTERNAL_RAM_END: u16 = 0xBFFF;
/// 4 KB work RAM bank 0.
pub const WRAM_BANK_00_START: u16 = 0xC000;
pub const WRAM_BANK_00_END: u16 = 0xCFFF;
/// 4 KB work RAM bank 1~7. Only bank 1 in non-CGB mode.
pub const WRAM_BANK_NN_START: u16 = 0xD000;
pub const WRAM_BANK_NN_END: u16 = 0xDFFF;
/// Mirror of 0xC000~0xDDFF (echo RAM). Typically not used.
pub const ECHO_RAM_START: u16 = 0xE000;
pub const ECHO_RAM_END: u16 = 0xFDFF;
/// The offset to subtract from an echo address to land in WRAM.
pub const ECHO_RAM_OFFSET: u16 = 0x2000;
/// Sprite attribute table (OAM).
pub const OAM_ATTRIBUTE_START: u16 = 0xFE00;
pub const OAM_ATTRIBUTE_END: u16 = 0xFE9F;
/// Not usable.
pub const NOT_USABLE_START: u16 = 0xFEA0;
pub const NOT_USABLE_END: u16 = 0xFEFF;
/// IO registers.
pub const IO_START: u16 = 0xFF00;
pub const IO_END: u16 = 0xFF7F;
/// High RAM (HRAM).
pub const HRAM_START: u16 = 0xFF80;
pub const HRAM_END: u16 = 0xFFFE;

/// CGB double-speed switch, out of scope for this core.
pub const CGB_PREPARE_SWITCH: u16 = 0xFF4D;
/// CGB VRAM DMA, stubbed: writes are dropped, reads are open bus.
pub const CGB_HDMA_1: u16 = 0xFF51;
pub const CGB_HDMA_5: u16 = 0xFF55;

/// The value to return for an invalid read.
pub const INVALID_READ: u8 = 0xFF;

/// The bus as the CPU sees it. Every memory access of an instruction goes
/// through this trait, and once the instruction retires the consumed
/// T-cycles are replayed into `tick` so the peripherals catch up.
pub trait MemoryMapper: Debug {
    fn read_byte(&self, address: u16) -> u8;
    fn write_byte(&mut self, address: u16, value: u8);
    /// Advance timer, PPU, APU and DMA by the given amount of T-cycles.
    fn tick(&mut self, t_cycles: u32);
    fn interrupts(&self) -> &Interrupts;
    fn interrupts_mut(&mut self) -> &mut Interrupts;
}

pub struct Memory {
    pub model: GameBoyModel,
    pub boot_rom: BootRom,
    pub cartridge: Option<Cartridge>,

    pub ppu: PPU,
    pub apu: APU,
    pub hram: Hram,
    pub wram: Wram,
    pub oam_dma: OamDma,

    pub joypad: JoyPad,
    pub timer: TimerRegisters,
    pub serial: Serial,
    pub interrupts: Interrupts,
}

impl Memory {
    pub fn new(model: GameBoyModel, boot_rom: BootRom) -> Self {
        Memory {
            model,
            boot_rom,
            cartridge: None,
            ppu: PPU::new(model.is_cgb()),
            apu: APU::default(),
            hram: Hram::new(),
            wram: Wram::new(),
            oam_dma: OamDma::default(),
            joypad: JoyPad::new(),
            timer: TimerRegisters::default(),
            serial: Serial::default(),
            interrupts: Interrupts::default(),
        }
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    /// Return every peripheral to its power-on state. The cartridge, the
    /// boot image, the serial sink, and the audio queue all survive.
    pub fn reset(&mut self, model: GameBoyModel) {
        self.model = model;
        self.ppu = PPU::new(model.is_cgb());
        let output = self.apu.output_buffer();
        output.clear();
        self.apu = APU::with_output(output);
        self.hram = Hram::new();
        self.wram = Wram::new();
        self.oam_dma = OamDma::default();
        self.joypad = JoyPad::new();
        self.timer = TimerRegisters::default();
        self.interrupts = Interrupts::default();
        self.serial.restore(0, 0);
        // Post-boot by default, the boot reset variants re-arm the overlay.
        self.boot_rom.is_finished = true;
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        match address {
            _ if self.boot_rom.covers(address, self.model.is_cgb()) => {
                self.boot_rom.read_byte(address)
            }
            ROM_BANK_00_START..=ROM_BANK_00_END => match &self.cartridge {
                Some(cartridge) => cartridge.read_0000_3fff(address),
                None => INVALID_READ,
            },
            ROM_BANK_NN_START..=ROM_BANK_NN_END => match &self.cartridge {
                Some(cartridge) => cartridge.read_4000_7fff(address),
                None => INVALID_READ,
            },
            VRAM_START..=VRAM_END => self.ppu.read_vram(address),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => match &self.cartridge {
                Some(cartridge) => cartridge.read_external_ram(address),
                None => INVALID_READ,
            },
            WRAM_BANK_00_START..=WRAM_BANK_NN_END => self.wram.read_byte(address),
            ECHO_RAM_START..=ECHO_RAM_END => self.wram.read_byte(address - ECHO_RAM_OFFSET),
            OAM_ATTRIBUTE_START..=OAM_ATTRIBUTE_END => {
                if self.oam_dma.active {
                    INVALID_READ
                } else {
                    self.ppu.read_oam(address)
                }
            }
            NOT_USABLE_START..=NOT_USABLE_END => INVALID_READ,
            IO_START..=IO_END => self.read_io_byte(address),
            HRAM_START..=HRAM_END => self.hram.read_byte(address),
            INTERRUPTS_ENABLE => self.interrupts.read_ie(),
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            ROM_BANK_00_START..=ROM_BANK_NN_END => {
                if let Some(cartridge) = self.cartridge.as_mut() {
                    cartridge.write_mbc_register(address, value);
                }
            }
            VRAM_START..=VRAM_END => self.ppu.write_vram(address, value),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => {
                if let Some(cartridge) = self.cartridge.as_mut() {
                    cartridge.write_external_ram(address, value);
                }
            }
            WRAM_BANK_00_START..=WRAM_BANK_NN_END => self.wram.write_byte(address, value),
            ECHO_RAM_START..=ECHO_RAM_END => {
                self.wram.write_byte(address - ECHO_RAM_OFFSET, value)
            }
            OAM_ATTRIBUTE_START..=OAM_ATTRIBUTE_END => {
                if !self.oam_dma.active {
                    self.ppu.write_oam(address, value);
                }
            }
            NOT_USABLE_START..=NOT_USABLE_END => {
                trace!("ROM writing to non-usable memory: {:04X}", address)
            }
            IO_START..=IO_END => self.write_io_byte(address, value),
            HRAM_START..=HRAM_END => self.hram.set_byte(address, value),
            INTERRUPTS_ENABLE => self.interrupts.overwrite_ie(value),
        }
    }

    /// Specific method for all reads of the IO registers.
    fn read_io_byte(&self, address: u16) -> u8 {
        match address {
            JOYPAD_REGISTER => self.joypad.get_register(),
            SIO_DATA => self.serial.data,
            SIO_CONT => self.serial.read_control(),
            DIVIDER_REGISTER => self.timer.divider_register(),
            TIMER_COUNTER => self.timer.timer_counter,
            TIMER_MODULO => self.timer.timer_modulo,
            TIMER_CONTROL => self.timer.timer_control(),
            INTERRUPTS_FLAG => self.interrupts.read_if(),
            APU_MEM_START..=APU_MEM_END => self.apu.read_register(address),
            WAVE_SAMPLE_START..=WAVE_SAMPLE_END => self.apu.read_register(address),
            LCD_CONTROL_REGISTER => self.ppu.get_lcd_control(),
            LCD_STATUS_REGISTER => self.ppu.get_lcd_status(),
            SCY_REGISTER => self.ppu.get_scy(),
            SCX_REGISTER => self.ppu.get_scx(),
            LY_REGISTER => self.ppu.get_ly(),
            LYC_REGISTER => self.ppu.get_lyc(),
            DMA_TRANSFER => self.oam_dma.register_value(),
            BG_PALETTE => self.ppu.get_bg_palette(),
            OB_PALETTE_0 => self.ppu.get_oam_palette_0(),
            OB_PALETTE_1 => self.ppu.get_oam_palette_1(),
            WY_REGISTER => self.ppu.get_window_y(),
            WX_REGISTER => self.ppu.get_window_x(),
            CGB_PREPARE_SWITCH => INVALID_READ,
            CGB_VRAM_BANK_REGISTER => self.ppu.get_vram_bank(),
            CGB_HDMA_1..=CGB_HDMA_5 => INVALID_READ,
            CGB_BACKGROUND_COLOR_INDEX => self.ppu.get_bg_cram_index(),
            CGB_BACKGROUND_PALETTE_DATA => self.ppu.get_bg_cram_data(),
            CGB_SPRITE_COLOR_INDEX => self.ppu.get_obj_cram_index(),
            CGB_OBJECT_PALETTE_DATA => self.ppu.get_obj_cram_data(),
            CGB_WRAM_BANK => {
                if self.model.is_cgb() {
                    self.wram.read_bank_select()
                } else {
                    INVALID_READ
                }
            }
            _ => INVALID_READ,
        }
    }

    fn write_io_byte(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD_REGISTER => self.joypad.set_register(value, &mut self.interrupts),
            SIO_DATA => self.serial.data = value,
            SIO_CONT => self.serial.write_control(value, &mut self.interrupts),
            DIVIDER_REGISTER => self.timer.set_divider(),
            TIMER_COUNTER => self.timer.set_timer_counter(value),
            TIMER_MODULO => self.timer.set_tma(value),
            TIMER_CONTROL => self.timer.set_timer_control(value),
            INTERRUPTS_FLAG => self.interrupts.overwrite_if(value),
            APU_MEM_START..=APU_MEM_END => self.apu.write_register(address, value),
            WAVE_SAMPLE_START..=WAVE_SAMPLE_END => self.apu.write_register(address, value),
            LCD_CONTROL_REGISTER => self.ppu.set_lcd_control(value, &mut self.interrupts),
            LCD_STATUS_REGISTER => self.ppu.set_lcd_status(value),
            SCY_REGISTER => self.ppu.set_scy(value),
            SCX_REGISTER => self.ppu.set_scx(value),
            // LY is read-only.
            LY_REGISTER => {}
            LYC_REGISTER => self.ppu.set_lyc(value, &mut self.interrupts),
            DMA_TRANSFER => self.oam_dma.start(value),
            BG_PALETTE => self.ppu.set_bg_palette(value),
            OB_PALETTE_0 => self.ppu.set_oam_palette_0(value),
            OB_PALETTE_1 => self.ppu.set_oam_palette_1(value),
            WY_REGISTER => self.ppu.set_window_y(value),
            WX_REGISTER => self.ppu.set_window_x(value),
            CGB_VRAM_BANK_REGISTER => self.ppu.set_vram_bank(value),
            BOOT_ROM_DISABLE => {
                // Any non-zero write permanently unmaps the boot ROM.
                if value != 0 && !self.boot_rom.is_finished {
                    self.boot_rom.is_finished = true;
                    info!("Finished executing boot ROM");
                }
            }
            CGB_HDMA_1..=CGB_HDMA_5 => {
                trace!("Ignoring HDMA write {:02X} to {:04X}", value, address)
            }
            CGB_BACKGROUND_COLOR_INDEX => self.ppu.set_bg_cram_index(value),
            CGB_BACKGROUND_PALETTE_DATA => self.ppu.set_bg_cram_data(value),
            CGB_SPRITE_COLOR_INDEX => self.ppu.set_obj_cram_index(value),
            CGB_OBJECT_PALETTE_DATA => self.ppu.set_obj_cram_data(value),
            CGB_WRAM_BANK => {
                if self.model.is_cgb() {
                    self.wram.write_bank_select(value);
                }
            }
            _ => {}
        }
    }

    /// Advance every peripheral in lock-step after an instruction retires.
    pub fn tick_peripherals(&mut self, t_cycles: u32) {
        self.timer.tick(t_cycles, &mut self.interrupts);
        self.ppu.tick(t_cycles, &mut self.interrupts);
        self.apu.tick(t_cycles);
        self.tick_oam_dma(t_cycles);
    }

    /// Copy one byte per elapsed T-cycle until the transfer completes.
    fn tick_oam_dma(&mut self, t_cycles: u32) {
        if !self.oam_dma.active {
            return;
        }

        let remaining = (OAM_DMA_LENGTH - self.oam_dma.index) as u32;
        for _ in 0..t_cycles.min(remaining) {
            let byte = self.dma_read(self.oam_dma.source.wrapping_add(self.oam_dma.index));
            self.ppu.write_oam_dma(self.oam_dma.index, byte);
            self.oam_dma.index += 1;
        }

        if self.oam_dma.index == OAM_DMA_LENGTH {
            self.oam_dma.active = false;
        }
    }

    /// Reads performed by the DMA engine: these bypass the OAM lock and the
    /// PPU mode gating entirely.
    fn dma_read(&self, address: u16) -> u8 {
        match address {
            ROM_BANK_00_START..=ROM_BANK_00_END => match &self.cartridge {
                Some(cartridge) => cartridge.read_0000_3fff(address),
                None => INVALID_READ,
            },
            ROM_BANK_NN_START..=ROM_BANK_NN_END => match &self.cartridge {
                Some(cartridge) => cartridge.read_4000_7fff(address),
                None => INVALID_READ,
            },
            VRAM_START..=VRAM_END => self.ppu.vram_byte(address),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => match &self.cartridge {
                Some(cartridge) => cartridge.read_external_ram(address),
                None => INVALID_READ,
            },
            WRAM_BANK_00_START..=WRAM_BANK_NN_END => self.wram.read_byte(address),
            ECHO_RAM_START..=ECHO_RAM_END => self.wram.read_byte(address - ECHO_RAM_OFFSET),
            _ => INVALID_READ,
        }
    }
}

impl MemoryMapper for Memory {
    fn read_byte(&self, address: u16) -> u8 {
        Memory::read_byte(self, address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        Memory::write_byte(self, address, value)
    }

    fn tick(&mut self, t_cycles: u32) {
        self.tick_peripherals(t_cycles)
    }

    fn interrupts(&self) -> &Interrupts {
        &self.interrupts
    }

    fn interrupts_mut(&mut self) -> &mut Interrupts {
        &mut self.interrupts
    }
}

impl Debug for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("model", &self.model)
            .field("ppu", &self.ppu)
            .field("oam_dma", &self.oam_dma)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dmg_memory() -> Memory {
        Memory::new(GameBoyModel::DMG, BootRom::new(None))
    }

    #[test]
    fn test_echo_ram_mirrors_wram() {
        let mut memory = dmg_memory();

        for &(address, value) in &[(0xC000u16, 0x11u8), (0xCDEF, 0x22), (0xDDFF, 0x33)] {
            memory.write_byte(address + ECHO_RAM_OFFSET, value);
            assert_eq!(memory.read_byte(address), value);

            memory.write_byte(address, !value);
            assert_eq!(memory.read_byte(address + ECHO_RAM_OFFSET), !value);
        }
    }

    #[test]
    fn test_unusable_region_reads_ff() {
        let mut memory = dmg_memory();
        for address in NOT_USABLE_START..=NOT_USABLE_END {
            memory.write_byte(address, 0x42);
            assert_eq!(memory.read_byte(address), INVALID_READ);
        }
    }

    #[test]
    fn test_missing_cartridge_reads_ff() {
        let memory = dmg_memory();
        assert_eq!(memory.read_byte(0x0000), INVALID_READ);
        assert_eq!(memory.read_byte(0x4000), INVALID_READ);
        assert_eq!(memory.read_byte(0xA000), INVALID_READ);
    }

    #[test]
    fn test_register_read_masks() {
        let memory = dmg_memory();

        assert_eq!(memory.read_byte(0xFF00) & 0xC0, 0xC0);
        assert_eq!(memory.read_byte(0xFF02) & 0x7E, 0x7E);
        assert_eq!(memory.read_byte(0xFF07) & 0xF8, 0xF8);
        assert_eq!(memory.read_byte(0xFF0F) & 0xE0, 0xE0);
        assert_eq!(memory.read_byte(0xFF41) & 0x80, 0x80);
        assert_eq!(memory.read_byte(0xFF26) & 0x70, 0x70);
        // CGB-only ports are open bus on DMG.
        assert_eq!(memory.read_byte(0xFF4F), 0xFF);
        assert_eq!(memory.read_byte(0xFF68), 0xFF);
        assert_eq!(memory.read_byte(0xFF70), 0xFF);
    }

    #[test]
    fn test_oam_dma_blocks_and_copies() {
        let mut memory = dmg_memory();

        for i in 0..0xA0u16 {
            memory.write_byte(0xC000 + i, i as u8);
        }

        memory.write_byte(0xFE00, 0x55);
        assert_eq!(memory.read_byte(0xFE00), 0x55);

        memory.write_byte(0xFF46, 0xC0);
        // Immediately after the trigger OAM is locked out.
        assert_eq!(memory.read_byte(0xFE00), INVALID_READ);
        memory.write_byte(0xFE00, 0xEE);

        memory.tick_peripherals(0xA0);
        for i in 0..0xA0u16 {
            assert_eq!(memory.read_byte(0xFE00 + i), i as u8);
        }

        // Writes work again once the transfer is over.
        memory.write_byte(0xFE05, 0xEE);
        assert_eq!(memory.read_byte(0xFE05), 0xEE);
        assert_eq!(memory.read_byte(0xFF46), 0xC0);
    }

    #[test]
    fn test_boot_rom_overlay_and_disable() {
        let mut boot = BootRom::new(Some(vec![0xAA; 0x100]));
        boot.restart();
        let mut memory = Memory::new(GameBoyModel::DMG, boot);

        assert_eq!(memory.read_byte(0x0000), 0xAA);

        // Zero writes are ignored.
        memory.write_byte(0xFF50, 0x00);
        assert_eq!(memory.read_byte(0x0000), 0xAA);

        memory.write_byte(0xFF50, 0x01);
        // No cartridge behind the overlay here, so the bus floats.
        assert_eq!(memory.read_byte(0x0000), INVALID_READ);
    }

    #[test]
    fn test_ie_round_trip() {
        let mut memory = dmg_memory();
        memory.write_byte(0xFFFF, 0x1F);
        assert_eq!(memory.read_byte(0xFFFF), 0x1F);
    }
}
