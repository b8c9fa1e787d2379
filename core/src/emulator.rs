//! The machine wrapper: owns the CPU (which owns the bus), paces whole
//! frames, renders, and carries the host-facing save/battery/audio surface.

use log::*;
use nanoserde::{DeBin, SerBin};

use crate::crc::crc32;
use crate::hardware::cartridge::header::CartridgeHeader;
use crate::hardware::cartridge::Cartridge;
use crate::hardware::cpu::CPU;
use crate::hardware::mmu::Memory;
use crate::hardware::ppu::renderer::render_frame;
use crate::hardware::ppu::FRAMEBUFFER_SIZE;
use crate::io::bootrom::{BootRom, DMG_BOOT_SIZE};
use crate::io::joypad::Buttons;
use crate::state::{BusState, SaveState, SAVE_STATE_MAGIC, SAVE_STATE_VERSION};
use crate::{EmulatorError, EmulatorOptions};

/// The master clock, in T-cycles per second.
pub const DMG_CLOCK_SPEED: u32 = 4_194_304;
/// T-cycles per frame: 154 scanlines of 456 dots.
pub const CYCLES_PER_FRAME: u32 = 70_224;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameBoyModel {
    DMG,
    CGB,
}

impl GameBoyModel {
    pub fn is_dmg(self) -> bool {
        self == GameBoyModel::DMG
    }

    pub fn is_cgb(self) -> bool {
        self == GameBoyModel::CGB
    }
}

pub struct Emulator {
    cpu: CPU<Memory>,
    options: EmulatorOptions,
    framebuffer: Box<[u8; FRAMEBUFFER_SIZE]>,
    /// T-cycles consumed towards the current frame boundary.
    frame_cycles: u32,
    frame_count: u64,
}

impl Emulator {
    pub fn new(options: EmulatorOptions) -> Self {
        let mmu = Memory::new(GameBoyModel::DMG, BootRom::new(None));

        Emulator {
            cpu: CPU::new(mmu, options.trace),
            options,
            framebuffer: Box::new([0xFF; FRAMEBUFFER_SIZE]),
            frame_cycles: 0,
            frame_count: 0,
        }
    }

    /// Parse and insert a cartridge, then reset into the model its header
    /// asks for. An optional boot image is retained when it is big enough
    /// for at least the DMG boot (0x100 bytes; 0x800 for the full CGB one).
    pub fn load_cartridge(&mut self, rom: &[u8], boot: Option<&[u8]>) -> Result<(), EmulatorError> {
        let cartridge = Cartridge::new(rom, None)?;
        let is_cgb_cart = cartridge.header().cgb_flag;

        let boot_image = match boot {
            Some(image) if image.len() >= 0x800 => Some(image.to_vec()),
            Some(image) if image.len() >= DMG_BOOT_SIZE => {
                Some(image[..DMG_BOOT_SIZE].to_vec())
            }
            Some(image) => {
                warn!("Discarding boot image of only {} bytes", image.len());
                None
            }
            None => None,
        };

        self.cpu.mmu.boot_rom = BootRom::new(boot_image);
        self.cpu.mmu.insert_cartridge(cartridge);

        if is_cgb_cart {
            self.reset_cgb_post_boot(false);
        } else {
            self.reset_post_boot();
        }

        Ok(())
    }

    /// Canonical DMG post-boot state: the boot ROM is skipped entirely and
    /// the registers/IO hold the values it would have left behind.
    pub fn reset_post_boot(&mut self) {
        self.reset_core(GameBoyModel::DMG);

        let registers = &mut self.cpu.registers;
        registers.set_af(0x01B0);
        registers.set_bc(0x0013);
        registers.set_de(0x00D8);
        registers.set_hl(0x014D);
        registers.sp = 0xFFFE;
        registers.pc = 0x0100;

        self.seed_post_boot_io();
    }

    /// Start at the DMG boot ROM. Falls back to the post-boot state when no
    /// boot image was supplied.
    pub fn reset_with_boot(&mut self) {
        if !self.cpu.mmu.boot_rom.has_image() {
            warn!("No boot image present, falling back to post-boot reset");
            return self.reset_post_boot();
        }

        self.reset_core(GameBoyModel::DMG);
        self.cpu.mmu.boot_rom.restart();
        self.cpu.registers.sp = 0xFFFE;
        self.cpu.registers.pc = 0x0000;
    }

    /// Start at the CGB boot ROM, which requires the full-size image.
    pub fn reset_with_cgb_boot(&mut self) {
        if !self.cpu.mmu.boot_rom.has_cgb_image() {
            warn!("No CGB boot image present, falling back to post-boot reset");
            return self.reset_cgb_post_boot(false);
        }

        self.reset_core(GameBoyModel::CGB);
        self.cpu.mmu.boot_rom.restart();
        self.cpu.registers.sp = 0xFFFE;
        self.cpu.registers.pc = 0x0000;
    }

    /// Canonical CGB post-boot state. With `compat` set the machine runs a
    /// DMG cartridge with the boot ROM's compatibility palettes seeded into
    /// colour RAM.
    pub fn reset_cgb_post_boot(&mut self, compat: bool) {
        self.reset_core(GameBoyModel::CGB);

        let registers = &mut self.cpu.registers;
        registers.set_af(0x1180);
        registers.set_bc(0x0000);
        registers.set_de(0xFF56);
        registers.set_hl(0x000D);
        registers.sp = 0xFFFE;
        registers.pc = 0x0100;

        if compat {
            self.cpu.mmu.ppu.set_compat_mode();
        }

        self.seed_post_boot_io();
    }

    fn reset_core(&mut self, model: GameBoyModel) {
        self.cpu.reset();
        self.cpu.mmu.reset(model);
        self.frame_cycles = 0;
    }

    /// The IO register values the boot ROM leaves behind.
    fn seed_post_boot_io(&mut self) {
        let mmu = &mut self.cpu.mmu;
        mmu.timer.system_clock = 0xABCC;

        mmu.write_byte(0xFF11, 0x80);
        mmu.write_byte(0xFF12, 0xF3);
        mmu.write_byte(0xFF24, 0x77);
        mmu.write_byte(0xFF25, 0xF3);
        mmu.write_byte(0xFF47, 0xFC);
        mmu.write_byte(0xFF48, 0xFF);
        mmu.write_byte(0xFF49, 0xFF);
        mmu.write_byte(0xFF40, 0x91);
        mmu.write_byte(0xFF0F, 0xE1);
    }

    /// Run the machine for exactly one frame worth of T-cycles, then paint
    /// the framebuffer from the scanline snapshots.
    pub fn step_frame(&mut self) {
        self.run_frame();
        render_frame(&self.cpu.mmu.ppu, &self.options, &mut self.framebuffer);
    }

    /// Like `step_frame`, for hosts that are fast-forwarding or running
    /// headless and don't need the pixels.
    pub fn step_frame_no_render(&mut self) {
        self.run_frame();
    }

    fn run_frame(&mut self) {
        while self.frame_cycles < CYCLES_PER_FRAME {
            self.frame_cycles += self.cpu.step();
        }
        // Overshoot carries into the next frame.
        self.frame_cycles -= CYCLES_PER_FRAME;
        self.frame_count += 1;
    }

    /// The last rendered frame, RGBA8 row-major, 160x144.
    pub fn framebuffer(&self) -> &[u8; FRAMEBUFFER_SIZE] {
        &self.framebuffer
    }

    /// CRC32 of the current framebuffer, the fingerprint used by the
    /// regression tests.
    pub fn framebuffer_crc(&self) -> u32 {
        crc32(&self.framebuffer[..])
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn model(&self) -> GameBoyModel {
        self.cpu.mmu.model
    }

    pub fn cartridge_header(&self) -> Option<&CartridgeHeader> {
        self.cpu.mmu.cartridge.as_ref().map(|cartridge| cartridge.header())
    }

    /// Publish a fresh joypad state, raising the joypad interrupt on any
    /// newly pressed key of the selected group.
    pub fn set_buttons(&mut self, buttons: Buttons) {
        let mmu = &mut self.cpu.mmu;
        mmu.joypad.set_buttons(buttons, &mut mmu.interrupts);
    }

    /// Attach a sink receiving one byte per completed serial transfer.
    pub fn set_serial_writer(&mut self, sink: impl FnMut(u8) + Send + 'static) {
        self.cpu.mmu.serial.set_output(Box::new(sink));
    }

    /*
       Audio plumbing.
    */

    /// Pop up to `max_frames` stereo frames of 48 kHz output, interleaved
    /// left/right.
    pub fn apu_pull_stereo(&mut self, max_frames: usize) -> Vec<i16> {
        self.cpu.mmu.apu.output_buffer().pull_stereo(max_frames)
    }

    pub fn apu_buffered_stereo(&self) -> usize {
        self.cpu.mmu.apu.output_buffer().available()
    }

    pub fn apu_trim_stereo_to(&mut self, frames: usize) {
        self.cpu.mmu.apu.output_buffer().trim_to(frames);
    }

    pub fn apu_clear(&mut self) {
        self.cpu.mmu.apu.output_buffer().clear();
    }

    /// A shareable handle for a dedicated audio thread.
    pub fn audio_buffer(&self) -> std::sync::Arc<crate::hardware::apu::ring_buffer::AudioRingBuffer> {
        self.cpu.mmu.apu.output_buffer()
    }

    /*
       Battery saves.
    */

    /// The battery blob for the inserted cartridge, `None` when it has no
    /// battery-backed RAM.
    pub fn save_battery(&mut self) -> Option<Vec<u8>> {
        self.cpu.mmu.cartridge.as_mut()?.save_battery()
    }

    pub fn load_battery(&mut self, blob: &[u8]) -> bool {
        match self.cpu.mmu.cartridge.as_mut() {
            Some(cartridge) => cartridge.load_battery(blob),
            None => false,
        }
    }

    /*
       Save states.
    */

    /// Serialise the complete machine state behind a magic/version header.
    pub fn save_state(&self) -> Vec<u8> {
        let mmu = &self.cpu.mmu;

        let state = SaveState {
            cgb_mode: mmu.model.is_cgb(),
            cpu: self.cpu.save_state(),
            bus: BusState {
                boot_rom_finished: mmu.boot_rom.is_finished,
                wram: mmu.wram.raw().to_vec(),
                wram_bank: mmu.wram.bank(),
                hram: mmu.hram.raw().to_vec(),
                interrupt_enable: mmu.interrupts.read_ie(),
                interrupt_flag: mmu.interrupts.interrupt_flag.bits(),
                dma_active: mmu.oam_dma.active,
                dma_source: mmu.oam_dma.source,
                dma_index: mmu.oam_dma.index,
                timer: mmu.timer.save_state(),
                serial_data: mmu.serial.data,
                serial_control: mmu.serial.control(),
                joypad_select: mmu.joypad.selected_mode(),
                joypad_pressed: mmu.joypad.pressed_mask(),
            },
            has_cartridge: mmu.cartridge.is_some(),
            cartridge: mmu
                .cartridge
                .as_ref()
                .map(|cartridge| cartridge.save_state())
                .unwrap_or_default(),
            ppu: mmu.ppu.save_state(),
            apu: mmu.apu.save_state(),
            frame_cycles: self.frame_cycles,
            frame_count: self.frame_count,
        };

        let mut bytes = Vec::with_capacity(0x12000);
        bytes.extend_from_slice(SAVE_STATE_MAGIC);
        bytes.push(SAVE_STATE_VERSION);
        bytes.extend_from_slice(&SerBin::serialize_bin(&state));
        bytes
    }

    /// Restore a previously saved state. The machine is left untouched when
    /// the blob is malformed or of a different version.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), EmulatorError> {
        if bytes.len() < 5 || &bytes[0..4] != SAVE_STATE_MAGIC {
            return Err(EmulatorError::StateDecode(
                "missing save state header".to_owned(),
            ));
        }
        if bytes[4] != SAVE_STATE_VERSION {
            return Err(EmulatorError::StateVersionMismatch {
                found: bytes[4],
                expected: SAVE_STATE_VERSION,
            });
        }

        let state: SaveState = DeBin::deserialize_bin(&bytes[5..])
            .map_err(|error| EmulatorError::StateDecode(format!("{:?}", error)))?;

        if state.has_cartridge && self.cpu.mmu.cartridge.is_none() {
            return Err(EmulatorError::NoCartridge);
        }

        let model = if state.cgb_mode {
            GameBoyModel::CGB
        } else {
            GameBoyModel::DMG
        };

        let mmu = &mut self.cpu.mmu;
        mmu.model = model;
        mmu.boot_rom.is_finished = state.bus.boot_rom_finished;
        mmu.wram.restore(&state.bus.wram, state.bus.wram_bank);
        mmu.hram.restore(&state.bus.hram);
        mmu.interrupts.overwrite_ie(state.bus.interrupt_enable);
        mmu.interrupts.overwrite_if(state.bus.interrupt_flag);
        mmu.oam_dma.active = state.bus.dma_active;
        mmu.oam_dma.source = state.bus.dma_source;
        mmu.oam_dma.index = state.bus.dma_index.min(0xA0);
        mmu.timer.load_state(&state.bus.timer);
        mmu.serial
            .restore(state.bus.serial_data, state.bus.serial_control);
        mmu.joypad
            .restore(state.bus.joypad_select, state.bus.joypad_pressed);
        if state.has_cartridge {
            if let Some(cartridge) = mmu.cartridge.as_mut() {
                cartridge.load_state(&state.cartridge);
            }
        }
        mmu.ppu.load_state(&state.ppu);
        mmu.apu.load_state(&state.apu);

        self.cpu.load_state(&state.cpu);
        self.frame_cycles = state.frame_cycles.min(CYCLES_PER_FRAME);
        self.frame_count = state.frame_count;

        Ok(())
    }
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator")
            .field("model", &self.cpu.mmu.model)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::EmulatorOptionsBuilder;

    /// A 32 KiB ROM-only image with `program` placed at the entry point.
    fn rom_with_program(program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x100..0x100 + program.len()].copy_from_slice(program);
        rom
    }

    fn emulator_with_program(program: &[u8]) -> Emulator {
        let mut emulator = Emulator::new(EmulatorOptionsBuilder::new().build());
        emulator
            .load_cartridge(&rom_with_program(program), None)
            .unwrap();
        emulator
    }

    #[test]
    fn test_nop_then_xor_a() {
        let mut emulator = emulator_with_program(&[0x00, 0xAF]);

        let cycles = emulator.cpu.step();
        assert_eq!(cycles, 4);
        assert_eq!(emulator.cpu.registers.pc, 0x101);

        emulator.cpu.step();
        assert_eq!(emulator.cpu.registers.a, 0);
        assert_eq!(emulator.cpu.registers.f(), 0x80);
        assert_eq!(emulator.cpu.registers.pc, 0x102);
    }

    #[test]
    fn test_post_boot_register_values() {
        let emulator = emulator_with_program(&[0x00]);

        assert_eq!(emulator.cpu.registers.af(), 0x01B0);
        assert_eq!(emulator.cpu.registers.bc(), 0x0013);
        assert_eq!(emulator.cpu.registers.de(), 0x00D8);
        assert_eq!(emulator.cpu.registers.hl(), 0x014D);
        assert_eq!(emulator.cpu.registers.sp, 0xFFFE);
        assert_eq!(emulator.cpu.registers.pc, 0x0100);
        assert_eq!(emulator.cpu.mmu.read_byte(0xFF40), 0x91);
        assert_eq!(emulator.cpu.mmu.read_byte(0xFF47), 0xFC);
        assert_eq!(emulator.model(), GameBoyModel::DMG);
    }

    #[test]
    fn test_frame_stepping_advances_time() {
        // An endless loop: INC A / JP 0x0100.
        let mut emulator = emulator_with_program(&[0x3C, 0xC3, 0x00, 0x01]);

        emulator.step_frame();
        assert_eq!(emulator.frame_count(), 1);
        assert!(emulator.cpu.cycles_performed >= CYCLES_PER_FRAME as u64);

        emulator.step_frame_no_render();
        assert_eq!(emulator.frame_count(), 2);
    }

    #[test]
    fn test_lcd_off_renders_white() {
        // Disable the LCD (LDH (0x40),A with A=0x11) then loop.
        let mut emulator = emulator_with_program(&[0x3E, 0x11, 0xE0, 0x40, 0x18, 0xFE]);

        emulator.step_frame();
        assert!(emulator.framebuffer().iter().all(|&byte| byte == 0xFF));
    }

    #[test]
    fn test_serial_byte_reaches_sink() {
        let (sender, receiver) = mpsc::channel();
        let mut emulator = emulator_with_program(&[
            0x3E, 0x42, // LD A,0x42
            0xE0, 0x01, // LDH (SB),A
            0x3E, 0x81, // LD A,0x81
            0xE0, 0x02, // LDH (SC),A
            0x18, 0xFE, // JR -2
        ]);
        emulator.set_serial_writer(move |byte| sender.send(byte).unwrap());

        emulator.step_frame_no_render();

        assert_eq!(receiver.try_recv().unwrap(), 0x42);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_joypad_interrupt_on_press() {
        let mut emulator = emulator_with_program(&[0x18, 0xFE]);
        // Select the button group.
        emulator.cpu.mmu.write_byte(0xFF00, 0x10);
        emulator.cpu.mmu.interrupts.overwrite_if(0);

        emulator.set_buttons(Buttons {
            a: true,
            ..Default::default()
        });

        assert_eq!(emulator.cpu.mmu.read_byte(0xFF0F) & 0x10, 0x10);
        assert_eq!(emulator.cpu.mmu.read_byte(0xFF00) & 0x01, 0x00);
    }

    #[test]
    fn test_save_state_roundtrip_is_deterministic() {
        let program = [0x3C, 0xC3, 0x00, 0x01]; // INC A loop
        let mut first = emulator_with_program(&program);

        // Give the frame some content so the checksum is meaningful.
        for i in 0..16u16 {
            first.cpu.mmu.write_byte(0x8000 + i, 0xFF);
        }
        first.step_frame();
        first.step_frame();

        let snapshot = first.save_state();

        let mut second = Emulator::new(EmulatorOptionsBuilder::new().build());
        second
            .load_cartridge(&rom_with_program(&program), None)
            .unwrap();
        second.load_state(&snapshot).unwrap();

        for _ in 0..3 {
            first.step_frame();
            second.step_frame();
            assert_eq!(first.framebuffer_crc(), second.framebuffer_crc());
        }

        assert_eq!(first.save_state(), second.save_state());
    }

    #[test]
    fn test_state_checksum_changes_with_content() {
        let mut emulator = emulator_with_program(&[0x18, 0xFE]);

        emulator.step_frame();
        let blank = emulator.framebuffer_crc();

        for i in 0..16u16 {
            emulator.cpu.mmu.write_byte(0x8000 + i, 0xFF);
        }
        emulator.step_frame();
        assert_ne!(emulator.framebuffer_crc(), blank);
    }

    #[test]
    fn test_load_state_rejects_garbage() {
        let mut emulator = emulator_with_program(&[0x18, 0xFE]);
        let before = emulator.save_state();

        assert!(emulator.load_state(b"definitely not a state").is_err());
        assert!(emulator.load_state(&[]).is_err());

        let mut wrong_version = before.clone();
        wrong_version[4] = 99;
        match emulator.load_state(&wrong_version) {
            Err(EmulatorError::StateVersionMismatch { found: 99, .. }) => {}
            other => panic!("expected a version mismatch, got {:?}", other),
        }

        // Nothing may have been disturbed along the way.
        assert_eq!(emulator.save_state(), before);
    }

    #[test]
    fn test_battery_through_machine() {
        let mut rom = rom_with_program(&[0x18, 0xFE]);
        rom[0x147] = 0x03; // MBC1+RAM+BATTERY
        rom[0x149] = 0x02; // 8 KiB

        let mut emulator = Emulator::new(EmulatorOptionsBuilder::new().build());
        emulator.load_cartridge(&rom, None).unwrap();

        emulator.cpu.mmu.write_byte(0x0000, 0x0A);
        emulator.cpu.mmu.write_byte(0xA000, 0x5A);
        let blob = emulator.save_battery().unwrap();

        let mut restored = Emulator::new(EmulatorOptionsBuilder::new().build());
        restored.load_cartridge(&rom, None).unwrap();
        assert!(restored.load_battery(&blob));
        restored.cpu.mmu.write_byte(0x0000, 0x0A);
        assert_eq!(restored.cpu.mmu.read_byte(0xA000), 0x5A);
    }

    #[test]
    fn test_cgb_cartridge_selects_cgb_model() {
        let mut rom = rom_with_program(&[0x18, 0xFE]);
        rom[0x143] = 0x80;

        let mut emulator = Emulator::new(EmulatorOptionsBuilder::new().build());
        emulator.load_cartridge(&rom, None).unwrap();

        assert_eq!(emulator.model(), GameBoyModel::CGB);
        assert_eq!(emulator.cpu.registers.a, 0x11);
    }

    #[test]
    fn test_compat_mode_seeds_palettes() {
        let mut emulator = emulator_with_program(&[0x18, 0xFE]);
        emulator.reset_cgb_post_boot(true);

        assert!(emulator.cpu.mmu.ppu.dmg_compat());
        // The seeded palette reads back through the CRAM port.
        emulator.cpu.mmu.write_byte(0xFF68, 0x00);
        assert_eq!(emulator.cpu.mmu.read_byte(0xFF69), 0xFF);
    }

    #[test]
    fn test_boot_rom_reset_variants() {
        let mut emulator = Emulator::new(EmulatorOptionsBuilder::new().build());
        let boot = vec![0x00u8; 0x100];
        emulator
            .load_cartridge(&rom_with_program(&[0x18, 0xFE]), Some(&boot))
            .unwrap();

        emulator.reset_with_boot();
        assert_eq!(emulator.cpu.registers.pc, 0x0000);
        assert_eq!(emulator.cpu.registers.sp, 0xFFFE);

        // Disabling the overlay reveals the cartridge.
        emulator.cpu.mmu.write_byte(0xFF50, 0x01);
        assert_eq!(emulator.cpu.mmu.read_byte(0x0100), 0x18);
    }

    #[test]
    fn test_audio_accumulates_during_frames() {
        let mut emulator = emulator_with_program(&[0x18, 0xFE]);
        emulator.apu_clear();

        emulator.step_frame_no_render();

        // One frame is just shy of 1/59.73 s of samples.
        let buffered = emulator.apu_buffered_stereo();
        assert!((790..=810).contains(&buffered), "buffered {}", buffered);

        emulator.apu_trim_stereo_to(100);
        assert_eq!(emulator.apu_buffered_stereo(), 100);

        let samples = emulator.apu_pull_stereo(50);
        assert_eq!(samples.len(), 100);
        assert_eq!(emulator.apu_buffered_stereo(), 50);
    }
}
