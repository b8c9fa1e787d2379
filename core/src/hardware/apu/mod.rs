//! The APU and its mixer. All four voices run off the shared T-cycle clock;
//! a 512 Hz frame sequencer clocks lengths, envelopes and the sweep, and a
//! rational accumulator decides which T-cycles emit an output frame.

use std::sync::Arc;

use crate::emulator::DMG_CLOCK_SPEED;
use crate::hardware::apu::noise_channel::NoiseChannel;
use crate::hardware::apu::ring_buffer::AudioRingBuffer;
use crate::hardware::apu::square_channel::SquareWaveChannel;
use crate::hardware::apu::wave_channel::WaveformChannel;
use crate::hardware::mmu::INVALID_READ;
use crate::state::ApuState;

pub mod channel_features;
pub mod noise_channel;
pub mod ring_buffer;
pub mod square_channel;
pub mod wave_channel;

pub const APU_MEM_START: u16 = 0xFF10;
pub const APU_MEM_END: u16 = 0xFF2F;
pub const WAVE_SAMPLE_START: u16 = 0xFF30;
pub const WAVE_SAMPLE_END: u16 = 0xFF3F;

/// The frame sequencer clocks at 512 Hz.
pub const FRAME_SEQUENCE_CYCLES: u32 = DMG_CLOCK_SPEED / 512;
/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
/// Fixed mixer gain, keeps four simultaneous voices well clear of clipping.
const MIX_GAIN: f32 = 0.20;

#[derive(Debug)]
pub struct APU {
    voice1: SquareWaveChannel,
    voice2: SquareWaveChannel,
    voice3: WaveformChannel,
    voice4: NoiseChannel,
    // The vin bits are unused by games, but kept for register fidelity.
    vin_l_enable: bool,
    vin_r_enable: bool,
    left_volume: u8,
    right_volume: u8,
    /// NR51 routing bits: low nibble right, high nibble left.
    channel_routing: u8,
    global_sound_enable: bool,
    frame_sequencer_step: u8,
    sequencer_counter: u32,
    /// Accumulates `SAMPLE_RATE` per T-cycle, one frame is emitted per
    /// `DMG_CLOCK_SPEED` overflow. Integer arithmetic, so the long-run
    /// output rate is exact.
    sample_counter: u32,
    output: Arc<AudioRingBuffer>,
}

impl Default for APU {
    fn default() -> Self {
        APU {
            voice1: SquareWaveChannel::with_sweep(),
            voice2: SquareWaveChannel::default(),
            voice3: WaveformChannel::default(),
            voice4: NoiseChannel::default(),
            vin_l_enable: false,
            vin_r_enable: false,
            left_volume: 7,
            right_volume: 7,
            channel_routing: 0xF3,
            global_sound_enable: true,
            frame_sequencer_step: 0,
            sequencer_counter: FRAME_SEQUENCE_CYCLES,
            sample_counter: 0,
            output: Arc::new(AudioRingBuffer::default()),
        }
    }
}

impl APU {
    /// Rebuild the APU around an existing sample queue, so host audio
    /// threads survive a reset.
    pub fn with_output(output: Arc<AudioRingBuffer>) -> Self {
        APU {
            output,
            ..Default::default()
        }
    }

    /// A handle to the sample queue, safe to hand to an audio thread.
    pub fn output_buffer(&self) -> Arc<AudioRingBuffer> {
        self.output.clone()
    }

    pub fn tick(&mut self, t_cycles: u32) {
        for _ in 0..t_cycles {
            if self.global_sound_enable {
                self.sequencer_counter -= 1;
                if self.sequencer_counter == 0 {
                    self.sequencer_counter = FRAME_SEQUENCE_CYCLES;
                    self.tick_frame_sequencer();
                }

                self.voice1.tick_timer(1);
                self.voice2.tick_timer(1);
                self.voice3.tick_timer(1);
                self.voice4.tick_timer(1);
            }

            self.sample_counter += SAMPLE_RATE;
            if self.sample_counter >= DMG_CLOCK_SPEED {
                self.sample_counter -= DMG_CLOCK_SPEED;
                self.generate_sample();
            }
        }
    }

    /// One 512 Hz step: lengths on the even steps, the sweep on 2 and 6,
    /// envelopes on step 7.
    fn tick_frame_sequencer(&mut self) {
        match self.frame_sequencer_step {
            0 | 4 => self.tick_length(),
            2 | 6 => {
                self.tick_length();
                self.voice1.tick_sweep();
            }
            7 => self.tick_envelope(),
            _ => {}
        }
        self.frame_sequencer_step = (self.frame_sequencer_step + 1) % 8;
    }

    fn tick_length(&mut self) {
        self.voice1.tick_length();
        self.voice2.tick_length();
        self.voice3.tick_length();
        self.voice4.tick_length();
    }

    fn tick_envelope(&mut self) {
        self.voice1.tick_envelope();
        self.voice2.tick_envelope();
        self.voice4.tick_envelope();
    }

    /// Mix the four voices into one stereo frame and queue it.
    fn generate_sample(&mut self) {
        let outputs = [
            self.voice1.output_volume() as f32 / 15.0,
            self.voice2.output_volume() as f32 / 15.0,
            if self.voice3.dac_enabled() {
                self.voice3.output_volume() as f32 / 7.5 - 1.0
            } else {
                0.0
            },
            self.voice4.output_volume() as f32 / 15.0,
        ];

        // An all-zero NR51 would produce dead silence on boot for ROMs that
        // never touch it, route everything everywhere instead.
        let routing = if self.channel_routing == 0 {
            0xFF
        } else {
            self.channel_routing
        };

        let mut left = 0f32;
        let mut right = 0f32;
        for (index, output) in outputs.iter().enumerate() {
            if routing & (1 << (index + 4)) != 0 {
                left += output;
            }
            if routing & (1 << index) != 0 {
                right += output;
            }
        }

        left *= (self.left_volume as f32 / 7.0) * MIX_GAIN;
        right *= (self.right_volume as f32 / 7.0) * MIX_GAIN;

        let quantise = |sample: f32| (sample.max(-1.0).min(1.0) * i16::MAX as f32) as i16;
        self.output.push_stereo(quantise(left), quantise(right));
    }

    pub fn read_register(&self, address: u16) -> u8 {
        let address = address & 0xFF;
        match address {
            0x10..=0x14 => self.voice1.read_register(address),
            0x15 => INVALID_READ,
            0x16..=0x19 => self.voice2.read_register(address - 0x05),
            0x1A..=0x1E => self.voice3.read_register(address),
            0x1F => INVALID_READ,
            0x20..=0x23 => self.voice4.read_register(address),
            0x24 => {
                let mut output = (self.left_volume << 4) | self.right_volume;
                if self.vin_l_enable {
                    output |= 0x80;
                }
                if self.vin_r_enable {
                    output |= 0x08;
                }
                output
            }
            0x25 => self.channel_routing,
            0x26 => {
                let mut output = 0x70;
                if self.global_sound_enable {
                    output |= 0x80;
                }
                if self.voice1.enabled() {
                    output |= 0x01;
                }
                if self.voice2.enabled() {
                    output |= 0x02;
                }
                if self.voice3.enabled() {
                    output |= 0x04;
                }
                if self.voice4.enabled() {
                    output |= 0x08;
                }
                output
            }
            0x27..=0x2F => INVALID_READ,
            0x30..=0x3F => self.voice3.read_register(address),
            _ => INVALID_READ,
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8) {
        #[cfg(feature = "apu-logging")]
        log::trace!("APU write on address 0x{:04X} with value 0x{:02X}", address, value);
        let address = address & 0xFF;

        // With the APU powered down only NR52 and wave RAM stay writable.
        if !self.global_sound_enable && address != 0x26 && !(0x30..=0x3F).contains(&address) {
            return;
        }

        match address {
            0x10..=0x14 => self.voice1.write_register(address, value),
            0x15 => {}
            0x16..=0x19 => self.voice2.write_register(address - 0x05, value),
            0x1A..=0x1E => self.voice3.write_register(address, value),
            0x1F => {}
            0x20..=0x23 => self.voice4.write_register(address, value),
            0x24 => {
                self.vin_l_enable = value & 0x80 != 0;
                self.vin_r_enable = value & 0x08 != 0;
                self.left_volume = (value & 0x70) >> 4;
                self.right_volume = value & 0x07;
            }
            0x25 => self.channel_routing = value,
            0x26 => {
                let enable = value & 0x80 != 0;
                let was_enabled = self.global_sound_enable;
                self.global_sound_enable = enable;

                if was_enabled && !enable {
                    self.power_off();
                } else if !was_enabled && enable {
                    self.sequencer_counter = FRAME_SEQUENCE_CYCLES;
                    self.frame_sequencer_step = 0;
                }
            }
            0x27..=0x2F => {}
            0x30..=0x3F => self.voice3.write_register(address, value),
            _ => {}
        }
    }

    pub fn save_state(&self) -> ApuState {
        ApuState {
            voice1: self.voice1.save_state(),
            voice2: self.voice2.save_state(),
            voice3: self.voice3.save_state(),
            voice4: self.voice4.save_state(),
            nr50: self.read_register(0xFF24),
            nr51: self.channel_routing,
            power: self.global_sound_enable,
            frame_sequencer_step: self.frame_sequencer_step,
            sequencer_counter: self.sequencer_counter,
            sample_counter: self.sample_counter,
        }
    }

    pub fn load_state(&mut self, state: &ApuState) {
        self.voice1.load_state(&state.voice1);
        self.voice2.load_state(&state.voice2);
        self.voice3.load_state(&state.voice3);
        self.voice4.load_state(&state.voice4);
        self.vin_l_enable = state.nr50 & 0x80 != 0;
        self.vin_r_enable = state.nr50 & 0x08 != 0;
        self.left_volume = (state.nr50 & 0x70) >> 4;
        self.right_volume = state.nr50 & 0x07;
        self.channel_routing = state.nr51;
        self.global_sound_enable = state.power;
        self.frame_sequencer_step = state.frame_sequencer_step & 0x07;
        self.sequencer_counter = state.sequencer_counter.max(1).min(FRAME_SEQUENCE_CYCLES);
        self.sample_counter = state.sample_counter;
    }

    /// NR52 power-down zeroes every register and voice, but wave RAM survives.
    fn power_off(&mut self) {
        self.voice1.power_off();
        self.voice2.power_off();
        self.voice3.power_off();
        self.voice4.power_off();
        self.vin_l_enable = false;
        self.vin_r_enable = false;
        self.left_volume = 0;
        self.right_volume = 0;
        self.channel_routing = 0;
        self.frame_sequencer_step = 0;
    }
}
