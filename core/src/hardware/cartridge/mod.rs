use crate::hardware::cartridge::header::CartridgeHeader;
use crate::hardware::cartridge::mbc::{
    banked_read, external_ram_offset, Mbc, EXTERNAL_RAM_BANK_SIZE, ROM_BANK_SIZE,
};
use crate::hardware::cartridge::mbc::{Mbc1, Mbc5};
use crate::hardware::cartridge::mbc3::{wall_clock_seconds, Mbc3, RtcRegisters};
use crate::hardware::mmu::INVALID_READ;
use crate::state::{CartridgeState, RtcClockState};
use crate::EmulatorError;

pub mod header;
pub mod mbc;
pub mod mbc3;

/// Marker prefixed to the RTC footer inside battery blobs.
const RTC_FOOTER_MARKER: &[u8; 4] = b"GBM3";
const RTC_FOOTER_VERSION: u8 = 1;
const RTC_FOOTER_SIZE: usize = 18;

/// A cartridge image together with its mapper state and external RAM.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: CartridgeHeader,
    rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: Mbc,
}

impl Cartridge {
    pub fn new(rom: &[u8], saved_ram: Option<&[u8]>) -> Result<Self, EmulatorError> {
        let header = CartridgeHeader::parse(rom)?;
        let mbc = Mbc::from_cartridge_type(header.cartridge_type);

        log::info!(
            "Loaded \"{}\" (type 0x{:02X}, {} ROM banks, {} bytes external RAM)",
            header.title,
            header.cartridge_type,
            rom.len() / ROM_BANK_SIZE,
            header.ram_byte_size()
        );

        let mut result = Cartridge {
            ram: vec![0; header.ram_byte_size()],
            header,
            rom: rom.to_vec(),
            mbc,
        };

        if let Some(saved) = saved_ram {
            result.load_battery(saved);
        }

        Ok(result)
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn has_battery(&self) -> bool {
        self.header.has_battery()
    }

    /// Read from the fixed ROM window `0x0000..=0x3FFF`.
    pub fn read_0000_3fff(&self, address: u16) -> u8 {
        let bank = match &self.mbc {
            Mbc::Mbc1(mbc) => mbc.low_bank(),
            _ => 0,
        };

        banked_read(&self.rom, bank, address as usize & 0x3FFF, ROM_BANK_SIZE)
    }

    /// Read from the switchable ROM window `0x4000..=0x7FFF`.
    pub fn read_4000_7fff(&self, address: u16) -> u8 {
        let bank = match &self.mbc {
            Mbc::RomOnly => 1,
            Mbc::Mbc1(mbc) => mbc.high_bank(),
            Mbc::Mbc3(mbc) => mbc.rom_bank as usize,
            Mbc::Mbc5(mbc) => mbc.rom_bank as usize,
        };

        banked_read(&self.rom, bank, address as usize & 0x3FFF, ROM_BANK_SIZE)
    }

    /// A write anywhere in `0x0000..=0x7FFF` lands in the mapper registers.
    pub fn write_mbc_register(&mut self, address: u16, value: u8) {
        match &mut self.mbc {
            Mbc::RomOnly => {}
            Mbc::Mbc1(mbc) => mbc.write_register(address, value),
            Mbc::Mbc3(mbc) => mbc.write_register(address, value, wall_clock_seconds()),
            Mbc::Mbc5(mbc) => mbc.write_register(address, value),
        }
    }

    pub fn read_external_ram(&self, address: u16) -> u8 {
        let offset = external_ram_offset(address);

        match &self.mbc {
            Mbc::RomOnly => INVALID_READ,
            Mbc::Mbc1(mbc) => {
                if !mbc.ram_enabled || self.ram.is_empty() {
                    INVALID_READ
                } else {
                    banked_read(
                        &self.ram,
                        mbc.ram_bank(self.ram.len()),
                        offset,
                        EXTERNAL_RAM_BANK_SIZE,
                    )
                }
            }
            Mbc::Mbc3(mbc) => {
                if !mbc.ram_enabled {
                    INVALID_READ
                } else if mbc.rtc_selected() {
                    match &mbc.rtc {
                        Some(rtc) => rtc.read_register(mbc.ram_bank_or_rtc),
                        None => INVALID_READ,
                    }
                } else {
                    match mbc.ram_bank() {
                        Some(bank) if !self.ram.is_empty() => {
                            banked_read(&self.ram, bank, offset, EXTERNAL_RAM_BANK_SIZE)
                        }
                        _ => INVALID_READ,
                    }
                }
            }
            Mbc::Mbc5(mbc) => {
                if !mbc.ram_enabled || self.ram.is_empty() {
                    INVALID_READ
                } else {
                    banked_read(
                        &self.ram,
                        mbc.ram_bank as usize,
                        offset,
                        EXTERNAL_RAM_BANK_SIZE,
                    )
                }
            }
        }
    }

    pub fn write_external_ram(&mut self, address: u16, value: u8) {
        let offset = external_ram_offset(address);

        match &mut self.mbc {
            Mbc::RomOnly => {}
            Mbc::Mbc1(mbc) => {
                if mbc.ram_enabled && !self.ram.is_empty() {
                    let bank = mbc.ram_bank(self.ram.len());
                    write_banked(&mut self.ram, bank, offset, value);
                }
            }
            Mbc::Mbc3(mbc) => {
                if !mbc.ram_enabled {
                    return;
                }
                if mbc.rtc_selected() {
                    let selector = mbc.ram_bank_or_rtc;
                    if let Some(rtc) = mbc.rtc.as_mut() {
                        rtc.write_register(selector, value, wall_clock_seconds());
                    }
                } else if let Some(bank) = mbc.ram_bank() {
                    if !self.ram.is_empty() {
                        write_banked(&mut self.ram, bank, offset, value);
                    }
                }
            }
            Mbc::Mbc5(mbc) => {
                if mbc.ram_enabled && !self.ram.is_empty() {
                    let bank = mbc.ram_bank as usize;
                    write_banked(&mut self.ram, bank, offset, value);
                }
            }
        }
    }

    /// The battery blob for this cartridge: the raw external RAM, with the
    /// RTC footer appended for clock-bearing MBC3 carts. `None` when the
    /// cartridge has no battery at all.
    pub fn save_battery(&mut self) -> Option<Vec<u8>> {
        if !self.has_battery() {
            return None;
        }

        let mut blob = self.ram.clone();

        if let Mbc::Mbc3(mbc) = &mut self.mbc {
            if let Some(rtc) = mbc.rtc.as_mut() {
                rtc.advance(wall_clock_seconds());
                blob.extend_from_slice(RTC_FOOTER_MARKER);
                blob.push(RTC_FOOTER_VERSION);
                blob.push(rtc.registers.seconds);
                blob.push(rtc.registers.minutes);
                blob.push(rtc.registers.hours);
                blob.push(rtc.registers.days as u8);
                blob.push(rtc.registers.control_byte());
                blob.extend_from_slice(&rtc.last_wall_sec.to_le_bytes());
            }
        }

        Some(blob)
    }

    /// Restore a battery blob. Shorter blobs fill only a prefix of RAM;
    /// bytes beyond the RAM image are interpreted as the RTC footer when
    /// the marker matches, and ignored otherwise.
    pub fn load_battery(&mut self, blob: &[u8]) -> bool {
        if blob.is_empty() {
            return false;
        }

        let prefix = blob.len().min(self.ram.len());
        self.ram[..prefix].copy_from_slice(&blob[..prefix]);

        let footer = &blob[prefix.min(blob.len())..];
        if footer.len() >= RTC_FOOTER_SIZE
            && &footer[0..4] == RTC_FOOTER_MARKER
            && footer[4] == RTC_FOOTER_VERSION
        {
            if let Mbc::Mbc3(mbc) = &mut self.mbc {
                if let Some(rtc) = mbc.rtc.as_mut() {
                    rtc.registers.seconds = footer[5] % 60;
                    rtc.registers.minutes = footer[6] % 60;
                    rtc.registers.hours = footer[7] % 24;
                    rtc.registers.days = footer[8] as u16;
                    let flags = footer[9];
                    rtc.registers.days |= (flags as u16 & 0x01) << 8;
                    rtc.registers.halt = flags & 0x40 != 0;
                    rtc.registers.carry = flags & 0x80 != 0;

                    let mut secs = [0u8; 8];
                    secs.copy_from_slice(&footer[10..18]);
                    rtc.last_wall_sec = i64::from_le_bytes(secs);
                    // Everything that elapsed while we were powered off.
                    rtc.advance(wall_clock_seconds());
                }
            }
        }

        prefix > 0
    }

    pub fn save_state(&self) -> CartridgeState {
        let mut state = CartridgeState {
            ram: self.ram.clone(),
            ..Default::default()
        };

        match &self.mbc {
            Mbc::RomOnly => state.kind = 0,
            Mbc::Mbc1(mbc) => {
                state.kind = 1;
                state.ram_enabled = mbc.ram_enabled;
                state.rom_bank = mbc.rom_bank_low5 as u16;
                state.ram_bank = mbc.ram_bank_or_rom_high2;
                state.mode_select = mbc.mode_select;
            }
            Mbc::Mbc3(mbc) => {
                state.kind = 3;
                state.ram_enabled = mbc.ram_enabled;
                state.rom_bank = mbc.rom_bank as u16;
                state.ram_bank = mbc.ram_bank_or_rtc;
                state.last_latch_write = mbc.last_latch_write;
                if let Some(rtc) = &mbc.rtc {
                    state.has_rtc = true;
                    state.rtc = pack_rtc(rtc);
                }
            }
            Mbc::Mbc5(mbc) => {
                state.kind = 5;
                state.ram_enabled = mbc.ram_enabled;
                state.rom_bank = mbc.rom_bank;
                state.ram_bank = mbc.ram_bank;
            }
        }

        state
    }

    pub fn load_state(&mut self, state: &CartridgeState) {
        let prefix = state.ram.len().min(self.ram.len());
        self.ram[..prefix].copy_from_slice(&state.ram[..prefix]);

        self.mbc = match state.kind {
            1 => Mbc::Mbc1(Mbc1 {
                ram_enabled: state.ram_enabled,
                rom_bank_low5: (state.rom_bank as u8 & 0x1F).max(1),
                ram_bank_or_rom_high2: state.ram_bank & 0x03,
                mode_select: state.mode_select,
            }),
            3 => {
                let mut mbc = Mbc3::new(state.has_rtc);
                mbc.ram_enabled = state.ram_enabled;
                mbc.rom_bank = (state.rom_bank as u8 & 0x7F).max(1);
                mbc.ram_bank_or_rtc = state.ram_bank;
                mbc.last_latch_write = state.last_latch_write;
                if state.has_rtc {
                    mbc.rtc = Some(unpack_rtc(&state.rtc));
                }
                Mbc::Mbc3(mbc)
            }
            5 => Mbc::Mbc5(Mbc5 {
                ram_enabled: state.ram_enabled,
                rom_bank: state.rom_bank & 0x01FF,
                ram_bank: state.ram_bank & 0x0F,
            }),
            _ => Mbc::RomOnly,
        };
    }
}

fn pack_rtc(rtc: &mbc3::Rtc) -> RtcClockState {
    let latched = rtc.latched.unwrap_or_default();
    RtcClockState {
        seconds: rtc.registers.seconds,
        minutes: rtc.registers.minutes,
        hours: rtc.registers.hours,
        days: rtc.registers.days,
        halt: rtc.registers.halt,
        carry: rtc.registers.carry,
        latched: rtc.latched.is_some(),
        latched_seconds: latched.seconds,
        latched_minutes: latched.minutes,
        latched_hours: latched.hours,
        latched_days: latched.days,
        latched_halt: latched.halt,
        latched_carry: latched.carry,
        last_wall_sec: rtc.last_wall_sec,
    }
}

fn unpack_rtc(state: &RtcClockState) -> mbc3::Rtc {
    mbc3::Rtc {
        registers: RtcRegisters {
            seconds: state.seconds,
            minutes: state.minutes,
            hours: state.hours,
            days: state.days & 0x01FF,
            halt: state.halt,
            carry: state.carry,
        },
        latched: if state.latched {
            Some(RtcRegisters {
                seconds: state.latched_seconds,
                minutes: state.latched_minutes,
                hours: state.latched_hours,
                days: state.latched_days & 0x01FF,
                halt: state.latched_halt,
                carry: state.latched_carry,
            })
        } else {
            None
        },
        last_wall_sec: state.last_wall_sec,
    }
}

fn write_banked(data: &mut [u8], bank: usize, offset: usize, value: u8) {
    let bank_count = num_integer::Integer::div_ceil(&data.len(), &EXTERNAL_RAM_BANK_SIZE);
    let address = (bank % bank_count) * EXTERNAL_RAM_BANK_SIZE + offset;
    if let Some(slot) = data.get_mut(address) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn test_rom(cartridge_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000 << rom_size as usize];
        rom[0x147] = cartridge_type;
        rom[0x148] = rom_size;
        rom[0x149] = ram_size;
        for bank in 0..(rom.len() / ROM_BANK_SIZE) {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom
    }

    #[test]
    fn test_rom_only_reads() {
        let cartridge = Cartridge::new(&test_rom(0x00, 0, 0), None).unwrap();

        assert_eq!(cartridge.read_0000_3fff(0x0000), 0);
        assert_eq!(cartridge.read_4000_7fff(0x4000), 1);
        assert_eq!(cartridge.read_external_ram(0xA000), INVALID_READ);
    }

    #[test]
    fn test_mbc1_bank_switching() {
        let mut cartridge = Cartridge::new(&test_rom(0x01, 0x04, 0), None).unwrap();

        cartridge.write_mbc_register(0x2000, 5);
        assert_eq!(cartridge.read_4000_7fff(0x4000), 5);

        cartridge.write_mbc_register(0x2000, 0);
        assert_eq!(cartridge.read_4000_7fff(0x4000), 1);
    }

    #[test]
    fn test_mbc1_ram_enable_gate() {
        let mut cartridge = Cartridge::new(&test_rom(0x03, 0, 0x03), None).unwrap();

        cartridge.write_external_ram(0xA000, 0x42);
        assert_eq!(cartridge.read_external_ram(0xA000), INVALID_READ);

        cartridge.write_mbc_register(0x0000, 0x0A);
        cartridge.write_external_ram(0xA000, 0x42);
        assert_eq!(cartridge.read_external_ram(0xA000), 0x42);

        cartridge.write_mbc_register(0x0000, 0x00);
        assert_eq!(cartridge.read_external_ram(0xA000), INVALID_READ);
    }

    #[test]
    fn test_mbc5_bank_zero_in_switchable_window() {
        let mut cartridge = Cartridge::new(&test_rom(0x19, 0x04, 0), None).unwrap();

        cartridge.write_mbc_register(0x2000, 0);
        assert_eq!(cartridge.read_4000_7fff(0x4000), 0);

        cartridge.write_mbc_register(0x2000, 7);
        assert_eq!(cartridge.read_4000_7fff(0x4000), 7);
    }

    #[test]
    fn test_unsupported_mapper_falls_back_to_rom_only() {
        let cartridge = Cartridge::new(&test_rom(0xFC, 0, 0), None).unwrap();
        assert!(matches!(cartridge.mbc, Mbc::RomOnly));
    }

    #[test]
    fn test_battery_roundtrip() {
        let mut cartridge = Cartridge::new(&test_rom(0x03, 0, 0x02), None).unwrap();
        cartridge.write_mbc_register(0x0000, 0x0A);
        cartridge.write_external_ram(0xA000, 0x13);
        cartridge.write_external_ram(0xA123, 0x37);

        let blob = cartridge.save_battery().unwrap();
        assert_eq!(blob.len(), 0x2000);

        let mut restored = Cartridge::new(&test_rom(0x03, 0, 0x02), Some(&blob)).unwrap();
        restored.write_mbc_register(0x0000, 0x0A);
        assert_eq!(restored.read_external_ram(0xA000), 0x13);
        assert_eq!(restored.read_external_ram(0xA123), 0x37);
    }

    #[test]
    fn test_battery_none_without_battery_type() {
        let mut cartridge = Cartridge::new(&test_rom(0x01, 0, 0x02), None).unwrap();
        assert!(cartridge.save_battery().is_none());
    }

    #[test]
    fn test_rtc_footer_roundtrip() {
        let mut cartridge = Cartridge::new(&test_rom(0x10, 0, 0x02), None).unwrap();

        if let Mbc::Mbc3(mbc) = &mut cartridge.mbc {
            let rtc = mbc.rtc.as_mut().unwrap();
            rtc.registers.seconds = 12;
            rtc.registers.minutes = 34;
            rtc.registers.hours = 5;
            rtc.registers.days = 0x135;
            rtc.registers.carry = true;
            // Halt the clock so the roundtrip below is time-independent.
            rtc.registers.halt = true;
        }

        let blob = cartridge.save_battery().unwrap();
        assert_eq!(blob.len(), 0x2000 + RTC_FOOTER_SIZE);
        assert_eq!(&blob[0x2000..0x2004], RTC_FOOTER_MARKER);

        let mut restored = Cartridge::new(&test_rom(0x10, 0, 0x02), None).unwrap();
        restored.load_battery(&blob);

        if let Mbc::Mbc3(mbc) = &restored.mbc {
            let regs = mbc.rtc.as_ref().unwrap().registers;
            assert_eq!(regs.seconds, 12);
            assert_eq!(regs.minutes, 34);
            assert_eq!(regs.hours, 5);
            assert_eq!(regs.days & 0x1FF, 0x135);
            assert!(regs.carry);
            assert!(regs.halt);
        } else {
            panic!("expected an MBC3 mapper");
        }
    }

    #[test]
    fn test_short_battery_blob_fills_prefix() {
        let mut cartridge = Cartridge::new(&test_rom(0x03, 0, 0x02), None).unwrap();
        assert!(cartridge.load_battery(&[0xAA; 0x100]));

        cartridge.write_mbc_register(0x0000, 0x0A);
        assert_eq!(cartridge.read_external_ram(0xA000), 0xAA);
        assert_eq!(cartridge.read_external_ram(0xA100), 0x00);
    }
}
