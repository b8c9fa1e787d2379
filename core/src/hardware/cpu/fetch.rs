//! Memory plumbing for the CPU: opcode/immediate fetches, the stack helpers,
//! and the operand resolution impls the instruction methods are generic over.

use crate::hardware::cpu::execute::{InstructionAddress, WrapperEnum};
use crate::hardware::cpu::traits::{SetU16, SetU8, ToU16, ToU8};
use crate::hardware::cpu::CPU;
use crate::hardware::mmu::MemoryMapper;
use crate::hardware::cpu::registers::{Reg16, Reg8};

impl<M: MemoryMapper> CPU<M> {
    /// Charge one machine cycle (4 T-cycles) to the current instruction.
    pub(super) fn add_cycles(&mut self) {
        self.step_cycles += 4;
    }

    /// Retrieve the next opcode and advance the PC, unless the halt bug is
    /// pending, in which case the PC stays put for exactly this one fetch.
    pub(super) fn fetch_opcode(&mut self) -> u8 {
        let opcode = self.read_byte_cycle(self.registers.pc);

        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.registers.pc = self.registers.pc.wrapping_add(1);
        }

        opcode
    }

    /// Read the next byte at `PC` as an immediate and advance the PC.
    pub(super) fn get_instr_u8(&mut self) -> u8 {
        let result = self.read_byte_cycle(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);

        result
    }

    /// Read the next two bytes at `PC` as a little-endian immediate.
    pub(super) fn get_instr_u16(&mut self) -> u16 {
        let least_s_byte = self.get_instr_u8() as u16;
        let most_s_byte = self.get_instr_u8() as u16;

        (most_s_byte << 8) | least_s_byte
    }

    /// Read a byte from the bus, charging one machine cycle.
    pub(super) fn read_byte_cycle(&mut self, address: u16) -> u8 {
        self.add_cycles();
        self.mmu.read_byte(address)
    }

    /// Write a byte to the bus, charging one machine cycle.
    pub(super) fn write_byte_cycle(&mut self, address: u16, value: u8) {
        self.add_cycles();
        self.mmu.write_byte(address, value);
    }

    /// Read a little-endian word from the bus, charging two machine cycles.
    pub(super) fn read_short_cycle(&mut self, address: u16) -> u16 {
        let least_s_byte = self.read_byte_cycle(address) as u16;
        let most_s_byte = self.read_byte_cycle(address.wrapping_add(1)) as u16;

        (most_s_byte << 8) | least_s_byte
    }

    /// Write a little-endian word to the bus, charging two machine cycles.
    pub(super) fn write_short_cycle(&mut self, address: u16, value: u16) {
        self.write_byte_cycle(address, (value & 0xFF) as u8);
        self.write_byte_cycle(address.wrapping_add(1), (value >> 8) as u8);
    }
}

impl<M: MemoryMapper> ToU8<Reg8> for CPU<M> {
    fn read_u8_value(&mut self, target: Reg8) -> u8 {
        use Reg8::*;
        match target {
            A => self.registers.a,
            B => self.registers.b,
            C => self.registers.c,
            D => self.registers.d,
            E => self.registers.e,
            H => self.registers.h,
            L => self.registers.l,
        }
    }
}

impl<M: MemoryMapper> SetU8<Reg8> for CPU<M> {
    fn set_u8_value(&mut self, target: Reg8, value: u8) {
        use Reg8::*;
        match target {
            A => self.registers.a = value,
            B => self.registers.b = value,
            C => self.registers.c = value,
            D => self.registers.d = value,
            E => self.registers.e = value,
            H => self.registers.h = value,
            L => self.registers.l = value,
        }
    }
}

impl<M: MemoryMapper> ToU8<InstructionAddress> for CPU<M> {
    fn read_u8_value(&mut self, target: InstructionAddress) -> u8 {
        use InstructionAddress::*;
        match target {
            BCI => self.read_byte_cycle(self.registers.bc()),
            DEI => self.read_byte_cycle(self.registers.de()),
            HLI => self.read_byte_cycle(self.registers.hl()),
            HLIP => {
                let address = self.registers.hl();
                self.registers.set_hl(address.wrapping_add(1));
                self.read_byte_cycle(address)
            }
            HLIN => {
                let address = self.registers.hl();
                self.registers.set_hl(address.wrapping_sub(1));
                self.read_byte_cycle(address)
            }
            DIRECT => self.get_instr_u8(),
            DirectMem => {
                let address = self.get_instr_u16();
                self.read_byte_cycle(address)
            }
            IoDirect => {
                let offset = self.get_instr_u8();
                self.read_byte_cycle(0xFF00 | offset as u16)
            }
            IoC => self.read_byte_cycle(0xFF00 | self.registers.c as u16),
        }
    }
}

impl<M: MemoryMapper> SetU8<InstructionAddress> for CPU<M> {
    fn set_u8_value(&mut self, target: InstructionAddress, value: u8) {
        use InstructionAddress::*;
        match target {
            BCI => self.write_byte_cycle(self.registers.bc(), value),
            DEI => self.write_byte_cycle(self.registers.de(), value),
            HLI => self.write_byte_cycle(self.registers.hl(), value),
            HLIP => {
                let address = self.registers.hl();
                self.registers.set_hl(address.wrapping_add(1));
                self.write_byte_cycle(address, value);
            }
            HLIN => {
                let address = self.registers.hl();
                self.registers.set_hl(address.wrapping_sub(1));
                self.write_byte_cycle(address, value);
            }
            DIRECT => unreachable!("An immediate can never be a store target"),
            DirectMem => {
                let address = self.get_instr_u16();
                self.write_byte_cycle(address, value);
            }
            IoDirect => {
                let offset = self.get_instr_u8();
                self.write_byte_cycle(0xFF00 | offset as u16, value);
            }
            IoC => self.write_byte_cycle(0xFF00 | self.registers.c as u16, value),
        }
    }
}

impl<M: MemoryMapper> ToU8<WrapperEnum> for CPU<M> {
    fn read_u8_value(&mut self, target: WrapperEnum) -> u8 {
        match target {
            WrapperEnum::Reg8(register) => self.read_u8_value(register),
            WrapperEnum::InstructionAddress(address) => self.read_u8_value(address),
        }
    }
}

impl<M: MemoryMapper> SetU8<WrapperEnum> for CPU<M> {
    fn set_u8_value(&mut self, target: WrapperEnum, value: u8) {
        match target {
            WrapperEnum::Reg8(register) => self.set_u8_value(register, value),
            WrapperEnum::InstructionAddress(address) => self.set_u8_value(address, value),
        }
    }
}

impl<M: MemoryMapper> ToU16<Reg16> for CPU<M> {
    fn read_u16_value(&mut self, target: Reg16) -> u16 {
        use Reg16::*;
        match target {
            AF => self.registers.af(),
            BC => self.registers.bc(),
            DE => self.registers.de(),
            HL => self.registers.hl(),
            SP => self.registers.sp,
        }
    }
}

impl<M: MemoryMapper> SetU16<Reg16> for CPU<M> {
    fn set_u16_value(&mut self, target: Reg16, value: u16) {
        use Reg16::*;
        match target {
            AF => self.registers.set_af(value),
            BC => self.registers.set_bc(value),
            DE => self.registers.set_de(value),
            HL => self.registers.set_hl(value),
            SP => self.registers.sp = value,
        }
    }
}

impl<M: MemoryMapper> ToU16<InstructionAddress> for CPU<M> {
    fn read_u16_value(&mut self, target: InstructionAddress) -> u16 {
        match target {
            InstructionAddress::DIRECT => self.get_instr_u16(),
            _ => unreachable!("Unsupported 16-bit operand read: {:?}", target),
        }
    }
}

impl<M: MemoryMapper> SetU16<InstructionAddress> for CPU<M> {
    fn set_u16_value(&mut self, target: InstructionAddress, value: u16) {
        match target {
            InstructionAddress::DirectMem => {
                let address = self.get_instr_u16();
                self.write_short_cycle(address, value);
            }
            _ => unreachable!("Unsupported 16-bit operand write: {:?}", target),
        }
    }
}
