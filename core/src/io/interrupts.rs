use bitflags::*;

/// The flag used to signal that an interrupt is pending.
pub const INTERRUPTS_FLAG: u16 = 0xFF0F;
/// Interrupts Enable Register (IE)
pub const INTERRUPTS_ENABLE: u16 = 0xFFFF;

#[derive(Debug, Copy, Clone, PartialOrd, PartialEq)]
pub enum InterruptKind {
    VBLANK = 0b0000_0001,
    LcdStat = 0b0000_0010,
    TIMER = 0b0000_0100,
    SERIAL = 0b0000_1000,
    JOYPAD = 0b0001_0000,
}

impl InterruptKind {
    /// The address the CPU jumps to when servicing this interrupt.
    pub fn vector(self) -> u16 {
        use InterruptKind::*;
        match self {
            VBLANK => 0x0040,
            LcdStat => 0x0048,
            TIMER => 0x0050,
            SERIAL => 0x0058,
            JOYPAD => 0x0060,
        }
    }

    /// Iterate all interrupts in their hardware priority order.
    pub fn iter() -> impl Iterator<Item = InterruptKind> {
        use InterruptKind::{LcdStat, JOYPAD, SERIAL, TIMER, VBLANK};
        [VBLANK, LcdStat, TIMER, SERIAL, JOYPAD].iter().copied()
    }
}

bitflags! {
    #[derive(Default)]
    pub struct InterruptFlags: u8 {
        /// V-Blank
        const VBLANK = 0b0000_0001;
        /// LCD Stat
        const LCD    = 0b0000_0010;
        /// Timer
        const TIMER  = 0b0000_0100;
        /// Serial
        const SERIAL = 0b0000_1000;
        /// Joypad
        const JOYPAD = 0b0001_0000;
        /// The upper bits have no function, but remain readable/writable.
        const UNUSED = 0b1110_0000;
    }
}

/// The `IE` (0xFFFF) and `IF` (0xFF0F) registers.
///
/// Components that can raise an interrupt receive a `&mut Interrupts` while
/// they tick; the CPU consumes the pending set at the start of an instruction.
#[derive(Default, Debug, Clone)]
pub struct Interrupts {
    pub interrupt_enable: InterruptFlags,
    pub interrupt_flag: InterruptFlags,
}

impl Interrupts {
    pub fn insert_interrupt(&mut self, interrupt: InterruptFlags) {
        self.interrupt_flag.insert(interrupt);
    }

    /// The set of interrupts which are both requested and enabled.
    pub fn pending(&self) -> u8 {
        self.interrupt_enable.bits() & self.interrupt_flag.bits() & 0x1F
    }

    pub fn read_ie(&self) -> u8 {
        self.interrupt_enable.bits()
    }

    /// The unimplemented upper bits of `IF` always read as 1.
    pub fn read_if(&self) -> u8 {
        self.interrupt_flag.bits() | 0xE0
    }

    pub fn overwrite_ie(&mut self, value: u8) {
        self.interrupt_enable = InterruptFlags::from_bits_truncate(value);
    }

    pub fn overwrite_if(&mut self, value: u8) {
        self.interrupt_flag = InterruptFlags::from_bits_truncate(value);
    }
}
