use crate::io::interrupts::{InterruptFlags, Interrupts};

pub const SIO_DATA: u16 = 0xFF01;
pub const SIO_CONT: u16 = 0xFF02;

/// A byte-oriented sink for completed serial transfers, usually hooked up by
/// test harnesses to capture Blargg-style output.
pub type SerialOutput = Box<dyn FnMut(u8) + Send>;

/// The serial port, reduced to link-less operation: a transfer started with
/// the internal clock completes immediately and the outgoing byte is handed
/// to the attached sink.
#[derive(Default)]
pub struct Serial {
    pub data: u8,
    control: u8,
    output: Option<SerialOutput>,
}

impl Serial {
    pub fn set_output(&mut self, output: SerialOutput) {
        self.output = Some(output);
    }

    /// The unimplemented bits of `SC` always read as 1.
    pub fn read_control(&self) -> u8 {
        self.control | 0x7E
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn restore(&mut self, data: u8, control: u8) {
        self.data = data;
        self.control = control;
    }

    pub fn write_control(&mut self, value: u8, interrupts: &mut Interrupts) {
        self.control = value;

        // Transfer start with the internal clock selected. With no partner
        // attached the transfer completes on the spot.
        if value & 0x80 != 0 {
            if let Some(output) = self.output.as_mut() {
                output(self.data);
            }
            self.control &= 0x7F;
            interrupts.insert_interrupt(InterruptFlags::SERIAL);
        }
    }
}

impl std::fmt::Debug for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serial")
            .field("data", &self.data)
            .field("control", &self.control)
            .field("output", &self.output.is_some())
            .finish()
    }
}
