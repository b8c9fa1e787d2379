//! Joypad implementation. The register muxes two active-low button groups
//! onto the lower nibble, selected by bits 4/5 of the last write.

use crate::io::interrupts::{InterruptFlags, Interrupts};

pub const JOYPAD_REGISTER: u16 = 0xFF00;

/// The host-facing button state, true means pressed.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Buttons {
    pub a: bool,
    pub b: bool,
    pub start: bool,
    pub select: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl Buttons {
    /// Pack the buttons into the internal pressed bitmask,
    /// bit 0 = Right up to bit 7 = Start.
    fn to_mask(self) -> u8 {
        (self.right as u8)
            | (self.left as u8) << 1
            | (self.up as u8) << 2
            | (self.down as u8) << 3
            | (self.a as u8) << 4
            | (self.b as u8) << 5
            | (self.select as u8) << 6
            | (self.start as u8) << 7
    }
}

#[derive(Debug, Clone)]
pub struct JoyPad {
    /// Bits 5-4 of the last register write (active-low group select).
    selected_mode: u8,
    /// Pressed bitmask, bit 0 = Right .. bit 7 = Start.
    pressed: u8,
}

impl JoyPad {
    pub fn new() -> Self {
        JoyPad {
            selected_mode: 0x30,
            pressed: 0,
        }
    }

    /// Get the current JoyPad register for the most recently selected mode.
    pub fn get_register(&self) -> u8 {
        0xC0 | self.selected_mode | self.input_nibble()
    }

    /// Set the register, only the selection bits are writable.
    pub fn set_register(&mut self, value: u8, interrupts: &mut Interrupts) {
        let old_nibble = self.input_nibble();
        self.selected_mode = value & 0x30;
        self.check_for_edge(old_nibble, interrupts);
    }

    /// Publish a new button state from the host.
    pub fn set_buttons(&mut self, buttons: Buttons, interrupts: &mut Interrupts) {
        let old_nibble = self.input_nibble();
        self.pressed = buttons.to_mask();
        self.check_for_edge(old_nibble, interrupts);
    }

    pub fn selected_mode(&self) -> u8 {
        self.selected_mode
    }

    pub fn pressed_mask(&self) -> u8 {
        self.pressed
    }

    pub fn restore(&mut self, selected_mode: u8, pressed: u8) {
        self.selected_mode = selected_mode & 0x30;
        self.pressed = pressed;
    }

    /// The lower nibble of the register, with bits pulled low for pressed
    /// keys of whichever group(s) are selected.
    fn input_nibble(&self) -> u8 {
        let mut nibble = 0x0F;

        if self.selected_mode & 0x10 == 0 {
            nibble &= !(self.pressed & 0x0F);
        }
        if self.selected_mode & 0x20 == 0 {
            nibble &= !(self.pressed >> 4);
        }

        nibble & 0x0F
    }

    /// Any input line going from released (1) to pressed (0) requests the
    /// joypad interrupt, regardless of whether the cause was a key press or
    /// a group reselection.
    fn check_for_edge(&self, old_nibble: u8, interrupts: &mut Interrupts) {
        let new_nibble = self.input_nibble();
        if old_nibble & !new_nibble != 0 {
            interrupts.insert_interrupt(InterruptFlags::JOYPAD);
        }
    }
}

impl Default for JoyPad {
    fn default() -> Self {
        JoyPad::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_selected_reads_high() {
        let joypad = JoyPad::new();
        assert_eq!(joypad.get_register(), 0xFF);
    }

    #[test]
    fn test_direction_selection() {
        let mut interrupts = Interrupts::default();
        let mut joypad = JoyPad::new();

        joypad.set_buttons(
            Buttons {
                right: true,
                down: true,
                ..Default::default()
            },
            &mut interrupts,
        );
        // Nothing selected yet, so no lines are pulled low.
        assert!(!interrupts.interrupt_flag.contains(InterruptFlags::JOYPAD));

        joypad.set_register(0x20, &mut interrupts);
        assert_eq!(joypad.get_register(), 0xC0 | 0x20 | 0b0110);
        assert!(interrupts.interrupt_flag.contains(InterruptFlags::JOYPAD));
    }

    #[test]
    fn test_button_selection() {
        let mut interrupts = Interrupts::default();
        let mut joypad = JoyPad::new();

        joypad.set_register(0x10, &mut interrupts);
        joypad.set_buttons(
            Buttons {
                a: true,
                start: true,
                ..Default::default()
            },
            &mut interrupts,
        );

        assert_eq!(joypad.get_register(), 0xC0 | 0x10 | 0b0110);
        assert!(interrupts.interrupt_flag.contains(InterruptFlags::JOYPAD));
    }

    #[test]
    fn test_release_does_not_interrupt() {
        let mut interrupts = Interrupts::default();
        let mut joypad = JoyPad::new();

        joypad.set_register(0x10, &mut interrupts);
        joypad.set_buttons(
            Buttons {
                a: true,
                ..Default::default()
            },
            &mut interrupts,
        );
        interrupts.overwrite_if(0);

        joypad.set_buttons(Buttons::default(), &mut interrupts);
        assert!(!interrupts.interrupt_flag.contains(InterruptFlags::JOYPAD));
    }
}
