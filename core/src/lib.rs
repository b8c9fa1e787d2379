pub mod emulator;

pub mod crc;
pub mod hardware;
pub mod io;
pub mod state;

pub use crate::emulator::{Emulator, GameBoyModel};
pub use crate::hardware::ppu::palette::RGB;
pub use crate::hardware::ppu::{FRAMEBUFFER_SIZE, RESOLUTION_HEIGHT, RESOLUTION_WIDTH};
pub use crate::io::joypad::Buttons;

/// The failures the core can report; everything else degrades to logging
/// plus open-bus behaviour per hardware convention.
#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("failed to parse cartridge header: {0}")]
    HeaderParse(String),
    #[error("no cartridge loaded")]
    NoCartridge,
    #[error("failed to decode save state: {0}")]
    StateDecode(String),
    #[error("save state version mismatch: found {found}, expected {expected}")]
    StateVersionMismatch { found: u8, expected: u8 },
}

/// Struct for wrapping all the various options for the `Emulator`.
#[derive(Debug, Copy, Clone, Default)]
pub struct EmulatorOptions {
    /// Log every executed instruction through `log::trace!`.
    pub trace: bool,
    /// A hint to the host to pace frames to ~59.73 Hz; the core itself
    /// never sleeps.
    pub limit_fps: bool,
    /// Drive background/window pixels through the fetcher+FIFO pipeline
    /// instead of the plain tilemap walk.
    pub use_fetcher_bg: bool,
    /// Honour the CGB background attribute map (palettes, banks, flips,
    /// priority) when running in CGB mode.
    pub use_cgb_bg: bool,
}

#[derive(Debug, Default)]
pub struct EmulatorOptionsBuilder {
    trace: bool,
    limit_fps: bool,
    use_fetcher_bg: bool,
    use_cgb_bg: bool,
}

impl EmulatorOptionsBuilder {
    pub fn new() -> Self {
        EmulatorOptionsBuilder {
            trace: false,
            limit_fps: false,
            use_fetcher_bg: false,
            use_cgb_bg: true,
        }
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn limit_fps(mut self, limit_fps: bool) -> Self {
        self.limit_fps = limit_fps;
        self
    }

    pub fn use_fetcher_bg(mut self, use_fetcher_bg: bool) -> Self {
        self.use_fetcher_bg = use_fetcher_bg;
        self
    }

    pub fn use_cgb_bg(mut self, use_cgb_bg: bool) -> Self {
        self.use_cgb_bg = use_cgb_bg;
        self
    }

    pub fn build(self) -> EmulatorOptions {
        EmulatorOptions {
            trace: self.trace,
            limit_fps: self.limit_fps,
            use_fetcher_bg: self.use_fetcher_bg,
            use_cgb_bg: self.use_cgb_bg,
        }
    }
}

impl From<EmulatorOptions> for EmulatorOptionsBuilder {
    fn from(options: EmulatorOptions) -> Self {
        EmulatorOptionsBuilder {
            trace: options.trace,
            limit_fps: options.limit_fps,
            use_fetcher_bg: options.use_fetcher_bg,
            use_cgb_bg: options.use_cgb_bg,
        }
    }
}
