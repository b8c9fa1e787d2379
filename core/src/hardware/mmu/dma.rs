/// Bytes moved by one OAM DMA transfer.
pub const OAM_DMA_LENGTH: u16 = 0xA0;

/// State of the OAM DMA engine. One byte moves per T-cycle; while a transfer
/// runs the CPU sees OAM as locked.
#[derive(Debug, Default, Clone)]
pub struct OamDma {
    pub active: bool,
    pub source: u16,
    pub index: u16,
}

impl OamDma {
    /// A write to the DMA register immediately restarts the engine from the
    /// written page.
    pub fn start(&mut self, page: u8) {
        self.active = true;
        self.source = (page as u16) << 8;
        self.index = 0;
    }

    /// The register reads back the page of the most recent transfer.
    pub fn register_value(&self) -> u8 {
        (self.source >> 8) as u8
    }
}
