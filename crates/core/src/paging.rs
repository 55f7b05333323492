//! Bank/paging unit.
//!
//! The CPU address space is four 16 KB quadrants. With paging enabled each
//! quadrant is backed by one of four page registers:
//!
//! | page bits | meaning                          |
//! |-----------|----------------------------------|
//! | 7–5 = 001 | RAM                              |
//! | 7–5 = 010 | video subsystem                  |
//! | other     | ROM                              |
//! | 4–0       | 16 KB physical bank              |
//!
//! With paging disabled every address lands in ROM bank 0.

/// Region class selected by a page register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Rom,
    Ram,
    Video,
}

/// Result of translating a CPU address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub region: Region,
    /// Offset into the physical array of `region`.
    pub offset: u32,
}

pub const PAGE_RAM: u8 = 0x20;
pub const PAGE_VIDEO: u8 = 0x40;
const PAGE_CLASS_MASK: u8 = 0xE0;
const PAGE_BANK_MASK: u8 = 0x1F;

/// Classify an explicit page value and combine it with the low 14 address bits.
#[inline]
pub fn page_mapping(page: u8, address: u32) -> Mapping {
    let region = match page & PAGE_CLASS_MASK {
        PAGE_RAM => Region::Ram,
        PAGE_VIDEO => Region::Video,
        _ => Region::Rom,
    };
    let offset = (address & 0x3FFF) | ((page & PAGE_BANK_MASK) as u32) << 14;
    Mapping { region, offset }
}

/// Translate a 16-bit CPU address through the page registers.
#[inline]
pub fn translate(address: u16, enabled: bool, pages: &[u8; 4]) -> Mapping {
    if !enabled {
        return Mapping { region: Region::Rom, offset: (address & 0x3FFF) as u32 };
    }
    page_mapping(pages[(address >> 14) as usize & 3], address as u32)
}

/// Page registers plus the global enable, written through I/O port 0x7x.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paging {
    pub pages: [u8; 4],
    pub enabled: bool,
}

impl Paging {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn translate(&self, address: u16) -> Mapping {
        translate(address, self.enabled, &self.pages)
    }

    /// Paging-control port write: bit 2 of the port clear selects page
    /// register `port & 3`, set writes the enable flag from D0.
    pub fn io_write(&mut self, port: u16, data: u8) {
        if port & 0x04 == 0 {
            self.pages[(port & 3) as usize] = data;
        } else {
            self.enabled = data & 1 != 0;
        }
    }
}
