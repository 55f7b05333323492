//! Physical memory: 512 KB flash ROM and 512 KB RAM.
//!
//! Both arrays are indexed by the physical offsets produced by
//! [`crate::paging`]. CPU writes to ROM go through [`crate::flash`];
//! everything here is the raw storage.

use crate::error::{BeastError, Result};
use crate::{RAM_SIZE, ROM_SIZE};

pub struct Memory {
    /// Flash contents. Erased flash reads 0xFF.
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            rom: vec![0xFF; ROM_SIZE],
            ram: vec![0; RAM_SIZE],
        }
    }

    /// Copy a flat ROM image to the start of flash. Shorter images leave
    /// the rest of the part erased.
    pub fn load_rom(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > ROM_SIZE {
            return Err(BeastError::RomImageSize { expected: ROM_SIZE, actual: image.len() });
        }
        self.rom.fill(0xFF);
        self.rom[..image.len()].copy_from_slice(image);
        log::info!("ROM image loaded: {} bytes", image.len());
        Ok(())
    }

    #[inline]
    pub fn ram_read(&self, offset: u32) -> u8 {
        self.ram[offset as usize % RAM_SIZE]
    }

    #[inline]
    pub fn ram_write(&mut self, offset: u32, data: u8) {
        self.ram[offset as usize % RAM_SIZE] = data;
    }

    #[inline]
    pub fn rom_read(&self, offset: u32) -> u8 {
        self.rom[offset as usize % ROM_SIZE]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
