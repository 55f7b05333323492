//! VideoBeast collaborator.
//!
//! The CPU reaches the video board through pages `0x40..0x5F`; the tick
//! engine only uses [`VideoDevice::read`], [`VideoDevice::write`] and
//! [`VideoDevice::tick`]. The raw region accessors back the debugger's
//! video memory views.

/// Video RAM size in bytes (20-bit address).
pub const VIDEO_RAM_LEN: u32 = 1 << 20;
pub const VIDEO_REGISTERS_LEN: u32 = 0x100;
/// Entries per palette; each entry is two bytes.
pub const PALETTE_LEN: u32 = 0x100;
pub const SPRITE_COUNT: u32 = 0x100;
pub const SPRITE_BYTES: u32 = 8;

pub trait VideoDevice {
    /// CPU read through the paged window.
    fn read(&mut self, offset: u32, time_ps: u64) -> u8;
    /// CPU write through the paged window.
    fn write(&mut self, offset: u32, data: u8, time_ps: u64);
    /// Advance rendering; returns the time the device next wants a tick.
    fn tick(&mut self, time_ps: u64) -> u64;

    fn read_ram(&self, addr: u32) -> u8;
    fn write_ram(&mut self, addr: u32, data: u8);
    fn read_register(&self, addr: u32) -> u8;
    fn write_register(&mut self, addr: u32, data: u8);
    /// `palette` is 0 or 1.
    fn read_palette(&self, palette: usize, addr: u32) -> u8;
    fn write_palette(&mut self, palette: usize, addr: u32, data: u8);
    fn read_sprite(&self, addr: u32) -> u8;
    fn write_sprite(&mut self, addr: u32, data: u8);

    /// Side-effect free read of the paged window, for debugger views.
    fn peek(&self, offset: u32) -> u8 {
        self.read_ram(offset)
    }
}

/// Raw video region shown by a debugger memory view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoView {
    Ram,
    Registers,
    Palette1,
    Palette2,
    Sprites,
}

impl VideoView {
    pub const ALL: [VideoView; 5] = [
        VideoView::Ram,
        VideoView::Registers,
        VideoView::Palette1,
        VideoView::Palette2,
        VideoView::Sprites,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Address mask of the region.
    pub fn mask(self) -> u32 {
        match self {
            VideoView::Ram => VIDEO_RAM_LEN - 1,
            VideoView::Registers => VIDEO_REGISTERS_LEN - 1,
            VideoView::Palette1 | VideoView::Palette2 => PALETTE_LEN * 2 - 1,
            VideoView::Sprites => SPRITE_COUNT * SPRITE_BYTES - 1,
        }
    }

    /// Hex digits shown for an address in this region.
    pub fn digits(self) -> u8 {
        match self {
            VideoView::Ram => 5,
            VideoView::Registers => 2,
            _ => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VideoView::Ram => "RAM",
            VideoView::Registers => "Registers",
            VideoView::Palette1 => "Palette 1",
            VideoView::Palette2 => "Palette 2",
            VideoView::Sprites => "Sprites",
        }
    }

    /// Next region, wrapping.
    pub fn cycle(self, delta: i32) -> VideoView {
        let n = Self::ALL.len() as i32;
        Self::ALL[(self.index() as i32 + delta).rem_euclid(n) as usize]
    }

    pub fn read(self, video: &dyn VideoDevice, addr: u32) -> u8 {
        let addr = addr & self.mask();
        match self {
            VideoView::Ram => video.read_ram(addr),
            VideoView::Registers => video.read_register(addr),
            VideoView::Palette1 => video.read_palette(0, addr),
            VideoView::Palette2 => video.read_palette(1, addr),
            VideoView::Sprites => video.read_sprite(addr),
        }
    }

    pub fn write(self, video: &mut dyn VideoDevice, addr: u32, data: u8) {
        let addr = addr & self.mask();
        match self {
            VideoView::Ram => video.write_ram(addr, data),
            VideoView::Registers => video.write_register(addr, data),
            VideoView::Palette1 => video.write_palette(0, addr, data),
            VideoView::Palette2 => video.write_palette(1, addr, data),
            VideoView::Sprites => video.write_sprite(addr, data),
        }
    }
}
