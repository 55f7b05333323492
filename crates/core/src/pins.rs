//! Bus signal word.
//!
//! Every collaborator in a tick (CPU, PIO, I2C devices, UART) takes the
//! current [`Pins`] by value and hands back the updated word. Nothing keeps
//! a copy across ticks.
//!
//! ## Layout
//!
//! | bits  | signal                                   |
//! |-------|------------------------------------------|
//! | 0–15  | A0–A15                                   |
//! | 16–23 | D0–D7                                    |
//! | 24–36 | M1 MREQ IORQ RD WR HALT INT RESET NMI WAIT RFSH IEIO RETI |
//! | 37–40 | PIO CE BASEL CDSEL INT                   |
//! | 48–55 | PIO port A                               |
//! | 56–63 | PIO port B                               |

/// 64-bit bus signal word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Pins(pub u64);

// ─── CPU pins ───────────────────────────────────────────────────────────────

pub const M1: u64 = 1 << 24;
pub const MREQ: u64 = 1 << 25;
pub const IORQ: u64 = 1 << 26;
pub const RD: u64 = 1 << 27;
pub const WR: u64 = 1 << 28;
pub const HALT: u64 = 1 << 29;
pub const INT: u64 = 1 << 30;
pub const RESET: u64 = 1 << 31;
pub const NMI: u64 = 1 << 32;
pub const WAIT: u64 = 1 << 33;
pub const RFSH: u64 = 1 << 34;
/// Combined interrupt daisy-chain enable in/out.
pub const IEIO: u64 = 1 << 35;
pub const RETI: u64 = 1 << 36;

/// Every pin the CPU drives or samples. Peripheral lines above this are
/// rebuilt by the engine on each tick.
pub const CPU_MASK: u64 = (1 << 37) - 1;

// ─── PIO pins ───────────────────────────────────────────────────────────────

pub const PIO_CE: u64 = 1 << 37;
pub const PIO_BASEL: u64 = 1 << 38;
pub const PIO_CDSEL: u64 = 1 << 39;
pub const PIO_INT: u64 = 1 << 40;

const PA_SHIFT: u32 = 48;
const PB_SHIFT: u32 = 56;

/// Port B bit wired to the RTC interrupt output.
pub const PB_RTC_INT: u8 = 1 << 5;
/// Port B bit wired to the UART interrupt output.
pub const PB_UART_INT: u8 = 1 << 4;
/// Port B bit driving I2C SCL.
pub const PB_I2C_SCL: u8 = 1 << 6;
/// Port B bit driving I2C SDA.
pub const PB_I2C_SDA: u8 = 1 << 7;

impl Pins {
    #[inline]
    pub fn addr(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub fn set_addr(&mut self, addr: u16) {
        self.0 = (self.0 & !0xFFFF) | addr as u64;
    }

    #[inline]
    pub fn data(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub fn set_data(&mut self, data: u8) {
        self.0 = (self.0 & !0xFF_0000) | ((data as u64) << 16);
    }

    /// True if every bit of `mask` is set.
    #[inline]
    pub fn all(self, mask: u64) -> bool {
        self.0 & mask == mask
    }

    /// True if any bit of `mask` is set.
    #[inline]
    pub fn any(self, mask: u64) -> bool {
        self.0 & mask != 0
    }

    #[inline]
    pub fn set(&mut self, mask: u64, on: bool) {
        if on { self.0 |= mask } else { self.0 &= !mask }
    }

    #[inline]
    pub fn port_a(self) -> u8 {
        (self.0 >> PA_SHIFT) as u8
    }

    #[inline]
    pub fn port_b(self) -> u8 {
        (self.0 >> PB_SHIFT) as u8
    }

    /// Present both PIO port input lines at once.
    #[inline]
    pub fn set_ports(&mut self, a: u8, b: u8) {
        self.0 = (self.0 & 0x0000_FFFF_FFFF_FFFF)
            | ((a as u64) << PA_SHIFT)
            | ((b as u64) << PB_SHIFT);
    }

    /// Keep only the CPU-driven lines.
    #[inline]
    pub fn cpu_only(self) -> Pins {
        Pins(self.0 & CPU_MASK)
    }

    /// Memory read cycle in progress.
    #[inline]
    pub fn is_mem_read(self) -> bool {
        self.all(MREQ | RD)
    }

    #[inline]
    pub fn is_mem_write(self) -> bool {
        self.all(MREQ | WR)
    }

    /// I/O read. Interrupt acknowledge (IORQ with M1) is excluded.
    #[inline]
    pub fn is_io_read(self) -> bool {
        self.all(IORQ | RD) && !self.any(M1)
    }

    #[inline]
    pub fn is_io_write(self) -> bool {
        self.all(IORQ | WR) && !self.any(M1)
    }
}
