//! MicroBeast peripheral collaborators.
//!
//! The chips themselves are supplied by the host; this module fixes the
//! contract the bus-tick engine drives them through:
//!
//! - [`Pio`]: Z80 PIO; port B carries I2C SCL/SDA and the RTC/UART interrupt lines
//! - [`I2cDevice`]: anything hanging off the I2C lines (two LED displays, RTC),
//!   ticked in registration order by [`I2cBus`]
//! - [`Uart`]: 16C550 serial port; its `OUT2` modem-control line drives the speaker
//! - [`VideoDevice`]: optional VideoBeast, reached through pages `0x40..0x5F`

mod i2c;
pub mod video;

pub use i2c::{I2cBus, I2cDevice};
pub use video::{VideoDevice, VideoView};

use crate::pins::Pins;

/// I2C address of the left LED display driver.
pub const I2C_DISPLAY1: u8 = 0x50;
/// I2C address of the right LED display driver.
pub const I2C_DISPLAY2: u8 = 0x53;
/// I2C address of the real-time clock.
pub const I2C_RTC: u8 = 0x6F;

/// Z80 PIO, selected by the engine through `PIO_CE`/`PIO_BASEL`/`PIO_CDSEL`.
pub trait Pio {
    fn tick(&mut self, pins: Pins) -> Pins;
}

/// 16C550-compatible UART.
pub trait Uart {
    fn tick(&mut self, pins: Pins, time_ps: u64) -> Pins;
    /// Register read, `reg` in `0..8`.
    fn read(&mut self, reg: u8) -> u8;
    fn write(&mut self, reg: u8, data: u8, time_ps: u64);
    fn modem_control(&self) -> u8;
    /// True while a host-side terminal is attached.
    fn is_connected(&self) -> bool;
    fn connect(&mut self, connect: bool);
    /// Host port the terminal is served on.
    fn port(&self) -> u16;
}
