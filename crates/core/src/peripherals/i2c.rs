use crate::pins::Pins;

/// A device on the I2C lines. Each device watches SCL/SDA in the port B
/// bits of the pin word and drives SDA or its own interrupt line back.
pub trait I2cDevice {
    /// 7-bit bus address, for diagnostics.
    fn address(&self) -> u8;

    fn tick(&mut self, pins: Pins, time_ps: u64) -> Pins;

    /// Interrupt request folded into the CPU INT line after the tick.
    fn interrupt(&self) -> bool {
        false
    }
}

/// Ordered set of I2C devices. Devices are ticked in the order they were
/// added; later devices see the lines as left by earlier ones.
#[derive(Default)]
pub struct I2cBus {
    devices: Vec<Box<dyn I2cDevice>>,
}

impl I2cBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, device: Box<dyn I2cDevice>) {
        log::debug!("i2c: device {:02X} attached", device.address());
        self.devices.push(device);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = u8> + '_ {
        self.devices.iter().map(|d| d.address())
    }

    pub fn tick(&mut self, mut pins: Pins, time_ps: u64) -> Pins {
        for device in self.devices.iter_mut() {
            pins = device.tick(pins, time_ps);
        }
        pins
    }

    /// Any device requesting an interrupt.
    pub fn interrupt(&self) -> bool {
        self.devices.iter().any(|d| d.interrupt())
    }
}
