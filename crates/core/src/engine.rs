//! Bus-tick engine.
//!
//! [`Beast::tick`] advances the machine by one clock cycle. The pin word is
//! threaded through CPU, PIO, I2C devices and UART in a fixed order, then
//! the resulting memory or I/O request is served:
//!
//! 1. clock += cycle
//! 2. CPU tick, keep CPU pins, raise IEIO
//! 3. PIO select on `IN/OUT (0x1x)`, present port A = 0xFF and latched port B
//! 4. PIO, then I2C devices in registration order; fold interrupts into INT
//! 5. latch port B (UART interrupt bit cleared), UART tick
//! 6. MREQ: RAM / video / flash, or IORQ: keyboard, UART, paging
//! 7. video tick when due, audio sample
//!
//! A paging write lands in step 6 and is seen by the very next memory cycle.

use std::time::{Duration, Instant};

use crate::audio::MCR_OUT2;
use crate::debugger::Mode;
use crate::host::{Host, HostEvent, Key};
use crate::paging::Region;
use crate::pins::{
    Pins, IEIO, INT, IORQ, M1, MREQ, PB_UART_INT, PIO_BASEL, PIO_CDSEL, PIO_CE, PIO_INT,
};
use crate::Beast;

/// PIO ports live at 0x10–0x1F.
const PIO_PORT: u16 = 0x10;

/// Holds a run back to simulated time. Never tries to catch up.
struct Pacer {
    start: Instant,
    start_ps: u64,
}

impl Pacer {
    fn new(start_ps: u64) -> Self {
        Pacer { start: Instant::now(), start_ps }
    }

    fn pace(&self, clock_ps: u64) {
        let simulated_ms = (clock_ps - self.start_ps) / 1_000_000_000;
        if (self.start.elapsed().as_millis() as u64) < simulated_ms {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Beast {
    /// Advance the machine by one clock cycle.
    pub fn tick(&mut self) {
        self.clock_ps += self.cycle_ps();
        let now = self.clock_ps;

        let mut pins = self.cpu.tick(self.pins).cpu_only();
        pins.set(IEIO, true);

        let addr = pins.addr();
        if pins.any(IORQ) && !pins.any(M1) && addr & 0xF0 == PIO_PORT {
            pins.set(PIO_CE, true);
        }
        pins.set(PIO_BASEL, addr & 0x01 != 0);
        pins.set(PIO_CDSEL, addr & 0x02 != 0);
        pins.set_ports(0xFF, self.port_b);

        pins = self.pio.tick(pins);
        pins = self.i2c.tick(pins, now);
        pins.set(INT, pins.any(PIO_INT) || self.i2c.interrupt());

        self.port_b = pins.port_b() & !PB_UART_INT;
        pins = self.uart.tick(pins, now);

        if pins.any(MREQ) {
            self.memory_cycle(&mut pins, now);
        } else if pins.any(IORQ) {
            self.io_cycle(&mut pins, now);
        }

        if let Some(video) = self.video.as_mut() {
            if self.next_video_ps <= now {
                self.next_video_ps = video.tick(now);
            }
        }

        if let Some(sampler) = self.audio.as_mut() {
            sampler.sample(now, self.uart.modem_control() & MCR_OUT2 != 0);
        }

        self.pins = pins;
    }

    fn memory_cycle(&mut self, pins: &mut Pins, now: u64) {
        let mapping = self.paging.translate(pins.addr());
        let offset = mapping.offset;
        if pins.is_mem_read() {
            let data = match (mapping.region, self.video.as_mut()) {
                (Region::Ram, _) => self.memory.ram_read(offset),
                (Region::Video, Some(video)) => video.read(offset, now),
                // Video pages without a board fall through to flash
                _ => self.flash.read(&self.memory.rom, offset, now),
            };
            pins.set_data(data);
        } else if pins.is_mem_write() {
            let data = pins.data();
            match (mapping.region, self.video.as_mut()) {
                (Region::Ram, _) => self.memory.ram_write(offset, data),
                (Region::Video, Some(video)) => video.write(offset, data, now),
                _ => self.flash.write(&mut self.memory.rom, offset, data, now),
            }
        }
    }

    fn io_cycle(&mut self, pins: &mut Pins, now: u64) {
        let port = pins.addr();
        if pins.is_io_read() {
            match port & 0xF0 {
                0x00 => pins.set_data(self.keyboard.read(port)),
                0x20 => pins.set_data(self.uart.read((port & 0x07) as u8)),
                _ => {}
            }
        } else if pins.is_io_write() {
            match port & 0xF0 {
                0x70 => self.paging.io_write(port, pins.data()),
                0x20 => self.uart.write((port & 0x07) as u8, pins.data(), now),
                _ => {}
            }
        }
    }

    /// Instruction at the breakpoint has just been fetched.
    fn at_breakpoint(&self) -> bool {
        match self.debugger.breakpoint {
            Some(bp) => self.cpu.opdone() && self.cpu.registers().current_pc() == bp,
            None => false,
        }
    }

    /// Tick until stopped. With `continuous` false this is a single tick.
    ///
    /// Host input is polled once per frame (`target_speed_hz / frame_rate`
    /// ticks, counted by `tick_count`), followed by a redraw. Returns the
    /// updated tick count.
    pub fn run(&mut self, host: &mut dyn Host, continuous: bool, mut tick_count: u64) -> u64 {
        let pacer = Pacer::new(self.clock_ps);
        let ticks_per_frame = self.config.ticks_per_frame();
        loop {
            self.tick();
            if self.config.throttle {
                pacer.pace(self.clock_ps);
            }

            let mut stop = !continuous;
            if tick_count % ticks_per_frame == 0 {
                match host.poll_event() {
                    Some(HostEvent::Quit) => {
                        self.set_mode(Mode::Quit);
                        break;
                    }
                    Some(HostEvent::KeyDown(event)) if event.key == Key::Escape => {
                        self.set_mode(Mode::Debug);
                        stop = true;
                    }
                    Some(HostEvent::KeyDown(event)) => {
                        if let Some(key) = event.matrix {
                            self.keyboard.press(key);
                        }
                    }
                    Some(HostEvent::KeyUp(event)) => {
                        if let Some(key) = event.matrix {
                            self.keyboard.release(key);
                        }
                    }
                    Some(HostEvent::Redraw) | None => {}
                }
                let file_count = host.file_count();
                host.present(&self.snapshot(file_count));
            }
            tick_count += 1;

            if self.at_breakpoint() {
                log::info!("breakpoint at {:04X}", self.cpu.registers().current_pc());
                self.set_mode(Mode::Debug);
                stop = true;
            }
            if stop {
                break;
            }
        }
        tick_count
    }
}
