//! # beast-core
//!
//! Bus-level emulation core for the MicroBeast Z80 single-board computer.
//!
//! The machine is a Z80 at 8 MHz with 512 KB of SST39SF040 flash, 512 KB of
//! RAM, a four-register paging unit, a Z80 PIO bit-banging I2C to two LED
//! display drivers and an RTC, a 16C550 UART whose `OUT2` line drives the
//! speaker, a 4×12 key matrix and an optional VideoBeast board.
//!
//! ## Architecture
//!
//! - [`Beast`]: machine aggregate; owns every component and the clock
//! - [`engine`]: the per-tick bus dispatch ([`Beast::tick`]) and paced run loop
//! - [`controller`]: RUN / STEP / OUT / OVER / TAKE run modes and their stop rules
//! - [`debugger`]: halted-mode register, memory view and FILES menus
//! - [`edit`]: hex-digit edit sessions bound to registers, pages or memory
//! - [`paging`]: 16 KB quadrant translation to ROM / RAM / video pages
//! - [`flash`]: JEDEC command sequencer with simulated program/erase latency
//! - [`audio`]: speaker sampler, lock-free ring, consumer and raw capture
//! - [`keyboard`]: key matrix state and the port scan decoder
//! - [`classify`]: Z80 control-flow classification for the run modes
//!
//! The Z80 interpreter, PIO, UART, I2C devices, video board and the host
//! window are supplied through the traits in [`cpu`], [`peripherals`] and
//! [`host`].

pub mod audio;
pub mod classify;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod debugger;
pub mod edit;
pub mod engine;
pub mod error;
pub mod flash;
pub mod host;
pub mod keyboard;
pub mod memory;
pub mod paging;
pub mod peripherals;
pub mod pins;

pub use audio::{AudioCapture, AudioConsumer};
pub use classify::{InstructionClassifier, Z80Classifier};
pub use config::BeastConfig;
pub use cpu::{Cpu, Register, Registers};
pub use debugger::{Debugger, MachineView, Mode};
pub use error::{BeastError, Result};
pub use host::{Host, HostEvent, Key, KeyEvent, Snapshot};
pub use memory::Memory;
pub use pins::Pins;

use audio::AudioSampler;
use flash::FlashSequencer;
use keyboard::KeyMatrix;
use paging::Paging;
use peripherals::{I2cBus, I2cDevice, Pio, Uart, VideoDevice};

/// Flash ROM size: 512 KB
pub const ROM_SIZE: usize = 512 * 1024;
/// RAM size: 512 KB
pub const RAM_SIZE: usize = 512 * 1024;
/// Picoseconds per second; all machine time is kept in ps.
pub const PS_PER_SECOND: u64 = 1_000_000_000_000;

/// The MicroBeast machine.
pub struct Beast {
    pub cpu: Box<dyn Cpu>,
    /// Pin word carried from one tick to the next.
    pub pins: Pins,
    /// Simulated time in picoseconds. Never decreases.
    pub clock_ps: u64,
    cycle_ps: u64,
    pub config: BeastConfig,
    pub memory: Memory,
    pub paging: Paging,
    pub flash: FlashSequencer,
    pub pio: Box<dyn Pio>,
    pub i2c: I2cBus,
    pub uart: Box<dyn Uart>,
    pub video: Option<Box<dyn VideoDevice>>,
    next_video_ps: u64,
    /// PIO port B as last driven, UART interrupt bit cleared.
    pub port_b: u8,
    pub keyboard: KeyMatrix,
    audio: Option<AudioSampler>,
    pub capture: AudioCapture,
    pub classifier: Box<dyn InstructionClassifier>,
    pub debugger: Debugger,
    pub mode: Mode,
}

impl Beast {
    /// Build a machine around the host-supplied CPU, PIO and UART.
    /// Fails on an invalid configuration.
    pub fn new(
        config: BeastConfig,
        cpu: Box<dyn Cpu>,
        pio: Box<dyn Pio>,
        uart: Box<dyn Uart>,
    ) -> Result<Self> {
        config.validate()?;
        let cycle_ps = config.clock_cycle_ps();
        log::info!(
            "MicroBeast: {} Hz target, {} ps/cycle, {} ticks/frame",
            config.target_speed_hz,
            cycle_ps,
            config.ticks_per_frame()
        );
        Ok(Beast {
            cpu,
            pins: Pins::default(),
            clock_ps: 0,
            cycle_ps,
            memory: Memory::new(),
            paging: Paging::new(),
            flash: FlashSequencer::new(),
            pio,
            i2c: I2cBus::new(),
            uart,
            video: None,
            next_video_ps: 0,
            port_b: 0xFF,
            keyboard: KeyMatrix::new(),
            audio: None,
            capture: AudioCapture::new(),
            classifier: Box::new(Z80Classifier::new()),
            debugger: Debugger::new(config.breakpoint),
            mode: Mode::Run,
            config,
        })
    }

    /// Append an I2C device. Devices tick in the order added.
    pub fn add_i2c_device(&mut self, device: Box<dyn I2cDevice>) {
        self.i2c.add_device(device);
    }

    pub fn attach_video(&mut self, video: Box<dyn VideoDevice>) {
        log::info!("VideoBeast attached");
        self.next_video_ps = self.clock_ps;
        self.video = Some(video);
    }

    /// Start speaker sampling and hand back the consumer half for the host's
    /// audio callback. `None` when the sample rate is 0.
    pub fn attach_audio(&mut self) -> Option<AudioConsumer> {
        if self.config.sample_rate == 0 {
            return None;
        }
        let (sampler, consumer) = audio::channel(
            self.config.sample_rate,
            self.config.volume,
            self.config.audio_buffer_len,
            self.clock_ps,
            self.capture.clone(),
        );
        log::info!(
            "audio: {} Hz, {} sample ring, period {} ps",
            self.config.sample_rate,
            sampler.capacity(),
            sampler.period_ps
        );
        self.audio = Some(sampler);
        Some(consumer)
    }

    /// Samples the ring had no room for.
    pub fn audio_dropped(&self) -> u64 {
        self.audio.as_ref().map_or(0, |a| a.dropped)
    }

    pub fn set_classifier(&mut self, classifier: Box<dyn InstructionClassifier>) {
        self.classifier = classifier;
    }

    /// Copy a flat image to the start of flash.
    pub fn load_rom(&mut self, image: &[u8]) -> Result<()> {
        self.memory.load_rom(image)
    }

    pub fn cycle_ps(&self) -> u64 {
        self.cycle_ps
    }

    /// Read-only view for the debugger and presentation.
    pub fn machine_view(&self, file_count: usize) -> MachineView<'_> {
        MachineView {
            registers: self.cpu.registers(),
            memory: &self.memory,
            paging: &self.paging,
            video: self.video.as_deref(),
            classifier: self.classifier.as_ref(),
            file_count,
        }
    }

    pub fn snapshot(&self, file_count: usize) -> Snapshot<'_> {
        Snapshot {
            mode: self.mode,
            registers: self.cpu.registers(),
            paging: &self.paging,
            flash_state: self.flash.state.code(),
            debugger: &self.debugger,
            keys: &self.keyboard,
            machine: self.machine_view(file_count),
            audio_capture: self.capture.is_active(),
            uart_connected: self.uart.is_connected(),
            uart_port: self.uart.port(),
            clock_ps: self.clock_ps,
            port_b: self.port_b,
        }
    }
}
