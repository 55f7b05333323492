//! Machine configuration. Stored as TOML; every field is optional and falls
//! back to the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BeastError, Result};

/// Default CPU clock: 8 MHz.
pub const DEFAULT_SPEED_HZ: u64 = 8_000_000;
/// Input polling / redraw rate while running.
pub const DEFAULT_FRAME_RATE: u64 = 60;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_AUDIO_BUFFER: usize = 8192;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeastConfig {
    /// Emulated CPU clock frequency.
    pub target_speed_hz: u64,
    /// Emulated frames per second; host input is drained once per frame.
    pub frame_rate: u64,
    /// Breakpoint armed at start-up.
    pub breakpoint: Option<u16>,
    /// Audio output rate. 0 = no audio.
    pub sample_rate: u32,
    /// Speaker volume multiplier.
    pub volume: i16,
    /// Ring capacity between sampler and audio callback, in samples.
    pub audio_buffer_len: usize,
    /// File the `a` debugger command appends raw PCM to.
    pub audio_capture_path: PathBuf,
    /// Hold emulation back to `target_speed_hz`. Off = run flat out.
    pub throttle: bool,
}

impl Default for BeastConfig {
    fn default() -> Self {
        Self {
            target_speed_hz: DEFAULT_SPEED_HZ,
            frame_rate: DEFAULT_FRAME_RATE,
            breakpoint: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: 10,
            audio_buffer_len: DEFAULT_AUDIO_BUFFER,
            audio_capture_path: PathBuf::from("audio.raw"),
            throttle: true,
        }
    }
}

impl BeastConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BeastConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_speed_hz == 0 {
            return Err(BeastError::InvalidConfig("target_speed_hz must be non-zero".into()));
        }
        if self.frame_rate == 0 || self.frame_rate > self.target_speed_hz {
            return Err(BeastError::InvalidConfig(format!(
                "frame_rate {} must be between 1 and target_speed_hz",
                self.frame_rate
            )));
        }
        if self.volume < 0 {
            return Err(BeastError::InvalidConfig(format!(
                "volume {} must not be negative",
                self.volume
            )));
        }
        if self.sample_rate != 0 && self.audio_buffer_len < 2 {
            return Err(BeastError::InvalidConfig("audio_buffer_len must be at least 2".into()));
        }
        Ok(())
    }

    /// Simulated time per clock cycle.
    pub fn clock_cycle_ps(&self) -> u64 {
        crate::PS_PER_SECOND / self.target_speed_hz.max(1)
    }

    /// Ticks between host input polls.
    pub fn ticks_per_frame(&self) -> u64 {
        (self.target_speed_hz / self.frame_rate.max(1)).max(1)
    }
}
