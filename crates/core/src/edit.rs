//! Hex-digit editor shared by every editable debugger field.
//!
//! A session is seeded with the target's current value and edits it one
//! nibble at a time from the most significant digit down. Typing past the
//! last digit commits. Backspace steps back one digit and puts the
//! original nibble back.

use crate::cpu::Register;
use crate::peripherals::VideoView;

/// Widest editable field (20-bit video RAM addresses).
pub const MAX_DIGITS: u8 = 5;

/// What a memory cell edit reads and writes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// CPU-visible memory: paged when `page` is `None`, else the explicit page.
    Cpu,
    /// Raw video region.
    Video(VideoView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCell {
    /// Memory view the edit was started from.
    pub view: usize,
    pub page: Option<u8>,
    pub address: u32,
    pub kind: CellKind,
}

/// The value an edit session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Register(Register),
    /// Program counter; committed through a CPU prefetch.
    Pc,
    /// Paging register 0–3.
    Page(usize),
    Breakpoint,
    /// Page shown by memory view n.
    ViewPage(usize),
    /// Start address of memory view n.
    ViewAddress(usize),
    Memory(MemoryCell),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub target: EditTarget,
    pub value: u32,
    original: u32,
    pub digits: u8,
    /// Digit under the cursor, counted from the least significant. Goes
    /// negative once the last digit has been typed.
    pub cursor: i8,
}

/// Mask covering `digits` hex digits.
pub fn digit_mask(digits: u8) -> u32 {
    0x0F_FFFF >> ((MAX_DIGITS - digits.clamp(1, MAX_DIGITS)) * 4)
}

impl EditSession {
    pub fn start(target: EditTarget, value: u32, digits: u8) -> Self {
        let digits = digits.clamp(1, MAX_DIGITS);
        let value = value & digit_mask(digits);
        EditSession { target, value, original: value, digits, cursor: digits as i8 - 1 }
    }

    pub fn mask(&self) -> u32 {
        digit_mask(self.digits)
    }

    pub fn original(&self) -> u32 {
        self.original
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.target, EditTarget::Memory(_))
    }

    /// Enter one hex digit. Returns true when the last digit has been
    /// typed and the session should commit.
    pub fn input_digit(&mut self, digit: u8) -> bool {
        if digit > 0xF || self.cursor < 0 {
            return self.cursor < 0;
        }
        let shift = self.cursor as u32 * 4;
        self.value = (self.value & !(0xF << shift)) | ((digit as u32) << shift);
        self.cursor -= 1;
        self.cursor < 0
    }

    pub fn backspace(&mut self) {
        if self.cursor < self.digits as i8 - 1 {
            self.cursor += 1;
            let shift = self.cursor as u32 * 4;
            self.value = (self.value & !(0xF << shift)) | (self.original & (0xF << shift));
        }
    }

    /// Add `delta`, wrapping within the field width.
    pub fn adjust(&mut self, delta: i32) {
        self.value = (self.value as i64 + delta as i64) as u32 & self.mask();
    }
}

/// Hex digit for a typed character.
pub fn hex_digit(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}
