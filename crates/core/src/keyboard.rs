//! Keyboard matrix.
//!
//! 4 rows × 12 columns. A key is identified by `row * 12 + col`. The CPU
//! scans with `IN A,(C)`: the high address byte plus bits of the low byte
//! drive the rows low, and the six data lines read back the columns
//! (active low).
//!
//! | columns | row strobe            | result bit        |
//! |---------|-----------------------|-------------------|
//! | 0–5     | port bit `11 - row`   | `0x20 >> col`     |
//! | 6–11    | port bit `row + 12`   | `1 << (col - 6)`  |

use std::collections::BTreeSet;

pub const ROWS: u8 = 4;
pub const COLS: u8 = 12;

/// Matrix position of the shift key.
pub const KEY_SHIFT: u8 = 3 * COLS + 1;
/// Matrix position of the ctrl key.
pub const KEY_CTRL: u8 = 2 * COLS;

/// Modifier a host key implies when it lands on the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modifier {
    #[default]
    None,
    Shift,
    Ctrl,
    CtrlShift,
}

/// A logical key-matrix position produced by the host's key translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixKey {
    pub row: u8,
    pub col: u8,
    pub modifier: Modifier,
}

impl MatrixKey {
    pub fn new(row: u8, col: u8) -> Self {
        MatrixKey { row, col, modifier: Modifier::None }
    }

    pub fn with(self, modifier: Modifier) -> Self {
        MatrixKey { modifier, ..self }
    }

    fn index(self) -> u8 {
        self.row * COLS + self.col
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMatrix {
    pressed: BTreeSet<u8>,
    /// Set whenever a key changes; cleared by the presentation layer.
    pub changed: bool,
}

impl KeyMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: MatrixKey) {
        if key.row >= ROWS || key.col >= COLS {
            return;
        }
        match key.modifier {
            Modifier::None => {}
            Modifier::Shift => {
                self.pressed.insert(KEY_SHIFT);
                self.pressed.remove(&KEY_CTRL);
            }
            Modifier::Ctrl => {
                self.pressed.remove(&KEY_SHIFT);
                self.pressed.insert(KEY_CTRL);
            }
            Modifier::CtrlShift => {
                self.pressed.insert(KEY_SHIFT);
                self.pressed.insert(KEY_CTRL);
            }
        }
        self.pressed.insert(key.index());
        self.changed = true;
    }

    pub fn release(&mut self, key: MatrixKey) {
        if key.row >= ROWS || key.col >= COLS {
            return;
        }
        // Releasing any modified key lets go of both modifiers
        if key.modifier != Modifier::None {
            self.pressed.remove(&KEY_SHIFT);
            self.pressed.remove(&KEY_CTRL);
        }
        self.pressed.remove(&key.index());
        self.changed = true;
    }

    pub fn is_pressed(&self, row: u8, col: u8) -> bool {
        self.pressed.contains(&(row * COLS + col))
    }

    /// Pressed keys as `(row, col)`, in matrix order.
    pub fn pressed(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.pressed.iter().map(|&k| (k / COLS, k % COLS))
    }

    /// Value returned by an I/O read of the keyboard port.
    pub fn read(&self, port: u16) -> u8 {
        let mut result = 0x3F;
        for (row, col) in self.pressed() {
            if col >= 6 {
                if (port >> (row + 12)) & 1 == 0 {
                    result &= !(1 << (col - 6));
                }
            } else if (port >> (11 - row)) & 1 == 0 {
                result &= !(0x20 >> col);
            }
        }
        result
    }
}
