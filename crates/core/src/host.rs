//! Presentation/input collaborator.
//!
//! The host owns the window, translates its native key codes into [`Key`]
//! plus an optional matrix position, and draws whatever it likes from a
//! [`Snapshot`]. The core never blocks on the host except through
//! [`Host::wait_event`] while halted.

use std::time::Duration;

use crate::cpu::Registers;
use crate::debugger::{Debugger, MachineView, Mode};
use crate::keyboard::{KeyMatrix, MatrixKey};
use crate::paging::Paging;

/// Logical key as seen by the debugger menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Return,
    Backspace,
    Space,
    Up,
    Down,
    Left,
    Right,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Position on the MicroBeast keyboard, if the host key maps onto one.
    pub matrix: Option<MatrixKey>,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        KeyEvent { key, matrix: None }
    }

    pub fn with_matrix(key: Key, matrix: MatrixKey) -> Self {
        KeyEvent { key, matrix: Some(matrix) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    /// Window closed.
    Quit,
    /// Render targets lost; draw everything again.
    Redraw,
}

/// Everything the host may draw for one frame.
pub struct Snapshot<'a> {
    pub mode: Mode,
    pub registers: Registers,
    pub paging: &'a Paging,
    /// Flash sequencer command state.
    pub flash_state: u8,
    pub debugger: &'a Debugger,
    pub keys: &'a KeyMatrix,
    pub machine: MachineView<'a>,
    pub audio_capture: bool,
    pub uart_connected: bool,
    pub uart_port: u16,
    pub clock_ps: u64,
    pub port_b: u8,
}

pub trait Host {
    /// Next pending event without waiting.
    fn poll_event(&mut self) -> Option<HostEvent>;

    /// Wait up to `timeout` for one event.
    fn wait_event(&mut self, timeout: Duration) -> Option<HostEvent>;

    fn present(&mut self, snapshot: &Snapshot);

    /// Entries in the source listing shown by the FILES menu.
    fn file_count(&self) -> usize {
        0
    }

    fn remove_file(&mut self, _index: usize) {}

    /// Ask the user for another listing file.
    fn add_file(&mut self) {}
}
