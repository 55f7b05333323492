//! Execution controller.
//!
//! [`Beast::main_loop`] drives the machine between the run modes and the
//! halted menus until QUIT. Each stepping mode is a [`StopRule`] evaluated at
//! instruction boundaries:
//!
//! | mode | rule                                                        |
//! |------|-------------------------------------------------------------|
//! | STEP | next boundary                                               |
//! | OUT  | boundary after the return that leaves the current call level |
//! | OVER | boundary with PC past the current instruction               |
//! | TAKE | boundary after the branch at the current PC is taken         |
//!
//! Every rule other than STEP also stops at the first boundary after the
//! mode was changed from outside (Escape, breakpoint, Quit).

use std::path::Path;
use std::time::{Duration, Instant};

use crate::classify::InstructionClassifier;
use crate::cpu::Registers;
use crate::debugger::{Action, MachineView, Mode};
use crate::edit::{CellKind, EditTarget, MemoryCell};
use crate::host::{Host, HostEvent};
use crate::paging::{page_mapping, Region};
use crate::Beast;

/// Longest wait for one host event while halted.
pub const HALT_POLL: Duration = Duration::from_millis(25);

/// Machine state at an instruction boundary.
#[derive(Debug, Clone, Copy)]
pub struct Boundary {
    pub regs: Registers,
    /// Opcode bytes at `pc - 1` and `pc`.
    pub op0: u8,
    pub op1: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRule {
    Boundary,
    /// Returned out of the call level the rule started in.
    Return,
    /// Raw (prefetched) PC reached the target.
    Address(u16),
    /// The branch at this address was taken.
    Taken(u16),
}

/// A stop rule plus what it has latched so far.
#[derive(Debug, Clone)]
pub struct StopCondition {
    rule: StopRule,
    entry: Mode,
    latched: bool,
}

impl StopCondition {
    pub fn new(rule: StopRule, entry: Mode) -> Self {
        StopCondition { rule, entry, latched: false }
    }

    pub fn rule(&self) -> StopRule {
        self.rule
    }

    /// Feed the boundary the next instruction starts from.
    pub fn observe(&mut self, at: &Boundary, classifier: &mut dyn InstructionClassifier) {
        match self.rule {
            StopRule::Return => self.latched = classifier.is_out(at.op0, at.op1, at.regs.f),
            StopRule::Taken(branch) if at.regs.current_pc() == branch => {
                self.latched = classifier.is_taken(at.op0, at.op1, &at.regs);
            }
            _ => {}
        }
    }

    /// Checked after every tick.
    pub fn should_stop(&self, opdone: bool, pc: u16, mode: Mode) -> bool {
        if !opdone {
            return false;
        }
        match self.rule {
            StopRule::Boundary => true,
            StopRule::Return | StopRule::Taken(_) => self.latched || mode != self.entry,
            StopRule::Address(target) => pc == target || mode != self.entry,
        }
    }
}

/// OVER target for the instruction at `at`: past it when its length is
/// known and it cannot leave by itself, otherwise a single step.
pub fn plan_over(at: &Boundary, classifier: &dyn InstructionClassifier) -> StopRule {
    if classifier.is_jump_or_return(at.op0, at.op1) {
        log::debug!("over: unconditional jump at {:04X}, stepping", at.regs.current_pc());
        return StopRule::Boundary;
    }
    match classifier.instruction_length(at.op0, at.op1) {
        Some(len) => StopRule::Address(at.regs.pc.wrapping_add(len as u16)),
        None => {
            log::debug!("over: unknown length at {:04X}, stepping", at.regs.current_pc());
            StopRule::Boundary
        }
    }
}

impl Beast {
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            log::debug!("mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }

    fn boundary(&self) -> Boundary {
        let (op0, op1) = self.machine_view(0).opcodes();
        Boundary { regs: self.cpu.registers(), op0, op1 }
    }

    /// Run until QUIT.
    pub fn main_loop(&mut self, host: &mut dyn Host) {
        self.run(host, false, 0);
        while self.mode != Mode::Quit {
            match self.mode {
                Mode::Run => self.run_mode(host),
                Mode::Step | Mode::Out | Mode::Over | Mode::Take => self.step_mode(host),
                Mode::Debug | Mode::Files => self.visit_halted(host),
                Mode::Quit => {}
            }
        }
    }

    /// RUN: free-running until stopped, then finish the instruction in flight.
    pub fn run_mode(&mut self, host: &mut dyn Host) {
        let start = Instant::now();
        let ticks = self.run(host, true, 0);
        let secs = start.elapsed().as_secs_f64();
        if secs > 0.0 {
            log::info!("Speed {:.2} MHz", ticks as f64 / 1_000_000.0 / secs);
        }
        while !self.cpu.opdone() {
            self.run(host, false, 0);
        }
    }

    /// One STEP / OUT / OVER / TAKE, ending in DEBUG unless QUIT was requested.
    pub fn step_mode(&mut self, host: &mut dyn Host) {
        let rule = match self.mode {
            Mode::Step => StopRule::Boundary,
            Mode::Out => {
                self.classifier.reset_stack();
                StopRule::Return
            }
            Mode::Take => StopRule::Taken(self.cpu.registers().current_pc()),
            Mode::Over => {
                while !self.cpu.opdone() {
                    self.run(host, false, 0);
                }
                // Escape or Quit while finishing the instruction in flight
                if self.mode != Mode::Over {
                    return;
                }
                match plan_over(&self.boundary(), self.classifier.as_ref()) {
                    StopRule::Boundary => {
                        self.set_mode(Mode::Step);
                        StopRule::Boundary
                    }
                    rule => rule,
                }
            }
            _ => return,
        };

        let mut stop = StopCondition::new(rule, self.mode);
        let mut ticks = 0;
        loop {
            if self.cpu.opdone() {
                let at = self.boundary();
                stop.observe(&at, self.classifier.as_mut());
            }
            ticks = self.run(host, false, ticks);
            if stop.should_stop(self.cpu.opdone(), self.cpu.registers().pc, self.mode) {
                break;
            }
        }
        if self.mode != Mode::Quit {
            self.set_mode(Mode::Debug);
        }
    }

    fn present(&self, host: &mut dyn Host) {
        let file_count = host.file_count();
        host.present(&self.snapshot(file_count));
    }

    /// DEBUG / FILES: redraw and feed host keys to the debugger until the
    /// mode leaves the halted pair. Returns early, with the mode unchanged,
    /// after reconnecting an idle UART.
    pub fn visit_halted(&mut self, host: &mut dyn Host) {
        self.present(host);
        while self.mode.is_halted() {
            match host.wait_event(HALT_POLL) {
                None => {
                    if !self.uart.is_connected() {
                        log::debug!("uart: reconnecting on port {}", self.uart.port());
                        self.uart.connect(true);
                        return;
                    }
                }
                Some(HostEvent::Quit) => self.set_mode(Mode::Quit),
                Some(HostEvent::Redraw) => self.present(host),
                Some(HostEvent::KeyDown(event)) => {
                    let view = MachineView {
                        registers: self.cpu.registers(),
                        memory: &self.memory,
                        paging: &self.paging,
                        video: self.video.as_deref(),
                        classifier: self.classifier.as_ref(),
                        file_count: host.file_count(),
                    };
                    let actions = self.debugger.on_key(event.key, self.mode, &view);
                    for action in actions {
                        self.apply(action, host);
                    }
                    self.present(host);
                }
                Some(HostEvent::KeyUp(_)) => {}
            }
        }
    }

    /// Carry out one debugger action.
    pub fn apply(&mut self, action: Action, host: &mut dyn Host) {
        match action {
            Action::SetMode(mode) => self.set_mode(mode),
            Action::Write(target, value) => self.write_target(target, value),
            Action::AdvanceMemoryEdit(delta) => {
                let view = MachineView {
                    registers: self.cpu.registers(),
                    memory: &self.memory,
                    paging: &self.paging,
                    video: self.video.as_deref(),
                    classifier: self.classifier.as_ref(),
                    file_count: 0,
                };
                self.debugger.update_memory_edit(delta, &view);
            }
            Action::TogglePaging => self.paging.enabled = !self.paging.enabled,
            Action::ToggleAudioCapture => self.toggle_audio_capture(),
            Action::DisconnectUart => self.uart.connect(false),
            Action::RemoveFile(index) => host.remove_file(index),
            Action::AddFile => host.add_file(),
        }
    }

    /// Store a committed edit.
    pub fn write_target(&mut self, target: EditTarget, value: u32) {
        if self.debugger.write_own(target, value) {
            return;
        }
        match target {
            EditTarget::Register(reg) => self.cpu.set_register(reg, value as u16),
            EditTarget::Pc => {
                self.pins = self.cpu.prefetch(value as u16);
                self.tick();
            }
            EditTarget::Page(n) => self.paging.pages[n & 3] = value as u8,
            EditTarget::Memory(cell) => self.write_cell(&cell, value as u8),
            EditTarget::Breakpoint | EditTarget::ViewPage(_) | EditTarget::ViewAddress(_) => {}
        }
    }

    /// Debugger memory store. Flash is written raw, without the command protocol.
    fn write_cell(&mut self, cell: &MemoryCell, data: u8) {
        let page = match cell.kind {
            CellKind::Video(region) => {
                if let Some(video) = self.video.as_deref_mut() {
                    region.write(video, cell.address, data);
                }
                return;
            }
            CellKind::Cpu => cell.page,
        };
        let mapping = match page {
            Some(page) => page_mapping(page, cell.address),
            None => self.paging.translate(cell.address as u16),
        };
        match mapping.region {
            Region::Ram => self.memory.ram_write(mapping.offset, data),
            Region::Rom => self.flash.poke(&mut self.memory.rom, mapping.offset, data),
            Region::Video => {
                if let Some(video) = self.video.as_mut() {
                    video.write(mapping.offset, data, self.clock_ps);
                }
            }
        }
    }

    fn toggle_audio_capture(&mut self) {
        let result = if self.capture.is_active() {
            self.capture.stop()
        } else {
            self.capture.start(Path::new(&self.config.audio_capture_path))
        };
        if let Err(e) = result {
            log::warn!("audio capture: {}", e);
        }
    }
}
