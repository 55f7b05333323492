//! SST39SF040-style parallel flash command sequencer.
//!
//! Every CPU write that lands in ROM space is fed through [`FlashSequencer::write`].
//! The part only changes contents after a JEDEC unlock sequence:
//!
//! | step | address | data | state after |
//! |------|---------|------|-------------|
//! | 1    | 0x5555  | 0xAA | `Unlock1`   |
//! | 2    | 0x2AAA  | 0x55 | `Unlock2`   |
//! | 3    | 0x5555  | cmd  | command     |
//!
//! Commands: `0xA0` byte program (next write stores the byte), `0x80` erase
//! (followed by a second unlock and `0x10@0x5555` for chip erase or
//! `0x30@sector` for a 4 KB sector erase).
//!
//! While an operation is in flight, reads return the stored byte XORed with
//! a mask that flips bit 6 on each read ("toggle bit" polling). The first
//! access at or after the deadline ends the operation.

use crate::ROM_SIZE;

/// Byte program time (ps).
pub const BYTE_PROGRAM_PS: u64 = 14_000_000;
/// 4 KB sector erase time (ps).
pub const SECTOR_ERASE_PS: u64 = 18_000_000_000;
/// Whole-chip erase time (ps).
pub const CHIP_ERASE_PS: u64 = 70_000_000_000;

pub const SECTOR_SIZE: u32 = 0x1000;

const UNLOCK_ADDR1: u32 = 0x5555;
const UNLOCK_ADDR2: u32 = 0x2AAA;
const TOGGLE_BIT: u8 = 0x40;

/// Command recognition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Idle,
    Unlock1,
    Unlock2,
    /// `0xA0` received, next write is programmed.
    ByteProgram,
    /// `0x80` received, waiting for the second unlock.
    EraseArmed,
    EraseUnlock1,
    EraseUnlock2,
    /// Program or erase running until the deadline.
    Busy,
    /// Command byte the part does not implement; discarded on the next write.
    Other(u8),
}

impl FlashState {
    /// Numeric code shown by the debugger.
    pub fn code(self) -> u8 {
        match self {
            FlashState::Idle => 0,
            FlashState::Unlock1 => 1,
            FlashState::Unlock2 => 2,
            FlashState::Busy => 3,
            FlashState::ByteProgram => 0xA0,
            FlashState::EraseArmed => 0x80,
            FlashState::EraseUnlock1 => 0x81,
            FlashState::EraseUnlock2 => 0x82,
            FlashState::Other(cmd) => cmd,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlashSequencer {
    pub state: FlashState,
    /// Program/erase running.
    pub operation_active: bool,
    /// Completion time (ps) of the running operation.
    pub deadline_ps: u64,
    /// XOR applied to the next read while busy.
    pub toggle_mask: u8,
}

impl FlashSequencer {
    pub fn new() -> Self {
        FlashSequencer {
            state: FlashState::Idle,
            operation_active: false,
            deadline_ps: 0,
            toggle_mask: 0,
        }
    }

    /// True while a program or erase has not yet completed at `now_ps`.
    pub fn is_busy(&self, now_ps: u64) -> bool {
        self.operation_active && now_ps < self.deadline_ps
    }

    fn expire(&mut self, now_ps: u64) {
        if self.operation_active && now_ps >= self.deadline_ps {
            self.operation_active = false;
            self.state = FlashState::Idle;
        }
    }

    fn start(&mut self, now_ps: u64, latency_ps: u64) {
        self.operation_active = true;
        self.deadline_ps = now_ps + latency_ps;
        self.state = FlashState::Busy;
    }

    /// CPU read of ROM offset `offset`.
    pub fn read(&mut self, rom: &[u8], offset: u32, now_ps: u64) -> u8 {
        self.expire(now_ps);
        let byte = rom[offset as usize % rom.len()];
        if !self.operation_active {
            return byte;
        }
        let masked = byte ^ self.toggle_mask;
        self.toggle_mask ^= TOGGLE_BIT;
        masked
    }

    /// CPU write of `data` to ROM offset `offset`.
    pub fn write(&mut self, rom: &mut [u8], offset: u32, data: u8, now_ps: u64) {
        self.expire(now_ps);
        let offset = offset % rom.len() as u32;
        self.state = match (self.state, offset, data) {
            (FlashState::Busy, _, _) => FlashState::Busy,

            (FlashState::Idle, UNLOCK_ADDR1, 0xAA) => FlashState::Unlock1,
            (FlashState::Unlock1, UNLOCK_ADDR2, 0x55) => FlashState::Unlock2,
            (FlashState::Unlock2, UNLOCK_ADDR1, cmd) if cmd & 0xF0 != 0 => match cmd {
                0xA0 => FlashState::ByteProgram,
                0x80 => FlashState::EraseArmed,
                other => FlashState::Other(other),
            },

            (FlashState::ByteProgram, _, _) => {
                rom[offset as usize] = data;
                log::trace!("flash: program {:05X} = {:02X}", offset, data);
                self.start(now_ps, BYTE_PROGRAM_PS);
                FlashState::Busy
            }

            (FlashState::EraseArmed, UNLOCK_ADDR1, 0xAA) => FlashState::EraseUnlock1,
            (FlashState::EraseUnlock1, UNLOCK_ADDR2, 0x55) => FlashState::EraseUnlock2,
            (FlashState::EraseUnlock2, UNLOCK_ADDR1, 0x10) => {
                let end = rom.len().min(ROM_SIZE);
                rom[..end].fill(0xFF);
                log::debug!("flash: chip erase");
                self.start(now_ps, CHIP_ERASE_PS);
                FlashState::Busy
            }
            (FlashState::EraseUnlock2, _, 0x30) => {
                let base = (offset & !(SECTOR_SIZE - 1)) as usize;
                let end = (base + SECTOR_SIZE as usize).min(rom.len());
                rom[base..end].fill(0xFF);
                log::debug!("flash: sector erase {:05X}", base);
                self.start(now_ps, SECTOR_ERASE_PS);
                FlashState::Busy
            }

            _ => FlashState::Idle,
        };
    }

    /// Store a byte directly, bypassing the command protocol. Used by the
    /// debugger's memory editor.
    pub fn poke(&self, rom: &mut [u8], offset: u32, data: u8) {
        let len = rom.len();
        rom[offset as usize % len] = data;
    }
}

impl Default for FlashSequencer {
    fn default() -> Self {
        Self::new()
    }
}
