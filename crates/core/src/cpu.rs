//! CPU collaborator.
//!
//! The Z80 interpreter is supplied by the host. The engine only needs the
//! pin-level tick, the instruction boundary flag and register access for
//! the debugger.

use crate::pins::Pins;

/// Z80 flag bits.
pub const FLAG_C: u8 = 0x01;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_S: u8 = 0x80;

/// Register file snapshot.
///
/// `pc` follows the prefetching convention: at an instruction boundary the
/// next opcode has already been fetched, so the instruction about to run
/// starts at `pc - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub pc: u16,
    pub sp: u16,
    pub a: u8,
    pub f: u8,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    /// Alternate AF, A in the high byte.
    pub af2: u16,
    pub bc2: u16,
    pub de2: u16,
    pub hl2: u16,
    pub i: u8,
    pub r: u8,
    pub im: u8,
    pub iff1: bool,
    pub iff2: bool,
}

impl Registers {
    /// Address of the instruction about to execute.
    #[inline]
    pub fn current_pc(&self) -> u16 {
        self.pc.wrapping_sub(1)
    }

    #[inline]
    pub fn b(&self) -> u8 {
        (self.bc >> 8) as u8
    }

    pub fn get(&self, reg: Register) -> u16 {
        match reg {
            Register::A => self.a as u16,
            Register::F => self.f as u16,
            Register::BC => self.bc,
            Register::DE => self.de,
            Register::HL => self.hl,
            Register::SP => self.sp,
            Register::IX => self.ix,
            Register::IY => self.iy,
            Register::A2 => self.af2 >> 8,
            Register::BC2 => self.bc2,
            Register::DE2 => self.de2,
            Register::HL2 => self.hl2,
        }
    }
}

/// Registers the debugger may write directly. PC goes through
/// [`Cpu::prefetch`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    A,
    F,
    BC,
    DE,
    HL,
    SP,
    IX,
    IY,
    A2,
    BC2,
    DE2,
    HL2,
}

impl Register {
    /// Hex digits needed to edit this register.
    pub fn digits(self) -> u8 {
        match self {
            Register::A | Register::F | Register::A2 => 2,
            _ => 4,
        }
    }
}

pub trait Cpu {
    /// Advance one clock cycle.
    fn tick(&mut self, pins: Pins) -> Pins;

    /// True on the tick that completes an instruction.
    fn opdone(&self) -> bool;

    fn registers(&self) -> Registers;

    fn set_register(&mut self, reg: Register, value: u16);

    /// Restart execution at `address`; returns the pins for the forced
    /// fetch. The engine follows this with exactly one tick.
    fn prefetch(&mut self, address: u16) -> Pins;
}
