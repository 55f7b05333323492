//! Z80 control-flow classification for the debugger.
//!
//! The run modes only need to know, from the two opcode bytes at the
//! current PC, whether an instruction transfers control, under which
//! condition, and how long it is. [`decode_flow`] answers the first two,
//! [`instruction_length`] the last. [`Z80Classifier`] wraps both behind the
//! [`InstructionClassifier`] trait and tracks call depth for step-out.

use crate::cpu::{Registers, FLAG_C, FLAG_PV, FLAG_S, FLAG_Z};

/// Branch condition encoded in bits 3–5 of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    NZ,
    Z,
    NC,
    C,
    PO,
    PE,
    P,
    M,
}

impl Cond {
    fn from_bits(cc: u8) -> Cond {
        match cc & 7 {
            0 => Cond::NZ,
            1 => Cond::Z,
            2 => Cond::NC,
            3 => Cond::C,
            4 => Cond::PO,
            5 => Cond::PE,
            6 => Cond::P,
            _ => Cond::M,
        }
    }

    pub fn holds(self, f: u8) -> bool {
        match self {
            Cond::NZ => f & FLAG_Z == 0,
            Cond::Z => f & FLAG_Z != 0,
            Cond::NC => f & FLAG_C == 0,
            Cond::C => f & FLAG_C != 0,
            Cond::PO => f & FLAG_PV == 0,
            Cond::PE => f & FLAG_PV != 0,
            Cond::P => f & FLAG_S == 0,
            Cond::M => f & FLAG_S != 0,
        }
    }
}

/// Control-flow class of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Falls through to the next instruction.
    Next,
    /// JP nn, JR e, JP (HL/IX/IY).
    Jump,
    /// CALL nn, RST p.
    Call,
    /// RET, RETI, RETN.
    Return,
    CondJump(Cond),
    CondCall(Cond),
    CondReturn(Cond),
    /// Taken while B is not about to reach zero.
    Djnz,
}

impl Flow {
    pub fn is_conditional(self) -> bool {
        matches!(self, Flow::CondJump(_) | Flow::CondCall(_) | Flow::CondReturn(_) | Flow::Djnz)
    }
}

pub fn decode_flow(op0: u8, op1: u8) -> Flow {
    match op0 {
        0xC3 | 0x18 | 0xE9 => Flow::Jump,
        0xCD => Flow::Call,
        0xC9 => Flow::Return,
        0x10 => Flow::Djnz,
        0x20 | 0x28 | 0x30 | 0x38 => Flow::CondJump(Cond::from_bits((op0 >> 3) & 3)),
        op if op & 0xC7 == 0xC2 => Flow::CondJump(Cond::from_bits(op >> 3)),
        op if op & 0xC7 == 0xC4 => Flow::CondCall(Cond::from_bits(op >> 3)),
        op if op & 0xC7 == 0xC0 => Flow::CondReturn(Cond::from_bits(op >> 3)),
        op if op & 0xC7 == 0xC7 => Flow::Call,
        // RETN and RETI, including the undocumented mirrors
        0xED if op1 & 0xC7 == 0x45 => Flow::Return,
        0xDD | 0xFD if op1 == 0xE9 => Flow::Jump,
        _ => Flow::Next,
    }
}

/// Length of unprefixed opcodes.
fn base_length(op: u8) -> u8 {
    match op {
        0xCB => 2,
        0x01 | 0x11 | 0x21 | 0x31 | 0x22 | 0x2A | 0x32 | 0x3A | 0xC3 | 0xCD => 3,
        op if op & 0xC7 == 0xC2 || op & 0xC7 == 0xC4 => 3,
        op if op & 0xC7 == 0x06 => 2,
        op if op & 0xC7 == 0xC6 => 2,
        0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 | 0xD3 | 0xDB => 2,
        _ => 1,
    }
}

/// Indexed opcodes that take a `(IX+d)` displacement byte.
fn has_displacement(op: u8) -> bool {
    match op {
        0x34 | 0x35 | 0x36 => true,
        0x70..=0x75 | 0x77 => true,
        op if op & 0xC7 == 0x46 && op != 0x76 => true,
        op if op & 0xC7 == 0x86 => true,
        _ => false,
    }
}

/// Bytes occupied by the instruction starting with `op0, op1`, or `None`
/// when two bytes are not enough to tell.
pub fn instruction_length(op0: u8, op1: u8) -> Option<u8> {
    match op0 {
        0xED => Some(if op1 & 0xC7 == 0x43 { 4 } else { 2 }),
        0xDD | 0xFD => match op1 {
            0xCB => Some(4),
            0xDD | 0xED | 0xFD => None,
            op if has_displacement(op) => Some(base_length(op) + 2),
            op => Some(base_length(op) + 1),
        },
        op => Some(base_length(op)),
    }
}

/// Control-flow questions the execution controller asks at an instruction
/// boundary, given the two opcode bytes at the current PC.
pub trait InstructionClassifier {
    /// Unconditional jump or return.
    fn is_jump_or_return(&self, op0: u8, op1: u8) -> bool;
    fn is_conditional(&self, op0: u8, op1: u8) -> bool;
    /// Would the instruction transfer control with the given registers.
    fn is_taken(&self, op0: u8, op1: u8, regs: &Registers) -> bool;
    fn instruction_length(&self, op0: u8, op1: u8) -> Option<u8>;
    /// Forget call nesting; called when step-out begins.
    fn reset_stack(&mut self);
    /// Called at each boundary while stepping out. True when the
    /// instruction about to run returns from the level step-out began in.
    fn is_out(&mut self, op0: u8, op1: u8, flags: u8) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Z80Classifier {
    depth: u32,
}

impl Z80Classifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstructionClassifier for Z80Classifier {
    fn is_jump_or_return(&self, op0: u8, op1: u8) -> bool {
        matches!(decode_flow(op0, op1), Flow::Jump | Flow::Return)
    }

    fn is_conditional(&self, op0: u8, op1: u8) -> bool {
        decode_flow(op0, op1).is_conditional()
    }

    fn is_taken(&self, op0: u8, op1: u8, regs: &Registers) -> bool {
        match decode_flow(op0, op1) {
            Flow::Next => false,
            Flow::Jump | Flow::Call | Flow::Return => true,
            Flow::CondJump(cc) | Flow::CondCall(cc) | Flow::CondReturn(cc) => cc.holds(regs.f),
            Flow::Djnz => regs.b() != 1,
        }
    }

    fn instruction_length(&self, op0: u8, op1: u8) -> Option<u8> {
        instruction_length(op0, op1)
    }

    fn reset_stack(&mut self) {
        self.depth = 0;
    }

    fn is_out(&mut self, op0: u8, op1: u8, flags: u8) -> bool {
        let returning = match decode_flow(op0, op1) {
            Flow::Call => {
                self.depth += 1;
                false
            }
            Flow::CondCall(cc) if cc.holds(flags) => {
                self.depth += 1;
                false
            }
            Flow::Return => true,
            Flow::CondReturn(cc) => cc.holds(flags),
            _ => false,
        };
        if !returning {
            return false;
        }
        if self.depth == 0 {
            return true;
        }
        self.depth -= 1;
        false
    }
}
