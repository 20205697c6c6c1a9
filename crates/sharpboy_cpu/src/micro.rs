//! Micro-operations for cycle-level CPU stepping.
//!
//! Every opcode-table entry is compiled once into a fixed-size template of
//! micro-ops. Executing an opcode copies that template into an [`Opcode`]
//! instance, which the driver then drains one micro-op per step.

mod compile;
mod exec;

pub use compile::compile;

use crate::cpu::alu::{AluInputs, AluOp};
use crate::cpu::flags::{FlagPolicy, FlagRule};
use crate::cpu::{Reg16, Reg8};
use crate::opcode::{Condition, PointerStep};

/// Longest template any table entry compiles to, padding included.
pub const QUEUE_CAPACITY: usize = 12;

/// Scratch operand cells of an executing opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Destination value; also the ALU's first operand and result.
    Dst = 0,
    /// Source value; the ALU's second operand.
    Src = 1,
    /// Effective address for memory steps and branch targets.
    Addr = 2,
    Lo = 3,
    Hi = 4,
}

/// Interrupt master enable change requested by DI/EI/RETI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImeChange {
    Disable,
    /// EI: takes effect after the following instruction.
    EnableDelayed,
    /// RETI
    EnableNow,
}

/// One atomic execution step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MicroOp {
    /// Read the byte at PC into a slot and advance PC.
    ReadImm(Slot),
    /// `slot = Hi << 8 | Lo`
    MergeBytes(Slot),
    ReadReg8(Reg8, Slot),
    WriteReg8(Reg8, Slot),
    ReadReg16(Reg16, Slot),
    WriteReg16(Reg16, Slot),
    LoadConst(u16, Slot),
    /// `slot = 0xFF00 | (slot & 0xFF)`
    HighPage(Slot),
    StepReg16(Reg16, PointerStep),
    /// Read the byte at `Addr` into a slot.
    ReadMem(Slot),
    /// Write the low byte of a slot to `Addr`.
    WriteMem(Slot),
    /// Write the high byte of a slot to `Addr + 1`.
    WriteMemHigh(Slot),
    /// `Dst = op(Dst, Src)`, latching the inputs for flag computation.
    Alu(AluOp),
    /// Drop the rest of the queue when the condition is false.
    Condition(Condition),
    Push(Slot),
    Pop(Slot),
    /// `PC = slot`
    Jump(Slot),
    /// `PC += slot as i8`
    JumpRelative(Slot),
    /// Internal delay with no bus access.
    Internal,
    Ime(ImeChange),
    Halt,
    /// Enter the stopped state, skipping the padding byte after STOP.
    Stop,
}

impl MicroOp {
    /// Duration in M-cycles.
    pub const fn m_cycles(self) -> u32 {
        match self {
            MicroOp::ReadImm(_)
            | MicroOp::ReadMem(_)
            | MicroOp::WriteMem(_)
            | MicroOp::WriteMemHigh(_)
            | MicroOp::Internal => 1,
            MicroOp::Push(_) | MicroOp::Pop(_) => 2,
            _ => 0,
        }
    }

    /// Steps ahead of which padding delays are placed.
    pub(crate) const fn is_commit(self) -> bool {
        matches!(
            self,
            MicroOp::Push(_)
                | MicroOp::WriteMem(_)
                | MicroOp::Jump(_)
                | MicroOp::JumpRelative(_)
        )
    }
}

/// Fixed-capacity micro-op queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MicroQueue {
    ops: [MicroOp; QUEUE_CAPACITY],
    len: u8,
    pos: u8,
}

impl Default for MicroQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MicroQueue {
    pub const fn new() -> Self {
        Self {
            ops: [MicroOp::Internal; QUEUE_CAPACITY],
            len: 0,
            pos: 0,
        }
    }

    pub(crate) fn from_slice(ops: &[MicroOp]) -> Option<Self> {
        if ops.len() > QUEUE_CAPACITY {
            return None;
        }
        let mut queue = Self::new();
        queue.ops[..ops.len()].copy_from_slice(ops);
        queue.len = ops.len() as u8;
        Some(queue)
    }

    /// Next pending micro-op, consuming it.
    pub fn pop_front(&mut self) -> Option<MicroOp> {
        if self.pos < self.len {
            let op = self.ops[self.pos as usize];
            self.pos += 1;
            Some(op)
        } else {
            None
        }
    }

    /// Drop every pending micro-op.
    pub fn kill(&mut self) {
        self.pos = self.len;
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.len
    }

    pub fn len(&self) -> usize {
        (self.len - self.pos) as usize
    }

    /// Pending micro-ops, in execution order.
    pub fn as_slice(&self) -> &[MicroOp] {
        &self.ops[self.pos as usize..self.len as usize]
    }
}

/// Compiled execution plan of one opcode-table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub template: MicroQueue,
    pub policy: FlagPolicy,
    pub rule: Option<FlagRule>,
    /// T-cycles when taken (or unconditional), and when not taken.
    pub cycles: [u32; 2],
}

impl Schedule {
    /// Schedule for bytes with no table entry: the fetch alone.
    pub const fn skip(fetch_cycles: u32) -> Schedule {
        Schedule {
            template: MicroQueue::new(),
            policy: FlagPolicy::UNCHANGED,
            rule: None,
            cycles: [fetch_cycles * 4, fetch_cycles * 4],
        }
    }
}

/// An opcode being executed: its pending micro-ops and scratch state.
#[derive(Clone, Copy, Debug)]
pub struct Opcode {
    pub(crate) queue: MicroQueue,
    pub(crate) scratch: [u16; 5],
    pub(crate) policy: FlagPolicy,
    pub(crate) rule: Option<FlagRule>,
    pub(crate) cycles: [u32; 2],
    /// Cleared by a failing condition check.
    pub(crate) taken: bool,
    pub(crate) alu: Option<AluInputs>,
    /// M-cycles spent so far, fetch included.
    pub(crate) elapsed: u32,
    pub(crate) halt: bool,
    pub(crate) stop: bool,
}

impl Default for Opcode {
    fn default() -> Self {
        Self::new(&Schedule::skip(0), 0)
    }
}

impl Opcode {
    pub fn new(schedule: &Schedule, fetch_cycles: u32) -> Self {
        Self {
            queue: schedule.template,
            scratch: [0; 5],
            policy: schedule.policy,
            rule: schedule.rule,
            cycles: schedule.cycles,
            taken: true,
            alu: None,
            elapsed: fetch_cycles,
            halt: false,
            stop: false,
        }
    }

    #[inline]
    pub(crate) fn get(&self, slot: Slot) -> u16 {
        self.scratch[slot as usize]
    }

    #[inline]
    pub(crate) fn set(&mut self, slot: Slot, value: u16) {
        self.scratch[slot as usize] = value;
    }

    /// T-cycles this invocation must take, given the branch outcome so far.
    pub fn expected_cycles(&self) -> u32 {
        if self.taken {
            self.cycles[0]
        } else {
            self.cycles[1]
        }
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }
}
