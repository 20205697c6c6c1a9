pub mod alu;
pub mod flags;
pub mod interrupts;
mod regs;
pub mod stack;
mod step;

#[cfg(test)]
mod tests;

pub use regs::{Flag, Reg16, Reg8, Registers};

use crate::micro::Opcode;
use interrupts::MasterEnable;

/// Abstraction over the DMG bus (memory and IO).
///
/// The CPU only needs byte access plus a way to let bus-side peripherals
/// (timer) advance alongside it.
pub trait Bus {
    fn read8(&mut self, addr: u16) -> u8;
    fn write8(&mut self, addr: u16, value: u8);
    /// Advance bus-side peripherals by a given number of T-cycles.
    ///
    /// Default implementation does nothing; system buses override this
    /// to drive timers.
    fn tick(&mut self, _cycles: u32) {}
}

/// Driver state between steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuState {
    /// At an instruction boundary.
    Fetch,
    /// Draining the micro-ops of the current opcode.
    Execute,
    /// HALT: only interrupt polling until IE & IF becomes non-zero.
    Halted,
    /// STOP: timers frozen until a joypad line goes low.
    Stopped,
}

pub struct Cpu {
    pub regs: Registers,
    pub(crate) ime: MasterEnable,
    state: CpuState,
    pub(crate) current: Opcode,
    /// Next fetch does not advance PC (HALT with IME clear and an
    /// interrupt already pending).
    halt_bug: bool,
    /// Where the current instruction was fetched from.
    fetched_at: u16,
    cycles: u64,
    instructions: u64,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// CPU in the state the boot ROM hands over at 0x0100.
    pub fn new() -> Self {
        Self::with_registers(Registers::post_boot())
    }

    /// CPU at power-on, about to run a boot ROM from 0x0000.
    pub fn power_on() -> Self {
        Self::with_registers(Registers::default())
    }

    pub fn with_registers(regs: Registers) -> Self {
        Self {
            regs,
            ime: MasterEnable::default(),
            state: CpuState::Fetch,
            current: Opcode::default(),
            halt_bug: false,
            fetched_at: 0,
            cycles: 0,
            instructions: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> CpuState {
        self.state
    }

    #[inline]
    pub fn ime(&self) -> bool {
        self.ime.enabled()
    }

    pub fn set_ime(&mut self, enabled: bool) {
        if enabled {
            self.ime.enable_now();
        } else {
            self.ime.disable();
        }
    }

    /// Total T-cycles executed.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Completed instructions, interrupt dispatches excluded.
    #[inline]
    pub fn instructions(&self) -> u64 {
        self.instructions
    }
}
