use super::{stack, Bus, Cpu};
use crate::memory::{Interrupt, IE_ADDR, IF_ADDR};

/// T-cycles taken by an interrupt dispatch.
pub const DISPATCH_CYCLES: u32 = 20;

/// Interrupt master enable with EI's one-instruction delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MasterEnable {
    enabled: bool,
    /// Set by EI; armed at the end of the EI instruction.
    pending: bool,
    /// Armed; IME turns on at the end of the next instruction.
    delay: bool,
}

impl MasterEnable {
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.pending = false;
        self.delay = false;
    }

    pub fn request_enable(&mut self) {
        self.pending = true;
    }

    pub fn enable_now(&mut self) {
        self.enabled = true;
        self.pending = false;
        self.delay = false;
    }

    /// Advance the delayed enable; called when an instruction finishes.
    pub fn instruction_done(&mut self) {
        if self.delay {
            // Second step after EI: actually enable IME.
            self.enabled = true;
            self.delay = false;
        } else if self.pending {
            // First step after EI: arm the delayed enable.
            self.pending = false;
            self.delay = true;
        }
    }
}

/// Enabled and requested interrupt bits (`IE & IF`, low five bits).
pub fn pending<B: Bus + ?Sized>(bus: &mut B) -> u8 {
    bus.read8(IE_ADDR) & bus.read8(IF_ADDR) & 0x1F
}

impl Cpu {
    /// Dispatch the highest-priority pending interrupt, if IME allows.
    ///
    /// Runs only at an instruction boundary. Returns the T-cycles taken,
    /// or `None` when nothing was dispatched.
    pub(super) fn try_dispatch<B: Bus>(&mut self, bus: &mut B) -> Option<u32> {
        if !self.ime.enabled() {
            return None;
        }
        let pending = pending(bus);
        let interrupt = Interrupt::highest(pending)?;

        self.ime.disable();
        let pc = self.regs.pc;
        stack::push(&mut self.regs.sp, bus, pc);
        let flags = bus.read8(IF_ADDR);
        bus.write8(IF_ADDR, flags & !interrupt.bit());
        self.regs.pc = interrupt.vector();

        log::debug!(
            "dispatch {:?} -> {:04X} (pc={:04X} sp={:04X} if={:02X} ie={:02X})",
            interrupt,
            interrupt.vector(),
            pc,
            self.regs.sp,
            flags,
            bus.read8(IE_ADDR),
        );

        bus.tick(DISPATCH_CYCLES);
        Some(DISPATCH_CYCLES)
    }
}
