use super::flags::{self, FlagOutcome, FlagRule};
use super::interrupts;
use super::{Bus, Cpu, CpuState};
use crate::memory::JOYP_ADDR;
use crate::micro::{Opcode, Schedule};
use crate::opcode::{OpcodeTable, PREFIX_BYTE};

/// T-cycles of one idle step in HALT or STOP.
const IDLE_CYCLES: u32 = 4;

impl Cpu {
    /// Advance by one micro-op and return the T-cycles it took.
    ///
    /// At an instruction boundary this is either an interrupt dispatch or
    /// the opcode fetch; in HALT/STOP it is one idle M-cycle. Register-only
    /// micro-ops take zero cycles.
    pub fn step_micro<B: Bus>(&mut self, table: &OpcodeTable, bus: &mut B) -> u32 {
        let cycles = match self.state {
            CpuState::Fetch => self.fetch(table, bus),
            CpuState::Execute => self.execute_next(bus),
            CpuState::Halted => self.idle_halted(bus),
            CpuState::Stopped => self.idle_stopped(bus),
        };
        self.cycles += u64::from(cycles);
        cycles
    }

    /// Execute until the current instruction completes and return the
    /// T-cycles taken. A dispatch or idle step counts as one "instruction"
    /// here.
    pub fn step<B: Bus>(&mut self, table: &OpcodeTable, bus: &mut B) -> u32 {
        let mut cycles = self.step_micro(table, bus);
        while self.state == CpuState::Execute {
            cycles += self.step_micro(table, bus);
        }
        cycles
    }

    fn fetch<B: Bus>(&mut self, table: &OpcodeTable, bus: &mut B) -> u32 {
        if let Some(cycles) = self.try_dispatch(bus) {
            return cycles;
        }

        self.fetched_at = self.regs.pc;
        let code = self.read_opcode(bus);
        let (info, fetch_cycles) = if code == PREFIX_BYTE {
            let sub = self.read_opcode(bus);
            (table.prefixed(sub), 2)
        } else {
            (table.unprefixed(code), 1)
        };

        self.current = match info {
            Some(info) => {
                log::trace!("{:04X}: {}", self.fetched_at, info);
                Opcode::new(&info.schedule, fetch_cycles)
            }
            None => {
                log::warn!(
                    "unmapped opcode {:02X} at {:04X}, skipping",
                    code,
                    self.fetched_at
                );
                Opcode::new(&Schedule::skip(fetch_cycles), fetch_cycles)
            }
        };
        self.state = CpuState::Execute;

        let cycles = fetch_cycles * 4;
        bus.tick(cycles);
        if self.current.is_done() {
            self.finish(bus);
        }
        cycles
    }

    fn read_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let byte = bus.read8(self.regs.pc);
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        byte
    }

    fn execute_next<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let Some(op) = self.current.queue.pop_front() else {
            self.finish(bus);
            return 0;
        };
        let m_cycles = self.run_micro(op, bus);
        self.current.elapsed += m_cycles;
        let cycles = m_cycles * 4;
        if cycles > 0 {
            bus.tick(cycles);
        }
        if self.current.is_done() {
            self.finish(bus);
        }
        cycles
    }

    /// Queue drained: apply flags, advance the EI delay, pick the next state.
    fn finish<B: Bus>(&mut self, bus: &mut B) {
        let op = self.current;
        debug_assert_eq!(
            op.elapsed * 4,
            op.expected_cycles(),
            "cycle mismatch for opcode at {:04X}",
            self.fetched_at
        );

        if op.policy.has_effects() {
            let outcome = match op.rule {
                Some(FlagRule::Alu(alu)) => op
                    .alu
                    .map(|inputs| flags::outcome(alu, &inputs))
                    .unwrap_or_default(),
                Some(FlagRule::Restore) => FlagOutcome::from_bits(self.regs.f),
                None => FlagOutcome::default(),
            };
            self.regs.f = flags::apply(&op.policy, &outcome, self.regs.f);
        }

        self.ime.instruction_done();
        self.instructions += 1;

        self.state = if op.stop {
            log::debug!("STOP at {:04X}", self.fetched_at);
            CpuState::Stopped
        } else if op.halt {
            self.enter_halt(bus)
        } else {
            CpuState::Fetch
        };
    }

    fn enter_halt<B: Bus>(&mut self, bus: &mut B) -> CpuState {
        if interrupts::pending(bus) != 0 {
            if !self.ime.enabled() {
                // HALT bug: no halt, and the next opcode byte is read twice.
                self.halt_bug = true;
            }
            // With IME set the pending interrupt is dispatched at the next
            // fetch, with no idle step.
            return CpuState::Fetch;
        }
        log::debug!("HALT at {:04X}", self.fetched_at);
        CpuState::Halted
    }

    fn idle_halted<B: Bus>(&mut self, bus: &mut B) -> u32 {
        bus.tick(IDLE_CYCLES);
        if interrupts::pending(bus) != 0 {
            log::debug!("leaving HALT (pc={:04X})", self.regs.pc);
            self.state = CpuState::Fetch;
        }
        IDLE_CYCLES
    }

    /// Timers stay frozen while stopped, so the bus is not ticked.
    fn idle_stopped<B: Bus>(&mut self, bus: &mut B) -> u32 {
        if bus.read8(JOYP_ADDR) & 0x0F != 0x0F {
            log::debug!("leaving STOP (pc={:04X})", self.regs.pc);
            self.state = CpuState::Fetch;
        }
        IDLE_CYCLES
    }
}
