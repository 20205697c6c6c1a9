use super::{ImeChange, MicroOp, Slot};
use crate::cpu::alu::AluInputs;
use crate::cpu::{stack, Bus, Cpu};
use crate::opcode::PointerStep;

impl Cpu {
    /// Run one micro-op of the current opcode against the registers and
    /// bus. Returns its cost in M-cycles.
    pub(crate) fn run_micro<B: Bus>(&mut self, op: MicroOp, bus: &mut B) -> u32 {
        match op {
            MicroOp::ReadImm(slot) => {
                let value = bus.read8(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.current.set(slot, value as u16);
            }
            MicroOp::MergeBytes(slot) => {
                let lo = self.current.get(Slot::Lo) as u8;
                let hi = self.current.get(Slot::Hi) as u8;
                self.current.set(slot, u16::from_le_bytes([lo, hi]));
            }
            MicroOp::ReadReg8(reg, slot) => {
                let value = self.regs.get8(reg);
                self.current.set(slot, value as u16);
            }
            MicroOp::WriteReg8(reg, slot) => {
                let value = self.current.get(slot) as u8;
                self.regs.set8(reg, value);
            }
            MicroOp::ReadReg16(reg, slot) => {
                let value = self.regs.get16(reg);
                self.current.set(slot, value);
            }
            MicroOp::WriteReg16(reg, slot) => {
                let value = self.current.get(slot);
                self.regs.set16(reg, value);
            }
            MicroOp::LoadConst(value, slot) => self.current.set(slot, value),
            MicroOp::HighPage(slot) => {
                let low = self.current.get(slot) & 0x00FF;
                self.current.set(slot, 0xFF00 | low);
            }
            MicroOp::StepReg16(reg, step) => {
                let value = self.regs.get16(reg);
                let next = match step {
                    PointerStep::Increment => value.wrapping_add(1),
                    PointerStep::Decrement => value.wrapping_sub(1),
                };
                self.regs.set16(reg, next);
            }
            MicroOp::ReadMem(slot) => {
                let addr = self.current.get(Slot::Addr);
                let value = bus.read8(addr);
                self.current.set(slot, value as u16);
            }
            MicroOp::WriteMem(slot) => {
                let addr = self.current.get(Slot::Addr);
                bus.write8(addr, self.current.get(slot) as u8);
            }
            MicroOp::WriteMemHigh(slot) => {
                let addr = self.current.get(Slot::Addr).wrapping_add(1);
                bus.write8(addr, (self.current.get(slot) >> 8) as u8);
            }
            MicroOp::Alu(alu) => {
                let x = self.current.get(Slot::Dst);
                let y = self.current.get(Slot::Src);
                let flags_in = self.regs.f;
                let result = alu.apply(x, y, flags_in);
                self.current.set(Slot::Dst, result);
                self.current.alu = Some(AluInputs {
                    x,
                    y,
                    flags_in,
                    result,
                });
            }
            MicroOp::Condition(cond) => {
                if !cond.holds(&self.regs) {
                    self.current.taken = false;
                    self.current.queue.kill();
                }
            }
            MicroOp::Push(slot) => {
                let value = self.current.get(slot);
                stack::push(&mut self.regs.sp, bus, value);
            }
            MicroOp::Pop(slot) => {
                let value = stack::pop(&mut self.regs.sp, bus);
                self.current.set(slot, value);
            }
            MicroOp::Jump(slot) => self.regs.pc = self.current.get(slot),
            MicroOp::JumpRelative(slot) => {
                let offset = self.current.get(slot) as u8 as i8;
                self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
            }
            MicroOp::Internal => {}
            MicroOp::Ime(change) => match change {
                ImeChange::Disable => self.ime.disable(),
                ImeChange::EnableDelayed => self.ime.request_enable(),
                ImeChange::EnableNow => self.ime.enable_now(),
            },
            MicroOp::Halt => self.current.halt = true,
            MicroOp::Stop => {
                // The byte after STOP is skipped without being read.
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.current.stop = true;
            }
        }
        op.m_cycles()
    }
}
