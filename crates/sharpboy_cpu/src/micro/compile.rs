//! Opcode-table entry → micro-op template.

use anyhow::{bail, ensure, Result};

use super::{ImeChange, MicroOp, MicroQueue, Schedule, Slot, QUEUE_CAPACITY};
use crate::cpu::alu::{AccumOp, AluOp, ArithOp, BitOp, ShiftOp, StepOp, WideOp};
use crate::cpu::flags::{FlagPolicy, FlagRule};
use crate::cpu::{Reg16, Reg8};
use crate::opcode::{Mnemonic, Operand};

/// Compile one table entry into its execution schedule.
///
/// `fetch_cycles` is the number of opcode bytes read before the template
/// starts (1, or 2 behind the CB prefix). Internal delays are inserted so
/// the template's total matches the declared cycle counts exactly.
pub fn compile(
    mnemonic: Mnemonic,
    operands: &[Operand],
    cycles: &[u32],
    policy: FlagPolicy,
    fetch_cycles: u32,
) -> Result<Schedule> {
    let mut builder = Builder::default();
    builder.build(mnemonic, operands)?;
    let Builder { ops, alu, restore } = builder;

    let conditional = ops.iter().any(|op| matches!(op, MicroOp::Condition(_)));
    match (conditional, cycles.len()) {
        (false, 1) | (true, 2) => {}
        (false, n) => bail!("unconditional opcode declares {n} cycle counts"),
        (true, n) => bail!("conditional opcode declares {n} cycle counts"),
    }
    for &count in cycles {
        ensure!(count > 0 && count % 4 == 0, "cycle count {count} is not whole M-cycles");
    }
    let taken = cycles[0];
    let not_taken = cycles.get(1).copied().unwrap_or(taken);
    ensure!(not_taken <= taken, "not-taken cycles {not_taken} exceed taken {taken}");

    let padded = match ops.iter().position(|op| matches!(op, MicroOp::Condition(_))) {
        None => pad(&ops, fetch_cycles, taken / 4)?,
        Some(split) => {
            let mut padded = pad(&ops[..split], fetch_cycles, not_taken / 4)?;
            padded.push(ops[split]);
            padded.extend(pad(&ops[split + 1..], 0, (taken - not_taken) / 4)?);
            padded
        }
    };

    let Some(template) = MicroQueue::from_slice(&padded) else {
        bail!(
            "template of {} micro-ops exceeds queue capacity {QUEUE_CAPACITY}",
            padded.len()
        );
    };

    let rule = if restore {
        Some(FlagRule::Restore)
    } else {
        alu.map(FlagRule::Alu)
    };
    if policy.has_computed() && rule.is_none() {
        bail!("{mnemonic} declares computed flags but has no flag formula");
    }

    Ok(Schedule {
        template,
        policy,
        rule,
        cycles: [taken, not_taken],
    })
}

/// Insert `Internal` delays so `ops` plus `spent` M-cycles reach `target`.
///
/// Delays go ahead of the first committing step (push, memory write,
/// jump), otherwise at the end.
fn pad(ops: &[MicroOp], spent: u32, target: u32) -> Result<Vec<MicroOp>> {
    let cost = spent + ops.iter().map(|op| op.m_cycles()).sum::<u32>();
    if cost > target {
        bail!("micro-ops take {cost} M-cycles but {target} are declared");
    }
    let at = ops.iter().position(|op| op.is_commit()).unwrap_or(ops.len());
    let mut padded = Vec::with_capacity(ops.len() + (target - cost) as usize);
    padded.extend_from_slice(&ops[..at]);
    padded.extend(std::iter::repeat(MicroOp::Internal).take((target - cost) as usize));
    padded.extend_from_slice(&ops[at..]);
    Ok(padded)
}

#[derive(Default)]
struct Builder {
    ops: Vec<MicroOp>,
    alu: Option<AluOp>,
    /// `POP AF`: flags come from the popped byte.
    restore: bool,
}

impl Builder {
    fn push(&mut self, op: MicroOp) {
        self.ops.push(op);
    }

    fn alu(&mut self, op: AluOp) {
        self.alu = Some(op);
        self.push(MicroOp::Alu(op));
    }

    fn build(&mut self, mnemonic: Mnemonic, operands: &[Operand]) -> Result<()> {
        use Mnemonic as M;

        match (mnemonic, operands) {
            (M::Nop | M::Prefix, []) => {}

            (
                M::Ld,
                [Operand::Reg16(Reg16::HL), Operand::Reg16(Reg16::SP), Operand::SignedImm8],
            ) => {
                self.push(MicroOp::ReadReg16(Reg16::SP, Slot::Dst));
                self.push(MicroOp::ReadImm(Slot::Src));
                self.alu(AluOp::Wide(WideOp::AddSigned));
                self.push(MicroOp::WriteReg16(Reg16::HL, Slot::Dst));
            }
            (M::Ld | M::Ldh, [dst, src]) => {
                ensure!(
                    !(dst.is_memory() && src.is_memory()),
                    "memory-to-memory load"
                );
                self.stage(*src, Slot::Src)?;
                self.commit(*dst, Slot::Src)?;
                if dst.is_memory() && src.is_wide() {
                    self.push(MicroOp::WriteMemHigh(Slot::Src));
                }
            }

            (M::Push, [Operand::Reg16(reg)]) => {
                self.push(MicroOp::ReadReg16(*reg, Slot::Dst));
                self.push(MicroOp::Push(Slot::Dst));
            }
            (M::Pop, [Operand::Reg16(reg)]) => {
                self.push(MicroOp::Pop(Slot::Dst));
                self.push(MicroOp::WriteReg16(*reg, Slot::Dst));
                self.restore = *reg == Reg16::AF;
            }

            (M::Inc | M::Dec, [Operand::Reg16(reg)]) => {
                let step = if mnemonic == M::Inc {
                    StepOp::Inc16
                } else {
                    StepOp::Dec16
                };
                self.push(MicroOp::ReadReg16(*reg, Slot::Dst));
                self.alu(AluOp::Step(step));
                self.push(MicroOp::WriteReg16(*reg, Slot::Dst));
            }
            (M::Inc | M::Dec, [target]) => {
                let step = if mnemonic == M::Inc {
                    StepOp::Inc8
                } else {
                    StepOp::Dec8
                };
                self.modify(*target, AluOp::Step(step))?;
            }

            (M::Add, [Operand::Reg16(Reg16::HL), Operand::Reg16(reg)]) => {
                self.push(MicroOp::ReadReg16(Reg16::HL, Slot::Dst));
                self.push(MicroOp::ReadReg16(*reg, Slot::Src));
                self.alu(AluOp::Wide(WideOp::AddHl));
                self.push(MicroOp::WriteReg16(Reg16::HL, Slot::Dst));
            }
            (M::Add, [Operand::Reg16(Reg16::SP), Operand::SignedImm8]) => {
                self.push(MicroOp::ReadReg16(Reg16::SP, Slot::Dst));
                self.push(MicroOp::ReadImm(Slot::Src));
                self.alu(AluOp::Wide(WideOp::AddSigned));
                self.push(MicroOp::WriteReg16(Reg16::SP, Slot::Dst));
            }
            (
                M::Add | M::Adc | M::Sub | M::Sbc | M::And | M::Xor | M::Or | M::Cp,
                [Operand::Reg8(Reg8::A), src],
            ) => {
                let op = match mnemonic {
                    M::Add => ArithOp::Add,
                    M::Adc => ArithOp::Adc,
                    M::Sub => ArithOp::Sub,
                    M::Sbc => ArithOp::Sbc,
                    M::And => ArithOp::And,
                    M::Xor => ArithOp::Xor,
                    M::Or => ArithOp::Or,
                    _ => ArithOp::Cp,
                };
                self.stage(*src, Slot::Src)?;
                self.push(MicroOp::ReadReg8(Reg8::A, Slot::Dst));
                self.alu(AluOp::Arith(op));
                if op != ArithOp::Cp {
                    self.push(MicroOp::WriteReg8(Reg8::A, Slot::Dst));
                }
            }

            (M::Jp, [Operand::Reg16(Reg16::HL)]) => {
                self.push(MicroOp::ReadReg16(Reg16::HL, Slot::Addr));
                self.push(MicroOp::Jump(Slot::Addr));
            }
            (M::Jp, [Operand::Address16]) => {
                self.stage(Operand::Address16, Slot::Addr)?;
                self.push(MicroOp::Jump(Slot::Addr));
            }
            (M::Jp, [Operand::Condition(cond), Operand::Address16]) => {
                self.stage(Operand::Address16, Slot::Addr)?;
                self.push(MicroOp::Condition(*cond));
                self.push(MicroOp::Jump(Slot::Addr));
            }
            (M::Jr, [Operand::SignedImm8]) => {
                self.push(MicroOp::ReadImm(Slot::Src));
                self.push(MicroOp::JumpRelative(Slot::Src));
            }
            (M::Jr, [Operand::Condition(cond), Operand::SignedImm8]) => {
                self.push(MicroOp::ReadImm(Slot::Src));
                self.push(MicroOp::Condition(*cond));
                self.push(MicroOp::JumpRelative(Slot::Src));
            }
            (M::Call, [Operand::Address16]) => {
                self.stage(Operand::Address16, Slot::Addr)?;
                self.call();
            }
            (M::Call, [Operand::Condition(cond), Operand::Address16]) => {
                self.stage(Operand::Address16, Slot::Addr)?;
                self.push(MicroOp::Condition(*cond));
                self.call();
            }
            (M::Ret, []) => {
                self.push(MicroOp::Pop(Slot::Addr));
                self.push(MicroOp::Jump(Slot::Addr));
            }
            (M::Ret, [Operand::Condition(cond)]) => {
                self.push(MicroOp::Condition(*cond));
                self.push(MicroOp::Pop(Slot::Addr));
                self.push(MicroOp::Jump(Slot::Addr));
            }
            (M::Reti, []) => {
                self.push(MicroOp::Pop(Slot::Addr));
                self.push(MicroOp::Ime(ImeChange::EnableNow));
                self.push(MicroOp::Jump(Slot::Addr));
            }
            (M::Rst, [Operand::Vector(vector)]) => {
                self.push(MicroOp::LoadConst(*vector, Slot::Addr));
                self.call();
            }

            (M::Di, []) => self.push(MicroOp::Ime(ImeChange::Disable)),
            (M::Ei, []) => self.push(MicroOp::Ime(ImeChange::EnableDelayed)),
            (M::Halt, []) => self.push(MicroOp::Halt),
            (M::Stop, [] | [Operand::Imm8]) => self.push(MicroOp::Stop),

            (M::Daa | M::Cpl, []) => {
                let op = if mnemonic == M::Daa {
                    AccumOp::Daa
                } else {
                    AccumOp::Cpl
                };
                self.modify(Operand::Reg8(Reg8::A), AluOp::Accum(op))?;
            }
            (M::Scf, []) => self.alu(AluOp::Accum(AccumOp::Scf)),
            (M::Ccf, []) => self.alu(AluOp::Accum(AccumOp::Ccf)),

            (M::Rlca | M::Rla | M::Rrca | M::Rra, []) => {
                let op = match mnemonic {
                    M::Rlca => ShiftOp::Rlc,
                    M::Rla => ShiftOp::Rl,
                    M::Rrca => ShiftOp::Rrc,
                    _ => ShiftOp::Rr,
                };
                self.modify(
                    Operand::Reg8(Reg8::A),
                    AluOp::Shift {
                        op,
                        accumulator: true,
                    },
                )?;
            }
            (
                M::Rlc | M::Rrc | M::Rl | M::Rr | M::Sla | M::Sra | M::Swap | M::Srl,
                [target],
            ) => {
                let op = match mnemonic {
                    M::Rlc => ShiftOp::Rlc,
                    M::Rrc => ShiftOp::Rrc,
                    M::Rl => ShiftOp::Rl,
                    M::Rr => ShiftOp::Rr,
                    M::Sla => ShiftOp::Sla,
                    M::Sra => ShiftOp::Sra,
                    M::Swap => ShiftOp::Swap,
                    _ => ShiftOp::Srl,
                };
                self.modify(
                    *target,
                    AluOp::Shift {
                        op,
                        accumulator: false,
                    },
                )?;
            }
            (M::Bit, [Operand::Bit(index), target]) => {
                self.stage(*target, Slot::Dst)?;
                self.alu(AluOp::Bit {
                    op: BitOp::Test,
                    index: *index,
                });
            }
            (M::Res | M::Set, [Operand::Bit(index), target]) => {
                let op = if mnemonic == M::Res {
                    BitOp::Reset
                } else {
                    BitOp::Set
                };
                self.modify(*target, AluOp::Bit { op, index: *index })?;
            }

            _ => bail!(
                "no micro-op template for {mnemonic} with operands {operands:?}"
            ),
        }
        Ok(())
    }

    /// Push the return address (PC after the operands) and jump to `Addr`.
    fn call(&mut self) {
        self.push(MicroOp::ReadReg16(Reg16::PC, Slot::Dst));
        self.push(MicroOp::Push(Slot::Dst));
        self.push(MicroOp::Jump(Slot::Addr));
    }

    /// Latch the effective address of a memory operand into `Addr`.
    fn address(&mut self, operand: Operand) -> Result<()> {
        match operand {
            Operand::Indirect { reg, step } => {
                self.push(MicroOp::ReadReg16(reg, Slot::Addr));
                if let Some(step) = step {
                    self.push(MicroOp::StepReg16(reg, step));
                }
            }
            Operand::HighIndirectC => {
                self.push(MicroOp::ReadReg8(Reg8::C, Slot::Addr));
                self.push(MicroOp::HighPage(Slot::Addr));
            }
            Operand::Absolute => {
                self.push(MicroOp::ReadImm(Slot::Lo));
                self.push(MicroOp::ReadImm(Slot::Hi));
                self.push(MicroOp::MergeBytes(Slot::Addr));
            }
            Operand::HighAbsolute => {
                self.push(MicroOp::ReadImm(Slot::Addr));
                self.push(MicroOp::HighPage(Slot::Addr));
            }
            other => bail!("operand {other} has no address"),
        }
        Ok(())
    }

    /// Load the value an operand names into `slot`.
    fn stage(&mut self, operand: Operand, slot: Slot) -> Result<()> {
        match operand {
            Operand::Reg8(reg) => self.push(MicroOp::ReadReg8(reg, slot)),
            Operand::Reg16(reg) => self.push(MicroOp::ReadReg16(reg, slot)),
            Operand::Imm8 | Operand::SignedImm8 => self.push(MicroOp::ReadImm(slot)),
            Operand::Imm16 | Operand::Address16 => {
                self.push(MicroOp::ReadImm(Slot::Lo));
                self.push(MicroOp::ReadImm(Slot::Hi));
                self.push(MicroOp::MergeBytes(slot));
            }
            memory if memory.is_memory() => {
                self.address(memory)?;
                self.push(MicroOp::ReadMem(slot));
            }
            other => bail!("operand {other} is not a value"),
        }
        Ok(())
    }

    /// Store `slot` into the location an operand names.
    fn commit(&mut self, operand: Operand, slot: Slot) -> Result<()> {
        match operand {
            Operand::Reg8(reg) => self.push(MicroOp::WriteReg8(reg, slot)),
            Operand::Reg16(reg) => self.push(MicroOp::WriteReg16(reg, slot)),
            memory if memory.is_memory() => {
                self.address(memory)?;
                self.push(MicroOp::WriteMem(slot));
            }
            other => bail!("operand {other} is not writable"),
        }
        Ok(())
    }

    /// Read-modify-write through `Dst`; memory operands latch their
    /// address once.
    fn modify(&mut self, target: Operand, op: AluOp) -> Result<()> {
        match target {
            Operand::Reg8(reg) => {
                self.push(MicroOp::ReadReg8(reg, Slot::Dst));
                self.alu(op);
                self.push(MicroOp::WriteReg8(reg, Slot::Dst));
            }
            memory if memory.is_memory() => {
                self.address(memory)?;
                self.push(MicroOp::ReadMem(Slot::Dst));
                self.alu(op);
                self.push(MicroOp::WriteMem(Slot::Dst));
            }
            other => bail!("operand {other} cannot be modified in place"),
        }
        Ok(())
    }
}
