use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use super::schema::RawOperand;
use crate::cpu::{Flag, Reg16, Reg8, Registers};

/// Instruction mnemonics present in the opcode table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mnemonic {
    Adc,
    Add,
    And,
    Bit,
    Call,
    Ccf,
    Cp,
    Cpl,
    Daa,
    Dec,
    Di,
    Ei,
    Halt,
    Inc,
    Jp,
    Jr,
    Ld,
    Ldh,
    Nop,
    Or,
    Pop,
    Prefix,
    Push,
    Res,
    Ret,
    Reti,
    Rl,
    Rla,
    Rlc,
    Rlca,
    Rr,
    Rra,
    Rrc,
    Rrca,
    Rst,
    Sbc,
    Scf,
    Set,
    Sla,
    Sra,
    Srl,
    Stop,
    Sub,
    Swap,
    Xor,
}

impl Mnemonic {
    pub fn as_str(self) -> &'static str {
        match self {
            Mnemonic::Adc => "ADC",
            Mnemonic::Add => "ADD",
            Mnemonic::And => "AND",
            Mnemonic::Bit => "BIT",
            Mnemonic::Call => "CALL",
            Mnemonic::Ccf => "CCF",
            Mnemonic::Cp => "CP",
            Mnemonic::Cpl => "CPL",
            Mnemonic::Daa => "DAA",
            Mnemonic::Dec => "DEC",
            Mnemonic::Di => "DI",
            Mnemonic::Ei => "EI",
            Mnemonic::Halt => "HALT",
            Mnemonic::Inc => "INC",
            Mnemonic::Jp => "JP",
            Mnemonic::Jr => "JR",
            Mnemonic::Ld => "LD",
            Mnemonic::Ldh => "LDH",
            Mnemonic::Nop => "NOP",
            Mnemonic::Or => "OR",
            Mnemonic::Pop => "POP",
            Mnemonic::Prefix => "PREFIX",
            Mnemonic::Push => "PUSH",
            Mnemonic::Res => "RES",
            Mnemonic::Ret => "RET",
            Mnemonic::Reti => "RETI",
            Mnemonic::Rl => "RL",
            Mnemonic::Rla => "RLA",
            Mnemonic::Rlc => "RLC",
            Mnemonic::Rlca => "RLCA",
            Mnemonic::Rr => "RR",
            Mnemonic::Rra => "RRA",
            Mnemonic::Rrc => "RRC",
            Mnemonic::Rrca => "RRCA",
            Mnemonic::Rst => "RST",
            Mnemonic::Sbc => "SBC",
            Mnemonic::Scf => "SCF",
            Mnemonic::Set => "SET",
            Mnemonic::Sla => "SLA",
            Mnemonic::Sra => "SRA",
            Mnemonic::Srl => "SRL",
            Mnemonic::Stop => "STOP",
            Mnemonic::Sub => "SUB",
            Mnemonic::Swap => "SWAP",
            Mnemonic::Xor => "XOR",
        }
    }

    /// Branches whose first operand may be a flag condition.
    fn takes_condition(self) -> bool {
        matches!(
            self,
            Mnemonic::Jp | Mnemonic::Jr | Mnemonic::Call | Mnemonic::Ret
        )
    }
}

impl FromStr for Mnemonic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "ADC" => Mnemonic::Adc,
            "ADD" => Mnemonic::Add,
            "AND" => Mnemonic::And,
            "BIT" => Mnemonic::Bit,
            "CALL" => Mnemonic::Call,
            "CCF" => Mnemonic::Ccf,
            "CP" => Mnemonic::Cp,
            "CPL" => Mnemonic::Cpl,
            "DAA" => Mnemonic::Daa,
            "DEC" => Mnemonic::Dec,
            "DI" => Mnemonic::Di,
            "EI" => Mnemonic::Ei,
            "HALT" => Mnemonic::Halt,
            "INC" => Mnemonic::Inc,
            "JP" => Mnemonic::Jp,
            "JR" => Mnemonic::Jr,
            "LD" => Mnemonic::Ld,
            "LDH" => Mnemonic::Ldh,
            "NOP" => Mnemonic::Nop,
            "OR" => Mnemonic::Or,
            "POP" => Mnemonic::Pop,
            "PREFIX" => Mnemonic::Prefix,
            "PUSH" => Mnemonic::Push,
            "RES" => Mnemonic::Res,
            "RET" => Mnemonic::Ret,
            "RETI" => Mnemonic::Reti,
            "RL" => Mnemonic::Rl,
            "RLA" => Mnemonic::Rla,
            "RLC" => Mnemonic::Rlc,
            "RLCA" => Mnemonic::Rlca,
            "RR" => Mnemonic::Rr,
            "RRA" => Mnemonic::Rra,
            "RRC" => Mnemonic::Rrc,
            "RRCA" => Mnemonic::Rrca,
            "RST" => Mnemonic::Rst,
            "SBC" => Mnemonic::Sbc,
            "SCF" => Mnemonic::Scf,
            "SET" => Mnemonic::Set,
            "SLA" => Mnemonic::Sla,
            "SRA" => Mnemonic::Sra,
            "SRL" => Mnemonic::Srl,
            "STOP" => Mnemonic::Stop,
            "SUB" => Mnemonic::Sub,
            "SWAP" => Mnemonic::Swap,
            "XOR" => Mnemonic::Xor,
            other => bail!("unknown mnemonic {other:?}"),
        })
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch condition on the Z or C flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

impl Condition {
    #[inline]
    pub fn holds(self, regs: &Registers) -> bool {
        match self {
            Condition::NotZero => !regs.flag(Flag::Z),
            Condition::Zero => regs.flag(Flag::Z),
            Condition::NotCarry => !regs.flag(Flag::C),
            Condition::Carry => regs.flag(Flag::C),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Condition::NotZero => "NZ",
            Condition::Zero => "Z",
            Condition::NotCarry => "NC",
            Condition::Carry => "C",
        }
    }
}

/// Post-access adjustment of the pointer register in `(HL+)` / `(HL-)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerStep {
    Increment,
    Decrement,
}

/// Operand descriptor resolved from the table at load time.
///
/// Memory forms carry only the tag of where their address comes from;
/// the address itself is resolved against the live registers on every
/// execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg8(Reg8),
    Reg16(Reg16),
    /// `n8`
    Imm8,
    /// `n16`
    Imm16,
    /// `e8`, sign-extended when used.
    SignedImm8,
    /// `a16` used as a value (jump/call target).
    Address16,
    /// `(a16)`
    Absolute,
    /// `(a8)`, relative to 0xFF00.
    HighAbsolute,
    /// `(BC)`, `(DE)`, `(HL)`, `(HL+)`, `(HL-)`
    Indirect {
        reg: Reg16,
        step: Option<PointerStep>,
    },
    /// `(C)`, relative to 0xFF00.
    HighIndirectC,
    Condition(Condition),
    /// Bit index of BIT/RES/SET.
    Bit(u8),
    /// RST target.
    Vector(u16),
}

impl Operand {
    /// Resolve a raw table operand.
    ///
    /// `C` is ambiguous: it is the carry condition when it is the first of
    /// several operands of a branch (or the only operand of `RET`), the
    /// register otherwise.
    pub fn parse(raw: &RawOperand, mnemonic: Mnemonic, index: usize, count: usize) -> Result<Self> {
        let name = raw.name.as_str();
        let memory = !raw.immediate;
        let step = match (raw.increment, raw.decrement) {
            (true, true) => bail!("operand {name} both increments and decrements"),
            (true, false) => Some(PointerStep::Increment),
            (false, true) => Some(PointerStep::Decrement),
            (false, false) => None,
        };
        let branch_condition = mnemonic.takes_condition()
            && index == 0
            && (count == 2 || mnemonic == Mnemonic::Ret);

        let operand = match name {
            "C" if memory => Operand::HighIndirectC,
            "C" if branch_condition => Operand::Condition(Condition::Carry),
            "NZ" => Operand::Condition(Condition::NotZero),
            "Z" => Operand::Condition(Condition::Zero),
            "NC" => Operand::Condition(Condition::NotCarry),
            "A" => Operand::Reg8(Reg8::A),
            "B" => Operand::Reg8(Reg8::B),
            "C" => Operand::Reg8(Reg8::C),
            "D" => Operand::Reg8(Reg8::D),
            "E" => Operand::Reg8(Reg8::E),
            "H" => Operand::Reg8(Reg8::H),
            "L" => Operand::Reg8(Reg8::L),
            "BC" | "DE" | "HL" if memory => Operand::Indirect {
                reg: match name {
                    "BC" => Reg16::BC,
                    "DE" => Reg16::DE,
                    _ => Reg16::HL,
                },
                step,
            },
            "AF" => Operand::Reg16(Reg16::AF),
            "BC" => Operand::Reg16(Reg16::BC),
            "DE" => Operand::Reg16(Reg16::DE),
            "HL" => Operand::Reg16(Reg16::HL),
            "SP" => Operand::Reg16(Reg16::SP),
            "n8" => Operand::Imm8,
            "n16" => Operand::Imm16,
            "e8" => Operand::SignedImm8,
            "a8" if memory => Operand::HighAbsolute,
            "a16" if memory => Operand::Absolute,
            "a16" => Operand::Address16,
            _ => {
                if let Some(hex) = name.strip_prefix('$') {
                    let vector = u16::from_str_radix(hex, 16)?;
                    if vector > 0x38 || vector % 8 != 0 {
                        bail!("invalid restart vector {name}");
                    }
                    Operand::Vector(vector)
                } else if let Ok(bit) = name.parse::<u8>() {
                    if bit > 7 {
                        bail!("bit index {bit} out of range");
                    }
                    Operand::Bit(bit)
                } else {
                    bail!("unknown operand {name:?}");
                }
            }
        };

        if step.is_some() && !matches!(operand, Operand::Indirect { .. }) {
            bail!("operand {name} cannot step");
        }
        if let Some(bytes) = raw.bytes {
            if bytes != operand.immediate_bytes() {
                bail!("operand {name} declares {bytes} bytes");
            }
        }
        Ok(operand)
    }

    /// Instruction-stream bytes this operand consumes.
    pub fn immediate_bytes(&self) -> u8 {
        match self {
            Operand::Imm8 | Operand::SignedImm8 | Operand::HighAbsolute => 1,
            Operand::Imm16 | Operand::Address16 | Operand::Absolute => 2,
            _ => 0,
        }
    }

    /// Whether this operand names a memory cell rather than a value.
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Operand::Absolute
                | Operand::HighAbsolute
                | Operand::Indirect { .. }
                | Operand::HighIndirectC
        )
    }

    pub fn is_wide(&self) -> bool {
        matches!(
            self,
            Operand::Reg16(_) | Operand::Imm16 | Operand::Address16
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg8(reg) => write!(f, "{reg:?}"),
            Operand::Reg16(reg) => write!(f, "{reg:?}"),
            Operand::Imm8 => f.write_str("n8"),
            Operand::Imm16 => f.write_str("n16"),
            Operand::SignedImm8 => f.write_str("e8"),
            Operand::Address16 => f.write_str("a16"),
            Operand::Absolute => f.write_str("(a16)"),
            Operand::HighAbsolute => f.write_str("(a8)"),
            Operand::Indirect { reg, step } => match step {
                None => write!(f, "({reg:?})"),
                Some(PointerStep::Increment) => write!(f, "({reg:?}+)"),
                Some(PointerStep::Decrement) => write!(f, "({reg:?}-)"),
            },
            Operand::HighIndirectC => f.write_str("(C)"),
            Operand::Condition(cond) => f.write_str(cond.as_str()),
            Operand::Bit(bit) => write!(f, "{bit}"),
            Operand::Vector(vector) => write!(f, "${vector:02X}"),
        }
    }
}
