//! Flag outcome formulas and per-opcode flag policy.
//!
//! Outcomes are computed from the operands an ALU step latched, then
//! reconciled against the four-slot policy declared in the opcode table.

use anyhow::{bail, Result};

use super::alu::{self, AccumOp, AluInputs, AluOp, ArithOp, BitOp, StepOp, WideOp};
use super::Flag;

/// Raw four-flag result of an operation, before policy is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagOutcome {
    pub z: bool,
    pub n: bool,
    pub h: bool,
    pub c: bool,
}

impl FlagOutcome {
    #[inline]
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Z => self.z,
            Flag::N => self.n,
            Flag::H => self.h,
            Flag::C => self.c,
        }
    }

    /// Unpack the high nibble of an F byte.
    pub fn from_bits(f: u8) -> Self {
        Self {
            z: f & Flag::Z.mask() != 0,
            n: f & Flag::N.mask() != 0,
            h: f & Flag::H.mask() != 0,
            c: f & Flag::C.mask() != 0,
        }
    }
}

/// How an opcode derives its computed flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagRule {
    /// Formula of the ALU step that ran.
    Alu(AluOp),
    /// `POP AF`: the popped low byte becomes F, low nibble masked.
    Restore,
}

/// What a single flag does after an instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlagEffect {
    Computed,
    Set,
    Clear,
    #[default]
    Unchanged,
}

/// Per-flag effects in Z, N, H, C order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagPolicy(pub [FlagEffect; 4]);

impl FlagPolicy {
    pub const UNCHANGED: FlagPolicy = FlagPolicy([FlagEffect::Unchanged; 4]);

    /// Parse one table entry (`"Z"`, `"0"`, `"1"`, `"-"`) for `flag`.
    ///
    /// A letter marks the flag as computed and must name its own slot.
    pub fn parse_effect(flag: Flag, raw: &str) -> Result<FlagEffect> {
        let letter = match flag {
            Flag::Z => "Z",
            Flag::N => "N",
            Flag::H => "H",
            Flag::C => "C",
        };
        Ok(match raw {
            "-" => FlagEffect::Unchanged,
            "0" => FlagEffect::Clear,
            "1" => FlagEffect::Set,
            other if other == letter => FlagEffect::Computed,
            other => bail!("invalid {letter} flag effect {other:?}"),
        })
    }

    #[inline]
    pub fn effect(&self, flag: Flag) -> FlagEffect {
        self.0[slot(flag)]
    }

    pub fn has_effects(&self) -> bool {
        self.0.iter().any(|e| *e != FlagEffect::Unchanged)
    }

    pub fn has_computed(&self) -> bool {
        self.0.contains(&FlagEffect::Computed)
    }
}

#[inline]
fn slot(flag: Flag) -> usize {
    match flag {
        Flag::Z => 0,
        Flag::N => 1,
        Flag::H => 2,
        Flag::C => 3,
    }
}

/// Compute the flag outcome of `op` from the operands it latched.
pub fn outcome(op: AluOp, inputs: &AluInputs) -> FlagOutcome {
    let AluInputs { x, y, flags_in, result } = *inputs;
    let carry = flags_in & Flag::C.mask() != 0;
    let cin = u16::from(carry);
    let zero = result as u8 == 0;

    match op {
        AluOp::Arith(arith) => {
            let (x, y) = (x & 0xFF, y & 0xFF);
            match arith {
                ArithOp::Add | ArithOp::Adc => {
                    let cin = if arith == ArithOp::Adc { cin } else { 0 };
                    FlagOutcome {
                        z: zero,
                        n: false,
                        h: (x & 0x0F) + (y & 0x0F) + cin > 0x0F,
                        c: x + y + cin > 0xFF,
                    }
                }
                ArithOp::Sub | ArithOp::Sbc | ArithOp::Cp => {
                    let cin = if arith == ArithOp::Sbc { cin } else { 0 };
                    // CP keeps A, so its result is the accumulator.
                    let z = if arith == ArithOp::Cp { x == y } else { zero };
                    FlagOutcome {
                        z,
                        n: true,
                        h: (x & 0x0F) < (y & 0x0F) + cin,
                        c: y + cin > x,
                    }
                }
                ArithOp::And => FlagOutcome { z: zero, n: false, h: true, c: false },
                ArithOp::Xor | ArithOp::Or => FlagOutcome { z: zero, ..Default::default() },
            }
        }
        AluOp::Step(step) => match step {
            StepOp::Inc8 => FlagOutcome {
                z: zero,
                n: false,
                h: x & 0x0F == 0x0F,
                c: carry,
            },
            StepOp::Dec8 => FlagOutcome {
                z: zero,
                n: true,
                h: x & 0x0F == 0x00,
                c: carry,
            },
            // 16-bit steps leave flags alone.
            StepOp::Inc16 | StepOp::Dec16 => FlagOutcome::from_bits(flags_in),
        },
        AluOp::Wide(wide) => match wide {
            WideOp::AddHl => FlagOutcome {
                z: flags_in & Flag::Z.mask() != 0,
                n: false,
                h: (x & 0x0FFF) + (y & 0x0FFF) > 0x0FFF,
                c: u32::from(x) + u32::from(y) > 0xFFFF,
            },
            // Half/carry come from the low byte, unsigned.
            WideOp::AddSigned => {
                let low = y & 0xFF;
                FlagOutcome {
                    z: false,
                    n: false,
                    h: (x & 0x0F) + (low & 0x0F) > 0x0F,
                    c: (x & 0xFF) + low > 0xFF,
                }
            }
        },
        AluOp::Shift { op, accumulator } => FlagOutcome {
            z: !accumulator && zero,
            n: false,
            h: false,
            c: alu::shifted_out(op, x as u8),
        },
        AluOp::Bit { op, index } => match op {
            BitOp::Test => FlagOutcome {
                z: (x as u8) & (1 << (index & 0x07)) == 0,
                n: false,
                h: true,
                c: carry,
            },
            BitOp::Reset | BitOp::Set => FlagOutcome::from_bits(flags_in),
        },
        AluOp::Accum(accum) => match accum {
            AccumOp::Daa => {
                let (value, c) = alu::daa(x as u8, flags_in);
                FlagOutcome {
                    z: value == 0,
                    n: flags_in & Flag::N.mask() != 0,
                    h: false,
                    c,
                }
            }
            AccumOp::Cpl => FlagOutcome {
                n: true,
                h: true,
                ..FlagOutcome::from_bits(flags_in)
            },
            AccumOp::Scf => FlagOutcome {
                n: false,
                h: false,
                c: true,
                ..FlagOutcome::from_bits(flags_in)
            },
            AccumOp::Ccf => FlagOutcome {
                n: false,
                h: false,
                c: !carry,
                ..FlagOutcome::from_bits(flags_in)
            },
        },
    }
}

/// Reconcile `outcome` with `policy` and return the new F byte.
///
/// The low nibble of the result is always zero.
pub fn apply(policy: &FlagPolicy, outcome: &FlagOutcome, f: u8) -> u8 {
    let mut next = f & 0xF0;
    for flag in Flag::ALL {
        let value = match policy.effect(flag) {
            FlagEffect::Computed => outcome.get(flag),
            FlagEffect::Set => true,
            FlagEffect::Clear => false,
            FlagEffect::Unchanged => continue,
        };
        if value {
            next |= flag.mask();
        } else {
            next &= !flag.mask();
        }
    }
    next
}
