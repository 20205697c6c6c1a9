use super::Flag;

/// 8-bit accumulator arithmetic and logic (`ADD A,x` .. `CP A,x`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

/// Increment/decrement of an 8-bit cell or a 16-bit pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOp {
    Inc8,
    Dec8,
    Inc16,
    Dec16,
}

/// 16-bit additions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WideOp {
    /// `ADD HL,rr`
    AddHl,
    /// `ADD SP,e8` and `LD HL,SP+e8`: signed 8-bit offset on a 16-bit base.
    AddSigned,
}

/// Rotates, shifts and nibble swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

/// Single-bit test/reset/set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOp {
    Test,
    Reset,
    Set,
}

/// Accumulator/flag fix-ups with no second operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumOp {
    Daa,
    Cpl,
    Scf,
    Ccf,
}

/// Every value transform the ALU micro-op can perform, resolved from the
/// mnemonic when the opcode table is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Arith(ArithOp),
    Step(StepOp),
    Wide(WideOp),
    /// `accumulator` marks the unprefixed `RLCA/RLA/RRCA/RRA` forms, which
    /// never report Zero.
    Shift { op: ShiftOp, accumulator: bool },
    Bit { op: BitOp, index: u8 },
    Accum(AccumOp),
}

/// Operands latched by an ALU micro-op. Flags are derived from these after
/// the whole queue has drained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AluInputs {
    pub x: u16,
    pub y: u16,
    /// F as it was when the ALU step ran (carry-in, DAA's N/H/C).
    pub flags_in: u8,
    pub result: u16,
}

#[inline]
fn carry_in(flags: u8) -> u8 {
    u8::from(flags & Flag::C.mask() != 0)
}

impl AluOp {
    /// Compute the value this operation produces from `x` (destination
    /// operand) and `y` (source operand).
    ///
    /// Operations that only compare or test (`CP`, `BIT`, `SCF`, `CCF`)
    /// return `x` unchanged.
    pub fn apply(self, x: u16, y: u16, flags_in: u8) -> u16 {
        match self {
            AluOp::Arith(op) => arith(op, x as u8, y as u8, flags_in) as u16,
            AluOp::Step(op) => match op {
                StepOp::Inc8 => (x as u8).wrapping_add(1) as u16,
                StepOp::Dec8 => (x as u8).wrapping_sub(1) as u16,
                StepOp::Inc16 => x.wrapping_add(1),
                StepOp::Dec16 => x.wrapping_sub(1),
            },
            AluOp::Wide(op) => match op {
                WideOp::AddHl => x.wrapping_add(y),
                WideOp::AddSigned => x.wrapping_add(y as u8 as i8 as i16 as u16),
            },
            AluOp::Shift { op, .. } => shift(op, x as u8, flags_in) as u16,
            AluOp::Bit { op, index } => {
                let mask = 1u8 << (index & 0x07);
                let value = x as u8;
                match op {
                    BitOp::Test => value as u16,
                    BitOp::Reset => (value & !mask) as u16,
                    BitOp::Set => (value | mask) as u16,
                }
            }
            AluOp::Accum(op) => match op {
                AccumOp::Daa => daa(x as u8, flags_in).0 as u16,
                AccumOp::Cpl => (!(x as u8)) as u16,
                AccumOp::Scf | AccumOp::Ccf => x,
            },
        }
    }
}

fn arith(op: ArithOp, a: u8, value: u8, flags_in: u8) -> u8 {
    match op {
        ArithOp::Add => a.wrapping_add(value),
        ArithOp::Adc => a.wrapping_add(value).wrapping_add(carry_in(flags_in)),
        ArithOp::Sub => a.wrapping_sub(value),
        ArithOp::Sbc => a.wrapping_sub(value).wrapping_sub(carry_in(flags_in)),
        ArithOp::And => a & value,
        ArithOp::Xor => a ^ value,
        ArithOp::Or => a | value,
        // Compare only sets flags; A is not modified.
        ArithOp::Cp => a,
    }
}

fn shift(op: ShiftOp, value: u8, flags_in: u8) -> u8 {
    match op {
        ShiftOp::Rlc => value.rotate_left(1),
        ShiftOp::Rrc => value.rotate_right(1),
        ShiftOp::Rl => (value << 1) | carry_in(flags_in),
        ShiftOp::Rr => (value >> 1) | (carry_in(flags_in) << 7),
        ShiftOp::Sla => value << 1,
        ShiftOp::Sra => (value >> 1) | (value & 0x80),
        ShiftOp::Swap => value.rotate_left(4),
        ShiftOp::Srl => value >> 1,
    }
}

/// Bit shifted or rotated out by `op`.
pub(crate) fn shifted_out(op: ShiftOp, value: u8) -> bool {
    match op {
        ShiftOp::Rlc | ShiftOp::Rl | ShiftOp::Sla => value & 0x80 != 0,
        ShiftOp::Rrc | ShiftOp::Rr | ShiftOp::Sra | ShiftOp::Srl => value & 0x01 != 0,
        ShiftOp::Swap => false,
    }
}

/// Decimal adjust accumulator after BCD addition/subtraction.
///
/// Branches on the N flag left by the previous operation. Returns the
/// adjusted value and the resulting carry.
pub(crate) fn daa(a: u8, flags_in: u8) -> (u8, bool) {
    let subtract = flags_in & Flag::N.mask() != 0;
    let half = flags_in & Flag::H.mask() != 0;
    let mut carry = flags_in & Flag::C.mask() != 0;

    let mut adjust = 0u8;
    if subtract {
        if half {
            adjust |= 0x06;
        }
        if carry {
            adjust |= 0x60;
        }
        (a.wrapping_sub(adjust), carry)
    } else {
        if half || (a & 0x0F) > 0x09 {
            adjust |= 0x06;
        }
        if carry || a > 0x99 {
            adjust |= 0x60;
            carry = true;
        }
        (a.wrapping_add(adjust), carry)
    }
}
