use bitflags::bitflags;

bitflags! {
    /// Interrupt request/enable bits as laid out in IF (FF0F) and IE (FFFF).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InterruptFlags: u8 {
        const VBLANK = 0x01;
        const LCD = 0x02;
        const TIMER = 0x04;
        const SERIAL = 0x08;
        const JOYPAD = 0x10;
    }
}

/// Interrupt sources in priority order (VBlank highest).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    Lcd = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Lcd,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    #[inline]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Fixed handler address (0x40, 0x48, ... 0x60).
    #[inline]
    pub const fn vector(self) -> u16 {
        0x40 + 8 * (self as u16)
    }

    pub fn flag(self) -> InterruptFlags {
        InterruptFlags::from_bits_truncate(self.bit())
    }

    /// Lowest-numbered interrupt set in `bits`.
    pub fn highest(bits: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| bits & i.bit() != 0)
    }
}
