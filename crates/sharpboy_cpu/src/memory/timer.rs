/// Timer / divider unit.
///
/// DIV is the upper byte of a free-running internal counter that advances
/// once per M-cycle. TIMA increments on the falling edge of the counter
/// bit selected by TAC, so resetting DIV or rewriting TAC while that bit
/// is high yields one extra increment ("Timer obscure behaviour" in
/// Pandocs).
pub(crate) struct Timer {
    /// Hidden system counter; DIV exposes bits 13:6.
    pub(crate) internal_counter: u16,
    pub(crate) tima: u8,
    pub(crate) tma: u8,
    /// TAC raw value (lower 3 bits meaningful).
    pub(crate) tac: u8,
    /// T-cycles not yet folded into a whole M-cycle.
    remainder: u32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self {
            internal_counter: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            remainder: 0,
        }
    }

    /// Initialise timer to DMG power-on state.
    ///
    /// `internal_counter` is seeded so that DIV reads back as 0xAB at
    /// PC=0x0100.
    pub(crate) fn init_dmg(&mut self) {
        self.internal_counter = 0x2AC0;
        self.tima = 0x00;
        self.tma = 0x00;
        self.tac = 0x00;
        self.remainder = 0;
    }

    #[inline]
    fn enabled(&self) -> bool {
        self.tac & 0x04 != 0
    }

    /// Selected timer input bit of the internal counter, gated by the
    /// enable bit. TAC[1:0]:
    /// - 00 → bit 7 (every 256 M-cycles)
    /// - 01 → bit 1 (every 4)
    /// - 10 → bit 3 (every 16)
    /// - 11 → bit 5 (every 64)
    #[inline]
    fn input(&self) -> bool {
        let bit = match self.tac & 0x03 {
            0x00 => 7,
            0x01 => 1,
            0x02 => 3,
            _ => 5,
        };
        self.enabled() && self.internal_counter & (1 << bit) != 0
    }

    /// Increment TIMA; returns true on overflow, after reloading from TMA.
    fn increment_tima(&mut self) -> bool {
        let (next, overflow) = self.tima.overflowing_add(1);
        if overflow {
            log::debug!("TIMA overflow, reload {:02X}", self.tma);
            self.tima = self.tma;
        } else {
            self.tima = next;
        }
        overflow
    }

    /// Advance by `cycles` T-cycles. Returns true if TIMA overflowed (the
    /// caller requests the timer interrupt).
    pub(crate) fn tick(&mut self, cycles: u32) -> bool {
        self.remainder += cycles;
        let mut overflowed = false;
        while self.remainder >= 4 {
            self.remainder -= 4;
            let before = self.input();
            self.internal_counter = self.internal_counter.wrapping_add(1);
            if before && !self.input() {
                overflowed |= self.increment_tima();
            }
        }
        overflowed
    }

    #[inline]
    pub(crate) fn div(&self) -> u8 {
        (self.internal_counter >> 6) as u8
    }

    /// Any write resets the counter; a falling edge on the selected bit
    /// counts as a tick.
    pub(crate) fn write_div(&mut self) -> bool {
        let before = self.input();
        self.internal_counter = 0;
        before && self.increment_tima()
    }

    pub(crate) fn write_tima(&mut self, value: u8) {
        self.tima = value;
    }

    pub(crate) fn write_tma(&mut self, value: u8) {
        self.tma = value;
    }

    #[inline]
    pub(crate) fn read_tac(&self) -> u8 {
        self.tac | 0b1111_1000
    }

    /// Disabling the timer or switching the clock source while the
    /// selected input bit is 1 triggers a single TIMA increment.
    pub(crate) fn write_tac(&mut self, value: u8) -> bool {
        let before = self.input();
        self.tac = value & 0x07;
        before && !self.input() && self.increment_tima()
    }
}
