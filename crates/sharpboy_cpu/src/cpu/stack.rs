//! Stack helpers on top of the bus.
//!
//! SP wraps at the address-space boundary; a push at SP=0x0000 lands at
//! 0xFFFE. Words are stored little-endian.

use super::Bus;

pub fn push<B: Bus + ?Sized>(sp: &mut u16, bus: &mut B, value: u16) {
    let [lo, hi] = value.to_le_bytes();
    *sp = sp.wrapping_sub(2);
    bus.write8(*sp, lo);
    bus.write8(sp.wrapping_add(1), hi);
}

pub fn pop<B: Bus + ?Sized>(sp: &mut u16, bus: &mut B) -> u16 {
    let value = peek(*sp, bus);
    *sp = sp.wrapping_add(2);
    value
}

/// Read the word at `sp` without moving it.
pub fn peek<B: Bus + ?Sized>(sp: u16, bus: &mut B) -> u16 {
    let lo = bus.read8(sp);
    let hi = bus.read8(sp.wrapping_add(1));
    u16::from_le_bytes([lo, hi])
}
