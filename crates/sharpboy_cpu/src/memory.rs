//! The 64 KiB address space seen by the CPU.
//!
//! Reads and writes go through region rules: boot-ROM overlay, read-only
//! cartridge area, OAM/VRAM blocking driven by the video unit, and the IO
//! registers with side effects (serial, timer, IF/IE).

mod interrupts;
mod serial;
mod timer;

pub use interrupts::{Interrupt, InterruptFlags};
pub use serial::SERIAL_TAIL_CAPACITY;

use crate::cpu::Bus;
use serial::Serial;
use timer::Timer;

pub const BOOT_ROM_SIZE: usize = 0x100;
pub const CARTRIDGE_SIZE: usize = 0x8000;

pub const VRAM_START: u16 = 0x8000;
pub const VRAM_END: u16 = 0x9FFF;
pub const OAM_START: u16 = 0xFE00;
pub const OAM_END: u16 = 0xFE9F;

pub const JOYP_ADDR: u16 = 0xFF00;
pub const SB_ADDR: u16 = 0xFF01;
pub const SC_ADDR: u16 = 0xFF02;
pub const DIV_ADDR: u16 = 0xFF04;
pub const TIMA_ADDR: u16 = 0xFF05;
pub const TMA_ADDR: u16 = 0xFF06;
pub const TAC_ADDR: u16 = 0xFF07;
pub const IF_ADDR: u16 = 0xFF0F;
pub const LCDC_ADDR: u16 = 0xFF40;
pub const STAT_ADDR: u16 = 0xFF41;
pub const LY_ADDR: u16 = 0xFF44;
pub const LYC_ADDR: u16 = 0xFF45;
pub const BOOT_OFF_ADDR: u16 = 0xFF50;
pub const IE_ADDR: u16 = 0xFFFF;

/// DMG register values after the boot ROM, per Pandocs "Power Up Sequence".
const POST_BOOT_IO: &[(u16, u8)] = &[
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1E, 0xBF),
    (0xFF20, 0xFF),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
    (0xFF26, 0xF1),
    (LCDC_ADDR, 0x91),
    (STAT_ADDR, 0x85),
    (0xFF47, 0xFC),
];

pub struct Memory {
    bytes: Box<[u8]>,
    boot_rom: [u8; BOOT_ROM_SIZE],
    cartridge: Box<[u8]>,
    boot_active: bool,
    oam_blocked: bool,
    vram_blocked: bool,
    /// Joypad input lines (P1 bits 3:0), active low.
    joypad_lines: u8,
    interrupt_flag: u8,
    interrupt_enable: u8,
    serial: Serial,
    timer: Timer,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Power-on memory: everything zero, no overlay mapped.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; 0x10000].into_boxed_slice(),
            boot_rom: [0; BOOT_ROM_SIZE],
            cartridge: vec![0; CARTRIDGE_SIZE].into_boxed_slice(),
            boot_active: false,
            oam_blocked: false,
            vram_blocked: false,
            joypad_lines: 0x0F,
            interrupt_flag: 0,
            interrupt_enable: 0,
            serial: Serial::new(true),
            timer: Timer::new(),
        }
    }

    /// Map a boot image over 0x0000-0x00FF until the latch at 0xFF50 is
    /// written. Short images are zero-padded; long ones truncated.
    pub fn load_boot_rom(&mut self, image: &[u8]) {
        if image.len() != BOOT_ROM_SIZE {
            log::warn!(
                "boot image is {} bytes, expected {}",
                image.len(),
                BOOT_ROM_SIZE
            );
        }
        self.boot_rom = [0; BOOT_ROM_SIZE];
        let len = image.len().min(BOOT_ROM_SIZE);
        self.boot_rom[..len].copy_from_slice(&image[..len]);
        self.boot_active = true;
    }

    /// Map the first 32 KiB of a cartridge image at 0x0000-0x7FFF.
    pub fn load_cartridge(&mut self, image: &[u8]) {
        self.cartridge.fill(0);
        let len = image.len().min(CARTRIDGE_SIZE);
        self.cartridge[..len].copy_from_slice(&image[..len]);
    }

    /// IO register defaults the boot ROM leaves behind. Disables the
    /// overlay.
    pub fn apply_post_boot_state(&mut self) {
        self.boot_active = false;
        self.timer.init_dmg();
        self.interrupt_flag = InterruptFlags::VBLANK.bits();
        self.interrupt_enable = 0;
        self.joypad_lines = 0x0F;
        self.bytes[JOYP_ADDR as usize] = 0xCF;
        self.serial.sb = 0;
        self.serial.sc = 0;
        for &(addr, value) in POST_BOOT_IO {
            self.bytes[addr as usize] = value;
        }
    }

    pub fn boot_rom_active(&self) -> bool {
        self.boot_active
    }

    pub fn set_echo_serial(&mut self, echo: bool) {
        self.serial.echo = echo;
    }

    /// The most recent bytes sent over the serial port, at most
    /// [`SERIAL_TAIL_CAPACITY`].
    pub fn serial_output(&self) -> &[u8] {
        self.serial.output()
    }

    /// Count of every byte ever sent over the serial port.
    pub fn serial_transferred(&self) -> u64 {
        self.serial.transferred()
    }

    pub fn set_oam_blocked(&mut self, blocked: bool) {
        self.oam_blocked = blocked;
    }

    pub fn set_vram_blocked(&mut self, blocked: bool) {
        self.vram_blocked = blocked;
    }

    pub fn oam_blocked(&self) -> bool {
        self.oam_blocked
    }

    pub fn vram_blocked(&self) -> bool {
        self.vram_blocked
    }

    /// Joypad input lines (bits 3:0 of P1, 0 = pressed).
    pub fn set_joypad_lines(&mut self, lines: u8) {
        let pressed = !lines & self.joypad_lines & 0x0F;
        self.joypad_lines = lines & 0x0F;
        if pressed != 0 {
            self.request_interrupt(Interrupt::Joypad);
        }
    }

    /// OR the interrupt's bit into IF.
    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt_flag |= interrupt.bit();
    }

    /// `IE & IF`, low five bits.
    pub fn pending_interrupts(&self) -> InterruptFlags {
        InterruptFlags::from_bits_truncate(self.interrupt_flag & self.interrupt_enable)
    }

    /// LY as driven by the video unit; CPU writes to LY are ignored.
    pub fn set_ly(&mut self, ly: u8) {
        self.bytes[LY_ADDR as usize] = ly;
    }

    /// STAT bits 2:0 (coincidence + mode) as driven by the video unit.
    pub fn set_lcd_status(&mut self, status: u8) {
        let stat = &mut self.bytes[STAT_ADDR as usize];
        *stat = (*stat & 0x78) | (status & 0x07);
    }

    /// Raw view of a register byte without region rules, for the video
    /// unit.
    #[inline]
    pub fn io(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            VRAM_START..=VRAM_END if self.vram_blocked => 0xFF,
            OAM_START..=OAM_END if self.oam_blocked => 0xFF,
            0x0000..=0x00FF if self.boot_active => self.boot_rom[addr as usize],
            0x0000..=0x7FFF => self.cartridge[addr as usize],
            JOYP_ADDR => {
                let select = self.bytes[JOYP_ADDR as usize] & 0x30;
                0xC0 | select | self.joypad_lines
            }
            SB_ADDR => self.serial.sb,
            SC_ADDR => self.serial.read_sc(),
            DIV_ADDR => self.timer.div(),
            TIMA_ADDR => self.timer.tima,
            TMA_ADDR => self.timer.tma,
            TAC_ADDR => self.timer.read_tac(),
            IF_ADDR => self.interrupt_flag | 0xE0,
            STAT_ADDR => self.bytes[addr as usize] | 0x80,
            IE_ADDR => self.interrupt_enable,
            _ => self.bytes[addr as usize],
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            // No bank switching: the cartridge area is read-only.
            0x0000..=0x7FFF => {}
            VRAM_START..=VRAM_END if self.vram_blocked => {}
            OAM_START..=OAM_END if self.oam_blocked => {}
            JOYP_ADDR => self.bytes[addr as usize] = value & 0x30,
            SB_ADDR => self.serial.write_sb(value),
            SC_ADDR => {
                if self.serial.write_sc(value) {
                    self.request_interrupt(Interrupt::Serial);
                }
            }
            DIV_ADDR => {
                if self.timer.write_div() {
                    self.request_interrupt(Interrupt::Timer);
                }
            }
            TIMA_ADDR => self.timer.write_tima(value),
            TMA_ADDR => self.timer.write_tma(value),
            TAC_ADDR => {
                if self.timer.write_tac(value) {
                    self.request_interrupt(Interrupt::Timer);
                }
            }
            IF_ADDR => self.interrupt_flag = value & 0x1F,
            STAT_ADDR => {
                let stat = &mut self.bytes[addr as usize];
                *stat = (value & 0x78) | (*stat & 0x07);
            }
            LY_ADDR => {}
            BOOT_OFF_ADDR => {
                if self.boot_active {
                    log::info!("boot ROM overlay disabled");
                }
                self.boot_active = false;
                self.bytes[addr as usize] = value;
            }
            IE_ADDR => self.interrupt_enable = value,
            _ => self.bytes[addr as usize] = value,
        }
    }

    /// Little-endian word read.
    pub fn read_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read(addr), self.read(addr.wrapping_add(1))])
    }

    /// Little-endian word write.
    pub fn write_word(&mut self, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }

    /// Advance the timer by `cycles` T-cycles.
    pub fn tick(&mut self, cycles: u32) {
        if self.timer.tick(cycles) {
            self.request_interrupt(Interrupt::Timer);
        }
    }
}

impl Bus for Memory {
    #[inline]
    fn read8(&mut self, addr: u16) -> u8 {
        self.read(addr)
    }

    #[inline]
    fn write8(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
    }

    fn tick(&mut self, cycles: u32) {
        Memory::tick(self, cycles);
    }
}
