use super::FrameBuffer;
use crate::memory::{Interrupt, Memory, LCDC_ADDR, LYC_ADDR, STAT_ADDR};

/// Video coprocessor collaborator driven by the machine loop.
///
/// Implementations own the OAM/VRAM blocked flags and LY; they toggle them
/// only through the memory hooks.
pub trait VideoUnit {
    /// Advance by `cycles` T-cycles.
    fn step(&mut self, mem: &mut Memory, frame: &FrameBuffer, cycles: u32);
}

/// T-cycles per scanline.
pub const DOTS_PER_LINE: u32 = 456;
/// Scanlines per frame, VBlank included.
pub const LINES_PER_FRAME: u32 = 154;
/// First VBlank line.
pub const VBLANK_LINE: u32 = 144;
const OAM_SCAN_DOTS: u32 = 80;
const TRANSFER_DOTS: u32 = 172;

/// DMG LCD timing without pixel composition.
///
/// Sequences LY and the STAT mode, blocks OAM during modes 2/3 and VRAM
/// during mode 3, requests VBlank on entering line 144 and STAT on a
/// rising edge of the enabled STAT sources.
#[derive(Default)]
pub struct LcdTiming {
    /// Dot position within the frame.
    counter: u32,
    stat_line: bool,
    was_enabled: bool,
    frames: u64,
}

impl LcdTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn mode(&self, ly: u32) -> u8 {
        if ly >= VBLANK_LINE {
            return 1;
        }
        match self.counter % DOTS_PER_LINE {
            dot if dot < OAM_SCAN_DOTS => 2,
            dot if dot < OAM_SCAN_DOTS + TRANSFER_DOTS => 3,
            _ => 0,
        }
    }

    fn dot(&mut self, mem: &mut Memory) {
        let old_ly = self.counter / DOTS_PER_LINE;
        self.counter = (self.counter + 1) % (DOTS_PER_LINE * LINES_PER_FRAME);
        let ly = self.counter / DOTS_PER_LINE;
        mem.set_ly(ly as u8);

        if old_ly < VBLANK_LINE && ly >= VBLANK_LINE {
            mem.request_interrupt(Interrupt::VBlank);
            self.frames += 1;
            log::debug!("VBlank edge (frame {})", self.frames);
        }

        let mode = self.mode(ly);
        mem.set_oam_blocked(mode == 2 || mode == 3);
        mem.set_vram_blocked(mode == 3);
        self.update_status(mem, ly as u8, mode);
    }

    /// Recompute STAT's mode and LYC=LY bits and the STAT interrupt line.
    fn update_status(&mut self, mem: &mut Memory, ly: u8, mode: u8) {
        let coincidence = ly == mem.io(LYC_ADDR);
        mem.set_lcd_status(mode | if coincidence { 0x04 } else { 0 });

        let stat = mem.io(STAT_ADDR);
        let line = (stat & 0x40 != 0 && coincidence)
            || (stat & 0x20 != 0 && mode == 2)
            || (stat & 0x10 != 0 && mode == 1)
            || (stat & 0x08 != 0 && mode == 0);
        if line && !self.stat_line {
            mem.request_interrupt(Interrupt::Lcd);
        }
        self.stat_line = line;
    }

    fn disable(&mut self, mem: &mut Memory, frame: &FrameBuffer) {
        self.counter = 0;
        self.stat_line = false;
        mem.set_ly(0);
        mem.set_lcd_status(0);
        mem.set_oam_blocked(false);
        mem.set_vram_blocked(false);
        frame.clear();
    }
}

impl VideoUnit for LcdTiming {
    fn step(&mut self, mem: &mut Memory, frame: &FrameBuffer, cycles: u32) {
        let enabled = mem.io(LCDC_ADDR) & 0x80 != 0;
        if !enabled {
            if self.was_enabled {
                log::debug!("LCD off");
                self.disable(mem, frame);
            }
            self.was_enabled = false;
            return;
        }
        self.was_enabled = true;
        for _ in 0..cycles {
            self.dot(mem);
        }
    }
}
