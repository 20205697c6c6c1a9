use std::sync::{Arc, Mutex, MutexGuard};

use crate::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Shared 160x144 buffer of 2-bit shades (0 = lightest).
///
/// The emulation thread writes through [`FrameBuffer::write_pixel`]; a
/// presentation thread takes copies with [`FrameBuffer::snapshot`]. Each
/// call holds the lock for its whole duration, so a snapshot never sees a
/// half-written pixel.
#[derive(Clone)]
pub struct FrameBuffer {
    pixels: Arc<Mutex<Box<[u8]>>>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pixels: Arc::new(Mutex::new(
                vec![0; SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice(),
            )),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        // A panicked writer cannot leave a pixel half-written; keep going.
        self.pixels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set one pixel; coordinates outside the screen are ignored.
    pub fn write_pixel(&self, x: usize, y: usize, shade: u8) {
        if x < SCREEN_WIDTH && y < SCREEN_HEIGHT {
            self.lock()[y * SCREEN_WIDTH + x] = shade & 0x03;
        }
    }

    /// Write a whole scanline under one lock.
    pub fn write_line(&self, y: usize, shades: &[u8]) {
        if y >= SCREEN_HEIGHT {
            return;
        }
        let mut pixels = self.lock();
        let row = &mut pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH];
        for (dst, src) in row.iter_mut().zip(shades) {
            *dst = src & 0x03;
        }
    }

    pub fn clear(&self) {
        self.lock().fill(0);
    }

    /// Immutable copy of the current pixels, row-major.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().to_vec()
    }
}
