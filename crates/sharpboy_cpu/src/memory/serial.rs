use std::io::Write;

/// Bytes of serial output kept for inspection.
pub const SERIAL_TAIL_CAPACITY: usize = 4096;

/// Serial port modelled via SB/SC.
///
/// Only the byte-echo path test programs rely on is modelled: a write to
/// SC with the start bit set completes the transfer at once, the byte in
/// SB is captured (and optionally echoed to stdout), and the start bit
/// is cleared. Only the most recent bytes are kept; `transferred` counts
/// every byte ever sent.
pub(crate) struct Serial {
    pub(crate) sb: u8,
    pub(crate) sc: u8,
    output: Vec<u8>,
    transferred: u64,
    pub(crate) echo: bool,
}

impl Serial {
    pub(crate) fn new(echo: bool) -> Self {
        Self {
            sb: 0,
            sc: 0,
            output: Vec::with_capacity(SERIAL_TAIL_CAPACITY),
            transferred: 0,
            echo,
        }
    }

    pub(super) fn write_sb(&mut self, value: u8) {
        self.sb = value;
    }

    /// Returns true when a transfer completed and the serial interrupt
    /// should be requested.
    pub(super) fn write_sc(&mut self, value: u8) -> bool {
        self.sc = value;
        if self.sc & 0x80 == 0 {
            return false;
        }
        self.capture(self.sb);
        if self.echo {
            echo_byte(&mut std::io::stdout().lock(), self.sb);
        }
        // Clear transfer start bit.
        self.sc &= !0x80;
        true
    }

    pub(super) fn read_sc(&self) -> u8 {
        self.sc | 0x7E
    }

    /// Most recent serial bytes, oldest first.
    pub(crate) fn output(&self) -> &[u8] {
        &self.output
    }

    pub(crate) fn transferred(&self) -> u64 {
        self.transferred
    }

    fn capture(&mut self, byte: u8) {
        if self.output.len() == SERIAL_TAIL_CAPACITY {
            self.output.drain(..SERIAL_TAIL_CAPACITY / 2);
        }
        self.output.push(byte);
        self.transferred += 1;
    }
}

/// Write one byte to `sink`; failures are logged, never fatal.
fn echo_byte<W: Write>(sink: &mut W, byte: u8) -> bool {
    match sink.write_all(&[byte]).and_then(|()| sink.flush()) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("serial echo failed: {}", err);
            false
        }
    }
}
