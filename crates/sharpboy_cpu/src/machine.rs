mod frame;
mod video;


use std::sync::Arc;

use anyhow::Result;
use typed_builder::TypedBuilder;

use crate::cpu::Cpu;
use crate::memory::Memory;
use crate::opcode::OpcodeTable;

pub use frame::FrameBuffer;
pub use video::{LcdTiming, VideoUnit, DOTS_PER_LINE, LINES_PER_FRAME};

/// T-cycles in one DMG frame.
pub const CYCLES_PER_FRAME: u32 = DOTS_PER_LINE * LINES_PER_FRAME;

/// What to load into a new machine.
#[derive(TypedBuilder)]
pub struct MachineConfig {
    /// Cartridge image; the first 32 KiB are mapped at 0x0000.
    pub cartridge: Vec<u8>,
    /// Boot image. Without one the machine starts in the post-boot state
    /// at 0x0100.
    #[builder(default)]
    pub boot_rom: Option<Vec<u8>>,
    /// Echo serial transfers to stdout as well as capturing them.
    #[builder(default = true)]
    pub echo_serial: bool,
}

/// Limits for [`Machine::run`].
#[derive(Clone, Debug, Default)]
pub struct RunLimits {
    /// T-cycle budget.
    pub max_cycles: u64,
    /// Stop as soon as the serial output contains this text.
    pub until: Option<String>,
}

impl RunLimits {
    pub fn cycles(max_cycles: u64) -> Self {
        Self {
            max_cycles,
            until: None,
        }
    }

    pub fn until(mut self, text: impl Into<String>) -> Self {
        self.until = Some(text.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    CycleBudget,
    SerialMatch,
}

/// Outcome of [`Machine::run`].
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub cycles: u64,
    pub instructions: u64,
    /// Most recent serial output (see [`crate::memory::SERIAL_TAIL_CAPACITY`]).
    pub serial: String,
    pub pc: u16,
    pub reason: StopReason,
}

/// CPU, memory and video collaborator wired together.
pub struct Machine {
    pub cpu: Cpu,
    pub memory: Memory,
    table: Arc<OpcodeTable>,
    video: Box<dyn VideoUnit>,
    frame: FrameBuffer,
}

impl Machine {
    /// Build a machine with the bundled opcode table.
    pub fn new(config: MachineConfig) -> Result<Self> {
        let table = OpcodeTable::load_default()?;
        Ok(Self::with_table(config, Arc::new(table)))
    }

    pub fn with_table(config: MachineConfig, table: Arc<OpcodeTable>) -> Self {
        let MachineConfig {
            cartridge,
            boot_rom,
            echo_serial,
        } = config;

        let mut memory = Memory::new();
        memory.set_echo_serial(echo_serial);
        memory.load_cartridge(&cartridge);

        let cpu = match boot_rom {
            Some(image) => {
                memory.load_boot_rom(&image);
                Cpu::power_on()
            }
            None => {
                memory.apply_post_boot_state();
                Cpu::new()
            }
        };

        Self {
            cpu,
            memory,
            table,
            video: Box::new(LcdTiming::new()),
            frame: FrameBuffer::new(),
        }
    }

    pub fn table(&self) -> &OpcodeTable {
        &self.table
    }

    /// Replace the video collaborator.
    pub fn set_video_unit(&mut self, video: Box<dyn VideoUnit>) {
        self.video = video;
    }

    /// Handle for presentation threads.
    pub fn frame(&self) -> FrameBuffer {
        self.frame.clone()
    }

    /// Execute one instruction (or dispatch/idle step) and advance the
    /// video unit by the same number of T-cycles.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&self.table, &mut self.memory);
        self.video.step(&mut self.memory, &self.frame, cycles);
        cycles
    }

    /// Execute a single micro-op.
    pub fn step_micro(&mut self) -> u32 {
        let cycles = self.cpu.step_micro(&self.table, &mut self.memory);
        self.video.step(&mut self.memory, &self.frame, cycles);
        cycles
    }

    /// Step the machine for one frame worth of time.
    pub fn step_frame(&mut self) {
        let mut cycles = 0u32;
        while cycles < CYCLES_PER_FRAME {
            cycles = cycles.saturating_add(self.step());
        }
    }

    /// Run until the cycle budget is spent or the serial stop text appears.
    pub fn run(&mut self, limits: &RunLimits) -> RunSummary {
        let start_cycles = self.cpu.cycles();
        let start_instructions = self.cpu.instructions();
        let needle = limits.until.as_deref().map(str::as_bytes);
        let mut seen = self.memory.serial_transferred();
        let mut reason = StopReason::CycleBudget;

        while self.cpu.cycles() - start_cycles < limits.max_cycles {
            self.step();
            let transferred = self.memory.serial_transferred();
            if transferred == seen {
                continue;
            }
            let fresh = (transferred - seen) as usize;
            seen = transferred;
            if let Some(needle) = needle {
                if tail_contains(self.memory.serial_output(), fresh, needle) {
                    reason = StopReason::SerialMatch;
                    break;
                }
            }
        }

        let summary = RunSummary {
            cycles: self.cpu.cycles() - start_cycles,
            instructions: self.cpu.instructions() - start_instructions,
            serial: String::from_utf8_lossy(self.memory.serial_output()).into_owned(),
            pc: self.cpu.regs.pc,
            reason,
        };
        log::info!(
            "run stopped ({:?}) after {} cycles, {} instructions, pc={:04X}",
            summary.reason,
            summary.cycles,
            summary.instructions,
            summary.pc
        );
        summary
    }
}

/// Whether `needle` ends within the last `fresh` bytes of `buffer`.
///
/// Only windows overlapping the new bytes are scanned.
fn tail_contains(buffer: &[u8], fresh: usize, needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    let start = buffer.len().saturating_sub(fresh + needle.len() - 1);
    buffer[start..].windows(needle.len()).any(|w| w == needle)
}
