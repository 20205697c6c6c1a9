pub mod cpu;
pub mod machine;
pub mod memory;
pub mod micro;
pub mod opcode;

pub use cpu::{Bus, Cpu, CpuState};
pub use machine::{FrameBuffer, Machine, MachineConfig, RunLimits, RunSummary, VideoUnit};
pub use memory::Memory;
pub use opcode::{OpcodeInfo, OpcodeTable};

/// Logical screen width in pixels for the DMG.
pub const SCREEN_WIDTH: usize = 160;
/// Logical screen height in pixels.
pub const SCREEN_HEIGHT: usize = 144;
