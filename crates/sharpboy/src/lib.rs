use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sharpboy_cpu::machine::StopReason;
use sharpboy_cpu::{Machine, MachineConfig, OpcodeTable, RunLimits, RunSummary};

/// Default budget: one minute of emulated time.
pub const DEFAULT_CYCLES: u64 = 4_194_304 * 60;

/// What the binary was asked to run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub cartridge: PathBuf,
    pub boot_rom: Option<PathBuf>,
    pub table: Option<PathBuf>,
    pub cycles: u64,
    pub quiet: bool,
    pub until: Option<String>,
}

/// Read an image, falling back to an empty (zero-filled) one on failure.
pub fn load_image(path: &Path) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => {
            log::info!("loaded {} ({} bytes)", path.display(), bytes.len());
            bytes
        }
        Err(err) => {
            log::warn!("could not read {}: {}; using a blank image", path.display(), err);
            Vec::new()
        }
    }
}

pub fn build_machine(options: &RunOptions) -> Result<Machine> {
    let config = MachineConfig::builder()
        .cartridge(load_image(&options.cartridge))
        .boot_rom(options.boot_rom.as_deref().map(load_image))
        .echo_serial(!options.quiet)
        .build();

    let machine = match &options.table {
        Some(path) => {
            let table = OpcodeTable::from_path(path)
                .with_context(|| format!("load opcode table {}", path.display()))?;
            Machine::with_table(config, Arc::new(table))
        }
        None => Machine::new(config)?,
    };
    Ok(machine)
}

pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let mut machine = build_machine(options)?;
    let limits = RunLimits {
        max_cycles: options.cycles,
        until: options.until.clone(),
    };
    let summary = machine.run(&limits);
    if options.until.is_some() && summary.reason == StopReason::CycleBudget {
        log::warn!("stop text not seen within {} cycles", options.cycles);
    }
    Ok(summary)
}
