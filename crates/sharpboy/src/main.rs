use std::path::PathBuf;

use clap::Parser;
use sharpboy::{RunOptions, DEFAULT_CYCLES};

#[derive(Parser, Clone)]
#[clap(
    version = clap::crate_version!(),
    about = "Run a DMG cartridge headless and report its serial output",
)]
struct Options {
    /// Cartridge image (first 32 KiB are mapped)
    #[clap(parse(from_os_str))]
    cartridge: PathBuf,
    /// 256-byte boot image; without one the machine starts post-boot
    #[clap(short, long, parse(from_os_str))]
    boot: Option<PathBuf>,
    /// Opcode table document replacing the bundled one
    #[clap(short, long, parse(from_os_str))]
    table: Option<PathBuf>,
    /// T-cycle budget
    #[clap(short, long, default_value_t = DEFAULT_CYCLES)]
    cycles: u64,
    /// Do not echo serial output while running
    #[clap(short, long)]
    quiet: bool,
    /// Stop once the serial output contains this text
    #[clap(short, long)]
    until: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let options = Options::parse();

    let summary = sharpboy::run(&RunOptions {
        cartridge: options.cartridge,
        boot_rom: options.boot,
        table: options.table,
        cycles: options.cycles,
        quiet: options.quiet,
        until: options.until,
    })?;

    if options.quiet && !summary.serial.is_empty() {
        println!("{}", summary.serial);
    }
    println!(
        "{:?}: {} cycles, {} instructions, pc={:04X}",
        summary.reason, summary.cycles, summary.instructions, summary.pc
    );
    Ok(())
}
