use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use s370_channel::MemoryDevice;
use s370_machine::{Machine, MachineConfig, RunExit};
use s370_mmu::MainStorage as _;

/// System/370 CPU-core emulator runner.
#[derive(Debug, Parser)]
#[command(name = "s370-machine", version, about)]
struct Args {
    /// Main storage size in kilobytes.
    #[arg(long, default_value_t = 256)]
    mem_kb: u32,

    /// Boot image attached as the IPL device (raw bytes: 24-byte IPL
    /// record followed by the program the record's CCWs read in).
    #[arg(long)]
    ipl_image: Option<PathBuf>,

    /// Device address for the boot image (hex).
    #[arg(long, default_value = "00F", value_parser = parse_dev)]
    ipl_dev: u16,

    /// Raw core image loaded at address 0 instead of an IPL (the PSW at
    /// location 0 starts the machine).
    #[arg(long)]
    core_image: Option<PathBuf>,

    /// Cycle budget before giving up.
    #[arg(long, default_value_t = 50_000_000)]
    budget: u64,
}

fn parse_dev(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut machine = Machine::new(MachineConfig {
        mem_size: args.mem_kb * 1024,
        ..MachineConfig::default()
    });

    if let Some(path) = &args.ipl_image {
        let image = std::fs::read(path)
            .with_context(|| format!("reading IPL image {}", path.display()))?;
        machine.attach(args.ipl_dev, Box::new(MemoryDevice::new(image)));
        machine
            .ipl(args.ipl_dev)
            .with_context(|| format!("IPL from device {:03X}", args.ipl_dev))?;
    } else if let Some(path) = &args.core_image {
        let image = std::fs::read(path)
            .with_context(|| format!("reading core image {}", path.display()))?;
        machine
            .cpu
            .mem
            .load_image(0, &image)
            .map_err(|e| anyhow::anyhow!("core image too large: {e}"))?;
        let w1 = machine.cpu.mem.get_word(0)?;
        let w2 = machine.cpu.mem.get_word(4)?;
        machine.cpu.lpsw(w1, w2);
    } else {
        anyhow::bail!("one of --ipl-image or --core-image is required");
    }

    match machine.run(args.budget) {
        RunExit::Halted => {
            tracing::info!(pc = format_args!("{:06X}", machine.cpu.pc), "machine halted");
            Ok(())
        }
        RunExit::BudgetExhausted => anyhow::bail!("cycle budget exhausted"),
    }
}
