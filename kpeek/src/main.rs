// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use std::io::Write as _;

use clap::Parser;
use kpeek::{
    hexdump::write_hexdump, region::parse_region, Collector, LoaderConfig, Trigger, Triggers,
    XdpMode,
};
use kpeek_common::ReadMemArgs;
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// How reads are triggered
    #[arg(short, long, value_enum, default_value_t = Trigger::default())]
    trigger: Trigger,

    /// Interface the XDP trigger is attached to, trigger datagrams only cross lo
    #[arg(short, long, default_value = "lo")]
    interface: String,

    /// XDP attach mode
    #[arg(long, value_enum, default_value_t = XdpMode::default())]
    xdp_mode: XdpMode,

    /// Milliseconds to wait after sending a trigger datagram before reading the result
    #[arg(long, default_value_t = 10)]
    quiesce_ms: u64,

    /// Kernel virtual address width, skips detection (only used on aarch64)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=64))]
    va_bits: Option<u64>,

    /// Write the raw bytes to stdout instead of a hex dump
    #[arg(long)]
    raw: bool,

    /// Kernel regions to read, as ADDR:SIZE (hex with 0x prefix, or decimal)
    #[arg(required = true, value_parser = parse_region)]
    regions: Vec<ReadMemArgs>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = LoaderConfig {
        triggers: Triggers::only(args.trigger),
        interface: args.interface,
        xdp_mode: args.xdp_mode,
        va_bits_override: args.va_bits,
    };

    let ebpf = kpeek::load(&config)?;
    let mut collector =
        Collector::new(ebpf)?.with_quiesce(Duration::from_millis(args.quiesce_ms));

    let mut stdout = std::io::stdout();
    let mut failures = 0;

    for region in &args.regions {
        match collector.read(args.trigger, region.addr, region.size).await {
            Ok(bytes) if args.raw => stdout.write_all(&bytes)?,
            Ok(bytes) => write_hexdump(&mut stdout, region.addr, &bytes)?,
            Err(e) => {
                eprintln!("{:#x}:{}: {e}", region.addr, region.size);
                failures += 1;
            }
        }
    }

    stdout.flush()?;

    if failures > 0 {
        std::process::exit(1);
    }

    Ok(())
}
