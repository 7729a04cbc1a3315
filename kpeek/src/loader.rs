// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use anyhow::{anyhow, bail, Context as _};
use aya::{
    maps::Array,
    programs::{uprobe::UProbeScope, UProbe, Xdp},
    Ebpf,
};
use kpeek_common::{
    Arch, ARCH_CONFIG_MAP, RESULT_MAP, TRIGGER_SYMBOL, UPROBE_PROGRAM, VA_BITS_KCONFIG,
    VA_BITS_RUNTIME, XDP_PROGRAM,
};
use log::{debug, info, warn};
use tokio::io::unix::AsyncFd;

use crate::{
    trigger::Trigger,
    va_bits::{self, VaBits},
};

/// The datagram trigger is sent to 127.0.0.1, so it only ever crosses this
/// interface.
pub const LOOPBACK_INTERFACE: &str = "lo";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum XdpMode {
    /// Generic XDP, works on any interface including lo
    #[default]
    Skb,
    /// Native driver mode
    Drv,
    /// Offloaded to the NIC
    Hw,
}

impl XdpMode {
    fn flags(self) -> aya::programs::XdpMode {
        match self {
            XdpMode::Skb => aya::programs::XdpMode::Skb,
            XdpMode::Drv => aya::programs::XdpMode::Driver,
            XdpMode::Hw => aya::programs::XdpMode::Hardware,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triggers {
    pub uprobe: bool,
    pub xdp: bool,
}

impl Triggers {
    pub fn only(trigger: Trigger) -> Self {
        Triggers {
            uprobe: trigger == Trigger::Uprobe,
            xdp: trigger == Trigger::Xdp,
        }
    }
}

impl Default for Triggers {
    fn default() -> Self {
        Triggers {
            uprobe: true,
            xdp: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub triggers: Triggers,
    pub interface: String,
    pub xdp_mode: XdpMode,
    pub va_bits_override: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            triggers: Triggers::default(),
            interface: LOOPBACK_INTERFACE.to_string(),
            xdp_mode: XdpMode::default(),
            va_bits_override: None,
        }
    }
}

impl LoaderConfig {
    pub fn for_trigger(trigger: Trigger) -> Self {
        LoaderConfig {
            triggers: Triggers::only(trigger),
            ..Default::default()
        }
    }

    /// Rejects configurations whose triggers could never fire. Reads through
    /// them would report the untouched result buffer as a success.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.triggers.uprobe && !self.triggers.xdp {
            bail!("No trigger selected");
        }

        if self.triggers.xdp && self.interface != LOOPBACK_INTERFACE {
            bail!(
                "The XDP trigger only works on {LOOPBACK_INTERFACE}, trigger datagrams never \
                 reach {}",
                self.interface
            );
        }

        Ok(())
    }
}

/// Loads the eBPF object, configures it and attaches the requested triggers.
///
/// Must be called from within a tokio runtime, the eBPF log reader is spawned
/// on it. Programs stay attached until the returned handle is dropped.
pub fn load(config: &LoaderConfig) -> anyhow::Result<Ebpf> {
    config.validate()?;

    // Bump the memlock rlimit. This is needed for older kernels that don't use the
    // new memcg based accounting, see https://lwn.net/Articles/837122/
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }

    let mut ebpf = aya::Ebpf::load(aya::include_bytes_aligned!(concat!(
        env!("OUT_DIR"),
        "/kpeek"
    )))?;
    spawn_ebpf_logger(&mut ebpf)?;

    let va_bits = va_bits::resolve(Arch::HOST, config.va_bits_override)?;
    write_arch_config(&mut ebpf, va_bits)?;

    // The programs have no way of reporting a missing result slot other than
    // through their verdicts, so make sure it is there before attaching.
    if ebpf.map(RESULT_MAP).is_none() {
        bail!("{RESULT_MAP} map not found");
    }

    if config.triggers.uprobe {
        attach_uprobe(&mut ebpf)?;
    }

    if config.triggers.xdp {
        attach_xdp(&mut ebpf, &config.interface, config.xdp_mode)?;
    }

    Ok(ebpf)
}

fn spawn_ebpf_logger(ebpf: &mut Ebpf) -> anyhow::Result<()> {
    match aya_log::EbpfLogger::init(ebpf) {
        // This can happen if you remove all log statements from your eBPF program.
        Err(e) => warn!("failed to initialize eBPF logger: {e}"),
        Ok(logger) => {
            let mut logger =
                AsyncFd::with_interest(logger, tokio::io::Interest::READABLE)?;
            tokio::spawn(async move {
                loop {
                    let Ok(mut guard) = logger.readable_mut().await else {
                        return;
                    };
                    guard.get_inner_mut().flush();
                    guard.clear_ready();
                }
            });
        }
    }

    Ok(())
}

fn write_arch_config(ebpf: &mut Ebpf, va_bits: VaBits) -> anyhow::Result<()> {
    let mut arch_config: Array<_, u64> = Array::try_from(
        ebpf.map_mut(ARCH_CONFIG_MAP)
            .ok_or_else(|| anyhow!("{ARCH_CONFIG_MAP} map not found"))?,
    )?;

    arch_config.set(VA_BITS_KCONFIG, va_bits.kconfig, 0)?;
    arch_config.set(VA_BITS_RUNTIME, va_bits.runtime, 0)?;

    debug!(
        "VA bits: kconfig {}, runtime {}",
        va_bits.kconfig, va_bits.runtime
    );

    Ok(())
}

fn attach_uprobe(ebpf: &mut Ebpf) -> anyhow::Result<()> {
    let target = std::env::current_exe().context("Failed to locate our own executable")?;
    let pid = std::num::NonZeroU32::new(std::process::id()).context("Invalid process id")?;

    let program: &mut UProbe = ebpf
        .program_mut(UPROBE_PROGRAM)
        .ok_or_else(|| anyhow!("{UPROBE_PROGRAM} program not found"))?
        .try_into()?;
    program.load()?;
    program
        .attach(TRIGGER_SYMBOL, &target, UProbeScope::OneProcess(pid))
        .with_context(|| {
            format!(
                "Failed to attach uprobe to {TRIGGER_SYMBOL} in {}",
                target.display()
            )
        })?;

    info!("Attached uprobe to {TRIGGER_SYMBOL} in {}", target.display());

    Ok(())
}

fn attach_xdp(ebpf: &mut Ebpf, interface: &str, mode: XdpMode) -> anyhow::Result<()> {
    let program: &mut Xdp = ebpf
        .program_mut(XDP_PROGRAM)
        .ok_or_else(|| anyhow!("{XDP_PROGRAM} program not found"))?
        .try_into()?;
    program.load()?;
    program
        .attach(interface, mode.flags())
        .with_context(|| format!("Failed to attach XDP program to {interface} ({mode:?})"))?;

    info!("Attached XDP program to {interface} ({mode:?})");

    Ok(())
}
