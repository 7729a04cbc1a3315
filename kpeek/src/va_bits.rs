// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

//! Resolution of the kernel virtual address width the read routine uses to
//! canonicalize addresses on AArch64.

use std::{
    fs::File,
    io::{self, Read as _},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail};
use flate2::read::GzDecoder;
use kpeek_common::Arch;
use log::{debug, trace};
use nix::unistd::{sysconf, SysconfVar};

use crate::kallsyms;

pub const KCONFIG_SYMBOL: &str = "CONFIG_ARM64_VA_BITS";

/// Compressed configuration of the running kernel, with `CONFIG_IKCONFIG_PROC`.
pub const PROC_CONFIG_GZ: &str = "/proc/config.gz";

/// Symbol whose address bit pattern gives away the VA width.
pub const PROBE_SYMBOL: &str = "_text";

pub const PROC_SELF_MAPS: &str = "/proc/self/maps";

/// Values for the two `ARCH_CONFIG` slots. The read routine prefers
/// `kconfig` and falls back to `runtime` when it is 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VaBits {
    pub kconfig: u64,
    pub runtime: u64,
}

impl VaBits {
    pub fn effective(&self) -> u64 {
        if self.kconfig != 0 {
            self.kconfig
        } else {
            self.runtime
        }
    }
}

/// Looks up `key` in a kernel configuration file's contents.
pub fn parse_kconfig(config: &str, key: &str) -> Option<u64> {
    config.lines().find_map(|line| {
        let (name, value) = line.trim().split_once('=')?;
        if name != key {
            return None;
        }
        value.trim().parse().ok()
    })
}

/// Reads a kernel configuration, decompressing it if it is gzipped.
pub fn read_config<R: io::Read>(mut reader: R, gzipped: bool) -> io::Result<String> {
    let mut config = String::new();
    if gzipped {
        GzDecoder::new(reader).read_to_string(&mut config)?;
    } else {
        reader.read_to_string(&mut config)?;
    }
    Ok(config)
}

/// VA widths the kernel can be configured with for a given page size.
pub fn supported_widths(page_size: usize) -> &'static [u64] {
    match page_size {
        4096 => &[39, 48, 52],
        16384 => &[36, 47, 48, 52],
        65536 => &[42, 48, 52],
        _ => &[36, 39, 42, 47, 48, 52],
    }
}

fn snap(raw: u64, widths: &[u64]) -> Option<u64> {
    widths.iter().copied().find(|&width| width >= raw)
}

/// Lower bound on the VA width from a kernel image address.
///
/// The image sits in the upper half of the kernel range, at or above
/// `2^64 - 2^(VA_BITS - 1)`, but KASLR may move it past the next power of
/// two. The leading ones then give `VA_BITS` or `VA_BITS - 1`, which is
/// snapped up to the smallest supported width.
pub fn from_kernel_address(addr: u64, widths: &[u64]) -> Option<u64> {
    match addr.leading_ones() {
        0 | 64 => None,
        ones => snap(65 - ones as u64, widths),
    }
}

/// Lower bound on the VA width from the top of the user stack, which sits
/// just below `TASK_SIZE` and does not move with KASLR.
pub fn from_user_address(addr: u64, widths: &[u64]) -> Option<u64> {
    match addr.leading_zeros() {
        0 | 64 => None,
        zeros => snap(64 - zeros as u64, widths),
    }
}

/// End address of the `[stack]` mapping in a `/proc/<pid>/maps` listing.
pub fn parse_stack_top(maps: &str) -> Option<u64> {
    maps.lines()
        .find(|line| line.trim_end().ends_with("[stack]"))
        .and_then(|line| line.split_whitespace().next())
        .and_then(|range| range.split_once('-'))
        .and_then(|(_, end)| u64::from_str_radix(end, 16).ok())
}

/// Combines the runtime estimates. Both are lower bounds, so the larger one
/// wins.
pub fn runtime_width(kernel: Option<u64>, user: Option<u64>) -> Option<u64> {
    kernel.max(user)
}

pub fn kconfig_path() -> anyhow::Result<PathBuf> {
    let uts = nix::sys::utsname::uname()?;
    let mut path = PathBuf::from("/boot");
    path.push(format!("config-{}", uts.release().to_string_lossy()));
    Ok(path)
}

fn read_kconfig_from(path: &Path, gzipped: bool, key: &str) -> Option<u64> {
    match File::open(path).and_then(|file| read_config(file, gzipped)) {
        Ok(config) => parse_kconfig(&config, key),
        Err(e) => {
            debug!("Could not read {}: {e}", path.display());
            None
        }
    }
}

fn read_kconfig(key: &str) -> Option<u64> {
    if let Ok(path) = kconfig_path() {
        if let Some(value) = read_kconfig_from(&path, false, key) {
            return Some(value);
        }
    }

    read_kconfig_from(Path::new(PROC_CONFIG_GZ), true, key)
}

fn page_size() -> anyhow::Result<usize> {
    Ok(sysconf(SysconfVar::PAGE_SIZE)?.ok_or_else(|| anyhow!("page size is unknown"))? as usize)
}

fn probe_runtime() -> Option<u64> {
    let widths = match page_size() {
        Ok(page_size) => supported_widths(page_size),
        Err(e) => {
            debug!("Could not get the page size: {e}");
            supported_widths(0)
        }
    };

    let kernel = match kallsyms::symbol_address(PROBE_SYMBOL) {
        Ok(addr) => from_kernel_address(addr, widths),
        Err(e) => {
            debug!("Could not probe VA bits from {PROBE_SYMBOL}: {e}");
            None
        }
    };

    let user = match std::fs::read_to_string(PROC_SELF_MAPS) {
        Ok(maps) => parse_stack_top(&maps).and_then(|top| from_user_address(top, widths)),
        Err(e) => {
            debug!("Could not read {PROC_SELF_MAPS}: {e}");
            None
        }
    };

    trace!("VA bits estimates: kernel {kernel:?}, user {user:?}");

    runtime_width(kernel, user)
}

/// Works out what the loader writes into `ARCH_CONFIG`.
///
/// An `override_bits` wins over both sources: it is written to the runtime
/// slot and the kconfig slot is left at 0.
pub fn resolve(arch: Arch, override_bits: Option<u64>) -> anyhow::Result<VaBits> {
    if !arch.needs_va_bits() {
        return Ok(VaBits::default());
    }

    let va_bits = match override_bits {
        Some(runtime) => VaBits {
            kconfig: 0,
            runtime,
        },
        None => {
            let kconfig = read_kconfig(KCONFIG_SYMBOL).unwrap_or(0);
            let runtime = if kconfig == 0 {
                probe_runtime().unwrap_or(0)
            } else {
                0
            };
            VaBits { kconfig, runtime }
        }
    };

    trace!("Resolved VA bits: {va_bits:?}");

    if va_bits.effective() == 0 {
        bail!(
            "Could not determine the kernel VA width from {KCONFIG_SYMBOL} or {PROBE_SYMBOL}, \
             pass it explicitly with --va-bits"
        );
    }

    Ok(va_bits)
}
