// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use crate::{EINVAL, HUGE_PAGE_SIZE};

/// Architecture whose canonical kernel address rules a request is checked
/// against.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Unsupported,
}

impl Arch {
    #[cfg(x86_64)]
    pub const HOST: Arch = Arch::X86_64;

    #[cfg(aarch64)]
    pub const HOST: Arch = Arch::Aarch64;

    #[cfg(not(any(x86_64, aarch64)))]
    pub const HOST: Arch = Arch::Unsupported;

    /// Lowest value a kernel virtual address may take, `None` when no kernel
    /// address is accepted at all.
    #[inline(always)]
    pub const fn canonical_floor(self) -> Option<u64> {
        match self {
            Arch::X86_64 => Some(0xff00_0000_0000_0000),
            Arch::Aarch64 => Some(0xfff0_0000_0000_0000),
            Arch::Unsupported => None,
        }
    }

    #[inline(always)]
    pub const fn needs_va_bits(self) -> bool {
        matches!(self, Arch::Aarch64)
    }

    /// Sign-extends `addr` above bit `va_bits` on architectures whose kernel
    /// addresses depend on the configured VA width. A width of 0 means
    /// unknown and leaves the address alone.
    #[inline(always)]
    pub fn canonicalize(self, addr: u64, va_bits: u64) -> u64 {
        if !self.needs_va_bits() {
            return addr;
        }

        let mask = if va_bits == 0 || va_bits >= 64 {
            0
        } else {
            u64::MAX << va_bits
        };

        addr | mask
    }
}

/// Rejects sizes over [`HUGE_PAGE_SIZE`], returning the narrowed copy width.
#[inline(always)]
pub fn check_size(size: u64) -> Result<u32, i32> {
    if size > HUGE_PAGE_SIZE as u64 {
        return Err(-EINVAL);
    }

    Ok(size as u32)
}

/// Canonicalizes `addr` and applies the architecture's floor check.
#[inline(always)]
pub fn check_address(arch: Arch, addr: u64, va_bits: u64) -> Result<u64, i32> {
    let addr = arch.canonicalize(addr, va_bits);

    match arch.canonical_floor() {
        Some(floor) if addr >= floor => Ok(addr),
        _ => Err(-EINVAL),
    }
}

/// The request validation the in-kernel read routine runs before every copy.
/// Returns the canonical address and the copy width.
#[inline(always)]
pub fn validate(arch: Arch, addr: u64, size: u64, va_bits: u64) -> Result<(u64, u32), i32> {
    check_size(size)?;
    let addr = check_address(arch, addr, va_bits)?;
    let len = check_size(size)?;

    Ok((addr, len))
}
