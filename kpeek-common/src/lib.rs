// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod frame;
pub mod net_types;


pub use arch::{check_address, check_size, validate, Arch};
pub use frame::{classify_frame, verdict_for, FrameAction, PacketCursor, Verdict};

/// Largest region a single request may copy. Matches the 2 MiB huge page
/// granularity of 4K-page x86-64 and AArch64 kernels.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

pub const EINVAL: i32 = 22;

/// UDP destination port the XDP trigger listens for.
pub const TRIGGER_PORT: u16 = 9999;

/// 127.0.0.1, host order.
pub const TRIGGER_ADDR: u32 = 0x7f00_0001;

/// Symbol of the userspace stub the uprobe trigger is attached to.
pub const TRIGGER_SYMBOL: &str = "read_kernel_memory";

pub const RESULT_MAP: &str = "READ_MEM_RESULT";
pub const ARCH_CONFIG_MAP: &str = "ARCH_CONFIG";
pub const UPROBE_PROGRAM: &str = "read_kernel_memory_uprobe";
pub const XDP_PROGRAM: &str = "read_kernel_memory_xdp";

// ARCH_CONFIG slots.
pub const VA_BITS_KCONFIG: u32 = 0;
pub const VA_BITS_RUNTIME: u32 = 1;
pub const ARCH_CONFIG_ENTRIES: u32 = 2;

/// Request tuple, as carried by the trigger datagram payload or the first two
/// argument registers of the trigger stub.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReadMemArgs {
    pub addr: u64,
    pub size: u64,
}

impl ReadMemArgs {
    pub const LEN: usize = core::mem::size_of::<Self>();

    pub const fn new(addr: u64, size: u64) -> Self {
        Self { addr, size }
    }

    pub fn to_ne_bytes(&self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[..8].copy_from_slice(&self.addr.to_ne_bytes());
        bytes[8..].copy_from_slice(&self.size.to_ne_bytes());
        bytes
    }
}

/// The single result slot shared with userspace through a memory mapping.
///
/// `buf` is only meaningful when `ret_code` is 0, and then only its first
/// `size` bytes.
#[repr(C)]
pub struct ReadMemResult {
    pub ret_code: i32,
    pub _pad: u32,
    pub buf: [u8; HUGE_PAGE_SIZE],
}

impl ReadMemResult {
    pub const RET_CODE_OFFSET: usize = core::mem::offset_of!(ReadMemResult, ret_code);
    pub const BUF_OFFSET: usize = core::mem::offset_of!(ReadMemResult, buf);
    pub const LEN: usize = core::mem::size_of::<Self>();
}
