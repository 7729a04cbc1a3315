// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

#![no_std]
#![no_main]
use aya_ebpf::{
    bindings::xdp_action,
    helpers::bpf_probe_read_kernel_buf,
    macros::{map, uprobe, xdp},
    maps::Array,
    programs::{ProbeContext, XdpContext},
    EbpfContext,
};
use aya_log_ebpf::{debug, trace};
use kpeek_common::{
    classify_frame, validate, verdict_for, Arch, FrameAction, ReadMemResult, Verdict,
    ARCH_CONFIG_ENTRIES, VA_BITS_KCONFIG, VA_BITS_RUNTIME,
};

use crate::util::XdpCursor;

mod util;

const BPF_F_NUMA_NODE: u32 = 1 << 2;
const BPF_F_MMAPABLE: u32 = 1 << 10;

#[map]
static READ_MEM_RESULT: Array<ReadMemResult> =
    Array::with_max_entries(1, BPF_F_MMAPABLE | BPF_F_NUMA_NODE);

// Written by the loader before any program is attached, see kpeek::va_bits.
#[map]
static ARCH_CONFIG: Array<u64> = Array::with_max_entries(ARCH_CONFIG_ENTRIES, 0);

#[inline(always)]
fn arch_va_bits() -> u64 {
    if !Arch::HOST.needs_va_bits() {
        return 0;
    }

    let kconfig = ARCH_CONFIG.get(VA_BITS_KCONFIG).copied().unwrap_or(0);
    if kconfig != 0 {
        return kconfig;
    }

    ARCH_CONFIG.get(VA_BITS_RUNTIME).copied().unwrap_or(0)
}

/// Copies `size` bytes of kernel memory at `address` into the result slot.
///
/// Returns 0 whenever the slot exists, whatever the outcome of the request,
/// which is reported through `ret_code`. Returns -1 only when the slot is
/// missing.
#[inline(always)]
fn read_memory<C: EbpfContext>(ctx: &C, address: u64, size: u64) -> i32 {
    let Some(result) = READ_MEM_RESULT.get_ptr_mut(0) else {
        return -1;
    };

    // SAFETY: the pointer is to the map's only value and stays valid for the
    // whole program invocation.
    let result: &mut ReadMemResult = unsafe { &mut *result };

    // The final size check in validate is what bounds the copy for the
    // verifier.
    let (address, len) = match validate(Arch::HOST, address, size, arch_va_bits()) {
        Ok(request) => request,
        Err(err) => {
            debug!(ctx, "rejecting read of {} bytes at {:x}", size, address);
            result.ret_code = err;
            return 0;
        }
    };

    // SAFETY: len <= HUGE_PAGE_SIZE, the length of buf.
    let dst = unsafe { core::slice::from_raw_parts_mut(result.buf.as_mut_ptr(), len as usize) };

    result.ret_code = match unsafe { bpf_probe_read_kernel_buf(address as *const u8, dst) } {
        Ok(()) => 0,
        Err(err) => err as i32,
    };

    trace!(
        ctx,
        "read {} bytes at {:x}, ret_code {}",
        len,
        address,
        result.ret_code
    );

    0
}

#[uprobe]
pub fn read_kernel_memory_uprobe(ctx: ProbeContext) -> u32 {
    let address: u64 = ctx.arg(0).unwrap_or(0);
    let size: u64 = ctx.arg(1).unwrap_or(0);

    read_memory(&ctx, address, size) as u32
}

#[xdp]
pub fn read_kernel_memory_xdp(ctx: XdpContext) -> u32 {
    let action = classify_frame(&XdpCursor::new(&ctx));

    let read_ret = match action {
        FrameAction::Trigger(args) => Some(read_memory(&ctx, args.addr, args.size)),
        FrameAction::Pass | FrameAction::Drop => None,
    };

    match verdict_for(action, read_ret) {
        Verdict::Pass => xdp_action::XDP_PASS,
        Verdict::Drop => xdp_action::XDP_DROP,
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
