// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use aya_ebpf::programs::XdpContext;
use kpeek_common::PacketCursor;

/// Packet access for the XDP program. Every load is preceded by a comparison
/// against `data_end`.
pub struct XdpCursor<'a> {
    ctx: &'a XdpContext,
}

impl<'a> XdpCursor<'a> {
    #[inline(always)]
    pub fn new(ctx: &'a XdpContext) -> Self {
        XdpCursor { ctx }
    }
}

impl PacketCursor for XdpCursor<'_> {
    #[inline(always)]
    fn load<T: Copy>(&self, offset: usize) -> Option<T> {
        let start = self.ctx.data();
        let end = self.ctx.data_end();

        if start + offset + core::mem::size_of::<T>() > end {
            return None;
        }

        Some(unsafe { core::ptr::read_unaligned((start + offset) as *const T) })
    }
}
