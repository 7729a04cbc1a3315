// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

//! Trigger frame classification.
//!
//! The same decision sequence runs in the XDP program, over packet memory, and
//! on the host, over byte slices. Only the bounded load differs between the
//! two, and that is what [`PacketCursor`] abstracts.

use crate::{
    net_types::{EthHdr, Ipv4Hdr, UdpHdr, ETH_P_IP, IPPROTO_UDP},
    ReadMemArgs, TRIGGER_ADDR, TRIGGER_PORT,
};

/// Bounded access to a frame.
pub trait PacketCursor {
    /// Copies a `T` starting `offset` bytes into the frame, or returns `None`
    /// if any of its bytes would lie past the end of the frame.
    fn load<T: Copy>(&self, offset: usize) -> Option<T>;
}

impl PacketCursor for [u8] {
    #[inline(always)]
    fn load<T: Copy>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(core::mem::size_of::<T>())?;
        if end > self.len() {
            return None;
        }

        // SAFETY: the range was checked against the slice above.
        Some(unsafe { core::ptr::read_unaligned(self.as_ptr().add(offset) as *const T) })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameAction {
    /// Not a trigger, let the stack have it.
    Pass,
    /// Truncated or malformed.
    Drop,
    /// A well-formed trigger datagram.
    Trigger(ReadMemArgs),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
}

#[inline(always)]
pub fn classify_frame<C: PacketCursor + ?Sized>(frame: &C) -> FrameAction {
    let Some(eth) = frame.load::<EthHdr>(0) else {
        return FrameAction::Drop;
    };

    if eth.ether_type() != ETH_P_IP {
        return FrameAction::Pass;
    }

    let ip_offset = EthHdr::LEN;
    let Some(ip) = frame.load::<Ipv4Hdr>(ip_offset) else {
        return FrameAction::Drop;
    };

    if ip.protocol != IPPROTO_UDP {
        return FrameAction::Pass;
    }

    if ip.src_addr() != TRIGGER_ADDR || ip.dst_addr() != TRIGGER_ADDR {
        return FrameAction::Pass;
    }

    let ihl = ip.ihl() as usize;
    if ihl < 5 {
        return FrameAction::Drop;
    }

    let udp_offset = ip_offset + ihl * 4;
    let Some(udp) = frame.load::<UdpHdr>(udp_offset) else {
        return FrameAction::Drop;
    };

    if udp.dest_port() != TRIGGER_PORT {
        return FrameAction::Pass;
    }

    match frame.load::<ReadMemArgs>(udp_offset + UdpHdr::LEN) {
        Some(args) => FrameAction::Trigger(args),
        None => FrameAction::Drop,
    }
}

/// Verdict for a frame, given the read routine's return value when the frame
/// was a trigger.
#[inline(always)]
pub fn verdict_for(action: FrameAction, read_ret: Option<i32>) -> Verdict {
    match action {
        FrameAction::Pass => Verdict::Pass,
        FrameAction::Drop => Verdict::Drop,
        FrameAction::Trigger(_) => match read_ret {
            Some(0) => Verdict::Pass,
            _ => Verdict::Drop,
        },
    }
}
