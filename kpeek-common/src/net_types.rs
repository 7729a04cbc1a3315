// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

// Multi-byte fields are kept in network byte order, as they sit in the frame.

pub const ETH_P_IP: u16 = 0x0800;
pub const IPPROTO_UDP: u8 = 17;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct EthHdr {
    pub h_dest: [u8; 6],
    pub h_source: [u8; 6],
    pub h_proto: u16,
}

impl EthHdr {
    pub const LEN: usize = core::mem::size_of::<Self>();

    #[inline(always)]
    pub fn ether_type(&self) -> u16 {
        u16::from_be(self.h_proto)
    }
}

/// Fixed part of the IPv4 header, options excluded.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct Ipv4Hdr {
    pub version_ihl: u8,
    pub tos: u8,
    pub tot_len: u16,
    pub id: u16,
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub check: u16,
    pub saddr: u32,
    pub daddr: u32,
}

impl Ipv4Hdr {
    pub const LEN: usize = core::mem::size_of::<Self>();

    /// Header length in 32-bit words.
    #[inline(always)]
    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0f
    }

    #[inline(always)]
    pub fn src_addr(&self) -> u32 {
        u32::from_be(self.saddr)
    }

    #[inline(always)]
    pub fn dst_addr(&self) -> u32 {
        u32::from_be(self.daddr)
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct UdpHdr {
    pub source: u16,
    pub dest: u16,
    pub len: u16,
    pub check: u16,
}

impl UdpHdr {
    pub const LEN: usize = core::mem::size_of::<Self>();

    #[inline(always)]
    pub fn dest_port(&self) -> u16 {
        u16::from_be(self.dest)
    }
}
