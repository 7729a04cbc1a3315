// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use std::{io, net::Ipv4Addr};

use kpeek_common::{ReadMemArgs, TRIGGER_ADDR, TRIGGER_PORT};
use log::trace;
use tokio::net::UdpSocket;

/// The uprobe trigger is attached to this function's entry; calling it is a
/// read request. The body does not matter.
#[no_mangle]
#[inline(never)]
pub extern "C" fn read_kernel_memory(addr: u64, size: u64) {
    std::hint::black_box((addr, size));
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Trigger {
    /// Call the probed stub function
    #[default]
    Uprobe,
    /// Send a loopback datagram to the XDP program
    Xdp,
}

/// Returns once the uprobe handler has run.
pub fn fire_uprobe(args: ReadMemArgs) {
    trace!("uprobe trigger for {:#x}+{}", args.addr, args.size);
    read_kernel_memory(args.addr, args.size);
}

/// Sends the trigger datagram. The XDP program runs asynchronously in the
/// receive path, callers have to give it time before looking at the result.
pub async fn fire_xdp(args: ReadMemArgs) -> io::Result<()> {
    send_datagram(args, TRIGGER_PORT).await
}

pub async fn send_datagram(args: ReadMemArgs, port: u16) -> io::Result<()> {
    let loopback = Ipv4Addr::from(TRIGGER_ADDR);
    let socket = UdpSocket::bind((loopback, 0)).await?;

    trace!(
        "datagram trigger for {:#x}+{} to {loopback}:{port}",
        args.addr,
        args.size
    );

    let sent = socket.send_to(&args.to_ne_bytes(), (loopback, port)).await?;
    if sent != ReadMemArgs::LEN {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short trigger datagram: {sent} bytes"),
        ));
    }

    Ok(())
}
