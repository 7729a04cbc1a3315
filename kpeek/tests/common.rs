// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

#![allow(dead_code)]

use std::{ffi::CString, fs::File, os::unix::fs::FileExt as _};

use kpeek::{kallsyms, Collector, LoaderConfig, Trigger};
use once_cell::sync::Lazy;

/// Address of the start of the kernel image, KASLR included.
pub static KERNEL_TEXT: Lazy<u64> = Lazy::new(|| {
    kallsyms::symbol_address("_text").expect("_text not found, is kptr_restrict in the way?")
});

pub fn ensure_root() {
    assert_eq!(
        unsafe { libc::geteuid() },
        0,
        "Need to run test as root (using, for instance, cargo sudo)"
    );
}

pub async fn collector(trigger: Trigger) -> Collector {
    let ebpf = kpeek::load(&LoaderConfig::for_trigger(trigger))
        .unwrap_or_else(|e| panic!("Failed to load eBPF programs for {trigger:?}: {e:#}"));
    Collector::new(ebpf).unwrap()
}

const PT_LOAD: u32 = 1;

/// Reads kernel memory through the `PT_LOAD` segments of `/proc/kcore`,
/// independently of the eBPF path.
pub fn read_kcore(addr: u64, size: usize) -> Vec<u8> {
    let kcore = File::open("/proc/kcore").expect("Failed to open /proc/kcore");

    let mut ehdr = [0u8; 64];
    kcore.read_exact_at(&mut ehdr, 0).unwrap();
    assert_eq!(&ehdr[..4], b"\x7fELF");

    let phoff = u64::from_ne_bytes(ehdr[0x20..0x28].try_into().unwrap());
    let phentsize = u16::from_ne_bytes(ehdr[0x36..0x38].try_into().unwrap()) as u64;
    let phnum = u16::from_ne_bytes(ehdr[0x38..0x3a].try_into().unwrap()) as u64;

    for i in 0..phnum {
        let mut phdr = [0u8; 56];
        kcore
            .read_exact_at(&mut phdr, phoff + i * phentsize)
            .unwrap();

        let p_type = u32::from_ne_bytes(phdr[0..4].try_into().unwrap());
        let p_offset = u64::from_ne_bytes(phdr[8..16].try_into().unwrap());
        let p_vaddr = u64::from_ne_bytes(phdr[16..24].try_into().unwrap());
        let p_filesz = u64::from_ne_bytes(phdr[32..40].try_into().unwrap());

        if p_type != PT_LOAD || addr < p_vaddr || addr + size as u64 > p_vaddr + p_filesz {
            continue;
        }

        let mut bytes = vec![0u8; size];
        kcore
            .read_exact_at(&mut bytes, p_offset + (addr - p_vaddr))
            .unwrap();
        return bytes;
    }

    panic!("{addr:#x}+{size} is not covered by /proc/kcore");
}

/// Puts `frame` on the wire of `interface` as is, through an `AF_PACKET`
/// socket. Frames sent on lo come back through its receive path.
pub fn send_raw_frame(interface: &str, frame: &[u8]) {
    let name = CString::new(interface).unwrap();
    let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
    assert_ne!(ifindex, 0, "No such interface: {interface}");

    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW,
            (libc::ETH_P_ALL as u16).to_be() as i32,
        )
    };
    assert!(fd >= 0, "{}", std::io::Error::last_os_error());

    let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
    sll.sll_family = libc::AF_PACKET as u16;
    sll.sll_ifindex = ifindex as i32;
    sll.sll_halen = 6;

    let sent = unsafe {
        libc::sendto(
            fd,
            frame.as_ptr() as *const libc::c_void,
            frame.len(),
            0,
            &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    let err = std::io::Error::last_os_error();
    unsafe { libc::close(fd) };

    assert_eq!(sent, frame.len() as isize, "{err}");
}
