// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

// Build scripts run on the host, so this pins the architecture the eBPF object
// validates addresses for, even though the object itself targets `bpf`.
fn main() {
    println!("cargo::rustc-check-cfg=cfg(aarch64)");
    println!("cargo::rustc-check-cfg=cfg(x86_64)");

    #[cfg(target_arch = "aarch64")]
    println!("cargo::rustc-cfg=aarch64");

    #[cfg(target_arch = "x86_64")]
    println!("cargo::rustc-cfg=x86_64");
}
