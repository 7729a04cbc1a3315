// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

fn main() -> anyhow::Result<()> {
    aya_build::build_ebpf(
        [aya_build::Package {
            name: "kpeek-ebpf",
            root_dir: "../kpeek-ebpf",
            no_default_features: false,
            features: &[],
        }],
        aya_build::Toolchain::Custom("nightly-2025-12-12"),
    )?;

    Ok(())
}
