// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use anyhow::{anyhow, Context as _};

pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Finds `name` in the contents of `/proc/kallsyms`.
///
/// Readers without the right privileges see every address as zero, those are
/// treated as not found.
pub fn lookup(kallsyms: &str, name: &str) -> Option<u64> {
    kallsyms.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let addr = fields.next()?;
        let _kind = fields.next()?;
        let symbol = fields.next()?;

        if symbol != name {
            return None;
        }

        match u64::from_str_radix(addr, 16) {
            Ok(0) | Err(_) => None,
            Ok(addr) => Some(addr),
        }
    })
}

pub fn symbol_address(name: &str) -> anyhow::Result<u64> {
    let kallsyms = std::fs::read_to_string(KALLSYMS_PATH)
        .with_context(|| format!("Failed to read {KALLSYMS_PATH}"))?;

    lookup(&kallsyms, name).ok_or_else(|| {
        anyhow!("Symbol {name} not found in {KALLSYMS_PATH}, or its address is hidden")
    })
}
