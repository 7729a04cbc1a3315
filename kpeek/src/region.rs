// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use kpeek_common::ReadMemArgs;

/// Parses a `0x`-prefixed hex or a decimal number.
pub fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };

    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Parses a region given as `ADDR:SIZE`.
pub fn parse_region(s: &str) -> Result<ReadMemArgs, String> {
    let Some((addr, size)) = s.split_once(':') else {
        return Err(format!("invalid region '{s}', expected ADDR:SIZE"));
    };

    Ok(ReadMemArgs::new(parse_u64(addr)?, parse_u64(size)?))
}
