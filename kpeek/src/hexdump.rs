// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use std::io::{self, Write};

const BYTES_PER_LINE: usize = 16;

/// Writes `bytes` as a canonical hex dump, labelling lines with the kernel
/// address they were read from.
pub fn write_hexdump<W: Write>(out: &mut W, base: u64, bytes: &[u8]) -> io::Result<()> {
    for (i, line) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let addr = base.wrapping_add((i * BYTES_PER_LINE) as u64);
        write!(out, "{addr:016x} ")?;

        for column in 0..BYTES_PER_LINE {
            if column % 8 == 0 {
                write!(out, " ")?;
            }
            match line.get(column) {
                Some(byte) => write!(out, "{byte:02x} ")?,
                None => write!(out, "   ")?,
            }
        }

        let ascii: String = line
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        writeln!(out, " |{ascii}|")?;
    }

    Ok(())
}
