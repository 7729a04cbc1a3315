// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use std::io::Write as _;

use flate2::{write::GzEncoder, Compression};
use indoc::indoc;
use kpeek_common::Arch;

use crate::va_bits::{
    from_kernel_address, from_user_address, parse_kconfig, parse_stack_top, read_config, resolve,
    runtime_width, supported_widths, VaBits, KCONFIG_SYMBOL,
};

const CONFIG: &str = indoc! {"
    #
    # Automatically generated file; DO NOT EDIT.
    # Linux/arm64 6.8.0 Kernel Configuration
    #
    CONFIG_ARM64_4K_PAGES=y
    # CONFIG_ARM64_VA_BITS_39 is not set
    CONFIG_ARM64_VA_BITS_48=y
    CONFIG_ARM64_VA_BITS=48
    CONFIG_ARM64_PA_BITS=48
"};

const MAPS: &str = indoc! {"
    aaaab7e40000-aaaab7f9c000 r-xp 00000000 fe:02 1835263                    /usr/bin/kpeek
    ffff8c1f0000-ffff8c378000 r-xp 00000000 fe:02 1837345                    /usr/lib/aarch64-linux-gnu/libc.so.6
    ffffd5a42000-ffffd5a63000 rw-p 00000000 00:00 0                          [stack]
"};

const PAGES_4K: &[u64] = &[39, 48, 52];

#[test]
fn kconfig_value() {
    assert_eq!(parse_kconfig(CONFIG, KCONFIG_SYMBOL), Some(48));
    assert_eq!(parse_kconfig(CONFIG, "CONFIG_ARM64_PA_BITS"), Some(48));
}

#[test]
fn kconfig_ignores_similar_and_unset_keys() {
    // CONFIG_ARM64_VA_BITS_48=y must not be taken for the width.
    let config = indoc! {"
        CONFIG_ARM64_VA_BITS_48=y
        # CONFIG_ARM64_VA_BITS is not set
    "};
    assert_eq!(parse_kconfig(config, KCONFIG_SYMBOL), None);
    assert_eq!(parse_kconfig("", KCONFIG_SYMBOL), None);
}

#[test]
fn plain_config() {
    let config = read_config(CONFIG.as_bytes(), false).unwrap();
    assert_eq!(parse_kconfig(&config, KCONFIG_SYMBOL), Some(48));
}

#[test]
fn gzipped_config() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(CONFIG.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let config = read_config(compressed.as_slice(), true).unwrap();
    assert_eq!(config, CONFIG);
    assert_eq!(parse_kconfig(&config, KCONFIG_SYMBOL), Some(48));
}

#[test]
fn corrupt_gzipped_config() {
    assert!(read_config(CONFIG.as_bytes(), true).is_err());
}

#[test]
fn widths_per_page_size() {
    assert_eq!(supported_widths(4096), PAGES_4K);
    assert_eq!(supported_widths(16384), &[36, 47, 48, 52]);
    assert_eq!(supported_widths(65536), &[42, 48, 52]);
}

#[test]
fn width_from_kernel_image_address() {
    assert_eq!(from_kernel_address(0xffff_8000_0801_0000, PAGES_4K), Some(48));
    assert_eq!(from_kernel_address(0xffff_ffc0_0801_0000, PAGES_4K), Some(39));
}

#[test]
fn width_from_randomized_kernel_image_address() {
    // Past the midpoint of the upper half, one more leading one.
    assert_eq!(from_kernel_address(0xffff_c000_1000_0000, PAGES_4K), Some(48));
    assert_eq!(from_kernel_address(0xffff_dcfd_0000_0000, PAGES_4K), Some(48));
    assert_eq!(from_kernel_address(0xffff_9eff_0000_0000, PAGES_4K), Some(48));
    assert_eq!(from_kernel_address(0xffff_ffe0_1000_0000, PAGES_4K), Some(39));
    assert_eq!(from_kernel_address(0xffff_ff00_1000_0000, &[42, 48, 52]), Some(42));
}

#[test]
fn width_from_nonsense_kernel_address() {
    assert_eq!(from_kernel_address(0, PAGES_4K), None);
    assert_eq!(from_kernel_address(0x0000_7fff_0000_0000, PAGES_4K), None);
    assert_eq!(from_kernel_address(u64::MAX, PAGES_4K), None);
    assert_eq!(from_kernel_address(0xffe0_0000_0000_0000, PAGES_4K), None);
}

#[test]
fn randomized_kernel_image_is_canonicalized_correctly() {
    let va_bits = from_kernel_address(0xffff_c000_1000_0000, PAGES_4K).unwrap();

    // A linear map address must not grow bit 47.
    assert_eq!(
        kpeek_common::check_address(Arch::Aarch64, 0xffff_0000_4000_0000, va_bits),
        Ok(0xffff_0000_4000_0000)
    );
}

#[test]
fn width_from_user_stack() {
    assert_eq!(parse_stack_top(MAPS), Some(0xffff_d5a6_3000));
    assert_eq!(from_user_address(0xffff_d5a6_3000, PAGES_4K), Some(48));
    assert_eq!(from_user_address(0x7f_fc4a_1000, PAGES_4K), Some(39));
    assert_eq!(from_user_address(0x7fff_fc4a_1000, &[36, 47, 48, 52]), Some(47));
    assert_eq!(from_user_address(0, PAGES_4K), None);
    assert_eq!(parse_stack_top("aaaab7e40000-aaaab7f9c000 r-xp"), None);
}

#[test]
fn runtime_estimates_combine_to_the_larger() {
    // 16K pages, 48 bit kernel whose image was randomized high.
    let widths = supported_widths(16384);
    let kernel = from_kernel_address(0xffff_c000_1000_0000, widths);
    let user = from_user_address(0xffff_d5a6_3000, widths);
    assert_eq!(kernel, Some(47));
    assert_eq!(runtime_width(kernel, user), Some(48));

    assert_eq!(runtime_width(None, Some(39)), Some(39));
    assert_eq!(runtime_width(Some(48), None), Some(48));
    assert_eq!(runtime_width(None, None), None);
}

#[test]
fn kconfig_slot_takes_priority() {
    let bits = VaBits {
        kconfig: 48,
        runtime: 39,
    };
    assert_eq!(bits.effective(), 48);

    let bits = VaBits {
        kconfig: 0,
        runtime: 39,
    };
    assert_eq!(bits.effective(), 39);
}

#[test]
fn not_needed_off_aarch64() {
    assert_eq!(resolve(Arch::X86_64, None).unwrap(), VaBits::default());
    assert_eq!(resolve(Arch::Unsupported, Some(48)).unwrap(), VaBits::default());
}

#[test]
fn override_wins() {
    assert_eq!(
        resolve(Arch::Aarch64, Some(52)).unwrap(),
        VaBits {
            kconfig: 0,
            runtime: 52
        }
    );
}
