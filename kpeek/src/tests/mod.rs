// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

mod va_bits;
