// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

//! Userspace side of kpeek: loads the in-kernel read routine, triggers reads
//! and collects their results from the shared result buffer.

pub mod collector;
pub mod hexdump;
pub mod kallsyms;
pub mod loader;
pub mod region;
pub mod result;
pub mod trigger;
pub mod va_bits;

#[cfg(test)]
mod tests;

pub use collector::Collector;
pub use loader::{load, LoaderConfig, Triggers, XdpMode};
pub use result::{ReadError, ResultBuffer};
pub use trigger::Trigger;
