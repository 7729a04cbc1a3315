// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use aya::Ebpf;
use kpeek_common::ReadMemArgs;
use log::debug;
use tokio::time::{sleep, Duration};

use crate::{
    result::{ReadError, ResultBuffer},
    trigger::{fire_uprobe, fire_xdp, Trigger},
};

/// Time given to the XDP program to process a trigger datagram before the
/// result buffer is looked at.
pub const DEFAULT_QUIESCE: Duration = Duration::from_millis(10);

/// Issues reads one at a time and collects their results.
///
/// There is a single result slot and no locking on the kernel side, so a read
/// must be consumed before the next one is triggered. Taking `&mut self` for
/// every read is what enforces that here.
pub struct Collector {
    // We hold the ebpf object even if it is never accessed, the programs are
    // detached when it goes out of scope.
    _ebpf: Ebpf,
    buffer: ResultBuffer,
    quiesce: Duration,
}

impl Collector {
    pub fn new(mut ebpf: Ebpf) -> anyhow::Result<Self> {
        let buffer = ResultBuffer::from_ebpf(&mut ebpf)?;

        Ok(Collector {
            _ebpf: ebpf,
            buffer,
            quiesce: DEFAULT_QUIESCE,
        })
    }

    pub fn with_quiesce(mut self, quiesce: Duration) -> Self {
        self.quiesce = quiesce;
        self
    }

    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    pub async fn read(
        &mut self,
        trigger: Trigger,
        addr: u64,
        size: u64,
    ) -> Result<Vec<u8>, ReadError> {
        let args = ReadMemArgs::new(addr, size);

        match trigger {
            Trigger::Uprobe => fire_uprobe(args),
            Trigger::Xdp => {
                fire_xdp(args).await?;
                sleep(self.quiesce).await;
            }
        }

        let ret_code = self.buffer.ret_code();
        debug!("read {addr:#x}+{size} via {trigger:?}: ret_code {ret_code}");

        self.buffer.take(size as usize)
    }

    /// Reads each region in turn, results come back in the same order.
    pub async fn read_many(
        &mut self,
        trigger: Trigger,
        regions: &[ReadMemArgs],
    ) -> Vec<Result<Vec<u8>, ReadError>> {
        let mut results = Vec::with_capacity(regions.len());
        for region in regions {
            results.push(self.read(trigger, region.addr, region.size).await);
        }
        results
    }
}
