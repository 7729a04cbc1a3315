// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The kpeek Authors

use std::{ffi::c_void, io, num::NonZeroUsize, os::fd::AsFd as _, ptr::NonNull};

use anyhow::{anyhow, bail};
use aya::{
    maps::{Map, MapData},
    Ebpf,
};
use kpeek_common::{ReadMemResult, EINVAL, HUGE_PAGE_SIZE, RESULT_MAP};
use nix::{
    sys::mman::{mmap, munmap, MapFlags, ProtFlags},
    unistd::{sysconf, SysconfVar},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("invalid argument: size too large or address outside the kernel range")]
    InvalidArgument,

    #[error("kernel copy failed: {}", io::Error::from_raw_os_error(*errno))]
    CopyFailed { errno: i32 },

    #[error("unexpected return code {0} in the result buffer")]
    UnexpectedRetCode(i32),

    #[error("failed to send trigger datagram")]
    Trigger(#[from] io::Error),
}

/// Interprets the status word of the result buffer.
pub fn outcome(ret_code: i32) -> Result<(), ReadError> {
    match ret_code {
        0 => Ok(()),
        code if code == -EINVAL => Err(ReadError::InvalidArgument),
        code if code < 0 => Err(ReadError::CopyFailed { errno: -code }),
        code => Err(ReadError::UnexpectedRetCode(code)),
    }
}

/// Read-only view of the result map, through a shared memory mapping.
///
/// The in-kernel program is the only writer; nothing here ever writes.
pub struct ResultBuffer {
    ptr: NonNull<c_void>,
    len: usize,
    // Keeps the map fd alive for as long as the mapping exists.
    _map: MapData,
}

// The mapping is only ever read, through volatile loads and copies.
unsafe impl Send for ResultBuffer {}

impl ResultBuffer {
    pub fn from_ebpf(ebpf: &mut Ebpf) -> anyhow::Result<Self> {
        match ebpf.take_map(RESULT_MAP) {
            Some(Map::Array(map)) => Self::map(map),
            Some(_) => bail!("{RESULT_MAP} is not an array map"),
            None => bail!("{RESULT_MAP} map not found"),
        }
    }

    pub fn map(map: MapData) -> anyhow::Result<Self> {
        let page_size = sysconf(SysconfVar::PAGE_SIZE)?
            .ok_or_else(|| anyhow!("page size is unknown"))? as usize;
        let len = ReadMemResult::LEN.div_ceil(page_size) * page_size;

        let ptr = unsafe {
            mmap(
                None,
                NonZeroUsize::new(len).ok_or_else(|| anyhow!("empty result buffer"))?,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                map.fd().as_fd(),
                0,
            )?
        };

        Ok(ResultBuffer {
            ptr,
            len,
            _map: map,
        })
    }

    fn base(&self) -> *const u8 {
        self.ptr.as_ptr() as *const u8
    }

    pub fn ret_code(&self) -> i32 {
        // SAFETY: the mapping covers the whole ReadMemResult.
        unsafe {
            std::ptr::read_volatile(
                self.base().add(ReadMemResult::RET_CODE_OFFSET) as *const i32
            )
        }
    }

    /// Copies the first `size` bytes of the payload. Only meaningful when
    /// `ret_code()` is 0.
    pub fn payload(&self, size: usize) -> Vec<u8> {
        let size = size.min(HUGE_PAGE_SIZE);
        let mut bytes = vec![0u8; size];

        // SAFETY: BUF_OFFSET + size stays within the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base().add(ReadMemResult::BUF_OFFSET),
                bytes.as_mut_ptr(),
                size,
            );
        }

        bytes
    }

    /// Outcome of the last invocation and, on success, its payload.
    pub fn take(&self, size: usize) -> Result<Vec<u8>, ReadError> {
        outcome(self.ret_code())?;
        Ok(self.payload(size))
    }
}

impl Drop for ResultBuffer {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
            log::error!("Failed to unmap result buffer: {e}");
        }
    }
}
