// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use parking_lot::{Mutex, MutexGuard};

use super::ResourceAllocator;
use crate::core::Result;

/// Fixed-size host byte buffer, pooled for per-frame scratch space.
pub struct HostBuffer {
    data: Mutex<Vec<u8>>,
    len: usize,
}

impl HostBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; len]),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exclusive access to the bytes. Contents are whatever the previous
    /// holder left behind.
    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }
}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer").field("len", &self.len).finish()
    }
}

/// Allocates [`HostBuffer`]s of one size.
#[derive(Debug, Clone, Copy)]
pub struct HostBufferAllocator {
    pub len: usize,
}

impl ResourceAllocator<HostBuffer> for HostBufferAllocator {
    fn allocate(&self) -> Result<HostBuffer> {
        Ok(HostBuffer::new(self.len))
    }
}
