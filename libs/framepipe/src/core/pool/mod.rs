// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod host_buffer;
mod resource_pool;

pub use host_buffer::{HostBuffer, HostBufferAllocator};
pub use resource_pool::{
    PoolConfig, PoolSlotId, PoolStats, PooledResource, ResourceAllocator, ResourcePool,
};
