// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! ResourcePool - bounded pool of reusable buffers with blocking acquisition.

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::core::{PipelineError, Result};

/// Creates the buffers a pool hands out. Every buffer has the same shape.
pub trait ResourceAllocator<T>: Send + Sync {
    fn allocate(&self) -> Result<T>;
}

impl<T, F> ResourceAllocator<T> for F
where
    F: Fn() -> Result<T> + Send + Sync,
{
    fn allocate(&self) -> Result<T> {
        self()
    }
}

/// Unique identifier for a pool slot. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolSlotId(u64);

impl PoolSlotId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Configuration for a resource pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Buffers allocated up front, and the growth batch size.
    pub initial_size: usize,
    /// Upper bound on allocated buffers when `dynamic`.
    pub max_size: usize,
    /// When false the pool never grows past `initial_size`.
    pub dynamic: bool,
    /// Default wait used by [`ResourcePool::acquire_default`].
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 2,
            max_size: 8,
            dynamic: true,
            acquire_timeout_ms: 1000,
        }
    }
}

impl PoolConfig {
    pub fn fixed(size: usize) -> Self {
        Self {
            initial_size: size,
            max_size: size,
            dynamic: false,
            ..Default::default()
        }
    }

    /// Effective capacity: `max_size` when dynamic, otherwise `initial_size`.
    pub fn capacity(&self) -> usize {
        if self.dynamic {
            self.max_size
        } else {
            self.initial_size
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity() == 0 {
            return Err(PipelineError::Configuration(
                "pool capacity must be at least 1".into(),
            ));
        }
        if self.dynamic && self.initial_size > self.max_size {
            return Err(PipelineError::Configuration(format!(
                "pool initial_size {} exceeds max_size {}",
                self.initial_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Statistics about pool usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_allocated: usize,
    pub in_use: usize,
    pub available: usize,
    pub capacity: usize,
    /// Callers currently blocked in acquire.
    pub waiters: usize,
}

struct PoolState<T> {
    free: VecDeque<(PoolSlotId, Arc<T>)>,
    in_use: HashMap<PoolSlotId, Arc<T>>,
    /// Batches being allocated outside the lock.
    reserved: usize,
    waiters: usize,
}

impl<T> PoolState<T> {
    fn total(&self) -> usize {
        self.free.len() + self.in_use.len()
    }
}

/// Inner pool state, shared with every outstanding lease.
struct PoolShared<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    destroying: AtomicBool,
    next_slot_id: AtomicU64,
    allocator: Arc<dyn ResourceAllocator<T>>,
    config: PoolConfig,
}

impl<T> PoolShared<T> {
    fn next_slot_id(&self) -> PoolSlotId {
        PoolSlotId(self.next_slot_id.fetch_add(1, Ordering::Relaxed))
    }

    fn release(&self, slot_id: PoolSlotId) {
        if self.destroying.load(Ordering::Acquire) {
            return;
        }
        let mut state = self.state.lock();
        // Checked again under the lock; teardown clears state while holding it.
        if self.destroying.load(Ordering::Acquire) {
            return;
        }
        if let Some(resource) = state.in_use.remove(&slot_id) {
            state.free.push_back((slot_id, resource));
            self.available.notify_one();
        }
    }

    fn lend(
        self: &Arc<Self>,
        state: &mut PoolState<T>,
        slot_id: PoolSlotId,
        resource: Arc<T>,
    ) -> PooledResource<T> {
        state.in_use.insert(slot_id, Arc::clone(&resource));
        PooledResource {
            lease: Arc::new(Lease {
                slot_id,
                resource,
                shared: Arc::clone(self),
            }),
        }
    }

    /// Allocate up to `count` buffers with the lock released.
    fn grow(
        self: &Arc<Self>,
        state: &mut MutexGuard<'_, PoolState<T>>,
        count: usize,
    ) -> Result<()> {
        state.reserved += count;
        let (fresh, failure) = MutexGuard::unlocked(state, || {
            let mut fresh = Vec::with_capacity(count);
            let mut failure = None;
            for _ in 0..count {
                match self.allocator.allocate() {
                    Ok(resource) => fresh.push(resource),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            (fresh, failure)
        });
        state.reserved -= count;

        let added = fresh.len();
        for resource in fresh {
            let slot_id = self.next_slot_id();
            state.free.push_back((slot_id, Arc::new(resource)));
        }
        if added > 1 {
            self.available.notify_all();
        }
        match failure {
            Some(err) if added == 0 => Err(err),
            Some(err) => {
                tracing::warn!(added, requested = count, %err, "Pool grew by a partial batch");
                Ok(())
            }
            None => Ok(())
        }
    }
}

/// Ownership of one lent slot. Dropping it returns the slot.
struct Lease<T> {
    slot_id: PoolSlotId,
    resource: Arc<T>,
    shared: Arc<PoolShared<T>>,
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        self.shared.release(self.slot_id);
    }
}

/// Handle to a pooled buffer. The slot returns to the pool when the last
/// clone of the handle drops.
pub struct PooledResource<T> {
    lease: Arc<Lease<T>>,
}

impl<T> Clone for PooledResource<T> {
    fn clone(&self) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
        }
    }
}

impl<T> PooledResource<T> {
    pub fn slot_id(&self) -> PoolSlotId {
        self.lease.slot_id
    }
}

impl<T> Deref for PooledResource<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.lease.resource
    }
}

impl<T> std::fmt::Debug for PooledResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledResource")
            .field("slot_id", &self.lease.slot_id)
            .finish()
    }
}

/// Marks the pool destroyed when the last [`ResourcePool`] clone goes away.
struct PoolOwner<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Drop for PoolOwner<T> {
    fn drop(&mut self) {
        self.shared.destroying.store(true, Ordering::Release);
        let mut state = self.shared.state.lock();
        state.free.clear();
        self.shared.available.notify_all();
    }
}

/// Bounded pool of reusable buffers.
///
/// Buffers are allocated lazily in batches up to the configured capacity.
/// When every buffer is lent out, acquirers block until one is returned or
/// their deadline passes. Outstanding handles keep the shared state alive,
/// so dropping the pool while slots are lent is safe; those releases become
/// no-ops.
pub struct ResourcePool<T> {
    owner: Arc<PoolOwner<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
        }
    }
}

impl<T: Send + Sync + 'static> ResourcePool<T> {
    /// Create a pool and pre-allocate `initial_size` buffers.
    pub fn new(config: PoolConfig, allocator: impl ResourceAllocator<T> + 'static) -> Result<Self> {
        Self::with_allocator(config, Arc::new(allocator))
    }

    pub fn with_allocator(
        config: PoolConfig,
        allocator: Arc<dyn ResourceAllocator<T>>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                free: VecDeque::new(),
                in_use: HashMap::new(),
                reserved: 0,
                waiters: 0,
            }),
            available: Condvar::new(),
            destroying: AtomicBool::new(false),
            next_slot_id: AtomicU64::new(0),
            allocator,
            config,
        });

        let initial = shared.config.initial_size.min(shared.config.capacity());
        for _ in 0..initial {
            let resource = shared.allocator.allocate()?;
            let slot_id = shared.next_slot_id();
            shared.state.lock().free.push_back((slot_id, Arc::new(resource)));
        }
        tracing::debug!(
            initial,
            capacity = shared.config.capacity(),
            "Resource pool created"
        );

        Ok(Self {
            owner: Arc::new(PoolOwner { shared }),
        })
    }

    fn shared(&self) -> &Arc<PoolShared<T>> {
        &self.owner.shared
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared().config
    }

    /// Acquire a buffer, waiting until `deadline` (forever when `None`).
    ///
    /// Returns `Ok(None)` when no buffer became free in time. Errors only
    /// come from the allocator while growing.
    pub fn acquire(&self, deadline: Option<Instant>) -> Result<Option<PooledResource<T>>> {
        let shared = self.shared();
        let capacity = shared.config.capacity();
        let batch = shared.config.initial_size.max(1);
        let mut state = shared.state.lock();

        loop {
            if let Some((slot_id, resource)) = state.free.pop_front() {
                return Ok(Some(shared.lend(&mut state, slot_id, resource)));
            }

            let committed = state.total() + state.reserved;
            if committed < capacity {
                shared.grow(&mut state, batch.min(capacity - committed))?;
                continue;
            }

            let timed_out = match deadline {
                None => {
                    state.waiters += 1;
                    shared.available.wait(&mut state);
                    state.waiters -= 1;
                    false
                }
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    state.waiters += 1;
                    let result = shared.available.wait_until(&mut state, deadline);
                    state.waiters -= 1;
                    result.timed_out()
                }
            };

            if timed_out {
                // Check one more time before giving up
                if let Some((slot_id, resource)) = state.free.pop_front() {
                    return Ok(Some(shared.lend(&mut state, slot_id, resource)));
                }
                return Ok(None);
            }
        }
    }

    /// Acquire without waiting.
    pub fn try_acquire(&self) -> Result<Option<PooledResource<T>>> {
        self.acquire(Some(Instant::now()))
    }

    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Option<PooledResource<T>>> {
        self.acquire(Some(Instant::now() + timeout))
    }

    /// Acquire using the configured `acquire_timeout_ms`.
    pub fn acquire_default(&self) -> Result<Option<PooledResource<T>>> {
        self.acquire_timeout(Duration::from_millis(self.config().acquire_timeout_ms))
    }

    /// Buffer currently lent out under `slot_id`.
    pub fn lookup(&self, slot_id: PoolSlotId) -> Option<Arc<T>> {
        self.shared().state.lock().in_use.get(&slot_id).cloned()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared().state.lock();
        PoolStats {
            total_allocated: state.total(),
            in_use: state.in_use.len(),
            available: state.free.len(),
            capacity: self.shared().config.capacity(),
            waiters: state.waiters,
        }
    }
}

impl<T> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.owner.shared.state.lock();
        f.debug_struct("ResourcePool")
            .field("total_allocated", &state.total())
            .field("in_use", &state.in_use.len())
            .field("available", &state.free.len())
            .field("capacity", &self.owner.shared.config.capacity())
            .finish()
    }
}
