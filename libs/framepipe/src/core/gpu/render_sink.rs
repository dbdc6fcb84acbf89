// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use parking_lot::Mutex;

use super::{FrameTextureBinder, GpuBackend, RenderTarget, RenderTargetAllocator};
use crate::core::frames::{Rational, VideoFrame};
use crate::core::pool::{PoolConfig, PooledResource, ResourcePool};
use crate::core::sink::FrameSink;
use crate::core::{PipelineError, Result};

/// Whether rendering currently works.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderHealth {
    /// Set by a failed frame, cleared by the next good one.
    pub degraded: bool,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_presented: u64,
    pub frames_failed: u64,
    /// Frames skipped because every render target was still held.
    pub frames_dropped: u64,
}

struct TargetPool {
    width: u32,
    height: u32,
    pool: ResourcePool<RenderTarget>,
}

struct RenderState {
    binder: FrameTextureBinder,
    targets: Option<TargetPool>,
    presented: Option<PooledResource<RenderTarget>>,
    health: RenderHealth,
    stats: RenderStats,
}

/// Raw-frame sink that draws each frame into a pooled render target.
///
/// The last presented target stays checked out until the next frame
/// replaces it, so the pool needs room for at least two. A frame that fails
/// to import or draw is dropped and the sink reports itself degraded; the
/// pipeline keeps running.
pub struct RenderSink {
    name: String,
    gpu: Arc<dyn GpuBackend>,
    pool_config: PoolConfig,
    state: Mutex<RenderState>,
}

impl RenderSink {
    pub fn new(gpu: Arc<dyn GpuBackend>, pool_config: PoolConfig) -> Result<Self> {
        pool_config.validate()?;
        if pool_config.capacity() < 2 {
            return Err(PipelineError::Configuration(
                "render pool needs at least two targets".into(),
            ));
        }
        Ok(Self {
            name: format!("render:{}", gpu.name()),
            state: Mutex::new(RenderState {
                binder: FrameTextureBinder::new(Arc::clone(&gpu)),
                targets: None,
                presented: None,
                health: RenderHealth::default(),
                stats: RenderStats::default(),
            }),
            gpu,
            pool_config,
        })
    }

    /// The most recently completed target.
    pub fn presented(&self) -> Option<PooledResource<RenderTarget>> {
        self.state.lock().presented.clone()
    }

    pub fn health(&self) -> RenderHealth {
        self.state.lock().health.clone()
    }

    pub fn stats(&self) -> RenderStats {
        self.state.lock().stats
    }

    pub fn gpu(&self) -> &Arc<dyn GpuBackend> {
        &self.gpu
    }

    /// Draw `frame`. `Ok(false)` when no target freed up in time.
    fn render(&self, state: &mut RenderState, frame: &VideoFrame) -> Result<bool> {
        let (width, height) = (frame.width, frame.height);
        let rebuild = state
            .targets
            .as_ref()
            .is_none_or(|t| (t.width, t.height) != (width, height));
        if rebuild {
            let pool = ResourcePool::new(self.pool_config.clone(), RenderTargetAllocator { width, height })?;
            tracing::debug!(width, height, "Created render target pool");
            state.targets = Some(TargetPool { width, height, pool });
        }
        let Some(targets) = &state.targets else {
            return Ok(false);
        };
        let Some(target) = targets.pool.acquire_default()? else {
            return Ok(false);
        };

        state.binder.bind(frame)?;
        self.gpu.compose(&state.binder.textures(), frame.layout(), &target)?;
        state.presented = Some(target);
        Ok(true)
    }
}

impl FrameSink for RenderSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deinit(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.presented = None;
        state.targets = None;
        state.binder.reset();
        Ok(())
    }

    fn on_frame(&self, frame: VideoFrame, _time_base: Rational, _frame_rate: Rational) -> Result<()> {
        let mut state = self.state.lock();
        match self.render(&mut state, &frame) {
            Ok(true) => {
                state.stats.frames_presented += 1;
                if state.health.degraded {
                    tracing::info!(
                        sink = %self.name,
                        failures = state.health.consecutive_failures,
                        "Rendering recovered"
                    );
                }
                state.health = RenderHealth::default();
                Ok(())
            }
            Ok(false) => {
                state.stats.frames_dropped += 1;
                tracing::warn!(
                    sink = %self.name,
                    frame_number = frame.frame_number,
                    "No render target available, dropping frame"
                );
                Ok(())
            }
            Err(e) => {
                state.stats.frames_failed += 1;
                state.health.degraded = true;
                state.health.consecutive_failures += 1;
                state.health.last_error = Some(e.to_string());
                tracing::warn!(
                    sink = %self.name,
                    frame_number = frame.frame_number,
                    "Render failed, continuing degraded: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RenderSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RenderSink")
            .field("name", &self.name)
            .field("binder", &state.binder)
            .field("health", &state.health)
            .field("stats", &state.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::{FrameTiming, HostPlanes, PixelFormat};
    use crate::core::gpu::HostGpu;
    use bytes::Bytes;

    fn rgba_frame(width: u32, height: u32, fill: u8) -> VideoFrame {
        let len = PixelFormat::Rgba.frame_size(width, height);
        let planes = HostPlanes::from_packed(PixelFormat::Rgba, width, height, Bytes::from(vec![fill; len])).unwrap();
        VideoFrame::from_host(PixelFormat::Rgba, width, height, planes, FrameTiming::default()).unwrap()
    }

    fn rates() -> (Rational, Rational) {
        (Rational::new(1, 30), Rational::new(30, 1))
    }

    #[test]
    fn test_presents_latest_frame() {
        let sink = RenderSink::new(Arc::new(HostGpu::new()), PoolConfig::fixed(2)).unwrap();
        let (tb, fr) = rates();
        sink.on_frame(rgba_frame(2, 2, 7), tb, fr).unwrap();
        sink.on_frame(rgba_frame(2, 2, 9), tb, fr).unwrap();
        let presented = sink.presented().unwrap();
        assert!(presented.snapshot().iter().all(|&b| b == 9));
        assert_eq!(sink.stats().frames_presented, 2);
        assert!(!sink.health().degraded);
    }

    #[test]
    fn test_held_targets_drop_frames() {
        let config = PoolConfig {
            acquire_timeout_ms: 1,
            ..PoolConfig::fixed(2)
        };
        let sink = RenderSink::new(Arc::new(HostGpu::new()), config).unwrap();
        let (tb, fr) = rates();
        sink.on_frame(rgba_frame(2, 2, 1), tb, fr).unwrap();
        let held = sink.presented().unwrap();
        sink.on_frame(rgba_frame(2, 2, 2), tb, fr).unwrap();
        // Both targets are checked out: one by `held`, one presented.
        sink.on_frame(rgba_frame(2, 2, 3), tb, fr).unwrap();
        assert_eq!(sink.stats().frames_dropped, 1);
        drop(held);
        sink.on_frame(rgba_frame(2, 2, 4), tb, fr).unwrap();
        assert_eq!(sink.stats().frames_presented, 3);
    }

    #[test]
    fn test_single_target_pool_rejected() {
        assert!(RenderSink::new(Arc::new(HostGpu::new()), PoolConfig::fixed(1)).is_err());
    }

    #[test]
    fn test_resolution_change_rebuilds_targets() {
        let sink = RenderSink::new(Arc::new(HostGpu::new()), PoolConfig::default()).unwrap();
        let (tb, fr) = rates();
        sink.on_frame(rgba_frame(2, 2, 0), tb, fr).unwrap();
        sink.on_frame(rgba_frame(4, 2, 0), tb, fr).unwrap();
        let presented = sink.presented().unwrap();
        assert_eq!((presented.width(), presented.height()), (4, 2));
    }
}
