// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Two-path frame fan-out shared by pipeline stages.
//!
//! For every frame:
//! 1. Image sinks each get a private display-layout copy. The frame is
//!    converted once; every copy lives in a pooled buffer that returns to
//!    the pool when the sink drops the image.
//! 2. Raw sinks each get a shallow reference, dropped when their callback
//!    returns.
//!
//! Sinks are called in registration order. A failing sink is logged and
//! counted; the remaining sinks still get the frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::convert::FormatConverter;
use crate::core::frames::{ImageFrame, PixelFormat, Rational, VideoFrame};
use crate::core::pool::{HostBuffer, HostBufferAllocator, PoolConfig, PooledResource, ResourcePool};
use crate::core::run_gate::RunGate;
use crate::core::sink::{FrameSink, SinkInterest, SinkTable};
use crate::core::Result;

/// What raw sinks receive for device-resident frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HwFrameMode {
    /// Copy to host memory; raw sinks get the host frame.
    #[default]
    Transfer,
    /// Raw sinks get the device frame itself (for zero-copy import).
    /// Image sinks still get a converted host copy.
    Passthrough,
}

/// Counters for delivered frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub frames_dispatched: u64,
    pub images_delivered: u64,
    pub frames_delivered: u64,
    pub sink_failures: u64,
    /// Image deliveries skipped because no pooled buffer freed up in time.
    pub images_skipped: u64,
    pub converter_rebuilds: u64,
    pub host_transfers: u64,
}

/// Shared, lock-free view of a dispatcher's counters.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    frames_dispatched: AtomicU64,
    images_delivered: AtomicU64,
    frames_delivered: AtomicU64,
    sink_failures: AtomicU64,
    images_skipped: AtomicU64,
    converter_rebuilds: AtomicU64,
    host_transfers: AtomicU64,
}

impl DispatchCounters {
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            images_delivered: self.images_delivered.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            images_skipped: self.images_skipped.load(Ordering::Relaxed),
            converter_rebuilds: self.converter_rebuilds.load(Ordering::Relaxed),
            host_transfers: self.host_transfers.load(Ordering::Relaxed),
        }
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// A stop arrived while waiting out a pause; the rest of the frame was dropped.
    Interrupted,
}

/// Fans frames out to a [`SinkTable`].
///
/// Owned by one stage thread at a time.
pub struct FrameDispatcher {
    sinks: Arc<SinkTable>,
    display_format: PixelFormat,
    hw_frames: HwFrameMode,
    buffer_config: PoolConfig,
    converter: Option<FormatConverter>,
    buffers: Option<ResourcePool<HostBuffer>>,
    buffer_len: usize,
    counters: Arc<DispatchCounters>,
}

impl FrameDispatcher {
    pub fn new(sinks: Arc<SinkTable>, display_format: PixelFormat) -> Self {
        Self {
            sinks,
            display_format,
            hw_frames: HwFrameMode::default(),
            buffer_config: PoolConfig {
                initial_size: 1,
                max_size: 2,
                dynamic: true,
                acquire_timeout_ms: 500,
            },
            converter: None,
            buffers: None,
            buffer_len: 0,
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    pub fn with_hw_frames(mut self, mode: HwFrameMode) -> Self {
        self.hw_frames = mode;
        self
    }

    pub fn with_buffer_pool(mut self, config: PoolConfig) -> Self {
        self.buffer_config = config;
        self.buffers = None;
        self
    }

    pub fn sinks(&self) -> &Arc<SinkTable> {
        &self.sinks
    }

    pub fn counters(&self) -> Arc<DispatchCounters> {
        Arc::clone(&self.counters)
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Current converter, if one has been built.
    pub fn converter(&self) -> Option<&FormatConverter> {
        self.converter.as_ref()
    }

    /// Deliver `frame` to every registered sink.
    ///
    /// `gate` is consulted before each sink call so a pause holds delivery
    /// mid-frame. Errors are stage-fatal (a failed device-to-host copy);
    /// sink failures are not.
    pub fn dispatch(
        &mut self,
        frame: VideoFrame,
        time_base: Rational,
        frame_rate: Rational,
        gate: &RunGate,
    ) -> Result<DispatchOutcome> {
        let image_sinks = self.sinks.snapshot(SinkInterest::IMAGE);
        let raw_sinks = self.sinks.snapshot(SinkInterest::RAW_FRAME);
        if image_sinks.is_empty() && raw_sinks.is_empty() {
            return Ok(DispatchOutcome::Delivered);
        }
        self.counters.frames_dispatched.fetch_add(1, Ordering::Relaxed);

        let needs_host = !image_sinks.is_empty()
            || (!raw_sinks.is_empty() && self.hw_frames == HwFrameMode::Transfer);
        let host = if frame.is_device_resident() && needs_host {
            // Timing and frame number are carried forward by into_host.
            let host = frame.clone().into_host()?;
            self.counters.host_transfers.fetch_add(1, Ordering::Relaxed);
            Some(host)
        } else if frame.is_device_resident() {
            None
        } else {
            Some(frame.clone())
        };

        if let Some(host) = host.as_ref().filter(|_| !image_sinks.is_empty()) {
            let outcome = self.deliver_images(host, &image_sinks, time_base, frame_rate, gate)?;
            if outcome == DispatchOutcome::Interrupted {
                return Ok(outcome);
            }
        }

        if !raw_sinks.is_empty() {
            let raw = match (self.hw_frames, &host) {
                (HwFrameMode::Passthrough, _) if frame.is_device_resident() => frame,
                (_, Some(host)) => host.clone(),
                (_, None) => frame,
            };
            for sink in &raw_sinks {
                if !gate.wait_ready() {
                    return Ok(DispatchOutcome::Interrupted);
                }
                match sink.on_frame(raw.clone(), time_base, frame_rate) {
                    Ok(()) => {
                        self.counters.frames_delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => self.record_failure(sink.name(), "on_frame", &e),
                }
            }
        }

        Ok(DispatchOutcome::Delivered)
    }

    fn record_failure(&self, sink: &str, path: &str, err: &crate::core::PipelineError) {
        self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(sink, path, "Sink failed to take frame: {}", err);
    }

    /// Convert `host` once, then hand every image sink its own pooled copy.
    ///
    /// The last sink gets the converted buffer itself. A sink whose copy
    /// cannot get a buffer before the pool's deadline is skipped and counted.
    fn deliver_images(
        &mut self,
        host: &VideoFrame,
        sinks: &[Arc<dyn FrameSink>],
        time_base: Rational,
        frame_rate: Rational,
        gate: &RunGate,
    ) -> Result<DispatchOutcome> {
        let Some(converted) = self.convert_image(host)? else {
            self.skip_images(host, sinks.len());
            return Ok(DispatchOutcome::Delivered);
        };
        let mut converted = Some(converted);

        let last = sinks.len() - 1;
        for (index, sink) in sinks.iter().enumerate() {
            if !gate.wait_ready() {
                return Ok(DispatchOutcome::Interrupted);
            }
            let image = if index == last {
                converted.take()
            } else {
                self.copy_image(converted.as_ref())?
            };
            let Some(image) = image else {
                self.skip_images(host, 1);
                continue;
            };
            match sink.on_image(image, time_base, frame_rate) {
                Ok(()) => {
                    self.counters.images_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => self.record_failure(sink.name(), "on_image", &e),
            }
        }
        Ok(DispatchOutcome::Delivered)
    }

    fn skip_images(&self, host: &VideoFrame, count: usize) {
        self.counters
            .images_skipped
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::warn!(
            frame_number = host.frame_number,
            skipped = count,
            "No conversion buffer available, skipping image delivery"
        );
    }

    fn acquire_buffer(&self) -> Result<Option<PooledResource<HostBuffer>>> {
        match &self.buffers {
            Some(pool) => pool.acquire_default(),
            None => Ok(None),
        }
    }

    /// A private copy of `source` in a fresh pooled buffer.
    fn copy_image(&self, source: Option<&ImageFrame>) -> Result<Option<ImageFrame>> {
        let Some(source) = source else {
            return Ok(None);
        };
        let Some(buffer) = self.acquire_buffer()? else {
            return Ok(None);
        };
        buffer.lock()[..source.len()].copy_from_slice(&source.data());
        Ok(Some(
            ImageFrame::from_pooled(buffer, source.width, source.height, source.stride, source.format)
                .with_timing(source.timing, source.frame_number),
        ))
    }

    /// Convert a host frame into the display layout, rebuilding the
    /// converter and buffer pool when the layout changed.
    fn convert_image(&mut self, host: &VideoFrame) -> Result<Option<ImageFrame>> {
        let layout = host.layout();
        let rebuild = match &self.converter {
            Some(converter) => !converter.matches(layout, self.display_format),
            None => true,
        };
        if rebuild {
            let converter = FormatConverter::for_layout(layout, self.display_format)?;
            if self.buffers.is_none() || self.buffer_len != converter.output_len() {
                let allocator = HostBufferAllocator {
                    len: converter.output_len(),
                };
                self.buffers = Some(ResourcePool::new(self.buffer_config.clone(), allocator)?);
                self.buffer_len = converter.output_len();
            }
            tracing::debug!(
                width = layout.width,
                height = layout.height,
                format = %layout.format,
                output = %self.display_format,
                "Rebuilt format converter"
            );
            self.converter = Some(converter);
            self.counters.converter_rebuilds.fetch_add(1, Ordering::Relaxed);
        }

        let Some(buffer) = self.acquire_buffer()? else {
            return Ok(None);
        };
        let Some(converter) = &self.converter else {
            return Ok(None);
        };
        converter.convert_frame(host, &mut buffer.lock())?;
        Ok(Some(
            ImageFrame::from_pooled(
                buffer,
                converter.width(),
                converter.height(),
                converter.output_stride(),
                converter.output_format(),
            )
            .with_timing(host.timing, host.frame_number),
        ))
    }
}

impl std::fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("display_format", &self.display_format)
            .field("hw_frames", &self.hw_frames)
            .field("converter", &self.converter)
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::{FrameTiming, HostPlanes};
    use crate::core::pool::PoolSlotId;
    use crate::core::sink::FrameSink;
    use crate::core::PipelineError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        images: Mutex<Vec<ImageFrame>>,
        frames: Mutex<Vec<VideoFrame>>,
        fail: bool,
    }

    impl FrameSink for Recorder {
        fn on_image(&self, image: ImageFrame, _: Rational, _: Rational) -> Result<()> {
            if self.fail {
                return Err(PipelineError::Sink("refused".into()));
            }
            self.images.lock().push(image);
            Ok(())
        }

        fn on_frame(&self, frame: VideoFrame, _: Rational, _: Rational) -> Result<()> {
            if self.fail {
                return Err(PipelineError::Sink("refused".into()));
            }
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    fn nv12_frame(width: u32, height: u32, pts: i64) -> VideoFrame {
        VideoFrame::from_host(
            PixelFormat::Nv12,
            width,
            height,
            HostPlanes::allocate(PixelFormat::Nv12, width, height),
            FrameTiming::with_pts(pts),
        )
        .unwrap()
    }

    fn rates() -> (Rational, Rational) {
        (Rational::new(1, 30), Rational::new(30, 1))
    }

    /// Recorders keep every image, so give them room.
    fn roomy(sinks: Arc<SinkTable>, format: PixelFormat) -> FrameDispatcher {
        FrameDispatcher::new(sinks, format).with_buffer_pool(PoolConfig {
            initial_size: 1,
            max_size: 8,
            dynamic: true,
            acquire_timeout_ms: 50,
        })
    }

    fn single_buffer(sinks: Arc<SinkTable>) -> FrameDispatcher {
        FrameDispatcher::new(sinks, PixelFormat::Bgra).with_buffer_pool(PoolConfig {
            acquire_timeout_ms: 5,
            ..PoolConfig::fixed(1)
        })
    }

    #[test]
    fn test_image_sinks_get_private_copies() {
        let sinks = Arc::new(SinkTable::new());
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        sinks.register(a.clone(), SinkInterest::IMAGE);
        sinks.register(b.clone(), SinkInterest::IMAGE);

        let mut dispatcher = roomy(sinks, PixelFormat::Rgba);
        let (tb, fr) = rates();
        dispatcher
            .dispatch(nv12_frame(4, 2, 9), tb, fr, &RunGate::default())
            .unwrap();

        let a_images = a.images.lock();
        let b_images = b.images.lock();
        assert_eq!(a_images[0].stride, 16);
        assert_eq!(a_images[0].timing.pts, Some(9));
        assert_ne!(a_images[0].slot_id(), b_images[0].slot_id());
        assert_eq!(a_images[0].to_vec(), b_images[0].to_vec());
        assert_eq!(dispatcher.stats().images_delivered, 2);
    }

    #[test]
    fn test_raw_sinks_share_storage() {
        let sinks = Arc::new(SinkTable::new());
        let a = Arc::new(Recorder::default());
        sinks.register(a.clone(), SinkInterest::RAW_FRAME);
        let mut dispatcher = FrameDispatcher::new(sinks, PixelFormat::Bgra);
        let frame = nv12_frame(4, 2, 1);
        let (tb, fr) = rates();
        dispatcher.dispatch(frame.clone(), tb, fr, &RunGate::default()).unwrap();
        assert!(a.frames.lock()[0].shares_storage_with(&frame));
        // No image sinks, so no conversion happened.
        assert!(dispatcher.converter().is_none());
    }

    #[test]
    fn test_failing_sink_is_isolated() {
        let sinks = Arc::new(SinkTable::new());
        let bad = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let good = Arc::new(Recorder::default());
        sinks.register(bad.clone(), SinkInterest::all());
        sinks.register(good.clone(), SinkInterest::all());
        let mut dispatcher = FrameDispatcher::new(sinks, PixelFormat::Bgra);
        let (tb, fr) = rates();
        dispatcher.dispatch(nv12_frame(2, 2, 0), tb, fr, &RunGate::default()).unwrap();
        assert_eq!(good.images.lock().len(), 1);
        assert_eq!(good.frames.lock().len(), 1);
        assert_eq!(dispatcher.stats().sink_failures, 2);
    }

    #[test]
    fn test_converter_rebuilt_on_resolution_change() {
        let sinks = Arc::new(SinkTable::new());
        let a = Arc::new(Recorder::default());
        sinks.register(a.clone(), SinkInterest::IMAGE);
        let mut dispatcher = roomy(sinks, PixelFormat::Bgra);
        let gate = RunGate::default();
        let (tb, fr) = rates();
        dispatcher.dispatch(nv12_frame(4, 2, 0), tb, fr, &gate).unwrap();
        dispatcher.dispatch(nv12_frame(4, 2, 1), tb, fr, &gate).unwrap();
        dispatcher.dispatch(nv12_frame(8, 4, 2), tb, fr, &gate).unwrap();
        assert_eq!(dispatcher.stats().converter_rebuilds, 2);
        let images = a.images.lock();
        assert_eq!((images[2].width, images[2].stride), (8, 32));
    }

    #[test]
    fn test_stop_interrupts_delivery() {
        let sinks = Arc::new(SinkTable::new());
        let a = Arc::new(Recorder::default());
        sinks.register(a.clone(), SinkInterest::RAW_FRAME);
        let mut dispatcher = FrameDispatcher::new(sinks, PixelFormat::Bgra);
        let gate = RunGate::default();
        gate.request_stop();
        let (tb, fr) = rates();
        let outcome = dispatcher.dispatch(nv12_frame(2, 2, 0), tb, fr, &gate).unwrap();
        assert_eq!(outcome, DispatchOutcome::Interrupted);
        assert!(a.frames.lock().is_empty());
    }

    #[test]
    fn test_held_images_exhaust_fixed_pool() {
        let sinks = Arc::new(SinkTable::new());
        let keeper = Arc::new(Recorder::default());
        sinks.register(keeper.clone(), SinkInterest::IMAGE);
        let mut dispatcher = single_buffer(sinks);
        let gate = RunGate::default();
        let (tb, fr) = rates();
        for pts in 0..6 {
            dispatcher.dispatch(nv12_frame(4, 2, pts), tb, fr, &gate).unwrap();
        }
        let stats = dispatcher.stats();
        assert_eq!(stats.images_delivered, 1);
        assert_eq!(stats.images_skipped, 5);

        // Letting go of the image frees the buffer for the next frame.
        keeper.images.lock().clear();
        dispatcher.dispatch(nv12_frame(4, 2, 6), tb, fr, &gate).unwrap();
        assert_eq!(dispatcher.stats().images_delivered, 2);
        assert_eq!(keeper.images.lock()[0].timing.pts, Some(6));
    }

    #[derive(Default)]
    struct Slots(Mutex<Vec<PoolSlotId>>);

    impl FrameSink for Slots {
        fn on_image(&self, image: ImageFrame, _: Rational, _: Rational) -> Result<()> {
            self.0.lock().push(image.slot_id());
            Ok(())
        }
    }

    #[test]
    fn test_dropped_images_reuse_the_same_buffer() {
        let sinks = Arc::new(SinkTable::new());
        let slots = Arc::new(Slots::default());
        sinks.register(slots.clone(), SinkInterest::IMAGE);
        let mut dispatcher = single_buffer(sinks);
        let gate = RunGate::default();
        let (tb, fr) = rates();
        for pts in 0..4 {
            dispatcher.dispatch(nv12_frame(4, 2, pts), tb, fr, &gate).unwrap();
        }
        let slots = slots.0.lock();
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(|id| *id == slots[0]));
        assert_eq!(dispatcher.stats().images_skipped, 0);
    }
}
