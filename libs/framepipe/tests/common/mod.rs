// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Mocks shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use framepipe::codec::{CodecResult, HwDevice};
use framepipe::{
    CodecBackend, CodecError, CodecParameters, DeviceSurface, FrameSink, FrameTiming, HostPlanes,
    HwDeviceContext, HwDeviceProvider, HwDeviceType, ImageFrame, Packet, PacketSource,
    PipelineError, PixelFormat, Rational, Registry, Result, StreamInfo, VideoFrame,
};

pub const MOCK_CODEC: &str = "mock";
pub const WIDTH: u32 = 4;
pub const HEIGHT: u32 = 2;

/// Live-instance counters for codecs and devices.
#[derive(Debug, Default)]
pub struct Tracker {
    pub open_codecs: AtomicUsize,
    pub live_devices: AtomicUsize,
    pub frames_reported: AtomicU64,
}

impl Tracker {
    pub fn open_codecs(&self) -> usize {
        self.open_codecs.load(Ordering::SeqCst)
    }

    pub fn live_devices(&self) -> usize {
        self.live_devices.load(Ordering::SeqCst)
    }

    pub fn frames_reported(&self) -> u64 {
        self.frames_reported.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct TrackedDevice {
    tracker: Arc<Tracker>,
}

impl HwDevice for TrackedDevice {
    fn device_type(&self) -> HwDeviceType {
        HwDeviceType::Vaapi
    }

    fn node(&self) -> Option<&str> {
        Some("/dev/dri/renderD128")
    }
}

impl Drop for TrackedDevice {
    fn drop(&mut self) {
        self.tracker.live_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TrackedProvider {
    pub tracker: Arc<Tracker>,
}

impl HwDeviceProvider for TrackedProvider {
    fn device_type(&self) -> HwDeviceType {
        HwDeviceType::Vaapi
    }

    fn create(&self, _node: Option<&str>) -> Result<HwDeviceContext> {
        self.tracker.live_devices.fetch_add(1, Ordering::SeqCst);
        Ok(HwDeviceContext::new(Arc::new(TrackedDevice {
            tracker: Arc::clone(&self.tracker),
        })))
    }
}

/// NV12 surface in "device memory" with a host copy behind it.
#[derive(Debug)]
pub struct MockSurface {
    pub device: HwDeviceContext,
    pub data: Bytes,
    pub layout_code: Option<u32>,
}

impl MockSurface {
    pub fn new(device: HwDeviceContext, fill: u8) -> Self {
        Self {
            device,
            data: Bytes::from(vec![fill; PixelFormat::Nv12.frame_size(WIDTH, HEIGHT)]),
            layout_code: None,
        }
    }
}

impl DeviceSurface for MockSurface {
    fn sw_format(&self) -> PixelFormat {
        PixelFormat::Nv12
    }

    fn layout_code(&self) -> u32 {
        self.layout_code
            .unwrap_or_else(|| PixelFormat::Nv12.layout_code().unwrap_or(0))
    }

    fn device(&self) -> &HwDeviceContext {
        &self.device
    }

    fn transfer_to_host(&self) -> Result<HostPlanes> {
        HostPlanes::from_packed(PixelFormat::Nv12, WIDTH, HEIGHT, self.data.clone())
    }

    #[cfg(unix)]
    fn export_dmabuf(&self) -> Result<framepipe::gpu::DmaBufDescriptor> {
        use framepipe::gpu::{DmaBufDescriptor, DmaBufObject, DmaBufPlane, DRM_FORMAT_MOD_LINEAR};
        let file = tempfile::tempfile()?;
        Ok(DmaBufDescriptor {
            layout_code: self.layout_code(),
            width: WIDTH,
            height: HEIGHT,
            objects: vec![DmaBufObject {
                fd: file.into(),
                size: self.data.len(),
                modifier: DRM_FORMAT_MOD_LINEAR,
            }],
            planes: vec![
                DmaBufPlane { object: 0, offset: 0, pitch: WIDTH },
                DmaBufPlane { object: 0, offset: WIDTH * HEIGHT, pitch: WIDTH },
            ],
        })
    }
}

/// Codec that reports `frames_per_packet` frames for every packet.
///
/// With a device it produces device frames. `fail_at` makes the n-th send
/// (zero-based) fail with code -5. `opens_allowed` caps how many times the
/// codec can be opened.
pub struct MockCodec {
    tracker: Arc<Tracker>,
    frames_per_packet: usize,
    fail_at: Option<u64>,
    fail_open: bool,
    opens_allowed: Option<u32>,
    opens: u32,
    sent: u64,
    pending: VecDeque<VideoFrame>,
    device: Option<HwDeviceContext>,
    flushing: bool,
    open: bool,
}

impl MockCodec {
    pub fn new(tracker: Arc<Tracker>, frames_per_packet: usize) -> Self {
        Self {
            tracker,
            frames_per_packet,
            fail_at: None,
            fail_open: false,
            opens_allowed: None,
            opens: 0,
            sent: 0,
            pending: VecDeque::new(),
            device: None,
            flushing: false,
            open: false,
        }
    }

    pub fn failing_at(mut self, send: u64) -> Self {
        self.fail_at = Some(send);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Opens once, then refuses.
    pub fn failing_reopen(mut self) -> Self {
        self.opens_allowed = Some(1);
        self
    }

    fn frame(&self, packet: &Packet, index: usize) -> CodecResult<VideoFrame> {
        let timing = FrameTiming {
            pts: packet.pts.map(|pts| pts * 10 + index as i64),
            dts: packet.dts,
            duration: packet.duration,
            pos: packet.pos,
        };
        let frame = match &self.device {
            Some(device) => VideoFrame::from_device(
                PixelFormat::Vaapi,
                WIDTH,
                HEIGHT,
                Arc::new(MockSurface::new(device.clone(), index as u8)),
                timing,
            ),
            None => VideoFrame::from_host(
                PixelFormat::Nv12,
                WIDTH,
                HEIGHT,
                HostPlanes::allocate(PixelFormat::Nv12, WIDTH, HEIGHT),
                timing,
            ),
        };
        frame.map_err(|e| CodecError::failed(-1, e.to_string()))
    }
}

impl CodecBackend for MockCodec {
    fn name(&self) -> &str {
        MOCK_CODEC
    }

    fn open(&mut self, _params: &CodecParameters, device: Option<&HwDeviceContext>) -> Result<()> {
        if self.fail_open || self.opens_allowed.is_some_and(|allowed| self.opens >= allowed) {
            return Err(PipelineError::Configuration("mock refuses to open".into()));
        }
        self.opens += 1;
        if !self.open {
            self.tracker.open_codecs.fetch_add(1, Ordering::SeqCst);
        }
        self.device = device.cloned();
        self.flushing = false;
        self.open = true;
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> CodecResult<()> {
        let Some(packet) = packet else {
            self.flushing = true;
            return Ok(());
        };
        if self.flushing {
            return Err(CodecError::Eof);
        }
        if !self.pending.is_empty() {
            return Err(CodecError::Again);
        }
        if self.fail_at == Some(self.sent) {
            return Err(CodecError::failed(-5, "corrupt bitstream"));
        }
        self.sent += 1;
        for index in 0..self.frames_per_packet {
            let frame = self.frame(packet, index)?;
            self.pending.push_back(frame);
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> CodecResult<VideoFrame> {
        match self.pending.pop_front() {
            Some(frame) => {
                self.tracker.frames_reported.fetch_add(1, Ordering::SeqCst);
                Ok(frame)
            }
            None if self.flushing => Err(CodecError::Eof),
            None => Err(CodecError::Again),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.tracker.open_codecs.fetch_sub(1, Ordering::SeqCst);
        }
        self.open = false;
        self.pending.clear();
        self.device = None;
    }
}

impl Drop for MockCodec {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registry with the mock codec (built by `make`) and the tracked device.
pub fn registry<F>(tracker: &Arc<Tracker>, make: F) -> Arc<Registry>
where
    F: Fn(Arc<Tracker>) -> MockCodec + Send + Sync + 'static,
{
    let mut registry = Registry::new();
    let codec_tracker = Arc::clone(tracker);
    registry
        .register_codec(MOCK_CODEC, move || {
            Box::new(make(Arc::clone(&codec_tracker))) as Box<dyn CodecBackend>
        })
        .unwrap();
    registry
        .register_hw_device(Arc::new(TrackedProvider {
            tracker: Arc::clone(tracker),
        }))
        .unwrap();
    Arc::new(registry)
}

fn streams() -> Vec<StreamInfo> {
    vec![
        StreamInfo::audio(0, "aac"),
        StreamInfo::video(1, MOCK_CODEC, WIDTH, HEIGHT)
            .with_time_base(Rational::new(1, 90_000))
            .with_frame_rate(Rational::new(30, 1)),
    ]
}

/// Finite source: `count` video packets on stream 1, each followed by an
/// audio packet on stream 0.
pub struct ScriptedSource {
    streams: Vec<StreamInfo>,
    packets: VecDeque<Packet>,
}

impl ScriptedSource {
    pub fn new(count: i64) -> Self {
        let packets = (0..count)
            .flat_map(|i| {
                [
                    Packet::new(1, vec![0u8; 8]).with_timestamps(i, i, 3000).keyframe(),
                    Packet::new(0, vec![0u8; 4]),
                ]
            })
            .collect();
        Self {
            streams: streams(),
            packets,
        }
    }
}

impl PacketSource for ScriptedSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.packets.pop_front())
    }
}

/// Never runs dry.
pub struct SaturatingSource {
    streams: Vec<StreamInfo>,
    next: i64,
}

impl SaturatingSource {
    pub fn new() -> Self {
        Self {
            streams: streams(),
            next: 0,
        }
    }
}

impl PacketSource for SaturatingSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        self.next += 1;
        Ok(Some(Packet::new(1, vec![0u8; 8]).with_timestamps(self.next, self.next, 3000)))
    }
}

/// Counts deliveries and remembers the last raw frame's pts.
#[derive(Default)]
pub struct CountingSink {
    pub frames: AtomicU64,
    pub images: AtomicU64,
    pub last_pts: AtomicI64,
    pub device_frames: AtomicU64,
}

impl CountingSink {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn images(&self) -> u64 {
        self.images.load(Ordering::SeqCst)
    }
}

impl FrameSink for CountingSink {
    fn on_frame(&self, frame: VideoFrame, _: Rational, _: Rational) -> Result<()> {
        if frame.is_device_resident() {
            self.device_frames.fetch_add(1, Ordering::SeqCst);
        }
        self.last_pts.store(frame.timing.pts.unwrap_or(-1), Ordering::SeqCst);
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_image(&self, _: ImageFrame, _: Rational, _: Rational) -> Result<()> {
        self.images.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Appends `name:path` to a shared log on every delivery.
pub struct OrderSink {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl FrameSink for OrderSink {
    fn name(&self) -> &str {
        self.name
    }

    fn on_frame(&self, _: VideoFrame, _: Rational, _: Rational) -> Result<()> {
        self.log.lock().push(format!("{}:frame", self.name));
        Ok(())
    }

    fn on_image(&self, _: ImageFrame, _: Rational, _: Rational) -> Result<()> {
        self.log.lock().push(format!("{}:image", self.name));
        Ok(())
    }
}
