// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#![cfg(unix)]

mod common;

use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use common::{CountingSink, Tracker, TrackedProvider, HEIGHT, WIDTH};
use framepipe::dispatch::DispatchOutcome;
use framepipe::gpu::{
    drm_format, DmaBufDescriptor, DmaBufObject, DmaBufPlane, GpuBackend, HostGpu, ImageId,
    PlaneImport, RenderSink, RenderTarget, TextureDesc, TextureId, DRM_FORMAT_MOD_LINEAR,
};
use framepipe::{
    fourcc, DeviceSurface, FrameDispatcher, FrameLayout, FrameSink, FrameTiming, HostPlanes,
    HwDeviceContext, HwDeviceProvider, HwFrameMode, PipelineError, PixelFormat, PoolConfig,
    Rational, Result, RunGate, SinkInterest, SinkTable, VideoFrame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordedImport {
    drm_format: u32,
    offset: u32,
    pitch: u32,
}

/// Host renderer that also accepts DMA-buf imports.
#[derive(Default)]
struct ZeroCopyGpu {
    host: HostGpu,
    imports: Mutex<Vec<RecordedImport>>,
    live_images: AtomicUsize,
    next_image: AtomicU64,
}

impl GpuBackend for ZeroCopyGpu {
    fn name(&self) -> &str {
        "zero-copy"
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
        self.host.create_texture(desc)
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.host.destroy_texture(texture)
    }

    fn upload(&self, texture: TextureId, data: &[u8], stride: usize) -> Result<()> {
        self.host.upload(texture, data, stride)
    }

    fn supports_zero_copy(&self) -> bool {
        true
    }

    fn import_dmabuf_plane(&self, plane: &PlaneImport<'_>) -> Result<ImageId> {
        assert!(plane.fd.as_raw_fd() >= 0);
        assert_eq!(plane.modifier, DRM_FORMAT_MOD_LINEAR);
        self.imports.lock().push(RecordedImport {
            drm_format: plane.drm_format,
            offset: plane.offset,
            pitch: plane.pitch,
        });
        self.live_images.fetch_add(1, Ordering::SeqCst);
        Ok(ImageId(self.next_image.fetch_add(1, Ordering::SeqCst)))
    }

    fn destroy_image(&self, _image: ImageId) {
        self.live_images.fetch_sub(1, Ordering::SeqCst);
    }

    fn bind_image(&self, _texture: TextureId, _image: ImageId) -> Result<()> {
        Ok(())
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) -> Result<()> {
        self.host.bind_texture(unit, texture)
    }

    fn compose(&self, textures: &[TextureId], layout: FrameLayout, target: &RenderTarget) -> Result<()> {
        self.host.compose(textures, layout, target)
    }
}

/// NV12 surface whose exported fd is one end of a socket pair, so the test
/// can observe the fd being closed through the peer.
#[derive(Debug)]
struct SocketSurface {
    device: HwDeviceContext,
    layout_code: u32,
    peers: Mutex<Vec<UnixStream>>,
}

impl SocketSurface {
    fn new(layout_code: u32) -> Arc<Self> {
        let tracker = Arc::new(Tracker::default());
        let device = TrackedProvider { tracker }.create(None).unwrap();
        Arc::new(Self {
            device,
            layout_code,
            peers: Mutex::new(Vec::new()),
        })
    }

    /// Whether every exported fd has been closed.
    fn exports_closed(&self) -> bool {
        self.peers.lock().iter_mut().all(|peer| {
            let mut buf = [0u8; 1];
            matches!(peer.read(&mut buf), Ok(0))
        })
    }
}

impl DeviceSurface for SocketSurface {
    fn sw_format(&self) -> PixelFormat {
        PixelFormat::Nv12
    }

    fn layout_code(&self) -> u32 {
        self.layout_code
    }

    fn device(&self) -> &HwDeviceContext {
        &self.device
    }

    fn transfer_to_host(&self) -> Result<HostPlanes> {
        Ok(HostPlanes::allocate(PixelFormat::Nv12, WIDTH, HEIGHT))
    }

    fn export_dmabuf(&self) -> Result<DmaBufDescriptor> {
        let (exported, peer) = UnixStream::pair()?;
        peer.set_read_timeout(Some(Duration::from_secs(1)))?;
        self.peers.lock().push(peer);
        Ok(DmaBufDescriptor {
            layout_code: self.layout_code,
            width: WIDTH,
            height: HEIGHT,
            objects: vec![DmaBufObject {
                fd: exported.into(),
                size: PixelFormat::Nv12.frame_size(WIDTH, HEIGHT),
                modifier: DRM_FORMAT_MOD_LINEAR,
            }],
            planes: vec![
                DmaBufPlane { object: 0, offset: 0, pitch: WIDTH },
                DmaBufPlane { object: 0, offset: WIDTH * HEIGHT, pitch: WIDTH },
            ],
        })
    }
}

fn device_frame(surface: &Arc<SocketSurface>) -> VideoFrame {
    VideoFrame::from_device(
        PixelFormat::Vaapi,
        WIDTH,
        HEIGHT,
        Arc::clone(surface) as Arc<dyn DeviceSurface>,
        FrameTiming::with_pts(0),
    )
    .unwrap()
}

fn rates() -> (Rational, Rational) {
    (Rational::new(1, 30), Rational::new(30, 1))
}

#[test]
fn test_device_frame_imported_per_plane() {
    let gpu = Arc::new(ZeroCopyGpu::default());
    let sink = RenderSink::new(gpu.clone(), PoolConfig::fixed(2)).unwrap();
    let surface = SocketSurface::new(fourcc(b"NV12"));
    let (tb, fr) = rates();

    sink.on_frame(device_frame(&surface), tb, fr).unwrap();

    assert_eq!(
        *gpu.imports.lock(),
        [
            RecordedImport { drm_format: drm_format::R8, offset: 0, pitch: WIDTH },
            RecordedImport { drm_format: drm_format::GR88, offset: WIDTH * HEIGHT, pitch: WIDTH },
        ]
    );
    assert_eq!(gpu.live_images.load(Ordering::SeqCst), 2);
    assert_eq!(sink.stats().frames_presented, 1);
    assert!(sink.presented().is_some());
    // The exported fds are closed once the planes are imported.
    assert!(surface.exports_closed());
    // The renderer keeps the surface alive while its images are in use.
    assert_eq!(Arc::strong_count(&surface), 2);
}

#[test]
fn test_next_frame_releases_previous_images() {
    let gpu = Arc::new(ZeroCopyGpu::default());
    let sink = RenderSink::new(gpu.clone(), PoolConfig::fixed(2)).unwrap();
    let first = SocketSurface::new(fourcc(b"NV12"));
    let second = SocketSurface::new(fourcc(b"NV12"));
    let (tb, fr) = rates();

    sink.on_frame(device_frame(&first), tb, fr).unwrap();
    sink.on_frame(device_frame(&second), tb, fr).unwrap();
    assert_eq!(gpu.live_images.load(Ordering::SeqCst), 2);
    assert_eq!(Arc::strong_count(&first), 1);
    assert_eq!(Arc::strong_count(&second), 2);

    drop(sink);
    assert_eq!(gpu.live_images.load(Ordering::SeqCst), 0);
    assert_eq!(gpu.host.live_textures(), 0);
}

#[test]
fn test_unknown_layout_degrades_renderer() {
    let gpu = Arc::new(ZeroCopyGpu::default());
    let sink = RenderSink::new(gpu.clone(), PoolConfig::fixed(2)).unwrap();
    let bad = SocketSurface::new(fourcc(b"YUYV"));
    let good = SocketSurface::new(fourcc(b"NV12"));
    let (tb, fr) = rates();

    let result = sink.on_frame(device_frame(&bad), tb, fr);
    assert!(matches!(result, Err(PipelineError::UnsupportedFormat(_))));
    let health = sink.health();
    assert!(health.degraded);
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.last_error.unwrap_or_default().contains("YUYV"));
    assert_eq!(gpu.live_images.load(Ordering::SeqCst), 0);
    assert!(bad.exports_closed());

    sink.on_frame(device_frame(&good), tb, fr).unwrap();
    assert!(!sink.health().degraded);
    assert_eq!(sink.stats().frames_failed, 1);
    assert_eq!(sink.stats().frames_presented, 1);
}

#[test]
fn test_render_failure_does_not_stop_delivery() {
    let gpu = Arc::new(ZeroCopyGpu::default());
    let render = Arc::new(RenderSink::new(gpu, PoolConfig::fixed(2)).unwrap());
    let after = Arc::new(CountingSink::default());
    let sinks = Arc::new(SinkTable::new());
    sinks.register(render.clone(), SinkInterest::RAW_FRAME);
    sinks.register(after.clone(), SinkInterest::RAW_FRAME);
    let mut dispatcher = FrameDispatcher::new(Arc::clone(&sinks), PixelFormat::Bgra)
        .with_hw_frames(HwFrameMode::Passthrough);
    let gate = RunGate::new(Duration::from_millis(1));
    let (tb, fr) = rates();

    for code in [b"YUYV", b"NV12"] {
        let surface = SocketSurface::new(fourcc(code));
        let outcome = dispatcher.dispatch(device_frame(&surface), tb, fr, &gate).unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered);
    }

    assert_eq!(after.frames(), 2);
    assert_eq!(after.device_frames.load(Ordering::SeqCst), 2);
    assert_eq!(dispatcher.stats().sink_failures, 1);
    assert!(!render.health().degraded);
    assert_eq!(render.stats().frames_presented, 1);
}

#[test]
fn test_host_only_backend_uploads_device_frames() {
    let gpu = Arc::new(HostGpu::new());
    let sink = RenderSink::new(gpu.clone(), PoolConfig::fixed(2)).unwrap();
    let surface = SocketSurface::new(fourcc(b"NV12"));
    let (tb, fr) = rates();

    sink.on_frame(device_frame(&surface), tb, fr).unwrap();
    assert!(surface.peers.lock().is_empty());
    assert_eq!(gpu.live_textures(), 2);
    let target = sink.presented().unwrap();
    // Black NV12 (all zero) composes to an opaque RGBA pixel.
    assert_eq!(target.snapshot()[3], 0xFF);
}
