// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decoded video frames, host- or device-resident.

use std::sync::Arc;

use bytes::Bytes;

use super::{FrameTiming, PixelFormat};
use crate::core::codec::HwDeviceContext;
use crate::core::gpu::DmaBufDescriptor;
use crate::core::{PipelineError, Result};

/// One host plane: pixel bytes plus the row stride in bytes.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Bytes,
    pub stride: usize,
}

/// Host-resident planes of a frame.
#[derive(Debug, Clone, Default)]
pub struct HostPlanes {
    planes: Vec<Plane>,
}

impl HostPlanes {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Zero-filled, tightly packed planes.
    pub fn allocate(format: PixelFormat, width: u32, height: u32) -> Self {
        let planes = format
            .planes(width, height)
            .iter()
            .map(|layout| {
                let stride = layout.min_stride();
                Plane {
                    data: Bytes::from(vec![0u8; layout.size_with_stride(stride)]),
                    stride,
                }
            })
            .collect();
        Self { planes }
    }

    /// Split one tightly packed buffer into planes without copying.
    pub fn from_packed(format: PixelFormat, width: u32, height: u32, data: Bytes) -> Result<Self> {
        let expected = format.frame_size(width, height);
        if data.len() < expected {
            return Err(PipelineError::Configuration(format!(
                "{} {}x{} needs {} bytes, got {}",
                format,
                width,
                height,
                expected,
                data.len()
            )));
        }
        let mut offset = 0;
        let mut planes = Vec::with_capacity(format.plane_count());
        for layout in format.planes(width, height) {
            let stride = layout.min_stride();
            let size = layout.size_with_stride(stride);
            planes.push(Plane {
                data: data.slice(offset..offset + size),
                stride,
            });
            offset += size;
        }
        Ok(Self { planes })
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    pub fn planes_mut(&mut self) -> &mut Vec<Plane> {
        &mut self.planes
    }

    /// Check plane count, strides and sizes against `format` at `width` x `height`.
    pub fn validate(&self, format: PixelFormat, width: u32, height: u32) -> Result<()> {
        let layouts = format.planes(width, height);
        if layouts.len() != self.planes.len() {
            return Err(PipelineError::Configuration(format!(
                "{} expects {} planes, frame has {}",
                format,
                layouts.len(),
                self.planes.len()
            )));
        }
        for (index, (layout, plane)) in layouts.iter().zip(&self.planes).enumerate() {
            if plane.stride < layout.min_stride() {
                return Err(PipelineError::Configuration(format!(
                    "plane {} stride {} is below minimum {}",
                    index,
                    plane.stride,
                    layout.min_stride()
                )));
            }
            // The last row may be trimmed to the visible width.
            let needed = plane.stride * (layout.height as usize).saturating_sub(1) + layout.min_stride();
            if plane.data.len() < needed {
                return Err(PipelineError::Configuration(format!(
                    "plane {} holds {} bytes, needs {}",
                    index,
                    plane.data.len(),
                    needed
                )));
            }
        }
        Ok(())
    }
}

/// A frame surface living in accelerator memory.
///
/// Implemented by codec backends for their hardware frames. The surface owns
/// the device memory; exported DMA-buf views and textures imported from them
/// are only valid while a reference to the surface is alive.
pub trait DeviceSurface: Send + Sync + std::fmt::Debug {
    /// Host layout of the pixels held by the surface.
    fn sw_format(&self) -> PixelFormat;

    /// Codec-side four-character layout code.
    fn layout_code(&self) -> u32 {
        self.sw_format().layout_code().unwrap_or(0)
    }

    /// Device the surface was allocated on.
    fn device(&self) -> &HwDeviceContext;

    /// Explicit device-to-host copy.
    fn transfer_to_host(&self) -> Result<HostPlanes>;

    /// Export the surface as DMA-buf planes for zero-copy import.
    fn export_dmabuf(&self) -> Result<DmaBufDescriptor> {
        Err(PipelineError::UnsupportedFormat(
            "surface cannot be exported as DMA-buf".into(),
        ))
    }
}

/// Backing store of a frame.
#[derive(Clone, Debug)]
pub enum FrameStorage {
    Host(Arc<HostPlanes>),
    Device(Arc<dyn DeviceSurface>),
}

/// Decoded video frame.
///
/// Clone is a shallow reference: the backing store is shared, never copied.
/// While a frame is shared its planes cannot be mutated
/// ([`VideoFrame::host_planes_mut`] returns `None`).
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Host format, or a hardware format for device-resident frames.
    pub format: PixelFormat,
    pub timing: FrameTiming,
    pub frame_number: u64,
    storage: FrameStorage,
}

/// Width, height and host layout; a change means renderers must rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl VideoFrame {
    /// Host frame from validated planes.
    pub fn from_host(
        format: PixelFormat,
        width: u32,
        height: u32,
        planes: HostPlanes,
        timing: FrameTiming,
    ) -> Result<Self> {
        if format.is_hardware() {
            return Err(PipelineError::Configuration(format!(
                "{} is a hardware format; use VideoFrame::from_device",
                format
            )));
        }
        planes.validate(format, width, height)?;
        Ok(Self {
            width,
            height,
            format,
            timing,
            frame_number: 0,
            storage: FrameStorage::Host(Arc::new(planes)),
        })
    }

    /// Device frame. `format` must be a hardware format.
    pub fn from_device(
        format: PixelFormat,
        width: u32,
        height: u32,
        surface: Arc<dyn DeviceSurface>,
        timing: FrameTiming,
    ) -> Result<Self> {
        if !format.is_hardware() {
            return Err(PipelineError::Configuration(format!(
                "{} is a host format; use VideoFrame::from_host",
                format
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            timing,
            frame_number: 0,
            storage: FrameStorage::Device(surface),
        })
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Shallow reference carrying different timing metadata.
    pub fn with_timing(&self, timing: FrameTiming) -> Self {
        Self {
            timing,
            ..self.clone()
        }
    }

    pub fn is_device_resident(&self) -> bool {
        matches!(self.storage, FrameStorage::Device(_))
    }

    pub fn storage(&self) -> &FrameStorage {
        &self.storage
    }

    pub fn host_planes(&self) -> Option<&HostPlanes> {
        match &self.storage {
            FrameStorage::Host(planes) => Some(planes),
            FrameStorage::Device(_) => None,
        }
    }

    /// Mutable planes, only while this is the sole reference.
    pub fn host_planes_mut(&mut self) -> Option<&mut HostPlanes> {
        match &mut self.storage {
            FrameStorage::Host(planes) => Arc::get_mut(planes),
            FrameStorage::Device(_) => None,
        }
    }

    pub fn device_surface(&self) -> Option<&Arc<dyn DeviceSurface>> {
        match &self.storage {
            FrameStorage::Device(surface) => Some(surface),
            FrameStorage::Host(_) => None,
        }
    }

    /// Host layout of the pixels, resolving hardware formats through the surface.
    pub fn sw_format(&self) -> PixelFormat {
        match &self.storage {
            FrameStorage::Host(_) => self.format,
            FrameStorage::Device(surface) => surface.sw_format(),
        }
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            width: self.width,
            height: self.height,
            format: self.sw_format(),
        }
    }

    /// Whether other references to the backing store exist.
    pub fn is_shared(&self) -> bool {
        match &self.storage {
            FrameStorage::Host(planes) => Arc::strong_count(planes) > 1,
            FrameStorage::Device(surface) => Arc::strong_count(surface) > 1,
        }
    }

    pub fn shares_storage_with(&self, other: &VideoFrame) -> bool {
        match (&self.storage, &other.storage) {
            (FrameStorage::Host(a), FrameStorage::Host(b)) => Arc::ptr_eq(a, b),
            (FrameStorage::Device(a), FrameStorage::Device(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Host-resident companion of this frame.
    ///
    /// Host frames are returned as-is (moved, not copied). Device frames are
    /// copied to host memory; timing and frame number are carried forward
    /// from the device frame because the transfer does not produce them.
    pub fn into_host(self) -> Result<VideoFrame> {
        let surface = match &self.storage {
            FrameStorage::Host(_) => return Ok(self),
            FrameStorage::Device(surface) => Arc::clone(surface),
        };
        let sw_format = surface.sw_format();
        let planes = surface.transfer_to_host()?;
        let host = VideoFrame::from_host(sw_format, self.width, self.height, planes, self.timing)?;
        Ok(host.with_frame_number(self.frame_number))
    }
}
