// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::{DmaBufFd, RenderTarget};
use crate::core::frames::{FrameLayout, PixelFormat, PlaneLayout};
use crate::core::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// An imported external image (EGL image, Vulkan external memory, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

/// Per-plane texture formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8,
    Rg8,
    R16,
    Rg16,
    Rgba8,
    Bgra8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rg8 | Self::R16 => 2,
            Self::Rg16 | Self::Rgba8 | Self::Bgra8 => 4,
        }
    }

    /// Texture format for one plane of a host `format` frame.
    pub fn for_plane(format: PixelFormat, plane: &PlaneLayout) -> Result<Self> {
        let texture = match (plane.channels, plane.bytes_per_channel) {
            (4, 1) if format == PixelFormat::Bgra => Self::Bgra8,
            (4, 1) => Self::Rgba8,
            (1, 1) => Self::R8,
            (2, 1) => Self::Rg8,
            (1, 2) => Self::R16,
            (2, 2) => Self::Rg16,
            (channels, bytes) => {
                return Err(PipelineError::UnsupportedFormat(format!(
                    "{} plane with {} channels of {} bytes has no texture format",
                    format, channels, bytes
                )));
            }
        };
        Ok(texture)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Parameters for importing one DMA-buf plane.
#[derive(Debug)]
pub struct PlaneImport<'a> {
    pub width: u32,
    pub height: u32,
    pub drm_format: u32,
    pub fd: &'a DmaBufFd,
    pub offset: u32,
    pub pitch: u32,
    pub modifier: u64,
}

/// The GPU import capability a renderer needs.
///
/// Texture ids stay valid until destroyed. An imported image only samples
/// valid memory while the surface it came from is alive.
pub trait GpuBackend: Send + Sync {
    fn name(&self) -> &str;

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId>;

    fn destroy_texture(&self, texture: TextureId);

    /// Copy host rows (`stride` bytes apart) into `texture`.
    fn upload(&self, texture: TextureId, data: &[u8], stride: usize) -> Result<()>;

    fn supports_zero_copy(&self) -> bool {
        false
    }

    fn import_dmabuf_plane(&self, _plane: &PlaneImport<'_>) -> Result<ImageId> {
        Err(PipelineError::GpuImport(format!(
            "{} cannot import DMA-buf planes",
            self.name()
        )))
    }

    fn destroy_image(&self, _image: ImageId) {}

    /// Back `texture` with an imported image.
    fn bind_image(&self, _texture: TextureId, _image: ImageId) -> Result<()> {
        Err(PipelineError::GpuImport(format!(
            "{} cannot bind imported images",
            self.name()
        )))
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) -> Result<()>;

    /// Draw the plane textures of a `layout` frame into `target` as RGBA.
    fn compose(&self, textures: &[TextureId], layout: FrameLayout, target: &RenderTarget) -> Result<()>;
}
