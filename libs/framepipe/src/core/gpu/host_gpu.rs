// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Headless [`GpuBackend`] keeping textures in host memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use super::{GpuBackend, RenderTarget, TextureDesc, TextureId};
use crate::core::convert::FormatConverter;
use crate::core::frames::{FrameLayout, HostPlanes, PixelFormat, Plane};
use crate::core::{PipelineError, Result};

struct HostTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

impl HostTexture {
    fn row_bytes(&self) -> usize {
        self.desc.width as usize * self.desc.format.bytes_per_pixel()
    }
}

/// Software renderer. No zero-copy import; frames always come in by upload.
#[derive(Default)]
pub struct HostGpu {
    textures: Mutex<HashMap<TextureId, HostTexture>>,
    units: Mutex<BTreeMap<u32, TextureId>>,
    next_id: AtomicU64,
}

impl HostGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.lock().len()
    }

    /// Texture bound to `unit`, if any.
    pub fn bound(&self, unit: u32) -> Option<TextureId> {
        self.units.lock().get(&unit).copied()
    }
}

impl GpuBackend for HostGpu {
    fn name(&self) -> &str {
        "host"
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(PipelineError::GpuImport(format!(
                "texture size {}x{} is empty",
                desc.width, desc.height
            )));
        }
        let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let len = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
        self.textures.lock().insert(
            id,
            HostTexture {
                desc: *desc,
                data: vec![0u8; len],
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.textures.lock().remove(&texture);
        self.units.lock().retain(|_, bound| *bound != texture);
    }

    fn upload(&self, texture: TextureId, data: &[u8], stride: usize) -> Result<()> {
        let mut textures = self.textures.lock();
        let tex = textures
            .get_mut(&texture)
            .ok_or_else(|| PipelineError::GpuImport(format!("no texture {:?}", texture)))?;
        let row_bytes = tex.row_bytes();
        let rows = tex.desc.height as usize;
        if stride < row_bytes || data.len() < stride * (rows - 1) + row_bytes {
            return Err(PipelineError::GpuImport(format!(
                "upload of {} bytes (stride {}) does not fill {}x{} {:?}",
                data.len(),
                stride,
                tex.desc.width,
                tex.desc.height,
                tex.desc.format
            )));
        }
        for (row, dst) in tex.data.chunks_exact_mut(row_bytes).enumerate() {
            dst.copy_from_slice(&data[row * stride..row * stride + row_bytes]);
        }
        Ok(())
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) -> Result<()> {
        if !self.textures.lock().contains_key(&texture) {
            return Err(PipelineError::GpuImport(format!("no texture {:?}", texture)));
        }
        self.units.lock().insert(unit, texture);
        Ok(())
    }

    fn compose(&self, textures: &[TextureId], layout: FrameLayout, target: &RenderTarget) -> Result<()> {
        if (target.width(), target.height()) != (layout.width, layout.height) {
            return Err(PipelineError::GpuImport(format!(
                "render target {}x{} does not match frame {}x{}",
                target.width(),
                target.height(),
                layout.width,
                layout.height
            )));
        }
        let planes = {
            let stored = self.textures.lock();
            let mut planes = Vec::with_capacity(textures.len());
            for id in textures {
                let tex = stored
                    .get(id)
                    .ok_or_else(|| PipelineError::GpuImport(format!("no texture {:?}", id)))?;
                planes.push(Plane {
                    data: Bytes::copy_from_slice(&tex.data),
                    stride: tex.row_bytes(),
                });
            }
            HostPlanes::new(planes)
        };
        let converter = FormatConverter::for_layout(layout, PixelFormat::Rgba)?;
        converter.convert(&planes, &mut target.pixels())
    }
}

impl std::fmt::Debug for HostGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostGpu")
            .field("textures", &self.live_textures())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::TextureFormat;

    #[test]
    fn test_upload_respects_stride() {
        let gpu = HostGpu::new();
        let tex = gpu
            .create_texture(&TextureDesc {
                width: 2,
                height: 2,
                format: TextureFormat::R8,
            })
            .unwrap();
        // Rows padded to four bytes.
        gpu.upload(tex, &[1, 2, 0, 0, 3, 4], 4).unwrap();
        assert_eq!(gpu.textures.lock()[&tex].data, [1, 2, 3, 4]);
        assert!(gpu.upload(tex, &[1, 2, 0], 4).is_err());
    }

    #[test]
    fn test_destroy_unbinds() {
        let gpu = HostGpu::new();
        let desc = TextureDesc {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
        };
        let tex = gpu.create_texture(&desc).unwrap();
        gpu.bind_texture(0, tex).unwrap();
        assert_eq!(gpu.bound(0), Some(tex));
        gpu.destroy_texture(tex);
        assert_eq!(gpu.bound(0), None);
        assert_eq!(gpu.live_textures(), 0);
        assert!(gpu.bind_texture(0, tex).is_err());
    }

    #[test]
    fn test_compose_bgra_swizzles_to_rgba() {
        let gpu = HostGpu::new();
        let tex = gpu
            .create_texture(&TextureDesc {
                width: 1,
                height: 1,
                format: TextureFormat::Bgra8,
            })
            .unwrap();
        gpu.upload(tex, &[10, 20, 30, 255], 4).unwrap();
        let target = RenderTarget::new(1, 1);
        let layout = FrameLayout {
            width: 1,
            height: 1,
            format: PixelFormat::Bgra,
        };
        gpu.compose(&[tex], layout, &target).unwrap();
        assert_eq!(target.snapshot(), [30, 20, 10, 255]);
    }
}
