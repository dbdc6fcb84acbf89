// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::{drm_format, DmaBufDescriptor, GpuBackend, ImageId, PlaneImport, TextureDesc, TextureFormat, TextureId};
use crate::core::frames::{DeviceSurface, FrameLayout, PlaneLayout, VideoFrame};
use crate::core::{PipelineError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinderStats {
    pub frames_imported: u64,
    pub frames_uploaded: u64,
    pub texture_rebuilds: u64,
}

struct PlaneTexture {
    id: TextureId,
    layout: PlaneLayout,
}

/// Keeps one texture per plane of the current frame layout and points them
/// at each new frame.
///
/// Textures are created on the first frame and again only when width,
/// height or host layout change. Device frames are imported zero-copy when
/// the backend supports it; everything else is uploaded.
pub struct FrameTextureBinder {
    gpu: Arc<dyn GpuBackend>,
    layout: Option<FrameLayout>,
    textures: Vec<PlaneTexture>,
    images: Vec<ImageId>,
    /// Surface behind `images`; imported images must not outlive it.
    imported_from: Option<Arc<dyn DeviceSurface>>,
    stats: BinderStats,
}

impl FrameTextureBinder {
    pub fn new(gpu: Arc<dyn GpuBackend>) -> Self {
        Self {
            gpu,
            layout: None,
            textures: Vec::new(),
            images: Vec::new(),
            imported_from: None,
            stats: BinderStats::default(),
        }
    }

    pub fn layout(&self) -> Option<FrameLayout> {
        self.layout
    }

    pub fn textures(&self) -> Vec<TextureId> {
        self.textures.iter().map(|t| t.id).collect()
    }

    pub fn stats(&self) -> BinderStats {
        self.stats
    }

    /// Make the textures show `frame` and bind them to units `0..planes`.
    pub fn bind(&mut self, frame: &VideoFrame) -> Result<()> {
        let layout = frame.layout();
        if self.layout != Some(layout) {
            self.rebuild(layout)?;
        }
        match frame.device_surface() {
            Some(surface) if self.gpu.supports_zero_copy() => self.import(surface)?,
            _ => self.upload(frame)?,
        }
        self.rebind()
    }

    /// Bind the current textures again without touching their contents.
    pub fn rebind(&self) -> Result<()> {
        for (unit, texture) in self.textures.iter().enumerate() {
            self.gpu.bind_texture(unit as u32, texture.id)?;
        }
        Ok(())
    }

    /// Drop all textures and imports; the next frame starts over.
    pub fn reset(&mut self) {
        self.release_images();
        for texture in self.textures.drain(..) {
            self.gpu.destroy_texture(texture.id);
        }
        self.layout = None;
    }

    fn rebuild(&mut self, layout: FrameLayout) -> Result<()> {
        self.reset();
        let planes = layout.format.planes(layout.width, layout.height);
        if planes.is_empty() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{} has no host plane layout",
                layout.format
            )));
        }
        for plane in planes {
            let desc = TextureDesc {
                width: plane.width,
                height: plane.height,
                format: TextureFormat::for_plane(layout.format, &plane)?,
            };
            match self.gpu.create_texture(&desc) {
                Ok(id) => self.textures.push(PlaneTexture { id, layout: plane }),
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        }
        tracing::debug!(
            width = layout.width,
            height = layout.height,
            format = %layout.format,
            planes = self.textures.len(),
            "Created plane textures"
        );
        self.layout = Some(layout);
        self.stats.texture_rebuilds += 1;
        Ok(())
    }

    fn release_images(&mut self) {
        for image in self.images.drain(..) {
            self.gpu.destroy_image(image);
        }
        self.imported_from = None;
    }

    fn import(&mut self, surface: &Arc<dyn DeviceSurface>) -> Result<()> {
        self.release_images();
        let descriptor = surface.export_dmabuf()?;
        if let Err(e) = self.import_planes(&descriptor) {
            self.release_images();
            return Err(e);
        }
        // The images hold the memory now; the exported fds can go.
        drop(descriptor);
        self.imported_from = Some(Arc::clone(surface));
        self.stats.frames_imported += 1;
        Ok(())
    }

    fn import_planes(&mut self, descriptor: &DmaBufDescriptor) -> Result<()> {
        let formats = drm_format::plane_formats(descriptor.layout_code)?;
        if formats.len() != self.textures.len() || descriptor.planes.len() != formats.len() {
            return Err(PipelineError::GpuImport(format!(
                "surface exported {} planes, layout needs {}",
                descriptor.planes.len(),
                self.textures.len()
            )));
        }
        for (index, plane) in descriptor.planes.iter().enumerate() {
            let texture = &self.textures[index];
            let object = descriptor.object(plane.object)?;
            let import = PlaneImport {
                width: texture.layout.width,
                height: texture.layout.height,
                drm_format: formats[index],
                fd: &object.fd,
                offset: plane.offset,
                pitch: plane.pitch,
                modifier: object.modifier,
            };
            let image = self.gpu.import_dmabuf_plane(&import)?;
            self.images.push(image);
            self.gpu.bind_image(texture.id, image)?;
        }
        Ok(())
    }

    fn upload(&mut self, frame: &VideoFrame) -> Result<()> {
        self.release_images();
        let host = frame.clone().into_host()?;
        let planes = host
            .host_planes()
            .ok_or_else(|| PipelineError::InvalidState("host transfer produced no planes".into()))?;
        for (texture, plane) in self.textures.iter().zip(planes.planes()) {
            self.gpu.upload(texture.id, &plane.data, plane.stride)?;
        }
        self.stats.frames_uploaded += 1;
        Ok(())
    }
}

impl Drop for FrameTextureBinder {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for FrameTextureBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTextureBinder")
            .field("gpu", &self.gpu.name())
            .field("layout", &self.layout)
            .field("textures", &self.textures())
            .field("images", &self.images)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::{FrameTiming, HostPlanes, PixelFormat};
    use crate::core::gpu::HostGpu;

    fn frame(format: PixelFormat, width: u32, height: u32) -> VideoFrame {
        VideoFrame::from_host(
            format,
            width,
            height,
            HostPlanes::allocate(format, width, height),
            FrameTiming::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_textures_reused_until_layout_changes() {
        let gpu = Arc::new(HostGpu::new());
        let mut binder = FrameTextureBinder::new(gpu.clone());
        binder.bind(&frame(PixelFormat::Nv12, 4, 4)).unwrap();
        let first = binder.textures();
        binder.bind(&frame(PixelFormat::Nv12, 4, 4)).unwrap();
        assert_eq!(binder.textures(), first);
        assert_eq!(gpu.bound(1), Some(first[1]));

        binder.bind(&frame(PixelFormat::Yuv420p, 4, 4)).unwrap();
        assert_eq!(binder.textures().len(), 3);
        assert_eq!(gpu.live_textures(), 3);
        assert_eq!(binder.stats().texture_rebuilds, 2);
        assert_eq!(binder.stats().frames_uploaded, 3);
    }

    #[test]
    fn test_drop_destroys_textures() {
        let gpu = Arc::new(HostGpu::new());
        {
            let mut binder = FrameTextureBinder::new(gpu.clone());
            binder.bind(&frame(PixelFormat::P010, 2, 2)).unwrap();
            assert_eq!(gpu.live_textures(), 2);
        }
        assert_eq!(gpu.live_textures(), 0);
    }
}
