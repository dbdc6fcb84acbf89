// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Renderer side: import decoded frames as textures and present them.
//!
//! The platform GPU API sits behind [`GpuBackend`]. [`FrameTextureBinder`]
//! maps frames onto per-plane textures, zero-copy through DMA-buf when the
//! backend can import it, by upload otherwise.

mod backend;
mod dmabuf;
pub mod drm_format;
mod host_gpu;
mod render_sink;
mod render_target;
mod texture_binder;

pub use backend::{GpuBackend, ImageId, PlaneImport, TextureDesc, TextureFormat, TextureId};
pub use dmabuf::{DmaBufDescriptor, DmaBufFd, DmaBufObject, DmaBufPlane, DRM_FORMAT_MOD_LINEAR};
pub use host_gpu::HostGpu;
pub use render_sink::{RenderHealth, RenderSink, RenderStats};
pub use render_target::{RenderTarget, RenderTargetAllocator};
pub use texture_binder::{BinderStats, FrameTextureBinder};
