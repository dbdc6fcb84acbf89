// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use parking_lot::{MappedMutexGuard, MutexGuard};

use super::{FrameTiming, PixelFormat};
use crate::core::pool::{HostBuffer, PoolSlotId, PooledResource};

/// Display-ready snapshot of a frame in a packed RGB layout.
///
/// The pixels live in a pooled buffer owned by this image alone. Dropping
/// the image returns the buffer to its pool, so a sink that keeps images
/// around holds pool slots until it lets go of them.
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes.
    pub stride: usize,
    /// [`PixelFormat::Bgra`] or [`PixelFormat::Rgba`].
    pub format: PixelFormat,
    pub timing: FrameTiming,
    pub frame_number: u64,
    buffer: PooledResource<HostBuffer>,
    len: usize,
}

impl ImageFrame {
    pub(crate) fn from_pooled(
        buffer: PooledResource<HostBuffer>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Self {
        let len = (stride * height as usize).min(buffer.len());
        Self {
            width,
            height,
            stride,
            format,
            timing: FrameTiming::default(),
            frame_number: 0,
            buffer,
            len,
        }
    }

    pub(crate) fn with_timing(mut self, timing: FrameTiming, frame_number: u64) -> Self {
        self.timing = timing;
        self.frame_number = frame_number;
        self
    }

    /// Image bytes, `stride * height` long.
    pub fn data(&self) -> MappedMutexGuard<'_, [u8]> {
        let len = self.len;
        MutexGuard::map(self.buffer.lock(), |bytes| &mut bytes[..len])
    }

    /// Writable image bytes, for sinks that rework the snapshot in place.
    pub fn data_mut(&mut self) -> MappedMutexGuard<'_, [u8]> {
        self.data()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data().to_vec()
    }

    /// Pool slot backing this image.
    pub fn slot_id(&self) -> PoolSlotId {
        self.buffer.slot_id()
    }

    /// Pixel at (`x`, `y`) as four bytes in the image's channel order.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride + x as usize * 4;
        let data = self.data();
        let px = data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl std::fmt::Debug for ImageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("frame_number", &self.frame_number)
            .field("slot", &self.buffer.slot_id())
            .field("bytes", &self.len)
            .finish()
    }
}
