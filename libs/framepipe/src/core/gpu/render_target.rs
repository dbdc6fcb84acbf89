// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use parking_lot::Mutex;

use crate::core::pool::ResourceAllocator;
use crate::core::Result;

/// RGBA8 offscreen surface a frame is composed into.
pub struct RenderTarget {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<u8>>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Mutex::new(vec![0u8; width as usize * height as usize * 4]),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn pixels(&self) -> parking_lot::MutexGuard<'_, Vec<u8>> {
        self.pixels.lock()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.pixels.lock().clone()
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderTargetAllocator {
    pub width: u32,
    pub height: u32,
}

impl ResourceAllocator<RenderTarget> for RenderTargetAllocator {
    fn allocate(&self) -> Result<RenderTarget> {
        Ok(RenderTarget::new(self.width, self.height))
    }
}
