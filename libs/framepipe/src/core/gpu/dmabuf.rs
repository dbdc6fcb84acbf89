// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Exported DMA-buf planes of a device surface.

use crate::core::{PipelineError, Result};

/// Owned descriptor of an exported buffer object. Closed on drop.
#[cfg(unix)]
pub type DmaBufFd = std::os::fd::OwnedFd;
#[cfg(windows)]
pub type DmaBufFd = std::os::windows::io::OwnedHandle;

pub const DRM_FORMAT_MOD_LINEAR: u64 = 0;

/// One exported memory object. Several planes may live in the same object.
#[derive(Debug)]
pub struct DmaBufObject {
    pub fd: DmaBufFd,
    pub size: usize,
    pub modifier: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaBufPlane {
    /// Index into [`DmaBufDescriptor::objects`].
    pub object: usize,
    pub offset: u32,
    pub pitch: u32,
}

/// A surface exported for zero-copy import.
///
/// The descriptor owns its fds; they only need to outlive the import calls.
/// Imported images keep the memory alive on their own.
#[derive(Debug)]
pub struct DmaBufDescriptor {
    /// Codec-side four-character layout code of the surface.
    pub layout_code: u32,
    pub width: u32,
    pub height: u32,
    pub objects: Vec<DmaBufObject>,
    pub planes: Vec<DmaBufPlane>,
}

impl DmaBufDescriptor {
    pub fn object(&self, index: usize) -> Result<&DmaBufObject> {
        self.objects.get(index).ok_or_else(|| {
            PipelineError::GpuImport(format!(
                "plane refers to object {} but only {} were exported",
                index,
                self.objects.len()
            ))
        })
    }
}
