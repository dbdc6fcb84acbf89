// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hardware acceleration devices.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::frames::PixelFormat;
use crate::core::{PipelineError, Result};

/// Acceleration backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwDeviceType {
    Vaapi,
    Cuda,
    Drm,
    D3d11va,
    VideoToolbox,
    Qsv,
}

impl HwDeviceType {
    pub const ALL: [HwDeviceType; 6] = [
        HwDeviceType::Vaapi,
        HwDeviceType::Cuda,
        HwDeviceType::Drm,
        HwDeviceType::D3d11va,
        HwDeviceType::VideoToolbox,
        HwDeviceType::Qsv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Vaapi => "vaapi",
            Self::Cuda => "cuda",
            Self::Drm => "drm",
            Self::D3d11va => "d3d11va",
            Self::VideoToolbox => "videotoolbox",
            Self::Qsv => "qsv",
        }
    }

    /// Frame format that marks surfaces produced on this device.
    pub fn surface_format(&self) -> PixelFormat {
        match self {
            Self::Vaapi => PixelFormat::Vaapi,
            Self::Cuda => PixelFormat::Cuda,
            Self::Drm => PixelFormat::DrmPrime,
            Self::D3d11va => PixelFormat::D3d11,
            Self::VideoToolbox => PixelFormat::VideoToolbox,
            // QSV surfaces are exposed through the VA-API layer on Linux.
            Self::Qsv => PixelFormat::Vaapi,
        }
    }
}

impl std::fmt::Display for HwDeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for HwDeviceType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                PipelineError::Configuration(format!("unknown hardware device type '{}'", s))
            })
    }
}

/// An opened acceleration device.
///
/// Implementations release the device when dropped.
pub trait HwDevice: Send + Sync + std::fmt::Debug {
    fn device_type(&self) -> HwDeviceType;

    /// Device node or adapter the device was opened on, e.g. `/dev/dri/renderD128`.
    fn node(&self) -> Option<&str>;
}

/// Shared reference to an opened device.
///
/// Cloning shares the device; the codec and any renderer importing its
/// frames hold the same context.
#[derive(Clone, Debug)]
pub struct HwDeviceContext {
    inner: Arc<dyn HwDevice>,
}

impl HwDeviceContext {
    pub fn new(device: Arc<dyn HwDevice>) -> Self {
        Self { inner: device }
    }

    pub fn device_type(&self) -> HwDeviceType {
        self.inner.device_type()
    }

    pub fn node(&self) -> Option<&str> {
        self.inner.node()
    }

    pub fn device(&self) -> &dyn HwDevice {
        self.inner.as_ref()
    }

    pub fn same_device(&self, other: &HwDeviceContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Live references to the underlying device.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

/// Opens devices of one type.
pub trait HwDeviceProvider: Send + Sync {
    fn device_type(&self) -> HwDeviceType;

    fn create(&self, node: Option<&str>) -> Result<HwDeviceContext>;
}
