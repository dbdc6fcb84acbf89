// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pixel formats understood by the pipeline.
//!
//! Host formats are a closed list: packed BGRA/RGBA, semi-planar NV12/P010
//! and planar YUV 4:2:0 in 8 and 10 bits. Hardware formats mark a frame as
//! GPU-resident; the surface behind it reports its own host layout.

use serde::{Deserialize, Serialize};

/// Build a little-endian four-character code (`a` in the lowest byte).
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// Render a four-character code for logs.
pub fn fourcc_string(code: u32) -> String {
    code.to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    // ===========================================
    // Packed RGB (single plane, 8 bits/channel)
    // ===========================================
    /// B, G, R, A byte order in memory.
    #[default]
    Bgra,
    /// R, G, B, A byte order in memory.
    Rgba,

    // ===========================================
    // Semi-planar YUV 4:2:0
    // ===========================================
    /// 8-bit luma plane + interleaved CbCr plane.
    Nv12,
    /// 16-bit containers, 10 significant bits in the high bits.
    P010,

    // ===========================================
    // Planar YUV 4:2:0
    // ===========================================
    /// Three 8-bit planes.
    Yuv420p,
    /// Three planes of 16-bit little-endian samples, 10 significant low bits.
    Yuv420p10,

    // ===========================================
    // GPU-resident (opaque surface handles)
    // ===========================================
    Vaapi,
    Cuda,
    DrmPrime,
    D3d11,
    VideoToolbox,
}

/// Geometry of one plane for a given frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Width in samples (not bytes).
    pub width: u32,
    pub height: u32,
    /// Interleaved channels per sample position (2 for CbCr, 4 for BGRA).
    pub channels: u32,
    pub bytes_per_channel: u32,
}

impl PlaneLayout {
    /// Smallest legal row stride in bytes.
    pub fn min_stride(&self) -> usize {
        self.width as usize * self.channels as usize * self.bytes_per_channel as usize
    }

    /// Bytes needed for the plane at `stride`.
    pub fn size_with_stride(&self, stride: usize) -> usize {
        stride * self.height as usize
    }

    pub fn bit_depth(&self, format: PixelFormat) -> u32 {
        match format {
            PixelFormat::P010 | PixelFormat::Yuv420p10 => 10,
            _ => self.bytes_per_channel * 8,
        }
    }
}

impl PixelFormat {
    /// Every host format, in display order.
    pub const HOST_FORMATS: [PixelFormat; 6] = [
        PixelFormat::Bgra,
        PixelFormat::Rgba,
        PixelFormat::Nv12,
        PixelFormat::P010,
        PixelFormat::Yuv420p,
        PixelFormat::Yuv420p10,
    ];

    /// Whether frames in this format live in device memory.
    pub const fn is_hardware(&self) -> bool {
        matches!(
            self,
            Self::Vaapi | Self::Cuda | Self::DrmPrime | Self::D3d11 | Self::VideoToolbox
        )
    }

    pub const fn is_yuv(&self) -> bool {
        matches!(
            self,
            Self::Nv12 | Self::P010 | Self::Yuv420p | Self::Yuv420p10
        )
    }

    /// Formats the display path can emit.
    pub const fn is_display_layout(&self) -> bool {
        matches!(self, Self::Bgra | Self::Rgba)
    }

    pub const fn plane_count(&self) -> usize {
        match self {
            Self::Bgra | Self::Rgba => 1,
            Self::Nv12 | Self::P010 => 2,
            Self::Yuv420p | Self::Yuv420p10 => 3,
            // Opaque handle, no host planes.
            _ => 0,
        }
    }

    pub const fn bit_depth(&self) -> u32 {
        match self {
            Self::P010 | Self::Yuv420p10 => 10,
            _ => 8,
        }
    }

    /// Per-plane layout for a `width` x `height` frame. Empty for hardware formats.
    ///
    /// Chroma planes of 4:2:0 formats are half width and half height,
    /// rounded up for odd dimensions.
    pub fn planes(&self, width: u32, height: u32) -> Vec<PlaneLayout> {
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        let plane = |width, height, channels, bytes_per_channel| PlaneLayout {
            width,
            height,
            channels,
            bytes_per_channel,
        };
        match self {
            Self::Bgra | Self::Rgba => vec![plane(width, height, 4, 1)],
            Self::Nv12 => vec![plane(width, height, 1, 1), plane(cw, ch, 2, 1)],
            Self::P010 => vec![plane(width, height, 1, 2), plane(cw, ch, 2, 2)],
            Self::Yuv420p => vec![
                plane(width, height, 1, 1),
                plane(cw, ch, 1, 1),
                plane(cw, ch, 1, 1),
            ],
            Self::Yuv420p10 => vec![
                plane(width, height, 1, 2),
                plane(cw, ch, 1, 2),
                plane(cw, ch, 1, 2),
            ],
            _ => Vec::new(),
        }
    }

    /// Tightly packed size of a whole frame in bytes.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        self.planes(width, height)
            .iter()
            .map(|p| p.size_with_stride(p.min_stride()))
            .sum()
    }

    /// Codec-side layout code for a host format, as hardware surfaces report it.
    pub const fn layout_code(&self) -> Option<u32> {
        match self {
            Self::Bgra => Some(fourcc(b"BGRA")),
            Self::Rgba => Some(fourcc(b"RGBA")),
            Self::Nv12 => Some(fourcc(b"NV12")),
            Self::P010 => Some(fourcc(b"P010")),
            Self::Yuv420p => Some(fourcc(b"I420")),
            Self::Yuv420p10 => Some(fourcc(b"I010")),
            _ => None,
        }
    }

    pub fn from_layout_code(code: u32) -> Option<Self> {
        Self::HOST_FORMATS
            .iter()
            .copied()
            .find(|f| f.layout_code() == Some(code))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bgra => "bgra",
            Self::Rgba => "rgba",
            Self::Nv12 => "nv12",
            Self::P010 => "p010",
            Self::Yuv420p => "yuv420p",
            Self::Yuv420p10 => "yuv420p10",
            Self::Vaapi => "vaapi",
            Self::Cuda => "cuda",
            Self::DrmPrime => "drm_prime",
            Self::D3d11 => "d3d11",
            Self::VideoToolbox => "videotoolbox",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = crate::core::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::HOST_FORMATS
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                crate::core::PipelineError::UnsupportedFormat(format!(
                    "'{}' is not a host pixel format",
                    s
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_is_little_endian() {
        assert_eq!(fourcc(b"NV12"), 0x3231564E);
        assert_eq!(fourcc_string(fourcc(b"P010")), "P010");
    }

    #[test]
    fn test_chroma_planes_are_subsampled() {
        let planes = PixelFormat::Nv12.planes(1920, 1080);
        assert_eq!(planes.len(), 2);
        assert_eq!((planes[0].width, planes[0].height), (1920, 1080));
        assert_eq!((planes[1].width, planes[1].height), (960, 540));
        assert_eq!(planes[1].min_stride(), 1920);
    }

    #[test]
    fn test_odd_dimensions_round_chroma_up() {
        let planes = PixelFormat::Yuv420p.planes(5, 3);
        assert_eq!((planes[1].width, planes[1].height), (3, 2));
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::Bgra.frame_size(4, 2), 32);
        assert_eq!(PixelFormat::Nv12.frame_size(4, 2), 12);
        assert_eq!(PixelFormat::P010.frame_size(4, 2), 24);
        assert_eq!(PixelFormat::Yuv420p10.frame_size(4, 2), 24);
    }

    #[test]
    fn test_hardware_formats_have_no_host_planes() {
        assert!(PixelFormat::Vaapi.is_hardware());
        assert_eq!(PixelFormat::Vaapi.plane_count(), 0);
        assert!(PixelFormat::Cuda.planes(16, 16).is_empty());
    }

    #[test]
    fn test_layout_codes_round_trip_for_host_formats() {
        for format in PixelFormat::HOST_FORMATS {
            let code = format.layout_code().unwrap();
            assert_eq!(PixelFormat::from_layout_code(code), Some(format));
        }
        assert_eq!(PixelFormat::from_layout_code(fourcc(b"YUYV")), None);
    }

    #[test]
    fn test_parse_from_name() {
        assert_eq!("NV12".parse::<PixelFormat>().unwrap(), PixelFormat::Nv12);
        assert!("vaapi".parse::<PixelFormat>().is_err());
    }
}
