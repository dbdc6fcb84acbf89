// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host pixel-format conversion to packed display layouts.
//!
//! YUV input uses the BT.709 matrix in 10-bit fixed point:
//!
//! ```text
//! R = 1.164 * (Y - 16) + 1.793 * (V - 128)
//! G = 1.164 * (Y - 16) - 0.213 * (U - 128) - 0.533 * (V - 128)
//! B = 1.164 * (Y - 16) + 2.112 * (U - 128)
//! ```
//!
//! 10-bit input is reduced to 8 bits before the matrix.

use crate::core::frames::{FrameLayout, HostPlanes, Plane, PixelFormat, VideoFrame};
use crate::core::{PipelineError, Result};

const Y_SCALE: i32 = 1192; // 1.164 * 1024
const V_TO_R: i32 = 1836; // 1.793 * 1024
const U_TO_G: i32 = 218; // 0.213 * 1024
const V_TO_G: i32 = 546; // 0.533 * 1024
const U_TO_B: i32 = 2163; // 2.112 * 1024

#[inline(always)]
fn clamp_u8(val: i32) -> u8 {
    val.clamp(0, 255) as u8
}

#[inline(always)]
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> [u8; 3] {
    let c = Y_SCALE * (y - 16);
    let d = u - 128;
    let e = v - 128;
    [
        clamp_u8((c + V_TO_R * e + 512) >> 10),
        clamp_u8((c - U_TO_G * d - V_TO_G * e + 512) >> 10),
        clamp_u8((c + U_TO_B * d + 512) >> 10),
    ]
}

#[inline(always)]
fn sample8(plane: &Plane, row: usize, index: usize) -> i32 {
    plane.data[row * plane.stride + index] as i32
}

#[inline(always)]
fn sample16(plane: &Plane, row: usize, index: usize) -> u16 {
    let offset = row * plane.stride + index * 2;
    u16::from_le_bytes([plane.data[offset], plane.data[offset + 1]])
}

/// Converts frames of one host layout and size to BGRA or RGBA.
///
/// Bound to the layout it was created for; callers recreate it when the
/// width, height or source format changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatConverter {
    src: PixelFormat,
    dst: PixelFormat,
    width: u32,
    height: u32,
}

impl FormatConverter {
    pub fn new(src: PixelFormat, width: u32, height: u32, dst: PixelFormat) -> Result<Self> {
        if src.is_hardware() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "cannot convert device-resident {} frames; transfer them first",
                src
            )));
        }
        if !dst.is_display_layout() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{} is not a display layout",
                dst
            )));
        }
        if width == 0 || height == 0 {
            return Err(PipelineError::Configuration(format!(
                "invalid conversion size {}x{}",
                width, height
            )));
        }
        Ok(Self {
            src,
            dst,
            width,
            height,
        })
    }

    pub fn for_layout(layout: FrameLayout, dst: PixelFormat) -> Result<Self> {
        Self::new(layout.format, layout.width, layout.height, dst)
    }

    /// Whether this converter can handle `layout` into `dst` as-is.
    pub fn matches(&self, layout: FrameLayout, dst: PixelFormat) -> bool {
        self.src == layout.format
            && self.width == layout.width
            && self.height == layout.height
            && self.dst == dst
    }

    pub fn source_format(&self) -> PixelFormat {
        self.src
    }

    pub fn output_format(&self) -> PixelFormat {
        self.dst
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn output_stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn output_len(&self) -> usize {
        self.output_stride() * self.height as usize
    }

    /// Convert a host frame into `out` (at least [`Self::output_len`] bytes).
    pub fn convert_frame(&self, frame: &VideoFrame, out: &mut [u8]) -> Result<()> {
        let planes = frame.host_planes().ok_or_else(|| {
            PipelineError::InvalidState("frame is device-resident; transfer it first".into())
        })?;
        if frame.width != self.width || frame.height != self.height || frame.format != self.src {
            return Err(PipelineError::InvalidState(format!(
                "converter built for {} {}x{}, got {} {}x{}",
                self.src, self.width, self.height, frame.format, frame.width, frame.height
            )));
        }
        self.convert(planes, out)
    }

    pub fn convert(&self, planes: &HostPlanes, out: &mut [u8]) -> Result<()> {
        planes.validate(self.src, self.width, self.height)?;
        let needed = self.output_len();
        if out.len() < needed {
            return Err(PipelineError::Configuration(format!(
                "output buffer too small: need {}, got {}",
                needed,
                out.len()
            )));
        }

        let stride = self.output_stride();
        let p = planes.planes();
        for row in 0..self.height as usize {
            let out_row = &mut out[row * stride..(row + 1) * stride];
            match self.src {
                PixelFormat::Bgra | PixelFormat::Rgba => self.packed_row(&p[0], row, out_row),
                _ => self.yuv_row(p, row, out_row),
            }
        }
        Ok(())
    }

    fn packed_row(&self, plane: &Plane, row: usize, out_row: &mut [u8]) {
        let start = row * plane.stride;
        let src_row = &plane.data[start..start + self.output_stride()];
        if self.src == self.dst {
            out_row.copy_from_slice(src_row);
            return;
        }
        // BGRA <-> RGBA: swap channels 0 and 2.
        for (dst, src) in out_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        }
    }

    fn yuv_row(&self, planes: &[Plane], row: usize, out_row: &mut [u8]) {
        let crow = row / 2;
        for col in 0..self.width as usize {
            let ccol = col / 2;
            let (y, u, v) = match self.src {
                PixelFormat::Nv12 => (
                    sample8(&planes[0], row, col),
                    sample8(&planes[1], crow, ccol * 2),
                    sample8(&planes[1], crow, ccol * 2 + 1),
                ),
                // Ten significant bits in the high end of each 16-bit sample.
                PixelFormat::P010 => (
                    (sample16(&planes[0], row, col) >> 8) as i32,
                    (sample16(&planes[1], crow, ccol * 2) >> 8) as i32,
                    (sample16(&planes[1], crow, ccol * 2 + 1) >> 8) as i32,
                ),
                PixelFormat::Yuv420p => (
                    sample8(&planes[0], row, col),
                    sample8(&planes[1], crow, ccol),
                    sample8(&planes[2], crow, ccol),
                ),
                // Ten significant bits in the low end.
                PixelFormat::Yuv420p10 => (
                    ((sample16(&planes[0], row, col) & 0x3ff) >> 2) as i32,
                    ((sample16(&planes[1], crow, ccol) & 0x3ff) >> 2) as i32,
                    ((sample16(&planes[2], crow, ccol) & 0x3ff) >> 2) as i32,
                ),
                // Packed sources never reach the YUV path.
                _ => return,
            };
            let [r, g, b] = yuv_to_rgb(y, u, v);
            let px = &mut out_row[col * 4..col * 4 + 4];
            if self.dst == PixelFormat::Rgba {
                px.copy_from_slice(&[r, g, b, 255]);
            } else {
                px.copy_from_slice(&[b, g, r, 255]);
            }
        }
    }
}
