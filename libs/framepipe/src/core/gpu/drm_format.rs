// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-plane DRM formats for importing each supported surface layout.
//!
//! The table is closed: a layout code it does not list cannot be imported.

use crate::core::frames::{fourcc, fourcc_string};
use crate::core::{PipelineError, Result};

pub const R8: u32 = fourcc(b"R8  ");
pub const GR88: u32 = fourcc(b"GR88");
pub const R16: u32 = fourcc(b"R16 ");
pub const GR1616: u32 = fourcc(b"GR32");
pub const ARGB8888: u32 = fourcc(b"AR24");
pub const ABGR8888: u32 = fourcc(b"AB24");

const NV12: u32 = fourcc(b"NV12");
const P010: u32 = fourcc(b"P010");
const I420: u32 = fourcc(b"I420");
const I010: u32 = fourcc(b"I010");
const BGRA: u32 = fourcc(b"BGRA");
const RGBA: u32 = fourcc(b"RGBA");

/// DRM format of each plane of a surface with `layout_code`.
pub fn plane_formats(layout_code: u32) -> Result<&'static [u32]> {
    let formats: &'static [u32] = match layout_code {
        NV12 => &[R8, GR88],
        P010 => &[R16, GR1616],
        I420 => &[R8, R8, R8],
        I010 => &[R16, R16, R16],
        // Byte order B,G,R,A is little-endian ARGB.
        BGRA => &[ARGB8888],
        RGBA => &[ABGR8888],
        other => {
            return Err(PipelineError::UnsupportedFormat(format!(
                "no DRM import mapping for layout '{}'",
                fourcc_string(other)
            )));
        }
    };
    Ok(formats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::PixelFormat;

    #[test]
    fn test_every_host_format_is_mapped() {
        for format in PixelFormat::HOST_FORMATS {
            let code = format.layout_code().unwrap();
            let planes = plane_formats(code).unwrap();
            assert_eq!(planes.len(), format.plane_count(), "{}", format);
        }
    }

    #[test]
    fn test_semi_planar_chroma_is_two_channel() {
        assert_eq!(plane_formats(NV12).unwrap(), &[R8, GR88]);
        assert_eq!(plane_formats(P010).unwrap(), &[R16, GR1616]);
    }

    #[test]
    fn test_unknown_layout_is_an_error() {
        let err = plane_formats(fourcc(b"YUYV")).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("YUYV"));
    }
}
