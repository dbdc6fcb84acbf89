// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use framepipe::gpu::drm_format;
use framepipe::{fourcc_string, PixelFormat};

const SAMPLE_WIDTH: u32 = 1920;
const SAMPLE_HEIGHT: u32 = 1080;

/// Print every host format with its plane layout at 1080p.
pub fn list() {
    println!(
        "Host pixel formats (plane layout at {}x{}):\n",
        SAMPLE_WIDTH, SAMPLE_HEIGHT
    );

    for format in PixelFormat::HOST_FORMATS {
        let code = format.layout_code().map(fourcc_string).unwrap_or_default();
        println!(
            "  {:<10} {}  {}-bit, {} bytes/frame",
            format.name(),
            code,
            format.bit_depth(),
            format.frame_size(SAMPLE_WIDTH, SAMPLE_HEIGHT)
        );
        let drm = format
            .layout_code()
            .and_then(|code| drm_format::plane_formats(code).ok())
            .unwrap_or_default();
        for (index, plane) in format.planes(SAMPLE_WIDTH, SAMPLE_HEIGHT).iter().enumerate() {
            let import = drm.get(index).map(|f| fourcc_string(*f)).unwrap_or_default();
            println!(
                "    plane {}: {}x{} x{} channels, {} bytes/channel, stride {}  import {}",
                index,
                plane.width,
                plane.height,
                plane.channels,
                plane.bytes_per_channel,
                plane.min_stride(),
                import
            );
        }
    }

    println!("\nHardware surface formats: vaapi, cuda, drmprime, d3d11, videotoolbox");
}
