// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod image_frame;
mod pixel_format;
mod timing;
mod video_frame;

pub use image_frame::ImageFrame;
pub use pixel_format::{fourcc, fourcc_string, PixelFormat, PlaneLayout};
pub use timing::{FrameTiming, Rational};
pub use video_frame::{DeviceSurface, FrameLayout, FrameStorage, HostPlanes, Plane, VideoFrame};
