// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Codec and hardware-device boundary.

mod backend;
mod hw_device;
mod raw_video;

pub use backend::{CodecBackend, CodecParameters, CodecResult};
pub use hw_device::{HwDevice, HwDeviceContext, HwDeviceProvider, HwDeviceType};
pub use raw_video::{RawVideoCodec, RAW_VIDEO_CODEC_ID};
