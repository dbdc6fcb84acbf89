// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use bytes::Bytes;

use super::{HwDeviceContext, HwDeviceType};
use crate::core::frames::{PixelFormat, Rational, VideoFrame};
use crate::core::packet::{Packet, StreamInfo};
use crate::core::{CodecError, Result};

/// Result of a codec send/receive call.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Parameters a codec is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    pub codec_id: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub extradata: Bytes,
    /// Requested acceleration, if any.
    pub hw_device: Option<HwDeviceType>,
}

impl CodecParameters {
    pub fn from_stream(stream: &StreamInfo) -> Self {
        Self {
            codec_id: stream.codec_id.clone(),
            width: stream.width,
            height: stream.height,
            pixel_format: stream.pixel_format,
            time_base: stream.time_base,
            frame_rate: stream.frame_rate,
            extradata: stream.extradata.clone(),
            hw_device: None,
        }
    }

    pub fn with_hw_device(mut self, device: HwDeviceType) -> Self {
        self.hw_device = Some(device);
        self
    }
}

/// A black-box codec: open, feed packets, receive frames.
///
/// Follows the send/receive model:
/// - `send_packet(None)` starts a flush; buffered frames keep coming out of
///   `receive_frame` until it returns [`CodecError::Eof`].
/// - `send_packet` returns [`CodecError::Again`] when output must be drained
///   before more input is accepted.
/// - `receive_frame` returns [`CodecError::Again`] when it needs more input.
///
/// Calls are never made concurrently on one backend.
pub trait CodecBackend: Send {
    fn name(&self) -> &str;

    /// Open for `params`. `device` is present when acceleration was requested.
    fn open(&mut self, params: &CodecParameters, device: Option<&HwDeviceContext>) -> Result<()>;

    fn send_packet(&mut self, packet: Option<&Packet>) -> CodecResult<()>;

    fn receive_frame(&mut self) -> CodecResult<VideoFrame>;

    /// Release codec state. Safe to call more than once.
    fn close(&mut self);
}
