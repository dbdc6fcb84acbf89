// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pass-through codec for uncompressed frames.

use std::collections::VecDeque;

use super::{CodecBackend, CodecParameters, CodecResult, HwDeviceContext};
use crate::core::frames::{FrameTiming, HostPlanes, PixelFormat, VideoFrame};
use crate::core::packet::Packet;
use crate::core::{CodecError, PipelineError, Result};

pub const RAW_VIDEO_CODEC_ID: &str = "rawvideo";

/// Codec error code for malformed input (`AVERROR_INVALIDDATA`).
const INVALID_DATA: i32 = -0x41444E49;

/// Wraps each packet's bytes as a host frame without copying.
///
/// Holds at most `max_pending` decoded frames; further sends report
/// [`CodecError::Again`] until they are received.
pub struct RawVideoCodec {
    format: PixelFormat,
    width: u32,
    height: u32,
    pending: VecDeque<VideoFrame>,
    max_pending: usize,
    flushing: bool,
    opened: bool,
}

impl RawVideoCodec {
    pub fn new() -> Self {
        Self::with_max_pending(1)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            format: PixelFormat::default(),
            width: 0,
            height: 0,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            flushing: false,
            opened: false,
        }
    }
}

impl Default for RawVideoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecBackend for RawVideoCodec {
    fn name(&self) -> &str {
        RAW_VIDEO_CODEC_ID
    }

    fn open(&mut self, params: &CodecParameters, device: Option<&HwDeviceContext>) -> Result<()> {
        if let Some(device) = device {
            return Err(PipelineError::HardwareDevice(format!(
                "rawvideo has no {} decode path",
                device.device_type()
            )));
        }
        let format = params.pixel_format.ok_or_else(|| {
            PipelineError::Configuration("rawvideo needs a pixel format".into())
        })?;
        if format.is_hardware() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "rawvideo cannot carry {}",
                format
            )));
        }
        if params.width == 0 || params.height == 0 {
            return Err(PipelineError::Configuration(format!(
                "rawvideo size {}x{} is empty",
                params.width, params.height
            )));
        }
        self.format = format;
        self.width = params.width;
        self.height = params.height;
        self.pending.clear();
        self.flushing = false;
        self.opened = true;
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> CodecResult<()> {
        if !self.opened {
            return Err(CodecError::failed(-22, "codec is not open"));
        }
        if self.flushing {
            return Err(CodecError::Eof);
        }
        let Some(packet) = packet else {
            self.flushing = true;
            return Ok(());
        };
        if self.pending.len() >= self.max_pending {
            return Err(CodecError::Again);
        }

        let planes = HostPlanes::from_packed(self.format, self.width, self.height, packet.data.clone())
            .map_err(|err| CodecError::failed(INVALID_DATA, err.to_string()))?;
        let timing = FrameTiming {
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            pos: packet.pos,
        };
        let frame = VideoFrame::from_host(self.format, self.width, self.height, planes, timing)
            .map_err(|err| CodecError::failed(INVALID_DATA, err.to_string()))?;
        self.pending.push_back(frame);
        Ok(())
    }

    fn receive_frame(&mut self) -> CodecResult<VideoFrame> {
        match self.pending.pop_front() {
            Some(frame) => Ok(frame),
            None if self.flushing => Err(CodecError::Eof),
            None => Err(CodecError::Again),
        }
    }

    fn close(&mut self) {
        self.pending.clear();
        self.opened = false;
        self.flushing = false;
    }
}
