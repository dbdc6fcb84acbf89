// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Headerless raw video: back-to-back frames of one fixed layout.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::{ByteSource, PacketSource, Whence};
use crate::core::codec::RAW_VIDEO_CODEC_ID;
use crate::core::frames::{PixelFormat, Rational};
use crate::core::packet::{Packet, StreamInfo};
use crate::core::{PipelineError, Result};

/// Geometry of a raw video file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVideoDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: Rational,
}

impl RawVideoDescriptor {
    pub fn frame_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }
}

/// Reads one packet per raw frame from a [`ByteSource`], as stream 0.
///
/// Timestamps count frames in a `1/fps` time base. A trailing partial frame
/// ends the stream.
pub struct RawVideoSource<S> {
    bytes: S,
    descriptor: RawVideoDescriptor,
    streams: Vec<StreamInfo>,
    next_frame: i64,
}

impl<S: ByteSource> RawVideoSource<S> {
    pub fn new(bytes: S, descriptor: RawVideoDescriptor) -> Result<Self> {
        if descriptor.format.is_hardware() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "raw video cannot carry {} frames",
                descriptor.format
            )));
        }
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(PipelineError::Configuration(format!(
                "raw video size {}x{} is empty",
                descriptor.width, descriptor.height
            )));
        }
        let frame_rate = if descriptor.frame_rate.is_unknown() {
            Rational::new(30, 1)
        } else {
            descriptor.frame_rate
        };
        let descriptor = RawVideoDescriptor {
            frame_rate,
            ..descriptor
        };
        let stream = StreamInfo::video(0, RAW_VIDEO_CODEC_ID, descriptor.width, descriptor.height)
            .with_time_base(Rational::new(frame_rate.den, frame_rate.num))
            .with_frame_rate(frame_rate)
            .with_pixel_format(descriptor.format);
        Ok(Self {
            bytes,
            descriptor,
            streams: vec![stream],
            next_frame: 0,
        })
    }

    pub fn descriptor(&self) -> &RawVideoDescriptor {
        &self.descriptor
    }

    /// Whole frames in the underlying bytes, for seekable sources.
    pub fn frame_count(&mut self) -> Result<Option<u64>> {
        if !self.bytes.is_seekable() {
            return Ok(None);
        }
        let size = self.bytes.seek(Whence::Size)?;
        Ok(Some(size / self.descriptor.frame_size() as u64))
    }

    /// Position so the next packet is frame `index`.
    pub fn seek_to_frame(&mut self, index: u64) -> Result<()> {
        if !self.bytes.is_seekable() {
            return Err(PipelineError::InvalidState("source is not seekable".into()));
        }
        self.bytes
            .seek(Whence::Start(index * self.descriptor.frame_size() as u64))?;
        self.next_frame = index as i64;
        Ok(())
    }
}

impl<S: ByteSource> PacketSource for RawVideoSource<S> {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let frame_size = self.descriptor.frame_size();
        let mut buf = BytesMut::zeroed(frame_size);
        let filled = self.bytes.read_full(&mut buf)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < frame_size {
            tracing::warn!(
                frame = self.next_frame,
                filled,
                frame_size,
                "Discarding trailing partial raw frame"
            );
            return Ok(None);
        }
        let pts = self.next_frame;
        self.next_frame += 1;
        let packet = Packet::new(0, buf.freeze())
            .with_timestamps(pts, pts, 1)
            .with_pos(pts * frame_size as i64)
            .keyframe();
        Ok(Some(packet))
    }
}
