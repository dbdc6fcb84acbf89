// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Encoded packets and the stream descriptions that accompany them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::frames::{PixelFormat, Rational};

/// Kind of media carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Data,
}

/// Description of one elementary stream exposed by a packet source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    /// Registry key of the codec that decodes this stream (e.g. "h264", "rawvideo").
    pub codec_id: String,
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub width: u32,
    pub height: u32,
    /// Pixel layout of decoded frames, when the container declares it.
    pub pixel_format: Option<PixelFormat>,
    /// Codec extradata (parameter sets), empty when absent.
    #[serde(skip)]
    pub extradata: Bytes,
}

impl StreamInfo {
    pub fn video(index: usize, codec_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            codec_id: codec_id.into(),
            time_base: Rational::new(1, 90_000),
            frame_rate: Rational::unknown(),
            width,
            height,
            pixel_format: None,
            extradata: Bytes::new(),
        }
    }

    pub fn audio(index: usize, codec_id: impl Into<String>) -> Self {
        Self {
            index,
            kind: MediaKind::Audio,
            codec_id: codec_id.into(),
            time_base: Rational::new(1, 48_000),
            frame_rate: Rational::unknown(),
            width: 0,
            height: 0,
            pixel_format: None,
            extradata: Bytes::new(),
        }
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }
}

/// One compressed unit of a single stream.
///
/// Packets move between stages; nothing holds on to a packet after handing
/// it on. `data` is a cheap-to-clone view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    /// Byte position in the source, when known.
    pub pos: Option<i64>,
    pub is_keyframe: bool,
}

impl Packet {
    pub fn new(stream_index: usize, data: impl Into<Bytes>) -> Self {
        Self {
            stream_index,
            data: data.into(),
            pts: None,
            dts: None,
            duration: 0,
            pos: None,
            is_keyframe: false,
        }
    }

    pub fn with_timestamps(mut self, pts: i64, dts: i64, duration: i64) -> Self {
        self.pts = Some(pts);
        self.dts = Some(dts);
        self.duration = duration;
        self
    }

    pub fn with_pos(mut self, pos: i64) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn keyframe(mut self) -> Self {
        self.is_keyframe = true;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
