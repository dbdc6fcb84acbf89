// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Synthetic capture: eight vertical colour bars scrolling left.

use std::time::{Duration, Instant};

use bytes::Bytes;

use super::{CaptureBackend, CaptureInfo, CaptureSettings};
use crate::core::frames::{FrameTiming, HostPlanes, PixelFormat, Rational, VideoFrame};
use crate::core::{PipelineError, Result};

pub const TEST_PATTERN_CAPTURE: &str = "testpattern";

/// 75% SMPTE-style bars, RGB.
const BARS: [[u8; 3]; 8] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
    [16, 16, 16],
];

/// BT.709 limited-range RGB to YUV, 10-bit fixed point.
fn rgb_to_yuv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(i32::from);
    let y = 16 + ((187 * r + 629 * g + 63 * b + 512) >> 10);
    let u = 128 + ((-103 * r - 346 * g + 450 * b + 512) >> 10);
    let v = 128 + ((450 * r - 409 * g - 41 * b + 512) >> 10);
    [y, u, v].map(|c| c.clamp(0, 255) as u8)
}

pub struct TestPatternCapture {
    settings: CaptureSettings,
    time_base: Rational,
    next_frame: u64,
    started: Option<Instant>,
    opened: bool,
}

impl TestPatternCapture {
    pub fn new(settings: CaptureSettings) -> Result<Self> {
        settings.validate()?;
        if !matches!(
            settings.format,
            PixelFormat::Bgra | PixelFormat::Rgba | PixelFormat::Nv12 | PixelFormat::Yuv420p
        ) {
            return Err(PipelineError::UnsupportedFormat(format!(
                "test pattern cannot produce {} frames",
                settings.format
            )));
        }
        let time_base = Rational::new(settings.frame_rate.den, settings.frame_rate.num);
        Ok(Self {
            settings,
            time_base,
            next_frame: 0,
            started: None,
            opened: false,
        })
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Bar colour at column `x` of frame `index`.
    fn color_at(&self, x: u32, index: u64) -> [u8; 3] {
        let width = u64::from(self.settings.width);
        let step = (width / 64).max(1);
        let shifted = (u64::from(x) + index * step) % width;
        BARS[(shifted * 8 / width) as usize]
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (width, height) = (self.settings.width, self.settings.height);
        let format = self.settings.format;
        let mut data = Vec::with_capacity(format.frame_size(width, height));

        match format {
            PixelFormat::Bgra | PixelFormat::Rgba => {
                let row: Vec<u8> = (0..width)
                    .flat_map(|x| {
                        let [r, g, b] = self.color_at(x, index);
                        if format == PixelFormat::Bgra {
                            [b, g, r, 255]
                        } else {
                            [r, g, b, 255]
                        }
                    })
                    .collect();
                for _ in 0..height {
                    data.extend_from_slice(&row);
                }
            }
            _ => {
                let luma: Vec<u8> = (0..width).map(|x| rgb_to_yuv(self.color_at(x, index))[0]).collect();
                for _ in 0..height {
                    data.extend_from_slice(&luma);
                }
                let chroma: Vec<[u8; 3]> = (0..width.div_ceil(2))
                    .map(|cx| rgb_to_yuv(self.color_at(cx * 2, index)))
                    .collect();
                let chroma_rows = height.div_ceil(2);
                if format == PixelFormat::Nv12 {
                    let row: Vec<u8> = chroma.iter().flat_map(|c| [c[1], c[2]]).collect();
                    for _ in 0..chroma_rows {
                        data.extend_from_slice(&row);
                    }
                } else {
                    for component in [1, 2] {
                        let row: Vec<u8> = chroma.iter().map(|c| c[component]).collect();
                        for _ in 0..chroma_rows {
                            data.extend_from_slice(&row);
                        }
                    }
                }
            }
        }
        data
    }

    fn pace(&mut self, index: u64) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + Duration::from_nanos(self.time_base.ticks_to_ns(index as i64).max(0) as u64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

impl CaptureBackend for TestPatternCapture {
    fn name(&self) -> &str {
        TEST_PATTERN_CAPTURE
    }

    fn open(&mut self) -> Result<CaptureInfo> {
        self.opened = true;
        self.next_frame = 0;
        self.started = None;
        tracing::debug!(
            width = self.settings.width,
            height = self.settings.height,
            format = %self.settings.format,
            fps = %self.settings.frame_rate,
            "Opened test pattern"
        );
        Ok(CaptureInfo {
            width: self.settings.width,
            height: self.settings.height,
            format: self.settings.format,
            time_base: self.time_base,
            frame_rate: self.settings.frame_rate,
        })
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if !self.opened {
            return Err(PipelineError::InvalidState("test pattern is not open".into()));
        }
        let index = self.next_frame;
        if self.settings.frame_limit.is_some_and(|limit| index >= limit) {
            return Ok(None);
        }
        if self.settings.paced {
            self.pace(index);
        }

        let (width, height, format) = (self.settings.width, self.settings.height, self.settings.format);
        let planes = HostPlanes::from_packed(format, width, height, Bytes::from(self.render(index)))?;
        let timing = FrameTiming {
            pts: Some(index as i64),
            dts: Some(index as i64),
            duration: 1,
            pos: None,
        };
        self.next_frame += 1;
        Ok(Some(
            VideoFrame::from_host(format, width, height, planes, timing)?.with_frame_number(index),
        ))
    }

    fn close(&mut self) {
        self.opened = false;
    }
}
