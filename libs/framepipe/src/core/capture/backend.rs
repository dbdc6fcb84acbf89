// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::frames::{PixelFormat, Rational, VideoFrame};
use crate::core::{PipelineError, Result};

/// Requested capture geometry and rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: Rational,
    /// End the stream after this many frames.
    pub frame_limit: Option<u64>,
    /// Sleep so frames come out at `frame_rate` instead of as fast as possible.
    pub paced: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            format: PixelFormat::Bgra,
            frame_rate: Rational::new(30, 1),
            frame_limit: None,
            paced: false,
        }
    }
}

impl CaptureSettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::Configuration(format!(
                "capture size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.frame_rate.is_unknown() || self.frame_rate.num < 0 || self.frame_rate.den < 0 {
            return Err(PipelineError::Configuration(format!(
                "capture frame rate {} is not usable",
                self.frame_rate
            )));
        }
        Ok(())
    }
}

/// What an opened backend actually produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub time_base: Rational,
    pub frame_rate: Rational,
}

/// A device or generator that yields decoded frames directly.
pub trait CaptureBackend: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<CaptureInfo>;

    /// Next frame, `Ok(None)` once the backend has no more.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    fn close(&mut self) {}
}
