// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// Rational number used for stream time bases and frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// `0/1`, used when a stream does not advertise a value.
    pub const fn unknown() -> Self {
        Self { num: 0, den: 1 }
    }

    pub fn is_unknown(&self) -> bool {
        self.num == 0 || self.den == 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Convert `ticks` in this time base to nanoseconds.
    pub fn ticks_to_ns(&self, ticks: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        ((ticks as i128 * self.num as i128 * 1_000_000_000) / self.den as i128) as i64
    }

    /// Frame duration in ticks of `time_base`, treating `self` as a frame rate.
    pub fn frame_duration_in(&self, time_base: Rational) -> i64 {
        if self.is_unknown() || time_base.is_unknown() {
            return 0;
        }
        (self.den as i64 * time_base.den as i64) / (self.num as i64 * time_base.num as i64)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::unknown()
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Timing metadata a frame inherits from the packet it was decoded from.
///
/// Values are in ticks of the stream time base. Host copies of hardware
/// frames do not get this from the transfer; it is carried forward from the
/// decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTiming {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    /// Byte position of the source packet, when known.
    pub pos: Option<i64>,
}

impl FrameTiming {
    pub fn with_pts(pts: i64) -> Self {
        Self {
            pts: Some(pts),
            ..Default::default()
        }
    }
}
