// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Live frame producers and the stage that runs them.

mod backend;
mod capture_stage;
mod test_pattern;

pub use backend::{CaptureBackend, CaptureInfo, CaptureSettings};
pub use capture_stage::{CaptureStage, CaptureStats};
pub use test_pattern::{TestPatternCapture, TEST_PATTERN_CAPTURE};
