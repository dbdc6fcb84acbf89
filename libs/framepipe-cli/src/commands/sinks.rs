// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Sinks used by the CLI runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use framepipe::{FrameSink, ImageFrame, PixelFormat, Rational, Result};

/// Counts image snapshots and remembers the span of timestamps seen.
#[derive(Default)]
pub struct CountingSink {
    images: AtomicU64,
    bytes: AtomicU64,
    first_pts: AtomicU64,
    last_pts: AtomicU64,
}

impl CountingSink {
    pub fn images(&self) -> u64 {
        self.images.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// First and last pts, in stream ticks.
    pub fn pts_span(&self) -> Option<(u64, u64)> {
        (self.images() > 0).then(|| {
            (
                self.first_pts.load(Ordering::Relaxed),
                self.last_pts.load(Ordering::Relaxed),
            )
        })
    }
}

impl FrameSink for CountingSink {
    fn name(&self) -> &str {
        "counter"
    }

    fn on_image(&self, image: ImageFrame, _time_base: Rational, _frame_rate: Rational) -> Result<()> {
        let pts = image.timing.pts.unwrap_or_default().max(0) as u64;
        if self.images.fetch_add(1, Ordering::Relaxed) == 0 {
            self.first_pts.store(pts, Ordering::Relaxed);
        }
        self.last_pts.store(pts, Ordering::Relaxed);
        self.bytes.fetch_add(image.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Writes every image snapshot as headerless RGBA, one file per frame.
pub struct DumpSink {
    dir: PathBuf,
    written: AtomicU64,
}

impl DumpSink {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            written: AtomicU64::new(0),
        }
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl FrameSink for DumpSink {
    fn name(&self) -> &str {
        "dump"
    }

    fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn on_image(&self, mut image: ImageFrame, _time_base: Rational, _frame_rate: Rational) -> Result<()> {
        if image.format == PixelFormat::Bgra {
            for px in image.data_mut().chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        let path = self.dir.join(format!(
            "frame_{:06}_{}x{}.rgba",
            image.frame_number, image.width, image.height
        ));
        std::fs::write(&path, &*image.data())?;
        self.written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(path = %path.display(), "Wrote snapshot");
        Ok(())
    }
}
