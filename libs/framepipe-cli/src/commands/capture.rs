// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use framepipe::capture::TEST_PATTERN_CAPTURE;
use framepipe::{CaptureSettings, CaptureStage, PipelineConfig, Registry, SinkInterest, Termination};

use super::sinks::CountingSink;

/// Run the test-pattern capture until `settings.frame_limit`.
pub fn run(settings: CaptureSettings, config: &PipelineConfig) -> Result<()> {
    let registry = Registry::with_builtins();
    let mut stage = CaptureStage::from_registry(
        &registry,
        TEST_PATTERN_CAPTURE,
        &settings,
        config.decoder.display_format,
    )?;
    let counter = Arc::new(CountingSink::default());
    stage.register_sink(counter.clone(), SinkInterest::IMAGE);

    let started = Instant::now();
    stage.open()?;
    stage.start()?;
    let status = stage.wait()?;
    let elapsed = started.elapsed();
    let stats = stage.stats();
    stage.close()?;

    println!(
        "{} {}x{} {} @ {}",
        TEST_PATTERN_CAPTURE, settings.width, settings.height, settings.format, settings.frame_rate
    );
    println!("  frames captured:  {}", stats.frames_captured);
    println!("  images delivered: {}", counter.images());
    println!("  converter builds: {}", stats.dispatch.converter_rebuilds);
    println!("  elapsed:          {:.3}s", elapsed.as_secs_f64());

    if let Some(Termination::Failed { code, reason }) = status.termination {
        bail!("Capture failed ({}): {}", code, reason);
    }
    Ok(())
}
