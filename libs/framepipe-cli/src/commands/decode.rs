// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use framepipe::gpu::{HostGpu, RenderSink};
use framepipe::{
    ControlBus, Decoder, IoByteSource, PipelineConfig, RawVideoSource, Registry, SinkInterest,
    Termination,
};

use super::sinks::{CountingSink, DumpSink};

/// Decode a raw video file and print a summary.
pub fn run(file: &Path, config: &PipelineConfig, dump_dir: Option<&Path>, render: bool) -> Result<()> {
    let bytes = IoByteSource::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let mut source = RawVideoSource::new(bytes, config.source.descriptor())?;
    let total = source.frame_count()?;

    let bus = ControlBus::new();
    let events = bus.subscribe();
    let registry = Arc::new(Registry::with_builtins());
    let mut decoder = Decoder::new(Box::new(source), config.decoder.clone(), registry)?.with_bus(bus);

    let counter = Arc::new(CountingSink::default());
    decoder.register_sink(counter.clone(), SinkInterest::IMAGE);

    let dump = dump_dir.map(|dir| Arc::new(DumpSink::new(dir.to_path_buf())));
    if let Some(dump) = &dump {
        decoder.register_sink(dump.clone(), SinkInterest::IMAGE);
    }

    let renderer = if render {
        let sink = Arc::new(RenderSink::new(Arc::new(HostGpu::new()), config.pool.clone())?);
        decoder.register_sink(sink.clone(), SinkInterest::RAW_FRAME);
        Some(sink)
    } else {
        None
    };

    tracing::info!(
        file = %file.display(),
        width = config.source.width,
        height = config.source.height,
        format = %config.source.format,
        frames = ?total,
        "Decoding"
    );

    let started = Instant::now();
    decoder.open()?;
    decoder.start()?;
    let status = decoder.wait()?;
    let elapsed = started.elapsed();
    let stats = decoder.stats();
    decoder.close()?;

    for message in events.try_iter() {
        tracing::debug!(kind = ?message.kind, payload = ?message.payload, "Control message");
    }

    let fps = if elapsed.as_secs_f64() > 0.0 {
        stats.frames_decoded as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    println!("{}", file.display());
    println!("  packets read:     {}", stats.packets_read);
    println!("  frames decoded:   {}", stats.frames_decoded);
    println!("  images delivered: {}", counter.images());
    println!("  image bytes:      {}", counter.bytes());
    println!("  images skipped:   {}", stats.dispatch.images_skipped);
    if let Some((first, last)) = counter.pts_span() {
        println!("  pts span:         {}..={}", first, last);
    }
    println!("  sink failures:    {}", stats.dispatch.sink_failures);
    println!("  elapsed:          {:.3}s ({:.1} fps)", elapsed.as_secs_f64(), fps);
    if let Some(dump) = &dump {
        println!("  snapshots:        {}", dump.written());
    }
    if let Some(renderer) = &renderer {
        let render_stats = renderer.stats();
        let health = renderer.health();
        println!(
            "  rendered:         {} presented, {} dropped, {} failed{}",
            render_stats.frames_presented,
            render_stats.frames_dropped,
            render_stats.frames_failed,
            if health.degraded { " (degraded)" } else { "" }
        );
    }

    match status.termination {
        Some(Termination::Failed { code, reason }) => bail!("Decode failed ({}): {}", code, reason),
        termination => {
            println!("  ended:            {:?}", termination);
            Ok(())
        }
    }
}
