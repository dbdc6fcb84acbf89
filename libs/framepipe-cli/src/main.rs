// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! framepipe CLI
//!
//! Runs decode and capture pipelines from the command line.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use framepipe::{LoggingConfig, PipelineConfig, PixelFormat};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;

mod commands;

#[derive(Parser)]
#[command(name = "framepipe")]
#[command(author, version, about = "Hardware-accelerated frame pipeline CLI", long_about = None)]
struct Cli {
    /// Directory holding framepipe.yaml (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a headerless raw video file through the full decoder
    Decode {
        /// Raw video file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Frame width (overrides source.width)
        #[arg(long)]
        width: Option<u32>,

        /// Frame height (overrides source.height)
        #[arg(long)]
        height: Option<u32>,

        /// Pixel format of the file (overrides source.format)
        #[arg(long)]
        format: Option<PixelFormat>,

        /// Write every image snapshot as raw RGBA into this directory
        #[arg(long, value_name = "DIR")]
        dump_dir: Option<PathBuf>,

        /// Also draw every frame with the headless renderer
        #[arg(long)]
        render: bool,

        /// Print the effective configuration and exit
        #[arg(long)]
        print_config: bool,
    },

    /// Run the test-pattern capture stage
    Capture {
        /// Number of frames to capture
        #[arg(long, default_value = "30")]
        frames: u64,

        /// Pixel format produced by the capture backend
        #[arg(long)]
        format: Option<PixelFormat>,

        /// Sleep between frames to hold the configured frame rate
        #[arg(long)]
        paced: bool,
    },

    /// List supported pixel formats and their plane layouts
    Formats,
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.filter))?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "framepipe.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Load the pipeline config under a temporary subscriber writing to
/// `writer`. The real subscriber depends on the config's logging section.
///
/// Strict loading fails on a missing or bad file; otherwise problems are
/// logged and defaults are used.
fn load_config<W>(dir: &Path, strict: bool, writer: W) -> Result<PipelineConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(bootstrap, || -> Result<PipelineConfig> {
        if strict {
            Ok(PipelineConfig::load(dir)?)
        } else {
            Ok(PipelineConfig::load_or_default(dir))
        }
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Strict when a directory was named explicitly.
    let config = match &cli.config {
        Some(dir) => load_config(dir, true, std::io::stderr)?,
        None => load_config(&std::env::current_dir()?, false, std::io::stderr)?,
    };
    let _guard = setup_logging(&config.logging)?;

    match cli.command {
        Commands::Decode {
            file,
            width,
            height,
            format,
            dump_dir,
            render,
            print_config,
        } => {
            let mut config = config;
            if let Some(width) = width {
                config.source.width = width;
            }
            if let Some(height) = height {
                config.source.height = height;
            }
            if let Some(format) = format {
                config.source.format = format;
            }
            config.validate()?;
            if print_config {
                println!("{}", serde_yaml::to_string(&config)?);
                return Ok(());
            }
            commands::decode::run(&file, &config, dump_dir.as_deref(), render)?;
        }
        Commands::Capture {
            frames,
            format,
            paced,
        } => {
            let mut settings = config.capture.clone();
            settings.frame_limit = Some(frames);
            settings.paced = paced;
            if let Some(format) = format {
                settings.format = format;
            }
            commands::capture::run(settings, &config)?;
        }
        Commands::Formats => commands::formats::list(),
    }

    Ok(())
}
