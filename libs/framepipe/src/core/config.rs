// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline configuration via `framepipe.yaml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::capture::CaptureSettings;
use crate::core::decoder::DecoderConfig;
use crate::core::frames::{PixelFormat, Rational};
use crate::core::pool::PoolConfig;
use crate::core::source::RawVideoDescriptor;
use crate::core::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it.
    pub filter: String,
    /// Also write logs to a daily file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            log_dir: None,
        }
    }
}

/// Geometry of headerless raw video input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: Rational,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            format: PixelFormat::Nv12,
            frame_rate: Rational::new(30, 1),
        }
    }
}

impl SourceConfig {
    pub fn descriptor(&self) -> RawVideoDescriptor {
        RawVideoDescriptor {
            width: self.width,
            height: self.height,
            format: self.format,
            frame_rate: self.frame_rate,
        }
    }
}

/// Configuration from `framepipe.yaml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub decoder: DecoderConfig,
    /// Render targets of the renderer-side consumer.
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub capture: CaptureSettings,
}

impl PipelineConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "framepipe.yaml";

    /// Load from `dir`. Fails if the file is missing, unparseable or invalid.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(Self::FILE_NAME);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            PipelineError::Configuration(msg) => {
                PipelineError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        tracing::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Load from `dir`, using defaults if the file is missing or bad.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            tracing::debug!("No {} found in {}, using defaults", Self::FILE_NAME, dir.display());
            return Self::default();
        }
        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| PipelineError::Configuration(format!("Failed to parse: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.decoder.validate()?;
        self.pool.validate()?;
        self.capture.validate()?;
        if self.source.width == 0 || self.source.height == 0 {
            return Err(PipelineError::Configuration(format!(
                "source size {}x{} is empty",
                self.source.width, self.source.height
            )));
        }
        Ok(())
    }
}
