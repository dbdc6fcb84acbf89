// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::codec::HwDeviceType;
use crate::core::dispatch::HwFrameMode;
use crate::core::frames::PixelFormat;
use crate::core::pool::PoolConfig;
use crate::core::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Stream to decode; the first video stream when unset.
    pub stream_index: Option<usize>,
    /// Hardware acceleration to request at open.
    pub hw_device: Option<HwDeviceType>,
    /// Device node for `hw_device`, e.g. `/dev/dri/renderD128`.
    pub hw_device_node: Option<String>,
    pub hw_frames: HwFrameMode,
    /// Upper bound on one pause wait before the loop re-checks.
    pub pause_poll_ms: u64,
    /// Layout of the copies image sinks receive.
    pub display_format: PixelFormat,
    /// Drain-and-retry attempts when the codec refuses input.
    pub max_send_retries: u32,
    /// Conversion buffers for the image path.
    pub buffer_pool: PoolConfig,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            stream_index: None,
            hw_device: None,
            hw_device_node: None,
            hw_frames: HwFrameMode::default(),
            pause_poll_ms: 5,
            display_format: PixelFormat::Bgra,
            max_send_retries: 8,
            buffer_pool: PoolConfig {
                initial_size: 1,
                max_size: 2,
                dynamic: true,
                acquire_timeout_ms: 500,
            },
        }
    }
}

impl DecoderConfig {
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pause_poll_ms == 0 {
            return Err(PipelineError::Configuration(
                "decoder pause_poll_ms must be at least 1".into(),
            ));
        }
        if !self.display_format.is_display_layout() {
            return Err(PipelineError::Configuration(format!(
                "display_format must be bgra or rgba, got {}",
                self.display_format
            )));
        }
        if self.hw_device_node.is_some() && self.hw_device.is_none() {
            tracing::warn!("hw_device_node is set without hw_device; it will be ignored");
        }
        self.buffer_pool.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(DecoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_poll_rejected() {
        let config = DecoderConfig {
            pause_poll_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_yuv_display_format_rejected() {
        let config = DecoderConfig {
            display_format: PixelFormat::Nv12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml() {
        let config: DecoderConfig =
            serde_yaml::from_str("hw_device: vaapi\nhw_frames: passthrough\nmax_send_retries: 2\n").unwrap();
        assert_eq!(config.hw_device, Some(HwDeviceType::Vaapi));
        assert_eq!(config.hw_frames, HwFrameMode::Passthrough);
        assert_eq!(config.max_send_retries, 2);
        assert_eq!(config.pause_poll_ms, 5);
    }
}
