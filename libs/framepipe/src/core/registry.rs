// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::capture::{CaptureBackend, CaptureSettings, TestPatternCapture, TEST_PATTERN_CAPTURE};
use crate::core::codec::{
    CodecBackend, HwDeviceContext, HwDeviceProvider, HwDeviceType, RawVideoCodec,
    RAW_VIDEO_CODEC_ID,
};
use crate::core::{PipelineError, Result};

pub type CodecFactory = Arc<dyn Fn() -> Box<dyn CodecBackend> + Send + Sync>;
pub type CaptureFactory =
    Arc<dyn Fn(&CaptureSettings) -> Result<Box<dyn CaptureBackend>> + Send + Sync>;

/// Implementations available to pipeline stages.
///
/// Built once at startup and handed to stages; there is no process-wide
/// instance.
#[derive(Default)]
pub struct Registry {
    codecs: HashMap<String, CodecFactory>,
    captures: HashMap<String, CaptureFactory>,
    hw_devices: HashMap<HwDeviceType, Arc<dyn HwDeviceProvider>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `rawvideo` codec and `testpattern` capture.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.codecs.insert(
            RAW_VIDEO_CODEC_ID.to_string(),
            Arc::new(|| Box::new(RawVideoCodec::new()) as Box<dyn CodecBackend>),
        );
        registry.captures.insert(
            TEST_PATTERN_CAPTURE.to_string(),
            Arc::new(
                |settings: &CaptureSettings| -> Result<Box<dyn CaptureBackend>> {
                    Ok(Box::new(TestPatternCapture::new(settings.clone())?))
                },
            ),
        );
        registry
    }

    pub fn register_codec<F>(&mut self, codec_id: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn CodecBackend> + Send + Sync + 'static,
    {
        if self.codecs.contains_key(codec_id) {
            return Err(PipelineError::Configuration(format!(
                "Codec '{}' is already registered",
                codec_id
            )));
        }
        self.codecs.insert(codec_id.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn register_capture<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&CaptureSettings) -> Result<Box<dyn CaptureBackend>> + Send + Sync + 'static,
    {
        if self.captures.contains_key(name) {
            return Err(PipelineError::Configuration(format!(
                "Capture backend '{}' is already registered",
                name
            )));
        }
        self.captures.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn register_hw_device(&mut self, provider: Arc<dyn HwDeviceProvider>) -> Result<()> {
        let device_type = provider.device_type();
        if self.hw_devices.contains_key(&device_type) {
            return Err(PipelineError::Configuration(format!(
                "Hardware device provider for '{}' is already registered",
                device_type
            )));
        }
        self.hw_devices.insert(device_type, provider);
        Ok(())
    }

    pub fn create_codec(&self, codec_id: &str) -> Result<Box<dyn CodecBackend>> {
        let factory = self
            .codecs
            .get(codec_id)
            .ok_or_else(|| PipelineError::NotFound(format!("no codec registered for '{}'", codec_id)))?;
        Ok(factory())
    }

    pub fn create_capture(&self, name: &str, settings: &CaptureSettings) -> Result<Box<dyn CaptureBackend>> {
        let factory = self.captures.get(name).ok_or_else(|| {
            PipelineError::NotFound(format!("no capture backend registered as '{}'", name))
        })?;
        factory(settings)
    }

    /// Open a device of `device_type`; a missing provider is a device error.
    pub fn create_hw_device(
        &self,
        device_type: HwDeviceType,
        node: Option<&str>,
    ) -> Result<HwDeviceContext> {
        let provider = self.hw_devices.get(&device_type).ok_or_else(|| {
            PipelineError::HardwareDevice(format!("no provider for {} devices", device_type))
        })?;
        provider.create(node)
    }

    pub fn has_codec(&self, codec_id: &str) -> bool {
        self.codecs.contains_key(codec_id)
    }

    /// Registered codec ids, sorted.
    pub fn codec_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.codecs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn capture_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.captures.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn hw_device_types(&self) -> Vec<HwDeviceType> {
        let mut types: Vec<_> = self.hw_devices.keys().copied().collect();
        types.sort_by_key(|t| t.name());
        types
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("codecs", &self.codec_ids())
            .field("captures", &self.capture_names())
            .field("hw_devices", &self.hw_device_types())
            .finish()
    }
}
