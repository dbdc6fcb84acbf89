// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use super::decode_loop::{DecodeLoop, LoopCounters, SharedCodec};
use super::DecoderConfig;
use crate::core::bus::{ControlBus, ControlMessage, MessageKind};
use crate::core::codec::{CodecParameters, HwDeviceContext};
use crate::core::dispatch::{DispatchCounters, DispatchStats, FrameDispatcher};
use crate::core::packet::{MediaKind, StreamInfo};
use crate::core::registry::Registry;
use crate::core::sink::{FrameSink, SinkInterest, SinkRegistration, SinkTable};
use crate::core::source::PacketSource;
use crate::core::stage::{propagate_lifecycle, StageControl, StageState, StageStatus};
use crate::core::{PipelineError, Result};

const STAGE_NAME: &str = "decoder";

pub type DecoderState = StageState;
pub type DecoderStatus = StageStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub packets_read: u64,
    /// Packets of streams other than the selected one.
    pub packets_dropped: u64,
    pub frames_decoded: u64,
    pub send_retries: u64,
    pub dispatch: DispatchStats,
}

type Worker = (Box<dyn PacketSource>, FrameDispatcher);

/// Decodes one video stream of a [`PacketSource`] on a dedicated thread and
/// delivers every frame to the registered sinks.
///
/// `open` is all-or-nothing: on failure the codec and device are released
/// and the decoder is back in `Uninitialized`. A loop that ends on its own
/// leaves the decoder `Stopped` with the reason in [`Decoder::status`].
pub struct Decoder {
    config: DecoderConfig,
    registry: Arc<Registry>,
    source: Option<Box<dyn PacketSource>>,
    dispatcher: Option<FrameDispatcher>,
    sinks: Arc<SinkTable>,
    bus: Option<ControlBus>,
    codec: SharedCodec,
    device: Option<HwDeviceContext>,
    stream: Option<StreamInfo>,
    params: Option<CodecParameters>,
    counters: Arc<LoopCounters>,
    dispatch_counters: Arc<DispatchCounters>,
    control: StageControl<Worker>,
}

impl Decoder {
    pub fn new(source: Box<dyn PacketSource>, config: DecoderConfig, registry: Arc<Registry>) -> Result<Self> {
        config.validate()?;
        let sinks = Arc::new(SinkTable::new());
        let dispatcher = FrameDispatcher::new(Arc::clone(&sinks), config.display_format)
            .with_hw_frames(config.hw_frames)
            .with_buffer_pool(config.buffer_pool.clone());
        Ok(Self {
            control: StageControl::new(STAGE_NAME, config.pause_poll()),
            config,
            registry,
            source: Some(source),
            dispatch_counters: dispatcher.counters(),
            dispatcher: Some(dispatcher),
            sinks,
            bus: None,
            codec: Arc::new(Mutex::new(None)),
            device: None,
            stream: None,
            params: None,
            counters: Arc::new(LoopCounters::default()),
        })
    }

    pub fn with_bus(mut self, bus: ControlBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn sinks(&self) -> &Arc<SinkTable> {
        &self.sinks
    }

    pub fn register_sink(&self, sink: Arc<dyn FrameSink>, interest: SinkInterest) -> SinkRegistration {
        self.sinks.register(sink, interest)
    }

    /// Remove `sink` from every category; returns how many entries went.
    pub fn unregister_sink<S: FrameSink + ?Sized>(&self, sink: &Arc<S>) -> usize {
        self.sinks.unregister(sink)
    }

    /// The stream chosen at open.
    pub fn stream(&self) -> Option<&StreamInfo> {
        self.stream.as_ref()
    }

    /// Device shared with renderers that import this decoder's frames.
    pub fn device(&self) -> Option<&HwDeviceContext> {
        self.device.as_ref()
    }

    pub fn status(&self) -> DecoderStatus {
        self.control.status()
    }

    pub fn state(&self) -> DecoderState {
        self.control.state()
    }

    pub fn is_thread_alive(&self) -> bool {
        self.control.is_alive()
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            packets_read: self.counters.packets_read.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
            frames_decoded: self.counters.frames_decoded.load(Ordering::Relaxed),
            send_retries: self.counters.send_retries.load(Ordering::Relaxed),
            dispatch: self.dispatch_counters.snapshot(),
        }
    }

    fn announce(&self, message: ControlMessage) {
        propagate_lifecycle(STAGE_NAME, &self.sinks, self.bus.as_ref(), message);
    }

    pub fn open(&mut self) -> Result<()> {
        self.control
            .require("open", &[StageState::Uninitialized, StageState::Closed])?;
        if let Err(e) = self.acquire_codec() {
            self.release_codec();
            self.control.set_state(StageState::Uninitialized);
            tracing::error!(code = e.status_code(), "Decoder open failed: {}", e);
            return Err(e);
        }

        let mut opened = ControlMessage::new(MessageKind::Init);
        if let Some(stream) = &self.stream {
            tracing::info!(
                stream_index = stream.index,
                codec = %stream.codec_id,
                width = stream.width,
                height = stream.height,
                hw_device = ?self.device.as_ref().map(|d| d.device_type()),
                "Decoder opened"
            );
            opened = opened
                .with("stream_index", stream.index)
                .with("codec", stream.codec_id.clone())
                .with("width", stream.width)
                .with("height", stream.height);
        }
        self.announce(opened);
        self.control.set_state(StageState::Opened);
        Ok(())
    }

    fn select_stream(&self) -> Result<StreamInfo> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PipelineError::InvalidState("packet source is owned by the worker".into()))?;
        let stream = match self.config.stream_index {
            Some(index) => source.stream(index).ok_or_else(|| {
                PipelineError::Configuration(format!("source has no stream {}", index))
            })?,
            None => source
                .best_video_stream()
                .ok_or_else(|| PipelineError::Configuration("source has no video stream".into()))?,
        };
        if stream.kind != MediaKind::Video {
            return Err(PipelineError::Configuration(format!(
                "stream {} is {:?}, not video",
                stream.index, stream.kind
            )));
        }
        Ok(stream.clone())
    }

    fn acquire_codec(&mut self) -> Result<()> {
        let stream = self.select_stream()?;
        let mut params = CodecParameters::from_stream(&stream);
        if let Some(device_type) = self.config.hw_device {
            let device = self
                .registry
                .create_hw_device(device_type, self.config.hw_device_node.as_deref())?;
            self.device = Some(device);
            params = params.with_hw_device(device_type);
        }

        let mut codec = self.registry.create_codec(&stream.codec_id)?;
        if let Err(e) = codec.open(&params, self.device.as_ref()) {
            codec.close();
            return Err(e);
        }
        *self.codec.lock() = Some(codec);
        self.stream = Some(stream);
        self.params = Some(params);
        Ok(())
    }

    fn release_codec(&mut self) {
        if let Some(mut codec) = self.codec.lock().take() {
            codec.close();
        }
        self.device = None;
        self.stream = None;
        self.params = None;
    }

    /// Close and reopen the codec with the parameters from `open`.
    ///
    /// On failure the caller releases the codec and device, as a failed
    /// `open` does.
    fn reopen_codec(&self) -> Result<()> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| PipelineError::InvalidState("decoder was never opened".into()))?;
        let mut slot = self.codec.lock();
        let codec = slot
            .as_mut()
            .ok_or_else(|| PipelineError::InvalidState("codec is closed".into()))?;
        codec.close();
        codec.open(params, self.device.as_ref())
    }

    pub fn start(&mut self) -> Result<()> {
        let state = self
            .control
            .require("start", &[StageState::Opened, StageState::Stopped])?;
        if self.control.has_worker() {
            self.reclaim(false)?;
        }
        let stream = self
            .stream
            .clone()
            .ok_or_else(|| PipelineError::InvalidState("decoder was never opened".into()))?;
        if state == StageState::Stopped {
            if let Err(e) = self.reopen_codec() {
                self.release_codec();
                self.control.set_state(StageState::Uninitialized);
                tracing::error!(code = e.status_code(), "Decoder reopen failed: {}", e);
                return Err(e);
            }
        }
        let (Some(source), Some(dispatcher)) = (self.source.take(), self.dispatcher.take()) else {
            return Err(PipelineError::InvalidState(
                "decoder worker did not hand back its state".into(),
            ));
        };

        let mut decode = DecodeLoop {
            source,
            dispatcher,
            codec: Arc::clone(&self.codec),
            stream_index: stream.index,
            time_base: stream.time_base,
            frame_rate: stream.frame_rate,
            max_send_retries: self.config.max_send_retries,
            counters: Arc::clone(&self.counters),
        };
        self.control.spawn(move |gate| {
            let termination = decode.run(&gate);
            ((decode.source, decode.dispatcher), termination)
        })?;
        self.announce(ControlMessage::new(MessageKind::Start).with("stream_index", stream.index));
        Ok(())
    }

    /// Hold or release delivery. Valid while running or paused.
    pub fn pause(&self, paused: bool) -> Result<()> {
        self.control.pause(paused)?;
        self.announce(ControlMessage::new(MessageKind::Pause).with("paused", paused));
        Ok(())
    }

    /// Ask the loop to exit and block until its thread is gone.
    pub fn stop(&mut self) -> Result<()> {
        match self.control.state() {
            StageState::Stopped if !self.control.has_worker() => return Ok(()),
            StageState::Running | StageState::Paused | StageState::Stopped => {}
            state => {
                return Err(PipelineError::InvalidState(format!(
                    "decoder cannot stop while {}",
                    state
                )))
            }
        }
        self.reclaim(true)
    }

    /// Block until the loop ends on its own (end of stream or failure).
    pub fn wait(&mut self) -> Result<DecoderStatus> {
        self.reclaim(false)?;
        Ok(self.control.status())
    }

    /// Join the worker, if any, and hand its state back to the stage.
    ///
    /// Sinks get their `stop` hook here, once per run, whether the loop
    /// was stopped or ended on its own.
    fn reclaim(&mut self, request_stop: bool) -> Result<()> {
        if !self.control.has_worker() {
            return Ok(());
        }
        let joined = self.control.join(request_stop);
        let mut stopped = ControlMessage::new(MessageKind::Stop);
        if let Some(termination) = self.control.status().termination {
            stopped = stopped.with("termination", termination.name());
        }
        self.announce(stopped);
        if let Some((source, dispatcher)) = joined? {
            self.source = Some(source);
            self.dispatcher = Some(dispatcher);
        }
        Ok(())
    }

    /// Stop if needed, then free the codec and device.
    pub fn close(&mut self) -> Result<()> {
        match self.control.state() {
            StageState::Closed | StageState::Uninitialized => return Ok(()),
            StageState::Running | StageState::Paused => self.stop()?,
            StageState::Stopped if self.control.has_worker() => self.stop()?,
            _ => {}
        }
        self.release_codec();
        self.announce(ControlMessage::new(MessageKind::Cleanup));
        self.control.set_state(StageState::Closed);
        tracing::debug!("Decoder closed");
        Ok(())
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Decoder close during drop failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("status", &self.control.status())
            .field("stream", &self.stream.as_ref().map(|s| s.index))
            .field("device", &self.device)
            .field("sinks", &self.sinks.len())
            .field("stats", &self.stats())
            .finish()
    }
}
