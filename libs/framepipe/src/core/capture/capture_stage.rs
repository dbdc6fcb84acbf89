// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CaptureBackend, CaptureInfo, CaptureSettings};
use crate::core::bus::{ControlBus, ControlMessage, MessageKind};
use crate::core::dispatch::{DispatchCounters, DispatchOutcome, DispatchStats, FrameDispatcher};
use crate::core::frames::PixelFormat;
use crate::core::registry::Registry;
use crate::core::sink::{FrameSink, SinkInterest, SinkRegistration, SinkTable};
use crate::core::stage::{propagate_lifecycle, StageControl, StageState, StageStatus, Termination};
use crate::core::{PipelineError, Result};

const STAGE_NAME: &str = "capture";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub dispatch: DispatchStats,
}

type Worker = (Box<dyn CaptureBackend>, FrameDispatcher);

/// Runs a [`CaptureBackend`] on its own thread and fans its frames out.
///
/// Same lifecycle as the decoder, without a codec in between.
pub struct CaptureStage {
    backend: Option<Box<dyn CaptureBackend>>,
    dispatcher: Option<FrameDispatcher>,
    info: Option<CaptureInfo>,
    sinks: Arc<SinkTable>,
    bus: Option<ControlBus>,
    counters: Arc<DispatchCounters>,
    frames_captured: Arc<AtomicU64>,
    control: StageControl<Worker>,
}

impl CaptureStage {
    pub fn new(backend: Box<dyn CaptureBackend>, display_format: PixelFormat) -> Self {
        let sinks = Arc::new(SinkTable::new());
        let dispatcher = FrameDispatcher::new(Arc::clone(&sinks), display_format);
        Self {
            backend: Some(backend),
            counters: dispatcher.counters(),
            dispatcher: Some(dispatcher),
            info: None,
            sinks,
            bus: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
            control: StageControl::new(STAGE_NAME, Duration::from_millis(5)),
        }
    }

    /// Stage over the backend registered as `name`.
    pub fn from_registry(
        registry: &Registry,
        name: &str,
        settings: &CaptureSettings,
        display_format: PixelFormat,
    ) -> Result<Self> {
        Ok(Self::new(registry.create_capture(name, settings)?, display_format))
    }

    pub fn with_bus(mut self, bus: ControlBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn sinks(&self) -> &Arc<SinkTable> {
        &self.sinks
    }

    pub fn register_sink(&self, sink: Arc<dyn FrameSink>, interest: SinkInterest) -> SinkRegistration {
        self.sinks.register(sink, interest)
    }

    pub fn unregister_sink<S: FrameSink + ?Sized>(&self, sink: &Arc<S>) -> usize {
        self.sinks.unregister(sink)
    }

    /// Geometry of the opened backend.
    pub fn info(&self) -> Option<CaptureInfo> {
        self.info
    }

    pub fn status(&self) -> StageStatus {
        self.control.status()
    }

    pub fn state(&self) -> StageState {
        self.control.state()
    }

    pub fn is_thread_alive(&self) -> bool {
        self.control.is_alive()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            dispatch: self.counters.snapshot(),
        }
    }

    fn announce(&self, message: ControlMessage) {
        propagate_lifecycle(STAGE_NAME, &self.sinks, self.bus.as_ref(), message);
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn CaptureBackend>> {
        self.backend
            .as_mut()
            .ok_or_else(|| PipelineError::InvalidState("capture backend is owned by the worker".into()))
    }

    pub fn open(&mut self) -> Result<()> {
        self.control
            .require("open", &[StageState::Uninitialized, StageState::Closed])?;
        let info = self.backend_mut()?.open()?;
        tracing::info!(
            width = info.width,
            height = info.height,
            format = %info.format,
            fps = %info.frame_rate,
            "Capture opened"
        );
        self.info = Some(info);
        self.announce(ControlMessage::new(MessageKind::Init));
        self.control.set_state(StageState::Opened);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.control
            .require("start", &[StageState::Opened, StageState::Stopped])?;
        if self.control.has_worker() {
            self.reclaim(false)?;
        }
        let info = self
            .info
            .ok_or_else(|| PipelineError::InvalidState("capture was never opened".into()))?;
        let (Some(mut backend), Some(mut dispatcher)) = (self.backend.take(), self.dispatcher.take()) else {
            return Err(PipelineError::InvalidState("capture worker did not hand back its state".into()));
        };
        if self.control.state() == StageState::Stopped {
            backend.close();
            if let Err(e) = backend.open() {
                self.backend = Some(backend);
                self.dispatcher = Some(dispatcher);
                return Err(e);
            }
        }

        let captured = Arc::clone(&self.frames_captured);
        self.control.spawn(move |gate| {
            let termination = loop {
                if !gate.wait_ready() {
                    break Termination::Stopped;
                }
                let frame = match backend.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break Termination::EndOfStream,
                    Err(e) => break Termination::failed(&e),
                };
                captured.fetch_add(1, Ordering::Relaxed);
                match dispatcher.dispatch(frame, info.time_base, info.frame_rate, &gate) {
                    Ok(DispatchOutcome::Delivered) => {}
                    Ok(DispatchOutcome::Interrupted) => break Termination::Stopped,
                    Err(e) => break Termination::failed(&e),
                }
            };
            ((backend, dispatcher), termination)
        })?;
        self.announce(ControlMessage::new(MessageKind::Start));
        Ok(())
    }

    pub fn pause(&self, paused: bool) -> Result<()> {
        self.control.pause(paused)?;
        self.announce(ControlMessage::new(MessageKind::Pause).with("paused", paused));
        Ok(())
    }

    /// Stop the worker and wait for it. A no-op once stopped.
    pub fn stop(&mut self) -> Result<()> {
        match self.control.state() {
            StageState::Stopped if !self.control.has_worker() => return Ok(()),
            StageState::Running | StageState::Paused | StageState::Stopped => {}
            state => {
                return Err(PipelineError::InvalidState(format!(
                    "capture cannot stop while {}",
                    state
                )))
            }
        }
        self.reclaim(true)
    }

    /// Wait for the worker to end on its own.
    pub fn wait(&mut self) -> Result<StageStatus> {
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
        if let Some((backend, dispatcher)) = joined? {
            self.backend = Some(backend);
            self.dispatcher = Some(dispatcher);
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        match self.control.state() {
            StageState::Closed | StageState::Uninitialized => return Ok(()),
            StageState::Running | StageState::Paused => self.stop()?,
            StageState::Stopped if self.control.has_worker() => self.stop()?,
            _ => {}
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.close();
        }
        self.info = None;
        self.announce(ControlMessage::new(MessageKind::Cleanup));
        self.control.set_state(StageState::Closed);
        Ok(())
    }
}

impl Drop for CaptureStage {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Capture close during drop failed: {}", e);
        }
    }
}

impl std::fmt::Debug for CaptureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStage")
            .field("status", &self.control.status())
            .field("info", &self.info)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
