// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Lifecycle shared by threaded pipeline stages.
//!
//! `Uninitialized -> Opened -> Running <-> Paused -> Stopped -> Closed`.
//! A stage's worker runs on its own thread; stopping is cooperative and
//! joins the thread before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::bus::{ControlBus, ControlMessage, MessageKind};
use crate::core::run_gate::RunGate;
use crate::core::sink::SinkTable;
use crate::core::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Uninitialized,
    Opened,
    Running,
    Paused,
    Stopped,
    Closed,
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Opened => "opened",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The source ran dry and everything buffered was delivered.
    EndOfStream,
    /// `stop()` was called.
    Stopped,
    /// A fatal stream error; `code` follows [`PipelineError::status_code`].
    Failed { code: i32, reason: String },
}

impl Termination {
    pub fn failed(err: &PipelineError) -> Self {
        Termination::Failed {
            code: err.status_code(),
            reason: err.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Termination::EndOfStream => "end_of_stream",
            Termination::Stopped => "stopped",
            Termination::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed { .. })
    }
}

/// State plus, once the worker has ended, the reason it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub state: StageState,
    pub termination: Option<Termination>,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self {
            state: StageState::Uninitialized,
            termination: None,
        }
    }
}

/// Run the sink hook matching `message.kind` on every sink, then publish
/// `message` on `bus`. Returns how many sinks failed the hook.
pub(crate) fn propagate_lifecycle(
    stage: &str,
    sinks: &SinkTable,
    bus: Option<&ControlBus>,
    message: ControlMessage,
) -> usize {
    let failures = match message.kind {
        MessageKind::Init => sinks.for_each_lifecycle("init", |s| s.init()),
        MessageKind::Cleanup => sinks.for_each_lifecycle("deinit", |s| s.deinit()),
        MessageKind::Start => sinks.for_each_lifecycle("start", |s| s.start()),
        MessageKind::Stop => sinks.for_each_lifecycle("stop", |s| s.stop()),
        MessageKind::Pause => {
            let paused = message
                .get("paused")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            sinks.for_each_lifecycle("pause", |s| s.pause(paused))
        }
        MessageKind::Data | MessageKind::None => 0,
    };
    if let Some(bus) = bus {
        bus.publish(message.with("stage", stage));
    }
    failures
}

/// State machine plus worker thread of one stage.
pub(crate) struct StageControl<R> {
    name: &'static str,
    status: Arc<Mutex<StageStatus>>,
    gate: Arc<RunGate>,
    alive: Arc<AtomicBool>,
    worker: Option<JoinHandle<R>>,
}

impl<R: Send + 'static> StageControl<R> {
    pub(crate) fn new(name: &'static str, poll: Duration) -> Self {
        Self {
            name,
            status: Arc::new(Mutex::new(StageStatus::default())),
            gate: Arc::new(RunGate::new(poll)),
            alive: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub(crate) fn status(&self) -> StageStatus {
        self.status.lock().clone()
    }

    pub(crate) fn state(&self) -> StageState {
        self.status.lock().state
    }

    pub(crate) fn set_state(&self, state: StageState) {
        let mut status = self.status.lock();
        tracing::debug!(stage = self.name, from = %status.state, to = %state, "Stage transition");
        status.state = state;
    }

    /// Fail with `InvalidState` unless the stage is in one of `allowed`.
    pub(crate) fn require(&self, op: &str, allowed: &[StageState]) -> Result<StageState> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(PipelineError::InvalidState(format!(
                "{} cannot {} while {}",
                self.name, op, state
            )))
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Start `work` on a fresh thread and mark the stage running.
    ///
    /// The worker's termination is recorded when it returns. A worker that
    /// ends on its own moves the stage to `Stopped`.
    pub(crate) fn spawn<F>(&mut self, work: F) -> Result<()>
    where
        F: FnOnce(Arc<RunGate>) -> (R, Termination) + Send + 'static,
    {
        self.gate.reset();
        {
            let mut status = self.status.lock();
            status.termination = None;
            status.state = StageState::Running;
        }
        self.alive.store(true, Ordering::Release);

        let gate = Arc::clone(&self.gate);
        let status = Arc::clone(&self.status);
        let alive = Arc::clone(&self.alive);
        let name = self.name;
        let spawned = std::thread::Builder::new()
            .name(format!("framepipe-{}", name))
            .spawn(move || {
                let (result, termination) = work(gate);
                {
                    let mut status = status.lock();
                    match &termination {
                        Termination::Failed { code, reason } => {
                            tracing::error!(stage = name, code, "Stage failed: {}", reason);
                        }
                        other => tracing::info!(stage = name, termination = ?other, "Stage loop ended"),
                    }
                    if matches!(status.state, StageState::Running | StageState::Paused) {
                        status.state = StageState::Stopped;
                    }
                    status.termination = Some(termination);
                }
                alive.store(false, Ordering::Release);
                result
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.alive.store(false, Ordering::Release);
                self.status.lock().state = StageState::Opened;
                Err(PipelineError::Io(e))
            }
        }
    }

    pub(crate) fn pause(&self, paused: bool) -> Result<()> {
        // Checked and changed under one lock so a worker ending concurrently
        // cannot be overwritten back to Running.
        let mut status = self.status.lock();
        if !matches!(status.state, StageState::Running | StageState::Paused) {
            return Err(PipelineError::InvalidState(format!(
                "{} cannot pause while {}",
                self.name, status.state
            )));
        }
        self.gate.set_paused(paused);
        status.state = if paused {
            StageState::Paused
        } else {
            StageState::Running
        };
        Ok(())
    }

    /// Join the worker, asking it to stop first when `request_stop`.
    ///
    /// Returns the worker's result, or `None` if there was no worker.
    pub(crate) fn join(&mut self, request_stop: bool) -> Result<Option<R>> {
        if request_stop {
            self.gate.request_stop();
        }
        let Some(handle) = self.worker.take() else {
            return Ok(None);
        };
        let joined = handle.join();
        self.alive.store(false, Ordering::Release);

        let mut status = self.status.lock();
        status.state = StageState::Stopped;
        match joined {
            Ok(result) => {
                if status.termination.is_none() {
                    status.termination = Some(Termination::Stopped);
                }
                Ok(Some(result))
            }
            Err(_) => {
                let err = PipelineError::InvalidState(format!("{} worker panicked", self.name));
                status.termination = Some(Termination::failed(&err));
                Err(err)
            }
        }
    }
}

impl<R> Drop for StageControl<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.gate.request_stop();
            let _ = handle.join();
        }
    }
}
