// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The decoder's worker: read, send, drain, dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::codec::{CodecBackend, CodecResult};
use crate::core::dispatch::{DispatchOutcome, FrameDispatcher};
use crate::core::frames::Rational;
use crate::core::packet::Packet;
use crate::core::run_gate::RunGate;
use crate::core::source::PacketSource;
use crate::core::stage::Termination;
use crate::core::{CodecError, PipelineError, Result};

/// Codec slot shared between the stage and its worker. Locked only for a
/// single send or receive call.
pub(crate) type SharedCodec = Arc<Mutex<Option<Box<dyn CodecBackend>>>>;

#[derive(Debug, Default)]
pub(crate) struct LoopCounters {
    pub(crate) packets_read: AtomicU64,
    pub(crate) packets_dropped: AtomicU64,
    pub(crate) frames_decoded: AtomicU64,
    pub(crate) send_retries: AtomicU64,
}

/// Where a send or drain left the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The codec reported end of stream.
    Drained,
    /// Stop was requested mid-delivery.
    Interrupted,
}

pub(crate) struct DecodeLoop {
    pub(crate) source: Box<dyn PacketSource>,
    pub(crate) dispatcher: FrameDispatcher,
    pub(crate) codec: SharedCodec,
    pub(crate) stream_index: usize,
    pub(crate) time_base: Rational,
    pub(crate) frame_rate: Rational,
    pub(crate) max_send_retries: u32,
    pub(crate) counters: Arc<LoopCounters>,
}

impl DecodeLoop {
    pub(crate) fn run(&mut self, gate: &RunGate) -> Termination {
        tracing::debug!(stream_index = self.stream_index, "Decode loop started");
        loop {
            if !gate.wait_ready() {
                return Termination::Stopped;
            }

            let packet = match self.source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return self.finish(gate),
                Err(e) => return Termination::failed(&e),
            };
            self.counters.packets_read.fetch_add(1, Ordering::Relaxed);

            if packet.stream_index != self.stream_index {
                tracing::debug!(
                    stream_index = packet.stream_index,
                    selected = self.stream_index,
                    "Dropping packet from unselected stream"
                );
                self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let flow = self
                .send(Some(&packet), gate)
                .and_then(|flow| match flow {
                    Flow::Continue => self.drain(gate),
                    other => Ok(other),
                });
            match flow {
                Ok(Flow::Interrupted) => return Termination::Stopped,
                Ok(_) => {}
                Err(e) => return Termination::failed(&e),
            }
        }
    }

    /// Flush the codec and deliver everything it still holds.
    fn finish(&mut self, gate: &RunGate) -> Termination {
        tracing::debug!("Source exhausted, flushing codec");
        let flow = self.send(None, gate).and_then(|flow| match flow {
            Flow::Interrupted => Ok(flow),
            _ => self.drain(gate),
        });
        match flow {
            Ok(Flow::Interrupted) => Termination::Stopped,
            Ok(_) => Termination::EndOfStream,
            Err(e) => Termination::failed(&e),
        }
    }

    fn codec_call<T>(
        &self,
        call: impl FnOnce(&mut dyn CodecBackend) -> CodecResult<T>,
    ) -> Result<CodecResult<T>> {
        let mut slot = self.codec.lock();
        let codec = slot
            .as_mut()
            .ok_or_else(|| PipelineError::InvalidState("codec was closed under the decode loop".into()))?;
        Ok(call(&mut **codec))
    }

    /// Send `packet`, draining and retrying while the codec is congested.
    ///
    /// Congestion is fatal only after `max_send_retries` drains in a row
    /// that produced nothing.
    fn send(&mut self, packet: Option<&Packet>, gate: &RunGate) -> Result<Flow> {
        let mut retries = 0;
        loop {
            match self.codec_call(|codec| codec.send_packet(packet))? {
                Ok(()) => return Ok(Flow::Continue),
                Err(CodecError::Again) => {
                    if retries >= self.max_send_retries {
                        return Err(PipelineError::Codec {
                            code: CodecError::AGAIN_CODE,
                            message: format!(
                                "codec still refuses input after {} drain attempts",
                                retries
                            ),
                        });
                    }
                    self.counters.send_retries.fetch_add(1, Ordering::Relaxed);
                    let before = self.counters.frames_decoded.load(Ordering::Relaxed);
                    match self.drain(gate)? {
                        Flow::Interrupted => return Ok(Flow::Interrupted),
                        _ if self.counters.frames_decoded.load(Ordering::Relaxed) > before => retries = 0,
                        _ => retries += 1,
                    }
                    tracing::trace!(retries, "Codec congested, retrying send after drain");
                }
                // A repeated flush.
                Err(CodecError::Eof) if packet.is_none() => return Ok(Flow::Drained),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive and dispatch frames until the codec wants input or is done.
    fn drain(&mut self, gate: &RunGate) -> Result<Flow> {
        loop {
            let frame = match self.codec_call(|codec| codec.receive_frame())? {
                Ok(frame) => frame,
                Err(CodecError::Again) => return Ok(Flow::Continue),
                Err(CodecError::Eof) => return Ok(Flow::Drained),
                Err(e) => return Err(e.into()),
            };
            let number = self.counters.frames_decoded.fetch_add(1, Ordering::Relaxed);
            let frame = frame.with_frame_number(number);
            if self
                .dispatcher
                .dispatch(frame, self.time_base, self.frame_rate, gate)?
                == DispatchOutcome::Interrupted
            {
                return Ok(Flow::Interrupted);
            }
        }
    }
}
