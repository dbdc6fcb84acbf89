// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// Library code reports through `tracing`; stdout belongs to the binary.

pub mod bus;
pub mod capture;
pub mod codec;
pub mod config;
pub mod convert;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod frames;
pub mod gpu;
pub mod packet;
pub mod pool;
pub mod registry;
pub mod run_gate;
pub mod sink;
pub mod source;
pub mod stage;

pub use bus::{ControlBus, ControlMessage, MessageKind};
pub use capture::{CaptureBackend, CaptureInfo, CaptureSettings, CaptureStage, CaptureStats, TestPatternCapture};
pub use codec::{CodecBackend, CodecParameters, HwDeviceContext, HwDeviceProvider, HwDeviceType, RawVideoCodec};
pub use config::{LoggingConfig, PipelineConfig, SourceConfig};
pub use convert::FormatConverter;
pub use decoder::{Decoder, DecoderConfig, DecoderState, DecoderStats, DecoderStatus};
pub use dispatch::{DispatchStats, FrameDispatcher, HwFrameMode};
pub use error::*;
pub use frames::*;
pub use packet::{MediaKind, Packet, StreamInfo};
pub use pool::{PoolConfig, PoolSlotId, PoolStats, PooledResource, ResourceAllocator, ResourcePool};
pub use registry::Registry;
pub use run_gate::RunGate;
pub use sink::{FrameSink, SinkIndex, SinkInterest, SinkRegistration, SinkTable};
pub use source::{ByteSource, IoByteSource, PacketSource, RawVideoDescriptor, RawVideoSource, Whence};
pub use stage::{StageState, StageStatus, Termination};
