// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Packet-to-frame stage: one selected video stream, one codec, one thread.

mod config;
mod decode_loop;
mod video_decoder;

pub use config::DecoderConfig;
pub use video_decoder::{Decoder, DecoderState, DecoderStats, DecoderStatus};

pub use crate::core::stage::Termination;
