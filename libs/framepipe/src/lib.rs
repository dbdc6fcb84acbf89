// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Threaded video pipeline stages.
//!
//! A [`Decoder`] pulls packets from a [`PacketSource`], drives a
//! [`CodecBackend`] and fans decoded frames out to [`FrameSink`]s, either as
//! private display-layout images or as shared frame references. Renderers
//! import those frames as textures through [`gpu::FrameTextureBinder`],
//! backed by a bounded [`ResourcePool`] of render targets.

#![allow(clippy::type_complexity)] // Factory and worker types are clear in context

pub mod core;

pub use crate::core::*;
