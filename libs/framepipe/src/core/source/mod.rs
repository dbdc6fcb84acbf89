// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Where packets come from.

mod byte_source;
mod packet_queue;
mod raw_video;

pub use byte_source::{ByteSource, IoByteSource, Whence};
pub use packet_queue::{packet_queue, PacketProducer, QueuedPacketSource};
pub use raw_video::{RawVideoDescriptor, RawVideoSource};

use crate::core::packet::{MediaKind, Packet, StreamInfo};
use crate::core::Result;

/// Sequential packet supplier consumed by a decoder.
///
/// Packets are moved out to the caller. `Ok(None)` is end of stream; an
/// error is terminal and is not retried.
pub trait PacketSource: Send {
    fn streams(&self) -> &[StreamInfo];

    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// First video stream, the default selection.
    fn best_video_stream(&self) -> Option<&StreamInfo> {
        self.streams().iter().find(|s| s.kind == MediaKind::Video)
    }

    fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams().iter().find(|s| s.index == index)
    }
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn streams(&self) -> &[StreamInfo] {
        (**self).streams()
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        (**self).read_packet()
    }
}
