// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bounded packet queue between a demuxing thread and a decoder.
//!
//! A full queue blocks the producer. When every [`PacketProducer`] is gone
//! and the queue is drained, the consumer sees end of stream.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::PacketSource;
use crate::core::packet::{Packet, StreamInfo};
use crate::core::{PipelineError, Result};

enum QueueItem {
    Packet(Packet),
    Error(String),
}

/// Sending half of a packet queue.
#[derive(Clone)]
pub struct PacketProducer {
    tx: Sender<QueueItem>,
}

impl PacketProducer {
    /// Queue a packet, blocking while the queue is full.
    pub fn push(&self, packet: Packet) -> Result<()> {
        self.tx
            .send(QueueItem::Packet(packet))
            .map_err(|_| PipelineError::InvalidState("packet consumer is gone".into()))
    }

    /// Queue a packet without blocking. Returns the packet back when full.
    pub fn try_push(&self, packet: Packet) -> std::result::Result<(), Packet> {
        let rejected = match self.tx.try_send(QueueItem::Packet(packet)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => item,
        };
        match rejected {
            QueueItem::Packet(p) => Err(p),
            QueueItem::Error(_) => Ok(()),
        }
    }

    /// Report a read failure; the consumer gets it after queued packets.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(QueueItem::Error(reason.into()));
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Receiving half of a packet queue, usable as a decoder's packet source.
pub struct QueuedPacketSource {
    rx: Receiver<QueueItem>,
    streams: Vec<StreamInfo>,
    poll: Option<Duration>,
}

impl QueuedPacketSource {
    /// Wait at most `poll` per read; a timeout returns an error instead of blocking forever.
    pub fn with_read_timeout(mut self, poll: Duration) -> Self {
        self.poll = Some(poll);
        self
    }
}

impl PacketSource for QueuedPacketSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let item = match self.poll {
            None => match self.rx.recv() {
                Ok(item) => item,
                Err(_) => return Ok(None),
            },
            Some(poll) => match self.rx.recv_timeout(poll) {
                Ok(item) => item,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(PipelineError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no packet within {:?}", poll),
                    )));
                }
            },
        };
        match item {
            QueueItem::Packet(packet) => Ok(Some(packet)),
            QueueItem::Error(reason) => Err(PipelineError::Io(std::io::Error::other(reason))),
        }
    }
}

/// Create a queue holding at most `capacity` packets.
pub fn packet_queue(
    streams: Vec<StreamInfo>,
    capacity: usize,
) -> (PacketProducer, QueuedPacketSource) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        PacketProducer { tx },
        QueuedPacketSource {
            rx,
            streams,
            poll: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streams() -> Vec<StreamInfo> {
        vec![StreamInfo::video(0, "rawvideo", 4, 4)]
    }

    #[test]
    fn test_packets_arrive_in_order_then_end_of_stream() {
        let (producer, mut source) = packet_queue(streams(), 4);
        for i in 0..3 {
            producer.push(Packet::new(0, vec![i as u8])).unwrap();
        }
        drop(producer);
        for i in 0..3 {
            let packet = source.read_packet().unwrap().unwrap();
            assert_eq!(packet.data[0], i as u8);
        }
        assert!(source.read_packet().unwrap().is_none());
    }

    #[test]
    fn test_full_queue_rejects_try_push() {
        let (producer, _source) = packet_queue(streams(), 1);
        producer.try_push(Packet::new(0, vec![1])).unwrap();
        let rejected = producer.try_push(Packet::new(0, vec![2])).unwrap_err();
        assert_eq!(rejected.data[0], 2);
        assert_eq!(producer.len(), 1);
    }

    #[test]
    fn test_producer_failure_reaches_consumer() {
        let (producer, mut source) = packet_queue(streams(), 2);
        producer.push(Packet::new(0, vec![1])).unwrap();
        producer.fail("disk went away");
        assert!(source.read_packet().unwrap().is_some());
        assert!(source.read_packet().is_err());
    }

    #[test]
    fn test_read_timeout() {
        let (_producer, source) = packet_queue(streams(), 2);
        let mut source = source.with_read_timeout(Duration::from_millis(5));
        assert!(source.read_packet().is_err());
    }

    #[test]
    fn test_push_after_consumer_dropped_fails() {
        let (producer, source) = packet_queue(streams(), 2);
        drop(source);
        assert!(producer.push(Packet::new(0, vec![1])).is_err());
    }
}
