// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control-plane messages between stages.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Init,
    Cleanup,
    Start,
    Stop,
    Pause,
    Data,
    None,
}

/// Tagged message with a string-keyed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

impl ControlMessage {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Queue depth of [`ControlBus::subscribe`].
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// In-process fan-out of control messages.
///
/// Each subscriber has its own bounded queue, so messages from one producer
/// arrive in publish order. A subscriber whose queue is full misses the
/// message; publishing never blocks a stage. Clones share subscribers.
#[derive(Clone, Default)]
pub struct ControlBus {
    subscribers: Arc<Mutex<Vec<Sender<ControlMessage>>>>,
    dropped: Arc<AtomicU64>,
}

impl ControlBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ControlMessage> {
        self.subscribe_with_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// Subscribe with a queue holding at most `depth` unread messages.
    pub fn subscribe_with_depth(&self, depth: usize) -> Receiver<ControlMessage> {
        let (tx, rx) = bounded(depth.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send to every live subscriber; returns how many received it.
    ///
    /// Subscribers whose receiver is gone are pruned.
    pub fn publish(&self, message: ControlMessage) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = ?message.kind, "Control subscriber queue full, message dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        tracing::trace!(kind = ?message.kind, delivered, "Published control message");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Messages lost to full subscriber queues.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ControlBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBus")
            .field("subscribers", &self.subscriber_count())
            .field("dropped", &self.dropped())
            .finish()
    }
}
