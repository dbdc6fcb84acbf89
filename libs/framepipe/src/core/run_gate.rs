// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default, Clone, Copy)]
struct GateFlags {
    paused: bool,
    stopping: bool,
}

/// Pause/stop signal shared between a stage and its worker thread.
///
/// Pause, resume and stop all change the flags under one mutex and notify
/// one condvar, so a stop issued while the worker is paused always wakes it.
#[derive(Debug)]
pub struct RunGate {
    flags: Mutex<GateFlags>,
    changed: Condvar,
    /// Upper bound on a single wait; the worker re-checks after it.
    poll: Duration,
}

impl RunGate {
    pub fn new(poll: Duration) -> Self {
        Self {
            flags: Mutex::new(GateFlags::default()),
            changed: Condvar::new(),
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    /// Clear pause and stop before a new run.
    pub fn reset(&self) {
        *self.flags.lock() = GateFlags::default();
        self.changed.notify_all();
    }

    pub fn set_paused(&self, paused: bool) {
        self.flags.lock().paused = paused;
        self.changed.notify_all();
    }

    pub fn request_stop(&self) {
        self.flags.lock().stopping = true;
        self.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.flags.lock().paused
    }

    pub fn is_stopping(&self) -> bool {
        self.flags.lock().stopping
    }

    /// Block while paused. Returns `false` once a stop was requested.
    pub fn wait_ready(&self) -> bool {
        let mut flags = self.flags.lock();
        while flags.paused && !flags.stopping {
            self.changed.wait_for(&mut flags, self.poll);
        }
        !flags.stopping
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}
