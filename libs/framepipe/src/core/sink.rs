// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame consumers and the ordered table stages deliver through.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::frames::{ImageFrame, Rational, VideoFrame};
use crate::core::Result;

bitflags::bitflags! {
    /// Delivery channels a sink wants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SinkInterest: u8 {
        /// Display-ready private copies ([`FrameSink::on_image`]).
        const IMAGE = 1 << 0;
        /// Shared frame references ([`FrameSink::on_frame`]).
        const RAW_FRAME = 1 << 1;
    }
}

/// A consumer of frames: renderer, saver, encoder.
///
/// Lifecycle hooks mirror the owning stage's transitions. Delivery is
/// synchronous on the stage thread: a slow callback slows the stage, and a
/// sink never sees two deliveries overlap. Every delivery carries the
/// stream's time base and frame rate.
pub trait FrameSink: Send + Sync {
    fn name(&self) -> &str {
        "sink"
    }

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        Ok(())
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn pause(&self, _paused: bool) -> Result<()> {
        Ok(())
    }

    /// A private display-layout copy. The sink owns it.
    fn on_image(&self, _image: ImageFrame, _time_base: Rational, _frame_rate: Rational) -> Result<()> {
        Ok(())
    }

    /// A shallow reference to the decoded frame, released when this returns
    /// unless the sink keeps it.
    fn on_frame(&self, _frame: VideoFrame, _time_base: Rational, _frame_rate: Rational) -> Result<()> {
        Ok(())
    }
}

/// Position of a sink within one interest category at registration time.
///
/// Only meaningful within its category; unrelated registrations may shift it.
pub type SinkIndex = usize;

/// Indices assigned by [`SinkTable::register`], one per requested category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkRegistration {
    pub image: Option<SinkIndex>,
    pub raw: Option<SinkIndex>,
}

struct SinkEntry {
    sink: Arc<dyn FrameSink>,
    category: SinkInterest,
}

fn same_sink<S: ?Sized>(entry: &Arc<dyn FrameSink>, sink: &Arc<S>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(entry), Arc::as_ptr(sink))
}

/// Insertion-ordered registrations.
///
/// A sink appears at most once per category. The table has its own lock,
/// independent of any codec lock; deliveries work on snapshots so the lock
/// is never held across a callback.
#[derive(Default)]
pub struct SinkTable {
    entries: Mutex<Vec<SinkEntry>>,
}

impl SinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for every category in `interest`.
    ///
    /// Registering again for a category it already has returns the existing
    /// index.
    pub fn register(&self, sink: Arc<dyn FrameSink>, interest: SinkInterest) -> SinkRegistration {
        let mut entries = self.entries.lock();
        let mut registration = SinkRegistration::default();
        for category in [SinkInterest::IMAGE, SinkInterest::RAW_FRAME] {
            if !interest.contains(category) {
                continue;
            }
            let mut index = 0;
            let mut existing = None;
            for entry in entries.iter().filter(|e| e.category == category) {
                if same_sink(&entry.sink, &sink) {
                    existing = Some(index);
                    break;
                }
                index += 1;
            }
            if existing.is_none() {
                entries.push(SinkEntry {
                    sink: Arc::clone(&sink),
                    category,
                });
            }
            let slot = existing.unwrap_or(index);
            if category == SinkInterest::IMAGE {
                registration.image = Some(slot);
            } else {
                registration.raw = Some(slot);
            }
        }
        tracing::debug!(sink = sink.name(), ?interest, ?registration, "Registered sink");
        registration
    }

    /// Remove every registration of `sink`; returns how many were removed.
    pub fn unregister<S: FrameSink + ?Sized>(&self, sink: &Arc<S>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| !same_sink(&entry.sink, sink));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(sink = sink.name(), removed, "Unregistered sink");
        }
        removed
    }

    /// Sinks of one category, in registration order.
    pub fn snapshot(&self, category: SinkInterest) -> Vec<Arc<dyn FrameSink>> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.category == category)
            .map(|e| Arc::clone(&e.sink))
            .collect()
    }

    pub fn has(&self, category: SinkInterest) -> bool {
        self.entries.lock().iter().any(|e| e.category == category)
    }

    /// Every registered sink once, in first-registration order.
    pub fn unique_sinks(&self) -> Vec<Arc<dyn FrameSink>> {
        let entries = self.entries.lock();
        let mut unique: Vec<Arc<dyn FrameSink>> = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            if !unique.iter().any(|s| same_sink(s, &entry.sink)) {
                unique.push(Arc::clone(&entry.sink));
            }
        }
        unique
    }

    /// Registrations across all categories.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run a lifecycle hook on every sink. Failures are logged and counted,
    /// never propagated.
    pub fn for_each_lifecycle(
        &self,
        hook: &str,
        mut call: impl FnMut(&dyn FrameSink) -> Result<()>,
    ) -> usize {
        let mut failures = 0;
        for sink in self.unique_sinks() {
            if let Err(e) = call(sink.as_ref()) {
                failures += 1;
                tracing::warn!(sink = sink.name(), hook, "Sink lifecycle hook failed: {}", e);
            }
        }
        failures
    }
}

impl std::fmt::Debug for SinkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_list()
            .entries(entries.iter().map(|e| (e.sink.name().to_string(), e.category)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl FrameSink for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_indices_are_per_category() {
        let table = SinkTable::new();
        let a: Arc<dyn FrameSink> = Arc::new(Named("a"));
        let b: Arc<dyn FrameSink> = Arc::new(Named("b"));

        let ra = table.register(Arc::clone(&a), SinkInterest::IMAGE);
        let rb = table.register(Arc::clone(&b), SinkInterest::IMAGE | SinkInterest::RAW_FRAME);
        assert_eq!(ra.image, Some(0));
        assert_eq!(ra.raw, None);
        assert_eq!(rb.image, Some(1));
        assert_eq!(rb.raw, Some(0));
    }

    #[test]
    fn test_duplicate_registration_returns_existing_index() {
        let table = SinkTable::new();
        let a: Arc<dyn FrameSink> = Arc::new(Named("a"));
        table.register(Arc::clone(&a), SinkInterest::RAW_FRAME);
        let again = table.register(Arc::clone(&a), SinkInterest::RAW_FRAME);
        assert_eq!(again.raw, Some(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let table = SinkTable::new();
        for name in ["first", "second", "third"] {
            table.register(Arc::new(Named(name)), SinkInterest::RAW_FRAME);
        }
        let names: Vec<_> = table
            .snapshot(SinkInterest::RAW_FRAME)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert!(table.snapshot(SinkInterest::IMAGE).is_empty());
    }

    #[test]
    fn test_unregister_counts_removals() {
        let table = SinkTable::new();
        let a = Arc::new(Named("a"));
        let stranger = Arc::new(Named("stranger"));
        table.register(a.clone(), SinkInterest::IMAGE | SinkInterest::RAW_FRAME);
        assert_eq!(table.unregister(&stranger), 0);
        assert_eq!(table.unregister(&a), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_unique_sinks_deduplicates() {
        let table = SinkTable::new();
        let a = Arc::new(Named("a"));
        table.register(a.clone(), SinkInterest::all());
        table.register(Arc::new(Named("b")), SinkInterest::IMAGE);
        assert_eq!(table.unique_sinks().len(), 2);
    }
}
