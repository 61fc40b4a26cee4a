use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Snapshot of one transfer's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Bytes moved so far in the current attempt.
    pub bytes_transferred: u64,
    /// Total bytes for the transfer.
    pub total_bytes: u64,
}

impl ProgressEvent {
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
        }
    }

    /// Completion as a percentage. The engine never emits events with a
    /// zero total.
    pub fn percentage(&self) -> f64 {
        self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0
    }

    /// Whether this event reports the last byte.
    pub fn is_final(&self) -> bool {
        self.bytes_transferred >= self.total_bytes
    }
}

/// Observer for transfer progress.
///
/// Purely observational; nothing in the engine's control flow depends on a
/// sink. A sink shared across concurrent transfers is invoked without any
/// external serialization, so implementations guard their own state.
pub trait ProgressSink: Send + Sync {
    /// Called with cumulative progress, zero or more times per attempt.
    /// Each retry attempt restarts from zero.
    fn on_progress(&self, event: ProgressEvent) {
        let _ = event;
    }

    /// Called once when a transfer ends successfully, with the final event.
    fn on_complete(&self, event: ProgressEvent) {
        let _ = event;
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
    fn on_progress(&self, event: ProgressEvent) {
        (**self).on_progress(event);
    }

    fn on_complete(&self, event: ProgressEvent) {
        (**self).on_complete(event);
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {}

/// Forwards at most one progress event per interval.
///
/// The terminal event (100%) always passes, so a fast transfer still
/// reports its completion exactly once. `on_complete` is forwarded
/// unconditionally.
pub struct ThrottledSink<S> {
    inner: S,
    interval: Duration,
    last_emit: Mutex<Instant>,
}

impl<S: ProgressSink> ThrottledSink<S> {
    pub fn new(inner: S, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_emit: Mutex::new(Instant::now()),
        }
    }
}

impl<S: ProgressSink> ProgressSink for ThrottledSink<S> {
    fn on_progress(&self, event: ProgressEvent) {
        if event.is_final() {
            self.inner.on_progress(event);
            return;
        }
        let mut last = self.last_emit.lock().unwrap();
        if last.elapsed() >= self.interval {
            *last = Instant::now();
            drop(last);
            self.inner.on_progress(event);
        }
    }

    fn on_complete(&self, event: ProgressEvent) {
        self.inner.on_complete(event);
    }
}

/// Records every event it sees; for tests.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
    completions: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<ProgressEvent> {
        self.completions.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectingSink {
    fn on_progress(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn on_complete(&self, event: ProgressEvent) {
        self.completions.lock().unwrap().push(event);
    }
}
