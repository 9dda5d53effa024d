use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

/// One progress event. `total == 0` means the size is unknown and only the
/// label is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub percent: f64,
    pub done: u64,
    pub total: u64,
    pub label: String,
}

impl Progress {
    pub fn new(done: u64, total: u64, label: impl Into<String>) -> Self {
        let percent = if total > 0 {
            (done as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            percent,
            done,
            total,
            label: label.into(),
        }
    }

    pub fn complete(done: u64, label: impl Into<String>) -> Self {
        Self {
            percent: 100.0,
            done,
            total: done,
            label: label.into(),
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.total == 0
    }
}

type Sink = Arc<dyn Fn(Progress) + Send + Sync>;

/// Where long-running operations send their progress.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Option<Sink>,
}

impl ProgressReporter {
    pub fn new(callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self {
            sink: Some(Arc::new(callback)),
        }
    }

    pub fn noop() -> Self {
        Self { sink: None }
    }

    /// Progress as a stream of events. Events are dropped while the receiver
    /// is `capacity` events behind.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Progress>) {
        let (tx, rx) = mpsc::channel(capacity);
        let reporter = Self::new(move |progress| {
            let _ = tx.try_send(progress);
        });
        (reporter, rx)
    }

    pub fn report(&self, progress: Progress) {
        if let Some(sink) = &self.sink {
            sink(progress);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("active", &self.sink.is_some())
            .finish()
    }
}
