use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives coarse completion percentages in `[0, 100]`.
pub trait ProgressSink: Sync {
    fn report(&self, percent: f32);
}

impl<F> ProgressSink for F
where
    F: Fn(f32) + Sync,
{
    fn report(&self, percent: f32) {
        self(percent)
    }
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: f32) {}
}

/// Cooperative cancellation flag, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Forwards only increasing, clamped values to a sink.
pub(crate) struct Progress<'a> {
    sink: &'a dyn ProgressSink,
    last: f32,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, last: 0.0 }
    }

    pub(crate) fn set(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.last {
            self.last = percent;
            self.sink.report(percent);
        }
    }

    /// Report `done / total` of the span `[start, end]`.
    pub(crate) fn within(&mut self, start: f32, end: f32, done: usize, total: usize) {
        let frac = if total == 0 {
            1.0
        } else {
            done as f32 / total as f32
        };
        self.set(start + (end - start) * frac);
    }
}
