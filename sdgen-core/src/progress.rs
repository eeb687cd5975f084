//! Per-step progress reporting.

use serde::Serialize;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Invoked once per completed sampling step with `(completed, total)`.
pub trait ProgressCallback {
    fn on_step(&mut self, step: usize, total: usize);
}

impl<F> ProgressCallback for F
where
    F: FnMut(usize, usize),
{
    fn on_step(&mut self, step: usize, total: usize) {
        self(step, total)
    }
}

pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step(&mut self, _step: usize, _total: usize) {}
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub step: usize,
    pub total: usize,
    pub fraction: f64,
}

/// Shared progress state that can be read from another thread while a
/// generation runs.
#[derive(Clone, Default, Debug)]
pub struct ProgressTracker {
    step: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self, total: usize) {
        self.step.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let step = self.step.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        let fraction = if total == 0 {
            0.0
        } else {
            step as f64 / total as f64
        };
        ProgressSnapshot {
            step,
            total,
            fraction,
        }
    }

    pub fn callback(&self) -> TrackerCallback {
        TrackerCallback(self.clone())
    }
}

pub struct TrackerCallback(ProgressTracker);

impl ProgressCallback for TrackerCallback {
    fn on_step(&mut self, step: usize, total: usize) {
        log::debug!("step {step}/{total}");
        self.0.total.store(total, Ordering::SeqCst);
        self.0.step.fetch_max(step, Ordering::SeqCst);
    }
}
