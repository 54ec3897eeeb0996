//! Job definitions
//!
//! A job pairs a unit of [`Work`] with a [`Schedule`]. Work is either
//! blocking (runs on the worker pool) or cooperative (runs on the control
//! loop and must suspend rather than block while waiting).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// What a periodic job wants after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run again after the interval
    Repeat,
    /// Unregister the job; no further runs
    Finish,
}

/// Result returned by every job run
///
/// An error is logged and the job keeps its schedule.
pub type JobResult = anyhow::Result<Flow>;

// ─────────────────────────────────────────────────────────────────────────────
// Work
// ─────────────────────────────────────────────────────────────────────────────

/// Blocking work, run on the worker pool
pub type BlockingFn = Arc<dyn Fn() -> JobResult + Send + Sync>;

/// Cooperative work, polled on the control loop
pub type CooperativeFn = Arc<dyn Fn() -> BoxFuture<'static, JobResult> + Send + Sync>;

/// The body of a job, tagged by how it must be executed
#[derive(Clone)]
pub enum Work {
    /// Ordinary blocking code; dispatched to the worker pool
    Blocking(BlockingFn),
    /// Non-blocking code; runs directly on the control loop
    Cooperative(CooperativeFn),
}

impl Work {
    /// Wrap a blocking closure
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn() -> JobResult + Send + Sync + 'static,
    {
        Work::Blocking(Arc::new(f))
    }

    /// Wrap a closure producing a future
    pub fn cooperative<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Work::Cooperative(Arc::new(move || f().boxed()))
    }

    /// Check if this work must run on the worker pool
    pub fn is_blocking(&self) -> bool {
        matches!(self, Work::Blocking(_))
    }
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Work::Blocking(_) => f.write_str("Work::Blocking"),
            Work::Cooperative(_) => f.write_str("Work::Cooperative"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// When a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fire once as soon as the control loop picks it up
    Once,
    /// Run repeatedly, waiting the interval after each run completes
    Every(Duration),
}

/// A named unit of scheduled work
#[derive(Debug, Clone)]
pub struct Job {
    /// Name used in logs
    pub name: String,
    pub work: Work,
    pub schedule: Schedule,
}

impl Job {
    /// Create a fire-once job
    pub fn once(name: impl Into<String>, work: Work) -> Self {
        Self {
            name: name.into(),
            work,
            schedule: Schedule::Once,
        }
    }

    /// Create a periodic job
    pub fn every(name: impl Into<String>, interval: Duration, work: Work) -> Self {
        Self {
            name: name.into(),
            work,
            schedule: Schedule::Every(interval),
        }
    }
}
