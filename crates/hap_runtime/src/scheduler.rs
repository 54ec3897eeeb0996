//! Control loop and job scheduler
//!
//! The [`Scheduler`] owns a single-threaded Tokio runtime (the control loop)
//! with a bounded blocking pool. [`Scheduler::run`] drives the loop on the
//! calling thread until the given lifecycle future completes; jobs and
//! internal tasks can be submitted from any thread before or during the run.
//!
//! # Lifecycle
//!
//! - `Idle`: built, nothing driving the loop yet
//! - `Running`: [`Scheduler::run`] is driving the loop
//! - `Stopping`: the lifecycle future finished, remaining work is cancelled
//! - `Halted`: the runtime has been shut down; no more work is accepted

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::job::{Flow, Job, Schedule, Work};

// ─────────────────────────────────────────────────────────────────────────────
// Errors / Config / State
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while managing the control loop
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to build control loop: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Control loop already running")]
    AlreadyRunning,

    #[error("Control loop halted")]
    Halted,
}

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on worker threads running blocking jobs
    pub worker_threads: usize,

    /// How long to wait for in-flight jobs when stopping
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 8,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Current state of the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Halted = 3,
}

impl SchedulerState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Halted,
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Stopping => write!(f, "stopping"),
            SchedulerState::Halted => write!(f, "halted"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stop Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle that requests the control loop to stop
///
/// Safe to use from jobs on the control loop, from worker threads and from
/// outside; requesting a stop never blocks.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Request a stop; idempotent
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Check if a stop was requested
    pub fn is_stopping(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until a stop is requested
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Single control loop plus bounded worker pool
pub struct Scheduler {
    /// Taken by `run`; `None` once running or halted
    runtime: Mutex<Option<Runtime>>,

    /// Spawns onto the control loop from any thread
    handle: Handle,

    /// Stop signal shared with every job loop
    shutdown_tx: Arc<watch::Sender<bool>>,

    /// In-flight jobs and internal tasks
    tasks: Mutex<JoinSet<()>>,

    state: AtomicU8,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Build a scheduler and its (not yet running) control loop
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name("hap-worker")
            .build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            shutdown_tx: Arc::new(shutdown_tx),
            tasks: Mutex::new(JoinSet::new()),
            state: AtomicU8::new(SchedulerState::Idle as u8),
            config,
        })
    }

    /// Get the current state
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check if the control loop has been shut down
    pub fn is_halted(&self) -> bool {
        self.state() == SchedulerState::Halted
    }

    /// Get a handle that requests a stop
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Request every job loop to end; idempotent and non-blocking
    pub fn request_stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Check if a stop was requested
    pub fn stop_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Wait until a stop is requested
    pub async fn stopped(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Submit a job from any thread
    ///
    /// Fire-once jobs run as soon as the control loop picks them up; periodic
    /// jobs run until they finish or a stop is requested.
    pub fn add_job(&self, job: Job) -> Result<(), SchedulerError> {
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.spawn(run_job(job, shutdown_rx))
    }

    /// Spawn an internal task onto the control loop
    ///
    /// The task is awaited by [`Scheduler::join`] like any job, so it must
    /// end once a stop is requested.
    pub fn spawn<F>(&self, task: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_halted() {
            return Err(SchedulerError::Halted);
        }

        let mut tasks = self.tasks.lock();
        // Reap finished tasks so fire-once jobs don't accumulate
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(task, &self.handle);
        Ok(())
    }

    /// Drive the control loop on the calling thread until `lifecycle` completes
    ///
    /// Must not be called from inside another Tokio runtime. Work still
    /// pending when `lifecycle` returns is cancelled and the runtime is shut
    /// down, leaving the scheduler halted.
    pub fn run<F: Future>(&self, lifecycle: F) -> Result<F::Output, SchedulerError> {
        let runtime = match self.runtime.lock().take() {
            Some(runtime) => runtime,
            None if self.is_halted() => return Err(SchedulerError::Halted),
            None => return Err(SchedulerError::AlreadyRunning),
        };

        self.set_state(SchedulerState::Running);
        tracing::info!(
            worker_threads = self.config.worker_threads,
            "Control loop started"
        );

        let output = runtime.block_on(lifecycle);

        self.set_state(SchedulerState::Stopping);
        self.request_stop();
        self.tasks.lock().abort_all();
        runtime.shutdown_timeout(self.config.shutdown_timeout);

        self.set_state(SchedulerState::Halted);
        tracing::info!("Control loop halted");

        Ok(output)
    }

    /// Wait for in-flight jobs to finish, up to the shutdown timeout
    ///
    /// Jobs still running after the timeout are aborted.
    pub async fn join(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }

        tracing::debug!(in_flight = tasks.len(), "Waiting for jobs to finish");

        let drained = tokio::time::timeout(self.config.shutdown_timeout, drain(&mut tasks)).await;
        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "Jobs did not finish within shutdown timeout, aborting"
            );
            tasks.abort_all();
        }
    }

    /// Shut down a loop that was never run
    pub fn halt(&self) {
        self.request_stop();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            self.set_state(SchedulerState::Halted);
            tracing::debug!("Control loop halted before start");
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!(error = %e, "Job task panicked");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job Loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_job(job: Job, mut shutdown_rx: watch::Receiver<bool>) {
    let interval = match job.schedule {
        Schedule::Once => {
            execute(&job).await;
            return;
        }
        Schedule::Every(interval) => interval,
    };

    tracing::debug!(job = %job.name, ?interval, "Periodic job registered");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if execute(&job).await == Some(Flow::Finish) {
            tracing::debug!(job = %job.name, "Periodic job finished");
            return;
        }

        // Interval is measured from completion, not wall-clock aligned
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.wait_for(|stop| *stop) => break,
        }
    }

    tracing::debug!(job = %job.name, "Periodic job stopped");
}

/// Run the job's work once; `None` if it failed
async fn execute(job: &Job) -> Option<Flow> {
    let result = match &job.work {
        Work::Blocking(f) => {
            let f = Arc::clone(f);
            match tokio::task::spawn_blocking(move || f()).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("blocking job panicked: {e}")),
            }
        }
        Work::Cooperative(f) => {
            let run = async { f().await };
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("cooperative job panicked")),
            }
        }
    };

    match result {
        Ok(flow) => Some(flow),
        Err(e) => {
            tracing::warn!(job = %job.name, error = %e, "Job failed");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> Arc<Scheduler> {
        Arc::new(
            Scheduler::new(SchedulerConfig {
                worker_threads: 2,
                shutdown_timeout: Duration::from_secs(2),
            })
            .unwrap(),
        )
    }

    /// Lifecycle that waits for a stop request, then joins all jobs
    async fn until_stopped(sched: Arc<Scheduler>) {
        sched.stopped().await;
        sched.join().await;
    }

    #[test]
    fn test_periodic_job_stops_from_within() {
        let sched = scheduler();
        let runs = Arc::new(AtomicUsize::new(0));

        let stop = sched.stop_handle();
        let counter = Arc::clone(&runs);
        sched
            .add_job(Job::every(
                "counter",
                Duration::from_millis(1),
                Work::cooperative(move || {
                    let counter = Arc::clone(&counter);
                    let stop = stop.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                            stop.stop();
                        }
                        Ok(Flow::Repeat)
                    }
                }),
            ))
            .unwrap();

        sched.run(until_stopped(Arc::clone(&sched))).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(sched.is_halted());
    }

    #[test]
    fn test_failing_blocking_job_keeps_schedule() {
        let sched = scheduler();
        let runs = Arc::new(AtomicUsize::new(0));

        let stop = sched.stop_handle();
        let counter = Arc::clone(&runs);
        sched
            .add_job(Job::every(
                "flaky",
                Duration::ZERO,
                Work::blocking(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        anyhow::bail!("sensor offline");
                    }
                    stop.stop();
                    Ok(Flow::Repeat)
                }),
            ))
            .unwrap();

        sched.run(until_stopped(Arc::clone(&sched))).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_job_keeps_schedule() {
        let sched = scheduler();
        let runs = Arc::new(AtomicUsize::new(0));

        let stop = sched.stop_handle();
        let counter = Arc::clone(&runs);
        sched
            .add_job(Job::every(
                "panicky",
                Duration::ZERO,
                Work::cooperative(move || {
                    let counter = Arc::clone(&counter);
                    let stop = stop.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            panic!("first run explodes");
                        }
                        stop.stop();
                        Ok(Flow::Repeat)
                    }
                }),
            ))
            .unwrap();

        sched.run(until_stopped(Arc::clone(&sched))).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finish_unregisters_job() {
        let sched = scheduler();
        let once_runs = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&once_runs);
        sched
            .add_job(Job::every(
                "self-removing",
                Duration::from_millis(1),
                Work::blocking(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Flow::Finish)
                }),
            ))
            .unwrap();

        let stop = sched.stop_handle();
        let counter = Arc::clone(&ticks);
        sched
            .add_job(Job::every(
                "ticker",
                Duration::from_millis(5),
                Work::cooperative(move || {
                    let counter = Arc::clone(&counter);
                    let stop = stop.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 5 {
                            stop.stop();
                        }
                        Ok(Flow::Repeat)
                    }
                }),
            ))
            .unwrap();

        sched.run(until_stopped(Arc::clone(&sched))).unwrap();

        assert_eq!(once_runs.load(Ordering::SeqCst), 1);
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_add_job_from_another_thread() {
        let sched = scheduler();
        let ran = Arc::new(AtomicUsize::new(0));

        let remote = Arc::clone(&sched);
        let counter = Arc::clone(&ran);
        std::thread::spawn(move || {
            let stop = remote.stop_handle();
            remote
                .add_job(Job::once(
                    "deferred",
                    Work::blocking(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        stop.stop();
                        Ok(Flow::Finish)
                    }),
                ))
                .unwrap();
        })
        .join()
        .unwrap();

        sched.run(until_stopped(Arc::clone(&sched))).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocking_job_does_not_stall_loop() {
        let sched = scheduler();
        let slow_runs = Arc::new(AtomicUsize::new(0));
        let fast_runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&slow_runs);
        sched
            .add_job(Job::every(
                "slow",
                Duration::from_secs(1),
                Work::blocking(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(Flow::Repeat)
                }),
            ))
            .unwrap();

        let stop = sched.stop_handle();
        let counter = Arc::clone(&fast_runs);
        sched
            .add_job(Job::every(
                "fast",
                Duration::from_millis(5),
                Work::cooperative(move || {
                    let counter = Arc::clone(&counter);
                    let stop = stop.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 5 {
                            stop.stop();
                        }
                        Ok(Flow::Repeat)
                    }
                }),
            ))
            .unwrap();

        sched.run(until_stopped(Arc::clone(&sched))).unwrap();

        assert_eq!(fast_runs.load(Ordering::SeqCst), 5);
        assert_eq!(slow_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_twice_and_after_halt() {
        let sched = scheduler();
        sched.request_stop();
        sched.run(until_stopped(Arc::clone(&sched))).unwrap();

        assert!(matches!(
            sched.run(async {}),
            Err(SchedulerError::Halted)
        ));
        assert!(matches!(
            sched.add_job(Job::once("late", Work::blocking(|| Ok(Flow::Finish)))),
            Err(SchedulerError::Halted)
        ));
    }

    #[test]
    fn test_halt_before_run() {
        let sched = scheduler();
        sched.halt();
        assert!(sched.is_halted());
        assert!(sched.stop_requested());
        sched.halt();
    }
}
