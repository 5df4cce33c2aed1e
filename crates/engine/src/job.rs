//! Background job handles for engine invocations
//!
//! A [`FilterJob`] owns one worker thread running a single engine call,
//! plus the one-shot channel the worker reports its outcome on. The handle
//! is polled, never blocked on, by the coordinator's UI context; a blocking
//! [`FilterJob::wait`] exists for shutdown paths and tests.
//!
//! A stopped job is not gone: the engine may keep running for an arbitrary
//! time after `request_stop()`, and the outcome (eventually `Aborted`)
//! still arrives on the channel. Owners of a stopped handle must keep it
//! alive until `try_outcome` yields.

use crate::engine::{EngineError, EngineRequest, EngineOutput, FilterEngine};
use crate::image::ImageList;
use crate::stop::StopToken;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    mpsc, Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Unique job identifier
pub type JobId = u64;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Shared completion estimate for a running job, in percent (0.0–100.0).
///
/// The worker publishes through its clone; the owning context reads
/// whenever it needs to refresh a progress display.
#[derive(Clone, Debug, Default)]
pub struct ProgressShare {
    bits: Arc<AtomicU32>,
}

impl ProgressShare {
    /// Create a new share reporting 0.0
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new progress estimate
    pub fn set(&self, percent: f32) {
        self.bits.store(percent.to_bits(), Ordering::Relaxed);
    }

    /// Read the most recently published estimate
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Terminal outcome of one engine invocation
#[derive(Debug)]
pub enum JobOutcome {
    /// The command completed and produced output
    Finished(EngineOutput),

    /// The command failed with a user-facing message
    Failed(String),

    /// The execution honored a stop request; there is no output
    Aborted,
}

/// Handle to one in-flight (or retiring) background engine invocation.
///
/// The image buffers move into the worker at spawn time and come back
/// inside the [`JobOutcome`]; while the job is live the spawning side holds
/// no reference to them.
pub struct FilterJob {
    id: JobId,
    log_tag: &'static str,
    stop: StopToken,
    running: Arc<AtomicBool>,
    progress: ProgressShare,
    started: Instant,
    outcome_rx: mpsc::Receiver<JobOutcome>,
    _thread: Option<JoinHandle<()>>,
}

impl FilterJob {
    /// Spawn a worker thread running one engine invocation.
    ///
    /// `log_tag` names the request flavor in thread names and diagnostics
    /// ("preview" or "apply").
    pub fn spawn(
        engine: Arc<dyn FilterEngine>,
        request: EngineRequest,
        images: ImageList,
        names: Vec<String>,
        log_tag: &'static str,
    ) -> Self {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let stop = StopToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let progress = ProgressShare::new();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        let worker_stop = stop.clone();
        let worker_running = Arc::clone(&running);
        let worker_progress = progress.clone();

        let thread = thread::Builder::new()
            .name(format!("filter-{}-{}", log_tag, id))
            .spawn(move || {
                let outcome = run_engine(
                    engine.as_ref(),
                    &request,
                    images,
                    names,
                    &worker_stop,
                    &worker_progress,
                );
                // Clearing the flag before sending lets the receiver treat
                // "message available" as "worker is done" without a race.
                worker_running.store(false, Ordering::Release);
                if outcome_tx.send(outcome).is_err() {
                    log::debug!("filter {} job {}: outcome receiver dropped", log_tag, id);
                }
            })
            .expect("Failed to spawn filter worker thread");

        Self {
            id,
            log_tag,
            stop,
            running,
            progress,
            started: Instant::now(),
            outcome_rx,
            _thread: Some(thread),
        }
    }

    /// Unique identifier of this job
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Tag naming the request flavor ("preview" / "apply")
    pub fn log_tag(&self) -> &'static str {
        self.log_tag
    }

    /// Whether the worker is still executing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the engine to stop cooperatively
    ///
    /// The job keeps running until the engine honors the request; its
    /// outcome still arrives through `try_outcome`.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Latest progress estimate in percent
    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    /// Milliseconds elapsed since the job was spawned
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Poll for the job's outcome without blocking.
    ///
    /// Returns `None` while the worker is running or its completion has not
    /// been delivered yet. The running flag is checked first: a completion
    /// observed while the flag still reads "running" is treated as stale
    /// and picked up on a later poll.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        if self.is_running() {
            return None;
        }
        self.outcome_rx.try_recv().ok()
    }

    /// Block until the job finishes and return its outcome.
    ///
    /// Intended for shutdown paths and tests; UI contexts should poll.
    pub fn wait(mut self) -> Option<JobOutcome> {
        if let Some(thread) = self._thread.take() {
            if thread.join().is_err() {
                log::error!("filter {} job {}: worker thread panicked", self.log_tag, self.id);
                return None;
            }
        }
        self.outcome_rx.try_recv().ok()
    }
}

/// Run one engine invocation inline, blocking the caller.
///
/// Used for synchronous previews: no thread, no stop token exposed, the
/// outcome is available as soon as the call returns.
pub fn run_foreground(
    engine: &dyn FilterEngine,
    request: &EngineRequest,
    images: ImageList,
    names: Vec<String>,
) -> JobOutcome {
    let stop = StopToken::new();
    let progress = ProgressShare::new();
    run_engine(engine, request, images, names, &stop, &progress)
}

fn run_engine(
    engine: &dyn FilterEngine,
    request: &EngineRequest,
    images: ImageList,
    names: Vec<String>,
    stop: &StopToken,
    progress: &ProgressShare,
) -> JobOutcome {
    match engine.run(request, images, names, stop, progress) {
        Ok(output) => {
            if stop.is_stop_requested() {
                // The engine completed despite the stop request; the result
                // must still be discarded, not routed as a success.
                JobOutcome::Aborted
            } else {
                JobOutcome::Finished(output)
            }
        }
        Err(EngineError::Stopped) => JobOutcome::Aborted,
        Err(EngineError::Execution(message)) => JobOutcome::Failed(message),
    }
}
