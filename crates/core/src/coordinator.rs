//! Filter execution coordinator
//!
//! Owns the request state machine: one active job at a time, a retiring
//! set for cancelled jobs whose engines have not stopped yet, the busy
//! debounce, the preview/apply seed link, and the last-applied record.
//!
//! The coordinator is single-threaded from the caller's point of view: one
//! UI context sets a request, calls `execute`, and drives `poll` to receive
//! completions. Background jobs run on worker threads owned by their
//! [`FilterJob`] handles; image buffers move into a job at dispatch and
//! come back inside its outcome, so no buffer is ever shared between the
//! coordinator and a worker.

use crate::event::FilterEvent;
use crate::names;
use crate::persistence::{self, PersistenceResult};
use crate::providers::{
    BusyIndicator, ColorProfileApplier, ExtentProvider, NoBusyIndicator, NoColorProfile,
    OutputSink, PreviewCompositor, WorkingSetProvider,
};
use crate::record::LastAppliedRecord;
use crate::request::{FilterRequest, RequestKind};
use crate::telemetry::PreviewDurations;
use crate::validate;
use filter_runner_engine::{
    run_foreground, EngineRequest, FilterEngine, FilterJob, ImageBuffer, ImageList, JobOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Delay before a still-running background job brings up the busy cursor.
///
/// Filters that finish faster than this never flash the indicator.
pub const WAITING_INDICATOR_DELAY: Duration = Duration::from_millis(200);

/// Error types for coordinator operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// `execute` was called before any request descriptor was set
    #[error("no request descriptor set before execute()")]
    NoRequest,
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Host collaborators handed to the coordinator at construction.
///
/// Color profile and busy indicator default to no-ops; headless hosts and
/// tests can leave them unset.
pub struct CoordinatorHosts {
    pub working_set: Box<dyn WorkingSetProvider>,
    pub extent: Box<dyn ExtentProvider>,
    pub compositor: Box<dyn PreviewCompositor>,
    pub output: Box<dyn OutputSink>,
    pub color_profile: Box<dyn ColorProfileApplier>,
    pub indicator: Box<dyn BusyIndicator>,
}

impl CoordinatorHosts {
    /// Bundle the required collaborators, defaulting the optional ones
    pub fn new(
        working_set: Box<dyn WorkingSetProvider>,
        extent: Box<dyn ExtentProvider>,
        compositor: Box<dyn PreviewCompositor>,
        output: Box<dyn OutputSink>,
    ) -> Self {
        Self {
            working_set,
            extent,
            compositor,
            output,
            color_profile: Box::new(NoColorProfile),
            indicator: Box::new(NoBusyIndicator),
        }
    }

    /// Set the color-profile hook
    pub fn with_color_profile(mut self, color_profile: Box<dyn ColorProfileApplier>) -> Self {
        self.color_profile = color_profile;
        self
    }

    /// Set the busy-cursor collaborator
    pub fn with_indicator(mut self, indicator: Box<dyn BusyIndicator>) -> Self {
        self.indicator = indicator;
        self
    }
}

/// Filter execution coordinator.
///
/// # Example
///
/// ```ignore
/// let (mut coordinator, events) = FilterCoordinator::new(engine, hosts);
///
/// coordinator.set_request(
///     FilterRequest::new(RequestKind::InteractivePreview, "fx_sketch", "3,1")
///         .with_preview_size(640, 480),
/// );
/// coordinator.execute()?;
///
/// // In the UI tick:
/// coordinator.poll();
/// while let Ok(event) = events.try_recv() {
///     match event {
///         FilterEvent::PreviewReady => { /* display coordinator.preview_image() */ }
///         FilterEvent::PreviewFailed(message) => { /* show message */ }
///         _ => {}
///     }
/// }
/// ```
pub struct FilterCoordinator {
    engine: Arc<dyn FilterEngine>,
    working_set: Box<dyn WorkingSetProvider>,
    extent: Box<dyn ExtentProvider>,
    compositor: Box<dyn PreviewCompositor>,
    output: Box<dyn OutputSink>,
    color_profile: Box<dyn ColorProfileApplier>,
    indicator: Box<dyn BusyIndicator>,
    events: mpsc::Sender<FilterEvent>,

    /// Descriptor for the next `execute` call
    request: Option<FilterRequest>,

    /// The single cancelable in-flight job
    active: Option<FilterJob>,

    /// Descriptor the active job was dispatched with; outcomes are routed
    /// against this snapshot, not against whatever `request` holds now
    active_request: Option<FilterRequest>,

    /// Cancelled jobs whose engines have not confirmed stopping yet
    retiring: Vec<FilterJob>,

    /// Working buffers; logically empty while a job owns them
    images: ImageList,

    /// Most recently composited preview raster
    preview_image: Option<ImageBuffer>,

    status_lines: Vec<String>,
    parameter_visibility: Vec<i32>,
    quoted_parameters: String,
    last_applied: LastAppliedRecord,

    /// Seed of the most recent preview dispatch; replayed by full applies
    preview_seed: u64,

    telemetry: PreviewDurations,
    busy_deadline: Option<Instant>,
    indicator_delay: Duration,
    execution_started: Instant,
    completed_apply_count: u64,
}

impl FilterCoordinator {
    /// Create a coordinator around an engine and its host collaborators.
    ///
    /// Returns the coordinator and the receiving end of its notification
    /// channel; the receiver belongs to the UI context.
    pub fn new(
        engine: Arc<dyn FilterEngine>,
        hosts: CoordinatorHosts,
    ) -> (Self, mpsc::Receiver<FilterEvent>) {
        let (events, events_rx) = mpsc::channel();
        let coordinator = Self {
            engine,
            working_set: hosts.working_set,
            extent: hosts.extent,
            compositor: hosts.compositor,
            output: hosts.output,
            color_profile: hosts.color_profile,
            indicator: hosts.indicator,
            events,
            request: None,
            active: None,
            active_request: None,
            retiring: Vec::new(),
            images: Vec::new(),
            preview_image: None,
            status_lines: Vec::new(),
            parameter_visibility: Vec::new(),
            quoted_parameters: String::new(),
            last_applied: LastAppliedRecord::default(),
            preview_seed: rand::random(),
            telemetry: PreviewDurations::new(),
            busy_deadline: None,
            indicator_delay: WAITING_INDICATOR_DELAY,
            execution_started: Instant::now(),
            completed_apply_count: 0,
        };
        (coordinator, events_rx)
    }

    /// Set the descriptor for the next execution
    pub fn set_request(&mut self, request: FilterRequest) {
        self.request = Some(request);
    }

    /// Override the busy-indicator debounce delay
    pub fn set_indicator_delay(&mut self, delay: Duration) {
        self.indicator_delay = delay;
    }

    /// Execute the current request descriptor.
    ///
    /// A still-active job is cancelled first. Synchronous previews block
    /// and have their outcome processed before this returns; background
    /// kinds return immediately and report through `poll`.
    pub fn execute(&mut self) -> CoordinatorResult<()> {
        let request = self.request.clone().ok_or(CoordinatorError::NoRequest)?;
        if self.active.is_some() {
            self.cancel();
        }
        self.images.clear();

        let scale = if request.kind.is_preview() {
            request.zoom
        } else {
            1.0
        };
        let (images, mut image_names) =
            self.working_set
                .fetch(&request.visible_rect, request.io_state.input_mode, scale);

        if request.kind.is_preview() {
            let (max_width, max_height) = self.extent.extent(request.io_state.input_mode);
            names::correct_position_markers(
                &mut image_names,
                &request.position_correction,
                max_width,
                max_height,
            );
        }

        let environment = request.environment();

        match request.kind {
            RequestKind::SynchronousPreview => {
                self.preview_seed = rand::random();
                let engine_request = self.engine_request(&request, environment);
                self.execution_started = Instant::now();
                let outcome =
                    run_foreground(self.engine.as_ref(), &engine_request, images, image_names);
                self.process_preview_outcome(outcome, &request);
            }
            RequestKind::InteractivePreview => {
                self.preview_seed = rand::random();
                let engine_request = self.engine_request(&request, environment);
                self.execution_started = Instant::now();
                self.dispatch_background(engine_request, images, image_names, request, "preview");
            }
            RequestKind::FullApply => {
                // Identity fields are captured pre-emptively so persistence
                // reflects intent even if completion races teardown.
                self.last_applied.filter_hash = request.filter_hash.clone();
                self.last_applied.filter_path = request.filter_path.clone();
                self.last_applied.command = request.command.clone();
                self.last_applied.arguments = request.arguments.clone();
                self.last_applied.input_mode = request.io_state.input_mode;
                self.last_applied.output_mode = request.io_state.output_mode;
                self.last_applied.preview_mode = request.io_state.preview_mode;
                // A full apply replays the seed of the preview the user saw.
                self.last_applied.seed = self.preview_seed;
                let engine_request = self.engine_request(&request, environment);
                self.execution_started = Instant::now();
                self.dispatch_background(engine_request, images, image_names, request, "apply");
            }
        }
        Ok(())
    }

    /// Cancel the active job, if any.
    ///
    /// The job is detached into the retiring set and asked to stop
    /// cooperatively; it is destroyed once its own completion arrives. No
    /// failure notification fires for a cancelled job.
    pub fn cancel(&mut self) {
        let Some(job) = self.active.take() else {
            return;
        };
        job.request_stop();
        log::debug!(
            "retiring filter {} job {} after cancellation",
            job.log_tag(),
            job.id()
        );
        self.retiring.push(job);
        self.active_request = None;
        self.hide_busy_indicator();
    }

    /// Abort any active job and clear the working buffers
    pub fn init(&mut self) {
        self.cancel();
        self.images.clear();
    }

    /// Drive the coordinator from the UI context.
    ///
    /// Checks the busy debounce, polls the active job's completion channel
    /// and routes its outcome, and drains finished retiring jobs —
    /// emitting [`FilterEvent::AllRetiringJobsDrained`] exactly once when
    /// the retiring set empties.
    pub fn poll(&mut self) {
        if let Some(deadline) = self.busy_deadline {
            if Instant::now() >= deadline {
                self.busy_deadline = None;
                if self.active.is_some() {
                    self.indicator.set_waiting(true);
                    self.emit(FilterEvent::BusyIndicatorRequested);
                }
            }
        }

        if let Some(outcome) = self.active.as_mut().and_then(|job| job.try_outcome()) {
            self.active = None;
            if let Some(request) = self.active_request.take() {
                self.route_outcome(outcome, &request);
            }
        }

        if !self.retiring.is_empty() {
            self.retiring.retain_mut(|job| job.try_outcome().is_none());
            if self.retiring.is_empty() {
                self.emit(FilterEvent::AllRetiringJobsDrained);
            }
        }
    }

    /// Whether a job occupies the active slot
    pub fn is_processing(&self) -> bool {
        self.active.is_some()
    }

    /// Whether no job occupies the active slot
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Whether the active job is a full apply
    pub fn is_processing_full_apply(&self) -> bool {
        matches!(
            self.active_request.as_ref().map(|r| r.kind),
            Some(RequestKind::FullApply)
        )
    }

    /// Whether cancelled jobs are still awaiting their completions
    pub fn has_retiring_jobs(&self) -> bool {
        !self.retiring.is_empty()
    }

    /// Progress estimate of the active job in percent, 0 when idle
    pub fn progress(&self) -> f32 {
        self.active.as_ref().map(FilterJob::progress).unwrap_or(0.0)
    }

    /// Milliseconds the active job has been running, 0 when idle
    pub fn duration_ms(&self) -> u64 {
        self.active.as_ref().map(FilterJob::elapsed_ms).unwrap_or(0)
    }

    /// Number of full applies completed since construction
    pub fn completed_apply_count(&self) -> u64 {
        self.completed_apply_count
    }

    /// Most recently composited preview raster
    pub fn preview_image(&self) -> Option<&ImageBuffer> {
        self.preview_image.as_ref()
    }

    /// Status lines of the most recent completion
    pub fn status_lines(&self) -> &[String] {
        &self.status_lines
    }

    /// Parameter visibility flags of the most recent completion
    pub fn parameter_visibility(&self) -> &[i32] {
        &self.parameter_visibility
    }

    /// Set the quoted-parameter string committed with the next apply
    pub fn set_quoted_parameters(&mut self, quoted: impl Into<String>) {
        self.quoted_parameters = quoted.into();
    }

    /// The last-applied record (identity fields may be pending)
    pub fn last_applied(&self) -> &LastAppliedRecord {
        &self.last_applied
    }

    /// Rolling window of recent interactive-preview durations
    pub fn preview_durations(&self) -> &PreviewDurations {
        &self.telemetry
    }

    /// Most recent interactive-preview duration in milliseconds
    pub fn last_preview_duration_ms(&self) -> u64 {
        self.telemetry.last()
    }

    /// Average of recent interactive-preview durations in milliseconds
    pub fn average_preview_duration_ms(&self) -> u64 {
        self.telemetry.average()
    }

    /// Clear the preview-duration window
    pub fn reset_preview_durations(&mut self) {
        self.telemetry.reset();
    }

    /// Persist the last-applied record for a host application
    pub fn save_settings(&self, dir: &Path, host: &str) -> PersistenceResult<PathBuf> {
        persistence::save_record(dir, host, &self.last_applied)
    }

    fn engine_request(&self, request: &FilterRequest, environment: String) -> EngineRequest {
        EngineRequest {
            command: request.command.clone(),
            arguments: request.arguments.clone(),
            environment,
            output_message_mode: request.output_message_mode,
            seed: self.preview_seed,
        }
    }

    fn dispatch_background(
        &mut self,
        engine_request: EngineRequest,
        images: ImageList,
        image_names: Vec<String>,
        request: FilterRequest,
        log_tag: &'static str,
    ) {
        let job = FilterJob::spawn(
            Arc::clone(&self.engine),
            engine_request,
            images,
            image_names,
            log_tag,
        );
        self.active = Some(job);
        self.active_request = Some(request);
        self.busy_deadline = Some(Instant::now() + self.indicator_delay);
    }

    fn route_outcome(&mut self, outcome: JobOutcome, request: &FilterRequest) {
        match request.kind {
            RequestKind::FullApply => self.process_apply_outcome(outcome, request),
            _ => self.process_preview_outcome(outcome, request),
        }
    }

    fn process_preview_outcome(&mut self, outcome: JobOutcome, request: &FilterRequest) {
        self.hide_busy_indicator();
        match outcome {
            JobOutcome::Failed(message) => {
                self.status_lines.clear();
                self.parameter_visibility.clear();
                self.images.clear();
                self.emit(FilterEvent::PreviewFailed(message));
            }
            JobOutcome::Finished(output) => {
                self.status_lines = output.status_lines;
                self.parameter_visibility = output.parameter_visibility;
                self.images = output.images;
                match validate::check_channels(&self.images) {
                    Ok(()) => {
                        for image in &mut self.images {
                            self.color_profile.apply(image);
                        }
                        let preview = self.compositor.compose(
                            &self.images,
                            request.io_state.preview_mode,
                            request.preview_width,
                            request.preview_height,
                        );
                        self.preview_image = Some(preview);
                        self.emit(FilterEvent::PreviewReady);
                        if request.kind == RequestKind::InteractivePreview {
                            self.telemetry
                                .record(self.execution_started.elapsed().as_millis() as u64);
                        }
                    }
                    Err(invalid) => {
                        // The preview raster keeps its previous contents.
                        self.emit(FilterEvent::PreviewFailed(invalid.to_string()));
                    }
                }
            }
            JobOutcome::Aborted => {
                // Cancellation is not an error; no notification fires.
            }
        }
    }

    fn process_apply_outcome(&mut self, outcome: JobOutcome, request: &FilterRequest) {
        self.hide_busy_indicator();
        match outcome {
            JobOutcome::Failed(message) => {
                self.status_lines.clear();
                self.parameter_visibility.clear();
                self.last_applied.clear_identity();
                self.emit(FilterEvent::ApplyFailed(message));
            }
            JobOutcome::Finished(output) => {
                self.status_lines = output.status_lines;
                self.parameter_visibility = output.parameter_visibility;
                match validate::check_channels(&output.images) {
                    Err(invalid) => {
                        self.last_applied.clear_identity();
                        self.emit(FilterEvent::ApplyFailed(invalid.to_string()));
                    }
                    Ok(()) => {
                        let mut images = output.images;
                        for image in &mut images {
                            self.color_profile.apply(image);
                        }
                        self.output
                            .deliver(images, output.names, request.io_state.output_mode);
                        self.completed_apply_count += 1;
                        // Output may have changed layer geometry; cached
                        // extents and crops are stale.
                        self.extent.invalidate();
                        self.working_set.invalidate();
                        self.last_applied.status_lines = self.status_lines.clone();
                        self.last_applied.quoted_parameters = self.quoted_parameters.clone();
                        self.emit(FilterEvent::ApplyDone);
                    }
                }
            }
            JobOutcome::Aborted => {}
        }
    }

    fn hide_busy_indicator(&mut self) {
        self.busy_deadline = None;
        self.indicator.set_waiting(false);
    }

    fn emit(&self, event: FilterEvent) {
        // A dropped receiver only means the UI is gone; nothing to do.
        let _ = self.events.send(event);
    }
}

impl Drop for FilterCoordinator {
    fn drop(&mut self) {
        if !self.retiring.is_empty() {
            log::error!(
                "FilterCoordinator dropped with {} unfinished retiring job(s)",
                self.retiring.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{InputOutputState, PositionCorrection};
    use filter_runner_engine::{
        EngineError, EngineOutput, EngineResult, ProgressShare, StopToken,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    enum Script {
        /// Echo inputs back with fixed status text
        Succeed,
        /// Replace the batch with buffers of the given channel counts
        SucceedWithChannels(Vec<u32>),
        /// Fail with the given message
        Fail(String),
        /// Spin until released (or stopped), then echo inputs back
        BlockThenSucceed,
    }

    struct FakeEngine {
        script: Script,
        released: AtomicBool,
        requests: Mutex<Vec<EngineRequest>>,
        name_batches: Mutex<Vec<Vec<String>>>,
    }

    impl FakeEngine {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                released: AtomicBool::new(false),
                requests: Mutex::new(Vec::new()),
                name_batches: Mutex::new(Vec::new()),
            })
        }

        fn release(&self) {
            self.released.store(true, Ordering::Release);
        }

        fn seeds(&self) -> Vec<u64> {
            self.requests.lock().unwrap().iter().map(|r| r.seed).collect()
        }

        fn run_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl FilterEngine for FakeEngine {
        fn run(
            &self,
            request: &EngineRequest,
            images: ImageList,
            names: Vec<String>,
            stop: &StopToken,
            _progress: &ProgressShare,
        ) -> EngineResult<EngineOutput> {
            self.requests.lock().unwrap().push(request.clone());
            self.name_batches.lock().unwrap().push(names.clone());
            match &self.script {
                Script::Fail(message) => Err(EngineError::Execution(message.clone())),
                Script::Succeed => Ok(EngineOutput {
                    images,
                    names,
                    status_lines: vec!["status ok".to_string()],
                    parameter_visibility: vec![1],
                }),
                Script::SucceedWithChannels(channels) => {
                    let images = channels
                        .iter()
                        .map(|&c| ImageBuffer::new(2, 2, c))
                        .collect();
                    let names = (0..channels.len()).map(|i| format!("image-{}", i)).collect();
                    Ok(EngineOutput {
                        images,
                        names,
                        status_lines: Vec::new(),
                        parameter_visibility: Vec::new(),
                    })
                }
                Script::BlockThenSucceed => {
                    loop {
                        if stop.is_stop_requested() {
                            return Err(EngineError::Stopped);
                        }
                        if self.released.load(Ordering::Acquire) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    Ok(EngineOutput {
                        images,
                        names,
                        status_lines: vec!["status ok".to_string()],
                        parameter_visibility: Vec::new(),
                    })
                }
            }
        }
    }

    /// Shared handles into the fake collaborators
    #[derive(Clone, Default)]
    struct Shared {
        fetch_scales: Arc<Mutex<Vec<f64>>>,
        crop_invalidations: Arc<AtomicUsize>,
        extent_invalidations: Arc<AtomicUsize>,
        delivered: Arc<Mutex<Vec<(usize, i32)>>>,
        composed: Arc<AtomicUsize>,
        waiting_states: Arc<Mutex<Vec<bool>>>,
    }

    struct FakeWorkingSet {
        shared: Shared,
    }

    impl WorkingSetProvider for FakeWorkingSet {
        fn fetch(
            &mut self,
            _rect: &crate::request::VisibleRect,
            _input_mode: i32,
            scale: f64,
        ) -> (ImageList, Vec<String>) {
            self.shared.fetch_scales.lock().unwrap().push(scale);
            (
                vec![ImageBuffer::new(4, 4, 3)],
                vec!["layer pos(100,100)".to_string()],
            )
        }

        fn invalidate(&mut self) {
            self.shared.crop_invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeExtent {
        shared: Shared,
    }

    impl ExtentProvider for FakeExtent {
        fn extent(&mut self, _input_mode: i32) -> (u32, u32) {
            (1000, 1000)
        }

        fn invalidate(&mut self) {
            self.shared
                .extent_invalidations
                .fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeCompositor {
        shared: Shared,
    }

    impl PreviewCompositor for FakeCompositor {
        fn compose(
            &self,
            _images: &ImageList,
            _preview_mode: i32,
            width: u32,
            height: u32,
        ) -> ImageBuffer {
            self.shared.composed.fetch_add(1, Ordering::SeqCst);
            ImageBuffer::new(width.max(1), height.max(1), 4)
        }
    }

    struct FakeSink {
        shared: Shared,
    }

    impl OutputSink for FakeSink {
        fn deliver(&mut self, images: ImageList, _names: Vec<String>, output_mode: i32) {
            self.shared
                .delivered
                .lock()
                .unwrap()
                .push((images.len(), output_mode));
        }
    }

    struct RecordingIndicator {
        shared: Shared,
    }

    impl BusyIndicator for RecordingIndicator {
        fn set_waiting(&mut self, waiting: bool) {
            self.shared.waiting_states.lock().unwrap().push(waiting);
        }
    }

    fn coordinator_with(
        engine: Arc<FakeEngine>,
    ) -> (FilterCoordinator, mpsc::Receiver<FilterEvent>, Shared) {
        let shared = Shared::default();
        let hosts = CoordinatorHosts::new(
            Box::new(FakeWorkingSet {
                shared: shared.clone(),
            }),
            Box::new(FakeExtent {
                shared: shared.clone(),
            }),
            Box::new(FakeCompositor {
                shared: shared.clone(),
            }),
            Box::new(FakeSink {
                shared: shared.clone(),
            }),
        )
        .with_indicator(Box::new(RecordingIndicator {
            shared: shared.clone(),
        }));
        let (coordinator, events) = FilterCoordinator::new(engine, hosts);
        (coordinator, events, shared)
    }

    fn preview_request(kind: RequestKind) -> FilterRequest {
        FilterRequest::new(kind, "fx_sketch", "3,1")
            .with_preview_size(640, 480)
            .with_zoom(0.5)
    }

    fn apply_request() -> FilterRequest {
        FilterRequest::new(RequestKind::FullApply, "fx_sketch", "3,1")
            .with_identity("abc123", "Artistic/Sketch")
            .with_io_state(InputOutputState {
                input_mode: 1,
                output_mode: 2,
                preview_mode: 0,
            })
    }

    /// Poll until the next event arrives, with a hard test timeout
    fn pump_for_event(
        coordinator: &mut FilterCoordinator,
        events: &mpsc::Receiver<FilterEvent>,
    ) -> FilterEvent {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            coordinator.poll();
            if let Ok(event) = events.try_recv() {
                return event;
            }
            assert!(Instant::now() < deadline, "no event before timeout");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_synchronous_preview_emits_preview_ready() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
        coordinator.execute().unwrap();

        // Foreground path: the outcome is processed before execute returns.
        assert_eq!(events.try_recv().unwrap(), FilterEvent::PreviewReady);
        assert!(coordinator.is_idle());
        assert!(coordinator.preview_image().is_some());
        assert_eq!(coordinator.status_lines(), ["status ok".to_string()]);
        assert_eq!(shared.composed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_synchronous_preview_failure_clears_state() {
        let engine = FakeEngine::new(Script::Fail("unknown command".to_string()));
        let (mut coordinator, events, _shared) = coordinator_with(engine);

        coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
        coordinator.execute().unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            FilterEvent::PreviewFailed("unknown command".to_string())
        );
        assert!(coordinator.status_lines().is_empty());
        assert!(coordinator.preview_image().is_none());
    }

    #[test]
    fn test_interactive_preview_completes_via_poll() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(engine);

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        assert!(coordinator.is_processing());

        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::PreviewReady
        );
        assert!(coordinator.is_idle());
        assert!(coordinator.preview_image().is_some());
        assert_eq!(coordinator.preview_durations().len(), 1);
    }

    #[test]
    fn test_execute_without_request_errors() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, _events, _shared) = coordinator_with(engine);
        assert!(matches!(
            coordinator.execute(),
            Err(CoordinatorError::NoRequest)
        ));
    }

    #[test]
    fn test_full_apply_success() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, shared) = coordinator_with(engine);

        coordinator.set_request(apply_request());
        coordinator.set_quoted_parameters("\"3\",\"1\"");
        coordinator.execute().unwrap();
        assert!(coordinator.is_processing_full_apply());

        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::ApplyDone
        );
        assert_eq!(coordinator.completed_apply_count(), 1);
        assert_eq!(*shared.delivered.lock().unwrap(), vec![(1, 2)]);
        assert_eq!(shared.crop_invalidations.load(Ordering::SeqCst), 1);
        assert_eq!(shared.extent_invalidations.load(Ordering::SeqCst), 1);

        let record = coordinator.last_applied();
        assert_eq!(record.command, "fx_sketch");
        assert_eq!(record.filter_hash, "abc123");
        assert_eq!(record.input_mode, 1);
        assert_eq!(record.status_lines, vec!["status ok".to_string()]);
        assert_eq!(record.quoted_parameters, "\"3\",\"1\"");
    }

    #[test]
    fn test_full_apply_failure_clears_pending_identity() {
        let engine = FakeEngine::new(Script::Fail("boom".to_string()));
        let (mut coordinator, events, shared) = coordinator_with(engine);

        coordinator.set_request(apply_request());
        coordinator.execute().unwrap();
        // Identity was captured pre-emptively at dispatch.
        assert_eq!(coordinator.last_applied().command, "fx_sketch");

        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::ApplyFailed("boom".to_string())
        );
        assert_eq!(coordinator.completed_apply_count(), 0);
        assert!(coordinator.last_applied().is_empty());
        assert!(shared.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_channels_rejected_on_apply() {
        // 4-image batch with 5 channels at index 2.
        let engine = FakeEngine::new(Script::SucceedWithChannels(vec![3, 4, 5, 3]));
        let (mut coordinator, events, shared) = coordinator_with(engine);

        coordinator.set_request(apply_request());
        coordinator.execute().unwrap();

        match pump_for_event(&mut coordinator, &events) {
            FilterEvent::ApplyFailed(message) => {
                assert!(message.contains("Image #2"), "message: {}", message);
                assert!(message.contains("5 channels"), "message: {}", message);
            }
            other => panic!("expected ApplyFailed, got {:?}", other),
        }
        assert!(shared.delivered.lock().unwrap().is_empty());
        assert_eq!(coordinator.completed_apply_count(), 0);
        assert!(coordinator.last_applied().is_empty());
    }

    #[test]
    fn test_invalid_channels_rejected_on_preview() {
        let engine = FakeEngine::new(Script::SucceedWithChannels(vec![5]));
        let (mut coordinator, events, shared) = coordinator_with(engine);

        coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
        coordinator.execute().unwrap();

        match events.try_recv().unwrap() {
            FilterEvent::PreviewFailed(message) => {
                assert!(message.contains("Image #0"));
            }
            other => panic!("expected PreviewFailed, got {:?}", other),
        }
        assert_eq!(shared.composed.load(Ordering::SeqCst), 0);
        assert!(coordinator.preview_image().is_none());
    }

    #[test]
    fn test_full_apply_replays_preview_seed() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
        coordinator.execute().unwrap();
        let _ = events.try_recv();

        coordinator.set_request(apply_request());
        coordinator.execute().unwrap();
        pump_for_event(&mut coordinator, &events);

        let seeds = engine.seeds();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0], seeds[1], "apply must replay the preview seed");
        assert_eq!(coordinator.last_applied().seed, seeds[0]);
    }

    #[test]
    fn test_each_preview_draws_a_fresh_seed() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        for _ in 0..2 {
            coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
            coordinator.execute().unwrap();
            let _ = events.try_recv();
        }

        let seeds = engine.seeds();
        assert_ne!(seeds[0], seeds[1]);
    }

    #[test]
    fn test_cancel_is_noop_when_idle() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(engine);

        coordinator.cancel();
        coordinator.poll();
        assert!(!coordinator.has_retiring_jobs());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_job_retires_silently() {
        let engine = FakeEngine::new(Script::BlockThenSucceed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        coordinator.cancel();
        assert!(coordinator.is_idle());
        assert!(coordinator.has_retiring_jobs());

        engine.release();
        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::AllRetiringJobsDrained
        );
        assert!(!coordinator.has_retiring_jobs());

        // No outcome event for the aborted job, and the drained
        // notification fires only once.
        for _ in 0..5 {
            coordinator.poll();
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_new_request_independent_of_cancelled_job() {
        let engine = FakeEngine::new(Script::BlockThenSucceed);
        let (mut coordinator, events, shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        coordinator.cancel();

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        assert!(coordinator.is_processing());
        assert!(coordinator.has_retiring_jobs());

        // Release both workers: the cancelled one aborts, the new one
        // completes normally.
        engine.release();
        let mut seen = Vec::new();
        while seen.len() < 2 {
            seen.push(pump_for_event(&mut coordinator, &events));
        }
        assert!(seen.contains(&FilterEvent::PreviewReady));
        assert!(seen.contains(&FilterEvent::AllRetiringJobsDrained));
        assert_eq!(shared.composed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.run_count(), 2);
    }

    #[test]
    fn test_execute_while_active_cancels_first() {
        let engine = FakeEngine::new(Script::BlockThenSucceed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        coordinator.execute().unwrap();
        assert!(coordinator.has_retiring_jobs());
        assert!(coordinator.is_processing());

        engine.release();
        let mut seen = Vec::new();
        while seen.len() < 2 {
            seen.push(pump_for_event(&mut coordinator, &events));
        }
        assert!(seen.contains(&FilterEvent::PreviewReady));
        assert!(seen.contains(&FilterEvent::AllRetiringJobsDrained));
    }

    #[test]
    fn test_busy_indicator_after_debounce() {
        let engine = FakeEngine::new(Script::BlockThenSucceed);
        let (mut coordinator, events, shared) = coordinator_with(Arc::clone(&engine));
        coordinator.set_indicator_delay(Duration::from_millis(5));

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::BusyIndicatorRequested
        );
        assert_eq!(*shared.waiting_states.lock().unwrap(), vec![true]);

        engine.release();
        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::PreviewReady
        );
        // Hidden as part of outcome processing.
        assert_eq!(*shared.waiting_states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_fast_job_never_shows_indicator() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, shared) = coordinator_with(engine);
        coordinator.set_indicator_delay(Duration::from_millis(500));

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::PreviewReady
        );

        coordinator.poll();
        assert!(!shared.waiting_states.lock().unwrap().contains(&true));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_preview_fetches_scaled_apply_fetches_full() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, shared) = coordinator_with(engine);

        coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
        coordinator.execute().unwrap();
        let _ = events.try_recv();

        coordinator.set_request(apply_request());
        coordinator.execute().unwrap();
        pump_for_event(&mut coordinator, &events);

        assert_eq!(*shared.fetch_scales.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_position_markers_corrected_for_previews() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(
            preview_request(RequestKind::SynchronousPreview).with_position_correction(
                PositionCorrection {
                    x_factor: 500.0,
                    y_factor: 500.0,
                },
            ),
        );
        coordinator.execute().unwrap();
        let _ = events.try_recv();

        let batches = engine.name_batches.lock().unwrap();
        assert_eq!(batches[0], vec!["layer pos(50,50)".to_string()]);
    }

    #[test]
    fn test_full_apply_names_pass_through_uncorrected() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(apply_request().with_position_correction(PositionCorrection {
            x_factor: 500.0,
            y_factor: 500.0,
        }));
        coordinator.execute().unwrap();
        pump_for_event(&mut coordinator, &events);

        let batches = engine.name_batches.lock().unwrap();
        assert_eq!(batches[0], vec!["layer pos(100,100)".to_string()]);
    }

    #[test]
    fn test_init_retires_active_job() {
        let engine = FakeEngine::new(Script::BlockThenSucceed);
        let (mut coordinator, events, _shared) = coordinator_with(Arc::clone(&engine));

        coordinator.set_request(preview_request(RequestKind::InteractivePreview));
        coordinator.execute().unwrap();
        coordinator.init();
        assert!(coordinator.is_idle());
        assert!(coordinator.has_retiring_jobs());

        engine.release();
        assert_eq!(
            pump_for_event(&mut coordinator, &events),
            FilterEvent::AllRetiringJobsDrained
        );
    }

    #[test]
    fn test_save_settings_roundtrip() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(engine);
        let dir = tempfile::tempdir().unwrap();

        coordinator.set_request(apply_request());
        coordinator.execute().unwrap();
        pump_for_event(&mut coordinator, &events);

        coordinator.save_settings(dir.path(), "gimp").unwrap();
        let loaded = crate::persistence::load_record(dir.path(), "gimp")
            .unwrap()
            .unwrap();
        assert_eq!(&loaded, coordinator.last_applied());
    }

    #[test]
    fn test_synchronous_preview_not_in_telemetry() {
        let engine = FakeEngine::new(Script::Succeed);
        let (mut coordinator, events, _shared) = coordinator_with(engine);

        coordinator.set_request(preview_request(RequestKind::SynchronousPreview));
        coordinator.execute().unwrap();
        let _ = events.try_recv();

        assert!(coordinator.preview_durations().is_empty());
        assert_eq!(coordinator.average_preview_duration_ms(), 0);
    }
}
