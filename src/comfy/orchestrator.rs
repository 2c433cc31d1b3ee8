//! Job orchestration: submit, await completion, fetch artifacts.
//!
//! Completion is observed through two racing signals. A listener task follows
//! the push channel while the orchestrating task polls the history endpoint on
//! a fixed interval; whichever reports first wins. Both feed one `select!`
//! loop bounded by a hard wall-clock deadline. Once either signal fires, a
//! confirmatory history poll supplies the artifact list. The service may
//! announce success before it writes the history record, so an absent or
//! pending record keeps the poll going until the record lands or the deadline
//! passes. The deadline covers waiting and confirming; artifact downloads are
//! bounded only by the per-request HTTP timeout.
//!
//! Nothing here retries a job. Timeouts and failures are terminal and surface
//! as a [`JobReport`] without saved images.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::client::ImageBackend;
use super::events::{JobWatch, PushVerdict};
use super::history::{ArtifactRef, HistoryState};
use super::JobHandle;
use crate::error::ComfyError;
use crate::workflow::WorkflowGraph;

/// Timing and output settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard ceiling on waiting for and confirming one job.
    pub job_timeout: Duration,
    /// Interval between history polls.
    pub poll_interval: Duration,
    /// Directory fetched images are written to.
    pub output_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(1500),
            output_dir: PathBuf::from("fs_dataset"),
        }
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    TimedOut,
    Failed,
}

/// Which signal observed completion first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Push,
    Poll,
}

/// Result of waiting on a job.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    Completed {
        artifacts: Vec<ArtifactRef>,
        source: SignalSource,
    },
    TimedOut,
    Failed(String),
}

/// One artifact that could not be saved.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub artifact: ArtifactRef,
    pub error: String,
}

/// Outcome of fetching a job's artifacts.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub saved: Vec<PathBuf>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Everything the batch loop needs to know about one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// `None` if submission failed.
    pub handle: Option<JobHandle>,
    pub state: JobState,
    pub saved: Vec<PathBuf>,
    pub fetch_failures: Vec<FetchFailure>,
    /// Reason for a `Failed` state.
    pub error: Option<String>,
}

impl JobReport {
    fn terminal(handle: Option<JobHandle>, state: JobState, error: Option<String>) -> Self {
        Self {
            handle,
            state,
            saved: Vec::new(),
            fetch_failures: Vec::new(),
            error,
        }
    }
}

/// Aborts the push listener when the wait ends, closing its socket.
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives jobs through an [`ImageBackend`].
pub struct JobOrchestrator {
    backend: Arc<dyn ImageBackend>,
    config: OrchestratorConfig,
    client_id: String,
}

impl JobOrchestrator {
    pub fn new(backend: Arc<dyn ImageBackend>, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            config,
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Client id used for event routing.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Submits a workflow. Never retried.
    pub async fn submit(&self, workflow: &WorkflowGraph) -> Result<JobHandle, ComfyError> {
        let handle = self.backend.submit(workflow, &self.client_id).await?;
        info!(prompt_id = %handle, "Job submitted");
        Ok(handle)
    }

    /// Waits for `handle` to finish, racing the push channel against polling.
    #[instrument(skip(self), fields(prompt_id = %handle))]
    pub async fn await_completion(&self, handle: &JobHandle, timeout: Duration) -> AwaitOutcome {
        let deadline = Instant::now() + timeout;
        let (tx, mut rx) = mpsc::channel::<PushVerdict>(1);
        let _listener = ListenerGuard(spawn_listener(
            self.backend.clone(),
            self.client_id.clone(),
            handle.clone(),
            tx,
        ));

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);
        let mut push_open = true;

        debug!(state = ?JobState::Running, "Awaiting job completion");
        // Set once either signal has reported completion.
        let mut signal: Option<SignalSource> = None;
        loop {
            tokio::select! {
                _ = &mut expiry => {
                    warn!(timeout_secs = timeout.as_secs_f64(), confirming = signal.is_some(), "Job timed out");
                    return AwaitOutcome::TimedOut;
                }
                verdict = rx.recv(), if push_open => match verdict {
                    Some(PushVerdict::Completed) => {
                        push_open = false;
                        let source = *signal.get_or_insert(SignalSource::Push);
                        info!(source = ?source, "Job completion observed");
                        if let Some(outcome) = self.confirm(handle, source, deadline).await {
                            return outcome;
                        }
                    }
                    Some(PushVerdict::Failed(message)) => {
                        warn!(error = %message, "Job failed (push channel)");
                        return AwaitOutcome::Failed(message);
                    }
                    None => push_open = false,
                },
                _ = ticker.tick() => {
                    match tokio::time::timeout_at(deadline, self.backend.history(handle)).await {
                        Ok(Ok(Some(record))) => match record.state() {
                            HistoryState::Completed => {
                                if let Some(source) = signal {
                                    return AwaitOutcome::Completed {
                                        artifacts: record.artifacts(),
                                        source,
                                    };
                                }
                                signal = Some(SignalSource::Poll);
                                info!(source = ?SignalSource::Poll, "Job completion observed");
                                if let Some(outcome) = self.confirm(handle, SignalSource::Poll, deadline).await {
                                    return outcome;
                                }
                            }
                            HistoryState::Failed(message) => {
                                warn!(error = %message, "Job failed (history)");
                                return AwaitOutcome::Failed(message);
                            }
                            HistoryState::Pending => {}
                        },
                        Ok(Ok(None)) => {}
                        Ok(Err(e)) => warn!(error = %e, "History poll failed; retrying next tick"),
                        // The deadline branch fires on the next pass.
                        Err(_) => {}
                    }
                }
            }
        }
    }

    /// One history poll after a completion signal.
    ///
    /// Returns `None` while the record is absent or still pending, leaving the
    /// wait loop to poll again.
    async fn confirm(
        &self,
        handle: &JobHandle,
        source: SignalSource,
        deadline: Instant,
    ) -> Option<AwaitOutcome> {
        match tokio::time::timeout_at(deadline, self.backend.history(handle)).await {
            Ok(Ok(Some(record))) => match record.state() {
                HistoryState::Completed => Some(AwaitOutcome::Completed {
                    artifacts: record.artifacts(),
                    source,
                }),
                HistoryState::Failed(message) => Some(AwaitOutcome::Failed(message)),
                HistoryState::Pending => {
                    debug!("History record still pending after completion signal");
                    None
                }
            },
            Ok(Ok(None)) => {
                debug!("History record not written yet; polling on");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Confirmatory history poll failed; retrying next tick");
                None
            }
            Err(_) => {
                warn!("Job timed out while confirming completion");
                Some(AwaitOutcome::TimedOut)
            }
        }
    }

    /// Downloads every artifact, continuing past individual failures.
    #[instrument(skip(self, artifacts), fields(prompt_id = %handle, count = artifacts.len()))]
    pub async fn fetch_artifacts(&self, handle: &JobHandle, artifacts: &[ArtifactRef]) -> FetchReport {
        let mut report = FetchReport::default();
        let dir = &self.config.output_dir;

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Cannot create output directory");
            report.failures = artifacts
                .iter()
                .map(|artifact| FetchFailure {
                    artifact: artifact.clone(),
                    error: e.to_string(),
                })
                .collect();
            return report;
        }

        for (index, artifact) in artifacts.iter().enumerate() {
            let path = artifact_path(dir, handle, index, artifact);
            match self.fetch_one(artifact, &path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Saved artifact");
                    report.saved.push(path);
                }
                Err(e) => {
                    warn!(filename = %artifact.filename, error = %e, "Artifact fetch failed");
                    report.failures.push(FetchFailure {
                        artifact: artifact.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_partial() {
            warn!(
                saved = report.saved.len(),
                failed = report.failures.len(),
                "Partial artifact retrieval"
            );
        }
        report
    }

    async fn fetch_one(&self, artifact: &ArtifactRef, path: &Path) -> Result<(), ComfyError> {
        let bytes = self.backend.view(artifact).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Submit, await and fetch one job.
    #[instrument(name = "job", skip(self, workflow))]
    pub async fn run_job(&self, workflow: &WorkflowGraph) -> JobReport {
        let handle = match self.submit(workflow).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Job submission failed");
                return JobReport::terminal(None, JobState::Failed, Some(e.to_string()));
            }
        };

        match self.await_completion(&handle, self.config.job_timeout).await {
            AwaitOutcome::Completed { artifacts, .. } => {
                if artifacts.is_empty() {
                    warn!(prompt_id = %handle, "Job completed without artifacts");
                }
                let fetched = self.fetch_artifacts(&handle, &artifacts).await;
                JobReport {
                    handle: Some(handle),
                    state: JobState::Completed,
                    saved: fetched.saved,
                    fetch_failures: fetched.failures,
                    error: None,
                }
            }
            AwaitOutcome::TimedOut => JobReport::terminal(Some(handle), JobState::TimedOut, None),
            AwaitOutcome::Failed(message) => {
                JobReport::terminal(Some(handle), JobState::Failed, Some(message))
            }
        }
    }
}

/// `<dir>/<prompt_id>_<index>.<ext>`
fn artifact_path(dir: &Path, handle: &JobHandle, index: usize, artifact: &ArtifactRef) -> PathBuf {
    dir.join(format!("{}_{}.{}", handle.file_stem(), index, artifact.extension()))
}

fn spawn_listener(
    backend: Arc<dyn ImageBackend>,
    client_id: String,
    handle: JobHandle,
    tx: mpsc::Sender<PushVerdict>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = match backend.open_events(&client_id).await {
            Ok(events) => events,
            Err(e) => {
                warn!(prompt_id = %handle, error = %e, "Push channel unavailable; relying on polling");
                return;
            }
        };

        let mut watch = JobWatch::new(handle.as_str());
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(verdict) = watch.observe(&event) {
                        let _ = tx.send(verdict).await;
                        return;
                    }
                }
                Err(ComfyError::ParseError(e)) => debug!(error = %e, "Ignoring undecodable push event"),
                Err(e) => {
                    warn!(prompt_id = %handle, error = %e, "Push channel error; relying on polling");
                    return;
                }
            }
        }
        debug!(prompt_id = %handle, "Push channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comfy::events::{EventStream, PushEvent};
    use crate::comfy::history::{HistoryRecord, HistoryStatus, NodeOutput};
    use crate::workflow::WorkflowBuilder;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// What the mock push channel does once opened.
    #[derive(Clone)]
    enum PushScript {
        Silent,
        OpenFails,
        StreamError,
        Deliver {
            delay: Duration,
            event: PushEvent,
            marks_ready: bool,
        },
    }

    /// Sets a flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct MockBackend {
        submit_id: Option<String>,
        push: PushScript,
        ready: Arc<AtomicBool>,
        ready_after_polls: Option<usize>,
        failing_polls: usize,
        polls: AtomicUsize,
        artifacts: Vec<ArtifactRef>,
        missing: HashSet<String>,
        stream_dropped: Arc<AtomicBool>,
    }

    impl MockBackend {
        fn new(push: PushScript) -> Self {
            Self {
                submit_id: Some("job-1".to_string()),
                push,
                ready: Arc::new(AtomicBool::new(false)),
                ready_after_polls: None,
                failing_polls: 0,
                polls: AtomicUsize::new(0),
                artifacts: vec![ArtifactRef::new("FS_00001_.png")],
                missing: HashSet::new(),
                stream_dropped: Arc::new(AtomicBool::new(false)),
            }
        }

        fn ready_after(mut self, polls: usize) -> Self {
            self.ready_after_polls = Some(polls);
            self
        }

        fn completed_record(&self) -> HistoryRecord {
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "9".to_string(),
                NodeOutput {
                    images: self.artifacts.clone(),
                },
            );
            HistoryRecord {
                status: Some(HistoryStatus {
                    status_str: Some("success".to_string()),
                    completed: true,
                    messages: Vec::new(),
                }),
                outputs,
            }
        }
    }

    #[async_trait]
    impl ImageBackend for MockBackend {
        async fn submit(&self, _workflow: &WorkflowGraph, _client_id: &str) -> Result<JobHandle, ComfyError> {
            self.submit_id
                .clone()
                .map(JobHandle::new)
                .ok_or(ComfyError::MissingPromptId)
        }

        async fn history(&self, _handle: &JobHandle) -> Result<Option<HistoryRecord>, ComfyError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failing_polls {
                return Err(ComfyError::RequestFailed("connection reset".to_string()));
            }
            if self.ready_after_polls.is_some_and(|k| n >= k) {
                self.ready.store(true, Ordering::SeqCst);
            }
            if self.ready.load(Ordering::SeqCst) {
                Ok(Some(self.completed_record()))
            } else {
                Ok(None)
            }
        }

        async fn view(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyError> {
            if self.missing.contains(&artifact.filename) {
                return Err(ComfyError::ApiError {
                    code: 404,
                    message: "not found".to_string(),
                });
            }
            Ok(format!("bytes:{}", artifact.filename).into_bytes())
        }

        async fn open_events(&self, _client_id: &str) -> Result<EventStream, ComfyError> {
            let guard = DropFlag(self.stream_dropped.clone());
            let silent = stream::pending::<Result<PushEvent, ComfyError>>().map(move |item| {
                let _ = &guard;
                item
            });
            match self.push.clone() {
                PushScript::Silent => Ok(silent.boxed()),
                PushScript::OpenFails => Err(ComfyError::EventChannel("connection refused".to_string())),
                PushScript::StreamError => Ok(stream::once(async {
                    Err(ComfyError::EventChannel("reset by peer".to_string()))
                })
                .chain(silent)
                .boxed()),
                PushScript::Deliver {
                    delay,
                    event,
                    marks_ready,
                } => {
                    let ready = self.ready.clone();
                    Ok(stream::once(async move {
                        tokio::time::sleep(delay).await;
                        if marks_ready {
                            ready.store(true, Ordering::SeqCst);
                        }
                        Ok(event)
                    })
                    .chain(silent)
                    .boxed())
                }
            }
        }
    }

    fn orchestrator(backend: MockBackend, poll_interval: Duration, dir: &Path) -> (JobOrchestrator, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let config = OrchestratorConfig {
            job_timeout: Duration::from_secs(2),
            poll_interval,
            output_dir: dir.to_path_buf(),
        };
        (JobOrchestrator::new(backend.clone(), config), backend)
    }

    fn finished_event() -> PushEvent {
        PushEvent::Executing {
            prompt_id: Some("job-1".to_string()),
            node: None,
        }
    }

    #[tokio::test]
    async fn test_push_signal_completes_first() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(PushScript::Deliver {
            delay: Duration::from_millis(30),
            event: finished_event(),
            marks_ready: true,
        });
        let (orch, _) = orchestrator(backend, Duration::from_secs(30), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_secs(2)).await;
        assert_eq!(
            outcome,
            AwaitOutcome::Completed {
                artifacts: vec![ArtifactRef::new("FS_00001_.png")],
                source: SignalSource::Push,
            }
        );
    }

    #[tokio::test]
    async fn test_push_signal_waits_for_history_record() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(PushScript::Deliver {
            delay: Duration::from_millis(10),
            event: PushEvent::ExecutionSuccess {
                prompt_id: "job-1".to_string(),
            },
            marks_ready: false,
        })
        .ready_after(3);
        let (orch, backend) = orchestrator(backend, Duration::from_millis(200), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_secs(2)).await;
        assert_eq!(
            outcome,
            AwaitOutcome::Completed {
                artifacts: vec![ArtifactRef::new("FS_00001_.png")],
                source: SignalSource::Push,
            }
        );
        assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_push_signal_without_history_record_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(PushScript::Deliver {
            delay: Duration::from_millis(10),
            event: finished_event(),
            marks_ready: false,
        });
        let (orch, _) = orchestrator(backend, Duration::from_millis(20), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_millis(150)).await;
        assert_eq!(outcome, AwaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_poll_signal_completes_first() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(PushScript::Silent).ready_after(3);
        let (orch, backend) = orchestrator(backend, Duration::from_millis(10), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_secs(2)).await;
        assert_eq!(
            outcome,
            AwaitOutcome::Completed {
                artifacts: vec![ArtifactRef::new("FS_00001_.png")],
                source: SignalSource::Poll,
            }
        );
        // Three polls to observe completion plus one confirmatory poll.
        assert_eq!(backend.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out_when_neither_signal_fires() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, backend) = orchestrator(MockBackend::new(PushScript::Silent), Duration::from_millis(10), dir.path());

        let started = std::time::Instant::now();
        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_millis(150)).await;
        assert_eq!(outcome, AwaitOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));

        // The push channel is closed once the wait ends.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(backend.stream_dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_push_channel_unavailable_falls_back_to_polling() {
        let dir = tempfile::tempdir().unwrap();
        for script in [PushScript::OpenFails, PushScript::StreamError] {
            let backend = MockBackend::new(script).ready_after(2);
            let (orch, _) = orchestrator(backend, Duration::from_millis(10), dir.path());
            let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_secs(2)).await;
            assert!(matches!(
                outcome,
                AwaitOutcome::Completed { source: SignalSource::Poll, .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_poll_errors_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockBackend::new(PushScript::Silent).ready_after(4);
        backend.failing_polls = 2;
        let (orch, _) = orchestrator(backend, Duration::from_millis(10), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_secs(2)).await;
        assert!(matches!(outcome, AwaitOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_push_error_event_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(PushScript::Deliver {
            delay: Duration::from_millis(10),
            event: PushEvent::ExecutionError {
                prompt_id: "job-1".to_string(),
                message: "CUDA out of memory".to_string(),
            },
            marks_ready: false,
        });
        let (orch, _) = orchestrator(backend, Duration::from_secs(30), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_secs(2)).await;
        assert_eq!(outcome, AwaitOutcome::Failed("CUDA out of memory".to_string()));
    }

    #[tokio::test]
    async fn test_events_for_other_jobs_do_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(PushScript::Deliver {
            delay: Duration::from_millis(10),
            event: PushEvent::ExecutionSuccess {
                prompt_id: "someone-else".to_string(),
            },
            marks_ready: false,
        });
        let (orch, _) = orchestrator(backend, Duration::from_millis(20), dir.path());

        let outcome = orch.await_completion(&JobHandle::new("job-1"), Duration::from_millis(150)).await;
        assert_eq!(outcome, AwaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_fetch_continues_past_failed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockBackend::new(PushScript::Silent);
        backend.artifacts = vec![
            ArtifactRef::new("FS_00001_.png"),
            ArtifactRef::new("gone.png"),
            ArtifactRef::new("FS_00003_.webp"),
        ];
        backend.missing.insert("gone.png".to_string());
        let artifacts = backend.artifacts.clone();
        let out = dir.path().join("images");
        let (orch, _) = orchestrator(backend, Duration::from_millis(10), &out);

        let report = orch.fetch_artifacts(&JobHandle::new("job-1"), &artifacts).await;
        assert_eq!(report.saved, vec![out.join("job-1_0.png"), out.join("job-1_2.webp")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].artifact.filename, "gone.png");
        assert!(report.is_partial());

        assert_eq!(std::fs::read(&report.saved[0]).unwrap(), b"bytes:FS_00001_.png");
        assert_eq!(std::fs::read(&report.saved[1]).unwrap(), b"bytes:FS_00003_.webp");
    }

    #[tokio::test]
    async fn test_run_job_saves_all_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockBackend::new(PushScript::Silent).ready_after(1);
        backend.artifacts = vec![ArtifactRef::new("FS_00001_.png"), ArtifactRef::new("FS_00002_.png")];
        let (orch, _) = orchestrator(backend, Duration::from_millis(10), dir.path());

        let report = orch.run_job(&WorkflowBuilder::default().with_batch_size(2).build("p")).await;
        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.handle, Some(JobHandle::new("job-1")));
        assert_eq!(report.saved.len(), 2);
        assert!(report.fetch_failures.is_empty());
    }

    #[tokio::test]
    async fn test_run_job_failed_submission() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MockBackend::new(PushScript::Silent);
        backend.submit_id = None;
        let (orch, backend) = orchestrator(backend, Duration::from_millis(10), dir.path());

        let report = orch.run_job(&WorkflowBuilder::default().build("p")).await;
        assert_eq!(report.state, JobState::Failed);
        assert!(report.handle.is_none());
        assert!(report.saved.is_empty());
        assert_eq!(backend.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_job_timeout_reports_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new(PushScript::Silent));
        let config = OrchestratorConfig {
            job_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            output_dir: dir.path().to_path_buf(),
        };
        let orch = JobOrchestrator::new(backend, config);

        let report = orch.run_job(&WorkflowBuilder::default().build("p")).await;
        assert_eq!(report.state, JobState::TimedOut);
        assert!(report.saved.is_empty());
    }
}
