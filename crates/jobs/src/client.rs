//! Submission, polling and publication of analysis jobs.
//!
//! [`AnalysisJobClient`] tracks at most one job. Every state change made on
//! behalf of a job first checks that the job is still the tracked one, so a
//! response that arrives after a reset or a newer submission is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use analysis::config::{AnalysisConfig, AnalysisType};
use analysis::indicator::Indicator;
use analysis::result::{AnalysisResult, AssembleError, AssembledResult, assemble};
use analysis::validation::RequestKind;
use parking_lot::{Mutex, RwLock};
use runtime::metrics::Metrics;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::AnalysisApi;
use crate::cache::ResultCache;
use crate::protocol::{AnalysisRequest, ReferenceLayer, Reply, ResultKey, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    /// Consecutive status-check failures tolerated before giving up.
    pub max_poll_failures: u32,
    pub cache_capacity: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(600),
            max_poll_failures: 3,
            cache_capacity: 16,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub id: JobId,
    pub config: AnalysisConfig,
    pub kind: RequestKind,
    /// `None` when the request could not be fingerprinted; never cached.
    pub key: Option<ResultKey>,
    pub task_id: Option<String>,
    pub status: TaskStatus,
    pub started_at: Instant,
    pub is_cached: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("network error: {0}")]
    Network(String),
    /// Server-reported failure, shown as sent.
    #[error("{0}")]
    Failed(String),
    #[error("Analysis task timed out.")]
    TimedOut,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

/// What the rest of the application renders.
#[derive(Debug, Clone, Default)]
pub struct PublishedState {
    pub result: Option<AssembledResult>,
    pub loading: bool,
    pub error: Option<JobError>,
    pub reference_layer: Option<ReferenceLayer>,
    pub job: Option<AnalysisJob>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Submitted { job: JobId, kind: RequestKind },
    CacheHit { job: JobId },
    Polled { job: JobId, status: TaskStatus },
    Completed { job: JobId, kind: RequestKind },
    Failed { job: JobId, kind: RequestKind, error: JobError },
    TimedOut { job: JobId, kind: RequestKind },
    Reset,
}

struct Inner {
    api: Arc<dyn AnalysisApi>,
    settings: JobSettings,
    state: RwLock<PublishedState>,
    cache: Mutex<ResultCache>,
    poller: Mutex<Option<JoinHandle<()>>>,
    next_job: AtomicU64,
    last_request: Mutex<Option<AnalysisRequest>>,
    metrics: Mutex<Metrics>,
    events: broadcast::Sender<JobEvent>,
    settled: Notify,
}

#[derive(Clone)]
pub struct AnalysisJobClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AnalysisJobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisJobClient")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl AnalysisJobClient {
    pub fn new(api: Arc<dyn AnalysisApi>, settings: JobSettings) -> Self {
        let (events, _) = broadcast::channel(1024);
        let cache = ResultCache::new(settings.cache_capacity);
        Self {
            inner: Arc::new(Inner {
                api,
                settings,
                state: RwLock::new(PublishedState::default()),
                cache: Mutex::new(cache),
                poller: Mutex::new(None),
                next_job: AtomicU64::new(1),
                last_request: Mutex::new(None),
                metrics: Mutex::new(Metrics::new()),
                events,
                settled: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> PublishedState {
        self.inner.state.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.read().loading
    }

    pub fn reference_published(&self) -> bool {
        self.inner.state.read().reference_layer.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.metrics.lock().clone()
    }

    pub fn cached_results(&self) -> usize {
        self.inner.cache.lock().len()
    }

    /// Resolves once no job is loading.
    pub async fn wait_settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if !self.is_loading() {
                return;
            }
            notified.await;
        }
    }

    pub async fn indicators(&self) -> Result<Vec<Indicator>, JobError> {
        self.inner
            .api
            .indicators()
            .await
            .map_err(|e| JobError::Network(e.to_string()))
    }

    fn emit(&self, event: JobEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.inner.poller.lock().take() {
            handle.abort();
        }
    }

    fn is_current(&self, id: JobId) -> bool {
        self.inner
            .state
            .read()
            .job
            .as_ref()
            .is_some_and(|job| job.id == id)
    }

    /// Ends job `id` if it is still tracked: clears the job and loading flag,
    /// then lets `apply` publish the outcome. Returns the finished job.
    fn settle(
        &self,
        id: JobId,
        apply: impl FnOnce(&mut PublishedState, &mut AnalysisJob),
    ) -> Option<AnalysisJob> {
        let job = {
            let mut state = self.inner.state.write();
            if !state.job.as_ref().is_some_and(|job| job.id == id) {
                debug!(job = id.0, "dropping response for a stale job");
                return None;
            }
            let mut job = state.job.take()?;
            state.loading = false;
            apply(&mut *state, &mut job);
            job
        };
        self.inner
            .metrics
            .lock()
            .observe("jobs.settle_ms", job.started_at.elapsed().as_millis() as u64);
        self.inner.settled.notify_waiters();
        Some(job)
    }

    /// Submits `request`, replacing whatever job was tracked.
    ///
    /// Resolves once the submission response has been applied; an
    /// asynchronous task keeps polling in the background.
    pub async fn submit(&self, request: AnalysisRequest) -> JobId {
        self.stop_polling();
        let id = JobId(self.inner.next_job.fetch_add(1, Ordering::SeqCst));
        let kind = request.kind();
        let key = request.fingerprint();
        *self.inner.last_request.lock() = Some(request.clone());
        self.inner.metrics.lock().incr("jobs.submitted");

        if kind == RequestKind::Standard
            && let Some(key) = &key
        {
            let hit = self.inner.cache.lock().get(key);
            if let Some(result) = hit {
                info!(job = id.0, "serving analysis from the local cache");
                self.inner.metrics.lock().incr("jobs.cache_hits");
                {
                    let mut state = self.inner.state.write();
                    state.result = Some(result);
                    state.loading = false;
                    state.error = None;
                    state.job = None;
                }
                self.inner.settled.notify_waiters();
                self.emit(JobEvent::CacheHit { job: id });
                return id;
            }
        }

        {
            let mut state = self.inner.state.write();
            state.result = None;
            state.error = None;
            state.loading = true;
            state.job = Some(AnalysisJob {
                id,
                config: request.config().clone(),
                kind,
                key,
                task_id: None,
                status: TaskStatus::Pending,
                started_at: Instant::now(),
                is_cached: false,
            });
        }
        info!(job = id.0, ?kind, "analysis submitted");
        self.emit(JobEvent::Submitted { job: id, kind });

        let response = self.inner.api.submit(request).await;
        if !self.is_current(id) {
            debug!(job = id.0, "submission answered after the job was replaced");
            return id;
        }
        match response {
            Ok(response) => {
                self.apply_reply(id, response.reply());
            }
            Err(e) => {
                warn!(job = id.0, error = %e, "analysis submission failed");
                self.fail(id, JobError::Network(e.to_string()));
            }
        }
        id
    }

    /// Re-submits the last request, if any.
    pub async fn retry(&self) -> Option<JobId> {
        let request = self.inner.last_request.lock().clone()?;
        info!("retrying last analysis request");
        Some(self.submit(request).await)
    }

    /// Drops the tracked job and the published result. The reference layer
    /// survives only when `analysis_type_hint` is Spatial.
    pub fn reset(&self, analysis_type_hint: Option<AnalysisType>) {
        self.stop_polling();
        {
            let mut state = self.inner.state.write();
            state.result = None;
            state.error = None;
            state.loading = false;
            state.job = None;
            if analysis_type_hint != Some(AnalysisType::Spatial) {
                state.reference_layer = None;
            }
        }
        debug!(hint = ?analysis_type_hint, "job client reset");
        self.inner.settled.notify_waiters();
        self.emit(JobEvent::Reset);
    }

    fn apply_reply(&self, id: JobId, reply: Reply) -> bool {
        match reply {
            Reply::Ready { payload, cached } => {
                self.complete(id, payload, cached);
                true
            }
            Reply::Pending { task_id, status } => {
                let first = {
                    let mut state = self.inner.state.write();
                    match state.job.as_mut() {
                        Some(job) if job.id == id => {
                            let first = job.task_id.is_none();
                            job.task_id = Some(task_id.clone());
                            job.status = status;
                            first
                        }
                        _ => return true,
                    }
                };
                if first {
                    debug!(job = id.0, %task_id, "polling analysis task");
                    let client = self.clone();
                    let handle = tokio::spawn(async move { client.poll_loop(id, task_id).await });
                    *self.inner.poller.lock() = Some(handle);
                }
                false
            }
            Reply::Failed(message) => {
                self.fail(id, JobError::Failed(message));
                true
            }
            Reply::Malformed(message) => {
                self.fail(id, JobError::Malformed(message));
                true
            }
        }
    }

    async fn poll_loop(self, id: JobId, task_id: String) {
        let settings = self.inner.settings.clone();
        let mut failures = 0u32;
        loop {
            tokio::time::sleep(settings.poll_interval).await;
            let started = {
                let state = self.inner.state.read();
                match state.job.as_ref() {
                    Some(job) if job.id == id => job.started_at,
                    _ => return,
                }
            };
            if started.elapsed() > settings.max_wait {
                self.time_out(id);
                return;
            }

            self.inner.metrics.lock().incr("jobs.polls");
            let deadline = started + settings.max_wait;
            let status = self.inner.api.task_status(task_id.clone());
            let response = tokio::time::timeout_at(deadline, status).await;
            if !self.is_current(id) {
                return;
            }
            let Ok(response) = response else {
                debug!(job = id.0, "status check still outstanding at the deadline");
                self.time_out(id);
                return;
            };
            match response {
                Ok(response) => {
                    failures = 0;
                    let reply = response.reply();
                    if let Reply::Pending { status, .. } = &reply {
                        self.emit(JobEvent::Polled {
                            job: id,
                            status: *status,
                        });
                    }
                    if self.apply_reply(id, reply) {
                        return;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(job = id.0, failures, error = %e, "status check failed");
                    if failures >= settings.max_poll_failures {
                        self.fail(id, JobError::Network(e.to_string()));
                        return;
                    }
                }
            }
        }
    }

    fn complete(&self, id: JobId, payload: serde_json::Value, cached: bool) {
        let Some((kind, config, key)) = self.inner.state.read().job.as_ref().and_then(|job| {
            (job.id == id).then(|| (job.kind, job.config.clone(), job.key.clone()))
        }) else {
            return;
        };

        match kind {
            RequestKind::ReferenceOnly => match ReferenceLayer::from_payload(&payload) {
                Ok(layer) => {
                    if self
                        .settle(id, |state, _| state.reference_layer = Some(layer))
                        .is_some()
                    {
                        info!(job = id.0, "reference layer published");
                        self.emit(JobEvent::Completed { job: id, kind });
                    }
                }
                Err(e) => self.fail(id, JobError::Malformed(e.to_string())),
            },
            RequestKind::Standard => match assemble(AnalysisResult::new(config, payload)) {
                Ok(result) => {
                    let stored = result.clone();
                    let settled = self.settle(id, |state, job| {
                        job.status = TaskStatus::Completed;
                        job.is_cached = cached;
                        state.result = Some(result);
                        state.error = None;
                    });
                    if let Some(job) = settled {
                        debug!(job = id.0, task = ?job.task_id, cached = job.is_cached, "result published");
                        if let Some(key) = key {
                            let evicted = self.inner.cache.lock().insert(key, stored);
                            if !evicted.is_empty() {
                                debug!(evicted = evicted.len(), "result cache evicted entries");
                            }
                        }
                        info!(job = id.0, "analysis completed");
                        self.emit(JobEvent::Completed { job: id, kind });
                    }
                }
                Err(e) => self.fail(id, JobError::Assemble(e)),
            },
        }
    }

    fn fail(&self, id: JobId, error: JobError) {
        let published = error.clone();
        if let Some(job) = self.settle(id, |state, _| state.error = Some(published)) {
            warn!(job = id.0, %error, "analysis failed");
            self.emit(JobEvent::Failed {
                job: id,
                kind: job.kind,
                error,
            });
        }
    }

    fn time_out(&self, id: JobId) {
        let settled = self.settle(id, |state, job| {
            state.error = Some(JobError::TimedOut);
            if job.config.analysis_type != AnalysisType::Spatial {
                state.reference_layer = None;
            }
        });
        if let Some(job) = settled {
            if let Some(key) = &job.key {
                self.inner.cache.lock().remove(key);
            }
            self.inner.metrics.lock().incr("jobs.timeouts");
            warn!(job = id.0, "analysis task timed out");
            self.emit(JobEvent::TimedOut {
                job: id,
                kind: job.kind,
            });
        }
    }
}
