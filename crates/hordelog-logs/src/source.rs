use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hordelog_api::{ApiError, HordeApi};
use hordelog_types::{
    Crumb, DownloadFormat, EventSeverity, IssueRecord, LogEvent, LogLine, LogRecord,
};

use crate::cache::{LogLineCache, SlotList};
use crate::error::{Result, SourceError};
use crate::job::JobLink;
use crate::lease::LeaseLink;
use crate::target::LogTarget;

/// Interval between liveness checks while a log is being written
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Options for a log source
#[derive(Clone, Debug)]
pub struct SourceOptions {
    /// Zero disables polling
    pub poll_interval: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What owns the log
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Job,
    Lease { lease_id: String },
}

/// Resolved owner of the log
#[derive(Clone, Debug)]
pub enum SourceVariant {
    Job(JobLink),
    Lease(LeaseLink),
}

impl SourceVariant {
    async fn resolve(api: &dyn HordeApi, log: &LogRecord, kind: &SourceKind) -> Result<Self> {
        match kind {
            SourceKind::Job => JobLink::resolve(api, log).await.map(Self::Job),
            SourceKind::Lease { lease_id } => LeaseLink::resolve(api, &log.id, lease_id)
                .await
                .map(Self::Lease),
        }
    }

    /// Re-fetch the owner; true once it has finished
    async fn refresh(&mut self, api: &dyn HordeApi) -> std::result::Result<bool, ApiError> {
        match self {
            Self::Job(link) => link.refresh(api).await,
            Self::Lease(link) => link.refresh(api).await,
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Self::Job(link) => link.is_finished(),
            Self::Lease(link) => link.is_finished(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Job(link) => link.summary(),
            Self::Lease(link) => link.summary(),
        }
    }

    pub fn percent_complete(&self) -> Option<f64> {
        match self {
            Self::Job(link) => link.percent_complete(),
            Self::Lease(link) => link.percent_complete(),
        }
    }

    pub fn crumbs(&self) -> Vec<Crumb> {
        match self {
            Self::Job(link) => link.crumbs(),
            Self::Lease(link) => link.crumbs(),
        }
    }

    pub fn crumb_title(&self) -> String {
        match self {
            Self::Job(link) => link.crumb_title(),
            Self::Lease(link) => link.crumb_title(),
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Job(link) => link.agent_id(),
            Self::Lease(link) => link.agent_id(),
        }
    }

    pub fn issues(&self) -> &[IssueRecord] {
        match self {
            Self::Job(link) => link.issues(),
            Self::Lease(_) => &[],
        }
    }

    fn download_stem(&self) -> String {
        match self {
            Self::Job(link) => link.download_stem(),
            Self::Lease(link) => link.download_stem(),
        }
    }
}

/// Lifecycle of a log source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourcePhase {
    Uninitialized,
    /// Owner still running; polling
    Active,
    /// Owner finished; final refresh pending
    Inactive,
    /// No further polling
    Terminal,
    /// Initialization failed; see the fatal error
    Failed,
}

impl SourcePhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "loading",
            Self::Active => "live",
            Self::Inactive => "finishing",
            Self::Terminal => "finished",
            Self::Failed => "failed",
        }
    }
}

/// Result of a line range request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every index in the window was already requested or out of bounds
    NothingNew,
    /// Lines arrived and were stored starting at `index`
    Loaded { index: usize, count: usize },
    /// The fetch failed; the claimed slots stay requested without content
    Failed,
}

/// Observable state of a source, replaced wholesale on every change
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSnapshot {
    /// Bumped on each published change
    pub version: u64,
    pub phase: SourcePhase,
    pub active: bool,
    pub line_count: usize,
    pub populated: usize,
    pub fatal_error: Option<String>,
}

impl SourceSnapshot {
    fn initial() -> Self {
        Self {
            version: 0,
            phase: SourcePhase::Uninitialized,
            active: false,
            line_count: 0,
            populated: 0,
            fatal_error: None,
        }
    }
}

struct SourceState {
    record: Option<LogRecord>,
    events: Vec<LogEvent>,
    variant: Option<SourceVariant>,
    fatal_error: Option<String>,
    phase: SourcePhase,
}

struct PollState {
    interval: Duration,
    timer: Option<JoinHandle<()>>,
    /// Identifies the current timer; stale timers compare unequal and exit
    timer_seq: u64,
    timers_scheduled: u64,
}

struct Shared {
    log_id: String,
    kind: SourceKind,
    api: Arc<dyn HordeApi>,
    cache: LogLineCache,
    state: RwLock<SourceState>,
    active: AtomicBool,
    /// Held for the duration of one poll
    polling: AtomicBool,
    /// Serializes `initialize` so metadata is fetched once
    init_lock: tokio::sync::Mutex<()>,
    poll: Mutex<PollState>,
    snapshot: watch::Sender<SourceSnapshot>,
}

/// Releases the in-flight poll flag when dropped
struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn phase(&self) -> SourcePhase {
        self.state.read().phase
    }

    fn publish(&self) {
        let next = {
            let state = self.state.read();
            SourceSnapshot {
                version: 0,
                phase: state.phase,
                active: self.active.load(Ordering::Acquire),
                line_count: self.cache.len(),
                populated: self.cache.populated(),
                fatal_error: state.fatal_error.clone(),
            }
        };

        self.snapshot.send_if_modified(|current| {
            let mut next = next;
            next.version = current.version;
            if *current == next {
                return false;
            }
            next.version += 1;
            *current = next;
            true
        });
    }

    fn fail(&self, err: SourceError) -> SourceError {
        let message = err.to_string();
        error!(log_id = %self.log_id, error = %message, "Log source failed to initialize");
        {
            let mut state = self.state.write();
            state.fatal_error = Some(message);
            state.phase = SourcePhase::Failed;
        }
        self.active.store(false, Ordering::Release);
        self.publish();
        err
    }

    async fn initialize(self: &Arc<Self>) -> Result<()> {
        let _init = self.init_lock.lock().await;
        if !matches!(
            self.phase(),
            SourcePhase::Uninitialized | SourcePhase::Failed
        ) {
            return Ok(());
        }

        let record = match self.api.get_log(&self.log_id).await {
            Ok(record) => record,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.cache.resize(record.line_count);

        let variant = match SourceVariant::resolve(&*self.api, &record, &self.kind).await {
            Ok(variant) => variant,
            Err(e) => return Err(self.fail(e)),
        };

        let events = self
            .api
            .get_log_events(&self.log_id)
            .await
            .unwrap_or_else(|e| {
                warn!(log_id = %self.log_id, error = %e, "Failed to fetch log events");
                Vec::new()
            });

        let finished = variant.is_finished();
        let line_count = record.line_count;
        {
            let mut state = self.state.write();
            state.record = Some(record);
            state.events = events;
            state.variant = Some(variant);
            state.fatal_error = None;
            state.phase = if finished {
                SourcePhase::Inactive
            } else {
                SourcePhase::Active
            };
        }
        self.active.store(!finished, Ordering::Release);
        info!(log_id = %self.log_id, line_count, finished, "Log source initialized");

        if finished {
            self.stop_polling();
        } else {
            self.publish();
            self.schedule_next();
        }
        Ok(())
    }

    async fn load_lines(&self, start: usize, count: usize) -> LoadOutcome {
        let Some(range) = self.cache.claim(start, count) else {
            return LoadOutcome::NothingNew;
        };
        debug!(log_id = %self.log_id, index = range.start, count = range.len(), "Fetching lines");

        match self
            .api
            .get_log_lines(&self.log_id, range.start, range.len())
            .await
        {
            Ok(resp) => {
                self.cache.resize(resp.max_line_count);
                let index = resp.index;
                let count = resp.lines.len();
                self.cache.populate(index, resp.lines);
                self.publish();
                LoadOutcome::Loaded { index, count }
            }
            Err(e) => {
                warn!(
                    log_id = %self.log_id,
                    index = range.start,
                    count = range.len(),
                    error = %e,
                    "Failed to fetch lines"
                );
                LoadOutcome::Failed
            }
        }
    }

    /// Re-fetch metadata and events. Returns whether the cache grew.
    async fn refresh(&self) -> Result<bool> {
        let record = self.api.get_log(&self.log_id).await?;
        let grew = self.cache.resize(record.line_count).is_some();
        self.state.write().record = Some(record);

        match self.api.get_log_events(&self.log_id).await {
            Ok(events) => self.state.write().events = events,
            Err(e) => warn!(log_id = %self.log_id, error = %e, "Failed to fetch log events"),
        }

        self.publish();
        Ok(grew)
    }

    async fn poll(self: &Arc<Self>) {
        if !self.active.load(Ordering::Acquire) || self.phase() == SourcePhase::Terminal {
            return;
        }
        self.schedule_next();

        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(log_id = %self.log_id, "Poll already in flight");
            return;
        }
        let _guard = PollGuard(&self.polling);
        self.poll_inner().await;
    }

    async fn poll_inner(&self) {
        let variant = self.state.read().variant.clone();
        if let Some(mut variant) = variant {
            match variant.refresh(&*self.api).await {
                Ok(finished) => {
                    self.state.write().variant = Some(variant);
                    if finished {
                        info!(log_id = %self.log_id, "Log owner finished");
                        self.active.store(false, Ordering::Release);
                        {
                            let mut state = self.state.write();
                            if state.phase == SourcePhase::Active {
                                state.phase = SourcePhase::Inactive;
                            }
                        }
                        // Pick up trailing lines before stopping
                        if let Err(e) = self.refresh().await {
                            warn!(log_id = %self.log_id, error = %e, "Final refresh failed");
                        }
                        self.stop_polling();
                        return;
                    }
                }
                Err(e) => {
                    warn!(log_id = %self.log_id, error = %e, "Liveness check failed");
                }
            }
        }

        if let Err(e) = self.refresh().await {
            warn!(log_id = %self.log_id, error = %e, "Refresh failed");
        }
    }

    fn schedule_next(self: &Arc<Self>) {
        let mut poll = self.poll.lock();
        if poll.interval.is_zero() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(log_id = %self.log_id, "No async runtime; polling disabled");
            return;
        };

        if let Some(timer) = poll.timer.take() {
            timer.abort();
        }
        poll.timer_seq += 1;
        poll.timers_scheduled += 1;

        let seq = poll.timer_seq;
        let interval = poll.interval;
        let weak: Weak<Self> = Arc::downgrade(self);
        poll.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            {
                let mut poll = shared.poll.lock();
                if poll.timer_seq != seq {
                    return;
                }
                // This task is now the poll itself, not a pending timer
                poll.timer = None;
            }
            shared.poll().await;
        }));
    }

    fn stop_polling(&self) {
        let timer = {
            let mut poll = self.poll.lock();
            poll.interval = Duration::ZERO;
            poll.timer_seq += 1;
            poll.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        {
            let mut state = self.state.write();
            if state.phase == SourcePhase::Inactive {
                state.phase = SourcePhase::Terminal;
            }
        }
        self.publish();
    }
}

/// Incrementally loaded view of one remote log.
///
/// Metadata is fetched by [`initialize`](Self::initialize); lines are fetched
/// on demand through [`load_lines`](Self::load_lines); while the owning job
/// step, batch or lease is still running the source polls for growth. Polling
/// stops when the source is dropped.
pub struct LogSource {
    shared: Arc<Shared>,
}

impl LogSource {
    fn new(
        api: Arc<dyn HordeApi>,
        log_id: impl Into<String>,
        kind: SourceKind,
        options: SourceOptions,
    ) -> Self {
        let (snapshot, _) = watch::channel(SourceSnapshot::initial());
        let shared = Shared {
            log_id: log_id.into(),
            kind,
            api,
            cache: LogLineCache::new(),
            state: RwLock::new(SourceState {
                record: None,
                events: Vec::new(),
                variant: None,
                fatal_error: None,
                phase: SourcePhase::Uninitialized,
            }),
            active: AtomicBool::new(false),
            polling: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            poll: Mutex::new(PollState {
                interval: options.poll_interval,
                timer: None,
                timer_seq: 0,
                timers_scheduled: 0,
            }),
            snapshot,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Source for a job batch or step log
    pub fn job(api: Arc<dyn HordeApi>, log_id: impl Into<String>, options: SourceOptions) -> Self {
        Self::new(api, log_id, SourceKind::Job, options)
    }

    /// Source for an agent lease log
    pub fn lease(
        api: Arc<dyn HordeApi>,
        log_id: impl Into<String>,
        lease_id: impl Into<String>,
        options: SourceOptions,
    ) -> Self {
        let kind = SourceKind::Lease {
            lease_id: lease_id.into(),
        };
        Self::new(api, log_id, kind, options)
    }

    /// Pick the variant from the target: a `leaseId` selects the lease source
    pub fn create(api: Arc<dyn HordeApi>, target: &LogTarget, options: SourceOptions) -> Self {
        match &target.query.lease_id {
            Some(lease_id) => Self::lease(api, target.log_id.clone(), lease_id.clone(), options),
            None => Self::job(api, target.log_id.clone(), options),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Fetch metadata, size the cache and resolve the owner.
    ///
    /// A resolution failure is recorded as the fatal error and returned. Calling
    /// again after success is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        self.shared.initialize().await
    }

    /// Ensure lines in `[start, start + count)` are loaded or in flight
    pub async fn load_lines(&self, start: usize, count: usize) -> LoadOutcome {
        self.shared.load_lines(start, count).await
    }

    /// Grow the cache to `line_count` slots
    pub fn resize(&self, line_count: usize) -> Option<SlotList> {
        let grown = self.shared.cache.resize(line_count);
        if grown.is_some() {
            self.shared.publish();
        }
        grown
    }

    /// Re-fetch metadata and events; true if new lines appeared
    pub async fn refresh(&self) -> Result<bool> {
        if self.phase() == SourcePhase::Uninitialized {
            return Err(SourceError::NotInitialized);
        }
        self.shared.refresh().await
    }

    /// Run one poll cycle now (and schedule the next one)
    pub async fn poll(&self) {
        self.shared.poll().await
    }

    /// Cancel any pending timer and disable polling
    pub fn stop_polling(&self) {
        self.shared.stop_polling();
    }

    /// Tear down: stop polling and drop every cached line
    pub fn clear(&self) {
        self.shared.stop_polling();
        self.shared.active.store(false, Ordering::Release);
        self.shared.cache.clear();
        self.shared.state.write().phase = SourcePhase::Terminal;
        self.shared.publish();
        debug!(log_id = %self.shared.log_id, "Log source cleared");
    }

    /// Download the whole log into `dir`, returning the written path
    pub async fn download(&self, json: bool, dir: &Path) -> Result<PathBuf> {
        let format = DownloadFormat::from_json_flag(json);
        let name = self.download_file_name(format)?;
        let body = self.shared.api.download_log(&self.shared.log_id, format).await?;

        let path = dir.join(name);
        tokio::fs::write(&path, &body).await?;
        info!(log_id = %self.shared.log_id, path = %path.display(), bytes = body.len(), "Downloaded log");
        Ok(path)
    }

    /// File name used for downloads in `format`
    pub fn download_file_name(&self, format: DownloadFormat) -> Result<String> {
        let state = self.shared.state.read();
        let variant = state.variant.as_ref().ok_or(SourceError::NotInitialized)?;
        Ok(format!(
            "{}.{}",
            sanitize_file_name(&variant.download_stem()),
            format.extension()
        ))
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub fn log_id(&self) -> &str {
        &self.shared.log_id
    }

    pub fn kind(&self) -> &SourceKind {
        &self.shared.kind
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.shared.active.store(active, Ordering::Release);
        {
            let mut state = self.shared.state.write();
            state.phase = match (state.phase, active) {
                (SourcePhase::Active, false) => SourcePhase::Inactive,
                (SourcePhase::Inactive, true) => SourcePhase::Active,
                (phase, _) => phase,
            };
        }
        self.shared.publish();
    }

    pub fn phase(&self) -> SourcePhase {
        self.shared.phase()
    }

    pub fn fatal_error(&self) -> Option<String> {
        self.shared.state.read().fatal_error.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll.lock().interval
    }

    /// True while a poll timer is waiting to fire
    pub fn has_pending_timer(&self) -> bool {
        self.shared
            .poll
            .lock()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Number of poll timers scheduled over the source's lifetime
    pub fn timers_scheduled(&self) -> u64 {
        self.shared.poll.lock().timers_scheduled
    }

    /// Watch the observable state
    pub fn subscribe(&self) -> watch::Receiver<SourceSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn record(&self) -> Option<LogRecord> {
        self.shared.state.read().record.clone()
    }

    pub fn cache(&self) -> &LogLineCache {
        &self.shared.cache
    }

    /// Current slot array, one slot per line
    pub fn items(&self) -> SlotList {
        self.shared.cache.items()
    }

    pub fn line_count(&self) -> usize {
        self.shared.cache.len()
    }

    pub fn line(&self, index: usize) -> Option<Arc<LogLine>> {
        self.shared.cache.line(index)
    }

    // ------------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------------

    pub fn events(&self) -> Vec<LogEvent> {
        self.shared.state.read().events.clone()
    }

    pub fn errors(&self) -> Vec<LogEvent> {
        self.events_with(EventSeverity::Error)
    }

    pub fn warnings(&self) -> Vec<LogEvent> {
        self.events_with(EventSeverity::Warning)
    }

    fn events_with(&self, severity: EventSeverity) -> Vec<LogEvent> {
        self.shared
            .state
            .read()
            .events
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    pub fn issues(&self) -> Vec<IssueRecord> {
        self.with_variant(|v| v.issues().to_vec()).unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        self.with_variant(SourceVariant::summary)
            .unwrap_or_else(|| format!("Log {}", self.shared.log_id))
    }

    pub fn percent_complete(&self) -> Option<f64> {
        self.with_variant(SourceVariant::percent_complete).flatten()
    }

    pub fn crumbs(&self) -> Vec<Crumb> {
        self.with_variant(SourceVariant::crumbs).unwrap_or_default()
    }

    pub fn crumb_title(&self) -> String {
        self.with_variant(SourceVariant::crumb_title)
            .unwrap_or_else(|| self.shared.log_id.clone())
    }

    pub fn agent_id(&self) -> Option<String> {
        self.with_variant(|v| v.agent_id().map(String::from))
            .flatten()
    }

    fn with_variant<T>(&self, f: impl FnOnce(&SourceVariant) -> T) -> Option<T> {
        self.shared.state.read().variant.as_ref().map(f)
    }
}

impl Drop for LogSource {
    fn drop(&mut self) {
        self.shared.stop_polling();
    }
}

impl std::fmt::Debug for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSource")
            .field("log_id", &self.shared.log_id)
            .field("kind", &self.shared.kind)
            .field("phase", &self.phase())
            .field("line_count", &self.line_count())
            .finish()
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hordelog_api::{MockCall, MockHordeApi, MockOp};
    use hordelog_types::{
        AgentRecord, BatchRecord, JobRecord, JobStepOutcome, JobStepState, LeaseRecord, LogLevel,
        StepRecord,
    };
    use std::ops::Range;

    use crate::target::SourceQuery;

    fn lines(range: Range<usize>) -> Vec<LogLine> {
        range
            .map(|i| LogLine::new(LogLevel::Info, format!("line {}", i)))
            .collect()
    }

    fn job() -> JobRecord {
        let mut job = JobRecord::new("job1", "Nightly Build", "ue5-main");
        let mut batch = BatchRecord::new("b1");
        batch.agent_id = Some("AGENT-1".to_string());

        let mut compile = StepRecord::new("s1", "Compile Editor");
        compile.log_id = Some("log1".to_string());
        compile.state = JobStepState::Running;
        let mut cook = StepRecord::new("s2", "Cook");
        cook.state = JobStepState::Completed;
        cook.outcome = JobStepOutcome::Success;

        batch.steps = vec![compile, cook];
        job.batches.push(batch);
        job
    }

    fn job_mock(line_count: usize) -> MockHordeApi {
        let mut record = LogRecord::new("log1", 0);
        record.job_id = Some("job1".to_string());
        MockHordeApi::new()
            .with_log(record, lines(0..line_count))
            .with_job(job())
    }

    fn job_api(line_count: usize) -> Arc<MockHordeApi> {
        Arc::new(job_mock(line_count))
    }

    fn job_source(api: &Arc<MockHordeApi>) -> LogSource {
        LogSource::job(api.clone(), "log1", SourceOptions::default())
    }

    fn finish_step(api: &MockHordeApi) {
        api.update_job("job1", |job| {
            let step = &mut job.batches[0].steps[0];
            step.state = JobStepState::Completed;
            step.finish_time = Some(Utc::now());
        });
    }

    fn job_calls(api: &MockHordeApi) -> usize {
        api.count_calls(|c| matches!(c, MockCall::GetJob(_)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_links_job() {
        let api = job_api(20);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        assert_eq!(source.phase(), SourcePhase::Active);
        assert!(source.is_active());
        assert_eq!(source.line_count(), 20);
        assert!(source.items().iter().all(|s| !s.is_requested()));
        assert_eq!(source.summary(), "Compile Editor Running (Unspecified)");
        assert_eq!(source.crumb_title(), "Compile Editor");
        assert_eq!(source.agent_id().as_deref(), Some("AGENT-1"));
        assert_eq!(source.percent_complete(), Some(50.0));
        assert!(source.has_pending_timer());
        assert_eq!(source.timers_scheduled(), 1);

        // Repeat initialization does nothing
        api.clear_calls();
        source.initialize().await.unwrap();
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_initialize_fetches_once() {
        let api = Arc::new(job_mock(10).with_latency(Duration::from_secs(1)));
        let source = job_source(&api);

        let (first, second) = tokio::join!(source.initialize(), source.initialize());
        first.unwrap();
        second.unwrap();

        assert_eq!(
            api.count_calls(|call| matches!(call, MockCall::GetLog(_))),
            1
        );
        assert_eq!(source.phase(), SourcePhase::Active);
        assert_eq!(source.timers_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_lines_fetches_once() {
        let api = job_api(20);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        assert_eq!(
            source.load_lines(0, 10).await,
            LoadOutcome::Loaded { index: 0, count: 10 }
        );
        assert_eq!(source.load_lines(0, 10).await, LoadOutcome::NothingNew);
        assert_eq!(api.line_requests(), vec![(0, 10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_lines_populates_only_range() {
        let api = job_api(20);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        source.load_lines(5, 5).await;
        for i in 5..10 {
            assert_eq!(source.line(i).unwrap().message, format!("line {}", i));
        }
        assert!(source.line(4).is_none());
        assert!(source.line(10).is_none());
        assert!(!source.items()[4].is_requested());
        assert!(!source.items()[10].is_requested());
        assert_eq!(source.snapshot().populated, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_lines_clamps_and_merges_window() {
        let api = job_api(20);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        source.load_lines(8, 2).await;
        source.load_lines(5, 100).await;
        assert_eq!(api.line_requests(), vec![(8, 2), (5, 15)]);
        assert_eq!(source.load_lines(20, 5).await, LoadOutcome::NothingNew);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_lines_grows_from_max_line_count() {
        let api = job_api(10);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        api.append_lines("log1", lines(10..25));
        source.load_lines(0, 5).await;
        assert_eq!(source.line_count(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_leaves_slots_requested() {
        let api = job_api(10);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        api.set_failing(MockOp::GetLines, true);
        assert_eq!(source.load_lines(0, 5).await, LoadOutcome::Failed);
        assert!(source.items()[0].is_requested());
        assert!(!source.items()[0].is_populated());

        api.set_failing(MockOp::GetLines, false);
        assert_eq!(source.load_lines(0, 5).await, LoadOutcome::NothingNew);
        assert!(source.fatal_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_while_inactive_schedules_nothing() {
        let api = job_api(5);
        let source = job_source(&api);

        source.poll().await;
        assert_eq!(source.timers_scheduled(), 0);
        assert!(!source.has_pending_timer());

        source.initialize().await.unwrap();
        source.set_active(false);
        assert_eq!(source.phase(), SourcePhase::Inactive);
        api.clear_calls();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(source.timers_scheduled(), 1);
        assert!(!source.has_pending_timer());
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_picks_up_growth() {
        let api = job_api(5);
        let source = job_source(&api);
        source.initialize().await.unwrap();
        let mut rx = source.subscribe();
        let _ = rx.borrow_and_update();

        api.append_lines("log1", lines(5..8));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(source.line_count(), 8);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().line_count, 8);
        assert_eq!(source.timers_scheduled(), 2);
        assert!(source.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_step_stops_polling() {
        let api = job_api(5);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        finish_step(&api);
        api.append_lines("log1", lines(5..7));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(!source.is_active());
        assert_eq!(source.phase(), SourcePhase::Terminal);
        assert_eq!(source.poll_interval(), Duration::ZERO);
        assert!(!source.has_pending_timer());
        // Final refresh picked up the trailing lines
        assert_eq!(source.line_count(), 7);

        let before = job_calls(&api);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job_calls(&api), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_finished_at_initialize() {
        let api = job_api(5);
        finish_step(&api);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        assert!(!source.is_active());
        assert_eq!(source.phase(), SourcePhase::Terminal);
        assert_eq!(source.timers_scheduled(), 0);
        assert_eq!(source.percent_complete(), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_polling_is_idempotent() {
        let api = job_api(5);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        source.stop_polling();
        source.stop_polling();
        assert_eq!(source.poll_interval(), Duration::ZERO);
        assert!(!source.has_pending_timer());

        api.clear_calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_polls() {
        let api = job_api(5);
        let options = SourceOptions {
            poll_interval: Duration::ZERO,
        };
        let source = LogSource::job(api.clone(), "log1", options);
        source.initialize().await.unwrap();

        assert!(source.is_active());
        assert_eq!(source.timers_scheduled(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_polls_run_once() {
        let api_slow = Arc::new(job_mock(5).with_latency(Duration::from_secs(1)));
        let slow = job_source(&api_slow);
        slow.initialize().await.unwrap();
        api_slow.clear_calls();

        tokio::join!(slow.poll(), slow.poll());
        assert_eq!(job_calls(&api_slow), 1);
        assert_eq!(
            api_slow.count_calls(|c| matches!(c, MockCall::GetLog(_))),
            1
        );

        // The guard is released afterwards
        slow.poll().await;
        assert_eq!(job_calls(&api_slow), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_keeps_polling() {
        let api = job_api(5);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        api.set_failing(MockOp::GetLog, true);
        api.set_failing(MockOp::GetJob, true);
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(source.is_active());
        assert!(source.fatal_error().is_none());
        assert_eq!(source.timers_scheduled(), 2);

        api.set_failing(MockOp::GetLog, false);
        api.set_failing(MockOp::GetJob, false);
        api.append_lines("log1", lines(5..9));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.line_count(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_owner_is_fatal() {
        let mut record = LogRecord::new("log9", 0);
        record.job_id = Some("job1".to_string());
        let api = Arc::new(
            MockHordeApi::new()
                .with_log(record, lines(0..3))
                .with_job(job()),
        );
        let source = LogSource::job(api.clone(), "log9", SourceOptions::default());

        let err = source.initialize().await.unwrap_err();
        assert!(matches!(err, SourceError::Unresolved(_)));
        assert_eq!(source.phase(), SourcePhase::Failed);
        assert_eq!(
            source.fatal_error().as_deref(),
            Some("unable to find step or batch for log log9")
        );
        assert_eq!(
            source.snapshot().fatal_error.as_deref(),
            Some("unable to find step or batch for log log9")
        );
        assert!(!source.is_active());
        assert_eq!(source.timers_scheduled(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_source() {
        let mut lease = LeaseRecord::new("L1", "Upgrade agent");
        lease.agent_id = Some("AGENT-9".to_string());
        let api = Arc::new(
            MockHordeApi::new()
                .with_log(LogRecord::new("log2", 0), lines(0..4))
                .with_lease(lease)
                .with_agent(AgentRecord::new("AGENT-9")),
        );
        let target = LogTarget::new("log2", SourceQuery::lease("L1"));
        let source = LogSource::create(api.clone(), &target, SourceOptions::default());
        assert_eq!(
            source.kind(),
            &SourceKind::Lease {
                lease_id: "L1".to_string()
            }
        );

        source.initialize().await.unwrap();
        assert_eq!(source.summary(), "Upgrade agent on AGENT-9 (running)");
        assert_eq!(source.crumb_title(), "Lease Upgrade agent");
        assert_eq!(source.crumbs().len(), 2);
        assert!(source.issues().is_empty());
        assert_eq!(
            source.download_file_name(DownloadFormat::Json).unwrap(),
            "horde-lease-L1.json"
        );

        api.update_lease("L1", |lease| lease.finish_time = Some(Utc::now()));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(source.phase(), SourcePhase::Terminal);
        assert_eq!(source.percent_complete(), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_tears_down() {
        let api = job_api(10);
        let source = job_source(&api);
        source.initialize().await.unwrap();
        source.load_lines(0, 5).await;

        source.clear();
        assert!(source.items().is_empty());
        assert_eq!(source.phase(), SourcePhase::Terminal);
        assert!(!source.is_active());
        assert!(!source.has_pending_timer());

        // A late refresh does not bring the lines back
        api.append_lines("log1", lines(10..12));
        assert!(!source.refresh().await.unwrap());
        assert_eq!(source.line_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_fetch_keeps_cache_empty() {
        let api = Arc::new(job_mock(10).with_latency(Duration::from_secs(1)));
        let source = job_source(&api);
        source.initialize().await.unwrap();
        api.append_lines("log1", lines(10..20));

        let (outcome, _) = tokio::join!(source.load_lines(0, 5), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            source.clear();
        });

        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
        assert!(source.items().is_empty());
        assert_eq!(source.line_count(), 0);
        assert_eq!(source.phase(), SourcePhase::Terminal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_split_by_severity() {
        let api = Arc::new(job_mock(10).with_events(
            "log1",
            vec![
                LogEvent::new(EventSeverity::Error, 2, 1),
                LogEvent::new(EventSeverity::Warning, 4, 2),
                LogEvent::new(EventSeverity::Error, 8, 1),
            ],
        ));
        let source = job_source(&api);
        source.initialize().await.unwrap();

        assert_eq!(source.events().len(), 3);
        assert_eq!(source.errors().len(), 2);
        assert_eq!(source.warnings()[0].line_index, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_writes_file() {
        let api = job_api(3);
        let source = job_source(&api);
        source.initialize().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = source.download(false, dir.path()).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "horde-job1-Compile_Editor.txt"
        );
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, "line 0\nline 1\nline 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_initialize() {
        let api = job_api(3);
        let source = job_source(&api);
        assert!(matches!(
            source.refresh().await,
            Err(SourceError::NotInitialized)
        ));
        assert!(source.download_file_name(DownloadFormat::Text).is_err());
        assert_eq!(source.summary(), "Log log1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let api = job_api(3);
        let source = job_source(&api);
        source.initialize().await.unwrap();
        drop(source);

        api.clear_calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("horde-1-Compile/Cook: Win64"), "horde-1-Compile_Cook__Win64");
    }
}
