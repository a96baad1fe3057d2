//! Mock Horde API for unit testing.
//!
//! Serves logs, jobs, leases and agents from memory, records every call, and
//! can be told to fail individual operations.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use hordelog_types::{
    AgentRecord, DownloadFormat, IssueRecord, JobRecord, LeaseRecord, LogEvent, LogLine,
    LogLinesResponse, LogRecord,
};

use crate::api::HordeApi;
use crate::error::{ApiError, Result};

/// Operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOp {
    GetLog,
    GetLines,
    GetEvents,
    GetJob,
    GetIssues,
    GetLease,
    GetAgent,
    Download,
}

/// A recorded call to the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    GetLog(String),
    GetLines { log_id: String, index: usize, count: usize },
    GetEvents(String),
    GetJob(String),
    GetIssues(String),
    GetLease(String),
    GetAgent(String),
    Download(String),
}

#[derive(Default)]
struct MockState {
    logs: HashMap<String, LogRecord>,
    lines: HashMap<String, Vec<LogLine>>,
    events: HashMap<String, Vec<LogEvent>>,
    jobs: HashMap<String, JobRecord>,
    issues: HashMap<String, Vec<IssueRecord>>,
    leases: HashMap<String, LeaseRecord>,
    agents: HashMap<String, AgentRecord>,
    failing: HashSet<MockOp>,
}

/// In-memory implementation of [`HordeApi`].
pub struct MockHordeApi {
    state: Mutex<MockState>,
    calls: Mutex<Vec<MockCall>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for MockHordeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHordeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            calls: Mutex::new(Vec::new()),
            latency: Mutex::new(None),
        }
    }

    /// Register a log and its lines; the record's line count follows `lines`.
    pub fn with_log(self, mut record: LogRecord, lines: Vec<LogLine>) -> Self {
        record.line_count = lines.len();
        {
            let mut state = self.state.lock();
            state.lines.insert(record.id.clone(), lines);
            state.logs.insert(record.id.clone(), record);
        }
        self
    }

    pub fn with_events(self, log_id: &str, events: Vec<LogEvent>) -> Self {
        self.state.lock().events.insert(log_id.to_string(), events);
        self
    }

    pub fn with_job(self, job: JobRecord) -> Self {
        self.state.lock().jobs.insert(job.id.clone(), job);
        self
    }

    pub fn with_issues(self, job_id: &str, issues: Vec<IssueRecord>) -> Self {
        self.state.lock().issues.insert(job_id.to_string(), issues);
        self
    }

    pub fn with_lease(self, lease: LeaseRecord) -> Self {
        self.state.lock().leases.insert(lease.id.clone(), lease);
        self
    }

    pub fn with_agent(self, agent: AgentRecord) -> Self {
        self.state.lock().agents.insert(agent.id.clone(), agent);
        self
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Append lines to a registered log, growing its line count.
    pub fn append_lines(&self, log_id: &str, new_lines: Vec<LogLine>) {
        let mut state = self.state.lock();
        let count = {
            let lines = state.lines.entry(log_id.to_string()).or_default();
            lines.extend(new_lines);
            lines.len()
        };
        if let Some(record) = state.logs.get_mut(log_id) {
            record.line_count = count;
        }
    }

    /// Mutate a registered job in place.
    pub fn update_job<F: FnOnce(&mut JobRecord)>(&self, job_id: &str, f: F) {
        if let Some(job) = self.state.lock().jobs.get_mut(job_id) {
            f(job);
        }
    }

    /// Mutate a registered lease in place.
    pub fn update_lease<F: FnOnce(&mut LeaseRecord)>(&self, lease_id: &str, f: F) {
        if let Some(lease) = self.state.lock().leases.get_mut(lease_id) {
            f(lease);
        }
    }

    /// Make an operation fail (or succeed again) until changed.
    pub fn set_failing(&self, op: MockOp, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls matching a predicate.
    pub fn count_calls<F: Fn(&MockCall) -> bool>(&self, predicate: F) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Recorded line range requests as `(index, count)` pairs.
    pub fn line_requests(&self) -> Vec<(usize, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::GetLines { index, count, .. } => Some((*index, *count)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn enter(&self, op: MockOp, call: MockCall) -> Result<()> {
        self.calls.lock().push(call);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.state.lock().failing.contains(&op) {
            return Err(ApiError::Unavailable(format!("{:?} disabled by mock", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl HordeApi for MockHordeApi {
    async fn get_log(&self, log_id: &str) -> Result<LogRecord> {
        self.enter(MockOp::GetLog, MockCall::GetLog(log_id.to_string()))
            .await?;
        self.state
            .lock()
            .logs
            .get(log_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("log {}", log_id)))
    }

    async fn get_log_lines(
        &self,
        log_id: &str,
        index: usize,
        count: usize,
    ) -> Result<LogLinesResponse> {
        self.enter(
            MockOp::GetLines,
            MockCall::GetLines {
                log_id: log_id.to_string(),
                index,
                count,
            },
        )
        .await?;

        let state = self.state.lock();
        let lines = state
            .lines
            .get(log_id)
            .ok_or_else(|| ApiError::NotFound(format!("log {}", log_id)))?;
        let start = index.min(lines.len());
        let end = index.saturating_add(count).min(lines.len());
        let slice = lines[start..end].to_vec();

        Ok(LogLinesResponse {
            index: start,
            count: slice.len(),
            max_line_count: lines.len(),
            lines: slice,
        })
    }

    async fn get_log_events(&self, log_id: &str) -> Result<Vec<LogEvent>> {
        self.enter(MockOp::GetEvents, MockCall::GetEvents(log_id.to_string()))
            .await?;
        Ok(self
            .state
            .lock()
            .events
            .get(log_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        self.enter(MockOp::GetJob, MockCall::GetJob(job_id.to_string()))
            .await?;
        self.state
            .lock()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("job {}", job_id)))
    }

    async fn get_issues(
        &self,
        job_id: &str,
        _step_id: Option<&str>,
        _batch_id: Option<&str>,
    ) -> Result<Vec<IssueRecord>> {
        self.enter(MockOp::GetIssues, MockCall::GetIssues(job_id.to_string()))
            .await?;
        Ok(self
            .state
            .lock()
            .issues
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_lease(&self, lease_id: &str) -> Result<LeaseRecord> {
        self.enter(MockOp::GetLease, MockCall::GetLease(lease_id.to_string()))
            .await?;
        self.state
            .lock()
            .leases
            .get(lease_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("lease {}", lease_id)))
    }

    async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord> {
        self.enter(MockOp::GetAgent, MockCall::GetAgent(agent_id.to_string()))
            .await?;
        self.state
            .lock()
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("agent {}", agent_id)))
    }

    async fn download_log(&self, log_id: &str, format: DownloadFormat) -> Result<Vec<u8>> {
        self.enter(MockOp::Download, MockCall::Download(log_id.to_string()))
            .await?;
        let state = self.state.lock();
        let lines = state
            .lines
            .get(log_id)
            .ok_or_else(|| ApiError::NotFound(format!("log {}", log_id)))?;

        let body = match format {
            DownloadFormat::Text => lines
                .iter()
                .map(|l| l.message.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            DownloadFormat::Json => lines
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?
                .join("\n"),
        };
        Ok(body.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hordelog_types::LogLevel;

    fn lines(n: usize) -> Vec<LogLine> {
        (0..n)
            .map(|i| LogLine::new(LogLevel::Info, format!("line {}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_lines_are_clamped() {
        let api = MockHordeApi::new().with_log(LogRecord::new("log", 0), lines(10));

        let resp = api.get_log_lines("log", 8, 5).await.unwrap();
        assert_eq!(resp.index, 8);
        assert_eq!(resp.count, 2);
        assert_eq!(resp.max_line_count, 10);
        assert_eq!(resp.lines[1].message, "line 9");

        let resp = api.get_log_lines("log", 20, 5).await.unwrap();
        assert_eq!(resp.count, 0);
    }

    #[tokio::test]
    async fn test_append_grows_line_count() {
        let api = MockHordeApi::new().with_log(LogRecord::new("log", 0), lines(3));
        assert_eq!(api.get_log("log").await.unwrap().line_count, 3);

        api.append_lines("log", lines(2));
        assert_eq!(api.get_log("log").await.unwrap().line_count, 5);
    }

    #[tokio::test]
    async fn test_failure_injection_and_recording() {
        let api = MockHordeApi::new().with_log(LogRecord::new("log", 0), lines(1));
        api.set_failing(MockOp::GetLog, true);
        assert!(matches!(
            api.get_log("log").await,
            Err(ApiError::Unavailable(_))
        ));

        api.set_failing(MockOp::GetLog, false);
        assert!(api.get_log("log").await.is_ok());
        assert_eq!(api.count_calls(|c| matches!(c, MockCall::GetLog(_))), 2);
    }

    #[tokio::test]
    async fn test_download_formats() {
        let api = MockHordeApi::new().with_log(LogRecord::new("log", 0), lines(2));
        let text = api.download_log("log", DownloadFormat::Text).await.unwrap();
        assert_eq!(String::from_utf8(text).unwrap(), "line 0\nline 1");

        let json = api.download_log("log", DownloadFormat::Json).await.unwrap();
        let json = String::from_utf8(json).unwrap();
        assert_eq!(json.lines().count(), 2);
        assert!(json.contains(r#""message":"line 0""#));
    }
}
