use async_trait::async_trait;

use hordelog_types::{
    AgentRecord, DownloadFormat, IssueRecord, JobRecord, LeaseRecord, LogEvent, LogLinesResponse,
    LogRecord,
};

use crate::error::Result;

/// Remote data client used by log sources.
///
/// Implementations must be cheap to share behind an `Arc`; every call is an
/// independent request and carries no session state.
#[async_trait]
pub trait HordeApi: Send + Sync {
    /// Fetch log metadata (id, line count, owner)
    async fn get_log(&self, log_id: &str) -> Result<LogRecord>;

    /// Fetch `count` lines starting at `index`
    async fn get_log_lines(&self, log_id: &str, index: usize, count: usize)
    -> Result<LogLinesResponse>;

    /// Fetch diagnostic events for a log
    async fn get_log_events(&self, log_id: &str) -> Result<Vec<LogEvent>>;

    /// Fetch a job with its batches and steps
    async fn get_job(&self, job_id: &str) -> Result<JobRecord>;

    /// Fetch issues attached to a job, narrowed to a step or batch
    async fn get_issues(
        &self,
        job_id: &str,
        step_id: Option<&str>,
        batch_id: Option<&str>,
    ) -> Result<Vec<IssueRecord>>;

    /// Fetch a lease
    async fn get_lease(&self, lease_id: &str) -> Result<LeaseRecord>;

    /// Fetch an agent
    async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord>;

    /// Download the full log body
    async fn download_log(&self, log_id: &str, format: DownloadFormat) -> Result<Vec<u8>>;
}
