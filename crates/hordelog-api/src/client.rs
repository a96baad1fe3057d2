//! HTTP client for the Horde REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use hordelog_types::{
    AgentRecord, DownloadFormat, IssueRecord, JobRecord, LeaseRecord, LogEvent, LogLinesResponse,
    LogRecord,
};

use crate::api::HordeApi;
use crate::error::{ApiError, Result};

/// Connection settings for [`HordeClient`]
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server root, e.g. `https://horde.example.com`
    pub server_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// Horde REST client wrapper
pub struct HordeClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HordeClient {
    /// Create a new client for the configured server
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.server_url)?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("hordelog/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            token: config.token.clone(),
        })
    }

    /// Server root this client talks to
    pub fn server_url(&self) -> &Url {
        &self.base
    }

    /// Build `{server}/api/v1/{segments...}` with each segment percent-encoded
    fn endpoint<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    async fn send(&self, url: Url) -> Result<Vec<u8>> {
        debug!(%url, "GET");
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self.send(url).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl HordeApi for HordeClient {
    async fn get_log(&self, log_id: &str) -> Result<LogRecord> {
        self.get_json(self.endpoint(["logs", log_id])).await
    }

    async fn get_log_lines(
        &self,
        log_id: &str,
        index: usize,
        count: usize,
    ) -> Result<LogLinesResponse> {
        let mut url = self.endpoint(["logs", log_id, "lines"]);
        url.query_pairs_mut()
            .append_pair("index", &index.to_string())
            .append_pair("count", &count.to_string());
        self.get_json(url).await
    }

    async fn get_log_events(&self, log_id: &str) -> Result<Vec<LogEvent>> {
        self.get_json(self.endpoint(["logs", log_id, "events"]))
            .await
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        self.get_json(self.endpoint(["jobs", job_id])).await
    }

    async fn get_issues(
        &self,
        job_id: &str,
        step_id: Option<&str>,
        batch_id: Option<&str>,
    ) -> Result<Vec<IssueRecord>> {
        let mut url = self.endpoint(["issues"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("jobId", job_id);
            if let Some(step_id) = step_id {
                query.append_pair("stepId", step_id);
            }
            if let Some(batch_id) = batch_id {
                query.append_pair("batchId", batch_id);
            }
        }
        self.get_json(url).await
    }

    async fn get_lease(&self, lease_id: &str) -> Result<LeaseRecord> {
        self.get_json(self.endpoint(["leases", lease_id])).await
    }

    async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord> {
        self.get_json(self.endpoint(["agents", agent_id])).await
    }

    async fn download_log(&self, log_id: &str, format: DownloadFormat) -> Result<Vec<u8>> {
        let mut url = self.endpoint(["logs", log_id, "data"]);
        url.query_pairs_mut()
            .append_pair("format", format.query_value());
        self.send(url).await
    }
}
