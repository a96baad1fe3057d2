//! Shared types for hordelog
//!
//! This crate contains the wire records returned by the Horde REST API and the
//! small domain types shared by the log, API and TUI crates.

use chrono::{DateTime, Utc};
use ratatui::style::Color;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl LogLevel {
    /// Parse log level from common formats
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" | "trc" | "trce" => Self::Trace,
            "debug" | "dbg" | "debg" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" | "erro" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "ftl" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Name used by the server for this level
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Info => "Information",
            Self::Warn => "Warning",
            Self::Error => "Error",
            Self::Fatal => "Critical",
            Self::Unknown => "Unknown",
        }
    }

    /// Get display color for this level
    pub fn color(&self) -> Color {
        match self {
            Self::Trace => Color::DarkGray,
            Self::Debug => Color::Cyan,
            Self::Info => Color::Green,
            Self::Warn => Color::Yellow,
            Self::Error => Color::Red,
            Self::Fatal => Color::Magenta,
            Self::Unknown => Color::White,
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Unknown => "???",
        }
    }

    /// Whether this level counts as an error
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str(&s))
    }
}

/// Log metadata as reported by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: String,

    /// Number of lines written so far
    #[serde(default)]
    pub line_count: usize,

    /// Owning job (job and batch/step logs)
    #[serde(default)]
    pub job_id: Option<String>,

    /// Owning lease (agent lease logs)
    #[serde(default)]
    pub lease_id: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,
}

impl LogRecord {
    pub fn new(id: impl Into<String>, line_count: usize) -> Self {
        Self {
            id: id.into(),
            line_count,
            job_id: None,
            lease_id: None,
            session_id: None,
        }
    }
}

/// A single structured log line
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub level: LogLevel,

    /// Plain rendering of the line
    #[serde(default)]
    pub message: String,

    /// Message template with `{Name}` placeholders
    #[serde(default)]
    pub format: Option<String>,

    /// Values for the template placeholders
    #[serde(default)]
    pub properties: Option<HashMap<String, serde_json::Value>>,
}

impl LogLine {
    /// Create a plain line with the given level and message
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            time: None,
            level,
            message: message.into(),
            format: None,
            properties: None,
        }
    }
}

/// Response to a line range request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLinesResponse {
    pub index: usize,
    pub count: usize,
    #[serde(default)]
    pub max_line_count: usize,
    #[serde(default)]
    pub lines: Vec<LogLine>,
}

/// Severity attached to a log event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventSeverity {
    Information,
    Warning,
    Error,
    #[default]
    #[serde(other)]
    Unspecified,
}

/// A diagnostic event spanning one or more log lines
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default)]
    pub severity: EventSeverity,
    pub line_index: usize,
    #[serde(default = "default_event_lines")]
    pub line_count: usize,
    #[serde(default)]
    pub issue_id: Option<i64>,
}

fn default_event_lines() -> usize {
    1
}

impl LogEvent {
    pub fn new(severity: EventSeverity, line_index: usize, line_count: usize) -> Self {
        Self {
            severity,
            line_index,
            line_count,
            issue_id: None,
        }
    }
}

// ============================================================================
// Job Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStepState {
    Waiting,
    Ready,
    Skipped,
    Running,
    Completed,
    Aborted,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl JobStepState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Waiting => "Waiting",
            Self::Ready => "Ready",
            Self::Skipped => "Skipped",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Aborted => "Aborted",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStepOutcome {
    Failure,
    Warnings,
    Success,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl JobStepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Failure => "Failure",
            Self::Warnings => "Warnings",
            Self::Success => "Success",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchState {
    Waiting,
    Ready,
    Starting,
    Running,
    Stopping,
    Complete,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl BatchState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Waiting => "Waiting",
            Self::Ready => "Ready",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Complete => "Complete",
        }
    }
}

/// A single step within a batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: JobStepState,
    #[serde(default)]
    pub outcome: JobStepOutcome,
    #[serde(default)]
    pub log_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: JobStepState::Waiting,
            outcome: JobStepOutcome::Unspecified,
            log_id: None,
            start_time: None,
            finish_time: None,
        }
    }
}

/// A group of steps executed on one agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: String,
    #[serde(default)]
    pub log_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub state: BatchState,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl BatchRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log_id: None,
            agent_id: None,
            state: BatchState::Waiting,
            start_time: None,
            finish_time: None,
            steps: Vec::new(),
        }
    }
}

/// Job record with nested batches and steps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stream_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub change: Option<i64>,
    #[serde(default)]
    pub batches: Vec<BatchRecord>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stream_id: stream_id.into(),
            template_id: None,
            change: None,
            batches: Vec::new(),
        }
    }

    /// Find the batch and (optionally) step that own the given log
    pub fn find_log_owner(&self, log_id: &str) -> Option<(&BatchRecord, Option<&StepRecord>)> {
        for batch in &self.batches {
            if let Some(step) = batch
                .steps
                .iter()
                .find(|s| s.log_id.as_deref() == Some(log_id))
            {
                return Some((batch, Some(step)));
            }
        }
        self.batches
            .iter()
            .find(|b| b.log_id.as_deref() == Some(log_id))
            .map(|b| (b, None))
    }
}

/// Issue associated with a job step or batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    pub id: i64,
    pub summary: String,
    #[serde(default)]
    pub severity: EventSeverity,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Agent Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeaseOutcome {
    Success,
    Failed,
    Cancelled,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl LeaseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// A unit of work handed to an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub log_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: LeaseOutcome,
}

impl LeaseRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_id: None,
            log_id: None,
            start_time: None,
            finish_time: None,
            outcome: LeaseOutcome::Unspecified,
        }
    }
}

/// Build agent information
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub online: bool,
}

impl AgentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            enabled: true,
            online: true,
        }
    }

    /// Name to show for this agent
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// View Types
// ============================================================================

/// One entry of a breadcrumb trail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crumb {
    pub text: String,
    pub link: Option<String>,
}

impl Crumb {
    pub fn new(text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: Some(link.into()),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
        }
    }
}

/// Format of a full log download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DownloadFormat {
    #[default]
    Text,
    Json,
}

impl DownloadFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    /// Value of the `format` query parameter
    pub fn query_value(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "raw",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_server_names() {
        let line: LogLine =
            serde_json::from_str(r#"{"level":"Warning","message":"careful"}"#).unwrap();
        assert_eq!(line.level, LogLevel::Warn);

        let line: LogLine = serde_json::from_str(r#"{"level":"Critical","message":"x"}"#).unwrap();
        assert_eq!(line.level, LogLevel::Fatal);

        let line: LogLine = serde_json::from_str(r#"{"message":"no level"}"#).unwrap();
        assert_eq!(line.level, LogLevel::Info);
    }

    #[test]
    fn test_unknown_enum_values_decode() {
        let step: StepRecord = serde_json::from_str(
            r#"{"id":"1","name":"Compile","state":"SomethingNew","outcome":"Success"}"#,
        )
        .unwrap();
        assert_eq!(step.state, JobStepState::Unspecified);
        assert_eq!(step.outcome, JobStepOutcome::Success);

        let severity: EventSeverity = serde_json::from_str(r#""Critical""#).unwrap();
        assert_eq!(severity, EventSeverity::Unspecified);
        let outcome: LeaseOutcome = serde_json::from_str(r#""Failed""#).unwrap();
        assert_eq!(outcome, LeaseOutcome::Failed);
        assert_eq!(BatchState::default(), BatchState::Unspecified);
    }

    #[test]
    fn test_log_record_camel_case() {
        let record: LogRecord =
            serde_json::from_str(r#"{"id":"abc","lineCount":42,"jobId":"j1"}"#).unwrap();
        assert_eq!(record.line_count, 42);
        assert_eq!(record.job_id.as_deref(), Some("j1"));
        assert!(record.lease_id.is_none());
    }

    #[test]
    fn test_find_log_owner_prefers_step() {
        let mut job = JobRecord::new("j1", "Nightly", "ue5-main");
        let mut batch = BatchRecord::new("b1");
        batch.log_id = Some("batch-log".to_string());
        let mut step = StepRecord::new("s1", "Compile");
        step.log_id = Some("step-log".to_string());
        batch.steps.push(step);
        job.batches.push(batch);

        let (batch, step) = job.find_log_owner("step-log").unwrap();
        assert_eq!(batch.id, "b1");
        assert_eq!(step.unwrap().id, "s1");

        let (batch, step) = job.find_log_owner("batch-log").unwrap();
        assert_eq!(batch.id, "b1");
        assert!(step.is_none());

        assert!(job.find_log_owner("missing").is_none());
    }
}
