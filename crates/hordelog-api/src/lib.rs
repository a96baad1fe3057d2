//! Horde REST client for hordelog
//!
//! This crate provides the [`HordeApi`] trait used by log sources to reach
//! the server, an HTTP implementation, and a recording mock for tests.

mod api;
mod client;
mod error;
pub mod mock;

pub use api::HordeApi;
pub use client::{ClientConfig, HordeClient};
pub use error::{ApiError, Result};
pub use mock::{MockCall, MockHordeApi, MockOp};

// Re-export types that are used in our public API
pub use hordelog_types::{
    AgentRecord, DownloadFormat, IssueRecord, JobRecord, LeaseRecord, LogEvent, LogLinesResponse,
    LogRecord,
};
