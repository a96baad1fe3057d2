//! Parsing of log references given on the command line or copied from the
//! dashboard.

use url::Url;

use crate::error::{Result, SourceError};

/// Query parameters that select the log source variant
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceQuery {
    /// Present for agent lease logs
    pub lease_id: Option<String>,
}

impl SourceQuery {
    /// Query for a lease-backed log
    pub fn lease(lease_id: impl Into<String>) -> Self {
        Self {
            lease_id: Some(lease_id.into()),
        }
    }

    /// Parse `key=value&...` pairs, ignoring unknown keys
    pub fn from_query_string(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            if key == "leaseId" && !value.is_empty() {
                parsed.lease_id = Some(value.into_owned());
            }
        }
        parsed
    }
}

/// A log id plus the query that came with it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogTarget {
    pub log_id: String,
    pub query: SourceQuery,
}

impl LogTarget {
    pub fn new(log_id: impl Into<String>, query: SourceQuery) -> Self {
        Self {
            log_id: log_id.into(),
            query,
        }
    }
}

/// Resolve a bare log id, `id?leaseId=...`, or a dashboard URL such as
/// `https://horde/log/{id}?leaseId=...`.
pub fn resolve_target(reference: &str) -> Result<LogTarget> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(SourceError::InvalidTarget("empty log reference".to_string()));
    }

    if reference.contains("://") {
        let url = Url::parse(reference)
            .map_err(|e| SourceError::InvalidTarget(format!("{}: {}", reference, e)))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // Prefer the segment following `log`/`logs`, else the last one
        let log_id = segments
            .windows(2)
            .find(|w| w[0] == "log" || w[0] == "logs")
            .map(|w| w[1])
            .or_else(|| segments.last().copied())
            .ok_or_else(|| SourceError::InvalidTarget(format!("no log id in {}", reference)))?;

        let query = SourceQuery::from_query_string(url.query().unwrap_or_default());
        return Ok(LogTarget::new(log_id, query));
    }

    let (log_id, query) = match reference.split_once('?') {
        Some((id, query)) => (id, SourceQuery::from_query_string(query)),
        None => (reference, SourceQuery::default()),
    };
    if log_id.is_empty() {
        return Err(SourceError::InvalidTarget(format!("no log id in {}", reference)));
    }
    Ok(LogTarget::new(log_id, query))
}
