//! Linkage between a log and the agent lease that wrote it.

use tracing::{debug, warn};

use hordelog_api::{ApiError, HordeApi};
use hordelog_types::{AgentRecord, Crumb, LeaseRecord};

use crate::error::{Result, SourceError};

/// Lease that owns a log, plus its agent when known
#[derive(Clone, Debug)]
pub struct LeaseLink {
    lease: LeaseRecord,
    agent: Option<AgentRecord>,
}

impl LeaseLink {
    /// Fetch the lease; the agent lookup is best-effort
    pub async fn resolve(api: &dyn HordeApi, log_id: &str, lease_id: &str) -> Result<Self> {
        let lease = api.get_lease(lease_id).await.map_err(|e| {
            SourceError::Unresolved(format!(
                "unable to fetch lease {} for log {}: {}",
                lease_id, log_id, e
            ))
        })?;

        let agent = match lease.agent_id.as_deref() {
            Some(agent_id) => match api.get_agent(agent_id).await {
                Ok(agent) => Some(agent),
                Err(e) => {
                    warn!(agent_id, error = %e, "Failed to fetch agent");
                    None
                }
            },
            None => None,
        };
        debug!(log_id, lease_id, agent = ?lease.agent_id, "Resolved lease");

        Ok(Self { lease, agent })
    }

    /// Re-fetch the lease. Returns whether it has finished.
    pub async fn refresh(&mut self, api: &dyn HordeApi) -> std::result::Result<bool, ApiError> {
        self.lease = api.get_lease(&self.lease.id).await?;
        Ok(self.is_finished())
    }

    pub fn lease(&self) -> &LeaseRecord {
        &self.lease
    }

    pub fn agent(&self) -> Option<&AgentRecord> {
        self.agent.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.lease.finish_time.is_some()
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.lease.agent_id.as_deref()
    }

    fn agent_name(&self) -> &str {
        match (&self.agent, self.lease.agent_id.as_deref()) {
            (Some(agent), _) => agent.display_name(),
            (None, Some(id)) => id,
            (None, None) => "unknown agent",
        }
    }

    pub fn summary(&self) -> String {
        let status = if self.is_finished() {
            format!("({})", self.lease.outcome.label())
        } else {
            "(running)".to_string()
        };
        format!("{} on {} {}", self.lease.name, self.agent_name(), status)
    }

    pub fn percent_complete(&self) -> Option<f64> {
        self.is_finished().then_some(100.0)
    }

    pub fn crumbs(&self) -> Vec<Crumb> {
        let mut crumbs = vec![Crumb::new("Agents", "/agents")];
        if let Some(agent_id) = self.agent_id() {
            crumbs.push(Crumb::new(agent_id, format!("/agents?agentId={}", agent_id)));
        }
        crumbs
    }

    pub fn crumb_title(&self) -> String {
        format!("Lease {}", self.lease.name)
    }

    pub fn download_stem(&self) -> String {
        format!("horde-lease-{}", self.lease.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hordelog_api::{MockHordeApi, MockOp};
    use hordelog_types::LeaseOutcome;

    fn lease() -> LeaseRecord {
        let mut lease = LeaseRecord::new("L1", "Conform workspace");
        lease.agent_id = Some("AGENT-3".to_string());
        lease
    }

    #[tokio::test]
    async fn test_resolve_with_agent() {
        let mut agent = AgentRecord::new("AGENT-3");
        agent.name = Some("build-03".to_string());
        let api = MockHordeApi::new().with_lease(lease()).with_agent(agent);

        let link = LeaseLink::resolve(&api, "log1", "L1").await.unwrap();
        assert_eq!(link.summary(), "Conform workspace on build-03 (running)");
        assert_eq!(link.crumb_title(), "Lease Conform workspace");
        assert_eq!(link.percent_complete(), None);

        let crumbs = link.crumbs();
        assert_eq!(crumbs[0].text, "Agents");
        assert_eq!(crumbs[1].link.as_deref(), Some("/agents?agentId=AGENT-3"));
    }

    #[tokio::test]
    async fn test_agent_failure_is_best_effort() {
        let api = MockHordeApi::new().with_lease(lease());
        let link = LeaseLink::resolve(&api, "log1", "L1").await.unwrap();
        assert!(link.agent().is_none());
        assert_eq!(link.summary(), "Conform workspace on AGENT-3 (running)");
    }

    #[tokio::test]
    async fn test_missing_lease_is_fatal() {
        let api = MockHordeApi::new();
        api.set_failing(MockOp::GetLease, true);
        let err = LeaseLink::resolve(&api, "log1", "L1").await.unwrap_err();
        assert!(matches!(err, SourceError::Unresolved(_)));
    }

    #[tokio::test]
    async fn test_refresh_observes_finish() {
        let api = MockHordeApi::new().with_lease(lease());
        let mut link = LeaseLink::resolve(&api, "log1", "L1").await.unwrap();

        api.update_lease("L1", |lease| {
            lease.finish_time = Some(Utc::now());
            lease.outcome = LeaseOutcome::Success;
        });
        assert!(link.refresh(&api).await.unwrap());
        assert_eq!(link.summary(), "Conform workspace on AGENT-3 (Success)");
        assert_eq!(link.percent_complete(), Some(100.0));
        assert_eq!(link.download_stem(), "horde-lease-L1");
    }
}
