//! Linkage between a log and the job batch or step that wrote it.

use tracing::{debug, warn};

use hordelog_api::{ApiError, HordeApi};
use hordelog_types::{BatchRecord, Crumb, IssueRecord, JobRecord, JobStepState, LogRecord, StepRecord};

use crate::error::{Result, SourceError};

/// Owning job of a log, resolved down to its batch and (optionally) step
#[derive(Clone, Debug)]
pub struct JobLink {
    job: JobRecord,
    batch_id: String,
    step_id: Option<String>,
    issues: Vec<IssueRecord>,
}

impl JobLink {
    /// Fetch the job named by the log record and locate the owning step or batch
    pub async fn resolve(api: &dyn HordeApi, log: &LogRecord) -> Result<Self> {
        let job_id = log
            .job_id
            .as_deref()
            .ok_or_else(|| SourceError::Unresolved(format!("log {} has no owning job", log.id)))?;

        let job = api.get_job(job_id).await.map_err(|e| {
            SourceError::Unresolved(format!("unable to fetch job {} for log {}: {}", job_id, log.id, e))
        })?;

        let (batch_id, step_id) = match job.find_log_owner(&log.id) {
            Some((batch, step)) => (batch.id.clone(), step.map(|s| s.id.clone())),
            None => {
                return Err(SourceError::Unresolved(format!(
                    "unable to find step or batch for log {}",
                    log.id
                )));
            }
        };
        debug!(log_id = %log.id, job_id, batch_id = %batch_id, step_id = ?step_id, "Resolved log owner");

        let issues = match step_id.as_deref() {
            Some(step_id) => api.get_issues(job_id, Some(step_id), None).await,
            None => api.get_issues(job_id, None, Some(&batch_id)).await,
        };
        let issues = issues.unwrap_or_else(|e| {
            warn!(job_id, error = %e, "Failed to fetch issues");
            Vec::new()
        });

        Ok(Self {
            job,
            batch_id,
            step_id,
            issues,
        })
    }

    /// Re-fetch the job. Returns whether the owner has finished.
    pub async fn refresh(&mut self, api: &dyn HordeApi) -> std::result::Result<bool, ApiError> {
        self.job = api.get_job(&self.job.id).await?;
        Ok(self.is_finished())
    }

    pub fn job(&self) -> &JobRecord {
        &self.job
    }

    pub fn batch(&self) -> Option<&BatchRecord> {
        self.job.batches.iter().find(|b| b.id == self.batch_id)
    }

    pub fn step(&self) -> Option<&StepRecord> {
        let step_id = self.step_id.as_deref()?;
        self.batch()?.steps.iter().find(|s| s.id == step_id)
    }

    pub fn issues(&self) -> &[IssueRecord] {
        &self.issues
    }

    /// True once the owning step (or batch, for batch logs) has a finish time
    pub fn is_finished(&self) -> bool {
        if self.step_id.is_some() {
            return self.step().is_some_and(|s| s.finish_time.is_some());
        }
        self.batch().is_some_and(|b| b.finish_time.is_some())
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.batch()?.agent_id.as_deref()
    }

    pub fn summary(&self) -> String {
        if let Some(step) = self.step() {
            return format!(
                "{} {} ({})",
                step.name,
                step.state.label(),
                step.outcome.label()
            );
        }
        match self.batch() {
            Some(batch) => format!(
                "Batch {} {} on {}",
                batch.id,
                batch.state.label(),
                batch.agent_id.as_deref().unwrap_or("unassigned agent")
            ),
            None => format!("Batch {}", self.batch_id),
        }
    }

    /// Completed steps of the owning batch as a percentage
    pub fn percent_complete(&self) -> Option<f64> {
        let batch = self.batch()?;
        if batch.steps.is_empty() {
            return None;
        }
        let completed = batch
            .steps
            .iter()
            .filter(|s| s.state == JobStepState::Completed)
            .count();
        Some(completed as f64 / batch.steps.len() as f64 * 100.0)
    }

    pub fn crumbs(&self) -> Vec<Crumb> {
        let mut crumbs = vec![
            Crumb::new(
                self.job.stream_id.clone(),
                format!("/stream/{}", self.job.stream_id),
            ),
            Crumb::new(self.job.name.clone(), format!("/job/{}", self.job.id)),
        ];
        if let Some(step) = self.step() {
            crumbs.push(Crumb::new(
                step.name.clone(),
                format!("/job/{}?step={}", self.job.id, step.id),
            ));
        }
        crumbs
    }

    pub fn crumb_title(&self) -> String {
        match self.step() {
            Some(step) => step.name.clone(),
            None => format!("Batch {}", self.batch_id),
        }
    }

    /// File stem for downloads, before sanitizing
    pub fn download_stem(&self) -> String {
        match self.step() {
            Some(step) => format!("horde-{}-{}", self.job.id, step.name),
            None => format!("horde-{}-batch-{}", self.job.id, self.batch_id),
        }
    }
}
