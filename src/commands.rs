//! Non-interactive commands: print, info and download

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use tracing::debug;

use hordelog_logs::{
    CompiledFilter, FilterPresets, LineFormatter, LoadOutcome, LogSource, SourcePhase,
};

/// Lowest level `print` keeps
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MinLevel {
    Warning,
    Error,
}

/// Options for `print`
#[derive(Debug, Default)]
pub struct PrintOptions {
    pub follow: bool,
    pub grep: Option<String>,
    pub ignore_case: bool,
    pub min_level: Option<MinLevel>,
    pub invert: bool,
    pub page_size: usize,
}

impl PrintOptions {
    /// Combine `grep`, `min_level` and `invert`; `None` prints everything
    fn filter(&self) -> Result<Option<CompiledFilter>> {
        let text = match &self.grep {
            Some(pattern) if self.ignore_case => Some(CompiledFilter::new_case_insensitive(pattern)),
            Some(pattern) => Some(CompiledFilter::new(pattern)),
            None => None,
        }
        .transpose()
        .context("invalid --grep pattern")?;

        let levels = self.min_level.map(|level| match level {
            MinLevel::Warning => FilterPresets::warnings_and_above(),
            MinLevel::Error => FilterPresets::errors_only(),
        });

        let filter = match (text, levels) {
            (Some(text), Some(levels)) => Some(text.with_levels(levels.levels().clone())),
            (text, levels) => text.or(levels),
        };
        Ok(match filter {
            Some(filter) if self.invert => Some(filter.inverted()),
            filter => filter,
        })
    }
}

/// Write rendered lines to `out`, page by page; with `follow`, keep going
/// until the log's owner finishes
pub async fn print(source: &LogSource, options: &PrintOptions, out: &mut impl Write) -> Result<()> {
    let filter = options.filter()?;

    source.initialize().await.context("failed to load log")?;
    let follow = options.follow && !source.poll_interval().is_zero();
    if !follow {
        source.stop_polling();
    }

    let page_size = options.page_size.max(1);
    let mut snapshots = source.subscribe();
    let mut next = 0;
    loop {
        // Read before draining so a finish seen here still gets a full pass.
        let finished = !matches!(
            snapshots.borrow_and_update().phase,
            SourcePhase::Active | SourcePhase::Inactive
        );
        while next < source.line_count() {
            let count = page_size.min(source.line_count() - next);
            if source.load_lines(next, count).await == LoadOutcome::Failed {
                bail!("failed to fetch lines {}..{}", next, next + count);
            }
            for index in next..next + count {
                let Some(line) = source.line(index) else {
                    continue;
                };
                if filter.as_ref().is_none_or(|f| f.matches(&line)) {
                    writeln!(out, "{}", LineFormatter::render(&line))?;
                }
            }
            next += count;
        }
        out.flush()?;

        if !follow || finished {
            break;
        }
        debug!(printed = next, "Waiting for more lines");
        if snapshots.changed().await.is_err() {
            break;
        }
    }

    source.stop_polling();
    Ok(())
}

/// Describe the log and its owner
pub async fn info(source: &LogSource, out: &mut impl Write) -> Result<()> {
    source.initialize().await.context("failed to load log")?;
    source.stop_polling();

    writeln!(out, "{}", source.summary())?;

    let path: Vec<String> = source
        .crumbs()
        .into_iter()
        .map(|crumb| crumb.text)
        .chain(std::iter::once(source.crumb_title()))
        .collect();
    writeln!(out, "  path:      {}", path.join(" › "))?;
    writeln!(out, "  log:       {}", source.log_id())?;
    if let Some(agent) = source.agent_id() {
        writeln!(out, "  agent:     {}", agent)?;
    }
    let status = if source.is_active() { "running" } else { "finished" };
    writeln!(out, "  status:    {}", status)?;
    if let Some(percent) = source.percent_complete() {
        writeln!(out, "  progress:  {:.0}%", percent)?;
    }
    writeln!(out, "  lines:     {}", source.line_count())?;
    writeln!(out, "  errors:    {}", source.errors().len())?;
    writeln!(out, "  warnings:  {}", source.warnings().len())?;

    let issues = source.issues();
    if !issues.is_empty() {
        writeln!(out, "  issues:")?;
        for issue in issues {
            let resolved = if issue.resolved_at.is_some() { " (resolved)" } else { "" };
            writeln!(out, "    #{} {}{}", issue.id, issue.summary, resolved)?;
        }
    }
    Ok(())
}

/// Save the whole log into `dir`
pub async fn download(source: &LogSource, json: bool, dir: &Path) -> Result<()> {
    source.initialize().await.context("failed to load log")?;
    source.stop_polling();

    let path = source
        .download(json, dir)
        .await
        .with_context(|| format!("failed to download log {}", source.log_id()))?;
    println!("{}", path.display());
    Ok(())
}
