//! Harness entry point.
//!
//! ```text
//! registry ──► tables ready ──► queries ready ──► collect once ──► data present
//!                                                      │
//!                                      ┌───────────────┴───────────────┐
//!                                      ▼                               ▼
//!                               ad-hoc reports                 scheduled reports
//! ```
//!
//! Every stage before the fan-out is fatal on failure; [`Harness::run`]
//! returns the error and no case runs. Inside the fan-out failures are
//! attributed to individual cases and collected into the [`RunSummary`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::artifacts::ArtifactWriter;
use crate::collect::{assert_all_have_data, CollectionTrigger};
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::fanout::FanOut;
use crate::framework::MeteringFramework;
use crate::poll::PollSettings;
use crate::readiness::{wait_for_data_source_tables, wait_for_generation_queries_ready};
use crate::registry::Registry;
use crate::types::{CaseKind, CaseOutcome};

/// Attributed results of a run that reached the fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub outcomes: Vec<CaseOutcome>,
    pub skipped: Vec<SkippedCase>,
}

/// A registry case that took no part in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCase {
    pub name: String,
    pub kind: CaseKind,
}

impl RunSummary {
    /// True when every executed case succeeded. Skipped cases do not count.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(CaseOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    /// Outcome of the `kind` case called `name`. An ad-hoc and a scheduled
    /// case may share a name.
    pub fn outcome(&self, kind: CaseKind, name: &str) -> Option<&CaseOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind && o.name == name)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for o in &self.outcomes {
            write!(f, "{:<7} {:<9} {} ({} rows, {}ms)", o.phase, o.kind, o.name, o.rows, o.elapsed_ms)?;
            if let Some(error) = &o.error {
                write!(f, ": {error}")?;
            }
            writeln!(f)?;
        }
        for case in &self.skipped {
            writeln!(f, "{:<7} {:<9} {}", "SKIP", case.kind, case.name)?;
        }
        let failed = self.failures().count();
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.outcomes.len() - failed,
            failed,
            self.skipped.len()
        )
    }
}

/// One verification run over a registry.
pub struct Harness<'a, F: ?Sized> {
    framework: &'a F,
    config: &'a HarnessConfig,
    registry: &'a Registry,
}

impl<'a, F> Harness<'a, F>
where
    F: MeteringFramework + ?Sized,
{
    pub fn new(framework: &'a F, config: &'a HarnessConfig, registry: &'a Registry) -> Self {
        Self {
            framework,
            config,
            registry,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let queries = self.registry.query_names();
        let skipped: Vec<SkippedCase> = self
            .registry
            .skipped()
            .map(|c| SkippedCase {
                name: c.name().to_string(),
                kind: c.kind(),
            })
            .collect();
        for case in &skipped {
            info!(case = %case.name, kind = %case.kind, "case skipped");
        }
        info!(queries = queries.len(), skipped = skipped.len(), "starting metering verification");

        let readiness = PollSettings::new(self.config.poll_interval, self.config.readiness_timeout);
        wait_for_data_source_tables(self.framework, readiness).await?;
        wait_for_generation_queries_ready(self.framework, &queries, readiness).await?;

        let collection = CollectionTrigger::new(self.framework).collect_once().await?;
        assert_all_have_data(self.framework, &queries, &collection).await?;

        let artifacts = ArtifactWriter::new(&self.config.output_dir);
        let fanout = FanOut::new(self.framework, &collection, &artifacts, self.config.poll_interval);
        let (mut outcomes, scheduled) = tokio::join!(
            fanout.run_ad_hoc(self.registry.ad_hoc()),
            fanout.run_scheduled(self.registry.scheduled()),
        );
        outcomes.extend(scheduled);

        let summary = RunSummary {
            period_start: collection.period_start(),
            period_end: collection.period_end(),
            outcomes,
            skipped,
        };
        let path = artifacts.write_summary(&summary).await?;
        info!(
            passed = summary.passed(),
            failures = summary.failures().count(),
            summary = %path.display(),
            "metering verification finished"
        );
        Ok(summary)
    }
}
