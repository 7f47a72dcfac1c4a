//! Verification fan-out.
//!
//! Each case runs as an isolated unit against the shared, read-only
//! [`CollectionResult`]: it gets its own deadline, its own phase, and its own
//! [`CaseOutcome`]. A failing case never stops its siblings. Timeouts stop the
//! *waiting*; the report generation itself is left running in the cluster.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::artifacts::ArtifactWriter;
use crate::error::{HarnessError, Result};
use crate::framework::MeteringFramework;
use crate::poll::{poll_until, Check, PollSettings};
use crate::registry::{AdHocCase, ScheduledCase};
use crate::types::{CaseKind, CaseOutcome, CasePhase, CollectionResult, ReportStatus};

/// Runs verification cases against one collection window.
pub struct FanOut<'a, F: ?Sized> {
    framework: &'a F,
    collection: &'a CollectionResult,
    artifacts: &'a ArtifactWriter,
    poll_interval: Duration,
}

impl<'a, F> FanOut<'a, F>
where
    F: MeteringFramework + ?Sized,
{
    pub fn new(
        framework: &'a F,
        collection: &'a CollectionResult,
        artifacts: &'a ArtifactWriter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            framework,
            collection,
            artifacts,
            poll_interval,
        }
    }

    /// Create, await and validate every ad-hoc report concurrently.
    pub async fn run_ad_hoc<'c>(
        &self,
        cases: impl IntoIterator<Item = &'c AdHocCase>,
    ) -> Vec<CaseOutcome> {
        join_all(cases.into_iter().map(|case| self.ad_hoc_case(case))).await
    }

    /// Await and validate every scheduled report concurrently.
    pub async fn run_scheduled<'c>(
        &self,
        cases: impl IntoIterator<Item = &'c ScheduledCase>,
    ) -> Vec<CaseOutcome> {
        join_all(cases.into_iter().map(|case| self.scheduled_case(case))).await
    }

    async fn ad_hoc_case(&self, case: &AdHocCase) -> CaseOutcome {
        let mut run = CaseRun::start(&case.name, CaseKind::AdHoc, &case.query_name, case.timeout);
        let result = self.verify_ad_hoc(case, &mut run).await;
        run.finish(result)
    }

    async fn scheduled_case(&self, case: &ScheduledCase) -> CaseOutcome {
        let mut run =
            CaseRun::start(&case.name, CaseKind::Scheduled, &case.query_name, case.timeout);
        let result = self.verify_scheduled(case, &mut run).await;
        run.finish(result)
    }

    async fn verify_ad_hoc(&self, case: &AdHocCase, run: &mut CaseRun) -> Result<usize> {
        let spec = case.factory.build(&case.name, &case.query_name, self.collection);
        info!(
            case = %case.name,
            strategy = case.factory.strategy(),
            reporting_start = %spec.reporting_start,
            reporting_end = %spec.reporting_end,
            "creating report"
        );
        run.bounded("create report", self.framework.create_report(&spec)).await?;

        run.advance(CasePhase::Waiting);
        let framework = self.framework;
        let name = case.name.as_str();
        poll_until(&format!("report {name}"), run.poll_settings(self.poll_interval), || {
            report_finished(framework, name)
        })
        .await?;

        let rows = run
            .bounded("fetch results", self.framework.report_results(name))
            .await?;
        self.artifacts.write_results(CaseKind::AdHoc, name, &rows).await?;
        non_empty(name, rows.len())
    }

    async fn verify_scheduled(&self, case: &ScheduledCase, run: &mut CaseRun) -> Result<usize> {
        run.advance(CasePhase::Waiting);
        let framework = self.framework;
        let name = case.name.as_str();
        let period_end = self.collection.period_end();
        poll_until(
            &format!("scheduled report {name}"),
            run.poll_settings(self.poll_interval),
            || scheduled_caught_up(framework, name, period_end),
        )
        .await?;

        let rows = run
            .bounded("fetch results", self.framework.scheduled_report_results(name))
            .await?;
        self.artifacts.write_results(CaseKind::Scheduled, name, &rows).await?;
        non_empty(name, rows.len())
    }
}

async fn report_finished<F>(framework: &F, name: &str) -> Result<Check<()>>
where
    F: MeteringFramework + ?Sized,
{
    match framework.report_status(name).await? {
        ReportStatus::Finished => Ok(Check::Ready(())),
        ReportStatus::Pending { phase } => Ok(Check::pending(format!(
            "report {name} in phase {phase:?}"
        ))),
        ReportStatus::Failed { reason } => Err(HarnessError::ReportFailed {
            report: name.to_string(),
            reason,
        }),
    }
}

async fn scheduled_caught_up<F>(
    framework: &F,
    name: &str,
    period_end: chrono::DateTime<chrono::Utc>,
) -> Result<Check<()>>
where
    F: MeteringFramework + ?Sized,
{
    let status = framework.scheduled_report_status(name).await?;
    if status.covers(period_end) {
        return Ok(Check::Ready(()));
    }
    let last = status
        .last_report_time
        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
    Ok(Check::pending(format!(
        "scheduled report {name} last ran up to {last}, need {}",
        period_end.to_rfc3339()
    )))
}

fn non_empty(name: &str, rows: usize) -> Result<usize> {
    if rows == 0 {
        Err(HarnessError::NoRows {
            report: name.to_string(),
        })
    } else {
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Per-case state machine
// ---------------------------------------------------------------------------

/// Tracks one case through `Pending → Waiting → terminal` and owns its
/// deadline.
struct CaseRun {
    name: String,
    kind: CaseKind,
    query_name: String,
    phase: CasePhase,
    started: Instant,
    timeout: Duration,
}

impl CaseRun {
    fn start(name: &str, kind: CaseKind, query_name: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            kind,
            query_name: query_name.to_string(),
            phase: CasePhase::Pending,
            started: Instant::now(),
            timeout,
        }
    }

    fn advance(&mut self, next: CasePhase) {
        debug_assert!(!self.phase.is_terminal(), "case {} already finished", self.name);
        info!(case = %self.name, kind = %self.kind, from = %self.phase, to = %next, "case phase");
        self.phase = next;
    }

    /// What is left of this case's budget.
    fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    /// Poll settings bounded by whatever is left of this case's budget.
    fn poll_settings(&self, interval: Duration) -> PollSettings {
        PollSettings::new(interval, self.remaining())
    }

    /// Await one cluster call for at most the rest of the budget. A call that
    /// outlasts it is abandoned, not cancelled in the cluster.
    async fn bounded<T>(&self, step: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.remaining(), call).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout {
                what: format!("{step} for {} case {}", self.kind, self.name),
                elapsed: self.started.elapsed(),
                unmet: vec![format!("{step} did not return")],
            }),
        }
    }

    fn finish(mut self, result: Result<usize>) -> CaseOutcome {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let (phase, rows, error) = match result {
            Ok(rows) => (CasePhase::Succeeded, rows, None),
            Err(err @ HarnessError::Timeout { .. }) => (CasePhase::TimedOut, 0, Some(err.to_string())),
            Err(err) => (CasePhase::Failed, 0, Some(err.to_string())),
        };
        self.advance(phase);
        if let Some(error) = &error {
            warn!(case = %self.name, kind = %self.kind, %error, "case failed");
        }
        CaseOutcome {
            name: self.name,
            kind: self.kind,
            query_name: self.query_name,
            phase,
            rows,
            elapsed_ms,
            error,
        }
    }
}
