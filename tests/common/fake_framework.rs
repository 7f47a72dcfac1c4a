//! In-memory [`MeteringFramework`] for harness-level tests.
//!
//! `FakeFramework` models just enough of a metering deployment to drive the
//! harness through every stage without a cluster: data-source tables,
//! generation-query readiness, a one-shot collection with per-data-source
//! import counts, and scripted report lifecycles. Time is measured with
//! `tokio::time::Instant`, so scripts are deterministic under
//! `#[tokio::test(start_paused = true)]`.
//!
//! Every call is recorded in [`Calls`] for later assertions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use metering_e2e::core::{
    CollectResponse, CollectionResult, DataSourceTable, HarnessError, ImportResult,
    MeteringFramework, QueryReadiness, ReportRow, ReportSpec, ReportStatus, Result,
    ScheduledReportStatus,
};

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// How an ad-hoc report behaves once created.
#[derive(Debug, Clone)]
pub struct ReportScript {
    /// Time after creation at which the report reaches `Finished`.
    pub finishes_after: Option<Duration>,
    /// Reported as `Failed` from the first status read on.
    pub fails_with: Option<String>,
    pub rows: usize,
    /// How long `create_report` takes to return.
    pub create_delay: Duration,
    /// How long `report_results` takes to return.
    pub fetch_delay: Duration,
}

impl ReportScript {
    pub fn rows(rows: usize) -> Self {
        Self {
            finishes_after: Some(Duration::ZERO),
            fails_with: None,
            rows,
            create_delay: Duration::ZERO,
            fetch_delay: Duration::ZERO,
        }
    }

    pub fn slow_create(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn slow_fetch(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn finishes_after(after: Duration, rows: usize) -> Self {
        Self {
            finishes_after: Some(after),
            ..Self::rows(rows)
        }
    }

    pub fn never_finishes() -> Self {
        Self {
            finishes_after: None,
            ..Self::rows(1)
        }
    }

    pub fn fails(reason: impl Into<String>) -> Self {
        Self {
            fails_with: Some(reason.into()),
            ..Self::rows(0)
        }
    }
}

/// How a scheduled report behaves relative to the harness start.
#[derive(Debug, Clone)]
pub struct ScheduledScript {
    /// Time after the first status read at which the report covers the
    /// collection window.
    pub catches_up_after: Option<Duration>,
    pub rows: usize,
    pub fetch_delay: Duration,
}

impl ScheduledScript {
    pub fn caught_up(rows: usize) -> Self {
        Self {
            catches_up_after: Some(Duration::ZERO),
            rows,
            fetch_delay: Duration::ZERO,
        }
    }

    pub fn catches_up_after(after: Duration, rows: usize) -> Self {
        Self {
            catches_up_after: Some(after),
            rows,
            fetch_delay: Duration::ZERO,
        }
    }

    pub fn stale() -> Self {
        Self {
            catches_up_after: None,
            rows: 1,
            fetch_delay: Duration::ZERO,
        }
    }

    pub fn slow_fetch(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }
}

// ---------------------------------------------------------------------------
// Recorded calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub table_reads: usize,
    /// Every query whose readiness was checked, in call order.
    pub readiness_checks: Vec<String>,
    pub collections: usize,
    /// Every query whose data sources were resolved, in call order.
    pub data_checks: Vec<String>,
    pub created_reports: Vec<ReportSpec>,
    pub report_status_reads: HashMap<String, usize>,
    pub scheduled_status_reads: HashMap<String, usize>,
}

impl Calls {
    pub fn created(&self, name: &str) -> Option<&ReportSpec> {
        self.created_reports.iter().find(|spec| spec.name == name)
    }
}

// ---------------------------------------------------------------------------
// FakeFramework
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct State {
    tables: Vec<DataSourceTable>,
    /// Tables that only appear once this much time has passed.
    table_delay: Duration,
    query_sources: HashMap<String, Vec<String>>,
    unready: HashSet<String>,
    imports: HashMap<String, u64>,
    collect_error: Option<String>,
    reports: HashMap<String, ReportScript>,
    created_at: HashMap<String, Instant>,
    scheduled: HashMap<String, ScheduledScript>,
    scheduled_seen_at: HashMap<String, Instant>,
    calls: Calls,
}

pub struct FakeFramework {
    state: Mutex<State>,
    window: (DateTime<Utc>, DateTime<Utc>),
    started: Instant,
}

impl Default for FakeFramework {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFramework {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            window: fixed_window(),
            started: Instant::now(),
        }
    }

    /// A ready query reading from `data_sources`, each with a table and
    /// `imported` metrics in the collection.
    pub fn with_query(self, query: &str, data_sources: &[&str], imported: u64) -> Self {
        {
            let mut state = self.lock();
            for ds in data_sources {
                if !state.tables.iter().any(|t| t.name == *ds) {
                    state.tables.push(DataSourceTable {
                        name: ds.to_string(),
                        table_name: Some(format!("datasource_{}", ds.replace('-', "_"))),
                    });
                }
                state.imports.insert(ds.to_string(), imported);
            }
            state
                .query_sources
                .insert(query.to_string(), data_sources.iter().map(|s| s.to_string()).collect());
        }
        self
    }

    /// Shorthand for a query backed by a single data source of the same name.
    pub fn with_simple_query(self, query: &str) -> Self {
        self.with_query(query, &[query], 10)
    }

    pub fn with_unready_query(self, query: &str) -> Self {
        self.lock().unready.insert(query.to_string());
        self
    }

    /// A data source whose table has not been created.
    pub fn with_missing_table(self, data_source: &str) -> Self {
        self.lock().tables.push(DataSourceTable {
            name: data_source.to_string(),
            table_name: None,
        });
        self
    }

    /// Hide every table until `delay` has passed since construction.
    pub fn with_table_delay(self, delay: Duration) -> Self {
        self.lock().table_delay = delay;
        self
    }

    pub fn with_report(self, name: &str, script: ReportScript) -> Self {
        self.lock().reports.insert(name.to_string(), script);
        self
    }

    pub fn with_scheduled(self, name: &str, script: ScheduledScript) -> Self {
        self.lock().scheduled.insert(name.to_string(), script);
        self
    }

    pub fn failing_collection(self, reason: &str) -> Self {
        self.lock().collect_error = Some(reason.to_string());
        self
    }

    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.window
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

/// The window every fake collection reports.
pub fn fixed_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2026, 10, 15, 11, 50, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap(),
    )
}

/// Sleep for `delay`; a zero delay returns without yielding.
async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn rows(count: usize, name: &str) -> Vec<ReportRow> {
    (0..count)
        .map(|i| {
            let mut row = ReportRow::new();
            row.insert("report".into(), name.into());
            row.insert("namespace".into(), format!("ns-{i}").into());
            row
        })
        .collect()
}

#[async_trait]
impl MeteringFramework for FakeFramework {
    async fn data_source_tables(&self) -> Result<Vec<DataSourceTable>> {
        let mut state = self.lock();
        state.calls.table_reads += 1;
        if self.started.elapsed() < state.table_delay {
            return Ok(Vec::new());
        }
        Ok(state.tables.clone())
    }

    async fn generation_query_readiness(&self, query: &str) -> Result<QueryReadiness> {
        let mut state = self.lock();
        state.calls.readiness_checks.push(query.to_string());
        if !state.query_sources.contains_key(query) {
            return Err(HarnessError::cluster(
                "get ReportGenerationQuery",
                format!("{query} not found"),
            ));
        }
        Ok(if state.unready.contains(query) {
            QueryReadiness::NotReady {
                reason: "dependencies not ready".into(),
            }
        } else {
            QueryReadiness::Ready
        })
    }

    async fn collect_metrics_once(&self) -> Result<CollectionResult> {
        let mut state = self.lock();
        state.calls.collections += 1;
        if let Some(reason) = &state.collect_error {
            return Err(HarnessError::cluster("collect", reason.clone()));
        }
        let mut results: Vec<ImportResult> = state
            .imports
            .iter()
            .map(|(ds, count)| ImportResult {
                report_data_source: ds.clone(),
                metrics_imported_count: *count,
            })
            .collect();
        results.sort_by(|a, b| a.report_data_source.cmp(&b.report_data_source));
        let (start, end) = self.window;
        Ok(CollectionResult::new(start, end, CollectResponse { results }))
    }

    async fn query_data_sources(&self, query: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.calls.data_checks.push(query.to_string());
        Ok(state.query_sources.get(query).cloned().unwrap_or_default())
    }

    async fn create_report(&self, spec: &ReportSpec) -> Result<()> {
        let delay = {
            let mut state = self.lock();
            state.calls.created_reports.push(spec.clone());
            state.created_at.insert(spec.name.clone(), Instant::now());
            state.reports.get(&spec.name).map_or(Duration::ZERO, |s| s.create_delay)
        };
        pause(delay).await;
        Ok(())
    }

    async fn report_status(&self, name: &str) -> Result<ReportStatus> {
        let mut state = self.lock();
        *state.calls.report_status_reads.entry(name.to_string()).or_default() += 1;
        let script = state.reports.get(name).cloned().unwrap_or_else(|| ReportScript::rows(1));
        let created = state.created_at.get(name).copied().ok_or_else(|| {
            HarnessError::cluster("get Report", format!("{name} not found"))
        })?;
        if let Some(reason) = script.fails_with {
            return Ok(ReportStatus::Failed { reason });
        }
        Ok(match script.finishes_after {
            Some(after) if created.elapsed() >= after => ReportStatus::Finished,
            _ => ReportStatus::Pending {
                phase: "Started".into(),
            },
        })
    }

    async fn report_results(&self, name: &str) -> Result<Vec<ReportRow>> {
        let script = self.lock().reports.get(name).cloned().unwrap_or_else(|| ReportScript::rows(1));
        pause(script.fetch_delay).await;
        Ok(rows(script.rows, name))
    }

    async fn scheduled_report_status(&self, name: &str) -> Result<ScheduledReportStatus> {
        let mut state = self.lock();
        *state.calls.scheduled_status_reads.entry(name.to_string()).or_default() += 1;
        let script = state
            .scheduled
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::cluster("get ScheduledReport", format!("{name} not found")))?;
        let first_seen = *state
            .scheduled_seen_at
            .entry(name.to_string())
            .or_insert_with(Instant::now);
        let (_, end) = self.window;
        let caught_up = script
            .catches_up_after
            .is_some_and(|after| first_seen.elapsed() >= after);
        Ok(ScheduledReportStatus {
            last_report_time: Some(if caught_up {
                end
            } else {
                end - chrono::Duration::hours(1)
            }),
        })
    }

    async fn scheduled_report_results(&self, name: &str) -> Result<Vec<ReportRow>> {
        let (count, delay) = self
            .lock()
            .scheduled
            .get(name)
            .map_or((0, Duration::ZERO), |s| (s.rows, s.fetch_delay));
        pause(delay).await;
        Ok(rows(count, name))
    }
}
