//! Core types shared by the harness stages.
//!
//! [`CollectionResult`] is the one value that crosses every stage boundary:
//! it is produced once by the collection trigger and read, never rebuilt, by
//! the data-presence assertion and by every verification case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single result row as returned by the reporting API (`format=json`).
pub type ReportRow = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Body returned by the one-shot collection endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectResponse {
    #[serde(default)]
    pub results: Vec<ImportResult>,
}

/// Per-data-source import counters reported by a collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub report_data_source: String,
    #[serde(default)]
    pub metrics_imported_count: u64,
}

impl CollectResponse {
    /// Total metrics imported into `data_source` by this collection.
    pub fn imported_count(&self, data_source: &str) -> u64 {
        self.results
            .iter()
            .filter(|r| r.report_data_source == data_source)
            .map(|r| r.metrics_imported_count)
            .sum()
    }
}

/// The window covered by the one-shot collection plus its raw response.
///
/// Fields are private so the window cannot be altered once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionResult {
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    response: CollectResponse,
}

impl CollectionResult {
    pub fn new(
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        response: CollectResponse,
    ) -> Self {
        Self {
            period_start,
            period_end,
            response,
        }
    }

    pub fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    pub fn period_end(&self) -> DateTime<Utc> {
        self.period_end
    }

    pub fn response(&self) -> &CollectResponse {
        &self.response
    }
}

// ---------------------------------------------------------------------------
// Cluster object states
// ---------------------------------------------------------------------------

/// A ReportDataSource and the table backing it, if one has been created yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceTable {
    pub name: String,
    pub table_name: Option<String>,
}

impl DataSourceTable {
    pub fn has_table(&self) -> bool {
        self.table_name.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Whether a ReportGenerationQuery can be used to generate reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryReadiness {
    Ready,
    NotReady { reason: String },
}

/// Observed state of an ad-hoc Report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    /// Still being generated. `phase` is whatever the operator reported.
    Pending { phase: String },
    Finished,
    Failed { reason: String },
}

/// Observed state of a ScheduledReport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduledReportStatus {
    /// End of the most recent period the scheduled report has produced.
    pub last_report_time: Option<DateTime<Utc>>,
}

impl ScheduledReportStatus {
    /// True once the report has produced output up to at least `period_end`.
    pub fn covers(&self, period_end: DateTime<Utc>) -> bool {
        self.last_report_time.is_some_and(|t| t >= period_end)
    }
}

/// Everything needed to create a Report object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    pub name: String,
    pub generation_query: String,
    pub reporting_start: DateTime<Utc>,
    pub reporting_end: DateTime<Utc>,
    pub run_immediately: bool,
}

// ---------------------------------------------------------------------------
// Case outcomes
// ---------------------------------------------------------------------------

/// Which fan-out group a case belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseKind {
    AdHoc,
    Scheduled,
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseKind::AdHoc => f.pad("ad-hoc"),
            CaseKind::Scheduled => f.pad("scheduled"),
        }
    }
}

/// Lifecycle of a single verification case.
///
/// `Pending → Waiting → {Succeeded | TimedOut | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CasePhase {
    Pending,
    Waiting,
    Succeeded,
    TimedOut,
    Failed,
}

impl CasePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut | Self::Failed)
    }
}

impl std::fmt::Display for CasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CasePhase::Pending => f.pad("PENDING"),
            CasePhase::Waiting => f.pad("WAITING"),
            CasePhase::Succeeded => f.pad("PASS"),
            CasePhase::TimedOut => f.pad("TIMEOUT"),
            CasePhase::Failed => f.pad("FAIL"),
        }
    }
}

/// Final, attributed result of one verification case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseOutcome {
    pub name: String,
    pub kind: CaseKind,
    pub query_name: String,
    pub phase: CasePhase,
    pub rows: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseOutcome {
    pub fn succeeded(&self) -> bool {
        self.phase == CasePhase::Succeeded
    }
}
