//! The collaborator the harness drives.
//!
//! [`MeteringFramework`] is the narrow surface the harness needs from the
//! cluster: point-in-time reads of control-plane objects, the one-shot
//! collection, report creation and result fetching. All waiting is done by
//! the harness itself (see [`crate::poll`]); implementations never block on a
//! condition.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::types::{
    CollectionResult, DataSourceTable, QueryReadiness, ReportRow, ReportSpec, ReportStatus,
    ScheduledReportStatus,
};

/// Cluster operations used by the harness. Implementations must be safe to
/// call concurrently from several verification cases.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MeteringFramework: Send + Sync {
    /// Every ReportDataSource in the target namespace and its table, if any.
    async fn data_source_tables(&self) -> Result<Vec<DataSourceTable>>;

    /// Current readiness of one ReportGenerationQuery.
    async fn generation_query_readiness(&self, query: &str) -> Result<QueryReadiness>;

    /// Run the metrics collection once and return the window it covered.
    async fn collect_metrics_once(&self) -> Result<CollectionResult>;

    /// Names of the data sources a generation query ultimately reads from.
    async fn query_data_sources(&self, query: &str) -> Result<Vec<String>>;

    /// Create a Report, replacing any stale report of the same name.
    async fn create_report(&self, spec: &ReportSpec) -> Result<()>;

    async fn report_status(&self, name: &str) -> Result<ReportStatus>;

    async fn report_results(&self, name: &str) -> Result<Vec<ReportRow>>;

    async fn scheduled_report_status(&self, name: &str) -> Result<ScheduledReportStatus>;

    async fn scheduled_report_results(&self, name: &str) -> Result<Vec<ReportRow>>;
}
