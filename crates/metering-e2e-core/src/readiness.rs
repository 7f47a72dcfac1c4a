//! The two readiness waits that gate collection.
//!
//! Both run on [`poll_until`] with the same settings; they differ only in the
//! predicate they check.

use tracing::info;

use crate::error::Result;
use crate::framework::MeteringFramework;
use crate::poll::{poll_until, Check, PollSettings};
use crate::types::{DataSourceTable, QueryReadiness};

/// Wait until every ReportDataSource has its backing table.
///
/// All data sources are awaited, not only those the cases use, because the
/// collection imports into every data source it knows about.
pub async fn wait_for_data_source_tables<F>(
    framework: &F,
    settings: PollSettings,
) -> Result<Vec<DataSourceTable>>
where
    F: MeteringFramework + ?Sized,
{
    let tables =
        poll_until("ReportDataSource tables", settings, || check_tables(framework)).await?;

    info!(count = tables.len(), "all ReportDataSource tables exist");
    Ok(tables)
}

/// Wait until every named ReportGenerationQuery is ready.
pub async fn wait_for_generation_queries_ready<F>(
    framework: &F,
    queries: &[String],
    settings: PollSettings,
) -> Result<()>
where
    F: MeteringFramework + ?Sized,
{
    poll_until("ReportGenerationQueries", settings, || {
        check_queries(framework, queries)
    })
    .await?;

    info!(count = queries.len(), "all ReportGenerationQueries are ready");
    Ok(())
}

async fn check_tables<F>(framework: &F) -> Result<Check<Vec<DataSourceTable>>>
where
    F: MeteringFramework + ?Sized,
{
    let tables = framework.data_source_tables().await?;
    if tables.is_empty() {
        return Ok(Check::pending("no ReportDataSources exist yet"));
    }
    let missing: Vec<String> = tables
        .iter()
        .filter(|t| !t.has_table())
        .map(|t| format!("table for ReportDataSource {}", t.name))
        .collect();
    Ok(if missing.is_empty() {
        Check::Ready(tables)
    } else {
        Check::Pending(missing)
    })
}

async fn check_queries<F>(framework: &F, queries: &[String]) -> Result<Check<()>>
where
    F: MeteringFramework + ?Sized,
{
    let mut unmet = Vec::new();
    for query in queries {
        if let QueryReadiness::NotReady { reason } =
            framework.generation_query_readiness(query).await?
        {
            unmet.push(format!("{query}: {reason}"));
        }
    }
    Ok(if unmet.is_empty() {
        Check::Ready(())
    } else {
        Check::Pending(unmet)
    })
}
