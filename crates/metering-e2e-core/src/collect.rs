//! The one-shot collection and the data-presence check that follows it.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::framework::MeteringFramework;
use crate::types::CollectionResult;

/// Fires the run's single metrics collection.
///
/// [`CollectionTrigger::collect_once`] consumes the trigger, so a second
/// collection through the same trigger does not compile.
pub struct CollectionTrigger<'a, F: ?Sized> {
    framework: &'a F,
}

impl<'a, F> CollectionTrigger<'a, F>
where
    F: MeteringFramework + ?Sized,
{
    pub fn new(framework: &'a F) -> Self {
        Self { framework }
    }

    /// Run the collection. Any failure is a collection error; there is no
    /// retry.
    pub async fn collect_once(self) -> Result<CollectionResult> {
        info!("triggering metrics collection");
        let result = self
            .framework
            .collect_metrics_once()
            .await
            .map_err(|err| match err {
                err @ HarnessError::Collection { .. } => err,
                other => HarnessError::Collection {
                    details: other.to_string(),
                },
            })?;

        if result.period_start() >= result.period_end() {
            return Err(HarnessError::Collection {
                details: format!(
                    "empty collection window {} .. {}",
                    result.period_start(),
                    result.period_end()
                ),
            });
        }

        info!(
            period_start = %result.period_start(),
            period_end = %result.period_end(),
            data_sources = result.response().results.len(),
            "metrics collection finished"
        );
        Ok(result)
    }
}

/// Check that every query's data sources received metrics in `collection`.
///
/// Duplicate query names are checked once. All queries are checked before
/// failing so the error lists every query without data.
pub async fn assert_all_have_data<F>(
    framework: &F,
    queries: &[String],
    collection: &CollectionResult,
) -> Result<()>
where
    F: MeteringFramework + ?Sized,
{
    let queries: BTreeSet<&str> = queries.iter().map(String::as_str).collect();
    let mut missing = Vec::new();

    for query in &queries {
        let sources = framework.query_data_sources(query).await?;
        if sources.is_empty() {
            missing.push(format!("{query} (no data sources)"));
            continue;
        }
        let empty: Vec<&str> = sources
            .iter()
            .map(String::as_str)
            .filter(|ds| collection.response().imported_count(ds) == 0)
            .collect();
        if !empty.is_empty() {
            warn!(query = %query, data_sources = ?empty, "no metrics imported");
            missing.push(format!("{query} ({})", empty.join(", ")));
        }
    }

    if missing.is_empty() {
        info!(count = queries.len(), "every query has collected data");
        Ok(())
    } else {
        Err(HarnessError::MissingData { missing })
    }
}
