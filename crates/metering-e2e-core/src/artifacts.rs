//! Result files written to the output directory.
//!
//! Every fetched result set is kept, including empty ones, so a failing case
//! can be inspected after the run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::types::{CaseKind, ReportRow};

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the result file for a case. Scheduled results are prefixed so
    /// an ad-hoc and a scheduled case may share a name.
    pub fn results_path(&self, kind: CaseKind, case: &str) -> PathBuf {
        match kind {
            CaseKind::AdHoc => self.dir.join(format!("{case}.json")),
            CaseKind::Scheduled => self.dir.join(format!("scheduled-{case}.json")),
        }
    }

    pub async fn write_results(
        &self,
        kind: CaseKind,
        case: &str,
        rows: &[ReportRow],
    ) -> Result<PathBuf> {
        let path = self.results_path(kind, case);
        self.write_json(&path, &rows).await?;
        debug!(case, rows = rows.len(), path = %path.display(), "wrote report results");
        Ok(path)
    }

    pub async fn write_summary(&self, summary: &impl Serialize) -> Result<PathBuf> {
        let path = self.dir.join("summary.json");
        self.write_json(&path, summary).await?;
        Ok(path)
    }

    async fn write_json(&self, path: &Path, value: &impl Serialize) -> Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, body)
            .await
            .map_err(|source| HarnessError::io(path, source))
    }
}
