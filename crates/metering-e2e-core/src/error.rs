//! Error taxonomy for the harness.
//!
//! Every variant carries a stable code. Codes in the 1xxx–3xxx ranges are
//! fatal to the whole run (setup, readiness, collection); 4xxx codes are
//! attributed to a single verification case and never abort its siblings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Shared `Result` alias for the harness crates.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("[ME2E-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ME2E-1002] missing required setting {key} (set ${env})")]
    MissingSetting { key: &'static str, env: &'static str },

    #[error("[ME2E-1003] cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ME2E-1101] cluster request failed during {operation}: {details}")]
    Cluster {
        operation: &'static str,
        details: String,
    },

    #[error(
        "[ME2E-2001] timed out after {elapsed:?} waiting for {what}; unmet: {}",
        .unmet.join(", ")
    )]
    Timeout {
        what: String,
        elapsed: Duration,
        unmet: Vec<String>,
    },

    #[error("[ME2E-3001] metrics collection failed: {details}")]
    Collection { details: String },

    #[error("[ME2E-3002] no data collected for queries: {}", .missing.join(", "))]
    MissingData { missing: Vec<String> },

    #[error("[ME2E-4001] report {report} failed: {reason}")]
    ReportFailed { report: String, reason: String },

    #[error("[ME2E-4002] report {report} returned no rows")]
    NoRows { report: String },

    #[error("[ME2E-5001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ME2E-5002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },
}

impl HarnessError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ME2E-1001",
            Self::MissingSetting { .. } => "ME2E-1002",
            Self::OutputDir { .. } => "ME2E-1003",
            Self::Cluster { .. } => "ME2E-1101",
            Self::Timeout { .. } => "ME2E-2001",
            Self::Collection { .. } => "ME2E-3001",
            Self::MissingData { .. } => "ME2E-3002",
            Self::ReportFailed { .. } => "ME2E-4001",
            Self::NoRows { .. } => "ME2E-4002",
            Self::Io { .. } => "ME2E-5001",
            Self::Serialization { .. } => "ME2E-5002",
        }
    }

    /// Whether this error invalidates the whole run rather than one case.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReportFailed { .. } | Self::NoRows { .. })
    }

    pub fn cluster(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Cluster {
            operation,
            details: details.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            context: "json",
            details: err.to_string(),
        }
    }
}
