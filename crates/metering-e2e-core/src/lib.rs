//! metering-e2e-core — verification harness for a metering control plane.
//!
//! The harness proves from the outside that a metering deployment works:
//! data-source tables get created, generation queries become ready, a single
//! metrics collection imports data, and reports built from that one window
//! contain rows.
//!
//! # Architecture
//!
//! ```text
//! Registry ──► Readiness (tables) ──► Readiness (queries) ──► Collection
//!                                                                 │
//!                                          Data presence ◄────────┤
//!                                                                 ▼
//!                                              Fan-out (ad-hoc ‖ scheduled)
//! ```
//!
//! Cluster access is abstracted behind [`MeteringFramework`]; the
//! `metering-e2e-kube` crate provides the Kubernetes implementation.

pub mod artifacts;
pub mod collect;
pub mod config;
pub mod error;
pub mod fanout;
pub mod framework;
pub mod harness;
pub mod poll;
pub mod readiness;
pub mod registry;
pub mod types;

pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use framework::MeteringFramework;
pub use harness::{Harness, RunSummary, SkippedCase};
pub use registry::{default_registry, AdHocCase, Registry, ReportFactory, ScheduledCase, SimpleReport, TestCase};
pub use types::{
    CaseKind, CaseOutcome, CasePhase, CollectResponse, CollectionResult, DataSourceTable,
    ImportResult, QueryReadiness, ReportRow, ReportSpec, ReportStatus, ScheduledReportStatus,
};
